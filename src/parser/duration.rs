use anyhow::{bail, Result};
use std::time::Duration;

/// Parse a compound duration such as `500ms`, `15s`, `1m30s` or `2h`.
pub fn parse_duration(input: &str) -> Result<Duration> {
    let s = input.trim();
    if s.is_empty() {
        bail!("Duration string cannot be empty");
    }

    let mut total_ms: f64 = 0.0;
    let mut chars = s.chars().peekable();

    while chars.peek().is_some() {
        let mut number = String::new();
        while let Some(&c) = chars.peek() {
            if c.is_ascii_digit() || c == '.' {
                number.push(c);
                chars.next();
            } else {
                break;
            }
        }

        let mut unit = String::new();
        while let Some(&c) = chars.peek() {
            if c.is_ascii_alphabetic() {
                unit.push(c);
                chars.next();
            } else {
                break;
            }
        }

        if number.is_empty() {
            bail!("Invalid duration '{}': expected a number before '{}'", input, unit);
        }
        let value: f64 = number
            .parse()
            .map_err(|_| anyhow::anyhow!("Invalid numeric value '{}' in duration '{}'", number, input))?;

        let factor = match unit.as_str() {
            "ms" => 1.0,
            "s" => 1_000.0,
            "m" => 60_000.0,
            "h" => 3_600_000.0,
            "" => bail!("Duration '{}' is missing a unit (ms, s, m, h)", input),
            other => bail!("Unknown duration unit '{}' in '{}'", other, input),
        };
        total_ms += value * factor;
    }

    Ok(Duration::from_millis(total_ms.round() as u64))
}

/// Human readable rendering used in console output and reports
pub fn format_duration(duration: Duration) -> String {
    let ms = duration.as_millis() as u64;
    if ms < 1000 {
        format!("{}ms", ms)
    } else if ms < 60_000 {
        format!("{:.1}s", ms as f64 / 1000.0)
    } else {
        let minutes = ms / 60_000;
        let seconds = (ms % 60_000) / 1000;
        if seconds == 0 {
            format!("{}m", minutes)
        } else {
            format!("{}m{}s", minutes, seconds)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_units() {
        assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_duration("15s").unwrap(), Duration::from_secs(15));
        assert_eq!(parse_duration("1m").unwrap(), Duration::from_secs(60));
        assert_eq!(parse_duration("2h").unwrap(), Duration::from_secs(7200));
    }

    #[test]
    fn test_parse_compound_and_fractional() {
        assert_eq!(parse_duration("1m30s").unwrap(), Duration::from_secs(90));
        assert_eq!(parse_duration("1.5s").unwrap(), Duration::from_millis(1500));
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("10").is_err());
        assert!(parse_duration("5d").is_err());
        assert!(parse_duration("s").is_err());
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_millis(250)), "250ms");
        assert_eq!(format_duration(Duration::from_millis(2500)), "2.5s");
        assert_eq!(format_duration(Duration::from_secs(90)), "1m30s");
        assert_eq!(format_duration(Duration::from_secs(60)), "1m");
    }
}
