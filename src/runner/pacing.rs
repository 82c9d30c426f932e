//! Simulated human think time between workflow steps

use crate::utils::config::DEFAULT_PACING;
use rand::Rng;
use std::collections::HashMap;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThinkTime {
    pub min: Duration,
    pub max: Duration,
}

impl ThinkTime {
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        if self.max <= self.min {
            return self.min;
        }
        let min = self.min.as_millis() as u64;
        let max = self.max.as_millis() as u64;
        Duration::from_millis(rng.gen_range(min..=max))
    }
}

/// Pause table keyed by the step a pause follows
#[derive(Debug, Clone, PartialEq)]
pub struct Pacing {
    pub scale: f64,
    pub per_step: HashMap<String, ThinkTime>,
}

impl Pacing {
    /// No pauses at all
    pub fn disabled() -> Self {
        Self {
            scale: 0.0,
            per_step: HashMap::new(),
        }
    }

    pub fn delay_for<R: Rng + ?Sized>(&self, step: &str, rng: &mut R) -> Option<Duration> {
        if self.scale <= 0.0 {
            return None;
        }
        let think = self.per_step.get(step)?;
        let delay =
            Duration::try_from_secs_f64(think.sample(rng).as_secs_f64() * self.scale).ok()?;
        if delay.is_zero() {
            None
        } else {
            Some(delay)
        }
    }

    /// Sleep for the think time configured after `step`, if any
    pub async fn pause_after(&self, step: &str) {
        let delay = {
            let mut rng = rand::thread_rng();
            self.delay_for(step, &mut rng)
        };
        if let Some(delay) = delay {
            log::debug!("Pausing {}ms after {}", delay.as_millis(), step);
            tokio::time::sleep(delay).await;
        }
    }
}

impl Default for Pacing {
    fn default() -> Self {
        let per_step = DEFAULT_PACING
            .iter()
            .map(|(step, min, max)| {
                (
                    step.to_string(),
                    ThinkTime {
                        min: Duration::from_millis(*min),
                        max: Duration::from_millis(*max),
                    },
                )
            })
            .collect();
        Self {
            scale: 1.0,
            per_step,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_sample_stays_in_bounds() {
        let think = ThinkTime {
            min: Duration::from_millis(1000),
            max: Duration::from_millis(3000),
        };
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..200 {
            let d = think.sample(&mut rng);
            assert!(d >= think.min && d <= think.max);
        }
    }

    #[test]
    fn test_scale_and_missing_steps() {
        let mut pacing = Pacing::default();
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(
            pacing.delay_for("generate_response", &mut rng),
            Some(Duration::from_secs(20))
        );
        assert_eq!(pacing.delay_for("session_probe", &mut rng), None);

        pacing.scale = 0.5;
        assert_eq!(
            pacing.delay_for("create_interaction", &mut rng),
            Some(Duration::from_secs(1))
        );

        pacing.scale = 0.0;
        assert_eq!(pacing.delay_for("generate_response", &mut rng), None);
    }

    #[test]
    fn test_unrepresentable_scale_yields_no_delay() {
        let mut pacing = Pacing::default();
        let mut rng = StdRng::seed_from_u64(3);
        for scale in [f64::NAN, f64::INFINITY, 1e300] {
            pacing.scale = scale;
            assert_eq!(pacing.delay_for("generate_response", &mut rng), None);
        }
    }

    #[test]
    fn test_default_pause_follows_role_assignment() {
        let pacing = Pacing::default();
        assert!(pacing.per_step.contains_key("assign_role"));
        assert!(!pacing.per_step.contains_key("register"));
    }
}
