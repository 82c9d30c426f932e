use super::types::RunResults;
use crate::metrics::ThresholdResult;
use anyhow::Result;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use std::io::Cursor;
use std::path::Path;

/// Generate JUnit XML with one test case per threshold
pub fn generate_junit_xml(results: &RunResults) -> Result<String> {
    let mut writer = Writer::new(Cursor::new(Vec::new()));

    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

    let total_tests = results.thresholds.len();
    let failures = results.crossed_thresholds().count();
    let time = (results.duration_ms as f64 / 1000.0).to_string();

    let mut suites_start = BytesStart::new("testsuites");
    suites_start.push_attribute(("name", "interaction-load-run"));
    suites_start.push_attribute(("tests", total_tests.to_string().as_str()));
    suites_start.push_attribute(("failures", failures.to_string().as_str()));
    suites_start.push_attribute(("time", time.as_str()));
    writer.write_event(Event::Start(suites_start))?;

    let mut suite_start = BytesStart::new("testsuite");
    suite_start.push_attribute(("name", results.scenario.as_str()));
    suite_start.push_attribute(("tests", total_tests.to_string().as_str()));
    suite_start.push_attribute(("failures", failures.to_string().as_str()));
    suite_start.push_attribute(("skipped", "0"));
    suite_start.push_attribute(("id", results.run_id.as_str()));
    suite_start.push_attribute(("time", time.as_str()));
    suite_start.push_attribute(("timestamp", results.started_at.as_str()));
    writer.write_event(Event::Start(suite_start))?;

    for threshold in &results.thresholds {
        write_test_case(&mut writer, threshold)?;
    }

    writer.write_event(Event::Start(BytesStart::new("system-out")))?;
    writer.write_event(Event::Text(BytesText::new(&format!(
        "iterations={} failed_requests={}",
        results.iterations.total, results.failed_requests
    ))))?;
    writer.write_event(Event::End(BytesEnd::new("system-out")))?;

    writer.write_event(Event::End(BytesEnd::new("testsuite")))?;
    writer.write_event(Event::End(BytesEnd::new("testsuites")))?;

    let result = writer.into_inner().into_inner();
    let xml = String::from_utf8(result)?;
    Ok(xml)
}

fn write_test_case<W: std::io::Write>(
    writer: &mut Writer<W>,
    threshold: &ThresholdResult,
) -> Result<()> {
    let mut case_start = BytesStart::new("testcase");
    case_start.push_attribute(("name", threshold.expression.as_str()));
    case_start.push_attribute(("classname", threshold.metric.as_str()));
    writer.write_event(Event::Start(case_start))?;

    if !threshold.passed {
        let observed = threshold
            .observed
            .map(|v| format!("{:.2}", v))
            .unwrap_or_else(|| "no data".to_string());
        let message = format!(
            "{} {} crossed (observed {})",
            threshold.metric, threshold.expression, observed
        );

        let mut fail_start = BytesStart::new("failure");
        fail_start.push_attribute(("message", message.as_str()));
        fail_start.push_attribute(("type", "ThresholdCrossed"));
        writer.write_event(Event::Start(fail_start))?;
        writer.write_event(Event::Text(BytesText::new(&message)))?;
        writer.write_event(Event::End(BytesEnd::new("failure")))?;
    }

    writer.write_event(Event::End(BytesEnd::new("testcase")))?;
    Ok(())
}

/// Print or save the JUnit report
pub fn generate(results: &RunResults, output: Option<&Path>) -> Result<()> {
    let xml = generate_junit_xml(results)?;
    if let Some(path) = output {
        std::fs::write(path, xml)?;
        println!("JUnit report saved to: {}", path.display());
    } else {
        println!("{}", xml);
    }
    Ok(())
}

/// Write report to file
pub fn write_report(results: &RunResults, output_dir: &Path) -> Result<()> {
    let xml = generate_junit_xml(results)?;
    let path = output_dir.join("junit.xml");
    std::fs::write(&path, xml)?;
    println!("    Generated JUnit report: {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::MetricsSnapshot;
    use crate::runner::state::IterationTally;

    fn results() -> RunResults {
        RunResults {
            run_id: "run-1".to_string(),
            scenario: "interaction_flow".to_string(),
            workflow: "interaction".to_string(),
            base_url: "http://localhost".to_string(),
            started_at: "2024-01-01T12:00:00Z".to_string(),
            duration_ms: 90_000,
            max_vus: 5,
            iterations: IterationTally {
                total: 12,
                passed: 10,
                partial: 1,
                failed: 1,
                interrupted: 0,
            },
            failed_requests: 3,
            metrics: MetricsSnapshot::default(),
            thresholds: vec![
                ThresholdResult {
                    metric: "http_req_duration".to_string(),
                    expression: "p(95)<30000".to_string(),
                    observed: Some(1200.0),
                    passed: true,
                },
                ThresholdResult {
                    metric: "login_latency".to_string(),
                    expression: "avg<1500".to_string(),
                    observed: Some(2400.5),
                    passed: false,
                },
            ],
            generated_at: "2024-01-01 12:01:30".to_string(),
        }
    }

    #[test]
    fn test_generate_junit_xml() {
        let xml = generate_junit_xml(&results()).expect("Failed to generate XML");

        assert!(xml.contains(r#"<testsuites name="interaction-load-run""#));
        assert!(xml.contains(r#"tests="2""#));
        assert!(xml.contains(r#"failures="1""#));
        assert!(xml.contains(r#"<testcase name="p(95)&lt;30000" classname="http_req_duration""#));
        assert!(xml.contains("observed 2400.50"));
        assert!(xml.contains("iterations=12 failed_requests=3"));
    }

    #[test]
    fn test_no_thresholds_is_empty_suite() {
        let mut results = results();
        results.thresholds.clear();
        let xml = generate_junit_xml(&results).unwrap();
        assert!(xml.contains(r#"tests="0""#));
        assert!(!xml.contains("<testcase"));
    }
}
