//! JUnit XML output
//!
//! One `<testsuite>` for behaviors and one for scenarios. Every failed
//! condition becomes a `<failure>`, an execution error an `<error>` and a
//! skipped behavior `<skipped>`.

use super::VerificationReport;
use crate::orchestrator::BehaviorResult;
use crate::scenario::ScenarioResult;

pub fn render(report: &VerificationReport) -> String {
    let mut xml = String::new();
    xml.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    xml.push_str(&format!(
        "<testsuites name=\"{}\" time=\"{:.3}\">\n",
        xml_escape(&report.domain),
        report.duration_ms as f64 / 1000.0
    ));
    behavior_suite(&mut xml, &report.domain, &report.behaviors);
    if !report.scenarios.is_empty() {
        scenario_suite(&mut xml, &report.domain, &report.scenarios);
    }
    xml.push_str("</testsuites>\n");
    xml
}

fn behavior_suite(xml: &mut String, domain: &str, behaviors: &[BehaviorResult]) {
    let failures = behaviors
        .iter()
        .filter(|b| b.executed && b.error.is_none() && !b.passed())
        .count();
    let errors = behaviors.iter().filter(|b| b.error.is_some()).count();
    let skipped = behaviors.iter().filter(|b| b.skipped()).count();
    let time: u64 = behaviors.iter().map(|b| b.duration_ms).sum();
    xml.push_str(&format!(
        "  <testsuite name=\"{}.behaviors\" tests=\"{}\" failures=\"{}\" errors=\"{}\" skipped=\"{}\" time=\"{:.3}\">\n",
        xml_escape(domain),
        behaviors.len(),
        failures,
        errors,
        skipped,
        time as f64 / 1000.0
    ));

    for b in behaviors {
        let open = format!(
            "    <testcase name=\"{}\" classname=\"{}\" time=\"{:.3}\"",
            xml_escape(&b.behavior_name),
            xml_escape(domain),
            b.duration_ms as f64 / 1000.0
        );
        if b.passed() {
            xml.push_str(&open);
            xml.push_str(" />\n");
            continue;
        }
        xml.push_str(&open);
        xml.push_str(">\n");
        if b.skipped() {
            xml.push_str("      <skipped message=\"precondition not met\" />\n");
        }
        if let Some(error) = &b.error {
            let kind = serde_json::to_value(error.kind)
                .ok()
                .and_then(|v| v.as_str().map(str::to_string))
                .unwrap_or_default();
            xml.push_str(&format!(
                "      <error message=\"{}\" type=\"{}\" />\n",
                xml_escape(&error.message),
                kind
            ));
        }
        if b.executed {
            for c in b.all_conditions().filter(|c| !c.passed) {
                let detail = match &c.evaluation_error {
                    Some(e) => format!("{}\n\n{}", c.expression, e),
                    None => c.expression.clone(),
                };
                xml.push_str(&format!(
                    "      <failure message=\"{}\" type=\"condition\">{}</failure>\n",
                    xml_escape(&c.description),
                    xml_escape(&detail)
                ));
            }
        }
        xml.push_str("    </testcase>\n");
    }
    xml.push_str("  </testsuite>\n");
}

fn scenario_suite(xml: &mut String, domain: &str, scenarios: &[ScenarioResult]) {
    let failures = scenarios.iter().filter(|s| !s.passed).count();
    let time: u64 = scenarios.iter().map(|s| s.duration_ms).sum();
    xml.push_str(&format!(
        "  <testsuite name=\"{}.scenarios\" tests=\"{}\" failures=\"{}\" errors=\"0\" time=\"{:.3}\">\n",
        xml_escape(domain),
        scenarios.len(),
        failures,
        time as f64 / 1000.0
    ));
    for s in scenarios {
        let time = s.duration_ms as f64 / 1000.0;
        if s.passed {
            xml.push_str(&format!(
                "    <testcase name=\"{}\" classname=\"{}\" time=\"{:.3}\" />\n",
                xml_escape(&s.name),
                xml_escape(domain),
                time
            ));
            continue;
        }
        let step = s.stopped_at.and_then(|i| s.steps.get(i));
        let message = step
            .and_then(|st| st.message.clone())
            .unwrap_or_else(|| "scenario failed".to_string());
        xml.push_str(&format!(
            "    <testcase name=\"{}\" classname=\"{}\" time=\"{:.3}\">\n",
            xml_escape(&s.name),
            xml_escape(domain),
            time
        ));
        xml.push_str(&format!(
            "      <failure message=\"{}\" type=\"scenario\">step {}</failure>\n",
            xml_escape(&message),
            s.stopped_at.map(|i| i + 1).unwrap_or_default()
        ));
        xml.push_str("    </testcase>\n");
    }
    xml.push_str("  </testsuite>\n");
}

fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
