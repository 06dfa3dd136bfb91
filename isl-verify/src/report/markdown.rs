//! Markdown report output

use super::VerificationReport;
use crate::orchestrator::BehaviorResult;
use std::fmt::Write;

fn status(b: &BehaviorResult) -> &'static str {
    if b.skipped() {
        "skipped"
    } else if b.timed_out() {
        "timeout"
    } else if b.passed() {
        "pass"
    } else {
        "fail"
    }
}

/// Table cells cannot hold raw pipes or newlines
fn cell(s: &str) -> String {
    s.replace('|', "\\|").replace('\n', " ")
}

pub fn render(report: &VerificationReport) -> String {
    let mut md = String::new();
    let verdict = if report.passed { "passed" } else { "failed" };
    let _ = writeln!(md, "# Verification report: {}\n", report.domain);
    let _ = writeln!(
        md,
        "**Score:** {}/100 ({}), {} ms\n",
        report.score, verdict, report.duration_ms
    );

    md.push_str("## Categories\n\n| Category | Passed | Total | Score |\n|---|---|---|---|\n");
    for c in &report.categories {
        let _ = writeln!(
            md,
            "| {} | {} | {} | {:.0} |",
            c.category.name(),
            c.passed,
            c.total,
            c.score
        );
    }

    if !report.behaviors.is_empty() {
        md.push_str("\n## Behaviors\n\n| Behavior | Status | Conditions | Duration (ms) |\n|---|---|---|---|\n");
        for b in &report.behaviors {
            let total = b.all_conditions().count();
            let passed = b.all_conditions().filter(|c| c.passed).count();
            let _ = writeln!(
                md,
                "| {} | {} | {}/{} | {} |",
                cell(&b.behavior_name),
                status(b),
                passed,
                total,
                b.duration_ms
            );
        }
    }

    if !report.scenarios.is_empty() {
        md.push_str("\n## Scenarios\n\n");
        for s in &report.scenarios {
            let mark = if s.passed { "x" } else { " " };
            let _ = write!(md, "- [{}] {}", mark, s.name);
            if let Some(i) = s.stopped_at {
                let _ = write!(md, " (stopped at step {})", i + 1);
            }
            md.push('\n');
        }
    }

    if !report.findings.is_empty() {
        md.push_str("\n## Findings\n\n");
        for f in &report.findings {
            let _ = writeln!(md, "- **{}** {}", f.impact, f.label);
        }
    }
    md
}
