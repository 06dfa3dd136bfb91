//! Human-readable terminal output

use super::{Impact, VerificationReport};
use colored::*;
use std::fmt::Write;

/// Applies colors only when enabled
struct Painter {
    enabled: bool,
}

impl Painter {
    fn paint(&self, s: &str, style: impl Fn(&str) -> ColoredString) -> String {
        if self.enabled {
            style(s).to_string()
        } else {
            s.to_string()
        }
    }
}

pub fn render(report: &VerificationReport, color: bool) -> String {
    let p = Painter { enabled: color };
    let mut out = String::new();

    let _ = writeln!(out, "{} Verifying {}", p.paint("→", |s| s.blue().bold()), report.domain);
    for b in &report.behaviors {
        let (mark, note) = if b.skipped() {
            (p.paint("-", |s| s.yellow()), " (skipped)".to_string())
        } else if b.passed() {
            (p.paint("✓", |s| s.green()), String::new())
        } else if b.timed_out() {
            (p.paint("✗", |s| s.red()), " (timeout)".to_string())
        } else {
            (p.paint("✗", |s| s.red()), String::new())
        };
        let _ = writeln!(out, "  {} {}{} ({}ms)", mark, b.behavior_name, note, b.duration_ms);
        for c in b.all_conditions().filter(|c| !c.passed) {
            let _ = write!(out, "    {} {}", p.paint("↳", |s| s.red()), c.description);
            if let Some(e) = &c.evaluation_error {
                let _ = write!(out, ": {}", e);
            }
            out.push('\n');
        }
        if let Some(e) = &b.error {
            let _ = writeln!(out, "    {} {}", p.paint("↳", |s| s.red()), e.message);
        }
    }
    for s in &report.scenarios {
        let mark = if s.passed {
            p.paint("✓", |s| s.green())
        } else {
            p.paint("✗", |s| s.red())
        };
        let _ = writeln!(out, "  {} scenario {}", mark, s.name);
    }

    if !report.findings.is_empty() {
        let _ = writeln!(out, "\n{}", p.paint("Findings", |s| s.bold()));
        for f in &report.findings {
            let tag = format!("[{}]", f.impact);
            let tag = match f.impact {
                Impact::Critical => p.paint(&tag, |s| s.red().bold()),
                Impact::High => p.paint(&tag, |s| s.red()),
                Impact::Medium => p.paint(&tag, |s| s.yellow()),
                Impact::Low => p.paint(&tag, |s| s.dimmed()),
            };
            let _ = writeln!(out, "  {} {}", tag, f.label);
        }
    }

    let _ = writeln!(out, "\n{}", "─".repeat(60));
    let summary = format!(
        "{} behaviors, {} passed, {} skipped; {}/{} scenarios; score {}/100",
        report.behaviors.len(),
        report.behaviors_passed(),
        report.behaviors_skipped(),
        report.scenarios_passed(),
        report.scenarios.len(),
        report.score
    );
    if report.passed {
        let _ = writeln!(out, "{} {}", p.paint("✓", |s| s.green().bold()), summary);
    } else {
        let _ = writeln!(out, "{} {}", p.paint("✗", |s| s.red().bold()), summary);
    }
    out
}
