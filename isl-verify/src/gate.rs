//! Ship gate
//!
//! [`decide_gate`] is a pure function of a [`VerifyResult`]. Rules apply in
//! order: any critical reason blocks, then a passing run at or above the ship
//! threshold ships, then a score at or above the warn threshold warns.

use crate::config::Thresholds;
use crate::report::{FindingKind, Impact, VerificationReport};
use serde::{Deserialize, Serialize};
use std::fmt;

pub use crate::report::Finding as Reason;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GateVerdict {
    Ship,
    Warn,
    NoShip,
}

impl fmt::Display for GateVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GateVerdict::Ship => "SHIP",
            GateVerdict::Warn => "WARN",
            GateVerdict::NoShip => "NO_SHIP",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerifyResult {
    pub verdict: GateVerdict,
    pub score: u8,
    pub passed: bool,
    pub summary: String,
    pub reasons: Vec<Reason>,
    pub suggestions: Vec<String>,
}

impl VerifyResult {
    /// Gate a report with default thresholds
    pub fn from_report(report: &VerificationReport) -> Self {
        Self::from_report_with_thresholds(report, &Thresholds::default())
    }

    pub fn from_report_with_thresholds(report: &VerificationReport, thresholds: &Thresholds) -> Self {
        let mut result = Self {
            verdict: GateVerdict::NoShip,
            score: report.score,
            passed: report.passed,
            summary: String::new(),
            reasons: report.findings.clone(),
            suggestions: suggestions(&report.findings),
        };
        result.verdict = decide_gate_with_thresholds(&result, thresholds);
        result.summary = format!(
            "{}: {} scored {}/100, {}/{} behaviors passed, {}/{} scenarios passed",
            result.verdict,
            report.domain,
            report.score,
            report.behaviors_passed(),
            report.behaviors.len(),
            report.scenarios_passed(),
            report.scenarios.len()
        );
        result
    }
}

pub fn decide_gate(result: &VerifyResult) -> GateVerdict {
    decide_gate_with_thresholds(result, &Thresholds::default())
}

pub fn decide_gate_with_thresholds(result: &VerifyResult, thresholds: &Thresholds) -> GateVerdict {
    let score = f64::from(result.score);
    if result.reasons.iter().any(|r| r.impact == Impact::Critical) {
        GateVerdict::NoShip
    } else if result.passed && score >= thresholds.ship {
        GateVerdict::Ship
    } else if score >= thresholds.warn {
        GateVerdict::Warn
    } else {
        GateVerdict::NoShip
    }
}

fn suggestions(findings: &[Reason]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    let mut suggest = |s: &str| {
        if !out.iter().any(|o| o == s) {
            out.push(s.to_string());
        }
    };
    for f in findings {
        suggest(match f.kind {
            FindingKind::InvariantViolated => {
                "Fix the invariant violations; they block shipping regardless of score"
            }
            FindingKind::PostconditionFailed => {
                "Check that the implementation produces the effects its postconditions promise"
            }
            FindingKind::Timeout => {
                "Look for blocking calls or raise timeout_ms if the behavior is expected to be slow"
            }
            FindingKind::ExecutionError => {
                "Handle the thrown errors or declare matching error postconditions"
            }
            FindingKind::ScenarioFailed => {
                "Re-run the failing scenario step by step; later steps depend on earlier ones"
            }
            FindingKind::UndeclaredEffect => "Declare the effects the behavior performs or remove them",
            FindingKind::TemporalBoundMissed => "Bring the behavior within its declared time bound",
            FindingKind::Skipped => {
                "Provide fixtures that satisfy the preconditions so the behavior executes"
            }
        });
    }
    out
}
