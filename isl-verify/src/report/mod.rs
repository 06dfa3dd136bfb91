//! Verification reports
//!
//! [`VerificationReport`] aggregates behavior and scenario results, scores
//! the evidence per category and derives findings. The formatters in the
//! submodules only render a report; none of them changes pass/fail.

pub mod json;
pub mod junit;
pub mod markdown;
pub mod terminal;

use crate::orchestrator::{BehaviorResult, ConditionResult, ExecutionErrorKind};
use crate::scenario::ScenarioResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Severity of a finding
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Impact {
    Critical,
    High,
    Medium,
    Low,
}

impl fmt::Display for Impact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Impact::Critical => "critical",
            Impact::High => "high",
            Impact::Medium => "medium",
            Impact::Low => "low",
        };
        write!(f, "{}", name)
    }
}

/// What a finding is about. Each kind has a fixed impact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingKind {
    InvariantViolated,
    PostconditionFailed,
    Timeout,
    ExecutionError,
    ScenarioFailed,
    TemporalBoundMissed,
    UndeclaredEffect,
    Skipped,
}

impl FindingKind {
    pub fn impact(&self) -> Impact {
        match self {
            FindingKind::InvariantViolated => Impact::Critical,
            FindingKind::PostconditionFailed
            | FindingKind::Timeout
            | FindingKind::ExecutionError
            | FindingKind::ScenarioFailed => Impact::High,
            FindingKind::TemporalBoundMissed | FindingKind::UndeclaredEffect => Impact::Medium,
            FindingKind::Skipped => Impact::Low,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    pub kind: FindingKind,
    pub label: String,
    pub impact: Impact,
}

impl Finding {
    pub fn new(kind: FindingKind, label: impl Into<String>) -> Self {
        Self {
            kind,
            label: label.into(),
            impact: kind.impact(),
        }
    }
}

/// Evidence categories, in report order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Preconditions,
    Postconditions,
    Invariants,
    Execution,
    Scenarios,
    Temporal,
    Effects,
}

impl Category {
    pub const ALL: [Category; 7] = [
        Category::Preconditions,
        Category::Postconditions,
        Category::Invariants,
        Category::Execution,
        Category::Scenarios,
        Category::Temporal,
        Category::Effects,
    ];

    pub fn weight(&self) -> f64 {
        match self {
            Category::Preconditions => 5.0,
            Category::Postconditions => 30.0,
            Category::Invariants => 20.0,
            Category::Execution => 15.0,
            Category::Scenarios => 20.0,
            Category::Temporal => 5.0,
            Category::Effects => 5.0,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Category::Preconditions => "preconditions",
            Category::Postconditions => "postconditions",
            Category::Invariants => "invariants",
            Category::Execution => "execution",
            Category::Scenarios => "scenarios",
            Category::Temporal => "temporal",
            Category::Effects => "effects",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryScore {
    pub category: Category,
    pub passed: usize,
    pub total: usize,
    /// `passed / total * 100`, 0 for an empty category
    pub score: f64,
}

impl CategoryScore {
    fn new(category: Category, passed: usize, total: usize) -> Self {
        let score = if total == 0 {
            0.0
        } else {
            passed as f64 / total as f64 * 100.0
        };
        Self {
            category,
            passed,
            total,
            score,
        }
    }
}

/// Weighted mean of the non-empty categories, rounded to an integer
pub fn total_score(categories: &[CategoryScore]) -> u8 {
    let (weighted, weights) = categories
        .iter()
        .filter(|c| c.total > 0)
        .fold((0.0, 0.0), |(sum, w), c| {
            (sum + c.score * c.category.weight(), w + c.category.weight())
        });
    if weights == 0.0 {
        0
    } else {
        (weighted / weights).round().clamp(0.0, 100.0) as u8
    }
}

fn tally<'a>(results: impl Iterator<Item = &'a ConditionResult>) -> (usize, usize) {
    results.fold((0, 0), |(passed, total), r| {
        (passed + usize::from(r.passed), total + 1)
    })
}

fn score_categories(behaviors: &[BehaviorResult], scenarios: &[ScenarioResult]) -> Vec<CategoryScore> {
    let executed: Vec<&BehaviorResult> = behaviors.iter().filter(|b| b.executed).collect();
    Category::ALL
        .iter()
        .map(|&category| {
            let (passed, total) = match category {
                Category::Preconditions => {
                    tally(behaviors.iter().flat_map(|b| &b.precondition_results))
                }
                Category::Postconditions => {
                    tally(behaviors.iter().flat_map(|b| &b.postcondition_results))
                }
                Category::Invariants => tally(behaviors.iter().flat_map(|b| &b.invariant_results)),
                Category::Temporal => tally(behaviors.iter().flat_map(|b| &b.temporal_results)),
                Category::Execution => (
                    executed.iter().filter(|b| b.error.is_none()).count(),
                    executed.len(),
                ),
                Category::Effects => (
                    executed.iter().filter(|b| b.effect_findings.is_empty()).count(),
                    executed.len(),
                ),
                Category::Scenarios => (
                    scenarios.iter().filter(|s| s.passed).count(),
                    scenarios.len(),
                ),
            };
            CategoryScore::new(category, passed, total)
        })
        .collect()
}

fn collect_findings(behaviors: &[BehaviorResult], scenarios: &[ScenarioResult]) -> Vec<Finding> {
    let mut findings = Vec::new();
    for b in behaviors {
        let name = &b.behavior_name;
        if b.skipped() {
            findings.push(Finding::new(
                FindingKind::Skipped,
                format!("{}: skipped, precondition not met", name),
            ));
        }
        for r in b.invariant_results.iter().filter(|r| !r.passed) {
            findings.push(Finding::new(
                FindingKind::InvariantViolated,
                format!("{}: invariant violated: {}", name, r.description),
            ));
        }
        for r in b.postcondition_results.iter().filter(|r| !r.passed) {
            findings.push(Finding::new(
                FindingKind::PostconditionFailed,
                format!("{}: postcondition failed: {}", name, r.description),
            ));
        }
        if let Some(error) = &b.error {
            findings.push(match error.kind {
                ExecutionErrorKind::Timeout => {
                    Finding::new(FindingKind::Timeout, format!("{}: execution timed out", name))
                }
                _ => Finding::new(
                    FindingKind::ExecutionError,
                    format!("{}: execution error: {}", name, error.message),
                ),
            });
        }
        for r in b.temporal_results.iter().filter(|r| !r.passed) {
            findings.push(Finding::new(
                FindingKind::TemporalBoundMissed,
                format!("{}: temporal bound missed: {}", name, r.description),
            ));
        }
        for effect in &b.effect_findings {
            findings.push(Finding::new(
                FindingKind::UndeclaredEffect,
                format!("{}: undeclared {} effect", name, effect.effect),
            ));
        }
    }
    for s in scenarios.iter().filter(|s| !s.passed) {
        let at = s
            .stopped_at
            .map(|i| format!(" at step {}", i + 1))
            .unwrap_or_default();
        findings.push(Finding::new(
            FindingKind::ScenarioFailed,
            format!("scenario '{}' failed{}", s.name, at),
        ));
    }
    // Most severe first; order within a severity follows the results
    findings.sort_by_key(|f| f.impact);
    findings
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationReport {
    pub domain: String,
    pub behaviors: Vec<BehaviorResult>,
    pub scenarios: Vec<ScenarioResult>,
    pub score: u8,
    pub passed: bool,
    pub categories: Vec<CategoryScore>,
    pub findings: Vec<Finding>,
    pub duration_ms: u64,
    pub generated_at: DateTime<Utc>,
}

impl VerificationReport {
    pub fn new(
        domain: impl Into<String>,
        behaviors: Vec<BehaviorResult>,
        scenarios: Vec<ScenarioResult>,
        duration_ms: u64,
    ) -> Self {
        let categories = score_categories(&behaviors, &scenarios);
        let findings = collect_findings(&behaviors, &scenarios);
        let passed = behaviors
            .iter()
            .all(|b| b.error.is_none() && b.all_conditions().all(|c| c.passed))
            && scenarios.iter().all(|s| s.passed);
        Self {
            domain: domain.into(),
            score: total_score(&categories),
            passed,
            categories,
            findings,
            behaviors,
            scenarios,
            duration_ms,
            generated_at: Utc::now(),
        }
    }

    pub fn behaviors_passed(&self) -> usize {
        self.behaviors.iter().filter(|b| b.passed()).count()
    }

    pub fn behaviors_skipped(&self) -> usize {
        self.behaviors.iter().filter(|b| b.skipped()).count()
    }

    pub fn scenarios_passed(&self) -> usize {
        self.scenarios.iter().filter(|s| s.passed).count()
    }

    pub fn category(&self, category: Category) -> Option<&CategoryScore> {
        self.categories.iter().find(|c| c.category == category)
    }
}

/// Render a report in the chosen format
pub fn render(report: &VerificationReport, format: crate::config::ReportFormat, color: bool) -> String {
    use crate::config::ReportFormat;
    match format {
        ReportFormat::Json => json::render(report),
        ReportFormat::Terminal => terminal::render(report, color),
        ReportFormat::Junit => junit::render(report),
        ReportFormat::Markdown => markdown::render(report),
    }
}

#[cfg(test)]
#[path = "report_tests.rs"]
mod tests;
