//! Behavior verification
//!
//! Drives one behavior through
//! `Pending -> PreconditionsChecked -> (Skipped | Executed) -> PostconditionsChecked -> Done`.
//! A failed or erroring precondition skips execution and postconditions.
//! After execution `old` is bound to the pre-execution snapshot and `result`
//! to the return value. If the target throws, panics or times out,
//! `success` and `any` postconditions are still evaluated against the
//! partial state with `result` unbound, so conditions that read `result`
//! fail with an evaluation error.

use crate::bindings::{validate_inputs, BehaviorFixture};
use crate::context::{EntityStore, EvaluationContext};
use crate::errors::Result;
use crate::evaluator::evaluate_condition;
use crate::sandbox::{ExecutionFailure, ExecutionOutcome, Sandbox, TargetRef};
use crate::state::{diff, CapturedState, StateDiff, StateStore};
use crate::trace::{ExecutionTrace, TraceRecorder};
use isl_compiler::{CompiledBehavior, CompiledCondition, CompiledEntityInvariant};
use isl_core::ast::{EffectKind, PostconditionGuard};
use isl_core::value::{Value, ValueMap};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    Pending,
    PreconditionsChecked,
    Skipped,
    Executed,
    PostconditionsChecked,
    Done,
}

/// Outcome of one contract condition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionResult {
    pub description: String,
    pub passed: bool,
    /// Canonical rendering of the compiled condition
    pub expression: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evaluation_error: Option<String>,
}

impl ConditionResult {
    pub fn evaluate(condition: &CompiledCondition, ctx: &EvaluationContext) -> Self {
        let (passed, evaluation_error) = match evaluate_condition(&condition.ir, ctx) {
            Ok(passed) => (passed, None),
            Err(e) => (false, Some(e.to_string())),
        };
        Self {
            description: condition.description.clone(),
            passed,
            expression: condition.expression.clone(),
            evaluation_error,
        }
    }

    fn check(description: impl Into<String>, expression: impl Into<String>, passed: bool) -> Self {
        Self {
            description: description.into(),
            passed,
            expression: expression.into(),
            evaluation_error: None,
        }
    }
}

/// An ambient effect the behavior performed without declaring it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectFinding {
    pub effect: EffectKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionErrorKind {
    Thrown,
    Panicked,
    Timeout,
}

/// Error captured while executing the target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionError {
    pub kind: ExecutionErrorKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    pub message: String,
}

impl From<&ExecutionFailure> for ExecutionError {
    fn from(failure: &ExecutionFailure) -> Self {
        match failure {
            ExecutionFailure::Thrown(e) => Self {
                kind: ExecutionErrorKind::Thrown,
                code: Some(e.code.clone()),
                message: e.message.clone(),
            },
            ExecutionFailure::Panicked { message } => Self {
                kind: ExecutionErrorKind::Panicked,
                code: None,
                message: message.clone(),
            },
            ExecutionFailure::TimedOut(e) => Self {
                kind: ExecutionErrorKind::Timeout,
                code: None,
                message: e.to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BehaviorResult {
    pub behavior_name: String,
    pub phases: Vec<Phase>,
    pub executed: bool,
    pub precondition_results: Vec<ConditionResult>,
    pub postcondition_results: Vec<ConditionResult>,
    pub invariant_results: Vec<ConditionResult>,
    pub temporal_results: Vec<ConditionResult>,
    pub effect_findings: Vec<EffectFinding>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ExecutionError>,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_diff: Option<StateDiff>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace: Option<ExecutionTrace>,
}

impl BehaviorResult {
    pub(crate) fn new(name: &str) -> Self {
        Self {
            behavior_name: name.to_string(),
            phases: vec![Phase::Pending],
            executed: false,
            precondition_results: Vec::new(),
            postcondition_results: Vec::new(),
            invariant_results: Vec::new(),
            temporal_results: Vec::new(),
            effect_findings: Vec::new(),
            error: None,
            duration_ms: 0,
            return_value: None,
            state_diff: None,
            trace: None,
        }
    }

    pub fn skipped(&self) -> bool {
        self.phases.contains(&Phase::Skipped)
    }

    pub fn timed_out(&self) -> bool {
        matches!(&self.error, Some(e) if e.kind == ExecutionErrorKind::Timeout)
    }

    /// Every condition result of every kind
    pub fn all_conditions(&self) -> impl Iterator<Item = &ConditionResult> {
        self.precondition_results
            .iter()
            .chain(&self.postcondition_results)
            .chain(&self.invariant_results)
            .chain(&self.temporal_results)
    }

    pub fn passed(&self) -> bool {
        self.executed && self.error.is_none() && self.all_conditions().all(|c| c.passed)
    }
}

fn evaluate_all(conditions: &[CompiledCondition], ctx: &EvaluationContext) -> Vec<ConditionResult> {
    conditions
        .iter()
        .map(|c| ConditionResult::evaluate(c, ctx))
        .collect()
}

/// Check an entity invariant against every record of its entity. Record
/// fields are bound as variables.
fn check_entity_invariant(
    invariant: &CompiledEntityInvariant,
    state: &CapturedState,
    ctx: &EvaluationContext,
) -> ConditionResult {
    let condition = &invariant.condition;
    let mut failed = Vec::new();
    let mut evaluation_error = None;
    if let Some(table) = state.entities.get(&invariant.entity) {
        for (id, record) in table {
            let fields = record.as_map().cloned().unwrap_or_default();
            let record_ctx = ctx.clone().with_variables(fields);
            match evaluate_condition(&condition.ir, &record_ctx) {
                Ok(true) => {}
                Ok(false) => failed.push(id.clone()),
                Err(e) => {
                    failed.push(id.clone());
                    evaluation_error.get_or_insert_with(|| format!("{}[{}]: {}", invariant.entity, id, e));
                }
            }
        }
    }
    let description = if failed.is_empty() {
        format!("{}: {}", invariant.entity, condition.description)
    } else {
        format!(
            "{}: {} (violated by {})",
            invariant.entity,
            condition.description,
            failed.join(", ")
        )
    };
    ConditionResult {
        description,
        passed: failed.is_empty(),
        expression: condition.expression.clone(),
        evaluation_error,
    }
}

/// Runs behaviors against targets through a sandbox
#[derive(Clone)]
pub struct BehaviorRunner {
    sandbox: Sandbox,
    entities: Vec<String>,
    record_traces: bool,
}

impl BehaviorRunner {
    pub fn new(sandbox: Sandbox) -> Self {
        Self {
            sandbox,
            entities: Vec::new(),
            record_traces: true,
        }
    }

    /// Entities declared by the domain. They are known to queries even
    /// while they have no records.
    pub fn with_entities(mut self, entities: impl IntoIterator<Item = String>) -> Self {
        self.entities = entities.into_iter().collect();
        self
    }

    pub fn with_traces(mut self, enabled: bool) -> Self {
        self.record_traces = enabled;
        self
    }

    /// Verify one fixture against a fresh store seeded from it
    pub async fn verify_behavior(
        &self,
        behavior: &CompiledBehavior,
        target: &TargetRef,
        fixture: &BehaviorFixture,
    ) -> Result<BehaviorResult> {
        let store = StateStore::from_state(&fixture.state.to_state());
        let mut result = self
            .run(behavior, target, fixture.input.clone(), &store, &ValueMap::new())
            .await?;
        if let (Some(expected), true) = (&fixture.expected, result.executed) {
            let actual = result.return_value.clone().unwrap_or(Value::Nil);
            result.postcondition_results.push(ConditionResult::check(
                "result matches expected value",
                format!("result == {}", expected),
                actual == *expected,
            ));
        }
        Ok(result)
    }

    /// Verify one invocation against a shared store. `variables` are visible
    /// to every condition.
    pub async fn run(
        &self,
        behavior: &CompiledBehavior,
        target: &TargetRef,
        input: ValueMap,
        store: &StateStore,
        variables: &ValueMap,
    ) -> Result<BehaviorResult> {
        let mut result = BehaviorResult::new(&behavior.name);
        let mut trace = TraceRecorder::new(&behavior.name);
        validate_inputs(behavior, &input)?;
        for entity in &self.entities {
            store.declare_entity(entity);
        }

        store.take_effects();
        let before = Arc::new(store.capture());
        let pre_ctx = EvaluationContext::new(before.clone() as Arc<dyn EntityStore>)
            .with_input(input.clone())
            .with_variables(variables.clone());

        result.precondition_results = evaluate_all(&behavior.preconditions, &pre_ctx);
        for check in &result.precondition_results {
            trace.check("precondition", &check.expression, check.passed);
        }
        result.phases.push(Phase::PreconditionsChecked);

        if !result.precondition_results.iter().all(|c| c.passed) {
            info!(behavior = %behavior.name, "precondition failed, skipping execution");
            result.phases.extend([Phase::Skipped, Phase::Done]);
            result.trace = self.record_traces.then(|| trace.finish());
            return Ok(result);
        }

        trace.call(&target.display_name(), &input);
        let outcome = self.sandbox.execute(target, input.clone(), store).await?;
        result.executed = true;
        result.phases.push(Phase::Executed);
        result.duration_ms = outcome.duration.as_millis() as u64;
        debug!(behavior = %behavior.name, duration_ms = result.duration_ms, "executed");

        match (&outcome.return_value, &outcome.error) {
            (Some(value), _) => trace.ret(&target.display_name(), value, result.duration_ms),
            (None, Some(failure)) => {
                let code = match failure {
                    ExecutionFailure::Thrown(e) => Some(e.code.as_str()),
                    _ => None,
                };
                trace.error(&failure.to_string(), code);
            }
            (None, None) => {}
        }
        for effect in &outcome.side_effects {
            let path = format!("{}[{}]", effect.entity, effect.id);
            trace.state_change(&path, effect.before.as_ref(), effect.after.as_ref());
        }

        let after = Arc::new(store.capture());
        let post_ctx = EvaluationContext::new(after.clone() as Arc<dyn EntityStore>)
            .with_input(input)
            .with_variables(variables.clone())
            .with_old(before.clone());

        result.postcondition_results = self.postconditions(behavior, &outcome, &post_ctx);
        result.invariant_results = evaluate_all(&behavior.invariants, &post_ctx);
        result.invariant_results.extend(
            behavior
                .entity_invariants
                .iter()
                .map(|inv| check_entity_invariant(inv, &after, &post_ctx)),
        );
        for check in result.postcondition_results.iter().chain(&result.invariant_results) {
            trace.check("postcondition", &check.expression, check.passed);
        }
        result.phases.push(Phase::PostconditionsChecked);

        result.temporal_results = behavior
            .temporal
            .iter()
            .map(|t| {
                let within = outcome.error.as_ref().map_or(true, |e| !e.is_timeout())
                    && result.duration_ms as i64 <= t.within_ms;
                ConditionResult::check(
                    t.description.clone(),
                    format!("duration <= {}ms", t.within_ms),
                    within,
                )
            })
            .collect();

        result.effect_findings = outcome
            .observed_effects
            .iter()
            .filter(|e| !behavior.effects.contains(*e))
            .map(|&effect| EffectFinding {
                effect,
                message: format!(
                    "'{}' performed undeclared {} effect",
                    behavior.name, effect
                ),
            })
            .collect();

        result.error = outcome.error.as_ref().map(ExecutionError::from);
        result.return_value = outcome.return_value;
        result.state_diff = Some(diff(&before, &after));
        result.phases.push(Phase::Done);
        result.trace = self.record_traces.then(|| trace.finish());

        info!(
            behavior = %behavior.name,
            passed = result.passed(),
            "behavior verified"
        );
        Ok(result)
    }

    fn postconditions(
        &self,
        behavior: &CompiledBehavior,
        outcome: &ExecutionOutcome,
        ctx: &EvaluationContext,
    ) -> Vec<ConditionResult> {
        let mut results = Vec::new();
        for block in &behavior.postconditions {
            let block_ctx = match (&block.guard, &outcome.error, &outcome.return_value) {
                (PostconditionGuard::Success | PostconditionGuard::Any, None, Some(value)) => {
                    ctx.clone().with_result(value.clone())
                }
                (PostconditionGuard::Success | PostconditionGuard::Any, _, _) => ctx.clone(),
                (PostconditionGuard::Error(code), Some(ExecutionFailure::Thrown(e)), _)
                    if e.code == *code =>
                {
                    ctx.clone().with_result(e.to_value())
                }
                (PostconditionGuard::Error(_), _, _) => continue,
            };
            results.extend(evaluate_all(&block.conditions, &block_ctx));
        }
        results
    }
}

#[cfg(test)]
#[path = "orchestrator/orchestrator_tests.rs"]
mod tests;
