//! Scenario runner
//!
//! Steps run strictly in order against one store. A bound step result is
//! visible to later steps under its name. The first failing step stops the
//! scenario; an invocation that fails while the step expects failure counts
//! as passed.

use crate::bindings::StateSeed;
use crate::context::{EntityStore, EvaluationContext};
use crate::errors::{BindingError, Result};
use crate::evaluator::evaluate;
use crate::orchestrator::{BehaviorResult, BehaviorRunner, ConditionResult};
use crate::sandbox::TargetRef;
use crate::state::StateStore;
use isl_compiler::{CompiledDomain, CompiledScenario, CompiledStep};
use isl_core::ir::IrNode;
use isl_core::value::{Value, ValueMap};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Target implementation per behavior name
pub type TargetTable = BTreeMap<String, TargetRef>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum StepOutcome {
    Invoke {
        behavior: String,
        expect_failure: bool,
        result: Option<Box<BehaviorResult>>,
    },
    Assert {
        condition: ConditionResult,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    pub index: usize,
    pub passed: bool,
    pub outcome: StepOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioResult {
    pub name: String,
    pub passed: bool,
    pub steps: Vec<StepResult>,
    /// Index of the step that stopped the run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stopped_at: Option<usize>,
    pub duration_ms: u64,
}

fn snapshot_context(store: &StateStore, variables: &ValueMap) -> EvaluationContext {
    let state: Arc<dyn EntityStore> = Arc::new(store.capture());
    EvaluationContext::new(state).with_variables(variables.clone())
}

pub struct ScenarioRunner<'a> {
    runner: &'a BehaviorRunner,
    domain: &'a CompiledDomain,
    targets: &'a TargetTable,
}

impl<'a> ScenarioRunner<'a> {
    pub fn new(runner: &'a BehaviorRunner, domain: &'a CompiledDomain, targets: &'a TargetTable) -> Self {
        Self {
            runner,
            domain,
            targets,
        }
    }

    pub async fn run(&self, scenario: &CompiledScenario, seed: &StateSeed) -> Result<ScenarioResult> {
        info!(scenario = %scenario.name, steps = scenario.steps.len(), "running scenario");
        let start = Instant::now();
        let store = StateStore::from_state(&seed.to_state());
        for entity in &self.domain.entities {
            store.declare_entity(entity);
        }
        let mut variables = ValueMap::new();
        let mut steps = Vec::with_capacity(scenario.steps.len());
        let mut stopped_at = None;

        for (index, step) in scenario.steps.iter().enumerate() {
            debug!(scenario = %scenario.name, index, "scenario step");
            let result = match step {
                CompiledStep::Invoke {
                    behavior,
                    args,
                    bind,
                    expect_failure,
                } => {
                    self.invoke(index, behavior, args, bind.as_deref(), *expect_failure, &store, &mut variables)
                        .await?
                }
                CompiledStep::Assert { condition } => {
                    let ctx = snapshot_context(&store, &variables);
                    let check = ConditionResult::evaluate(condition, &ctx);
                    StepResult {
                        index,
                        passed: check.passed,
                        message: check.evaluation_error.clone(),
                        outcome: StepOutcome::Assert { condition: check },
                    }
                }
            };
            let passed = result.passed;
            steps.push(result);
            if !passed {
                info!(scenario = %scenario.name, index, "scenario step failed, stopping");
                stopped_at = Some(index);
                break;
            }
        }

        Ok(ScenarioResult {
            name: scenario.name.clone(),
            passed: stopped_at.is_none(),
            steps,
            stopped_at,
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }

    #[allow(clippy::too_many_arguments)]
    async fn invoke(
        &self,
        index: usize,
        behavior_name: &str,
        args: &[(String, IrNode)],
        bind: Option<&str>,
        expect_failure: bool,
        store: &StateStore,
        variables: &mut ValueMap,
    ) -> Result<StepResult> {
        let behavior = self
            .domain
            .behavior(behavior_name)
            .ok_or_else(|| BindingError::UnknownBehavior(behavior_name.to_string()))?;
        let target = self
            .targets
            .get(behavior_name)
            .ok_or_else(|| BindingError::NoTarget(behavior_name.to_string()))?;

        let failed_step = |message: String| StepResult {
            index,
            passed: false,
            message: Some(message),
            outcome: StepOutcome::Invoke {
                behavior: behavior_name.to_string(),
                expect_failure,
                result: None,
            },
        };

        let ctx = snapshot_context(store, variables);
        let mut input = ValueMap::new();
        for (name, ir) in args {
            match evaluate(ir, &ctx) {
                Ok(value) => {
                    input.insert(name.clone(), value);
                }
                Err(e) => return Ok(failed_step(format!("argument '{}': {}", name, e))),
            }
        }

        let result = self.runner.run(behavior, target, input, store, variables).await?;
        let succeeded = result.passed();
        if let Some(name) = bind {
            variables.insert(
                name.to_string(),
                result.return_value.clone().unwrap_or(Value::Nil),
            );
        }
        let message = match (succeeded, expect_failure) {
            (true, true) => Some(format!("'{}' succeeded but failure was expected", behavior_name)),
            (false, false) => Some(format!("'{}' failed verification", behavior_name)),
            _ => None,
        };
        Ok(StepResult {
            index,
            passed: succeeded != expect_failure,
            message,
            outcome: StepOutcome::Invoke {
                behavior: behavior_name.to_string(),
                expect_failure,
                result: Some(Box::new(result)),
            },
        })
    }
}

#[cfg(test)]
#[path = "scenario/scenario_tests.rs"]
mod tests;
