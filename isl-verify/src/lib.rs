//! Contract verification runtime
//!
//! Executes implementations under test in a sandbox and checks them against
//! compiled contracts:
//!
//! - [`evaluator`] evaluates IR against an [`EvaluationContext`]
//! - [`sandbox`] runs a target under a timeout and records what it touched
//! - [`orchestrator`] drives one behavior through its verification phases
//! - [`scenario`] runs ordered multi-step scenarios
//! - [`report`] scores the evidence and [`gate`] turns it into a verdict
//! - [`verify::Verifier`] ties the pipeline together

pub mod bindings;
pub mod config;
pub mod context;
pub mod errors;
pub mod evaluator;
pub mod gate;
pub mod logging;
pub mod orchestrator;
pub mod report;
pub mod sandbox;
pub mod scenario;
pub mod state;
pub mod trace;
pub mod verify;

pub use bindings::{load_fixtures, validate_inputs, BehaviorFixture, BindingSource, FixtureSet, StateSeed};
pub use config::{load_options, ReportFormat, Thresholds, VerifyOptions};
pub use context::{EntityStore, EvaluationContext};
pub use errors::{
    BindingError, EvaluationError, Result, SandboxError, TimeoutError, VerificationError,
};
pub use evaluator::{evaluate, evaluate_condition};
pub use gate::{decide_gate, decide_gate_with_thresholds, GateVerdict, Reason, VerifyResult};
pub use logging::init_tracing;
pub use orchestrator::{BehaviorResult, BehaviorRunner, ConditionResult, Phase};
pub use report::{Finding, FindingKind, Impact, VerificationReport};
pub use sandbox::{
    target_fn, Loader, ModuleRegistry, Sandbox, SandboxHandle, TargetError, TargetFn, TargetRef,
};
pub use scenario::{ScenarioResult, ScenarioRunner, TargetTable};
pub use state::{diff, CapturedState, StateDiff, StateStore};
pub use trace::{ExecutionTrace, TraceRecorder};
pub use verify::{load_domain, Verifier};
