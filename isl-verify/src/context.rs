//! Evaluation context
//!
//! Everything an IR expression may read: input bindings, the execution
//! result, the pre-execution snapshot used by `old(...)`, the current state
//! and named bindings from scenarios. Contexts are built once and then only
//! read; binding `old` or `result` produces a new context.

use crate::state::CapturedState;
use isl_core::value::{Value, ValueMap};
use std::sync::Arc;

/// Read access to entity collections and state fields
pub trait EntityStore: Send + Sync {
    fn knows_entity(&self, entity: &str) -> bool;
    fn exists(&self, entity: &str, key: Option<&Value>) -> bool;
    /// The first matching record, or `Nil`
    fn lookup(&self, entity: &str, key: Option<&Value>) -> Value;
    fn count(&self, entity: &str, key: Option<&Value>) -> usize;
    fn field(&self, name: &str) -> Option<Value>;
}

impl EntityStore for CapturedState {
    fn knows_entity(&self, entity: &str) -> bool {
        self.entities.contains_key(entity)
    }

    fn exists(&self, entity: &str, key: Option<&Value>) -> bool {
        !self.select(entity, key).is_empty()
    }

    fn lookup(&self, entity: &str, key: Option<&Value>) -> Value {
        self.select(entity, key)
            .first()
            .map(|v| (*v).clone())
            .unwrap_or(Value::Nil)
    }

    fn count(&self, entity: &str, key: Option<&Value>) -> usize {
        self.select(entity, key).len()
    }

    fn field(&self, name: &str) -> Option<Value> {
        self.fields.get(name).cloned()
    }
}

#[derive(Clone)]
pub struct EvaluationContext {
    input: Arc<ValueMap>,
    result: Option<Value>,
    old: Option<Arc<CapturedState>>,
    state: Arc<dyn EntityStore>,
    variables: ValueMap,
}

impl EvaluationContext {
    pub fn new(state: Arc<dyn EntityStore>) -> Self {
        Self {
            input: Arc::new(ValueMap::new()),
            result: None,
            old: None,
            state,
            variables: ValueMap::new(),
        }
    }

    /// A context over empty state
    pub fn empty() -> Self {
        Self::new(Arc::new(CapturedState::default()))
    }

    pub fn with_input(mut self, input: ValueMap) -> Self {
        self.input = Arc::new(input);
        self
    }

    pub fn with_result(mut self, result: Value) -> Self {
        self.result = Some(result);
        self
    }

    pub fn with_old(mut self, snapshot: Arc<CapturedState>) -> Self {
        self.old = Some(snapshot);
        self
    }

    pub fn with_state(mut self, state: Arc<dyn EntityStore>) -> Self {
        self.state = state;
        self
    }

    pub fn with_variables(mut self, variables: ValueMap) -> Self {
        self.variables.extend(variables);
        self
    }

    pub fn with_variable(mut self, name: impl Into<String>, value: Value) -> Self {
        self.variables.insert(name.into(), value);
        self
    }

    pub fn input(&self) -> &ValueMap {
        &self.input
    }

    pub fn result(&self) -> Option<&Value> {
        self.result.as_ref()
    }

    pub fn old(&self) -> Option<&Arc<CapturedState>> {
        self.old.as_ref()
    }

    pub fn state(&self) -> &dyn EntityStore {
        self.state.as_ref()
    }

    pub fn variable(&self, name: &str) -> Option<&Value> {
        self.variables.get(name)
    }
}

impl std::fmt::Debug for EvaluationContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvaluationContext")
            .field("input", &self.input)
            .field("result", &self.result)
            .field("old_bound", &self.old.is_some())
            .field("variables", &self.variables)
            .finish()
    }
}
