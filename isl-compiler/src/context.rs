//! Compilation context
//!
//! A context is an immutable value. Entering a quantifier body, a lambda or
//! `old(...)` produces a new context; the caller's context is untouched, so a
//! bound name is never visible outside the node that binds it.

use std::collections::BTreeSet;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct CompilationContext {
    entities: Arc<BTreeSet<String>>,
    variables: BTreeSet<String>,
    in_old: bool,
    in_postcondition: bool,
}

impl CompilationContext {
    pub fn new<I, S>(entities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            entities: Arc::new(entities.into_iter().map(Into::into).collect()),
            ..Self::default()
        }
    }

    /// Context for postconditions: `result` and `old(...)` become available
    pub fn for_postcondition(&self) -> Self {
        Self {
            in_postcondition: true,
            ..self.clone()
        }
    }

    /// Context for the inner expression of `old(...)`
    pub fn entering_old(&self) -> Self {
        Self {
            in_old: true,
            ..self.clone()
        }
    }

    /// Context with `name` added to the lexical scope
    pub fn with_variable(&self, name: impl Into<String>) -> Self {
        let mut next = self.clone();
        next.variables.insert(name.into());
        next
    }

    pub fn with_variables<I, S>(&self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut next = self.clone();
        next.variables.extend(names.into_iter().map(Into::into));
        next
    }

    pub fn is_entity(&self, name: &str) -> bool {
        self.entities.contains(name)
    }

    pub fn is_variable(&self, name: &str) -> bool {
        self.variables.contains(name)
    }

    pub fn in_old(&self) -> bool {
        self.in_old
    }

    pub fn in_postcondition(&self) -> bool {
        self.in_postcondition
    }

    pub fn entities(&self) -> impl Iterator<Item = &str> {
        self.entities.iter().map(String::as_str)
    }
}
