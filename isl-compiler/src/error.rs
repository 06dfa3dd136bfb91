//! Compiler error types

use isl_core::ast::{Expr, SourceLocation};
use thiserror::Error;

fn at(location: &Option<SourceLocation>) -> String {
    match location {
        Some(loc) => format!(" at {}", loc),
        None => String::new(),
    }
}

/// A construct that has no IR mapping, or is used where it is not allowed.
///
/// Every variant that originates from an expression carries the offending
/// surface node.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CompilerError {
    /// Surface node kind with no IR mapping
    #[error("Unsupported {}{}", node.kind.name(), at(&node.location))]
    Unsupported { node: Box<Expr> },

    /// `result` referenced outside a postcondition
    #[error("'result' is only available in postconditions{}", at(&node.location))]
    ResultOutsidePostcondition { node: Box<Expr> },

    /// `result` referenced inside `old(...)`
    #[error("'result' cannot be referenced inside old(...){}", at(&node.location))]
    ResultInsideOld { node: Box<Expr> },

    /// `old(...)` outside a postcondition
    #[error("old(...) is only available in postconditions{}", at(&node.location))]
    OldOutsidePostcondition { node: Box<Expr> },

    /// `input` used as a value rather than through a field
    #[error("'input' must be accessed through a field{}", at(&node.location))]
    BareInput { node: Box<Expr> },

    /// An entity name used where a value is expected
    #[error("Entity '{entity}' cannot be used as a value{}", at(&node.location))]
    EntityAsValue { entity: String, node: Box<Expr> },

    /// A method expecting a single-parameter lambda got something else
    #[error("'{method}' expects a single-parameter lambda{}", at(&node.location))]
    InvalidLambda { method: String, node: Box<Expr> },

    /// Wrong number of arguments for a recognised method
    #[error(
        "'{method}' expects {expected} argument(s), got {actual}{}",
        at(&node.location)
    )]
    Arity {
        method: String,
        expected: usize,
        actual: usize,
        node: Box<Expr>,
    },

    /// A literal that does not fit the IR's numeric range
    #[error("Literal out of range{}", at(&node.location))]
    LiteralOverflow { node: Box<Expr> },

    /// A temporal bound that is not a constant duration
    #[error("Temporal bound must be a constant duration{}", at(&node.location))]
    InvalidTemporalBound { node: Box<Expr> },

    /// Scenario step invoking an undeclared behavior
    #[error("Scenario '{scenario}' invokes unknown behavior '{behavior}'")]
    UnknownBehavior { scenario: String, behavior: String },
}

impl CompilerError {
    /// The surface node that caused the error, if any
    pub fn node(&self) -> Option<&Expr> {
        match self {
            CompilerError::Unsupported { node }
            | CompilerError::ResultOutsidePostcondition { node }
            | CompilerError::ResultInsideOld { node }
            | CompilerError::OldOutsidePostcondition { node }
            | CompilerError::BareInput { node }
            | CompilerError::EntityAsValue { node, .. }
            | CompilerError::InvalidLambda { node, .. }
            | CompilerError::Arity { node, .. }
            | CompilerError::LiteralOverflow { node }
            | CompilerError::InvalidTemporalBound { node } => Some(node),
            CompilerError::UnknownBehavior { .. } => None,
        }
    }

    pub fn location(&self) -> Option<&SourceLocation> {
        self.node().and_then(|n| n.location.as_ref())
    }
}

/// Result type for compilation
pub type Result<T> = std::result::Result<T, CompilerError>;
