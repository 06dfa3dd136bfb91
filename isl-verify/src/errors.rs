//! Verification error taxonomy
//!
//! Only [`CompilerError`], [`BindingError`] and [`SandboxError`] abort a run.
//! [`EvaluationError`] and [`TimeoutError`] are recorded on the affected
//! condition or behavior; [`VerificationError`] wraps any of them for the
//! caller.

use isl_compiler::CompilerError;
use isl_core::value::ValueError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Missing or malformed input data
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BindingError {
    /// A required input declared by the behavior has no value
    #[error("Behavior '{behavior}' requires input '{field}'")]
    MissingInput { behavior: String, field: String },

    /// An input value does not match its declared type
    #[error("Input '{field}' of '{behavior}' expects {expected}, got {actual}")]
    InputType {
        behavior: String,
        field: String,
        expected: String,
        actual: &'static str,
    },

    /// Fixture data could not be parsed
    #[error("Malformed fixture data: {0}")]
    Malformed(String),

    /// Fixture file could not be read
    #[error("Cannot read fixtures from {}: {message}", path.display())]
    Io { path: PathBuf, message: String },

    /// A fixture or scenario names a behavior with no target implementation
    #[error("No target implementation bound for behavior '{0}'")]
    NoTarget(String),

    /// A fixture names a behavior the domain does not declare
    #[error("Fixture refers to unknown behavior '{0}'")]
    UnknownBehavior(String),
}

/// A condition could not be evaluated
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvaluationError {
    #[error("Unbound variable '{0}'")]
    UnboundVariable(String),

    #[error("Unknown entity '{0}'")]
    UnknownEntity(String),

    #[error("old(...) evaluated before the pre-execution snapshot was bound")]
    OldNotBound,

    #[error("result is not bound")]
    ResultNotBound,

    #[error("Expected boolean in {context}, got {actual}")]
    NotBoolean {
        context: &'static str,
        actual: &'static str,
    },

    #[error("'{op}' cannot be applied to {actual}")]
    TypeMismatch {
        op: &'static str,
        actual: &'static str,
    },

    #[error("Unknown function '{0}'")]
    UnknownFunction(String),

    #[error("'{name}' expects {expected} argument(s), got {actual}")]
    Arity {
        name: String,
        expected: usize,
        actual: usize,
    },

    #[error("Invalid regular expression '{pattern}': {message}")]
    InvalidRegex { pattern: String, message: String },

    #[error(transparent)]
    Value(#[from] ValueError),
}

/// Sandboxed execution exceeded its budget
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("Execution of '{target}' timed out after {timeout_ms}ms")]
pub struct TimeoutError {
    pub target: String,
    pub timeout_ms: u64,
}

/// The isolation boundary itself failed
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SandboxError {
    #[error("Module '{0}' could not be loaded")]
    ModuleNotFound(String),

    #[error("Module '{module}' has no export '{export}'")]
    ExportNotFound { module: String, export: String },

    #[error("No async runtime available for sandboxed execution")]
    RuntimeUnavailable,

    #[error("Sandbox worker failed: {0}")]
    Worker(String),
}

/// Top-level verification error
#[derive(Error, Debug, Clone, PartialEq)]
pub enum VerificationError {
    #[error("Compilation failed: {0}")]
    Compiler(#[from] CompilerError),

    #[error("Binding failed: {0}")]
    Binding(#[from] BindingError),

    #[error("Evaluation failed: {0}")]
    Evaluation(#[from] EvaluationError),

    #[error(transparent)]
    Timeout(#[from] TimeoutError),

    #[error("Sandbox failure: {0}")]
    Sandbox(#[from] SandboxError),
}

/// Result type for verification operations
pub type Result<T> = std::result::Result<T, VerificationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = BindingError::MissingInput {
            behavior: "Withdraw".into(),
            field: "amount".into(),
        };
        assert_eq!(err.to_string(), "Behavior 'Withdraw' requires input 'amount'");

        assert_eq!(EvaluationError::ResultNotBound.to_string(), "result is not bound");

        let timeout = TimeoutError {
            target: "bank::withdraw".into(),
            timeout_ms: 50,
        };
        assert_eq!(
            VerificationError::from(timeout).to_string(),
            "Execution of 'bank::withdraw' timed out after 50ms"
        );
    }

    #[test]
    fn test_value_errors_convert() {
        let err: EvaluationError = ValueError::DivisionByZero.into();
        assert_eq!(err.to_string(), "Division by zero");
        let top: VerificationError = err.into();
        assert!(matches!(top, VerificationError::Evaluation(_)));
    }
}
