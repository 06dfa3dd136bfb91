//! Value-related error types

use std::fmt;

/// Errors that can occur when operating on contract values
#[derive(Debug, Clone, PartialEq)]
pub enum ValueError {
    /// Type mismatch error
    TypeError {
        expected: &'static str,
        actual: &'static str,
    },

    /// Operands of a binary operation have incompatible types
    IncompatibleOperands {
        op: &'static str,
        left: &'static str,
        right: &'static str,
    },

    /// Index out of bounds
    IndexOutOfBounds { index: i64, length: usize },

    /// Division by zero
    DivisionByZero,

    /// Arithmetic overflowed the integer range
    Overflow(&'static str),

    /// JSON payload could not be converted into a value
    Conversion(String),
}

impl fmt::Display for ValueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueError::TypeError { expected, actual } => {
                write!(f, "Type error: expected {}, got {}", expected, actual)
            }
            ValueError::IncompatibleOperands { op, left, right } => {
                write!(f, "Cannot apply '{}' to {} and {}", op, left, right)
            }
            ValueError::IndexOutOfBounds { index, length } => {
                write!(
                    f,
                    "Index {} out of bounds for list of length {}",
                    index, length
                )
            }
            ValueError::DivisionByZero => write!(f, "Division by zero"),
            ValueError::Overflow(op) => write!(f, "Integer overflow in '{}'", op),
            ValueError::Conversion(msg) => write!(f, "Cannot convert value: {}", msg),
        }
    }
}

impl std::error::Error for ValueError {}

/// Result type for value operations
pub type ValueResult<T> = Result<T, ValueError>;
