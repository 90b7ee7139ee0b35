//! Exceptions raised inside the scripting runtime.

use thiserror::Error;

use crate::value::Value;

/// A script-level exception.
///
/// Native functions return `Err(Exception)` to throw; the runtime hands it
/// back to whoever made the call.
#[derive(Debug, Clone, Error)]
pub enum Exception {
    /// Wrong type of value for an operation
    #[error("TypeError: {0}")]
    TypeError(String),

    /// Numeric value out of the permitted range
    #[error("RangeError: {0}")]
    RangeError(String),

    /// Generic error with a message
    #[error("Error: {0}")]
    Error(String),

    /// Arbitrary value thrown by script code
    #[error("uncaught exception: {0:?}")]
    Thrown(Value),
}

impl Exception {
    /// Create a type error.
    pub fn type_error(message: impl Into<String>) -> Self {
        Exception::TypeError(message.into())
    }

    /// Create a range error.
    pub fn range_error(message: impl Into<String>) -> Self {
        Exception::RangeError(message.into())
    }

    /// Create a generic error.
    pub fn error(message: impl Into<String>) -> Self {
        Exception::Error(message.into())
    }

    /// Check if this is a `TypeError`.
    pub fn is_type_error(&self) -> bool {
        matches!(self, Exception::TypeError(_))
    }

    /// Message text without the error kind prefix.
    pub fn message(&self) -> String {
        match self {
            Exception::TypeError(m) | Exception::RangeError(m) | Exception::Error(m) => m.clone(),
            Exception::Thrown(value) => match value {
                Value::String(s) => s.to_string(),
                other => format!("{:?}", other),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_kind() {
        let e = Exception::type_error("bad");
        assert_eq!(e.to_string(), "TypeError: bad");
        assert!(e.is_type_error());
        assert_eq!(e.message(), "bad");
    }

    #[test]
    fn thrown_string_message() {
        let e = Exception::Thrown(Value::string("boom"));
        assert_eq!(e.message(), "boom");
        assert!(!e.is_type_error());
    }

    #[test]
    fn range_error_display() {
        assert_eq!(Exception::range_error("x").to_string(), "RangeError: x");
    }
}
