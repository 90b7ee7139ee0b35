//! Error types for the bridge.
//!
//! [`ConversionError`] is local to a single value conversion. [`BridgeError`]
//! is what bridge entry points return; it turns into a script-visible
//! [`Exception`] at the call boundary.

use scriptbridge_core::Exception;
use thiserror::Error;

/// Errors that can occur when converting between native and script values.
#[derive(Debug, Clone, Error)]
pub enum ConversionError {
    /// Value has the wrong script type
    #[error("type mismatch: expected {expected}, got {actual}")]
    TypeMismatch {
        expected: &'static str,
        actual: &'static str,
    },

    /// Number does not fit the target integer type
    #[error("integer overflow: value {value} does not fit in {target_type}")]
    IntegerOverflow { value: f64, target_type: &'static str },

    /// String not present in an enum's table
    #[error("invalid value '{value}' for enum {enum_name}")]
    InvalidEnumValue {
        value: String,
        enum_name: &'static str,
    },

    /// Required field absent from a composite value
    #[error("missing required field '{field}' for {target_type}")]
    MissingField {
        field: &'static str,
        target_type: &'static str,
    },

    /// String with the right type but an unparseable format
    #[error("invalid {target_type} literal '{value}'")]
    InvalidFormat {
        value: String,
        target_type: &'static str,
    },

    /// Native value with no script representation
    #[error("no script representation for {target_type}")]
    UnsupportedValue { target_type: &'static str },

    /// Weakly held native object is gone
    #[error("{type_name} object has been destroyed")]
    ObjectDestroyed { type_name: &'static str },

    /// Script code threw while a value was being read
    #[error(transparent)]
    Script(#[from] Exception),
}

/// Errors raised by bridge operations.
#[derive(Debug, Clone, Error)]
pub enum BridgeError {
    /// An argument could not be converted to its parameter type
    #[error(
        "Error processing argument at index {index}, conversion failure from {actual} to {expected}"
    )]
    ArgumentConversion {
        index: usize,
        actual: &'static str,
        expected: &'static str,
        #[source]
        source: ConversionError,
    },

    /// Too few arguments for a parameter with no default
    #[error("Insufficient number of arguments: expected {expected}, got {actual}")]
    ArgumentCount { expected: usize, actual: usize },

    /// Operation on a handle whose scripting owner was collected
    #[error("cannot {operation}: owner object has been collected")]
    OwnerCollected { operation: &'static str },

    /// Native value with no script representation
    #[error("{type_name} has no script representation")]
    UnsupportedValue { type_name: &'static str },

    /// String not present in an enum's table
    #[error("invalid value '{value}' for enum {enum_name}")]
    InvalidEnumValue {
        value: String,
        enum_name: &'static str,
    },

    /// Value of the wrong type where a native object was expected
    #[error("type mismatch: expected {expected}, got {actual}")]
    TypeMismatch {
        expected: &'static str,
        actual: &'static str,
    },

    /// Weakly held native object is gone
    #[error("{type_name} object has been destroyed")]
    ObjectDestroyed { type_name: &'static str },

    /// Script tried to construct a class that has no public constructor
    #[error("{class} cannot be constructed from script")]
    InternalConstructor { class: &'static str },

    /// A constructor was invoked on an object that already wraps a native
    #[error("{class} constructor called on an already constructed object")]
    AlreadyConstructed { class: &'static str },

    /// A class was registered with the same member name twice
    #[error("duplicate member '{name}' on class {class}")]
    DuplicateMember { class: &'static str, name: String },

    /// A class appears in its own base chain
    #[error("class {class} inherits from itself")]
    CyclicInheritance { class: &'static str },

    /// Re-entrant calls nested deeper than the configured limit
    #[error("maximum call depth {limit} exceeded")]
    CallDepthExceeded { limit: usize },

    /// The owning context was dropped
    #[error("runtime context has been destroyed")]
    ContextDestroyed,

    /// Any other conversion failure
    #[error("conversion error: {0}")]
    Conversion(ConversionError),

    /// Exception thrown by script code
    #[error(transparent)]
    Script(Exception),
}

impl BridgeError {
    /// Create an owner-collected error for the named operation.
    pub fn owner_collected(operation: &'static str) -> Self {
        BridgeError::OwnerCollected { operation }
    }
}

impl From<ConversionError> for BridgeError {
    fn from(err: ConversionError) -> Self {
        match err {
            ConversionError::TypeMismatch { expected, actual } => {
                BridgeError::TypeMismatch { expected, actual }
            }
            ConversionError::InvalidEnumValue { value, enum_name } => {
                BridgeError::InvalidEnumValue { value, enum_name }
            }
            ConversionError::UnsupportedValue { target_type } => BridgeError::UnsupportedValue {
                type_name: target_type,
            },
            ConversionError::ObjectDestroyed { type_name } => {
                BridgeError::ObjectDestroyed { type_name }
            }
            ConversionError::Script(exception) => BridgeError::Script(exception),
            other => BridgeError::Conversion(other),
        }
    }
}

impl From<Exception> for BridgeError {
    fn from(err: Exception) -> Self {
        BridgeError::Script(err)
    }
}

impl From<BridgeError> for Exception {
    fn from(err: BridgeError) -> Self {
        match err {
            BridgeError::Script(exception) => exception,
            BridgeError::CallDepthExceeded { .. } => {
                Exception::range_error("Maximum call stack size exceeded")
            }
            other => Exception::type_error(other.to_string()),
        }
    }
}
