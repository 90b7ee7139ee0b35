//! Script values and object references.
//!
//! A [`Value`] is what script code sees: primitives are stored inline,
//! objects are referenced through a generational [`ObjectRef`] into the
//! runtime heap.

use std::borrow::Cow;
use std::fmt;
use std::rc::Rc;

/// Reference to an object living in the runtime heap.
///
/// This is a copyable generational index. A reference whose generation no
/// longer matches its heap slot points to a collected object; every heap
/// access checks this and never resolves a stale reference.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectRef {
    /// Index into the heap slot table
    pub index: u32,
    /// Generation for use-after-collection detection
    pub generation: u32,
}

impl ObjectRef {
    /// Create a new object reference.
    pub fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}@{}", self.index, self.generation)
    }
}

/// A dynamically typed script value.
#[derive(Clone, Default)]
pub enum Value {
    /// The absent value
    #[default]
    Undefined,
    /// Explicit null
    Null,
    /// Boolean value
    Bool(bool),
    /// All script numbers are double precision
    Number(f64),
    /// Immutable shared string
    String(Rc<str>),
    /// Heap object (plain object, array or function)
    Object(ObjectRef),
}

impl Value {
    /// Create a string value.
    pub fn string(s: impl AsRef<str>) -> Self {
        Value::String(Rc::from(s.as_ref()))
    }

    /// Get the primitive type tag of this value.
    ///
    /// Objects report `"object"` here; the runtime refines this into
    /// `"function"` or `"array"` through `Runtime::type_of`.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Object(_) => "object",
        }
    }

    /// Check if this value is `undefined`.
    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    /// Check if this value is `null` or `undefined`.
    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Undefined | Value::Null)
    }

    /// Get the referenced object, if this value is one.
    pub fn as_object(&self) -> Option<ObjectRef> {
        match self {
            Value::Object(object) => Some(*object),
            _ => None,
        }
    }

    /// Get the number, if this value is one.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Get the string slice, if this value is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Strict identity comparison.
    ///
    /// Objects compare by reference, numbers by IEEE equality (so `0` equals
    /// `-0` and `NaN` equals nothing), everything else by value.
    pub fn strict_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a == b,
            _ => false,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.strict_equals(other)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => write!(f, "Undefined"),
            Value::Null => write!(f, "Null"),
            Value::Bool(v) => write!(f, "Bool({})", v),
            Value::Number(v) => write!(f, "Number({})", v),
            Value::String(s) => write!(f, "String({:?})", s),
            Value::Object(o) => write!(f, "Object({})", o),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Number(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::string(value)
    }
}

impl From<ObjectRef> for Value {
    fn from(value: ObjectRef) -> Self {
        Value::Object(value)
    }
}

/// Key into a hidden per-object map.
///
/// Hidden maps are invisible to property enumeration and lookup; they exist
/// so native code can attach script values to an object's lifetime.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum HiddenKey {
    /// Named entry (property names, signal names)
    Name(Cow<'static, str>),
    /// Numeric entry (connection ids)
    Index(u64),
    /// Object-keyed entry; the key object is kept alive with the value
    Object(ObjectRef),
}

impl From<&'static str> for HiddenKey {
    fn from(value: &'static str) -> Self {
        HiddenKey::Name(Cow::Borrowed(value))
    }
}

impl From<String> for HiddenKey {
    fn from(value: String) -> Self {
        HiddenKey::Name(Cow::Owned(value))
    }
}

impl From<u64> for HiddenKey {
    fn from(value: u64) -> Self {
        HiddenKey::Index(value)
    }
}

impl From<ObjectRef> for HiddenKey {
    fn from(value: ObjectRef) -> Self {
        HiddenKey::Object(value)
    }
}

impl fmt::Display for HiddenKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HiddenKey::Name(name) => f.write_str(name),
            HiddenKey::Index(index) => write!(f, "{}", index),
            HiddenKey::Object(object) => write!(f, "{}", object),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_type_names() {
        assert_eq!(Value::Undefined.type_name(), "undefined");
        assert_eq!(Value::Null.type_name(), "null");
        assert_eq!(Value::Bool(true).type_name(), "boolean");
        assert_eq!(Value::Number(1.0).type_name(), "number");
        assert_eq!(Value::string("x").type_name(), "string");
        assert_eq!(Value::Object(ObjectRef::new(0, 0)).type_name(), "object");
    }

    #[test]
    fn value_nullish() {
        assert!(Value::Undefined.is_nullish());
        assert!(Value::Null.is_nullish());
        assert!(!Value::Bool(false).is_nullish());
        assert!(!Value::Number(0.0).is_nullish());
    }

    #[test]
    fn strict_equals_numbers() {
        assert!(Value::Number(0.0).strict_equals(&Value::Number(-0.0)));
        assert!(!Value::Number(f64::NAN).strict_equals(&Value::Number(f64::NAN)));
    }

    #[test]
    fn strict_equals_objects_by_reference() {
        let a = Value::Object(ObjectRef::new(1, 0));
        let b = Value::Object(ObjectRef::new(1, 1));
        assert!(a.strict_equals(&a.clone()));
        assert!(!a.strict_equals(&b));
    }

    #[test]
    fn strings_compare_by_content() {
        assert_eq!(Value::string("héllo"), Value::from("héllo"));
        assert_ne!(Value::string(""), Value::Undefined);
    }

    #[test]
    fn hidden_key_display() {
        assert_eq!(HiddenKey::from("members").to_string(), "members");
        assert_eq!(HiddenKey::from(7u64).to_string(), "7");
    }

    #[test]
    fn value_debug() {
        assert!(format!("{:?}", Value::string("a")).contains("\"a\""));
        assert!(format!("{:?}", Value::Number(3.5)).contains("3.5"));
    }
}
