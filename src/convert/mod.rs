//! Type conversion registry.
//!
//! Every type that crosses the boundary implements [`ToScript`],
//! [`FromScript`] or both. The registry is the trait system itself: looking
//! up the converter for a type is resolving its trait impl.
//!
//! ```text
//!   native ──ToScript──▶ Value ──FromScript──▶ native
//!     i32, String, Option<T>, Vec<T>, PointF, Color, enums,
//!     Rc<T: NativeClass> (wrap), NativeRef<T> (unwrap)
//! ```
//!
//! Composite values convert through named fields. A *required* read fails
//! when a field is absent; a *read-if-present* leaves the output untouched.

mod enums;
mod geometry;
mod primitives;

pub use enums::{ScriptEnum, enum_from_script, enum_to_script};
pub use geometry::{Color, PointF, RectF, SizeF, Vector2dF};
pub use primitives::read_vec_into;

use scriptbridge_core::{ObjectRef, Value};

use crate::context::Context;
use crate::error::ConversionError;

/// Convert from a script value to a native type.
///
/// # Example
///
/// ```ignore
/// impl FromScript for Meters {
///     const TYPE_NAME: &'static str = "Meters";
///
///     fn from_script(ctx: &Context, value: &Value) -> Result<Self, ConversionError> {
///         f64::from_script(ctx, value).map(Meters)
///     }
/// }
/// ```
pub trait FromScript: Sized {
    /// Native type name reported in conversion errors.
    const TYPE_NAME: &'static str;

    /// Convert `value`, failing with the received and expected type names.
    fn from_script(ctx: &Context, value: &Value) -> Result<Self, ConversionError>;

    /// Convert `value` into an existing native value.
    ///
    /// The default replaces `out` only on success. Composite types override
    /// this with field-wise read-if-present semantics.
    fn read_into(ctx: &Context, value: &Value, out: &mut Self) -> Result<(), ConversionError> {
        *out = Self::from_script(ctx, value)?;
        Ok(())
    }
}

/// Convert from a native type to a script value.
///
/// Value types never fail; object types may.
pub trait ToScript {
    /// Convert this value.
    fn to_script(self, ctx: &Context) -> Result<Value, ConversionError>;
}

/// Build a type mismatch error for `value` against `T`.
pub fn mismatch<T: FromScript>(ctx: &Context, value: &Value) -> ConversionError {
    ConversionError::TypeMismatch {
        expected: T::TYPE_NAME,
        actual: ctx.runtime().type_of(value),
    }
}

/// Require `value` to be an object, reporting `T` as the expected type.
pub fn expect_object<T: FromScript>(ctx: &Context, value: &Value) -> Result<ObjectRef, ConversionError> {
    match value {
        Value::Object(object) if !ctx.runtime().is_function(value) => Ok(*object),
        _ => Err(mismatch::<T>(ctx, value)),
    }
}

/// Read a required field of a composite value.
pub fn read_field<T: FromScript>(
    ctx: &Context,
    object: ObjectRef,
    field: &'static str,
    target_type: &'static str,
) -> Result<T, ConversionError> {
    let value = ctx.runtime().get(object, field)?;
    if value.is_undefined() {
        return Err(ConversionError::MissingField { field, target_type });
    }
    T::from_script(ctx, &value)
}

/// Read a field if it is present. Returns whether it was.
pub fn read_field_if_present<T: FromScript>(
    ctx: &Context,
    object: ObjectRef,
    field: &'static str,
    out: &mut T,
) -> Result<bool, ConversionError> {
    let value = ctx.runtime().get(object, field)?;
    if value.is_undefined() {
        return Ok(false);
    }
    T::read_into(ctx, &value, out)?;
    Ok(true)
}

/// Write a named field of a composite value.
pub fn write_field<T: ToScript>(
    ctx: &Context,
    object: ObjectRef,
    field: &'static str,
    value: T,
) -> Result<(), ConversionError> {
    let value = value.to_script(ctx)?;
    ctx.runtime().set(object, field, value)?;
    Ok(())
}

/// Convert a tuple of native values into call arguments.
pub trait ToScriptArgs {
    /// Convert each element in order.
    fn to_script_args(self, ctx: &Context) -> Result<Vec<Value>, ConversionError>;
}

/// Convert call arguments into a tuple of native values.
pub trait FromScriptArgs: Sized {
    /// Convert `args` positionally; missing trailing arguments read as
    /// `undefined`.
    fn from_script_args(ctx: &Context, args: &[Value]) -> Result<Self, ConversionError>;
}

macro_rules! impl_script_args {
    ($($arg:ident => $index:tt),*) => {
        impl<$($arg: ToScript),*> ToScriptArgs for ($($arg,)*) {
            #[allow(unused_variables)]
            fn to_script_args(self, ctx: &Context) -> Result<Vec<Value>, ConversionError> {
                Ok(vec![$(self.$index.to_script(ctx)?),*])
            }
        }

        impl<$($arg: FromScript),*> FromScriptArgs for ($($arg,)*) {
            #[allow(unused_variables)]
            fn from_script_args(ctx: &Context, args: &[Value]) -> Result<Self, ConversionError> {
                Ok(($(
                    $arg::from_script(ctx, args.get($index).unwrap_or(&Value::Undefined))?,
                )*))
            }
        }
    };
}

impl_script_args!();
impl_script_args!(A0 => 0);
impl_script_args!(A0 => 0, A1 => 1);
impl_script_args!(A0 => 0, A1 => 1, A2 => 2);
impl_script_args!(A0 => 0, A1 => 1, A2 => 2, A3 => 3);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_field_required_and_optional() {
        let ctx = Context::new();
        let rt = ctx.runtime();
        let o = rt.new_object();
        rt.set(o, "x", Value::Number(4.0)).unwrap();

        let x: f64 = read_field(&ctx, o, "x", "Test").unwrap();
        assert_eq!(x, 4.0);
        let err = read_field::<f64>(&ctx, o, "y", "Test").unwrap_err();
        assert!(matches!(err, ConversionError::MissingField { field: "y", .. }));

        let mut y = 9.0f64;
        assert!(!read_field_if_present(&ctx, o, "y", &mut y).unwrap());
        assert_eq!(y, 9.0);
        assert!(read_field_if_present(&ctx, o, "x", &mut y).unwrap());
        assert_eq!(y, 4.0);
    }

    #[test]
    fn expect_object_rejects_functions_and_primitives() {
        let ctx = Context::new();
        let f = ctx.runtime().new_function("f", |_, _, _| Ok(Value::Undefined));
        assert!(expect_object::<PointF>(&ctx, &Value::Object(f)).is_err());
        assert!(expect_object::<PointF>(&ctx, &Value::Number(1.0)).is_err());
    }

    #[test]
    fn tuple_arguments() {
        let ctx = Context::new();
        let args = (1i32, String::from("a"), true).to_script_args(&ctx).unwrap();
        assert_eq!(args.len(), 3);
        let (a, b, c) = <(i32, String, bool)>::from_script_args(&ctx, &args).unwrap();
        assert_eq!((a, b.as_str(), c), (1, "a", true));
        assert!(().to_script_args(&ctx).unwrap().is_empty());
    }

    #[test]
    fn missing_tuple_argument_reads_undefined() {
        let ctx = Context::new();
        let (a, b) = <(i32, Option<String>)>::from_script_args(&ctx, &[Value::Number(2.0)]).unwrap();
        assert_eq!(a, 2);
        assert!(b.is_none());
    }
}
