//! Conversions for primitive and container types.

use scriptbridge_core::Value;

use super::{FromScript, ToScript, mismatch};
use crate::context::Context;
use crate::error::ConversionError;

// =============================================================================
// Unit, bool, strings
// =============================================================================

impl FromScript for () {
    const TYPE_NAME: &'static str = "undefined";

    fn from_script(_ctx: &Context, _value: &Value) -> Result<Self, ConversionError> {
        Ok(())
    }
}

impl ToScript for () {
    fn to_script(self, _ctx: &Context) -> Result<Value, ConversionError> {
        Ok(Value::Undefined)
    }
}

impl FromScript for bool {
    const TYPE_NAME: &'static str = "Boolean";

    fn from_script(ctx: &Context, value: &Value) -> Result<Self, ConversionError> {
        match value {
            Value::Bool(v) => Ok(*v),
            _ => Err(mismatch::<Self>(ctx, value)),
        }
    }
}

impl ToScript for bool {
    fn to_script(self, _ctx: &Context) -> Result<Value, ConversionError> {
        Ok(Value::Bool(self))
    }
}

impl FromScript for String {
    const TYPE_NAME: &'static str = "String";

    fn from_script(ctx: &Context, value: &Value) -> Result<Self, ConversionError> {
        match value {
            Value::String(s) => Ok(s.to_string()),
            _ => Err(mismatch::<Self>(ctx, value)),
        }
    }
}

impl ToScript for String {
    fn to_script(self, _ctx: &Context) -> Result<Value, ConversionError> {
        Ok(Value::string(self))
    }
}

impl ToScript for &str {
    fn to_script(self, _ctx: &Context) -> Result<Value, ConversionError> {
        Ok(Value::string(self))
    }
}

// =============================================================================
// Numbers
// =============================================================================

impl FromScript for f64 {
    const TYPE_NAME: &'static str = "Number";

    fn from_script(ctx: &Context, value: &Value) -> Result<Self, ConversionError> {
        value.as_number().ok_or_else(|| mismatch::<Self>(ctx, value))
    }
}

impl ToScript for f64 {
    fn to_script(self, _ctx: &Context) -> Result<Value, ConversionError> {
        Ok(Value::Number(self))
    }
}

impl FromScript for f32 {
    const TYPE_NAME: &'static str = "Number";

    fn from_script(ctx: &Context, value: &Value) -> Result<Self, ConversionError> {
        f64::from_script(ctx, value).map(|v| v as f32)
    }
}

impl ToScript for f32 {
    fn to_script(self, _ctx: &Context) -> Result<Value, ConversionError> {
        Ok(Value::Number(self as f64))
    }
}

/// Truncate toward zero and range check against `[min, end)`.
///
/// The upper bound is exclusive: `i64::MAX as f64` rounds up to 2^63.
fn to_integer(value: f64, min: f64, end: f64, target_type: &'static str) -> Result<f64, ConversionError> {
    let truncated = value.trunc();
    if !truncated.is_finite() || truncated < min || truncated >= end {
        return Err(ConversionError::IntegerOverflow { value, target_type });
    }
    Ok(truncated)
}

macro_rules! impl_integer {
    ($($ty:ty => $name:literal),* $(,)?) => {
        $(
            impl FromScript for $ty {
                const TYPE_NAME: &'static str = $name;

                fn from_script(ctx: &Context, value: &Value) -> Result<Self, ConversionError> {
                    let n = value.as_number().ok_or_else(|| mismatch::<Self>(ctx, value))?;
                    let value_bits = if <$ty>::MIN == 0 { <$ty>::BITS } else { <$ty>::BITS - 1 };
                    let end = 2f64.powi(value_bits as i32);
                    let n = to_integer(n, <$ty>::MIN as f64, end, $name)?;
                    Ok(n as $ty)
                }
            }

            impl ToScript for $ty {
                fn to_script(self, _ctx: &Context) -> Result<Value, ConversionError> {
                    Ok(Value::Number(self as f64))
                }
            }
        )*
    };
}

impl_integer!(
    i8 => "int8",
    i16 => "int16",
    i32 => "int32",
    i64 => "int64",
    isize => "int",
    u8 => "uint8",
    u16 => "uint16",
    u32 => "uint32",
    u64 => "uint64",
    usize => "uint",
);

// =============================================================================
// Value passthrough
// =============================================================================

impl FromScript for Value {
    const TYPE_NAME: &'static str = "any";

    fn from_script(_ctx: &Context, value: &Value) -> Result<Self, ConversionError> {
        Ok(value.clone())
    }
}

impl ToScript for Value {
    fn to_script(self, _ctx: &Context) -> Result<Value, ConversionError> {
        Ok(self)
    }
}

// =============================================================================
// Option and Vec
// =============================================================================

impl<T: FromScript> FromScript for Option<T> {
    const TYPE_NAME: &'static str = T::TYPE_NAME;

    fn from_script(ctx: &Context, value: &Value) -> Result<Self, ConversionError> {
        if value.is_nullish() {
            return Ok(None);
        }
        T::from_script(ctx, value).map(Some)
    }
}

impl<T: ToScript> ToScript for Option<T> {
    fn to_script(self, ctx: &Context) -> Result<Value, ConversionError> {
        match self {
            Some(value) => value.to_script(ctx),
            None => Ok(Value::Null),
        }
    }
}

impl<T: FromScript> FromScript for Vec<T> {
    const TYPE_NAME: &'static str = "Array";

    /// Atomic: any element failing fails the whole read.
    fn from_script(ctx: &Context, value: &Value) -> Result<Self, ConversionError> {
        let elements = value
            .as_object()
            .and_then(|array| ctx.runtime().array_elements(array))
            .ok_or_else(|| mismatch::<Self>(ctx, value))?;
        elements
            .iter()
            .map(|element| T::from_script(ctx, element))
            .collect()
    }
}

impl<T: ToScript> ToScript for Vec<T> {
    fn to_script(self, ctx: &Context) -> Result<Value, ConversionError> {
        let items = self
            .into_iter()
            .map(|item| item.to_script(ctx))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Value::Object(ctx.runtime().new_array(items)))
    }
}

/// Read an array element by element into `out`.
///
/// Unlike the atomic `Vec<T>` conversion, elements converted before a
/// failing one stay in `out`. `out` is cleared first.
pub fn read_vec_into<T: FromScript>(
    ctx: &Context,
    value: &Value,
    out: &mut Vec<T>,
) -> Result<(), ConversionError> {
    let elements = value
        .as_object()
        .and_then(|array| ctx.runtime().array_elements(array))
        .ok_or_else(|| mismatch::<Vec<T>>(ctx, value))?;
    out.clear();
    for element in &elements {
        out.push(T::from_script(ctx, element)?);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip<T: ToScript + FromScript + Clone>(ctx: &Context, value: T) -> T {
        let script = value.to_script(ctx).unwrap();
        T::from_script(ctx, &script).unwrap()
    }

    #[test]
    fn numbers_round_trip() {
        let ctx = Context::new();
        assert_eq!(round_trip(&ctx, 0.0f64), 0.0);
        let negative_zero = round_trip(&ctx, -0.0f64);
        assert!(negative_zero == 0.0 && negative_zero.is_sign_negative());
        assert_eq!(round_trip(&ctx, 1.5f32), 1.5);
        assert_eq!(round_trip(&ctx, -42i32), -42);
        assert_eq!(round_trip(&ctx, u64::from(u32::MAX)), u64::from(u32::MAX));
    }

    #[test]
    fn strings_round_trip() {
        let ctx = Context::new();
        assert_eq!(round_trip(&ctx, String::new()), "");
        assert_eq!(round_trip(&ctx, String::from("日本語 ✓")), "日本語 ✓");
    }

    #[test]
    fn integers_truncate_toward_zero() {
        let ctx = Context::new();
        assert_eq!(i32::from_script(&ctx, &Value::Number(2.9)).unwrap(), 2);
        assert_eq!(i32::from_script(&ctx, &Value::Number(-2.9)).unwrap(), -2);
    }

    #[test]
    fn integers_range_checked() {
        let ctx = Context::new();
        let err = u8::from_script(&ctx, &Value::Number(256.0)).unwrap_err();
        assert!(matches!(err, ConversionError::IntegerOverflow { target_type: "uint8", .. }));
        assert!(u32::from_script(&ctx, &Value::Number(-1.0)).is_err());
        assert!(i32::from_script(&ctx, &Value::Number(f64::NAN)).is_err());
        assert!(i64::from_script(&ctx, &Value::Number(f64::INFINITY)).is_err());
    }

    #[test]
    fn wide_integers_reject_rounded_max() {
        let ctx = Context::new();
        let two_63 = 2f64.powi(63);
        let err = i64::from_script(&ctx, &Value::Number(two_63)).unwrap_err();
        assert!(matches!(err, ConversionError::IntegerOverflow { target_type: "int64", .. }));
        assert_eq!(i64::from_script(&ctx, &Value::Number(-two_63)).unwrap(), i64::MIN);
        assert!(u64::from_script(&ctx, &Value::Number(2f64.powi(64))).is_err());
        assert_eq!(
            u64::from_script(&ctx, &Value::Number(two_63)).unwrap(),
            1u64 << 63
        );
        assert_eq!(u32::from_script(&ctx, &Value::Number(4_294_967_295.0)).unwrap(), u32::MAX);
        assert!(u32::from_script(&ctx, &Value::Number(4_294_967_296.0)).is_err());
    }

    #[test]
    fn strict_types() {
        let ctx = Context::new();
        let err = bool::from_script(&ctx, &Value::Number(1.0)).unwrap_err();
        assert!(matches!(
            err,
            ConversionError::TypeMismatch {
                expected: "Boolean",
                actual: "number"
            }
        ));
        assert!(String::from_script(&ctx, &Value::Null).is_err());
        assert!(f64::from_script(&ctx, &Value::string("1")).is_err());
    }

    #[test]
    fn option_maps_nullish() {
        let ctx = Context::new();
        assert_eq!(Option::<i32>::from_script(&ctx, &Value::Null).unwrap(), None);
        assert_eq!(Option::<i32>::from_script(&ctx, &Value::Undefined).unwrap(), None);
        assert_eq!(Option::<i32>::from_script(&ctx, &Value::Number(3.0)).unwrap(), Some(3));
        assert_eq!(None::<i32>.to_script(&ctx).unwrap(), Value::Null);
    }

    #[test]
    fn vec_round_trip() {
        let ctx = Context::new();
        assert_eq!(round_trip(&ctx, vec![1i32, 2, 3]), vec![1, 2, 3]);
        assert!(round_trip(&ctx, Vec::<String>::new()).is_empty());
    }

    #[test]
    fn vec_read_is_atomic() {
        let ctx = Context::new();
        let array = ctx.runtime().new_array(vec![
            Value::Number(1.0),
            Value::string("two"),
            Value::Number(3.0),
        ]);
        assert!(Vec::<i32>::from_script(&ctx, &Value::Object(array)).is_err());

        let mut out = vec![7, 8, 9, 10];
        assert!(Vec::<i32>::read_into(&ctx, &Value::Object(array), &mut out).is_err());
        assert_eq!(out, vec![7, 8, 9, 10]);
    }

    #[test]
    fn read_vec_into_keeps_partial_state() {
        let ctx = Context::new();
        let array = ctx.runtime().new_array(vec![
            Value::Number(1.0),
            Value::string("two"),
            Value::Number(3.0),
        ]);
        let mut out = vec![7, 8, 9, 10];
        assert!(read_vec_into(&ctx, &Value::Object(array), &mut out).is_err());
        assert_eq!(out, vec![1]);
    }

    #[test]
    fn vec_rejects_non_array() {
        let ctx = Context::new();
        let object = ctx.runtime().new_object();
        let err = Vec::<i32>::from_script(&ctx, &Value::Object(object)).unwrap_err();
        assert!(matches!(err, ConversionError::TypeMismatch { expected: "Array", .. }));
    }

    #[test]
    fn value_passthrough() {
        let ctx = Context::new();
        let v = Value::string("x");
        assert_eq!(Value::from_script(&ctx, &v).unwrap(), v);
    }
}
