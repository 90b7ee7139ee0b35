//! Geometry and color value types.
//!
//! These convert through plain objects with named numeric fields:
//! `{x, y}`, `{width, height}`, `{x, y, width, height}`.

use scriptbridge_core::Value;

use super::{FromScript, ToScript, expect_object, mismatch, read_field, read_field_if_present, write_field};
use crate::context::Context;
use crate::error::ConversionError;

/// A point in floating point coordinates.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PointF {
    pub x: f32,
    pub y: f32,
}

/// A size in floating point units.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SizeF {
    pub width: f32,
    pub height: f32,
}

/// A rectangle: origin plus size.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RectF {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// A 2D offset.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Vector2dF {
    pub x: f32,
    pub y: f32,
}

impl PointF {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

impl SizeF {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }
}

impl RectF {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn origin(&self) -> PointF {
        PointF::new(self.x, self.y)
    }

    pub fn size(&self) -> SizeF {
        SizeF::new(self.width, self.height)
    }
}

impl Vector2dF {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Implements field-wise conversion for a struct of `f32` fields.
///
/// `from_script` requires every field; `read_into` updates only the fields
/// present and leaves the rest as they were.
macro_rules! impl_field_struct {
    ($ty:ident, $name:literal, [$($field:ident),+]) => {
        impl FromScript for $ty {
            const TYPE_NAME: &'static str = $name;

            fn from_script(ctx: &Context, value: &Value) -> Result<Self, ConversionError> {
                let object = expect_object::<Self>(ctx, value)?;
                Ok(Self {
                    $($field: read_field(ctx, object, stringify!($field), $name)?,)+
                })
            }

            fn read_into(ctx: &Context, value: &Value, out: &mut Self) -> Result<(), ConversionError> {
                let object = expect_object::<Self>(ctx, value)?;
                let mut updated = *out;
                $(read_field_if_present(ctx, object, stringify!($field), &mut updated.$field)?;)+
                *out = updated;
                Ok(())
            }
        }

        impl ToScript for $ty {
            fn to_script(self, ctx: &Context) -> Result<Value, ConversionError> {
                let object = ctx.runtime().new_object();
                $(write_field(ctx, object, stringify!($field), self.$field)?;)+
                Ok(Value::Object(object))
            }
        }
    };
}

impl_field_struct!(PointF, "PointF", [x, y]);
impl_field_struct!(SizeF, "SizeF", [width, height]);
impl_field_struct!(RectF, "RectF", [x, y, width, height]);
impl_field_struct!(Vector2dF, "Vector2dF", [x, y]);

// =============================================================================
// Color
// =============================================================================

/// An ARGB color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Color(u32);

impl Color {
    /// Color from packed `0xAARRGGBB`.
    pub const fn from_argb_value(value: u32) -> Self {
        Self(value)
    }

    /// Color from components.
    pub const fn from_argb(a: u8, r: u8, g: u8, b: u8) -> Self {
        Self(((a as u32) << 24) | ((r as u32) << 16) | ((g as u32) << 8) | b as u32)
    }

    /// Opaque color from components.
    pub const fn from_rgb(r: u8, g: u8, b: u8) -> Self {
        Self::from_argb(0xFF, r, g, b)
    }

    /// Packed `0xAARRGGBB` value.
    pub const fn value(&self) -> u32 {
        self.0
    }

    pub const fn a(&self) -> u8 {
        (self.0 >> 24) as u8
    }

    pub const fn r(&self) -> u8 {
        (self.0 >> 16) as u8
    }

    pub const fn g(&self) -> u8 {
        (self.0 >> 8) as u8
    }

    pub const fn b(&self) -> u8 {
        self.0 as u8
    }

    /// Parse `#RGB`, `#RRGGBB` or `#AARRGGBB`. Missing alpha is opaque.
    pub fn parse_hex(text: &str) -> Option<Self> {
        let digits = text.strip_prefix('#')?;
        if !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        match digits.len() {
            3 => {
                let expand = |i: usize| -> Option<u8> {
                    let nibble = u8::from_str_radix(&digits[i..i + 1], 16).ok()?;
                    Some(nibble * 0x11)
                };
                Some(Self::from_rgb(expand(0)?, expand(1)?, expand(2)?))
            }
            6 => u32::from_str_radix(digits, 16)
                .ok()
                .map(|rgb| Self(0xFF00_0000 | rgb)),
            8 => u32::from_str_radix(digits, 16).ok().map(Self),
            _ => None,
        }
    }
}

impl FromScript for Color {
    const TYPE_NAME: &'static str = "Color";

    fn from_script(ctx: &Context, value: &Value) -> Result<Self, ConversionError> {
        match value {
            Value::Number(_) => u32::from_script(ctx, value).map(Self),
            Value::String(text) => {
                Self::parse_hex(text).ok_or_else(|| ConversionError::InvalidFormat {
                    value: text.to_string(),
                    target_type: "Color",
                })
            }
            Value::Object(_) => {
                let object = expect_object::<Self>(ctx, value)?;
                let r = read_field(ctx, object, "r", "Color")?;
                let g = read_field(ctx, object, "g", "Color")?;
                let b = read_field(ctx, object, "b", "Color")?;
                let mut a = 0xFFu8;
                read_field_if_present(ctx, object, "a", &mut a)?;
                Ok(Self::from_argb(a, r, g, b))
            }
            _ => Err(mismatch::<Self>(ctx, value)),
        }
    }
}

impl ToScript for Color {
    fn to_script(self, _ctx: &Context) -> Result<Value, ConversionError> {
        Ok(Value::Number(self.0 as f64))
    }
}
