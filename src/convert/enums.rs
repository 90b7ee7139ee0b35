//! String-table enum conversion.
//!
//! Native enums cross the boundary as strings. Each enum declares an ordered
//! table of `(string, variant)` pairs; lookups walk it front to back, so the
//! first entry for a variant is its canonical spelling.
//!
//! ```ignore
//! script_enum! {
//!     /// Kind of button.
//!     pub enum ButtonType as "ButtonType" {
//!         Normal = "normal",
//!         Checkbox = "checkbox",
//!         Radio = "radio",
//!     }
//! }
//!
//! // An empty string maps to `Normal` instead of failing.
//! script_enum! {
//!     pub enum Alignment as "Alignment" default Start {
//!         Start = "start",
//!         Center = "center",
//!     }
//! }
//! ```

use scriptbridge_core::Value;

use super::mismatch;
use crate::context::Context;
use crate::error::ConversionError;

/// An enum with a string table.
pub trait ScriptEnum: Copy + PartialEq + super::FromScript + 'static {
    /// Enum name reported in errors.
    const NAME: &'static str;
    /// Ordered string table.
    const TABLE: &'static [(&'static str, Self)];
    /// Variant an empty string maps to, if any.
    const DEFAULT_ON_EMPTY: Option<Self> = None;
}

/// Convert a string to an enum through its table.
pub fn enum_from_script<E: ScriptEnum>(ctx: &Context, value: &Value) -> Result<E, ConversionError> {
    let Some(text) = value.as_str() else {
        return Err(mismatch::<E>(ctx, value));
    };
    if text.is_empty()
        && let Some(default) = E::DEFAULT_ON_EMPTY
    {
        return Ok(default);
    }
    E::TABLE
        .iter()
        .find(|(name, _)| *name == text)
        .map(|(_, variant)| *variant)
        .ok_or_else(|| ConversionError::InvalidEnumValue {
            value: text.to_string(),
            enum_name: E::NAME,
        })
}

/// Convert an enum to its canonical string.
pub fn enum_to_script<E: ScriptEnum>(value: E) -> Result<Value, ConversionError> {
    E::TABLE
        .iter()
        .find(|(_, variant)| *variant == value)
        .map(|(name, _)| Value::string(name))
        .ok_or(ConversionError::UnsupportedValue {
            target_type: E::NAME,
        })
}

/// Declare an enum and its string table.
///
/// Generates the enum (deriving `Clone, Copy, Debug, PartialEq, Eq, Hash`)
/// along with its [`ScriptEnum`], `FromScript` and `ToScript` impls. An
/// optional `default Variant` clause makes an empty string convert to that
/// variant.
#[macro_export]
macro_rules! script_enum {
    (@default $name:ident) => {
        None
    };
    (@default $name:ident $default:ident) => {
        Some($name::$default)
    };
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident as $script_name:literal $(default $default:ident)? {
            $($variant:ident = $text:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
        $vis enum $name {
            $($variant),+
        }

        impl $crate::convert::ScriptEnum for $name {
            const NAME: &'static str = $script_name;
            const TABLE: &'static [(&'static str, Self)] = &[$(($text, $name::$variant)),+];
            const DEFAULT_ON_EMPTY: Option<Self> = $crate::script_enum!(@default $name $($default)?);
        }

        impl $crate::convert::FromScript for $name {
            const TYPE_NAME: &'static str = $script_name;

            fn from_script(
                ctx: &$crate::Context,
                value: &$crate::Value,
            ) -> Result<Self, $crate::ConversionError> {
                $crate::convert::enum_from_script(ctx, value)
            }
        }

        impl $crate::convert::ToScript for $name {
            fn to_script(self, _ctx: &$crate::Context) -> Result<$crate::Value, $crate::ConversionError> {
                $crate::convert::enum_to_script(self)
            }
        }
    };
}
