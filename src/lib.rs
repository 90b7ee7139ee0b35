//! Bridge between a native widget hierarchy and an embedded script runtime.
//!
//! The bridge exposes native objects to script as classes, converts values
//! in both directions, and keeps the two object graphs' lifetimes in step:
//!
//! ```text
//!   native                        script
//!   ──────                        ──────
//!   Rc<Button>  ──── wrap ─────▶  Button instance ──proto──▶ View.prototype
//!               ◀─── unwrap ────
//!   Signal<A>   ◀─── connect ───  button.onClick.connect(fn)
//!   Delegate    ◀─── assign ────  window.onClose = fn
//! ```
//!
//! Everything hangs off a [`Context`], one per runtime instance: built
//! classes, the wrapper identity cache and the posted-task queue.
//!
//! # Example
//!
//! ```ignore
//! use scriptbridge::prelude::*;
//!
//! struct Label { text: RefCell<String> }
//!
//! impl NativeClass for Label {
//!     const NAME: &'static str = "Label";
//!
//!     fn build(class: &mut ClassBuilder<'_, Self>) -> Result<(), BridgeError> {
//!         class.property(
//!             "text",
//!             CacheMode::NoCache,
//!             |l: &Label| l.text.borrow().clone(),
//!             |l: &Label, text: String| *l.text.borrow_mut() = text,
//!         )?;
//!         Ok(())
//!     }
//! }
//!
//! let ctx = Context::new();
//! let label = Rc::new(Label { text: RefCell::new("hello".into()) });
//! let handle = ctx.wrap(NativeHandle::strong(label))?;
//! ```

mod attached;
mod callback;
mod config;
mod context;
pub mod convert;
mod error;
mod property;
mod prototype;
mod signal;
mod task;
mod types;
mod wrap;

pub use attached::AttachedTable;
pub use callback::{
    Arguments, CallbackFlags, CallbackMode, IntoNativeFunction, NativeBody, NativeFunction, ScriptCallback,
    ScriptFunction, WeakCallback,
};
pub use config::BridgeConfig;
pub use context::{Context, WeakContext};
pub use error::{BridgeError, ConversionError};
pub use property::CacheMode;
pub use prototype::ClassBuilder;
pub use signal::{Delegate, DelegateSource, Event, Signal, SignalDelegate, SignalHandle, SignalSource, SlotId};
pub use task::{Task, TaskPoster};
pub use types::{BaseLink, NativeClass, NativeConstructor, Ownership, TypeDescriptor};
pub use wrap::{NativeHandle, NativeRef};

pub use scriptbridge_core::{Exception, GcStats, HiddenKey, ObjectRef, Persistent, Runtime, Value, WeakObject};

/// Common imports for code defining native classes.
pub mod prelude {
    pub use crate::convert::{Color, FromScript, PointF, RectF, SizeF, ToScript, Vector2dF};
    pub use crate::{
        BaseLink, BridgeConfig, BridgeError, CacheMode, ClassBuilder, Context, ConversionError, Delegate, Event,
        NativeClass, NativeFunction, NativeHandle, NativeRef, Ownership, ScriptCallback, Signal, Value,
    };
    pub use crate::script_enum;
}
