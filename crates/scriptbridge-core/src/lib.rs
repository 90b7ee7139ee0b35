//! Embedded scripting runtime model.
//!
//! This crate provides the runtime the bridge talks to: a dynamically typed
//! value model, a garbage-collected object heap and the hooks a native
//! binding layer needs.
//!
//! ## Key Types
//!
//! - [`Value`]: a script value (primitives inline, objects by reference)
//! - [`Runtime`]: handle to one runtime instance
//! - [`Persistent`]: GC root held from native code
//! - [`WeakObject`]: non-rooting object reference, checked on every use
//! - [`Exception`]: error thrown inside the runtime
//!
//! ## Runtime services
//!
//! ```text
//! objects ─┬─ properties (data / accessor), prototype link
//!          ├─ internal slot   (opaque native payload)
//!          ├─ hidden maps     (namespaced, invisible to lookup, traced by GC)
//!          └─ finalizers      (run once after collection)
//! ```
//!
//! ```ignore
//! let rt = Runtime::new();
//! let obj = rt.new_object();
//! rt.set(obj, "x", Value::Number(1.0))?;
//! let keep = rt.persist(obj);
//! rt.collect_garbage();
//! assert!(rt.is_alive(obj));
//! ```

mod error;
mod heap;
mod persistent;
mod runtime;
mod value;

pub use error::Exception;
pub use heap::{Finalizer, NativeCallable, ObjectKind, PropertySlot, ScriptHeap, ScriptObject};
pub use persistent::{Persistent, WeakObject};
pub use runtime::{GcStats, Runtime};
pub use value::{HiddenKey, ObjectRef, Value};
