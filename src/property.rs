//! Property accessors with caching policies.
//!
//! Native members surface as accessor properties on the class prototype.
//! Each one carries a [`CacheMode`] deciding whether its script value is
//! retained in the owner's `"members"` table:
//!
//! ```text
//!                 get                          set
//! NoCache         compute every time           write native only
//! CacheFirstGet   compute once, then cached    write native, drop cache
//! CacheAlways     cached value if any          write native, cache the
//!                                              exact value assigned
//! ```
//!
//! Setters convert the incoming value before touching the receiver, so a
//! failed conversion leaves the native member unmodified.

use std::rc::Rc;

use scriptbridge_core::{ObjectRef, Value};

use crate::attached::AttachedTable;
use crate::callback::{Arguments, NativeFunction};
use crate::context::Context;
use crate::convert::{FromScript, ToScript};
use crate::error::BridgeError;
use crate::types::NativeClass;
use crate::wrap::NativeRef;

/// Caching policy of a property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CacheMode {
    /// Recompute on every read.
    #[default]
    NoCache,
    /// Compute on first read and return the stored value afterwards.
    CacheFirstGet,
    /// Return the exact value last assigned; recompute until then.
    CacheAlways,
}

impl CacheMode {
    fn caches(self) -> bool {
        self != CacheMode::NoCache
    }
}

/// Computes the script value of a property for a resolved receiver.
pub(crate) type Compute<T> = Rc<dyn Fn(&Context, ObjectRef, &T) -> Result<Value, BridgeError>>;

/// Applies an assignment. Returns `false` when the receiver was not a
/// native object and nothing was written.
pub(crate) type Apply = Rc<dyn Fn(&mut Arguments<'_>) -> Result<bool, BridgeError>>;

/// Resolve a property receiver.
///
/// Outside strict mode a receiver that is not a `T` resolves to `None`.
pub(crate) fn receiver<T: NativeClass>(ctx: &Context, this: &Value) -> Result<Option<NativeRef<T>>, BridgeError> {
    match ctx.unwrap::<T>(this) {
        Ok(native) => Ok(Some(native)),
        Err(BridgeError::TypeMismatch { .. }) if !ctx.config().strict_receiver => {
            log::trace!("{} accessor on foreign receiver", T::NAME);
            Ok(None)
        }
        Err(err) => Err(err),
    }
}

/// Build the getter function of a property.
pub(crate) fn getter<T: NativeClass>(name: &'static str, mode: CacheMode, compute: Compute<T>) -> NativeFunction {
    NativeFunction::raw(move |args| {
        let ctx = args.context();
        let this = args.this();
        if mode.caches()
            && let Some(owner) = this.as_object()
            && let Some(cached) = AttachedTable::members(ctx, owner).get(name)
        {
            return Ok(cached);
        }
        let Some(native) = receiver::<T>(ctx, this)? else {
            return Ok(Value::Undefined);
        };
        let Some(owner) = this.as_object() else {
            return Ok(Value::Undefined);
        };
        let value = compute(ctx, owner, &native)?;
        // CacheAlways retains only what a setter stored.
        if mode == CacheMode::CacheFirstGet {
            AttachedTable::members(ctx, owner).set(name, value.clone())?;
        }
        log::trace!("get {}.{} -> {:?}", T::NAME, name, value);
        Ok(value)
    })
}

/// Build the setter function of a property.
pub(crate) fn setter(name: &'static str, mode: CacheMode, apply: Apply) -> NativeFunction {
    NativeFunction::raw(move |args| {
        let assigned = args.get(0);
        if !apply(args)? {
            return Ok(Value::Undefined);
        }
        if let Some(owner) = args.this().as_object() {
            let members = AttachedTable::members(args.context(), owner);
            match mode {
                CacheMode::NoCache => {}
                CacheMode::CacheFirstGet => {
                    members.remove(name);
                }
                CacheMode::CacheAlways => members.set(name, assigned)?,
            }
        }
        log::trace!("set {}", name);
        Ok(Value::Undefined)
    })
}

/// Adapt `Fn(&T) -> R` to a [`Compute`].
pub(crate) fn typed_compute<T, R, F>(get: F) -> Compute<T>
where
    T: NativeClass,
    R: ToScript,
    F: Fn(&T) -> R + 'static,
{
    Rc::new(move |ctx: &Context, _owner: ObjectRef, native: &T| ctx.to_script(get(native)))
}

/// Adapt `Fn(&T, V)` to an [`Apply`].
pub(crate) fn typed_apply<T, V, F>(set: F) -> Apply
where
    T: NativeClass,
    V: FromScript,
    F: Fn(&T, V) + 'static,
{
    Rc::new(move |args: &mut Arguments<'_>| {
        let value = args.next::<V>()?;
        let Some(native) = receiver::<T>(args.context(), args.this())? else {
            return Ok(false);
        };
        set(&native, value);
        Ok(true)
    })
}

/// Install an accessor property on `prototype`.
pub(crate) fn install(
    ctx: &Context,
    prototype: ObjectRef,
    name: &'static str,
    getter: NativeFunction,
    setter: Option<NativeFunction>,
) -> Result<(), BridgeError> {
    let getter = Value::Object(getter.create(ctx, name));
    let setter = setter.map(|setter| Value::Object(setter.create(ctx, name)));
    ctx.runtime()
        .define_accessor(prototype, name, Some(getter), setter)?;
    Ok(())
}
