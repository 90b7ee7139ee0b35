//! Object wrapper and ownership bridge.
//!
//! Wrapping gives a native object a script-side handle: an instance of its
//! class whose internal slot points back at the native value. How the slot
//! holds the value is decided by the type's [`Ownership`]:
//!
//! ```text
//!   OwnedStrong  slot holds Rc<T>       released when the handle is swept
//!   OwnedWeak    slot holds Weak<T>     upgraded on every access
//!   BorrowedRaw  slot holds NonNull<T>  native side outlives the handle
//! ```
//!
//! Identity-cached types keep a `(type, address) -> handle` map so that
//! wrapping the same `Rc` twice yields the same script object.

use std::any::{Any, TypeId};
use std::fmt;
use std::ops::Deref;
use std::ptr::NonNull;
use std::rc::{Rc, Weak};

use scriptbridge_core::{ObjectRef, Value, WeakObject};

use crate::callback::Arguments;
use crate::context::{Context, IdentityKey};
use crate::convert::{FromScript, ToScript};
use crate::error::{BridgeError, ConversionError};
use crate::types::{NativeClass, Ownership, TypeDescriptor};

// =============================================================================
// Handles
// =============================================================================

enum HandleKind<T> {
    Strong(Rc<T>),
    Weak(Weak<T>),
    Borrowed(NonNull<T>),
}

/// A native object on its way into script.
pub struct NativeHandle<T>(HandleKind<T>);

impl<T> NativeHandle<T> {
    /// Reference-counted handle.
    pub fn strong(native: Rc<T>) -> Self {
        Self(HandleKind::Strong(native))
    }

    /// Weak handle; wrapping an expired one yields `null`.
    pub fn weak(native: Weak<T>) -> Self {
        Self(HandleKind::Weak(native))
    }

    /// Raw borrowed handle.
    ///
    /// # Safety
    ///
    /// `native` must stay alive, at the same address, for as long as any
    /// script handle wrapping it can be reached.
    pub unsafe fn borrowed(native: &T) -> Self {
        Self(HandleKind::Borrowed(NonNull::from(native)))
    }
}

impl<T> From<Rc<T>> for NativeHandle<T> {
    fn from(native: Rc<T>) -> Self {
        Self::strong(native)
    }
}

impl<T> From<Weak<T>> for NativeHandle<T> {
    fn from(native: Weak<T>) -> Self {
        Self::weak(native)
    }
}

// =============================================================================
// Internal slot
// =============================================================================

pub(crate) enum Storage {
    Strong(Rc<dyn Any>),
    Weak(Weak<dyn Any>),
    Borrowed(NonNull<dyn Any>),
}

/// Payload stored in a wrapped object's internal slot.
pub(crate) struct InternalSlot {
    pub(crate) descriptor: TypeDescriptor,
    storage: Storage,
}

impl InternalSlot {
    /// Resolve the stored value, returning a keep-alive for counted storage.
    fn resolve(&self) -> Result<(Option<Rc<dyn Any>>, NonNull<dyn Any>), ConversionError> {
        match &self.storage {
            Storage::Strong(native) => Ok((Some(native.clone()), NonNull::from(&**native))),
            Storage::Weak(token) => match token.upgrade() {
                Some(native) => {
                    let ptr = NonNull::from(&*native);
                    Ok((Some(native), ptr))
                }
                None => Err(ConversionError::ObjectDestroyed {
                    type_name: self.descriptor.name,
                }),
            },
            Storage::Borrowed(ptr) => Ok((None, *ptr)),
        }
    }
}

fn slot_of(ctx: &Context, object: ObjectRef) -> Option<Rc<InternalSlot>> {
    ctx.runtime()
        .internal(object)
        .and_then(|data| data.downcast::<InternalSlot>().ok())
}

/// Store `handle` in the internal slot of `object`.
pub(crate) fn attach<T: NativeClass>(
    ctx: &Context,
    object: ObjectRef,
    handle: NativeHandle<T>,
) -> Result<(), BridgeError> {
    let storage = match handle.0 {
        HandleKind::Strong(native) => Storage::Strong(native),
        HandleKind::Weak(token) => Storage::Weak(token),
        HandleKind::Borrowed(ptr) => Storage::Borrowed(ptr),
    };
    let slot = InternalSlot {
        descriptor: TypeDescriptor::of::<T>(),
        storage,
    };
    ctx.runtime().set_internal(object, Rc::new(slot))?;
    Ok(())
}

fn identity_key<T: 'static>(native: &Rc<T>) -> IdentityKey {
    (TypeId::of::<T>(), Rc::as_ptr(native) as *const () as usize)
}

fn remember_identity(ctx: &Context, key: IdentityKey, object: ObjectRef) -> Result<(), BridgeError> {
    let weak = WeakObject::new(object);
    ctx.inner().identity.borrow_mut().insert(key, weak);

    let context = ctx.downgrade();
    ctx.runtime().add_finalizer(object, move || {
        let Some(ctx) = context.upgrade() else {
            return;
        };
        let mut identity = ctx.inner().identity.borrow_mut();
        if identity.get(&key) == Some(&weak) {
            identity.remove(&key);
        }
    })?;
    Ok(())
}

// =============================================================================
// Wrap / unwrap
// =============================================================================

impl Context {
    /// Wrap a native object, returning its script handle.
    ///
    /// The handle kind is reconciled with `T::OWNERSHIP`: a strong handle to
    /// an `OwnedWeak` type is downgraded and a weak handle to an
    /// `OwnedStrong` type is upgraded. A `BorrowedRaw` type accepts only
    /// borrowed handles.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn wrap<T: NativeClass>(&self, handle: NativeHandle<T>) -> Result<Value, BridgeError> {
        let handle = match (T::OWNERSHIP, handle.0) {
            (Ownership::OwnedStrong, HandleKind::Strong(native)) => HandleKind::Strong(native),
            (Ownership::OwnedStrong, HandleKind::Weak(token)) => match token.upgrade() {
                Some(native) => HandleKind::Strong(native),
                None => return Ok(expired::<T>()),
            },
            (Ownership::OwnedWeak, HandleKind::Strong(native)) => {
                HandleKind::Weak(Rc::downgrade(&native))
            }
            (Ownership::OwnedWeak, HandleKind::Weak(token)) => {
                if token.strong_count() == 0 {
                    return Ok(expired::<T>());
                }
                HandleKind::Weak(token)
            }
            (Ownership::BorrowedRaw, HandleKind::Borrowed(ptr)) => HandleKind::Borrowed(ptr),
            _ => return Err(BridgeError::UnsupportedValue { type_name: T::NAME }),
        };

        let descriptor = TypeDescriptor::of::<T>();
        let key = match &handle {
            HandleKind::Strong(native) if descriptor.identity_cached => Some(identity_key(native)),
            _ => None,
        };
        if let Some(key) = key {
            let cached = self.inner().identity.borrow().get(&key).copied();
            if let Some(object) = cached.and_then(|weak| weak.upgrade(self.runtime())) {
                log::trace!("wrap {}: identity cache hit {}", T::NAME, object);
                return Ok(Value::Object(object));
            }
        }

        let (_, constructor) = self.class_objects(&descriptor)?;
        let instance = self
            .runtime()
            .construct(&Value::Object(constructor), &[self.internal_sentinel()])?;
        let Value::Object(object) = instance else {
            return Err(BridgeError::TypeMismatch {
                expected: T::NAME,
                actual: instance.type_name(),
            });
        };
        attach(self, object, NativeHandle(handle))?;
        if let Some(key) = key {
            remember_identity(self, key, object)?;
        }
        log::trace!("wrapped {} as {}", T::NAME, object);
        Ok(Value::Object(object))
    }

    /// Wrap a borrowed native object.
    ///
    /// # Safety
    ///
    /// See [`NativeHandle::borrowed`].
    pub unsafe fn wrap_borrowed<T: NativeClass>(&self, native: &T) -> Result<Value, BridgeError> {
        // SAFETY: forwarded to the caller.
        let handle = unsafe { NativeHandle::borrowed(native) };
        self.wrap(handle)
    }

    /// Resolve a script handle to the native `T` it wraps.
    ///
    /// Succeeds when the recorded type is `T` or derives from it. Fails with
    /// [`BridgeError::ObjectDestroyed`] when a weakly held object is gone.
    pub fn unwrap<T: NativeClass>(&self, value: &Value) -> Result<NativeRef<T>, BridgeError> {
        unwrap_native(self, value).map_err(BridgeError::from)
    }
}

fn expired<T: NativeClass>() -> Value {
    log::warn!("wrap of an expired weak {} handle", T::NAME);
    Value::Null
}

fn unwrap_native<T: NativeClass>(ctx: &Context, value: &Value) -> Result<NativeRef<T>, ConversionError> {
    let mismatch = |actual| ConversionError::TypeMismatch {
        expected: T::NAME,
        actual,
    };
    let slot = value
        .as_object()
        .and_then(|object| slot_of(ctx, object))
        .ok_or_else(|| mismatch(ctx.runtime().type_of(value)))?;

    let (keep, ptr) = slot.resolve()?;
    // SAFETY: counted storage is kept alive by `keep`; borrowed storage is
    // guaranteed live by the contract of `NativeHandle::borrowed`.
    let mut current: &dyn Any = unsafe { ptr.as_ref() };
    let mut descriptor = slot.descriptor;
    loop {
        if let Some(native) = current.downcast_ref::<T>() {
            log::trace!("unwrap {} as {}", descriptor.name, T::NAME);
            return Ok(NativeRef {
                keep,
                ptr: NonNull::from(native),
            });
        }
        let Some(link) = descriptor.base else {
            break;
        };
        let Some(base) = (link.project)(current) else {
            break;
        };
        current = base;
        descriptor = (link.descriptor)();
    }
    Err(mismatch(slot.descriptor.name))
}

/// Borrow of a native object resolved from a script handle.
///
/// Keeps reference-counted storage alive for its own lifetime.
pub struct NativeRef<T> {
    keep: Option<Rc<dyn Any>>,
    ptr: NonNull<T>,
}

impl<T: 'static> NativeRef<T> {
    /// The owning `Rc` when the handle stores a `T` directly.
    pub fn to_rc(&self) -> Option<Rc<T>> {
        self.keep.clone()?.downcast::<T>().ok()
    }
}

impl<T> Deref for NativeRef<T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: see `unwrap_native`.
        unsafe { self.ptr.as_ref() }
    }
}

impl<T: fmt::Debug> fmt::Debug for NativeRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&**self, f)
    }
}

// =============================================================================
// Conversions
// =============================================================================

impl<T: NativeClass> FromScript for NativeRef<T> {
    const TYPE_NAME: &'static str = T::NAME;

    fn from_script(ctx: &Context, value: &Value) -> Result<Self, ConversionError> {
        unwrap_native(ctx, value)
    }
}

fn wrap_for_conversion<T: NativeClass>(ctx: &Context, handle: NativeHandle<T>) -> Result<Value, ConversionError> {
    ctx.wrap(handle).map_err(|err| match err {
        BridgeError::UnsupportedValue { type_name } => ConversionError::UnsupportedValue {
            target_type: type_name,
        },
        other => ConversionError::Script(other.into()),
    })
}

impl<T: NativeClass> ToScript for Rc<T> {
    fn to_script(self, ctx: &Context) -> Result<Value, ConversionError> {
        wrap_for_conversion(ctx, NativeHandle::strong(self))
    }
}

impl<T: NativeClass> ToScript for Weak<T> {
    fn to_script(self, ctx: &Context) -> Result<Value, ConversionError> {
        wrap_for_conversion(ctx, NativeHandle::weak(self))
    }
}

/// Constructor body for classes with a native factory.
pub(crate) fn construct_native<T: NativeClass>(args: &mut Arguments<'_>) -> Result<(), BridgeError> {
    let Some(factory) = T::CONSTRUCTOR else {
        return Err(BridgeError::InternalConstructor { class: T::NAME });
    };
    if T::OWNERSHIP != Ownership::OwnedStrong {
        return Err(BridgeError::InternalConstructor { class: T::NAME });
    }
    let Some(this) = args.this().as_object() else {
        return Err(BridgeError::TypeMismatch {
            expected: T::NAME,
            actual: args.this().type_name(),
        });
    };
    if slot_of(args.context(), this).is_some() {
        return Err(BridgeError::AlreadyConstructed { class: T::NAME });
    }
    let native = factory(args)?;
    let ctx = args.context();
    let key = identity_key(&native);
    attach(ctx, this, NativeHandle::strong(native))?;
    if T::IDENTITY_CACHED {
        remember_identity(ctx, key, this)?;
    }
    log::trace!("constructed {} as {}", T::NAME, this);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BaseLink;

    struct Widget {
        id: u32,
    }

    impl NativeClass for Widget {
        const NAME: &'static str = "Widget";
    }

    struct Label {
        widget: Widget,
        text: String,
    }

    impl AsRef<Widget> for Label {
        fn as_ref(&self) -> &Widget {
            &self.widget
        }
    }

    impl NativeClass for Label {
        const NAME: &'static str = "Label";
        const IDENTITY_CACHED: bool = false;

        fn base() -> Option<BaseLink> {
            Some(BaseLink::of::<Label, Widget>())
        }
    }

    struct Tracked;

    impl NativeClass for Tracked {
        const NAME: &'static str = "Tracked";
        const OWNERSHIP: Ownership = Ownership::OwnedWeak;
    }

    struct Pinned(u8);

    impl NativeClass for Pinned {
        const NAME: &'static str = "Pinned";
        const OWNERSHIP: Ownership = Ownership::BorrowedRaw;
    }

    #[test]
    fn cached_wrap_is_identity_preserving() {
        let ctx = Context::new();
        let widget = Rc::new(Widget { id: 1 });
        let a = ctx.wrap(NativeHandle::strong(widget.clone())).unwrap();
        let b = ctx.wrap(NativeHandle::strong(widget.clone())).unwrap();
        assert_eq!(a, b);
        assert_eq!(Rc::strong_count(&widget), 2);
    }

    #[test]
    fn uncached_wraps_are_distinct() {
        let ctx = Context::new();
        let label = Rc::new(Label {
            widget: Widget { id: 7 },
            text: "hi".into(),
        });
        let a = ctx.wrap(NativeHandle::strong(label.clone())).unwrap();
        let b = ctx.wrap(NativeHandle::strong(label.clone())).unwrap();
        assert_ne!(a, b);
        assert_eq!(ctx.unwrap::<Label>(&a).unwrap().text, "hi");
        assert!(std::ptr::eq(
            &*ctx.unwrap::<Label>(&a).unwrap(),
            &*ctx.unwrap::<Label>(&b).unwrap()
        ));
    }

    #[test]
    fn unwrap_as_base() {
        let ctx = Context::new();
        let label = Rc::new(Label {
            widget: Widget { id: 7 },
            text: String::new(),
        });
        let v = ctx.wrap(NativeHandle::strong(label)).unwrap();
        assert_eq!(ctx.unwrap::<Widget>(&v).unwrap().id, 7);
    }

    #[test]
    fn unwrap_wrong_type_fails() {
        let ctx = Context::new();
        let v = ctx.wrap(NativeHandle::strong(Rc::new(Widget { id: 1 }))).unwrap();
        let err = ctx.unwrap::<Label>(&v).err().unwrap();
        assert!(matches!(
            err,
            BridgeError::TypeMismatch { expected: "Label", actual: "Widget" }
        ));
        let err = ctx.unwrap::<Widget>(&Value::string("x")).err().unwrap();
        assert!(matches!(err, BridgeError::TypeMismatch { actual: "string", .. }));
    }

    #[test]
    fn collection_releases_strong_count() {
        let ctx = Context::new();
        let widget = Rc::new(Widget { id: 1 });
        ctx.wrap(NativeHandle::strong(widget.clone())).unwrap();
        assert_eq!(Rc::strong_count(&widget), 2);
        ctx.runtime().collect_garbage();
        assert_eq!(Rc::strong_count(&widget), 1);
        assert!(ctx.inner().identity.borrow().is_empty());
    }

    #[test]
    fn weak_handle_fails_after_destruction() {
        let ctx = Context::new();
        let tracked = Rc::new(Tracked);
        let v = ctx.wrap(NativeHandle::strong(tracked.clone())).unwrap();
        assert_eq!(Rc::strong_count(&tracked), 1);
        assert!(ctx.unwrap::<Tracked>(&v).is_ok());
        drop(tracked);
        let err = ctx.unwrap::<Tracked>(&v).err().unwrap();
        assert!(matches!(err, BridgeError::ObjectDestroyed { type_name: "Tracked" }));
    }

    #[test]
    fn expired_weak_wraps_to_null() {
        let ctx = Context::new();
        let token = Rc::downgrade(&Rc::new(Tracked));
        assert_eq!(ctx.wrap(NativeHandle::weak(token)).unwrap(), Value::Null);
    }

    #[test]
    fn borrowed_wrap() {
        let ctx = Context::new();
        let pinned = Pinned(9);
        let v = unsafe { ctx.wrap_borrowed(&pinned) }.unwrap();
        assert_eq!(ctx.unwrap::<Pinned>(&v).unwrap().0, 9);
        let err = ctx.wrap(NativeHandle::strong(Rc::new(Pinned(1)))).err().unwrap();
        assert!(matches!(err, BridgeError::UnsupportedValue { type_name: "Pinned" }));
    }

    #[test]
    fn to_rc_recovers_owner() {
        let ctx = Context::new();
        let widget = Rc::new(Widget { id: 3 });
        let v = widget.clone().to_script(&ctx).unwrap();
        let native = NativeRef::<Widget>::from_script(&ctx, &v).unwrap();
        assert!(Rc::ptr_eq(&native.to_rc().unwrap(), &widget));
    }

    #[test]
    fn wrapped_object_reports_class() {
        let ctx = Context::new();
        let v = ctx.wrap(NativeHandle::strong(Rc::new(Widget { id: 1 }))).unwrap();
        let object = v.as_object().unwrap();
        assert_eq!(ctx.runtime().class_name(object).as_deref(), Some("Widget"));
    }
}
