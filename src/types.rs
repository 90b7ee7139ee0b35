//! Static per-type metadata for native classes.
//!
//! A native type opts into the bridge by implementing [`NativeClass`]. The
//! bridge reads it through a [`TypeDescriptor`], a plain copyable record of
//! the type's name, ownership mode, base link and builder hooks.
//!
//! Native inheritance is modelled by composition: a derived type embeds its
//! base and exposes it through `AsRef`. The [`BaseLink`] records how to get
//! from the derived value to the embedded base.
//!
//! ```ignore
//! struct View { .. }
//! struct Button { view: View, on_click: Signal<()> }
//!
//! impl AsRef<View> for Button {
//!     fn as_ref(&self) -> &View { &self.view }
//! }
//!
//! impl NativeClass for Button {
//!     const NAME: &'static str = "Button";
//!
//!     fn base() -> Option<BaseLink> {
//!         Some(BaseLink::of::<Button, View>())
//!     }
//!
//!     fn build(class: &mut ClassBuilder<'_, Self>) -> Result<(), BridgeError> {
//!         class.signal("onClick", |b| &b.on_click)?;
//!         Ok(())
//!     }
//! }
//! ```

use std::any::{Any, TypeId};
use std::fmt;
use std::rc::Rc;

use scriptbridge_core::ObjectRef;

use crate::callback::Arguments;
use crate::context::Context;
use crate::error::BridgeError;
use crate::prototype::{ClassBuilder, populate};
use crate::wrap::construct_native;

/// How the bridge holds a wrapped native object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Ownership {
    /// Reference counted; the wrapper holds one strong count until it is
    /// collected.
    OwnedStrong,
    /// The wrapper holds only a weak token, checked on every access.
    OwnedWeak,
    /// The wrapper holds a raw pointer; the native side guarantees the
    /// object outlives every script reference.
    BorrowedRaw,
}

/// Native factory invoked by `new` from script.
pub type NativeConstructor<T> = fn(&mut Arguments<'_>) -> Result<Rc<T>, BridgeError>;

/// A native type exposed to script as a class.
pub trait NativeClass: Any + Sized {
    /// Class name visible to script.
    const NAME: &'static str;

    /// Ownership mode of wrapped instances.
    const OWNERSHIP: Ownership = Ownership::OwnedStrong;

    /// Whether repeated wraps of the same object return the same wrapper.
    /// Only meaningful for [`Ownership::OwnedStrong`].
    const IDENTITY_CACHED: bool = true;

    /// Internal classes can only be instantiated by the bridge.
    const INTERNAL: bool = false;

    /// Factory for `new Class(...)` from script.
    const CONSTRUCTOR: Option<NativeConstructor<Self>> = None;

    /// Link to the base class, if any.
    fn base() -> Option<BaseLink> {
        None
    }

    /// Populate the class: instance members on the prototype, static
    /// members on the constructor.
    fn build(class: &mut ClassBuilder<'_, Self>) -> Result<(), BridgeError> {
        let _ = class;
        Ok(())
    }
}

/// Link from a derived class to its base.
#[derive(Clone, Copy)]
pub struct BaseLink {
    /// Descriptor of the base class
    pub descriptor: fn() -> TypeDescriptor,
    /// Project a derived value to its embedded base value
    pub project: fn(&dyn Any) -> Option<&dyn Any>,
}

impl BaseLink {
    /// Link `D` to its base `B` through `D: AsRef<B>`.
    pub fn of<D, B>() -> Self
    where
        D: NativeClass + AsRef<B>,
        B: NativeClass,
    {
        Self {
            descriptor: TypeDescriptor::of::<B>,
            project: project_base::<D, B>,
        }
    }
}

fn project_base<D, B>(value: &dyn Any) -> Option<&dyn Any>
where
    D: NativeClass + AsRef<B>,
    B: NativeClass,
{
    value
        .downcast_ref::<D>()
        .map(|derived| derived.as_ref() as &dyn Any)
}

impl fmt::Debug for BaseLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BaseLink")
            .field("base", &(self.descriptor)().name)
            .finish()
    }
}

pub(crate) type BuildFn = fn(&Context, ObjectRef, ObjectRef) -> Result<(), BridgeError>;
pub(crate) type ConstructFn = fn(&mut Arguments<'_>) -> Result<(), BridgeError>;

/// Static metadata for one native class.
#[derive(Clone, Copy)]
pub struct TypeDescriptor {
    /// Class name
    pub name: &'static str,
    /// Rust type identity
    pub type_id: TypeId,
    /// Ownership mode of wrapped instances
    pub ownership: Ownership,
    /// Whether wrappers are identity cached
    pub identity_cached: bool,
    /// Whether direct construction from script is rejected
    pub internal: bool,
    /// Base class link
    pub base: Option<BaseLink>,
    pub(crate) build: BuildFn,
    pub(crate) construct: Option<ConstructFn>,
}

impl TypeDescriptor {
    /// Descriptor for `T`.
    pub fn of<T: NativeClass>() -> Self {
        Self {
            name: T::NAME,
            type_id: TypeId::of::<T>(),
            ownership: T::OWNERSHIP,
            identity_cached: T::IDENTITY_CACHED && T::OWNERSHIP == Ownership::OwnedStrong,
            internal: T::INTERNAL,
            base: T::base(),
            build: populate::<T>,
            construct: match T::CONSTRUCTOR {
                Some(_) => Some(construct_native::<T> as ConstructFn),
                None => None,
            },
        }
    }

    /// Check whether this type is `other` or descends from it.
    pub fn is_a(&self, other: TypeId) -> bool {
        let mut current = Some(*self);
        while let Some(descriptor) = current {
            if descriptor.type_id == other {
                return true;
            }
            current = descriptor.base.map(|link| (link.descriptor)());
        }
        false
    }

    /// Whether script may call `new` on this class.
    pub fn is_constructible(&self) -> bool {
        !self.internal && self.construct.is_some()
    }
}

impl PartialEq for TypeDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id
    }
}

impl Eq for TypeDescriptor {}

impl fmt::Debug for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeDescriptor")
            .field("name", &self.name)
            .field("ownership", &self.ownership)
            .field("identity_cached", &self.identity_cached)
            .field("internal", &self.internal)
            .field("base", &self.base)
            .finish()
    }
}
