//! Class construction and the prototype chain.
//!
//! Each native class gets one prototype object and one constructor
//! function per context, built on first use and memoized. Building a class
//! builds its base first and links the two, so the order in which classes
//! are requested never matters:
//!
//! ```text
//!   Button.prototype ──proto──▶ View.prototype
//!   Button           ──proto──▶ View
//! ```
//!
//! Members are declared in [`NativeClass::build`] through a
//! [`ClassBuilder`]:
//!
//! ```ignore
//! fn build(class: &mut ClassBuilder<'_, Self>) -> Result<(), BridgeError> {
//!     class
//!         .method("focus", |this: NativeRef<View>| this.focus())?
//!         .property("title", CacheMode::NoCache, View::title, View::set_title)?
//!         .signal("onClick", |b: &Button| &b.on_click)?
//!         .static_value("DEFAULT_WIDTH", 80)?;
//!     Ok(())
//! }
//! ```

use std::any::TypeId;
use std::marker::PhantomData;

use rustc_hash::FxHashSet;
use scriptbridge_core::{ObjectRef, Persistent, Value};

use crate::callback::{IntoNativeFunction, NativeFunction};
use crate::context::Context;
use crate::convert::{FromScript, ToScript};
use crate::error::BridgeError;
use crate::property::{self, Apply, CacheMode, Compute};
use crate::signal::{self, DelegateSource, SignalSource};
use crate::types::{NativeClass, TypeDescriptor};

/// A built class: its prototype and constructor, rooted for the lifetime of
/// the context.
#[derive(Debug, Clone)]
pub(crate) struct ClassEntry {
    pub(crate) prototype: Persistent,
    pub(crate) constructor: Persistent,
}

impl ClassEntry {
    fn objects(&self) -> (ObjectRef, ObjectRef) {
        (self.prototype.object(), self.constructor.object())
    }
}

// =============================================================================
// Builder
// =============================================================================

fn class_constructor(descriptor: TypeDescriptor) -> NativeFunction {
    NativeFunction::raw(move |args| {
        let ctx = args.context();
        if args.this().as_object().is_none() {
            return Err(BridgeError::TypeMismatch {
                expected: descriptor.name,
                actual: args.this().type_name(),
            });
        }
        if !args.is_empty() && ctx.is_internal_sentinel(&args.get(0)) {
            return Ok(Value::Undefined);
        }
        match descriptor.construct {
            Some(construct) if !descriptor.internal => {
                construct(args)?;
                Ok(Value::Undefined)
            }
            _ => Err(BridgeError::InternalConstructor {
                class: descriptor.name,
            }),
        }
    })
}

fn build_class(ctx: &Context, descriptor: TypeDescriptor) -> Result<ClassEntry, BridgeError> {
    let parent = match descriptor.base {
        Some(link) => Some(get_or_build(ctx, &(link.descriptor)())?),
        None => None,
    };
    let rt = ctx.runtime();

    let prototype = rt.new_object_with_proto(parent.map(|(prototype, _)| prototype));
    let prototype = rt.persist(prototype);
    rt.set_class_name(prototype.object(), descriptor.name)?;

    let constructor = class_constructor(descriptor).create(ctx, descriptor.name);
    let constructor = rt.persist(constructor);
    rt.set_prototype(constructor.object(), parent.map(|(_, constructor)| constructor))?;
    rt.define_property(constructor.object(), "prototype", prototype.value())?;
    rt.define_property(prototype.object(), "constructor", constructor.value())?;

    Ok(ClassEntry {
        prototype,
        constructor,
    })
}

/// Get the class objects of `descriptor`, building them (and their bases)
/// on first request.
fn get_or_build(ctx: &Context, descriptor: &TypeDescriptor) -> Result<(ObjectRef, ObjectRef), BridgeError> {
    let type_id = descriptor.type_id;
    if let Some(entry) = ctx.inner().classes.borrow().get(&type_id) {
        return Ok(entry.objects());
    }
    if !ctx.inner().building.borrow_mut().insert(type_id) {
        return Err(BridgeError::CyclicInheritance {
            class: descriptor.name,
        });
    }
    let built = build_class(ctx, *descriptor);
    ctx.inner().building.borrow_mut().remove(&type_id);
    let entry = built?;
    let objects = entry.objects();

    // Registered before population so members can refer back to the class.
    ctx.inner().classes.borrow_mut().insert(type_id, entry);
    if let Err(err) = (descriptor.build)(ctx, objects.0, objects.1) {
        ctx.inner().classes.borrow_mut().remove(&type_id);
        return Err(err);
    }
    log::debug!(
        "built class {}{}",
        descriptor.name,
        descriptor
            .base
            .map(|link| format!(" extends {}", (link.descriptor)().name))
            .unwrap_or_default()
    );
    Ok(objects)
}

/// Declares the members of one class.
pub struct ClassBuilder<'c, T> {
    ctx: &'c Context,
    prototype: ObjectRef,
    constructor: ObjectRef,
    members: FxHashSet<&'static str>,
    statics: FxHashSet<&'static str>,
    _class: PhantomData<fn() -> T>,
}

/// Populate the class objects of `T`.
pub(crate) fn populate<T: NativeClass>(
    ctx: &Context,
    prototype: ObjectRef,
    constructor: ObjectRef,
) -> Result<(), BridgeError> {
    let mut builder = ClassBuilder::<T> {
        ctx,
        prototype,
        constructor,
        members: FxHashSet::default(),
        statics: FxHashSet::default(),
        _class: PhantomData,
    };
    T::build(&mut builder)
}

impl<'c, T: NativeClass> ClassBuilder<'c, T> {
    /// The context the class is being registered in.
    pub fn context(&self) -> &'c Context {
        self.ctx
    }

    /// The prototype being populated.
    pub fn prototype(&self) -> ObjectRef {
        self.prototype
    }

    /// The constructor being populated.
    pub fn constructor(&self) -> ObjectRef {
        self.constructor
    }

    fn claim(&mut self, name: &'static str) -> Result<(), BridgeError> {
        if name == "constructor" || !self.members.insert(name) {
            return Err(BridgeError::DuplicateMember {
                class: T::NAME,
                name: name.to_string(),
            });
        }
        Ok(())
    }

    fn claim_static(&mut self, name: &'static str) -> Result<(), BridgeError> {
        if name == "prototype" || !self.statics.insert(name) {
            return Err(BridgeError::DuplicateMember {
                class: T::NAME,
                name: name.to_string(),
            });
        }
        Ok(())
    }

    // =========================================================================
    // Instance members
    // =========================================================================

    /// Add a prototype function.
    pub fn function(&mut self, name: &'static str, function: NativeFunction) -> Result<&mut Self, BridgeError> {
        self.claim(name)?;
        let object = function.create(self.ctx, name);
        self.ctx
            .runtime()
            .define_property(self.prototype, name, Value::Object(object))?;
        Ok(self)
    }

    /// Add a method; the first closure parameter receives `this`.
    pub fn method<Args, Ret>(
        &mut self,
        name: &'static str,
        method: impl IntoNativeFunction<Args, Ret>,
    ) -> Result<&mut Self, BridgeError> {
        self.function(name, NativeFunction::method(method))
    }

    pub(crate) fn accessor(
        &mut self,
        name: &'static str,
        getter: NativeFunction,
        setter: Option<NativeFunction>,
    ) -> Result<&mut Self, BridgeError> {
        self.claim(name)?;
        property::install(self.ctx, self.prototype, name, getter, setter)?;
        Ok(self)
    }

    /// Add a read-write property.
    pub fn property<R, V>(
        &mut self,
        name: &'static str,
        mode: CacheMode,
        get: impl Fn(&T) -> R + 'static,
        set: impl Fn(&T, V) + 'static,
    ) -> Result<&mut Self, BridgeError>
    where
        R: ToScript,
        V: FromScript,
    {
        let compute: Compute<T> = property::typed_compute(get);
        let apply: Apply = property::typed_apply(set);
        self.accessor(
            name,
            property::getter(name, mode, compute),
            Some(property::setter(name, mode, apply)),
        )
    }

    /// Add a read-only property.
    pub fn readonly<R: ToScript>(
        &mut self,
        name: &'static str,
        mode: CacheMode,
        get: impl Fn(&T) -> R + 'static,
    ) -> Result<&mut Self, BridgeError> {
        let compute: Compute<T> = property::typed_compute(get);
        self.accessor(name, property::getter(name, mode, compute), None)
    }

    /// Add a signal-valued property.
    pub fn signal<S: SignalSource + 'static>(
        &mut self,
        name: &'static str,
        project: fn(&T) -> &S,
    ) -> Result<&mut Self, BridgeError> {
        let (getter, setter) = signal::signal_property(name, project);
        self.accessor(name, getter, Some(setter))
    }

    /// Add a delegate-valued property.
    pub fn delegate<D: DelegateSource + 'static>(
        &mut self,
        name: &'static str,
        project: fn(&T) -> &D,
    ) -> Result<&mut Self, BridgeError> {
        let (getter, setter) = signal::delegate_property(name, project);
        self.accessor(name, getter, Some(setter))
    }

    // =========================================================================
    // Static members
    // =========================================================================

    /// Add a function on the constructor.
    pub fn static_function(&mut self, name: &'static str, function: NativeFunction) -> Result<&mut Self, BridgeError> {
        self.claim_static(name)?;
        let object = function.create(self.ctx, name);
        self.ctx
            .runtime()
            .define_property(self.constructor, name, Value::Object(object))?;
        Ok(self)
    }

    /// Define a function on the constructor object rather than the prototype.
    pub fn static_method<Args, Ret>(
        &mut self,
        name: &'static str,
        function: impl IntoNativeFunction<Args, Ret>,
    ) -> Result<&mut Self, BridgeError> {
        self.static_function(name, NativeFunction::new(function))
    }

    /// Add a constant on the constructor.
    pub fn static_value(&mut self, name: &'static str, value: impl ToScript) -> Result<&mut Self, BridgeError> {
        self.claim_static(name)?;
        let value = self.ctx.to_script(value)?;
        self.ctx
            .runtime()
            .define_property(self.constructor, name, value)?;
        Ok(self)
    }
}

// =============================================================================
// Context entry points
// =============================================================================

impl Context {
    pub(crate) fn class_objects(&self, descriptor: &TypeDescriptor) -> Result<(ObjectRef, ObjectRef), BridgeError> {
        get_or_build(self, descriptor)
    }

    /// Prototype object of `T`, built on first request.
    pub fn prototype<T: NativeClass>(&self) -> Result<ObjectRef, BridgeError> {
        get_or_build(self, &TypeDescriptor::of::<T>()).map(|(prototype, _)| prototype)
    }

    /// Constructor function of `T`, built on first request.
    pub fn constructor<T: NativeClass>(&self) -> Result<Value, BridgeError> {
        get_or_build(self, &TypeDescriptor::of::<T>()).map(|(_, constructor)| Value::Object(constructor))
    }

    /// Check whether the class of `T` has been built.
    pub fn is_class_built<T: NativeClass>(&self) -> bool {
        self.inner().classes.borrow().contains_key(&TypeId::of::<T>())
    }

    /// Define `T`'s constructor as a property of `target`, under its class
    /// name.
    pub fn export_class<T: NativeClass>(&self, target: ObjectRef) -> Result<(), BridgeError> {
        let constructor = self.constructor::<T>()?;
        self.runtime().define_property(target, T::NAME, constructor)?;
        log::debug!("exported class {}", T::NAME);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BaseLink, NativeConstructor, Ownership};
    use crate::wrap::NativeRef;
    use std::cell::Cell;
    use std::rc::Rc;

    thread_local! {
        static SHAPE_BUILDS: Cell<u32> = const { Cell::new(0) };
    }

    struct Shape {
        sides: u32,
    }

    impl NativeClass for Shape {
        const NAME: &'static str = "Shape";
        const INTERNAL: bool = true;

        fn build(class: &mut ClassBuilder<'_, Self>) -> Result<(), BridgeError> {
            SHAPE_BUILDS.with(|n| n.set(n.get() + 1));
            class
                .method("sides", |this: NativeRef<Shape>| this.sides)?
                .static_value("KIND", "shape")?;
            Ok(())
        }
    }

    struct Square {
        shape: Shape,
    }

    impl AsRef<Shape> for Square {
        fn as_ref(&self) -> &Shape {
            &self.shape
        }
    }

    impl NativeClass for Square {
        const NAME: &'static str = "Square";
        const CONSTRUCTOR: Option<NativeConstructor<Self>> = Some(|args| {
            let _size: f64 = args.next()?;
            Ok(Rc::new(Square {
                shape: Shape { sides: 4 },
            }))
        });

        fn base() -> Option<BaseLink> {
            Some(BaseLink::of::<Square, Shape>())
        }
    }

    struct Twice;

    impl NativeClass for Twice {
        const NAME: &'static str = "Twice";

        fn build(class: &mut ClassBuilder<'_, Self>) -> Result<(), BridgeError> {
            class.method("a", || 1)?.method("a", || 2)?;
            Ok(())
        }
    }

    struct Detached;

    impl NativeClass for Detached {
        const NAME: &'static str = "Detached";
        const OWNERSHIP: Ownership = Ownership::OwnedWeak;
    }

    #[test]
    fn derived_first_builds_base_once() {
        let ctx = Context::new();
        let before = SHAPE_BUILDS.with(Cell::get);
        let square = ctx.prototype::<Square>().unwrap();
        let shape = ctx.prototype::<Shape>().unwrap();
        assert_eq!(SHAPE_BUILDS.with(Cell::get) - before, 1);
        assert_eq!(ctx.runtime().prototype_of(square), Some(shape));
    }

    #[test]
    fn constructors_are_linked() {
        let ctx = Context::new();
        let rt = ctx.runtime();
        let square = ctx.constructor::<Square>().unwrap().as_object().unwrap();
        let shape = ctx.constructor::<Shape>().unwrap().as_object().unwrap();
        assert_eq!(rt.prototype_of(square), Some(shape));
        assert_eq!(rt.get(square, "KIND").unwrap(), Value::string("shape"));
        let prototype = ctx.prototype::<Square>().unwrap();
        assert_eq!(rt.get(prototype, "constructor").unwrap(), Value::Object(square));
    }

    #[test]
    fn construct_from_script() {
        let ctx = Context::new();
        let rt = ctx.runtime();
        let constructor = ctx.constructor::<Square>().unwrap();
        let square = rt.construct(&constructor, &[Value::Number(2.0)]).unwrap();
        let object = square.as_object().unwrap();
        let sides = rt.get(object, "sides").unwrap();
        assert_eq!(rt.call(&sides, &square, &[]).unwrap(), Value::Number(4.0));
        assert_eq!(ctx.unwrap::<Shape>(&square).unwrap().sides, 4);
    }

    #[test]
    fn constructor_argument_errors_surface() {
        let ctx = Context::new();
        let constructor = ctx.constructor::<Square>().unwrap();
        let err = ctx
            .runtime()
            .construct(&constructor, &[Value::string("big")])
            .unwrap_err();
        assert!(err.message().contains("index 0"));
    }

    #[test]
    fn internal_class_rejects_new() {
        let ctx = Context::new();
        let rt = ctx.runtime();
        let constructor = ctx.constructor::<Shape>().unwrap();
        let err = rt.construct(&constructor, &[]).unwrap_err();
        assert!(err.message().contains("Shape cannot be constructed"));
        assert!(rt.construct(&constructor, &[ctx.internal_sentinel()]).is_ok());
    }

    #[test]
    fn weak_class_without_factory_rejects_new() {
        let ctx = Context::new();
        let constructor = ctx.constructor::<Detached>().unwrap();
        assert!(ctx.runtime().construct(&constructor, &[]).is_err());
    }

    #[test]
    fn call_without_new_fails() {
        let ctx = Context::new();
        let constructor = ctx.constructor::<Square>().unwrap();
        assert!(ctx.runtime().call(&constructor, &Value::Undefined, &[]).is_err());
    }

    #[test]
    fn constructed_object_cannot_be_reconstructed() {
        let ctx = Context::new();
        let rt = ctx.runtime();
        let constructor = ctx.constructor::<Square>().unwrap();
        let square = rt.construct(&constructor, &[Value::Number(2.0)]).unwrap();
        let err = rt.call(&constructor, &square, &[Value::Number(3.0)]).unwrap_err();
        assert!(err.message().contains("already constructed"));
        assert_eq!(ctx.unwrap::<Shape>(&square).unwrap().sides, 4);
    }

    #[test]
    fn duplicate_member_rejected() {
        let ctx = Context::new();
        let err = ctx.prototype::<Twice>().unwrap_err();
        assert!(matches!(err, BridgeError::DuplicateMember { class: "Twice", ref name } if name == "a"));
        assert!(!ctx.is_class_built::<Twice>());
    }

    #[test]
    fn classes_are_per_context() {
        let a = Context::new();
        let b = Context::new();
        a.prototype::<Shape>().unwrap();
        assert!(a.is_class_built::<Shape>());
        assert!(!b.is_class_built::<Shape>());
    }

    #[test]
    fn classes_survive_collection() {
        let ctx = Context::new();
        let prototype = ctx.prototype::<Square>().unwrap();
        ctx.runtime().collect_garbage();
        assert!(ctx.runtime().is_alive(prototype));
        assert_eq!(ctx.prototype::<Square>().unwrap(), prototype);
    }

    #[test]
    fn export_into_namespace() {
        let ctx = Context::new();
        let global = ctx.runtime().global();
        ctx.export_class::<Square>(global).unwrap();
        assert_eq!(
            ctx.runtime().get(global, "Square").unwrap(),
            ctx.constructor::<Square>().unwrap()
        );
    }
}
