//! The runtime handle: object creation, property access, calls, micro-tasks
//! and garbage collection.
//!
//! A [`Runtime`] is a cheap clonable handle to one runtime instance. All
//! operations borrow the heap only for the duration of a lookup; no borrow
//! is held while native closures, getters, setters or finalizers run, so
//! any of those may freely call back into the runtime.
//!
//! # Roots
//!
//! The collector treats these as roots:
//! - the global object
//! - objects held by a [`Persistent`](crate::Persistent)
//! - the callee, receiver and arguments of every call currently executing
//!
//! A bare [`Value`] held by native code is *not* a root.

use std::any::Any;
use std::borrow::Cow;
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::rc::{Rc, Weak};

use rustc_hash::FxHashMap;

use crate::error::Exception;
use crate::heap::{NativeCallable, ObjectKind, PropertySlot, ScriptHeap, ScriptObject};
use crate::persistent::Persistent;
use crate::value::{HiddenKey, ObjectRef, Value};

type Microtask = Box<dyn FnOnce(&Runtime) -> Result<(), Exception>>;

/// Result of a collection pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GcStats {
    /// Objects found reachable
    pub marked: usize,
    /// Objects unlinked from the heap
    pub collected: usize,
    /// Finalizers run
    pub finalized: usize,
}

pub(crate) struct RuntimeInner {
    heap: RefCell<ScriptHeap>,
    roots: RefCell<FxHashMap<ObjectRef, usize>>,
    frames: RefCell<Vec<ObjectRef>>,
    microtasks: RefCell<VecDeque<Microtask>>,
    global: ObjectRef,
    allocations: Cell<usize>,
    collecting: Cell<bool>,
}

impl RuntimeInner {
    pub(crate) fn root(&self, object: ObjectRef) {
        *self.roots.borrow_mut().entry(object).or_insert(0) += 1;
    }

    pub(crate) fn unroot(&self, object: ObjectRef) {
        let mut roots = self.roots.borrow_mut();
        if let Some(count) = roots.get_mut(&object) {
            *count -= 1;
            if *count == 0 {
                roots.remove(&object);
            }
        }
    }
}

/// Handle to a scripting runtime instance.
#[derive(Clone)]
pub struct Runtime {
    inner: Rc<RuntimeInner>,
}

impl Runtime {
    /// Create a runtime with an empty global object.
    pub fn new() -> Self {
        let mut heap = ScriptHeap::new();
        let global = heap.allocate(ScriptObject::new(ObjectKind::Plain, None));
        Self {
            inner: Rc::new(RuntimeInner {
                heap: RefCell::new(heap),
                roots: RefCell::new(FxHashMap::default()),
                frames: RefCell::new(Vec::new()),
                microtasks: RefCell::new(VecDeque::new()),
                global,
                allocations: Cell::new(0),
                collecting: Cell::new(false),
            }),
        }
    }

    /// The global object. Always reachable.
    pub fn global(&self) -> ObjectRef {
        self.inner.global
    }

    pub(crate) fn downgrade(&self) -> Weak<RuntimeInner> {
        Rc::downgrade(&self.inner)
    }

    pub(crate) fn inner(&self) -> &RuntimeInner {
        &self.inner
    }

    /// Check if two handles refer to the same runtime instance.
    pub fn ptr_eq(&self, other: &Runtime) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Root `object` for as long as the returned handle lives.
    pub fn persist(&self, object: ObjectRef) -> Persistent {
        Persistent::new(self, object)
    }

    // =========================================================================
    // Allocation
    // =========================================================================

    fn allocate(&self, object: ScriptObject) -> ObjectRef {
        self.inner.allocations.set(self.inner.allocations.get() + 1);
        self.inner.heap.borrow_mut().allocate(object)
    }

    /// Create an empty plain object with no prototype.
    pub fn new_object(&self) -> ObjectRef {
        self.allocate(ScriptObject::new(ObjectKind::Plain, None))
    }

    /// Create an empty plain object with the given prototype.
    pub fn new_object_with_proto(&self, prototype: Option<ObjectRef>) -> ObjectRef {
        self.allocate(ScriptObject::new(ObjectKind::Plain, prototype))
    }

    /// Create a function object backed by a native closure.
    pub fn new_function<F>(&self, name: &str, callable: F) -> ObjectRef
    where
        F: Fn(&Runtime, &Value, &[Value]) -> Result<Value, Exception> + 'static,
    {
        let callable: NativeCallable = Rc::new(callable);
        self.allocate(ScriptObject::new(
            ObjectKind::Function {
                name: Rc::from(name),
                callable,
            },
            None,
        ))
    }

    /// Create an array holding `items`.
    pub fn new_array(&self, items: Vec<Value>) -> ObjectRef {
        self.allocate(ScriptObject::new(ObjectKind::Array(items), None))
    }

    // =========================================================================
    // Inspection
    // =========================================================================

    fn with_object<R>(
        &self,
        object: ObjectRef,
        f: impl FnOnce(&ScriptObject) -> R,
    ) -> Result<R, Exception> {
        let heap = self.inner.heap.borrow();
        match heap.get(object) {
            Some(live) => Ok(f(live)),
            None => Err(collected(object)),
        }
    }

    fn with_object_mut<R>(
        &self,
        object: ObjectRef,
        f: impl FnOnce(&mut ScriptObject) -> R,
    ) -> Result<R, Exception> {
        let mut heap = self.inner.heap.borrow_mut();
        match heap.get_mut(object) {
            Some(live) => Ok(f(live)),
            None => Err(collected(object)),
        }
    }

    /// Check whether `object` has not been collected.
    pub fn is_alive(&self, object: ObjectRef) -> bool {
        self.inner.heap.borrow().contains(object)
    }

    /// The `typeof` tag of a value.
    pub fn type_of(&self, value: &Value) -> &'static str {
        match value {
            Value::Object(_) if self.is_function(value) => "function",
            other => other.type_name(),
        }
    }

    /// Check whether `value` is a callable function object.
    pub fn is_function(&self, value: &Value) -> bool {
        let Value::Object(object) = value else {
            return false;
        };
        self.with_object(*object, |o| matches!(o.kind, ObjectKind::Function { .. }))
            .unwrap_or(false)
    }

    /// Check whether `value` is an array.
    pub fn is_array(&self, value: &Value) -> bool {
        let Value::Object(object) = value else {
            return false;
        };
        self.with_object(*object, |o| matches!(o.kind, ObjectKind::Array(_)))
            .unwrap_or(false)
    }

    /// Name a function object was created with.
    pub fn function_name(&self, object: ObjectRef) -> Option<Rc<str>> {
        self.with_object(object, |o| match &o.kind {
            ObjectKind::Function { name, .. } => Some(name.clone()),
            _ => None,
        })
        .ok()
        .flatten()
    }

    /// Tag an object with a class name, reported by [`Runtime::class_name`].
    pub fn set_class_name(&self, object: ObjectRef, name: &str) -> Result<(), Exception> {
        self.with_object_mut(object, |o| o.class_name = Some(Rc::from(name)))
    }

    /// Class name of an object, inherited through the prototype chain.
    pub fn class_name(&self, object: ObjectRef) -> Option<Rc<str>> {
        let heap = self.inner.heap.borrow();
        let mut current = heap.get(object);
        while let Some(live) = current {
            if let Some(name) = &live.class_name {
                return Some(name.clone());
            }
            current = live.prototype.and_then(|p| heap.get(p));
        }
        None
    }

    // =========================================================================
    // Properties
    // =========================================================================

    fn lookup(&self, object: ObjectRef, key: &str) -> Result<Option<PropertySlot>, Exception> {
        let heap = self.inner.heap.borrow();
        let mut current = Some(heap.get(object).ok_or_else(|| collected(object))?);
        while let Some(live) = current {
            if let Some(slot) = live.properties.get(key) {
                return Ok(Some(slot.clone()));
            }
            current = live.prototype.and_then(|p| heap.get(p));
        }
        Ok(None)
    }

    /// Read a property, walking the prototype chain and invoking getters
    /// with `object` as the receiver.
    pub fn get(&self, object: ObjectRef, key: &str) -> Result<Value, Exception> {
        match self.lookup(object, key)? {
            None => Ok(Value::Undefined),
            Some(PropertySlot::Data(value)) => Ok(value),
            Some(PropertySlot::Accessor { getter: None, .. }) => Ok(Value::Undefined),
            Some(PropertySlot::Accessor {
                getter: Some(getter),
                ..
            }) => self.call(&getter, &Value::Object(object), &[]),
        }
    }

    /// Read a property of an arbitrary value.
    ///
    /// Reading from `null` or `undefined` throws; other primitives have no
    /// properties and yield `undefined`.
    pub fn get_value(&self, target: &Value, key: &str) -> Result<Value, Exception> {
        match target {
            Value::Object(object) => self.get(*object, key),
            Value::Undefined | Value::Null => Err(Exception::type_error(format!(
                "Cannot read properties of {} (reading '{}')",
                target.type_name(),
                key
            ))),
            _ => Ok(Value::Undefined),
        }
    }

    /// Assign a property.
    ///
    /// An accessor anywhere on the chain intercepts the write; assigning to
    /// an accessor without a setter throws. Otherwise the value lands as an
    /// own data property.
    pub fn set(&self, object: ObjectRef, key: &str, value: Value) -> Result<(), Exception> {
        match self.lookup(object, key)? {
            Some(PropertySlot::Accessor {
                setter: Some(setter),
                ..
            }) => {
                self.call(&setter, &Value::Object(object), &[value])?;
                Ok(())
            }
            Some(PropertySlot::Accessor { setter: None, .. }) => Err(Exception::type_error(
                format!("Cannot set property {} which has only a getter", key),
            )),
            _ => self.define_property(object, key, value),
        }
    }

    /// Define an own data property, bypassing accessors.
    pub fn define_property(&self, object: ObjectRef, key: &str, value: Value) -> Result<(), Exception> {
        self.with_object_mut(object, |o| {
            o.properties.insert(Rc::from(key), PropertySlot::Data(value));
        })
    }

    /// Define an own accessor property.
    pub fn define_accessor(
        &self,
        object: ObjectRef,
        key: &str,
        getter: Option<Value>,
        setter: Option<Value>,
    ) -> Result<(), Exception> {
        self.with_object_mut(object, |o| {
            o.properties
                .insert(Rc::from(key), PropertySlot::Accessor { getter, setter });
        })
    }

    /// Check for an own property.
    pub fn has_own_property(&self, object: ObjectRef, key: &str) -> bool {
        self.with_object(object, |o| o.properties.contains_key(key))
            .unwrap_or(false)
    }

    /// Check for a property anywhere on the prototype chain.
    pub fn has_property(&self, object: ObjectRef, key: &str) -> bool {
        matches!(self.lookup(object, key), Ok(Some(_)))
    }

    /// Remove an own property. Returns true if it existed.
    pub fn delete_property(&self, object: ObjectRef, key: &str) -> bool {
        self.with_object_mut(object, |o| o.properties.remove(key).is_some())
            .unwrap_or(false)
    }

    /// Own property names, sorted.
    pub fn own_keys(&self, object: ObjectRef) -> Vec<String> {
        let mut keys = self
            .with_object(object, |o| {
                o.properties.keys().map(|k| k.to_string()).collect::<Vec<_>>()
            })
            .unwrap_or_default();
        keys.sort();
        keys
    }

    /// Prototype of an object.
    pub fn prototype_of(&self, object: ObjectRef) -> Option<ObjectRef> {
        self.with_object(object, |o| o.prototype).ok().flatten()
    }

    /// Replace the prototype of an object. Rejects cycles.
    pub fn set_prototype(&self, object: ObjectRef, prototype: Option<ObjectRef>) -> Result<(), Exception> {
        let mut cursor = prototype;
        while let Some(link) = cursor {
            if link == object {
                return Err(Exception::type_error("Cyclic __proto__ value"));
            }
            cursor = self.prototype_of(link);
        }
        self.with_object_mut(object, |o| o.prototype = prototype)
    }

    /// Check whether `prototype` appears on `object`'s prototype chain.
    pub fn inherits_from(&self, object: ObjectRef, prototype: ObjectRef) -> bool {
        let mut cursor = self.prototype_of(object);
        while let Some(link) = cursor {
            if link == prototype {
                return true;
            }
            cursor = self.prototype_of(link);
        }
        false
    }

    // =========================================================================
    // Internal slots
    // =========================================================================

    /// Attach a native payload to an object, replacing any previous one.
    pub fn set_internal(&self, object: ObjectRef, data: Rc<dyn Any>) -> Result<(), Exception> {
        // The previous payload is dropped after the heap borrow is released.
        let previous = self.with_object_mut(object, |o| o.internal.replace(data))?;
        drop(previous);
        Ok(())
    }

    /// Native payload of an object.
    pub fn internal(&self, object: ObjectRef) -> Option<Rc<dyn Any>> {
        self.with_object(object, |o| o.internal.clone()).ok().flatten()
    }

    /// Detach and return the native payload of an object.
    pub fn take_internal(&self, object: ObjectRef) -> Option<Rc<dyn Any>> {
        self.with_object_mut(object, |o| o.internal.take()).ok().flatten()
    }

    // =========================================================================
    // Hidden maps
    // =========================================================================

    /// Read an entry of the hidden map `namespace` on `object`.
    pub fn hidden_get(&self, object: ObjectRef, namespace: &str, key: &HiddenKey) -> Option<Value> {
        self.with_object(object, |o| {
            o.hidden.get(namespace).and_then(|t| t.get(key)).cloned()
        })
        .ok()
        .flatten()
    }

    /// Write an entry of the hidden map `namespace`, creating the map lazily.
    pub fn hidden_set(
        &self,
        object: ObjectRef,
        namespace: impl Into<Cow<'static, str>>,
        key: HiddenKey,
        value: Value,
    ) -> Result<(), Exception> {
        let namespace = namespace.into();
        self.with_object_mut(object, |o| {
            o.hidden.entry(namespace).or_default().insert(key, value);
        })
    }

    /// Remove an entry of a hidden map, returning it.
    pub fn hidden_delete(&self, object: ObjectRef, namespace: &str, key: &HiddenKey) -> Option<Value> {
        self.with_object_mut(object, |o| {
            o.hidden.get_mut(namespace).and_then(|t| t.remove(key))
        })
        .ok()
        .flatten()
    }

    /// Drop a whole hidden map. Returns the number of entries removed.
    pub fn hidden_clear(&self, object: ObjectRef, namespace: &str) -> usize {
        self.with_object_mut(object, |o| {
            o.hidden.remove(namespace).map(|t| t.len()).unwrap_or(0)
        })
        .unwrap_or(0)
    }

    /// Number of entries in a hidden map.
    pub fn hidden_len(&self, object: ObjectRef, namespace: &str) -> usize {
        self.with_object(object, |o| o.hidden.get(namespace).map_or(0, |t| t.len()))
            .unwrap_or(0)
    }

    /// Keys of a hidden map, in no particular order.
    pub fn hidden_keys(&self, object: ObjectRef, namespace: &str) -> Vec<HiddenKey> {
        self.with_object(object, |o| {
            o.hidden
                .get(namespace)
                .map(|t| t.keys().cloned().collect())
                .unwrap_or_default()
        })
        .unwrap_or_default()
    }

    // =========================================================================
    // Finalizers
    // =========================================================================

    /// Register a closure to run once after `object` is collected.
    ///
    /// Finalizers run with no heap borrow held, in unspecified order, and
    /// never on runtime teardown.
    pub fn add_finalizer(&self, object: ObjectRef, finalizer: impl FnOnce() + 'static) -> Result<(), Exception> {
        self.with_object_mut(object, |o| o.finalizers.push(Box::new(finalizer)))
    }

    // =========================================================================
    // Arrays
    // =========================================================================

    /// Elements of an array, or `None` if `object` is not an array.
    pub fn array_elements(&self, object: ObjectRef) -> Option<Vec<Value>> {
        self.with_object(object, |o| match &o.kind {
            ObjectKind::Array(items) => Some(items.clone()),
            _ => None,
        })
        .ok()
        .flatten()
    }

    /// Length of an array, or `None` if `object` is not an array.
    pub fn array_len(&self, object: ObjectRef) -> Option<usize> {
        self.with_object(object, |o| match &o.kind {
            ObjectKind::Array(items) => Some(items.len()),
            _ => None,
        })
        .ok()
        .flatten()
    }

    /// Append to an array.
    pub fn array_push(&self, object: ObjectRef, value: Value) -> Result<(), Exception> {
        self.with_object_mut(object, |o| match &mut o.kind {
            ObjectKind::Array(items) => {
                items.push(value);
                Ok(())
            }
            _ => Err(Exception::type_error("push called on a non-array object")),
        })?
    }

    // =========================================================================
    // Calls
    // =========================================================================

    /// Call a function value with the given receiver and arguments.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn call(&self, function: &Value, this: &Value, args: &[Value]) -> Result<Value, Exception> {
        let Value::Object(callee) = function else {
            return Err(not_a_function(function));
        };
        let callable = self
            .with_object(*callee, |o| match &o.kind {
                ObjectKind::Function { callable, .. } => Some(callable.clone()),
                _ => None,
            })?
            .ok_or_else(|| not_a_function(function))?;

        let frame_base = {
            let mut frames = self.inner.frames.borrow_mut();
            let base = frames.len();
            frames.push(*callee);
            frames.extend(this.as_object());
            frames.extend(args.iter().filter_map(Value::as_object));
            base
        };
        let result = callable(self, this, args);
        self.inner.frames.borrow_mut().truncate(frame_base);
        result
    }

    /// Invoke a function as a constructor.
    ///
    /// The new object's prototype is the constructor's `prototype` property.
    /// If the constructor returns an object it replaces the new object.
    pub fn construct(&self, constructor: &Value, args: &[Value]) -> Result<Value, Exception> {
        if !self.is_function(constructor) {
            return Err(Exception::type_error(format!(
                "{} is not a constructor",
                self.type_of(constructor)
            )));
        }
        let prototype = self.get_value(constructor, "prototype")?.as_object();
        let instance = self.new_object_with_proto(prototype);
        let returned = self.call(constructor, &Value::Object(instance), args)?;
        match returned {
            Value::Object(_) => Ok(returned),
            _ => Ok(Value::Object(instance)),
        }
    }

    // =========================================================================
    // Micro-tasks
    // =========================================================================

    /// Queue work to run at the next micro-task checkpoint.
    pub fn enqueue_microtask(&self, task: impl FnOnce(&Runtime) -> Result<(), Exception> + 'static) {
        self.inner.microtasks.borrow_mut().push_back(Box::new(task));
    }

    /// Number of queued micro-tasks.
    pub fn pending_microtasks(&self) -> usize {
        self.inner.microtasks.borrow().len()
    }

    /// Run queued micro-tasks until the queue is empty, including tasks
    /// queued by tasks. Returns the number run.
    pub fn run_microtasks(&self) -> usize {
        let mut ran = 0;
        loop {
            let next = self.inner.microtasks.borrow_mut().pop_front();
            let Some(task) = next else {
                break;
            };
            if let Err(e) = task(self) {
                log::error!("unhandled exception in micro-task: {}", e);
            }
            ran += 1;
        }
        ran
    }

    // =========================================================================
    // Garbage collection
    // =========================================================================

    /// Run a full mark-and-sweep pass.
    ///
    /// Re-entrant calls (from a finalizer) are ignored and report empty
    /// stats.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn collect_garbage(&self) -> GcStats {
        if self.inner.collecting.replace(true) {
            return GcStats::default();
        }

        let mut roots: Vec<ObjectRef> = self.inner.roots.borrow().keys().copied().collect();
        roots.push(self.inner.global);
        roots.extend(self.inner.frames.borrow().iter().copied());

        let (marked, dead) = {
            let mut heap = self.inner.heap.borrow_mut();
            let marked = heap.mark(&roots);
            (marked, heap.sweep())
        };
        self.inner.allocations.set(0);

        let collected = dead.len();
        let mut finalized = 0;
        for mut object in dead {
            for finalizer in object.finalizers.drain(..) {
                finalizer();
                finalized += 1;
            }
            drop(object);
        }
        self.inner.collecting.set(false);

        let stats = GcStats {
            marked,
            collected,
            finalized,
        };
        log::debug!(
            "gc: marked {} collected {} finalized {}",
            stats.marked,
            stats.collected,
            stats.finalized
        );
        stats
    }

    /// Number of live heap objects, including the global object.
    pub fn live_objects(&self) -> usize {
        self.inner.heap.borrow().len()
    }

    /// Objects allocated since the last collection.
    pub fn allocations_since_gc(&self) -> usize {
        self.inner.allocations.get()
    }

    /// Number of distinct rooted objects.
    pub fn root_count(&self) -> usize {
        self.inner.roots.borrow().len()
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("heap", &*self.inner.heap.borrow())
            .field("roots", &self.inner.roots.borrow().len())
            .field("microtasks", &self.inner.microtasks.borrow().len())
            .finish()
    }
}

fn collected(object: ObjectRef) -> Exception {
    Exception::type_error(format!("object {} has been collected", object))
}

fn not_a_function(value: &Value) -> Exception {
    Exception::type_error(format!("{} is not a function", value.type_name()))
}
