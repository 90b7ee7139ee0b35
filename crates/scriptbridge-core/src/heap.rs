//! Generational object heap with mark-and-sweep collection.
//!
//! The heap owns every [`ScriptObject`]. Objects are addressed by
//! [`ObjectRef`]; freeing a slot bumps its generation so stale references
//! resolve to nothing instead of to whatever reused the slot.
//!
//! ```text
//!   slots: [ gen 0 | obj ] [ gen 3 | --- ] [ gen 1 | obj ] ...
//!                              ^
//!   free_list: [1]  ───────────┘
//! ```
//!
//! Collection is split in two so the runtime can run finalizers without
//! holding a borrow of the heap: [`ScriptHeap::mark`] flags everything
//! reachable from the given roots and [`ScriptHeap::sweep`] unlinks the rest
//! and hands the dead objects back to the caller.

use std::any::Any;
use std::borrow::Cow;
use std::fmt;
use std::rc::Rc;

use rustc_hash::FxHashMap;

use crate::error::Exception;
use crate::runtime::Runtime;
use crate::value::{HiddenKey, ObjectRef, Value};

/// Native body of a function object: `(runtime, this, args) -> result`.
pub type NativeCallable = Rc<dyn Fn(&Runtime, &Value, &[Value]) -> Result<Value, Exception>>;

/// Finalizer registered on an object, run once after it has been collected.
pub type Finalizer = Box<dyn FnOnce()>;

/// What kind of object a heap slot holds.
pub enum ObjectKind {
    /// Ordinary property bag
    Plain,
    /// Callable object backed by a native closure
    Function {
        /// Name reported in error messages
        name: Rc<str>,
        /// Closure invoked on call
        callable: NativeCallable,
    },
    /// Dense array of values
    Array(Vec<Value>),
}

impl fmt::Debug for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObjectKind::Plain => write!(f, "Plain"),
            ObjectKind::Function { name, .. } => write!(f, "Function({})", name),
            ObjectKind::Array(items) => write!(f, "Array(len={})", items.len()),
        }
    }
}

/// A named property on an object.
#[derive(Clone, Debug)]
pub enum PropertySlot {
    /// Plain value
    Data(Value),
    /// Getter/setter pair; either side may be absent
    Accessor {
        getter: Option<Value>,
        setter: Option<Value>,
    },
}

/// A single object on the script heap.
pub struct ScriptObject {
    pub(crate) kind: ObjectKind,
    pub(crate) properties: FxHashMap<Rc<str>, PropertySlot>,
    pub(crate) prototype: Option<ObjectRef>,
    pub(crate) class_name: Option<Rc<str>>,
    /// Opaque native payload, dropped when the object is swept
    pub(crate) internal: Option<Rc<dyn Any>>,
    /// Namespaced maps invisible to property lookup
    pub(crate) hidden: FxHashMap<Cow<'static, str>, FxHashMap<HiddenKey, Value>>,
    pub(crate) finalizers: Vec<Finalizer>,
}

impl ScriptObject {
    /// Create an object of the given kind with no properties.
    pub fn new(kind: ObjectKind, prototype: Option<ObjectRef>) -> Self {
        Self {
            kind,
            properties: FxHashMap::default(),
            prototype,
            class_name: None,
            internal: None,
            hidden: FxHashMap::default(),
            finalizers: Vec::new(),
        }
    }

    /// Push every object directly referenced by this one.
    fn trace(&self, out: &mut Vec<ObjectRef>) {
        fn push(value: &Value, out: &mut Vec<ObjectRef>) {
            if let Value::Object(object) = value {
                out.push(*object);
            }
        }

        if let Some(proto) = self.prototype {
            out.push(proto);
        }
        for slot in self.properties.values() {
            match slot {
                PropertySlot::Data(value) => push(value, out),
                PropertySlot::Accessor { getter, setter } => {
                    for value in getter.iter().chain(setter.iter()) {
                        push(value, out);
                    }
                }
            }
        }
        for table in self.hidden.values() {
            for (key, value) in table {
                if let HiddenKey::Object(object) = key {
                    out.push(*object);
                }
                push(value, out);
            }
        }
        if let ObjectKind::Array(items) = &self.kind {
            for value in items {
                push(value, out);
            }
        }
    }
}

impl fmt::Debug for ScriptObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptObject")
            .field("kind", &self.kind)
            .field("class_name", &self.class_name)
            .field("property_count", &self.properties.len())
            .field("prototype", &self.prototype)
            .field("has_internal", &self.internal.is_some())
            .finish()
    }
}

struct HeapSlot {
    generation: u32,
    marked: bool,
    object: Option<ScriptObject>,
}

/// Storage for script objects with generational indices.
pub struct ScriptHeap {
    slots: Vec<HeapSlot>,
    free_list: Vec<u32>,
    live: usize,
}

impl ScriptHeap {
    /// Create a new empty heap.
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free_list: Vec::new(),
            live: 0,
        }
    }

    /// Allocate a new object on the heap.
    pub fn allocate(&mut self, object: ScriptObject) -> ObjectRef {
        self.live += 1;
        if let Some(index) = self.free_list.pop() {
            let slot = &mut self.slots[index as usize];
            slot.object = Some(object);
            slot.marked = false;
            ObjectRef::new(index, slot.generation)
        } else {
            let index = self.slots.len() as u32;
            self.slots.push(HeapSlot {
                generation: 0,
                marked: false,
                object: Some(object),
            });
            ObjectRef::new(index, 0)
        }
    }

    /// Get an object, or `None` if the reference is stale.
    pub fn get(&self, object: ObjectRef) -> Option<&ScriptObject> {
        let slot = self.slots.get(object.index as usize)?;
        if slot.generation != object.generation {
            return None;
        }
        slot.object.as_ref()
    }

    /// Get an object mutably, or `None` if the reference is stale.
    pub fn get_mut(&mut self, object: ObjectRef) -> Option<&mut ScriptObject> {
        let slot = self.slots.get_mut(object.index as usize)?;
        if slot.generation != object.generation {
            return None;
        }
        slot.object.as_mut()
    }

    /// Check whether a reference still points at a live object.
    pub fn contains(&self, object: ObjectRef) -> bool {
        self.get(object).is_some()
    }

    /// Number of live objects.
    pub fn len(&self) -> usize {
        self.live
    }

    /// Check if the heap holds no live objects.
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Mark everything reachable from `roots`. Returns the number of marked
    /// objects. Stale roots are ignored.
    pub fn mark(&mut self, roots: &[ObjectRef]) -> usize {
        for slot in &mut self.slots {
            slot.marked = false;
        }

        let mut marked = 0;
        let mut worklist: Vec<ObjectRef> = roots.to_vec();
        let mut children = Vec::new();
        while let Some(object) = worklist.pop() {
            let Some(slot) = self.slots.get_mut(object.index as usize) else {
                continue;
            };
            if slot.generation != object.generation || slot.marked {
                continue;
            }
            let Some(live) = slot.object.as_ref() else {
                continue;
            };
            slot.marked = true;
            marked += 1;
            live.trace(&mut children);
            worklist.append(&mut children);
        }
        marked
    }

    /// Unlink every unmarked object and return them.
    ///
    /// The returned objects still own their finalizers and internal slots;
    /// the caller decides when to run and drop them.
    pub fn sweep(&mut self) -> Vec<ScriptObject> {
        let mut dead = Vec::new();
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if slot.marked {
                slot.marked = false;
                continue;
            }
            if let Some(object) = slot.object.take() {
                slot.generation = slot.generation.wrapping_add(1);
                self.free_list.push(index as u32);
                dead.push(object);
            }
        }
        self.live -= dead.len();
        dead
    }
}

impl Default for ScriptHeap {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ScriptHeap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptHeap")
            .field("slot_count", &self.slots.len())
            .field("free_count", &self.free_list.len())
            .field("live", &self.live)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plain() -> ScriptObject {
        ScriptObject::new(ObjectKind::Plain, None)
    }

    #[test]
    fn allocate_and_get() {
        let mut heap = ScriptHeap::new();
        let a = heap.allocate(plain());
        assert!(heap.contains(a));
        assert_eq!(heap.len(), 1);
    }

    #[test]
    fn sweep_unmarked() {
        let mut heap = ScriptHeap::new();
        let a = heap.allocate(plain());
        let b = heap.allocate(plain());
        assert_eq!(heap.mark(&[a]), 1);
        let dead = heap.sweep();
        assert_eq!(dead.len(), 1);
        assert!(heap.contains(a));
        assert!(!heap.contains(b));
        assert_eq!(heap.len(), 1);
    }

    #[test]
    fn stale_reference_after_reuse() {
        let mut heap = ScriptHeap::new();
        let a = heap.allocate(plain());
        heap.mark(&[]);
        heap.sweep();
        let b = heap.allocate(plain());
        assert_eq!(a.index, b.index);
        assert_ne!(a.generation, b.generation);
        assert!(heap.get(a).is_none());
        assert!(heap.get(b).is_some());
    }

    #[test]
    fn mark_follows_properties_and_prototype() {
        let mut heap = ScriptHeap::new();
        let proto = heap.allocate(plain());
        let child = heap.allocate(plain());
        let mut root = ScriptObject::new(ObjectKind::Plain, Some(proto));
        root.properties
            .insert(Rc::from("child"), PropertySlot::Data(Value::Object(child)));
        let root = heap.allocate(root);
        assert_eq!(heap.mark(&[root]), 3);
        assert!(heap.sweep().is_empty());
    }

    #[test]
    fn mark_follows_hidden_tables_and_arrays() {
        let mut heap = ScriptHeap::new();
        let kept = heap.allocate(plain());
        let element = heap.allocate(plain());
        let mut owner = plain();
        owner
            .hidden
            .entry(Cow::Borrowed("members"))
            .or_default()
            .insert(HiddenKey::from("x"), Value::Object(kept));
        let owner = heap.allocate(owner);
        let array = heap.allocate(ScriptObject::new(
            ObjectKind::Array(vec![Value::Object(element)]),
            None,
        ));
        assert_eq!(heap.mark(&[owner, array]), 4);
    }

    #[test]
    fn mark_follows_accessors() {
        let mut heap = ScriptHeap::new();
        let getter = heap.allocate(plain());
        let mut owner = plain();
        owner.properties.insert(
            Rc::from("x"),
            PropertySlot::Accessor {
                getter: Some(Value::Object(getter)),
                setter: None,
            },
        );
        let owner = heap.allocate(owner);
        assert_eq!(heap.mark(&[owner]), 2);
    }

    #[test]
    fn cycles_are_collected() {
        let mut heap = ScriptHeap::new();
        let a = heap.allocate(plain());
        let b = heap.allocate(plain());
        heap.get_mut(a)
            .unwrap()
            .properties
            .insert(Rc::from("b"), PropertySlot::Data(Value::Object(b)));
        heap.get_mut(b)
            .unwrap()
            .properties
            .insert(Rc::from("a"), PropertySlot::Data(Value::Object(a)));
        heap.mark(&[]);
        assert_eq!(heap.sweep().len(), 2);
        assert!(heap.is_empty());
    }
}
