//! Strong and weak handles to heap objects held from native code.

use std::fmt;
use std::rc::Weak;

use crate::runtime::{Runtime, RuntimeInner};
use crate::value::{ObjectRef, Value};

/// A GC root.
///
/// Keeps its object alive until dropped. Cloning adds another root. A
/// `Persistent` outliving its runtime is inert.
pub struct Persistent {
    runtime: Weak<RuntimeInner>,
    object: ObjectRef,
}

impl Persistent {
    /// Root `object` in `runtime`.
    pub fn new(runtime: &Runtime, object: ObjectRef) -> Self {
        runtime.inner().root(object);
        Self {
            runtime: runtime.downgrade(),
            object,
        }
    }

    /// The rooted object.
    pub fn object(&self) -> ObjectRef {
        self.object
    }

    /// The rooted object as a value.
    pub fn value(&self) -> Value {
        Value::Object(self.object)
    }

    /// Get a non-rooting reference to the same object.
    pub fn downgrade(&self) -> WeakObject {
        WeakObject::new(self.object)
    }
}

impl Clone for Persistent {
    fn clone(&self) -> Self {
        if let Some(inner) = self.runtime.upgrade() {
            inner.root(self.object);
        }
        Self {
            runtime: self.runtime.clone(),
            object: self.object,
        }
    }
}

impl Drop for Persistent {
    fn drop(&mut self) {
        if let Some(inner) = self.runtime.upgrade() {
            inner.unroot(self.object);
        }
    }
}

impl PartialEq for Persistent {
    fn eq(&self, other: &Self) -> bool {
        self.object == other.object
    }
}

impl fmt::Debug for Persistent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Persistent({})", self.object)
    }
}

/// A reference that does not keep its object alive.
///
/// Liveness is re-checked on every [`WeakObject::upgrade`]; the generation
/// in the reference guarantees a collected object is never confused with a
/// later one reusing its slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct WeakObject(ObjectRef);

impl WeakObject {
    /// Create a weak reference to `object`.
    pub fn new(object: ObjectRef) -> Self {
        Self(object)
    }

    /// The object, if it is still alive.
    pub fn upgrade(&self, runtime: &Runtime) -> Option<ObjectRef> {
        runtime.is_alive(self.0).then_some(self.0)
    }

    /// Check whether the object is still alive.
    pub fn is_alive(&self, runtime: &Runtime) -> bool {
        runtime.is_alive(self.0)
    }

    /// The referenced slot, alive or not.
    pub fn target(&self) -> ObjectRef {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clone_adds_root() {
        let rt = Runtime::new();
        let o = rt.new_object();
        let a = Persistent::new(&rt, o);
        let b = a.clone();
        drop(a);
        rt.collect_garbage();
        assert!(rt.is_alive(o));
        drop(b);
        rt.collect_garbage();
        assert!(!rt.is_alive(o));
        assert_eq!(rt.root_count(), 0);
    }

    #[test]
    fn weak_does_not_root() {
        let rt = Runtime::new();
        let o = rt.new_object();
        let weak = WeakObject::new(o);
        assert_eq!(weak.upgrade(&rt), Some(o));
        rt.collect_garbage();
        assert_eq!(weak.upgrade(&rt), None);
    }

    #[test]
    fn weak_survives_slot_reuse() {
        let rt = Runtime::new();
        let o = rt.new_object();
        let weak = WeakObject::new(o);
        rt.collect_garbage();
        let reused = rt.new_object();
        assert_eq!(reused.index, o.index);
        assert!(!weak.is_alive(&rt));
    }

    #[test]
    fn persistent_outliving_runtime_is_inert() {
        let rt = Runtime::new();
        let p = rt.persist(rt.new_object());
        drop(rt);
        drop(p);
    }
}
