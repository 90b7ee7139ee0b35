//! Hidden owner-scoped tables.
//!
//! An attached table is a hidden map on a script object. Values stored in
//! it are reachable exactly as long as the owner is, which is how the
//! bridge keeps script values that native code depends on (cached property
//! values, signal listeners) alive without leaking them past their owner.
//!
//! Each table lives under a namespace; the bridge uses two:
//!
//! ```text
//! "members"   cached property values, keyed by property name
//! "bindings"  signal listeners, keyed by signal name, then connection id
//! ```

use scriptbridge_core::{HiddenKey, ObjectRef, Value};

use crate::context::Context;
use crate::error::BridgeError;

/// View of one hidden table on an owner object.
#[derive(Clone, Copy)]
pub struct AttachedTable<'c> {
    ctx: &'c Context,
    owner: ObjectRef,
    namespace: &'static str,
}

impl<'c> AttachedTable<'c> {
    /// Namespace for cached member values.
    pub const MEMBERS: &'static str = "members";
    /// Namespace for signal listener bindings.
    pub const BINDINGS: &'static str = "bindings";

    pub fn new(ctx: &'c Context, owner: ObjectRef, namespace: &'static str) -> Self {
        Self {
            ctx,
            owner,
            namespace,
        }
    }

    pub fn members(ctx: &'c Context, owner: ObjectRef) -> Self {
        Self::new(ctx, owner, Self::MEMBERS)
    }

    pub fn bindings(ctx: &'c Context, owner: ObjectRef) -> Self {
        Self::new(ctx, owner, Self::BINDINGS)
    }

    pub fn owner(&self) -> ObjectRef {
        self.owner
    }

    pub fn namespace(&self) -> &'static str {
        self.namespace
    }

    /// Read the value stored under `key`, if any.
    pub fn get(&self, key: impl Into<HiddenKey>) -> Option<Value> {
        self.ctx
            .runtime()
            .hidden_get(self.owner, self.namespace, &key.into())
    }

    /// Store `value`, creating the table if needed.
    pub fn set(&self, key: impl Into<HiddenKey>, value: Value) -> Result<(), BridgeError> {
        self.ctx
            .runtime()
            .hidden_set(self.owner, self.namespace, key.into(), value)?;
        Ok(())
    }

    /// Remove and return the value stored under `key`.
    pub fn remove(&self, key: impl Into<HiddenKey>) -> Option<Value> {
        self.ctx
            .runtime()
            .hidden_delete(self.owner, self.namespace, &key.into())
    }

    pub fn contains(&self, key: impl Into<HiddenKey>) -> bool {
        self.get(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.ctx.runtime().hidden_len(self.owner, self.namespace)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every entry. Returns how many there were.
    pub fn clear(&self) -> usize {
        self.ctx.runtime().hidden_clear(self.owner, self.namespace)
    }

    pub fn keys(&self) -> Vec<HiddenKey> {
        self.ctx.runtime().hidden_keys(self.owner, self.namespace)
    }

    /// Table stored under `key`, if one exists.
    pub fn nested(&self, key: impl Into<HiddenKey>) -> Option<AttachedTable<'c>> {
        let holder = self.get(key)?.as_object()?;
        Some(Self::new(self.ctx, holder, self.namespace))
    }

    /// Table stored under `key`, created empty if absent.
    ///
    /// The nested table hangs off a bare holder object stored in this table,
    /// so it is reachable exactly as long as this table's owner.
    pub fn nested_or_create(&self, key: impl Into<HiddenKey>) -> Result<AttachedTable<'c>, BridgeError> {
        let key = key.into();
        if let Some(nested) = self.nested(key.clone()) {
            return Ok(nested);
        }
        let holder = self.ctx.runtime().new_object();
        self.set(key, Value::Object(holder))?;
        Ok(Self::new(self.ctx, holder, self.namespace))
    }
}

impl std::fmt::Debug for AttachedTable<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttachedTable")
            .field("owner", &self.owner)
            .field("namespace", &self.namespace)
            .field("len", &self.len())
            .finish()
    }
}
