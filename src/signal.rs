//! Native signals and their script bridge.
//!
//! [`Signal`] and [`Event`] are native multi-listener sources. Script code
//! reaches them through signal-valued properties, which return a small
//! handle object:
//!
//! ```text
//! const id = button.onClick.connect(() => { ... });
//! button.onClick.disconnect(id);
//! button.onClick.disconnectAll();
//! button.onClick.isEmpty();
//! button.onClick = fn;        // same as connect(fn)
//! ```
//!
//! The native slot holds the script listener weakly. The strong reference
//! lives in the owner's `"bindings"` table under `[signal name][id]`, so
//! listeners die with the widget they listen to and the handle object can
//! be recreated freely.
//!
//! [`Delegate`] is the single-function counterpart used for hooks that
//! return a value.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use scriptbridge_core::{ObjectRef, Value, WeakObject};

use crate::attached::AttachedTable;
use crate::callback::{Arguments, NativeFunction, ScriptCallback, ScriptFunction, WeakCallback};
use crate::context::Context;
use crate::convert::{FromScript, ToScriptArgs};
use crate::error::BridgeError;
use crate::prototype::ClassBuilder;
use crate::property::{self, Apply, CacheMode, Compute};
use crate::types::NativeClass;
use crate::wrap::{NativeHandle, NativeRef};

/// Connection id, unique per signal and never reused.
pub type SlotId = u64;

/// Notified when the first listener connects to an empty signal.
pub trait SignalDelegate {
    fn on_connect(&self, identifier: i32);
}

// =============================================================================
// Slot list
// =============================================================================

struct SlotList<F: ?Sized> {
    slots: RefCell<Vec<(SlotId, Rc<F>)>>,
    next_id: Cell<SlotId>,
    delegate: RefCell<Option<(i32, Weak<dyn SignalDelegate>)>>,
}

impl<F: ?Sized> SlotList<F> {
    fn new() -> Self {
        Self {
            slots: RefCell::new(Vec::new()),
            next_id: Cell::new(1),
            delegate: RefCell::new(None),
        }
    }

    fn connect(&self, slot: Rc<F>) -> SlotId {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        let was_empty = {
            let mut slots = self.slots.borrow_mut();
            let was_empty = slots.is_empty();
            slots.push((id, slot));
            was_empty
        };
        if was_empty {
            let delegate = self.delegate.borrow().clone();
            if let Some((identifier, delegate)) = delegate
                && let Some(delegate) = delegate.upgrade()
            {
                delegate.on_connect(identifier);
            }
        }
        id
    }

    fn disconnect(&self, id: SlotId) -> bool {
        let mut slots = self.slots.borrow_mut();
        match slots.iter().position(|(slot_id, _)| *slot_id == id) {
            Some(index) => {
                slots.remove(index);
                true
            }
            None => false,
        }
    }

    fn disconnect_all(&self) {
        // Slots are dropped after the borrow ends; their destructors may
        // touch this list.
        let slots = std::mem::take(&mut *self.slots.borrow_mut());
        drop(slots);
    }

    fn is_empty(&self) -> bool {
        self.slots.borrow().is_empty()
    }

    fn len(&self) -> usize {
        self.slots.borrow().len()
    }

    fn snapshot(&self) -> Vec<Rc<F>> {
        self.slots
            .borrow()
            .iter()
            .map(|(_, slot)| slot.clone())
            .collect()
    }

    fn set_delegate(&self, identifier: i32, delegate: Weak<dyn SignalDelegate>) {
        *self.delegate.borrow_mut() = Some((identifier, delegate));
    }
}

// =============================================================================
// Signal / Event
// =============================================================================

/// A multi-listener notification.
pub struct Signal<A> {
    slots: SlotList<dyn Fn(&A)>,
}

impl<A: 'static> Signal<A> {
    pub fn new() -> Self {
        Self {
            slots: SlotList::new(),
        }
    }

    /// Add a listener.
    pub fn connect(&self, slot: impl Fn(&A) + 'static) -> SlotId {
        self.slots.connect(Rc::new(slot))
    }

    /// Remove a listener. Unknown ids are ignored.
    pub fn disconnect(&self, id: SlotId) -> bool {
        self.slots.disconnect(id)
    }

    pub fn disconnect_all(&self) {
        self.slots.disconnect_all();
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn set_delegate(&self, identifier: i32, delegate: Weak<dyn SignalDelegate>) {
        self.slots.set_delegate(identifier, delegate);
    }

    /// Call every listener in connection order.
    ///
    /// Listeners connected or disconnected during emission take effect from
    /// the next emission.
    pub fn emit(&self, args: &A) {
        for slot in self.slots.snapshot() {
            slot(args);
        }
    }
}

impl<A: 'static> Default for Signal<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A> fmt::Debug for Signal<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("slots", &self.slots.len())
            .finish()
    }
}

/// A signal whose listeners can claim it.
///
/// Emission stops at the first listener returning `true`.
pub struct Event<A> {
    slots: SlotList<dyn Fn(&A) -> bool>,
}

impl<A: 'static> Event<A> {
    pub fn new() -> Self {
        Self {
            slots: SlotList::new(),
        }
    }

    pub fn connect(&self, slot: impl Fn(&A) -> bool + 'static) -> SlotId {
        self.slots.connect(Rc::new(slot))
    }

    pub fn disconnect(&self, id: SlotId) -> bool {
        self.slots.disconnect(id)
    }

    pub fn disconnect_all(&self) {
        self.slots.disconnect_all();
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn set_delegate(&self, identifier: i32, delegate: Weak<dyn SignalDelegate>) {
        self.slots.set_delegate(identifier, delegate);
    }

    /// Emit, returning whether a listener handled the event.
    pub fn emit(&self, args: &A) -> bool {
        self.slots.snapshot().into_iter().any(|slot| slot(args))
    }
}

impl<A: 'static> Default for Event<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A> fmt::Debug for Event<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("slots", &self.slots.len())
            .finish()
    }
}

// =============================================================================
// Script listeners
// =============================================================================

/// A signal that accepts script listeners.
pub trait SignalSource {
    /// Connect a script listener.
    fn connect_script(&self, callback: ScriptCallback) -> SlotId;
    fn disconnect(&self, id: SlotId) -> bool;
    fn disconnect_all(&self);
    fn is_empty(&self) -> bool;
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Undefined | Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => *n != 0.0 && !n.is_nan(),
        Value::String(s) => !s.is_empty(),
        Value::Object(_) => true,
    }
}

impl<A: ToScriptArgs + Clone + 'static> SignalSource for Signal<A> {
    fn connect_script(&self, callback: ScriptCallback) -> SlotId {
        self.connect(move |args: &A| {
            if let Err(err) = callback.invoke(args.clone()) {
                log::error!("signal listener threw: {}", err);
            }
        })
    }

    fn disconnect(&self, id: SlotId) -> bool {
        self.slots.disconnect(id)
    }

    fn disconnect_all(&self) {
        self.slots.disconnect_all();
    }

    fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl<A: ToScriptArgs + Clone + 'static> SignalSource for Event<A> {
    fn connect_script(&self, callback: ScriptCallback) -> SlotId {
        self.connect(move |args: &A| match callback.invoke(args.clone()) {
            Ok(ret) => ret.as_ref().is_some_and(truthy),
            Err(err) => {
                log::error!("event handler threw: {}", err);
                false
            }
        })
    }

    fn disconnect(&self, id: SlotId) -> bool {
        self.slots.disconnect(id)
    }

    fn disconnect_all(&self) {
        self.slots.disconnect_all();
    }

    fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

// =============================================================================
// Delegate
// =============================================================================

/// A single native hook returning a value.
pub struct Delegate<A, R = ()> {
    handler: RefCell<Option<Rc<dyn Fn(A) -> R>>>,
}

impl<A: 'static, R: 'static> Delegate<A, R> {
    pub fn new() -> Self {
        Self {
            handler: RefCell::new(None),
        }
    }

    pub fn set(&self, handler: impl Fn(A) -> R + 'static) {
        *self.handler.borrow_mut() = Some(Rc::new(handler));
    }

    pub fn reset(&self) {
        let previous = self.handler.borrow_mut().take();
        drop(previous);
    }

    pub fn is_set(&self) -> bool {
        self.handler.borrow().is_some()
    }

    /// Call the handler, if one is set.
    pub fn call(&self, args: A) -> Option<R> {
        let handler = self.handler.borrow().clone()?;
        Some(handler(args))
    }
}

impl<A: 'static, R: 'static> Default for Delegate<A, R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A, R> fmt::Debug for Delegate<A, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delegate")
            .field("set", &self.handler.borrow().is_some())
            .finish()
    }
}

/// A delegate that accepts a script function.
pub trait DelegateSource {
    /// Install `callback` as the handler, or clear it with `None`.
    fn set_script(&self, callback: Option<ScriptCallback>);
}

impl<A, R> DelegateSource for Delegate<A, R>
where
    A: ToScriptArgs + 'static,
    R: FromScript + Default + 'static,
{
    fn set_script(&self, callback: Option<ScriptCallback>) {
        let Some(callback) = callback else {
            self.reset();
            return;
        };
        self.set(move |args: A| match callback.invoke_returning::<A, R>(args) {
            Ok(ret) => ret.unwrap_or_default(),
            Err(err) => {
                log::error!("delegate threw: {}", err);
                R::default()
            }
        });
    }
}

// =============================================================================
// Signal handle
// =============================================================================

type Access = Rc<dyn Fn(&Context, &Value, &mut dyn FnMut(&dyn SignalSource)) -> Result<(), BridgeError>>;

/// Script-side view of one signal on one owner.
///
/// Holds its owner weakly; every operation fails with
/// [`BridgeError::OwnerCollected`] once the owner is gone.
pub struct SignalHandle {
    owner: WeakObject,
    name: &'static str,
    access: Access,
}

impl SignalHandle {
    pub fn name(&self) -> &'static str {
        self.name
    }

    fn owner(&self, ctx: &Context, operation: &'static str) -> Result<ObjectRef, BridgeError> {
        self.owner
            .upgrade(ctx.runtime())
            .ok_or(BridgeError::owner_collected(operation))
    }

    fn with_source<R>(
        &self,
        ctx: &Context,
        operation: &'static str,
        op: impl FnOnce(&dyn SignalSource) -> R,
    ) -> Result<R, BridgeError> {
        let owner = self.owner(ctx, operation)?;
        let mut op = Some(op);
        let mut out = None;
        (self.access)(ctx, &Value::Object(owner), &mut |source: &dyn SignalSource| {
            if let Some(op) = op.take() {
                out = Some(op(source));
            }
        })?;
        out.ok_or(BridgeError::owner_collected(operation))
    }

    /// Connect a script function, anchoring it in the owner's bindings.
    pub fn connect(&self, ctx: &Context, function: &Value) -> Result<SlotId, BridgeError> {
        let owner = self.owner(ctx, "connect")?;
        let callback = ScriptCallback::weak(ctx, function)?;
        let id = self.with_source(ctx, "connect", |source| source.connect_script(callback))?;
        AttachedTable::bindings(ctx, owner)
            .nested_or_create(self.name)?
            .set(id, function.clone())?;
        log::debug!("connected {} listener {} on {}", self.name, id, owner);
        Ok(id)
    }

    /// Disconnect one listener. Unknown ids are ignored.
    pub fn disconnect(&self, ctx: &Context, id: SlotId) -> Result<(), BridgeError> {
        let owner = self.owner(ctx, "disconnect")?;
        self.with_source(ctx, "disconnect", |source| source.disconnect(id))?;
        if let Some(listeners) = AttachedTable::bindings(ctx, owner).nested(self.name) {
            listeners.remove(id);
        }
        log::debug!("disconnected {} listener {} on {}", self.name, id, owner);
        Ok(())
    }

    pub fn disconnect_all(&self, ctx: &Context) -> Result<(), BridgeError> {
        let owner = self.owner(ctx, "disconnectAll")?;
        self.with_source(ctx, "disconnectAll", |source| source.disconnect_all())?;
        AttachedTable::bindings(ctx, owner).remove(self.name);
        log::debug!("disconnected all {} listeners on {}", self.name, owner);
        Ok(())
    }

    pub fn is_empty(&self, ctx: &Context) -> Result<bool, BridgeError> {
        self.with_source(ctx, "isEmpty", |source| source.is_empty())
    }
}

impl fmt::Debug for SignalHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignalHandle")
            .field("owner", &self.owner)
            .field("name", &self.name)
            .finish()
    }
}

/// Ids arrive as numbers; anything that is not a valid id matches nothing.
fn slot_id(value: f64) -> Option<SlotId> {
    (value >= 1.0 && value.fract() == 0.0 && value <= u64::MAX as f64).then_some(value as SlotId)
}

impl NativeClass for SignalHandle {
    const NAME: &'static str = "Signal";
    const IDENTITY_CACHED: bool = false;
    const INTERNAL: bool = true;

    fn build(class: &mut ClassBuilder<'_, Self>) -> Result<(), BridgeError> {
        class
            .function(
                "connect",
                NativeFunction::raw(|args| {
                    let handle: NativeRef<SignalHandle> = args.holder()?;
                    let function: ScriptFunction = args.next()?;
                    let id = handle.connect(args.context(), &function.0)?;
                    Ok(Value::Number(id as f64))
                }),
            )?
            .function(
                "disconnect",
                NativeFunction::raw(|args| {
                    let handle: NativeRef<SignalHandle> = args.holder()?;
                    let id: f64 = args.next()?;
                    match slot_id(id) {
                        Some(id) => handle.disconnect(args.context(), id)?,
                        None => {
                            handle.owner(args.context(), "disconnect")?;
                        }
                    }
                    Ok(Value::Undefined)
                }),
            )?
            .function(
                "disconnectAll",
                NativeFunction::raw(|args| {
                    let handle: NativeRef<SignalHandle> = args.holder()?;
                    handle.disconnect_all(args.context())?;
                    Ok(Value::Undefined)
                }),
            )?
            .function(
                "isEmpty",
                NativeFunction::raw(|args| {
                    let handle: NativeRef<SignalHandle> = args.holder()?;
                    Ok(Value::Bool(handle.is_empty(args.context())?))
                }),
            )?;
        Ok(())
    }
}

// =============================================================================
// Property factories
// =============================================================================

/// Getter and setter of a signal-valued property.
pub(crate) fn signal_property<T, S>(name: &'static str, project: fn(&T) -> &S) -> (NativeFunction, NativeFunction)
where
    T: NativeClass,
    S: SignalSource + 'static,
{
    let access: Access = Rc::new(
        move |ctx: &Context, owner: &Value, op: &mut dyn FnMut(&dyn SignalSource)| {
            let native = ctx.unwrap::<T>(owner)?;
            op(project(&native));
            Ok(())
        },
    );
    let compute: Compute<T> = Rc::new(move |ctx: &Context, owner: ObjectRef, _native: &T| {
        let handle = SignalHandle {
            owner: WeakObject::new(owner),
            name,
            access: access.clone(),
        };
        ctx.wrap(NativeHandle::strong(Rc::new(handle)))
    });
    let apply: Apply = Rc::new(move |args: &mut Arguments<'_>| {
        let function: Option<ScriptFunction> = args.next()?;
        let ctx = args.context();
        let Some(owner) = property::receiver::<T>(ctx, args.this())?
            .and_then(|_| args.this().as_object())
        else {
            return Ok(false);
        };
        let handle = ctx.runtime().get(owner, name)?;
        let handle = ctx.unwrap::<SignalHandle>(&handle)?;
        match function {
            Some(function) => {
                handle.connect(ctx, &function.0)?;
            }
            None => handle.disconnect_all(ctx)?,
        }
        Ok(true)
    });
    (
        property::getter(name, CacheMode::CacheFirstGet, compute),
        property::setter(name, CacheMode::NoCache, apply),
    )
}

/// Getter and setter of a delegate-valued property.
pub(crate) fn delegate_property<T, D>(name: &'static str, project: fn(&T) -> &D) -> (NativeFunction, NativeFunction)
where
    T: NativeClass,
    D: DelegateSource + 'static,
{
    let compute: Compute<T> = Rc::new(|_: &Context, _: ObjectRef, _: &T| Ok(Value::Null));
    let apply: Apply = Rc::new(move |args: &mut Arguments<'_>| {
        let callback: Option<WeakCallback> = args.next()?;
        let Some(native) = property::receiver::<T>(args.context(), args.this())? else {
            return Ok(false);
        };
        project(&native).set_script(callback.map(|weak| weak.0));
        Ok(true)
    });
    (
        property::getter(name, CacheMode::CacheAlways, compute),
        property::setter(name, CacheMode::CacheAlways, apply),
    )
}
