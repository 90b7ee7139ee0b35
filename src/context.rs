//! The per-runtime context threaded through every bridge entry point.
//!
//! A [`Context`] owns everything the bridge caches for one runtime
//! instance: the built classes, the wrapper identity cache, the internal
//! constructor sentinel and the posted-task queue. Dropping the last handle
//! tears it all down with the runtime.
//!
//! Native closures stored inside the runtime hold a [`WeakContext`] so the
//! heap never keeps its own context alive.

use std::any::TypeId;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::Arc;

use rustc_hash::{FxHashMap, FxHashSet};
use scriptbridge_core::{Persistent, Runtime, Value, WeakObject};

use crate::config::BridgeConfig;
use crate::convert::{FromScript, ToScript};
use crate::error::BridgeError;
use crate::prototype::ClassEntry;
use crate::task::{TaskPoster, TaskQueue};

/// Identity cache key: concrete type plus native address.
pub(crate) type IdentityKey = (TypeId, usize);

pub(crate) struct ContextInner {
    runtime: Runtime,
    config: BridgeConfig,
    pub(crate) classes: RefCell<FxHashMap<TypeId, ClassEntry>>,
    pub(crate) building: RefCell<FxHashSet<TypeId>>,
    pub(crate) identity: RefCell<FxHashMap<IdentityKey, WeakObject>>,
    sentinel: Persistent,
    depth: Cell<usize>,
    tasks: Arc<TaskQueue>,
}

impl Drop for ContextInner {
    fn drop(&mut self) {
        let discarded = self.tasks.close();
        if discarded > 0 {
            log::debug!("context dropped with {} posted tasks pending", discarded);
        }
    }
}

/// Handle to the bridge state of one runtime instance.
#[derive(Clone)]
pub struct Context {
    inner: Rc<ContextInner>,
}

/// Non-owning handle to a [`Context`].
#[derive(Clone)]
pub struct WeakContext(Weak<ContextInner>);

impl WeakContext {
    /// The context, if it is still alive.
    pub fn upgrade(&self) -> Option<Context> {
        self.0.upgrade().map(|inner| Context { inner })
    }
}

impl fmt::Debug for WeakContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WeakContext(alive: {})", self.0.strong_count() > 0)
    }
}

impl Context {
    /// Create a context over a fresh runtime with default settings.
    pub fn new() -> Self {
        Self::with_config(BridgeConfig::default())
    }

    /// Create a context over a fresh runtime.
    pub fn with_config(config: BridgeConfig) -> Self {
        Self::with_runtime(Runtime::new(), config)
    }

    /// Create a context over an existing runtime.
    pub fn with_runtime(runtime: Runtime, config: BridgeConfig) -> Self {
        let sentinel = runtime.new_object();
        let _ = runtime.set_class_name(sentinel, "InternalSentinel");
        let sentinel = runtime.persist(sentinel);
        Self {
            inner: Rc::new(ContextInner {
                runtime,
                config,
                classes: RefCell::new(FxHashMap::default()),
                building: RefCell::new(FxHashSet::default()),
                identity: RefCell::new(FxHashMap::default()),
                sentinel,
                depth: Cell::new(0),
                tasks: Arc::new(TaskQueue::new()),
            }),
        }
    }

    pub(crate) fn inner(&self) -> &ContextInner {
        &self.inner
    }

    /// The runtime this context bridges to.
    pub fn runtime(&self) -> &Runtime {
        &self.inner.runtime
    }

    /// Bridge settings.
    pub fn config(&self) -> &BridgeConfig {
        &self.inner.config
    }

    /// Get a non-owning handle.
    pub fn downgrade(&self) -> WeakContext {
        WeakContext(Rc::downgrade(&self.inner))
    }

    /// Check if two handles refer to the same context.
    pub fn ptr_eq(&self, other: &Context) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// The global object of the runtime.
    pub fn global(&self) -> Value {
        Value::Object(self.inner.runtime.global())
    }

    /// Value passed as first constructor argument when the bridge itself
    /// instantiates a class.
    pub fn internal_sentinel(&self) -> Value {
        self.inner.sentinel.value()
    }

    pub(crate) fn is_internal_sentinel(&self, value: &Value) -> bool {
        value.strict_equals(&self.inner.sentinel.value())
    }

    // =========================================================================
    // Conversion entry points
    // =========================================================================

    /// Convert a native value for script.
    pub fn to_script<T: ToScript>(&self, value: T) -> Result<Value, BridgeError> {
        value.to_script(self).map_err(BridgeError::from)
    }

    /// Convert a script value to a native type.
    pub fn from_script<T: FromScript>(&self, value: &Value) -> Result<T, BridgeError> {
        T::from_script(self, value).map_err(BridgeError::from)
    }

    // =========================================================================
    // Re-entrancy guard
    // =========================================================================

    /// Current nesting of cross-boundary calls.
    pub fn call_depth(&self) -> usize {
        self.inner.depth.get()
    }

    /// Enter a cross-boundary call.
    ///
    /// With `checkpoint` set, leaving the outermost scope drains micro-tasks
    /// (and runs a collection past the configured threshold).
    pub(crate) fn enter(&self, checkpoint: bool) -> Result<CallScope, BridgeError> {
        let depth = self.inner.depth.get();
        if depth >= self.inner.config.max_call_depth {
            return Err(BridgeError::CallDepthExceeded {
                limit: self.inner.config.max_call_depth,
            });
        }
        self.inner.depth.set(depth + 1);
        Ok(CallScope {
            ctx: self.clone(),
            checkpoint,
        })
    }

    /// Call a script function from native code.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn call_function(&self, function: &Value, this: &Value, args: &[Value]) -> Result<Value, BridgeError> {
        let _scope = self.enter(true)?;
        self.inner
            .runtime
            .call(function, this, args)
            .map_err(BridgeError::from)
    }

    // =========================================================================
    // Posted tasks
    // =========================================================================

    /// Get a thread-safe handle for posting work to this context.
    pub fn task_poster(&self) -> TaskPoster {
        TaskPoster::new(self.inner.tasks.clone())
    }

    /// Install a callback run after every post, from the posting thread, so
    /// the host loop can schedule [`Context::run_posted_tasks`].
    pub fn set_task_waker(&self, waker: impl Fn() + Send + Sync + 'static) {
        self.inner.tasks.set_waker(Arc::new(waker));
    }

    /// Run posted tasks in order until the queue is empty. Returns the
    /// number run.
    pub fn run_posted_tasks(&self) -> Result<usize, BridgeError> {
        let mut ran = 0;
        while !self.inner.tasks.is_empty() {
            // Entered before popping so a depth failure leaves the task queued.
            let _scope = self.enter(true)?;
            let Some(task) = self.inner.tasks.pop() else {
                break;
            };
            task(self);
            ran += 1;
        }
        if ran > 0 {
            log::trace!("ran {} posted tasks", ran);
        }
        Ok(ran)
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("config", &self.inner.config)
            .field("classes", &self.inner.classes.borrow().len())
            .field("identity_cache", &self.inner.identity.borrow().len())
            .field("depth", &self.inner.depth.get())
            .finish()
    }
}

/// Guard for one cross-boundary call; see [`Context::enter`].
pub(crate) struct CallScope {
    ctx: Context,
    checkpoint: bool,
}

impl Drop for CallScope {
    fn drop(&mut self) {
        let inner = &self.ctx.inner;
        let depth = inner.depth.get().saturating_sub(1);
        inner.depth.set(depth);
        if depth > 0 || !self.checkpoint {
            return;
        }
        if inner.config.drain_microtasks {
            // Drained at depth zero; micro-tasks calling back in re-enter
            // through their own scopes.
            inner.runtime.run_microtasks();
        }
        let threshold = inner.config.gc_threshold;
        if threshold > 0 && inner.runtime.allocations_since_gc() >= threshold {
            inner.runtime.collect_garbage();
        }
    }
}
