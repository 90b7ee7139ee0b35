//! Posting work to the runtime thread.
//!
//! Script values never leave the runtime thread. Other threads hand work
//! over as a boxed closure through a [`TaskPoster`]; the runtime thread
//! runs it later with [`Context::run_posted_tasks`](crate::Context::run_posted_tasks).
//!
//! ```ignore
//! let poster = ctx.task_poster();
//! std::thread::spawn(move || {
//!     let bytes = download();
//!     poster.post(move |ctx| {
//!         let _ = window.on_loaded(ctx, bytes);
//!     });
//! });
//! ```

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::context::Context;

/// Work posted to the runtime thread.
pub type Task = Box<dyn FnOnce(&Context) + Send>;

type Waker = Arc<dyn Fn() + Send + Sync>;

struct QueueState {
    tasks: VecDeque<Task>,
    closed: bool,
}

/// Queue shared between a context and its posters.
pub(crate) struct TaskQueue {
    state: Mutex<QueueState>,
    waker: Mutex<Option<Waker>>,
}

impl TaskQueue {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                tasks: VecDeque::new(),
                closed: false,
            }),
            waker: Mutex::new(None),
        }
    }

    fn push(&self, task: Task) -> bool {
        {
            let mut state = self.state.lock();
            if state.closed {
                return false;
            }
            state.tasks.push_back(task);
        }
        let waker = self.waker.lock().clone();
        if let Some(waker) = waker {
            waker();
        }
        true
    }

    pub(crate) fn pop(&self) -> Option<Task> {
        self.state.lock().tasks.pop_front()
    }

    pub(crate) fn set_waker(&self, waker: Waker) {
        *self.waker.lock() = Some(waker);
    }

    /// Refuse further posts and drop pending tasks. Returns how many were
    /// dropped.
    pub(crate) fn close(&self) -> usize {
        let pending = {
            let mut state = self.state.lock();
            state.closed = true;
            std::mem::take(&mut state.tasks)
        };
        self.waker.lock().take();
        pending.len()
    }

    fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    pub(crate) fn len(&self) -> usize {
        self.state.lock().tasks.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.state.lock().tasks.is_empty()
    }
}

/// Thread-safe handle for posting tasks to a context.
#[derive(Clone)]
pub struct TaskPoster {
    queue: Arc<TaskQueue>,
}

impl TaskPoster {
    pub(crate) fn new(queue: Arc<TaskQueue>) -> Self {
        Self { queue }
    }

    /// Queue `task` for the runtime thread.
    ///
    /// Returns `false`, dropping the task, if the context is gone.
    pub fn post(&self, task: impl FnOnce(&Context) + Send + 'static) -> bool {
        let posted = self.queue.push(Box::new(task));
        if !posted {
            log::debug!("discarding task posted to a dropped context");
        }
        posted
    }

    /// Whether the target context has been dropped.
    pub fn is_closed(&self) -> bool {
        self.queue.is_closed()
    }

    /// Number of tasks waiting to run.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }
}

impl fmt::Debug for TaskPoster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskPoster")
            .field("pending", &self.pending())
            .field("closed", &self.is_closed())
            .finish()
    }
}
