// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core TaskHandle implementation.

use parking_lot::{Condvar, Mutex};
use std::cell::RefCell;
use std::fmt::Display;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use super::cancel::CancelToken;

static TASK_ID: AtomicU64 = AtomicU64::new(1);

/// Pruning dead children only pays off once the list has grown a little.
const CHILD_PRUNE_THRESHOLD: usize = 64;

/// Unique identifier for a task.
///
/// Ids increase monotonically and are never reused within a process, so they are safe to use
/// as map keys after the task is gone.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(pub(crate) u64);

impl Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How a task body ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    /// The body returned, whether or not it observed cancellation.
    Completed,
    /// The body panicked; the payload rendered as text.
    Panicked(String),
}

type ExitCallback = Box<dyn FnOnce() + Send>;

#[derive(Default)]
struct Completion {
    outcome: Mutex<Option<TaskOutcome>>,
    signal: Condvar,
}

pub(crate) struct TaskInner {
    id: TaskId,
    parent: Option<TaskHandle>,
    depth: usize,
    cancel: CancelToken,
    is_tracing: AtomicBool,
    children: Mutex<Vec<Weak<TaskInner>>>,
    on_exit: Mutex<Option<Vec<ExitCallback>>>,
    completion: Completion,
}

/// One node of the task tree.
///
/// Handles are cheap to clone (Arc-based); equality and hashing follow identity.
#[derive(Clone)]
pub struct TaskHandle {
    pub(crate) inner: Arc<TaskInner>,
}

impl PartialEq for TaskHandle {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for TaskHandle {}

impl Hash for TaskHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.id.hash(state);
    }
}

impl std::fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskHandle")
            .field("id", &self.inner.id)
            .field("parent", &self.inner.parent.as_ref().map(|p| p.id()))
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

impl Display for TaskHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", "  ".repeat(self.depth()), self.inner.id)
    }
}

thread_local! {
    static CURRENT_TASK: RefCell<Option<TaskHandle>> = const { RefCell::new(None) };
}

/// Swaps the thread's task binding without creating a root.
fn replace_current(handle: Option<TaskHandle>) -> Option<TaskHandle> {
    CURRENT_TASK
        .try_with(|cell| cell.replace(handle))
        .unwrap_or(None)
}

impl TaskHandle {
    fn with_parent(parent: Option<TaskHandle>) -> TaskHandle {
        let is_tracing = parent.as_ref().is_some_and(|p| p.is_tracing());
        let depth = parent.as_ref().map_or(0, |p| p.inner.depth + 1);
        let handle = TaskHandle {
            inner: Arc::new(TaskInner {
                id: TaskId(TASK_ID.fetch_add(1, Ordering::Relaxed)),
                parent,
                depth,
                cancel: CancelToken::new(),
                is_tracing: AtomicBool::new(is_tracing),
                children: Mutex::new(Vec::new()),
                on_exit: Mutex::new(Some(Vec::new())),
                completion: Completion::default(),
            }),
        };
        if let Some(parent) = &handle.inner.parent {
            {
                let mut children = parent.inner.children.lock();
                if children.len() >= CHILD_PRUNE_THRESHOLD {
                    children.retain(|c| c.strong_count() > 0);
                }
                children.push(Arc::downgrade(&handle.inner));
            }
            // checked after registering so a concurrent cancel of the parent can't be missed
            if parent.is_cancelled() {
                handle.inner.cancel.cancel();
            }
        }
        handle
    }

    /// Creates a handle with no parent.
    pub fn new_root() -> TaskHandle {
        Self::with_parent(None)
    }

    /// Creates a child of this handle. The child inherits the tracing flag and, if this
    /// handle is already cancelled, starts out cancelled.
    pub fn new_child(&self) -> TaskHandle {
        Self::with_parent(Some(self.clone()))
    }

    /// Returns the task the calling thread is executing.
    ///
    /// A thread that has never entered a task gets its own root handle.
    pub fn current() -> TaskHandle {
        CURRENT_TASK
            .try_with(|cell| {
                cell.borrow_mut()
                    .get_or_insert_with(TaskHandle::new_root)
                    .clone()
            })
            // thread-local already torn down; a detached root is the best answer
            .unwrap_or_else(|_| TaskHandle::new_root())
    }

    /// Binds this handle as the calling thread's current task until the guard drops.
    ///
    /// The handle is only borrowed for the duration: dropping the guard does not complete it.
    pub fn enter(&self) -> FrameGuard {
        FrameGuard::bind(self.clone(), false)
    }

    /// Pushes a new child of the current task as a frame on this thread.
    ///
    /// Dropping the guard pops the frame and completes the child, which runs its
    /// [`on_exit`](TaskHandle::on_exit) callbacks.
    pub fn enter_child() -> FrameGuard {
        FrameGuard::bind(TaskHandle::current().new_child(), true)
    }

    /// Pushes `handle` as an owned frame: dropping the guard completes it.
    pub(crate) fn enter_owned(handle: TaskHandle) -> FrameGuard {
        FrameGuard::bind(handle, true)
    }

    #[inline]
    pub fn id(&self) -> TaskId {
        self.inner.id
    }

    pub fn parent(&self) -> Option<TaskHandle> {
        self.inner.parent.clone()
    }

    /// Number of ancestors; a root has depth 0.
    #[inline]
    pub fn depth(&self) -> usize {
        self.inner.depth
    }

    /// Whether `ancestor` is this handle or one of its ancestors.
    pub fn descends_from(&self, ancestor: &TaskHandle) -> bool {
        let Some(steps) = self.inner.depth.checked_sub(ancestor.inner.depth) else {
            return false;
        };
        let mut cursor = self;
        for _ in 0..steps {
            match &cursor.inner.parent {
                Some(parent) => cursor = parent,
                None => return false,
            }
        }
        cursor == ancestor
    }

    pub fn cancellation(&self) -> CancelToken {
        self.inner.cancel.clone()
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancel.is_cancelled()
    }

    /// Requests cancellation of this task and, transitively, of every descendant.
    pub fn cancel(&self) {
        self.inner.cancel.cancel();
        let children: Vec<TaskHandle> = self
            .inner
            .children
            .lock()
            .iter()
            .filter_map(|weak| weak.upgrade().map(|inner| TaskHandle { inner }))
            .collect();
        for child in children {
            child.cancel();
        }
    }

    /// Blocks until this task is cancelled or `timeout` elapses. See [`CancelToken::wait`].
    pub fn wait_cancelled(&self, timeout: Option<Duration>) -> bool {
        self.inner.cancel.wait(timeout)
    }

    #[inline]
    pub fn is_tracing(&self) -> bool {
        self.inner.is_tracing.load(Ordering::Relaxed)
    }

    /// Enables trace-level logging for this task and for children created afterwards.
    pub fn begin_trace(&self) {
        self.inner.is_tracing.store(true, Ordering::Relaxed);
        let _frame = self.enter();
        crate::trace_sync!("Begin trace");
    }

    /// Registers a callback to run when this task's body or frame ends.
    ///
    /// Callbacks run once, most recently registered first. Registering on a task that has
    /// already finished runs the callback immediately on the calling thread.
    pub fn on_exit<F: FnOnce() + Send + 'static>(&self, callback: F) {
        {
            let mut slot = self.inner.on_exit.lock();
            if let Some(callbacks) = slot.as_mut() {
                callbacks.push(Box::new(callback));
                return;
            }
        }
        run_exit_callback(self.id(), Box::new(callback));
    }

    /// Marks the task finished: runs exit callbacks, then publishes the outcome and wakes
    /// joiners. Only the first call has any effect.
    pub(crate) fn complete(&self, outcome: TaskOutcome) {
        let Some(mut callbacks) = self.inner.on_exit.lock().take() else {
            return;
        };
        while let Some(callback) = callbacks.pop() {
            run_exit_callback(self.id(), callback);
        }
        let mut slot = self.inner.completion.outcome.lock();
        *slot = Some(outcome);
        self.inner.completion.signal.notify_all();
    }

    pub fn is_finished(&self) -> bool {
        self.inner.completion.outcome.lock().is_some()
    }

    /// Waits for the task to finish and returns how it ended, or `None` on timeout.
    pub fn join(&self, timeout: Option<Duration>) -> Option<TaskOutcome> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut slot = self.inner.completion.outcome.lock();
        loop {
            if let Some(outcome) = slot.as_ref() {
                return Some(outcome.clone());
            }
            match deadline {
                None => self.inner.completion.signal.wait(&mut slot),
                Some(deadline) => {
                    if self
                        .inner
                        .completion
                        .signal
                        .wait_until(&mut slot, deadline)
                        .timed_out()
                    {
                        return slot.clone();
                    }
                }
            }
        }
    }

    pub(crate) fn downgrade(&self) -> Weak<TaskInner> {
        Arc::downgrade(&self.inner)
    }

    pub(crate) fn upgrade(weak: &Weak<TaskInner>) -> Option<TaskHandle> {
        weak.upgrade().map(|inner| TaskHandle { inner })
    }
}

fn run_exit_callback(id: TaskId, callback: ExitCallback) {
    if let Err(payload) = catch_unwind(AssertUnwindSafe(callback)) {
        crate::error_sync!(
            "exit callback of task {id} panicked: {message}",
            message = crate::error::panic_message(&*payload)
        );
    }
}

/// Restores the thread's previous task binding when dropped.
///
/// Not `Send`: a frame belongs to the thread that pushed it.
#[must_use = "dropping the guard immediately pops the frame"]
pub struct FrameGuard {
    frame: TaskHandle,
    previous: Option<TaskHandle>,
    complete_on_drop: bool,
    _not_send: PhantomData<*const ()>,
}

impl FrameGuard {
    fn bind(frame: TaskHandle, complete_on_drop: bool) -> FrameGuard {
        let previous = replace_current(Some(frame.clone()));
        FrameGuard {
            frame,
            previous,
            complete_on_drop,
            _not_send: PhantomData,
        }
    }

    /// The task this guard bound.
    pub fn task(&self) -> &TaskHandle {
        &self.frame
    }
}

impl std::fmt::Debug for FrameGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameGuard")
            .field("frame", &self.frame.id())
            .field("complete_on_drop", &self.complete_on_drop)
            .finish()
    }
}

impl Drop for FrameGuard {
    fn drop(&mut self) {
        let popped = replace_current(self.previous.take());
        if popped.as_ref() != Some(&self.frame) {
            crate::warn_sync!(
                "popped task frame {id}, but it was not the current task; frames were dropped out of order",
                id = self.frame.id()
            );
        }
        if self.complete_on_drop {
            self.frame.complete(TaskOutcome::Completed);
        }
    }
}
