// SPDX-License-Identifier: MIT OR Apache-2.0

//! Task hierarchy and scheduling substrate.
//!
//! A [`TaskHandle`] identifies one unit of concurrent execution. Handles form a tree: every
//! handle except a root records the parent it was created under, and that link never changes.
//! The tree is what [`ThreadField`](crate::thread_field::ThreadField) walks to inherit values,
//! and what cancellation follows downwards.
//!
//! # Which task is running?
//!
//! Each OS thread records the task it is currently executing in a thread-local. Threads this
//! crate did not spawn get a fresh root handle on first use. Code that runs a task body, or that
//! temporarily executes "as" another task, binds the handle with [`TaskHandle::enter`] and gets
//! a [`FrameGuard`] that restores the previous binding when dropped, including on panic.
//!
//! ```rust
//! use sessionwise::task::TaskHandle;
//!
//! let outer = TaskHandle::current();
//! {
//!     let frame = TaskHandle::enter_child();
//!     assert_eq!(TaskHandle::current().parent(), Some(outer.clone()));
//!     drop(frame);
//! }
//! assert_eq!(TaskHandle::current(), outer);
//! ```
//!
//! # Spawning
//!
//! [`Executor`] runs task bodies on a shared, elastic pool of worker threads. A spawned task is a
//! child of whichever task called `spawn`, so everything the caller set on its own branch before
//! spawning is visible to the child.
//!
//! ```rust
//! use sessionwise::task::{Executor, TaskOutcome};
//!
//! let executor = Executor::new(&sessionwise::Config::default());
//! let task = executor.spawn(|| {
//!     // parks until someone cancels this task or one of its ancestors
//!     sessionwise::task::TaskHandle::current().wait_cancelled(None);
//! });
//! task.cancel();
//! assert_eq!(task.join(None), Some(TaskOutcome::Completed));
//! ```
//!
//! # Async
//!
//! [`ApplyTask`] binds a handle around every poll of a future, for executors that move futures
//! between threads.

mod apply_task;
mod cancel;
mod executor;
mod task_impl;

#[cfg(test)]
mod tests;

pub use apply_task::ApplyTask;
pub use cancel::CancelToken;
pub use executor::Executor;
pub(crate) use task_impl::TaskInner;
pub use task_impl::{FrameGuard, TaskHandle, TaskId, TaskOutcome};
