// SPDX-License-Identifier: MIT OR Apache-2.0

//! Async task-binding.

use std::future::Future;
use std::pin::Pin;
use std::task::Poll;

use super::task_impl::TaskHandle;

/// A [`Future`] wrapper that runs every poll of the inner future as a given task.
///
/// Executors that poll futures on arbitrary threads lose the thread-local task binding between
/// polls. `ApplyTask` binds its handle before each poll and restores the previous one after,
/// so [`ThreadField`](crate::thread_field::ThreadField) reads (and therefore
/// [`SessionSlot`](crate::session::SessionSlot) reads) inside the future resolve against the
/// wrapped task.
///
/// ```rust
/// use sessionwise::task::{ApplyTask, TaskHandle};
///
/// # async fn example() {
/// let task = TaskHandle::current().new_child();
/// let id = task.id();
/// let seen = ApplyTask::new(task, async { TaskHandle::current().id() }).await;
/// assert_eq!(seen, id);
/// # }
/// ```
pub struct ApplyTask<F> {
    task: TaskHandle,
    future: F,
}

impl<F> ApplyTask<F> {
    pub fn new(task: TaskHandle, future: F) -> Self {
        Self { task, future }
    }

    pub fn task(&self) -> &TaskHandle {
        &self.task
    }
}

impl<F> Future for ApplyTask<F>
where
    F: Future,
{
    type Output = F::Output;

    fn poll(self: Pin<&mut Self>, cx: &mut std::task::Context<'_>) -> Poll<Self::Output> {
        // SAFETY: `future` is structurally pinned; it is never moved out of `self`.
        let (task, future) = unsafe {
            let this = self.get_unchecked_mut();
            (&this.task, Pin::new_unchecked(&mut this.future))
        };
        let _frame = task.enter();
        future.poll(cx)
    }
}
