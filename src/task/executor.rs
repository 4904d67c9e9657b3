// SPDX-License-Identifier: MIT OR Apache-2.0

//! Elastic worker pool.
//!
//! Workers pull jobs from one shared channel. The pool keeps a count of idle workers; a spawn
//! either claims one of them and queues its job, or, when nobody is idle, starts a new worker
//! that runs the job directly. A blocked task therefore never starves a queued one.
//! Workers beyond `min_workers` retire after sitting idle for `keep_alive`.
//!
//! Invariant: `idle` equals the number of waiting workers minus the number of queued jobs.
//! Entering the wait adds one, queueing a job or retiring takes one.

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use super::task_impl::{TaskHandle, TaskOutcome};
use crate::Config;

struct Job {
    handle: TaskHandle,
    body: Box<dyn FnOnce() + Send>,
}

struct Shared {
    receiver: Receiver<Job>,
    idle: AtomicUsize,
    workers: AtomicUsize,
    spawned: AtomicUsize,
    min_workers: usize,
    keep_alive: Duration,
    thread_name: String,
}

/// Runs task bodies on a shared pool of worker threads.
///
/// Cheap to clone; clones submit to the same pool. Workers exit once every clone is dropped
/// and the queue drains.
#[derive(Clone)]
pub struct Executor {
    sender: Sender<Job>,
    shared: Arc<Shared>,
}

impl std::fmt::Debug for Executor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor")
            .field("workers", &self.workers())
            .field("idle", &self.shared.idle.load(Ordering::Relaxed))
            .field("min_workers", &self.shared.min_workers)
            .finish()
    }
}

/// Takes one idle token, if any are left.
fn claim(idle: &AtomicUsize) -> bool {
    idle.fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
        .is_ok()
}

impl Executor {
    /// Creates an empty pool. Worker threads start on demand.
    pub fn new(config: &Config) -> Executor {
        let (sender, receiver) = crossbeam_channel::unbounded();
        Executor {
            sender,
            shared: Arc::new(Shared {
                receiver,
                idle: AtomicUsize::new(0),
                workers: AtomicUsize::new(0),
                spawned: AtomicUsize::new(0),
                min_workers: config.min_workers.max(1),
                keep_alive: config.keep_alive,
                thread_name: config.thread_name.clone(),
            }),
        }
    }

    /// Number of live worker threads.
    pub fn workers(&self) -> usize {
        self.shared.workers.load(Ordering::Relaxed)
    }

    /// Spawns `body` as a child of the calling task.
    pub fn spawn<F>(&self, body: F) -> TaskHandle
    where
        F: FnOnce() + Send + 'static,
    {
        self.spawn_child(&TaskHandle::current(), body)
    }

    /// Spawns `body` as a child of `parent`.
    pub fn spawn_child<F>(&self, parent: &TaskHandle, body: F) -> TaskHandle
    where
        F: FnOnce() + Send + 'static,
    {
        let handle = parent.new_child();
        self.spawn_handle(handle.clone(), body);
        handle
    }

    /// Runs `body` as the already-created task `handle`.
    ///
    /// Lets callers prepare per-task state on the handle before the body can observe it.
    pub fn spawn_handle<F>(&self, handle: TaskHandle, body: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let job = Job {
            handle,
            body: Box::new(body),
        };
        if claim(&self.shared.idle) {
            match self.sender.send(job) {
                Ok(()) => return,
                Err(crossbeam_channel::SendError(job)) => self.start_worker(job),
            }
        } else {
            self.start_worker(job);
        }
    }

    fn start_worker(&self, job: Job) {
        let shared = self.shared.clone();
        shared.workers.fetch_add(1, Ordering::AcqRel);
        let n = shared.spawned.fetch_add(1, Ordering::Relaxed);
        let first = Arc::new(Mutex::new(Some(job)));
        let for_worker = first.clone();
        let spawned = std::thread::Builder::new()
            .name(format!("{}-{}", shared.thread_name, n))
            .spawn({
                let shared = shared.clone();
                move || {
                    let job = for_worker.lock().take();
                    worker_loop(&shared, job);
                }
            });
        if let Err(e) = spawned {
            shared.workers.fetch_sub(1, Ordering::AcqRel);
            crate::error_sync!("could not start worker thread, running task inline: {e}");
            if let Some(job) = first.lock().take() {
                run_job(job);
            }
        }
    }
}

fn worker_loop(shared: &Shared, first: Option<Job>) {
    if let Some(job) = first {
        run_job(job);
    }
    loop {
        shared.idle.fetch_add(1, Ordering::AcqRel);
        loop {
            match shared.receiver.recv_timeout(shared.keep_alive) {
                Ok(job) => {
                    run_job(job);
                    break;
                }
                Err(RecvTimeoutError::Timeout) => {
                    if !claim(&shared.idle) {
                        // our token went to a queued job; wait for it
                        continue;
                    }
                    let min = shared.min_workers;
                    let retired = shared
                        .workers
                        .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                            (n > min).then(|| n - 1)
                        })
                        .is_ok();
                    if retired {
                        return;
                    }
                    shared.idle.fetch_add(1, Ordering::AcqRel);
                }
                Err(RecvTimeoutError::Disconnected) => {
                    shared.workers.fetch_sub(1, Ordering::AcqRel);
                    return;
                }
            }
        }
    }
}

fn run_job(job: Job) {
    let Job { handle, body } = job;
    let frame = handle.enter();
    let outcome = match catch_unwind(AssertUnwindSafe(body)) {
        Ok(()) => TaskOutcome::Completed,
        Err(payload) => {
            let message = crate::error::panic_message(&*payload);
            crate::error_sync!("task {id} panicked: {message}", id = handle.id());
            TaskOutcome::Panicked(message)
        }
    };
    handle.complete(outcome);
    drop(frame);
}
