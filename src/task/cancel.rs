// SPDX-License-Identifier: MIT OR Apache-2.0

//! Cooperative cancellation signal.

use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
struct CancelState {
    cancelled: AtomicBool,
    lock: Mutex<()>,
    signal: Condvar,
}

/// A one-way, advisory cancellation flag.
///
/// Cancelling never interrupts anything; a body observes it by polling
/// [`is_cancelled`](CancelToken::is_cancelled) or by blocking in [`wait`](CancelToken::wait).
/// Clones share the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    state: Arc<CancelState>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.state.cancelled.load(Ordering::Acquire)
    }

    /// Sets the flag and wakes every waiter. Returns `false` if it was already set.
    pub fn cancel(&self) -> bool {
        if self.state.cancelled.swap(true, Ordering::AcqRel) {
            return false;
        }
        let _guard = self.state.lock.lock();
        self.state.signal.notify_all();
        true
    }

    /// Blocks until cancelled or until `timeout` elapses.
    ///
    /// Returns whether the token is cancelled; a timeout yields `false` rather than an error.
    /// `None` waits without bound.
    pub fn wait(&self, timeout: Option<Duration>) -> bool {
        if self.is_cancelled() {
            return true;
        }
        let mut guard = self.state.lock.lock();
        match timeout {
            None => {
                while !self.is_cancelled() {
                    self.state.signal.wait(&mut guard);
                }
                true
            }
            Some(timeout) => {
                let deadline = Instant::now() + timeout;
                while !self.is_cancelled() {
                    if self.state.signal.wait_until(&mut guard, deadline).timed_out() {
                        return self.is_cancelled();
                    }
                }
                true
            }
        }
    }
}
