// SPDX-License-Identifier: MIT OR Apache-2.0

//! Releasable resources and the teardown report.

use crate::error::DisposeError;
use parking_lot::Mutex;
use std::sync::Arc;

/// A resource a session releases when it is disposed.
///
/// `dispose` is called at most once per registration. It may fail or panic; either way
/// teardown continues with the next resource.
pub trait Disposable: Send + Sync {
    fn dispose(&self) -> Result<(), DisposeError>;
}

impl<D: Disposable + ?Sized> Disposable for Arc<D> {
    fn dispose(&self) -> Result<(), DisposeError> {
        (**self).dispose()
    }
}

impl<D: Disposable + ?Sized> Disposable for Box<D> {
    fn dispose(&self) -> Result<(), DisposeError> {
        (**self).dispose()
    }
}

/// Adapts a closure into a [`Disposable`]. The closure runs on the first `dispose` only.
pub struct OnDispose<F> {
    action: Mutex<Option<F>>,
}

impl<F> Disposable for OnDispose<F>
where
    F: FnOnce() -> Result<(), DisposeError> + Send,
{
    fn dispose(&self) -> Result<(), DisposeError> {
        let action = self.action.lock().take();
        match action {
            Some(action) => action(),
            None => Ok(()),
        }
    }
}

impl<F> std::fmt::Debug for OnDispose<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnDispose")
            .field("pending", &self.action.lock().is_some())
            .finish()
    }
}

/// Wraps `action` so it can be pushed onto a session's disposable stack.
///
/// ```rust
/// use sessionwise::session::{on_dispose, Disposable};
///
/// let cleanup = on_dispose(|| Ok(()));
/// assert!(cleanup.dispose().is_ok());
/// // a second call is a no-op
/// assert!(cleanup.dispose().is_ok());
/// ```
pub fn on_dispose<F>(action: F) -> OnDispose<F>
where
    F: FnOnce() -> Result<(), DisposeError> + Send,
{
    OnDispose {
        action: Mutex::new(Some(action)),
    }
}

/// What a teardown did.
///
/// Teardown never fails as a whole; each failing resource contributes one entry to `errors`
/// and the rest are still released.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[must_use]
pub struct DisposalReport {
    /// Resources whose `dispose` returned `Ok`.
    pub released: usize,
    /// One entry per resource that failed or panicked, in release order.
    pub errors: Vec<DisposeError>,
}

impl DisposalReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }

    pub(crate) fn record(&mut self, result: Result<(), DisposeError>) {
        match result {
            Ok(()) => self.released += 1,
            Err(e) => self.errors.push(e),
        }
    }
}

/// Runs one release, turning a panic into [`DisposeError::Panicked`].
pub(crate) fn release_caught<F>(release: F) -> Result<(), DisposeError>
where
    F: FnOnce() -> Result<(), DisposeError>,
{
    match std::panic::catch_unwind(std::panic::AssertUnwindSafe(release)) {
        Ok(result) => result,
        Err(payload) => Err(DisposeError::Panicked(crate::error::panic_message(
            &*payload,
        ))),
    }
}
