// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types.

use crate::session::SessionId;
use thiserror::Error;

/// Errors returned by session entry points.
#[derive(Debug, Error)]
pub enum SessionError {
    /// No live session is registered under this id.
    #[error("session {0} not found")]
    NotFound(SessionId),

    /// A collaborator refused to open its scope for the new session.
    #[error(transparent)]
    Activation(#[from] ActivationError),

    /// The session was already disposed.
    #[error("session {0} is disposed")]
    Disposed(SessionId),
}

/// Raised while activating a session, when the settings or logging collaborator
/// refuses to begin a scope.
///
/// The session has already been disposed when the caller sees this.
#[derive(Debug, Error)]
#[error("{collaborator} rejected session scope: {message}")]
pub struct ActivationError {
    pub collaborator: &'static str,
    pub message: String,
}

impl ActivationError {
    pub fn new(collaborator: &'static str, message: impl Into<String>) -> Self {
        Self {
            collaborator,
            message: message.into(),
        }
    }
}

/// A failure while releasing one resource during teardown.
///
/// Never returned as `Err` from teardown; collected into a
/// [`DisposalReport`](crate::session::DisposalReport) and logged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DisposeError {
    #[error("release failed: {0}")]
    Failed(String),

    #[error("release panicked: {0}")]
    Panicked(String),
}

impl DisposeError {
    pub fn failed(message: impl Into<String>) -> Self {
        DisposeError::Failed(message.into())
    }
}

/// Renders a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
