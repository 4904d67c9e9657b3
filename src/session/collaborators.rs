// SPDX-License-Identifier: MIT OR Apache-2.0

//! Hooks that other subsystems implement to take part in session activation.

use super::Disposable;
use super::session_impl::{Session, SessionId};
use crate::error::ActivationError;
use crate::global_logger::global_loggers;
use crate::inmemory_logger::InMemoryLogger;
use crate::log_record::LogRecord;
use crate::logger::Logger;
use dashmap::DashMap;
use std::sync::Arc;

/// A settings store that can layer per-session values over its base values.
///
/// Called while activating a session opened with
/// [`OVERLAY_COMPONENT_SETTINGS`](super::SessionOptions::OVERLAY_COMPONENT_SETTINGS). The returned
/// disposable ends the overlay; the session pushes it on its disposable stack, so overlays of
/// nested sessions end in reverse order and each restores what was visible before it began.
pub trait SettingsOverlay: std::fmt::Debug + Send + Sync {
    fn begin_overlay_scope(&self, session: &Session)
    -> Result<Box<dyn Disposable>, ActivationError>;
}

/// A logging backend that can hand out a separate destination per session.
///
/// Called while activating a session opened with
/// [`REDIRECT_LOGGING`](super::SessionOptions::REDIRECT_LOGGING). Records written by tasks under
/// the session go to the returned logger until the session is disposed.
pub trait LogRedirect: std::fmt::Debug + Send + Sync {
    fn begin_redirected_context(&self, session: &Session)
    -> Result<Arc<dyn Logger>, ActivationError>;
}

/// The default [`LogRedirect`]: a redirecting session's records go to the global loggers.
///
/// Each record already names its session in the prelude. Nothing is kept per session, so the
/// redirection ends with the session.
#[derive(Debug, Default, Clone, Copy)]
pub struct GlobalRedirect;

#[derive(Debug)]
struct GlobalForwarder;

impl Logger for GlobalForwarder {
    fn finish_log_record(&self, record: LogRecord) {
        let loggers = global_loggers();
        if let Some((last, rest)) = loggers.split_last() {
            for logger in rest {
                logger.finish_log_record(record.clone());
            }
            last.finish_log_record(record);
        }
    }

    fn prepare_to_die(&self) {
        for logger in global_loggers() {
            logger.prepare_to_die();
        }
    }
}

impl LogRedirect for GlobalRedirect {
    fn begin_redirected_context(
        &self,
        _session: &Session,
    ) -> Result<Arc<dyn Logger>, ActivationError> {
        Ok(Arc::new(GlobalForwarder))
    }
}

/**
Redirects each session's logging into its own [`InMemoryLogger`].

Meant for tests and tools that inspect a session's output afterwards. Loggers stay reachable by
session id until [`take`](InMemoryRedirect::take) removes them, including after the session is
disposed, so every logger handed out must eventually be taken.

```rust
use sessionwise::session::{InMemoryRedirect, SessionOptions, SessionRegistry};
use sessionwise::Config;
use std::sync::Arc;

let redirect = Arc::new(InMemoryRedirect::new());
let registry = SessionRegistry::new(Config::default().log_redirect(redirect.clone()));
let scope = registry.create(SessionOptions::REDIRECT_LOGGING).unwrap();
sessionwise::warn_sync!("disk almost full");
let id = scope.id();
drop(scope);

let logs = redirect.take(id).unwrap().drain_logs();
assert!(logs.contains("disk almost full"));
```
*/
#[derive(Debug, Default)]
pub struct InMemoryRedirect {
    loggers: DashMap<SessionId, Arc<InMemoryLogger>>,
}

impl InMemoryRedirect {
    pub fn new() -> Self {
        Self::default()
    }

    /// The logger handed out for `id`, if that session redirected its logging.
    pub fn logger_for(&self, id: SessionId) -> Option<Arc<InMemoryLogger>> {
        self.loggers.get(&id).map(|logger| logger.clone())
    }

    /// Removes and returns the logger for `id`.
    pub fn take(&self, id: SessionId) -> Option<Arc<InMemoryLogger>> {
        self.loggers.remove(&id).map(|(_, logger)| logger)
    }

    pub fn len(&self) -> usize {
        self.loggers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loggers.is_empty()
    }
}

impl LogRedirect for InMemoryRedirect {
    fn begin_redirected_context(
        &self,
        session: &Session,
    ) -> Result<Arc<dyn Logger>, ActivationError> {
        let logger = Arc::new(InMemoryLogger::new());
        self.loggers.insert(session.id(), logger.clone());
        Ok(logger)
    }
}
