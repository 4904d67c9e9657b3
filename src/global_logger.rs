// SPDX-License-Identifier: MIT OR Apache-2.0

//! Global and session-redirected logger management.
//!
//! Every record is delivered to the loggers returned by [`current_loggers`]. Outside any session
//! that redirected its logging, that is the global set managed here, which starts out as a single
//! [`StdErrorLogger`](crate::stderror_logger::StdErrorLogger). Inside a session opened with
//! [`SessionOptions::REDIRECT_LOGGING`](crate::session::SessionOptions::REDIRECT_LOGGING) it is the
//! logger that session's [`LogRedirect`](crate::session::LogRedirect) handed out, for every task
//! running under the session or under any session nested inside it.
//!
//! ## Replacing all loggers
//!
//! ```
//! use sessionwise::global_logger::{global_loggers, set_global_loggers};
//! use sessionwise::InMemoryLogger;
//! use std::sync::Arc;
//!
//! let original = global_loggers();
//! let logger = Arc::new(InMemoryLogger::new());
//! set_global_loggers(vec![logger.clone()]);
//!
//! sessionwise::error_sync!("only captured in memory");
//! assert!(logger.drain_logs().contains("only captured in memory"));
//! set_global_loggers(original);
//! ```

use crate::logger::Logger;
use crate::session::Session;
use crate::stderror_logger::StdErrorLogger;
use parking_lot::RwLock;
use std::sync::{Arc, OnceLock};

static GLOBAL_LOGGERS: OnceLock<RwLock<Vec<Arc<dyn Logger>>>> = OnceLock::new();

fn global_cell() -> &'static RwLock<Vec<Arc<dyn Logger>>> {
    GLOBAL_LOGGERS.get_or_init(|| RwLock::new(vec![Arc::new(StdErrorLogger::new())]))
}

/// Returns the global loggers, initializing them with a stderr logger on first use.
pub fn global_loggers() -> Vec<Arc<dyn Logger>> {
    global_cell().read().clone()
}

/// Appends a logger to the global set.
pub fn add_global_logger(logger: Arc<dyn Logger>) {
    global_cell().write().push(logger);
}

/// Replaces the global set. An empty vector silently drops records that are not redirected.
pub fn set_global_loggers(new_loggers: Vec<Arc<dyn Logger>>) {
    *global_cell().write() = new_loggers;
}

/// Returns the loggers that a record written right now, on this task, should go to.
///
/// Walks from the current session towards the root and stops at the first session that
/// redirected its logging. Sessions that were disposed have already dropped their redirection.
pub fn current_loggers() -> Vec<Arc<dyn Logger>> {
    let mut session = Some(Session::current());
    while let Some(s) = session {
        if let Some(logger) = s.redirected_logger() {
            return vec![logger];
        }
        session = s.parent();
    }
    global_loggers()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::inmemory_logger::InMemoryLogger;
    use parking_lot::Mutex;

    /// Serializes tests that swap the global logger set.
    pub(crate) static TEST_LOGGER_GUARD: Mutex<()> = Mutex::new(());

    #[test]
    fn test_add_logger() {
        let _guard = TEST_LOGGER_GUARD.lock();
        let original = global_loggers();
        set_global_loggers(vec![Arc::new(StdErrorLogger::new())]);
        let initial_count = global_loggers().len();

        add_global_logger(Arc::new(InMemoryLogger::new()));

        assert_eq!(global_loggers().len(), initial_count + 1);
        set_global_loggers(original);
    }

    #[test]
    fn test_thread_safety() {
        let _guard = TEST_LOGGER_GUARD.lock();
        let original = global_loggers();
        set_global_loggers(vec![Arc::new(StdErrorLogger::new())]);

        let logger = Arc::new(InMemoryLogger::new());
        let handle = std::thread::spawn(move || add_global_logger(logger));
        let _ = global_loggers();
        handle.join().expect("thread should complete");

        assert!(global_loggers().len() >= 2);
        set_global_loggers(original);
    }

    #[test]
    fn current_loggers_outside_sessions_are_global() {
        let _guard = TEST_LOGGER_GUARD.lock();
        let original = global_loggers();
        let logger = Arc::new(InMemoryLogger::new());
        set_global_loggers(vec![logger.clone()]);

        assert_eq!(current_loggers().len(), 1);
        for l in current_loggers() {
            l.finish_log_record(crate::LogRecord::new(crate::Level::Info));
        }
        assert_eq!(logger.len(), 1);
        set_global_loggers(original);
    }
}
