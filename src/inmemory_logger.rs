// SPDX-License-Identifier: MIT OR Apache-2.0

//! # In-Memory Logger
//!
//! Captures log records as strings instead of writing them anywhere. Used by tests that assert on
//! log output and by [`InMemoryRedirect`](crate::session::InMemoryRedirect), which gives each
//! session opened with `REDIRECT_LOGGING` a private buffer.

use crate::log_record::LogRecord;
use crate::logger::Logger;
use parking_lot::Mutex;

/// A logger that stores every rendered record in a `Vec<String>`.
///
/// ```rust
/// use sessionwise::InMemoryLogger;
/// use sessionwise::global_logger::{global_loggers, set_global_loggers};
/// use std::sync::Arc;
///
/// let original = global_loggers();
/// let logger = Arc::new(InMemoryLogger::new());
/// set_global_loggers(vec![logger.clone()]);
///
/// sessionwise::warn_sync!("slot {name} was never set", name = "install_target");
/// assert!(logger.drain_logs().contains("slot install_target was never set"));
///
/// set_global_loggers(original);
/// ```
#[derive(Debug, Default)]
pub struct InMemoryLogger {
    logs: Mutex<Vec<String>>,
}

impl InMemoryLogger {
    pub fn new() -> Self {
        Self {
            logs: Mutex::new(Vec::new()),
        }
    }

    /// Returns every captured line joined with newlines and empties the buffer.
    pub fn drain_logs(&self) -> String {
        let mut logs = self.logs.lock();
        let result = logs.join("\n");
        logs.clear();
        result
    }

    /// Number of records captured since the last drain.
    pub fn len(&self) -> usize {
        self.logs.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.logs.lock().is_empty()
    }

    /// Writes the captured lines to stderr and empties the buffer.
    pub fn drain_to_console(&self) {
        let mut logs = self.logs.lock();
        for log in logs.iter() {
            eprintln!("{}", log);
        }
        logs.clear();
    }
}

impl Logger for InMemoryLogger {
    fn finish_log_record(&self, record: LogRecord) {
        let log_string = record.to_string();
        self.logs.lock().push(log_string);
    }

    fn prepare_to_die(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Level;

    #[test]
    fn drain_empties_buffer() {
        let logger = InMemoryLogger::new();
        let mut record = LogRecord::new(Level::Info);
        record.log("first");
        logger.finish_log_record(record);
        let mut record = LogRecord::new(Level::Info);
        record.log("second");
        logger.finish_log_record(record);

        assert_eq!(logger.len(), 2);
        assert_eq!(logger.drain_logs(), "first\nsecond");
        assert!(logger.is_empty());
        assert_eq!(logger.drain_logs(), "");
    }
}
