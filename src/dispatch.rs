// SPDX-License-Identifier: MIT OR Apache-2.0

//! Record construction and delivery behind the logging macros.
//!
//! Every macro expands to the same three steps:
//! 1. [`log_enabled`] decides whether the level is on for the current task
//! 2. [`record_pre`] creates a [`LogRecord`] with the prelude for the current task and session
//! 3. [`record_post`] hands the finished record to [`current_loggers`](crate::global_logger::current_loggers)

use crate::Level;
use crate::log_record::LogRecord;

/// Whether a record at `level` written from the current task would be kept.
///
/// - `Trace`: debug builds, and only while the current task is tracing
/// - `DebugInternal`, `Info`: debug builds only
/// - `Warning`, `Error`: always
#[inline]
pub fn log_enabled(level: Level) -> bool {
    match level {
        Level::Trace => cfg!(debug_assertions) && crate::task::TaskHandle::current().is_tracing(),
        Level::DebugInternal | Level::Info => cfg!(debug_assertions),
        Level::Warning | Level::Error => true,
    }
}

/// Creates the record for a macro call site.
///
/// Debug-only levels also carry the source location and a timestamp.
pub fn record_pre(level: Level, file: &'static str, line: u32, column: u32) -> LogRecord {
    let mut record = LogRecord::new(level);
    record.log_prelude();
    if level <= Level::Info {
        record.log(file);
        record.log_owned(format!(":{}:{} ", line, column));
        record.log_timestamp();
    }
    record
}

/// Delivers a finished record to every current logger.
pub fn record_post(record: LogRecord) {
    let loggers = crate::global_logger::current_loggers();
    for logger in loggers {
        logger.finish_log_record(record.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn warnings_and_errors_are_always_enabled() {
        assert!(log_enabled(Level::Warning));
        assert!(log_enabled(Level::Error));
    }

    #[test]
    fn trace_follows_the_current_task() {
        let handle = crate::task::TaskHandle::new_root();
        let frame = handle.enter();
        assert!(!log_enabled(Level::Trace));
        handle.begin_trace();
        assert_eq!(log_enabled(Level::Trace), cfg!(debug_assertions));
        drop(frame);
    }

    #[test]
    fn debug_levels_carry_location() {
        let record = record_pre(Level::DebugInternal, "src/lib.rs", 7, 3);
        assert!(record.to_string().contains("src/lib.rs:7:3 "));
        let record = record_pre(Level::Error, "src/lib.rs", 7, 3);
        assert!(!record.to_string().contains("src/lib.rs"));
    }
}
