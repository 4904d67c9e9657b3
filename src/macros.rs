// SPDX-License-Identifier: MIT OR Apache-2.0

//! Logging macros.
//!
//! Each macro takes `format!` arguments, including inline `{name}` captures and
//! `name = value` pairs. Arguments are only evaluated when the level is enabled for the
//! current task.
//!
//! ```rust
//! let id = 42;
//! sessionwise::info_sync!("resuming session {id}");
//! sessionwise::warn_sync!("{count} disposables left", count = 3);
//! ```

/// Evaluates to `true` when a record at the given [`Level`](crate::Level) would be kept.
#[macro_export]
macro_rules! log_enabled {
    ($level:expr) => {
        $crate::hidden::log_enabled($level)
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __log_sync {
    ($level:expr, $($arg:tt)+) => {{
        let level = $level;
        if $crate::hidden::log_enabled(level) {
            let mut record = $crate::hidden::record_pre(level, file!(), line!(), column!());
            record.log_owned(format!($($arg)+));
            $crate::hidden::record_post(record);
        }
    }};
}

/// Logs at [`Level::Trace`](crate::Level::Trace). Only kept while the current task is tracing.
#[macro_export]
macro_rules! trace_sync {
    ($($arg:tt)+) => {
        $crate::__log_sync!($crate::Level::Trace, $($arg)+)
    };
}

/// Logs at [`Level::DebugInternal`](crate::Level::DebugInternal).
#[macro_export]
macro_rules! debuginternal_sync {
    ($($arg:tt)+) => {
        $crate::__log_sync!($crate::Level::DebugInternal, $($arg)+)
    };
}

/// Logs at [`Level::Info`](crate::Level::Info).
#[macro_export]
macro_rules! info_sync {
    ($($arg:tt)+) => {
        $crate::__log_sync!($crate::Level::Info, $($arg)+)
    };
}

/// Logs at [`Level::Warning`](crate::Level::Warning).
#[macro_export]
macro_rules! warn_sync {
    ($($arg:tt)+) => {
        $crate::__log_sync!($crate::Level::Warning, $($arg)+)
    };
}

/// Logs at [`Level::Error`](crate::Level::Error).
#[macro_export]
macro_rules! error_sync {
    ($($arg:tt)+) => {
        $crate::__log_sync!($crate::Level::Error, $($arg)+)
    };
}
