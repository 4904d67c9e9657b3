// SPDX-License-Identifier: MIT OR Apache-2.0
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Level {
    /// Off unless the current task called [`TaskHandle::begin_trace`](crate::task::TaskHandle::begin_trace)
    Trace,
    /// Debug builds only, for work on this crate itself
    DebugInternal,
    /// Debug builds only, session lifecycle notes for downstream crates
    Info,
    /// Suspicious condition, e.g. a session dropped without being disposed
    Warning,
    /// A failure that was swallowed to keep teardown going
    Error,
}

impl Level {
    /// Short tag written into the record prelude.
    pub(crate) fn tag(self) -> &'static str {
        match self {
            Level::Trace => "TRACE",
            Level::DebugInternal => "DEBUG",
            Level::Info => "INFO",
            Level::Warning => "WARN",
            Level::Error => "ERROR",
        }
    }
}
