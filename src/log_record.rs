// SPDX-License-Identifier: MIT OR Apache-2.0

//! Log record type.
//!
//! A [`LogRecord`] is built up piecewise on the logging thread and handed by value to each
//! [`Logger`](crate::Logger). Parts are kept separate until a logger renders them, so
//! nothing is shared between threads while a record is being written.

use crate::Level;
use std::fmt::{Debug, Display};
use std::sync::OnceLock;
use std::time::Instant;

static INITIAL_TIMESTAMP: OnceLock<Instant> = OnceLock::new();

fn initial_timestamp() -> Instant {
    *INITIAL_TIMESTAMP.get_or_init(Instant::now)
}

/**
A log record.

1.  Create a new [LogRecord].
2.  Progressively write to it, usually starting with [LogRecord::log_prelude].
3.  Submit it to every logger returned by [crate::global_logger::current_loggers].
*/
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LogRecord {
    pub(crate) parts: Vec<String>,
    level: Level,
}

impl LogRecord {
    pub fn new(level: Level) -> Self {
        Self {
            parts: Vec::new(),
            level,
        }
    }

    /// Appends a borrowed message part.
    pub fn log(&mut self, message: &str) {
        self.parts.push(message.to_string());
    }

    /// Appends an owned message part without copying it.
    pub fn log_owned(&mut self, message: String) {
        self.parts.push(message);
    }

    /**
    Log the time since the first record of the process, followed by a space.
    */
    pub fn log_timestamp(&mut self) -> Instant {
        let time = Instant::now();
        let duration = time.duration_since(initial_timestamp());
        self.log_owned(format!("[{:?}] ", duration));
        time
    }

    /**
    Writes the standard prefix: the tracing marker, the current task id and the current
    session id.

    Sessions are shown by the first group of their uuid; the root session is shown as `root`.
    */
    pub fn log_prelude(&mut self) {
        let task = crate::task::TaskHandle::current();
        self.log(if task.is_tracing() { "T" } else { " " });
        self.log_owned(format!("{} ", task.id()));
        let session = crate::session::Session::current();
        if session.is_root() {
            self.log("root ");
        } else {
            self.log_owned(format!("{} ", session.id().short()));
        }
        self.log(self.level.tag());
        self.log(": ");
    }

    pub fn level(&self) -> Level {
        self.level
    }
}

impl Default for LogRecord {
    fn default() -> Self {
        Self::new(Level::Info)
    }
}

impl Display for LogRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for part in &self.parts {
            write!(f, "{}", part)?;
        }
        Ok(())
    }
}
