//SPDX-License-Identifier: MIT OR Apache-2.0
use crate::log_record::LogRecord;
use std::fmt::Debug;

/**
A destination for finished [LogRecord]s.

Loggers are shared between every task that logs through them, so they must be [Send] and [Sync].
A session opened with [SessionOptions::REDIRECT_LOGGING](crate::session::SessionOptions::REDIRECT_LOGGING)
gets its own logger from the [LogRedirect](crate::session::LogRedirect) collaborator; everything else
goes to the global set.
*/
pub trait Logger: Debug + Send + Sync {
    /**
    Submits the record for output.
    */
    fn finish_log_record(&self, record: LogRecord);

    /**
    The process or the owning session may imminently end.  Flush any buffers.
    */
    fn prepare_to_die(&self);
}
