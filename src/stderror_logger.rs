// SPDX-License-Identifier: MIT OR Apache-2.0
use crate::log_record::LogRecord;
use crate::logger::Logger;
use std::io::Write;

/**
The default logger; writes one line per record to stderr.
 */
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct StdErrorLogger;

impl StdErrorLogger {
    pub const fn new() -> Self {
        Self
    }
}

impl Logger for StdErrorLogger {
    fn finish_log_record(&self, record: LogRecord) {
        let mut lock = std::io::stderr().lock();
        for part in record.parts {
            // stderr going away is not something a log call can report
            let _ = lock.write_all(part.as_bytes());
        }
        let _ = lock.write_all(b"\n");
    }

    fn prepare_to_die(&self) {
        //unbuffered
    }
}
