//SPDX-License-Identifier: MIT OR Apache-2.0
/*!
# sessionwise

sessionwise scopes process-wide state to a branch of your program's task tree.

# Development status

sessionwise is experimental and the API may change.

# The problem

Installers, build tools and servers tend to grow global state: the target directory, the proxy
to use, where log output goes, a handful of open resources that must be closed at the end.
Globals work until two jobs run at once.  Thread-locals work until a job spawns a worker and the
worker reads the global.

What you actually want is "global, but per job, and inherited by everything the job spawns".

# The model

* A [task::TaskHandle] is one unit of concurrent execution.  Tasks form a tree: every task
  spawned by another task is its child, forever.
* A [thread_field::ThreadField] holds one value per branch of that tree.  A task without its own
  value sees its nearest ancestor's.
* A [session::Session] is a scope for process-wide state.  Opening one makes it current for a new
  task; everything that task spawns runs under the session too.  Values declared with
  [session::SessionSlot] live in the current session, and resources pushed on the session are
  released, last first, when it is disposed.

Tasks that never opened a session run under the [root session](session::Session::root).

```rust
use sessionwise::session::{SessionOptions, SessionRegistry, SessionSlot};
use sessionwise::Config;

static TARGET_DIR: SessionSlot<String> = SessionSlot::new(|| "/usr/local".to_string());

let registry = SessionRegistry::new(Config::default());
let job = registry
    .start(SessionOptions::empty(), || {
        TARGET_DIR.set("/opt/app".to_string());
        // everything this task spawns sees /opt/app
    })
    .unwrap();
job.join(None);

// the job's writes never leaked out
assert_eq!(TARGET_DIR.get(), "/usr/local");
```

# Logging

sessionwise logs through its own small facade, with the levels below.  Every record starts with
the current task id and the current session, so interleaved output from concurrent sessions can
be told apart.

| Name          | Usecase                       | Build type required | Conditions               |
|---------------|-------------------------------|---------------------|--------------------------|
| trace         | Detailed debugging            | debug builds only   | Must turn on per-task    |
| debuginternal | print-style debugging         | debug builds only   | On by default            |
| info          | Supporting downstream crates  | debug builds only   | On by default            |
| warning       | Suspicious condition          | all                 | all                      |
| error         | logging the error in a Result | all                 | all                      |

```rust
# let val = false;
sessionwise::info_sync!("Hello {world}!", world = val);
```

Records go to the [global loggers](global_logger), unless the current session was opened with
[REDIRECT_LOGGING](session::SessionOptions::REDIRECT_LOGGING), in which case they go to that
session's logger.

# Async

Futures polled by an executor on arbitrary threads can carry their session along with
[session::Session::bind] or [task::ApplyTask].
*/

mod config;
mod dispatch;
pub mod error;
pub mod global_logger;
mod inmemory_logger;
mod level;
mod log_record;
mod logger;
mod macros;
pub mod session;
pub mod settings;
mod stderror_logger;
pub mod task;
pub mod thread_field;

pub use config::Config;
pub use error::{ActivationError, DisposeError, SessionError};
pub use global_logger::{add_global_logger, global_loggers, set_global_loggers};
pub use inmemory_logger::InMemoryLogger;
pub use level::Level;
pub use log_record::LogRecord;
pub use logger::Logger;
pub use stderror_logger::StdErrorLogger;

#[doc(hidden)]
pub mod hidden {
    pub use crate::dispatch::{log_enabled, record_post, record_pre};
}

extern crate self as sessionwise;
