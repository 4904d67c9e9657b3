// SPDX-License-Identifier: MIT OR Apache-2.0

//! Sessions: scopes for process-wide state.
//!
//! A [`Session`] gives a branch of the task tree its own values for [`SessionSlot`]s, its own
//! stack of resources to release, and optionally its own settings overlay and log destination.
//! Code that reads a slot never names a session: it gets the value from whichever session is
//! current for the calling task, which is the nearest session opened on that task or on one of
//! its ancestors, or the [root session](Session::root).
//!
//! # Opening a session
//!
//! [`SessionRegistry::create`] opens a session on the calling thread and returns a
//! [`SessionScope`]; [`SessionRegistry::start`] opens one and runs a closure under it on a
//! worker thread. Either way the session is disposed on every exit path.
//!
//! ```rust
//! use sessionwise::session::{Session, SessionOptions, SessionRegistry, SessionSlot};
//! use sessionwise::Config;
//!
//! static USER: SessionSlot<String> = SessionSlot::new(|| "nobody".to_string());
//!
//! let registry = SessionRegistry::new(Config::default());
//! USER.set("admin".to_string());
//! {
//!     let scope = registry.create(SessionOptions::empty()).unwrap();
//!     // copied from the creating session
//!     assert_eq!(USER.get(), "admin");
//!     USER.set("guest".to_string());
//!     assert_eq!(USER.get(), "guest");
//!     scope.defer(|| println!("session closed")).unwrap();
//! }
//! // back in the creating session, which never saw the write
//! assert_eq!(USER.get(), "admin");
//! ```
//!
//! # Teardown
//!
//! [`Session::dispose`] releases the disposable stack last-in first-out. A resource that fails or
//! panics is logged and recorded in the returned [`DisposalReport`]; the others are still
//! released. Disposing twice does nothing the second time.
//!
//! Values of slots declared with [`SessionSlot::auto_dispose`] are released separately, when the
//! session's home task ends.
//!
//! # Lifecycle
//!
//! `Created → Active → Disposed`. A session dropped while still `Active` was leaked; this is
//! logged as a warning and its auto-dispose values are never released.

mod collaborators;
mod disposable;
mod options;
mod registry;
mod session_impl;
mod slot;

#[cfg(test)]
mod tests;

pub use collaborators::{GlobalRedirect, InMemoryRedirect, LogRedirect, SettingsOverlay};
pub use disposable::{Disposable, DisposalReport, OnDispose, on_dispose};
pub use options::SessionOptions;
pub use registry::{SessionRegistry, SessionScope, StartedSession};
pub use session_impl::{Session, SessionId, SessionState};
pub use slot::{SessionSlot, SlotId};
