// SPDX-License-Identifier: MIT OR Apache-2.0

//! Live session lookup and the entry points that open sessions.

use super::options::SessionOptions;
use super::session_impl::{Session, SessionId, SessionInner};
use super::{DisposalReport, SessionState};
use crate::Config;
use crate::error::SessionError;
use crate::task::{Executor, FrameGuard, TaskHandle, TaskOutcome};
use dashmap::DashMap;
use std::sync::{Arc, OnceLock, Weak};
use std::time::Duration;

pub(crate) struct RegistryShared {
    sessions: DashMap<SessionId, Weak<SessionInner>>,
    config: Config,
    executor: Executor,
}

impl RegistryShared {
    pub(crate) fn unregister(&self, session: &Session) {
        let target = Arc::downgrade(&session.inner);
        let removed = self
            .sessions
            .remove_if(&session.id(), |_, weak| weak.ptr_eq(&target));
        drop(removed);
    }

    /// Forgets `id` if its session has already been dropped.
    pub(crate) fn unregister_dead(&self, id: SessionId) {
        let removed = self
            .sessions
            .remove_if(&id, |_, weak| weak.strong_count() == 0);
        drop(removed);
    }
}

/**
Tracks live sessions by id and opens new ones.

Most programs use the process-wide [`SessionRegistry::global`]. Tests and embedders that want
their own worker pool or collaborators build one with [`SessionRegistry::new`].

```rust
use sessionwise::session::{SessionOptions, SessionRegistry, SessionSlot};
use sessionwise::Config;

static TARGET: SessionSlot<&'static str> = SessionSlot::new(|| "none");

let registry = SessionRegistry::new(Config::default());
let scope = registry.create(SessionOptions::empty()).unwrap();
TARGET.set("C:\\Program Files");
let id = scope.id();

let seen = registry.run_in_session(id, || TARGET.get()).unwrap();
assert_eq!(seen, "C:\\Program Files");

drop(scope);
assert!(registry.is_empty());
assert_eq!(TARGET.get(), "none");
```
*/
#[derive(Clone)]
pub struct SessionRegistry {
    shared: Arc<RegistryShared>,
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("sessions", &self.len())
            .field("executor", &self.shared.executor)
            .finish()
    }
}

static GLOBAL: OnceLock<SessionRegistry> = OnceLock::new();

impl SessionRegistry {
    pub fn new(config: Config) -> SessionRegistry {
        let executor = Executor::new(&config);
        SessionRegistry {
            shared: Arc::new(RegistryShared {
                sessions: DashMap::new(),
                config,
                executor,
            }),
        }
    }

    /// The process-wide registry, created with [`Config::default`] on first use.
    pub fn global() -> &'static SessionRegistry {
        GLOBAL.get_or_init(|| SessionRegistry::new(Config::default()))
    }

    pub fn config(&self) -> &Config {
        &self.shared.config
    }

    /// The pool that runs [`start`](SessionRegistry::start)ed sessions.
    pub fn executor(&self) -> &Executor {
        &self.shared.executor
    }

    fn new_session(&self, options: SessionOptions) -> (Session, TaskHandle) {
        let home = if options.contains(SessionOptions::THREAD_HIERARCHY_ROOT) {
            TaskHandle::new_root()
        } else {
            TaskHandle::current().new_child()
        };
        let session = Session::new(
            Session::current(),
            options,
            &home,
            Arc::downgrade(&self.shared),
        );
        self.shared
            .sessions
            .insert(session.id(), Arc::downgrade(&session.inner));
        let on_exit = session.clone();
        home.on_exit(move || {
            let report = on_exit.dispose_static_vars();
            if report.released > 0 {
                crate::debuginternal_sync!(
                    "released {n} slot values of session {id}",
                    n = report.released,
                    id = on_exit.id()
                );
            }
        });
        (session, home)
    }

    /// Opens a session on the calling thread.
    ///
    /// The session's home task is pushed as a new frame on this thread, so the session is
    /// current here until the returned scope drops. Dropping the scope disposes the session and
    /// then pops the frame, which releases auto-dispose slot values.
    ///
    /// If a collaborator refuses to open its scope, the session is disposed before the error
    /// is returned.
    pub fn create(&self, options: SessionOptions) -> Result<SessionScope, SessionError> {
        let (session, home) = self.new_session(options);
        let frame = TaskHandle::enter_owned(home);
        let scope = SessionScope {
            session,
            frame: Some(frame),
        };
        if let Err(e) = scope.session.activate(&self.shared.config) {
            crate::warn_sync!("could not activate session {id}: {e}", id = scope.id());
            drop(scope);
            return Err(e.into());
        }
        crate::debuginternal_sync!("created session {id}", id = scope.id());
        Ok(scope)
    }

    /// Opens a session and runs `action` under it on a new task.
    ///
    /// Returns as soon as the task is queued. The session is disposed when `action` returns or
    /// panics; auto-dispose slot values are released when the task ends.
    pub fn start<F>(&self, options: SessionOptions, action: F) -> Result<StartedSession, SessionError>
    where
        F: FnOnce() + Send + 'static,
    {
        let (session, home) = self.new_session(options);
        if let Err(e) = session.activate(&self.shared.config) {
            crate::warn_sync!("could not activate session {id}: {e}", id = session.id());
            let _ = session.dispose();
            home.complete(TaskOutcome::Completed);
            return Err(e.into());
        }
        crate::debuginternal_sync!("started session {id}", id = session.id());
        let guard = DisposeOnExit(session.clone());
        self.shared.executor.spawn_handle(home.clone(), move || {
            let _guard = guard;
            action();
        });
        Ok(StartedSession {
            session,
            task: home,
        })
    }

    /// Runs `action` on the calling thread under the live session `id`.
    ///
    /// Fails with [`SessionError::NotFound`] without running anything when no live session has
    /// that id.
    pub fn run_in_session<R>(
        &self,
        id: SessionId,
        action: impl FnOnce() -> R,
    ) -> Result<R, SessionError> {
        let Some(session) = self.get(id) else {
            crate::warn_sync!("no live session {id}");
            return Err(SessionError::NotFound(id));
        };
        session.run_in_session(action)
    }

    /// The live session registered under `id`.
    pub fn get(&self, id: SessionId) -> Option<Session> {
        self.shared
            .sessions
            .get(&id)
            .and_then(|weak| weak.upgrade())
            .map(|inner| Session { inner })
            .filter(|session| session.state() != SessionState::Disposed)
    }

    /// Number of registered sessions.
    pub fn len(&self) -> usize {
        self.shared.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.sessions.is_empty()
    }

    /// Ids of the registered sessions, in no particular order.
    pub fn ids(&self) -> Vec<SessionId> {
        self.shared.sessions.iter().map(|entry| *entry.key()).collect()
    }
}

/// Disposes its session when dropped, including during unwinding.
struct DisposeOnExit(Session);

impl Drop for DisposeOnExit {
    fn drop(&mut self) {
        let _ = self.0.dispose();
    }
}

/**
A session opened on the calling thread by [`SessionRegistry::create`].

Derefs to the [`Session`]. Dropping it disposes the session and pops its frame, restoring the
task and session that were current before. Like the frame it owns, it stays on the thread that
created it.
*/
#[must_use = "dropping the scope immediately disposes the session"]
pub struct SessionScope {
    session: Session,
    frame: Option<FrameGuard>,
}

impl SessionScope {
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Disposes the session now and returns what the teardown did.
    pub fn dispose(self) -> DisposalReport {
        self.session.dispose()
    }
}

impl std::ops::Deref for SessionScope {
    type Target = Session;

    fn deref(&self) -> &Session {
        &self.session
    }
}

impl std::fmt::Debug for SessionScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionScope")
            .field("session", &self.session)
            .finish()
    }
}

impl Drop for SessionScope {
    fn drop(&mut self) {
        let _ = self.session.dispose();
        drop(self.frame.take());
    }
}

/// A session running on its own task, returned by [`SessionRegistry::start`].
#[derive(Debug, Clone)]
pub struct StartedSession {
    session: Session,
    task: TaskHandle,
}

impl StartedSession {
    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn id(&self) -> SessionId {
        self.session.id()
    }

    /// The session's home task, which runs the action.
    pub fn task(&self) -> &TaskHandle {
        &self.task
    }

    /// Requests cancellation of the session's task and its descendants.
    pub fn cancel(&self) {
        self.task.cancel();
    }

    /// Waits for the action to finish. The session is disposed by then.
    pub fn join(&self, timeout: Option<Duration>) -> Option<TaskOutcome> {
        self.task.join(timeout)
    }
}
