// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core Session implementation.

use super::disposable::{Disposable, DisposalReport, release_caught};
use super::options::SessionOptions;
use super::registry::RegistryShared;
use super::slot::{SessionSlot, SlotEntry, SlotId};
use crate::Config;
use crate::error::{ActivationError, SessionError};
use crate::logger::Logger;
use crate::task::{ApplyTask, TaskHandle, TaskInner};
use crate::thread_field::{FieldMode, ThreadField};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt::Display;
use std::str::FromStr;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, OnceLock, Weak};
use uuid::Uuid;

/// Identifier of a session. Random (UUID v4), so ids can be handed to other components
/// and looked up later with [`SessionRegistry::run_in_session`](super::SessionRegistry::run_in_session).
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        SessionId(Uuid::new_v4())
    }

    /// The all-zero id, used by the root session.
    pub const fn nil() -> Self {
        SessionId(Uuid::nil())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// First eight hex digits, for log lines.
    pub fn short(&self) -> String {
        let mut simple = self.0.simple().to_string();
        simple.truncate(8);
        simple
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for SessionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(SessionId)
    }
}

/// Where a session is in its life. Sessions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Created,
    Active,
    Disposed,
}

const CREATED: u8 = 0;
const ACTIVE: u8 = 1;
const DISPOSED: u8 = 2;

impl SessionState {
    fn from_u8(raw: u8) -> SessionState {
        match raw {
            CREATED => SessionState::Created,
            ACTIVE => SessionState::Active,
            _ => SessionState::Disposed,
        }
    }
}

pub(crate) struct SessionInner {
    id: SessionId,
    options: SessionOptions,
    parent: Option<Session>,
    home: Weak<TaskInner>,
    state: AtomicU8,
    static_vars: Mutex<HashMap<SlotId, SlotEntry>>,
    disposables: Mutex<Vec<Box<dyn Disposable>>>,
    redirected: Mutex<Option<Arc<dyn Logger>>>,
    registry: Weak<RegistryShared>,
}

impl Drop for SessionInner {
    fn drop(&mut self) {
        if *self.state.get_mut() == ACTIVE {
            crate::warn_sync!(
                "session {id} was dropped without being disposed; its resources leak",
                id = self.id
            );
        }
        if let Some(registry) = self.registry.upgrade() {
            registry.unregister_dead(self.id);
        }
    }
}

/**
A scope for process-wide state.

Each task has exactly one current session; tasks outside any session see the
[root](Session::root). A session owns:

* slot values ([`SessionSlot`]), copied from its creator when it is created
* a stack of [`Disposable`]s, released last-in first-out when it is disposed
* a home task: the task it is current for, and whose descendants inherit it

Handles are cheap to clone; equality follows identity.
*/
#[derive(Clone)]
pub struct Session {
    pub(crate) inner: Arc<SessionInner>,
}

impl PartialEq for Session {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Session {}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.inner.id)
            .field("options", &self.inner.options)
            .field("state", &self.state())
            .finish()
    }
}

impl Display for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_root() {
            write!(f, "root")
        } else {
            write!(f, "{}", self.inner.id)
        }
    }
}

static ROOT: OnceLock<Session> = OnceLock::new();
static CURRENT: OnceLock<ThreadField<Session>> = OnceLock::new();

/// The field recording which session each task runs under.
pub(crate) fn current_field() -> &'static ThreadField<Session> {
    CURRENT.get_or_init(|| ThreadField::new(Session::root(), FieldMode::CachedInherit))
}

impl Session {
    fn build(
        id: SessionId,
        parent: Option<Session>,
        options: SessionOptions,
        home: Weak<TaskInner>,
        state: u8,
        registry: Weak<RegistryShared>,
    ) -> Session {
        Session {
            inner: Arc::new(SessionInner {
                id,
                options,
                parent,
                home,
                state: AtomicU8::new(state),
                static_vars: Mutex::new(HashMap::new()),
                disposables: Mutex::new(Vec::new()),
                redirected: Mutex::new(None),
                registry,
            }),
        }
    }

    /// A new session in the `Created` state, not yet current anywhere.
    pub(crate) fn new(
        parent: Session,
        options: SessionOptions,
        home: &TaskHandle,
        registry: Weak<RegistryShared>,
    ) -> Session {
        Self::build(
            SessionId::new(),
            Some(parent),
            options,
            home.downgrade(),
            CREATED,
            registry,
        )
    }

    /// The process-wide default session. Always active, never disposed, never registered.
    pub fn root() -> Session {
        ROOT.get_or_init(|| {
            Self::build(
                SessionId::nil(),
                None,
                SessionOptions::empty(),
                Weak::new(),
                ACTIVE,
                Weak::new(),
            )
        })
        .clone()
    }

    /// The session the calling task runs under.
    pub fn current() -> Session {
        current_field().get_current()
    }

    /// The session `task` runs under.
    pub fn of_task(task: &TaskHandle) -> Session {
        current_field().get(task)
    }

    pub fn is_root(&self) -> bool {
        ROOT.get().is_some_and(|root| root == self)
    }

    #[inline]
    pub fn id(&self) -> SessionId {
        self.inner.id
    }

    pub fn options(&self) -> SessionOptions {
        self.inner.options
    }

    pub fn state(&self) -> SessionState {
        SessionState::from_u8(self.inner.state.load(Ordering::Acquire))
    }

    /// The session that was current where this one was created. `None` only for the root.
    pub fn parent(&self) -> Option<Session> {
        self.inner.parent.clone()
    }

    /// The task this session is current for, while that task is alive.
    pub fn home(&self) -> Option<TaskHandle> {
        TaskHandle::upgrade(&self.inner.home)
    }

    /// This session's own value for `slot`, without falling back to the default.
    pub fn get<T>(&self, slot: &SessionSlot<T>) -> Option<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        let vars = self.inner.static_vars.lock();
        vars.get(&slot.id())
            .and_then(|entry| entry.value.downcast_ref::<T>())
            .cloned()
    }

    /// This session's value for `slot`, or the slot's default.
    pub fn slot_value<T>(&self, slot: &SessionSlot<T>) -> T
    where
        T: Clone + Send + Sync + 'static,
    {
        self.get(slot).unwrap_or_else(|| slot.default_value())
    }

    pub fn set<T>(&self, slot: &SessionSlot<T>, value: T)
    where
        T: Clone + Send + Sync + 'static,
    {
        let entry = SlotEntry {
            value: Arc::new(value),
            release: slot.release(),
            owned: true,
        };
        let previous = self.inner.static_vars.lock().insert(slot.id(), entry);
        drop(previous);
    }

    /// Pushes `resource` on the disposable stack.
    ///
    /// On a disposed session the resource is released right away and
    /// [`SessionError::Disposed`] is returned.
    pub fn acquire<D>(&self, resource: D) -> Result<(), SessionError>
    where
        D: Disposable + 'static,
    {
        let rejected: Box<dyn Disposable> = {
            let mut stack = self.inner.disposables.lock();
            if self.inner.state.load(Ordering::Acquire) != DISPOSED {
                stack.push(Box::new(resource));
                return Ok(());
            }
            Box::new(resource)
        };
        if let Err(e) = release_caught(|| rejected.dispose()) {
            crate::error_sync!(
                "releasing resource rejected by disposed session {id}: {e}",
                id = self.inner.id
            );
        }
        Err(SessionError::Disposed(self.inner.id))
    }

    /// Runs `action` when this session is disposed, in stack order with acquired resources.
    pub fn defer<F>(&self, action: F) -> Result<(), SessionError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.acquire(super::on_dispose(move || {
            action();
            Ok(())
        }))
    }

    /// Moves the session to `Active`: copies the parent's slot values, makes the session current
    /// for its home task and opens the collaborator scopes its options ask for.
    ///
    /// On error the caller disposes the session.
    pub(crate) fn activate(&self, config: &Config) -> Result<(), ActivationError> {
        if self
            .inner
            .state
            .compare_exchange(CREATED, ACTIVE, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(ActivationError::new(
                "session",
                format!("session {} was already activated", self.inner.id),
            ));
        }

        if let Some(parent) = &self.inner.parent {
            let snapshot: HashMap<SlotId, SlotEntry> = parent
                .inner
                .static_vars
                .lock()
                .iter()
                .map(|(id, entry)| (*id, entry.inherited()))
                .collect();
            self.inner.static_vars.lock().extend(snapshot);
        }

        if let Some(home) = self.home() {
            current_field().set(&home, self.clone());
        }

        if self
            .inner
            .options
            .contains(SessionOptions::OVERLAY_COMPONENT_SETTINGS)
        {
            if let Some(settings) = &config.settings {
                let scope = settings.begin_overlay_scope(self)?;
                self.inner.disposables.lock().push(scope);
            }
        }

        if self.inner.options.contains(SessionOptions::REDIRECT_LOGGING) {
            let logger = config.log_redirect.begin_redirected_context(self)?;
            *self.inner.redirected.lock() = Some(logger);
        }
        Ok(())
    }

    /// Releases the disposable stack, last acquired first, and detaches the session.
    ///
    /// Every release runs even if earlier ones fail or panic; failures are logged and
    /// collected in the report. Afterwards the session is out of its registry, no longer
    /// current for its home task, and no longer redirects logging. Only the first call does
    /// anything; the root session is never disposed.
    pub fn dispose(&self) -> DisposalReport {
        let mut report = DisposalReport::default();
        if self.is_root() {
            crate::debuginternal_sync!("ignoring dispose of the root session");
            return report;
        }
        if self.inner.state.swap(DISPOSED, Ordering::AcqRel) == DISPOSED {
            return report;
        }

        loop {
            let next = self.inner.disposables.lock().pop();
            let Some(resource) = next else {
                break;
            };
            let result = release_caught(|| resource.dispose());
            if let Err(e) = &result {
                crate::error_sync!(
                    "disposing session {id}: {e}",
                    id = self.inner.id
                );
            }
            report.record(result);
            drop(resource);
        }

        let redirected = self.inner.redirected.lock().take();
        if let Some(logger) = redirected {
            logger.prepare_to_die();
        }
        if let Some(registry) = self.inner.registry.upgrade() {
            registry.unregister(self);
        }
        if let Some(home) = self.home() {
            let previous = current_field().clear(&home);
            drop(previous);
        }
        crate::debuginternal_sync!(
            "disposed session {id}: {released} released, {failed} failed",
            id = self.inner.id,
            released = report.released,
            failed = report.errors.len()
        );
        report
    }

    /// Releases and clears every auto-dispose slot value this session wrote.
    ///
    /// Runs when the home task ends. Values copied from the parent are cleared but left for the
    /// parent to release. A second call finds nothing left to release.
    pub fn dispose_static_vars(&self) -> DisposalReport {
        let removed: Vec<SlotEntry> = {
            let mut vars = self.inner.static_vars.lock();
            let ids: Vec<SlotId> = vars
                .iter()
                .filter(|(_, entry)| entry.release.is_some())
                .map(|(id, _)| *id)
                .collect();
            ids.into_iter().filter_map(|id| vars.remove(&id)).collect()
        };
        let mut report = DisposalReport::default();
        for entry in removed {
            let Some(release) = entry.release.filter(|_| entry.owned) else {
                continue;
            };
            let result = release_caught(|| release(&*entry.value));
            if let Err(e) = &result {
                crate::error_sync!(
                    "releasing slot value of session {id}: {e}",
                    id = self.inner.id
                );
            }
            report.record(result);
        }
        report
    }

    /// Runs `action` on the calling thread with this session current, then restores the
    /// thread's previous task, also when `action` panics.
    ///
    /// `action` runs as the session's home task. If that task is gone, it runs as a detached
    /// task under the session instead.
    pub fn run_in_session<R>(&self, action: impl FnOnce() -> R) -> Result<R, SessionError> {
        if self.state() == SessionState::Disposed {
            return Err(SessionError::Disposed(self.inner.id));
        }
        match self.home() {
            Some(home) => {
                let _frame = home.enter();
                Ok(action())
            }
            None => {
                let task = self.detached_task();
                let frame = task.enter();
                let result = action();
                drop(frame);
                current_field().clear(&task);
                Ok(result)
            }
        }
    }

    /// Wraps `future` so every poll runs under this session, as a child of its home task.
    ///
    /// Fails with [`SessionError::Disposed`] once the session is disposed, like
    /// [`run_in_session`](Session::run_in_session).
    pub fn bind<F: std::future::Future>(&self, future: F) -> Result<ApplyTask<F>, SessionError> {
        if self.state() == SessionState::Disposed {
            return Err(SessionError::Disposed(self.inner.id));
        }
        let task = match self.home() {
            Some(home) => home.new_child(),
            None => self.detached_task(),
        };
        Ok(ApplyTask::new(task, future))
    }

    /// A fresh root task that runs under this session.
    fn detached_task(&self) -> TaskHandle {
        let task = TaskHandle::new_root();
        if !self.is_root() {
            current_field().set(&task, self.clone());
        }
        task
    }

    /// The logger this session redirected its logging to, until it is disposed.
    pub fn redirected_logger(&self) -> Option<Arc<dyn Logger>> {
        self.inner.redirected.lock().clone()
    }

    /// Number of resources waiting on the disposable stack.
    pub fn pending_disposables(&self) -> usize {
        self.inner.disposables.lock().len()
    }

    /// Creates a session in the process-wide registry. See [`SessionRegistry::create`](super::SessionRegistry::create).
    pub fn create(options: SessionOptions) -> Result<super::SessionScope, SessionError> {
        super::SessionRegistry::global().create(options)
    }

    /// Starts a session task in the process-wide registry. See [`SessionRegistry::start`](super::SessionRegistry::start).
    pub fn start<F>(options: SessionOptions, action: F) -> Result<super::StartedSession, SessionError>
    where
        F: FnOnce() + Send + 'static,
    {
        super::SessionRegistry::global().start(options, action)
    }
}
