// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tests for the session module.

use super::*;
use crate::Config;
use crate::error::{ActivationError, DisposeError, SessionError};
use crate::task::{CancelToken, TaskHandle, TaskOutcome};
use crate::thread_field::{FieldMode, ThreadField};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::time::Duration;

const WAIT: Option<Duration> = Some(Duration::from_secs(10));

fn registry() -> SessionRegistry {
    SessionRegistry::new(Config::default().min_workers(2))
}

#[derive(Clone)]
struct Tracker(Option<Arc<AtomicUsize>>);

impl Disposable for Tracker {
    fn dispose(&self) -> Result<(), DisposeError> {
        if let Some(count) = &self.0 {
            count.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

#[test]
fn sibling_sessions_are_isolated() {
    static SLOT: SessionSlot<u32> = SessionSlot::new(|| 0);
    let registry = registry();
    let (tx, rx) = mpsc::channel();
    let sessions: Vec<StartedSession> = (1..=2)
        .map(|n| {
            let tx = tx.clone();
            registry
                .start(SessionOptions::empty(), move || {
                    SLOT.set(n);
                    std::thread::sleep(Duration::from_millis(5));
                    tx.send((n, SLOT.get())).expect("receiver alive");
                })
                .expect("session starts")
        })
        .collect();
    for session in &sessions {
        assert_eq!(session.join(WAIT), Some(TaskOutcome::Completed));
    }
    drop(tx);
    let seen: Vec<(u32, u32)> = rx.iter().collect();
    assert_eq!(seen.len(), 2);
    for (wrote, read) in seen {
        assert_eq!(wrote, read);
    }
    assert_eq!(SLOT.get(), 0);
}

#[test]
fn child_copies_parent_values_once() {
    static SLOT: SessionSlot<u32> = SessionSlot::new(|| 0);
    let registry = registry();
    let parent = registry.create(SessionOptions::empty()).expect("parent");
    SLOT.set(1);
    let child = registry.create(SessionOptions::empty()).expect("child");
    assert_eq!(child.parent().as_ref(), Some(parent.session()));
    assert_eq!(SLOT.get(), 1);

    parent.set(&SLOT, 2);
    assert_eq!(SLOT.get(), 1);
    SLOT.set(3);
    assert_eq!(parent.get(&SLOT), Some(2));

    drop(child);
    assert_eq!(SLOT.get(), 2);
    drop(parent);
}

#[test]
fn unset_slots_read_the_default() {
    static SLOT: SessionSlot<&'static str> = SessionSlot::new(|| "default");
    let registry = registry();
    std::thread::spawn(|| assert_eq!(SLOT.get(), "default"))
        .join()
        .expect("thread");
    let scope = registry.create(SessionOptions::empty()).expect("session");
    assert_eq!(SLOT.get(), "default");
    assert_eq!(scope.get(&SLOT), None);
}

#[test]
fn disposal_is_last_in_first_out() {
    let registry = registry();
    let scope = registry.create(SessionOptions::empty()).expect("session");
    let order = Arc::new(Mutex::new(Vec::new()));
    for name in ["A", "B", "C"] {
        let order = order.clone();
        scope.defer(move || order.lock().push(name)).expect("active");
    }
    assert_eq!(scope.pending_disposables(), 3);
    let report = scope.dispose();
    assert_eq!(report.released, 3);
    assert_eq!(*order.lock(), vec!["C", "B", "A"]);
}

#[test]
fn failing_release_does_not_stop_teardown() {
    let registry = registry();
    let scope = registry.create(SessionOptions::empty()).expect("session");
    let released = Arc::new(Mutex::new(Vec::new()));
    let a = released.clone();
    scope
        .acquire(on_dispose(move || {
            a.lock().push("A");
            Ok(())
        }))
        .expect("active");
    scope
        .acquire(on_dispose(|| Err(DisposeError::failed("B is locked"))))
        .expect("active");
    scope
        .defer(|| panic!("C exploded"))
        .expect("active");

    let report = scope.dispose();
    assert_eq!(report.released, 1);
    assert_eq!(
        report.errors,
        vec![
            DisposeError::Panicked("C exploded".to_string()),
            DisposeError::failed("B is locked"),
        ]
    );
    assert_eq!(*released.lock(), vec!["A"]);
}

#[test]
fn dispose_twice_is_a_no_op() {
    let registry = registry();
    let scope = registry.create(SessionOptions::empty()).expect("session");
    let count = Arc::new(AtomicUsize::new(0));
    let counted = count.clone();
    scope
        .defer(move || {
            counted.fetch_add(1, Ordering::SeqCst);
        })
        .expect("active");
    let first = scope.session().dispose();
    let second = scope.session().dispose();
    assert_eq!(first.released, 1);
    assert_eq!(second, DisposalReport::default());
    assert_eq!(scope.state(), SessionState::Disposed);
    drop(scope);
    assert_eq!(count.load(Ordering::SeqCst), 1);
}

#[test]
fn run_in_session_uses_the_target_session() {
    static SLOT: SessionSlot<u32> = SessionSlot::new(|| 0);
    let registry = registry();
    let gate = CancelToken::new();
    let (ready_tx, ready_rx) = mpsc::channel();
    let waiting = gate.clone();
    let started = registry
        .start(SessionOptions::empty(), move || {
            SLOT.set(42);
            ready_tx.send(()).expect("receiver alive");
            waiting.wait(Some(Duration::from_secs(10)));
        })
        .expect("session starts");
    ready_rx
        .recv_timeout(Duration::from_secs(10))
        .expect("session ready");

    let before_task = TaskHandle::current();
    let before_session = Session::current();
    let seen = registry
        .run_in_session(started.id(), || (SLOT.get(), Session::current().id()))
        .expect("session is live");
    assert_eq!(seen, (42, started.id()));
    assert_eq!(TaskHandle::current(), before_task);
    assert_eq!(Session::current(), before_session);
    assert_eq!(SLOT.get(), 0);

    gate.cancel();
    assert_eq!(started.join(WAIT), Some(TaskOutcome::Completed));
    assert!(matches!(
        registry.run_in_session(started.id(), || ()),
        Err(SessionError::NotFound(_))
    ));
}

#[test]
fn unknown_id_is_not_found() {
    let registry = registry();
    let _scope = registry.create(SessionOptions::empty()).expect("session");
    let ran = AtomicUsize::new(0);
    let missing = SessionId::new();
    let result = registry.run_in_session(missing, || ran.fetch_add(1, Ordering::SeqCst));
    match result {
        Err(SessionError::NotFound(id)) => assert_eq!(id, missing),
        other => panic!("expected NotFound, got {other:?}"),
    }
    assert_eq!(ran.load(Ordering::SeqCst), 0);
    assert_eq!(registry.len(), 1);
}

#[test]
fn auto_dispose_value_released_once_when_home_task_ends() {
    static RESOURCE: SessionSlot<Tracker> = SessionSlot::auto_dispose(|| Tracker(None));
    assert!(RESOURCE.is_auto_dispose());
    let registry = registry();
    let count = Arc::new(AtomicUsize::new(0));
    let counted = count.clone();
    let started = registry
        .start(SessionOptions::empty(), move || {
            RESOURCE.set(Tracker(Some(counted)));
        })
        .expect("session starts");
    assert_eq!(started.join(WAIT), Some(TaskOutcome::Completed));
    assert_eq!(count.load(Ordering::SeqCst), 1);
    assert!(started.session().get(&RESOURCE).is_none());

    let again = started.session().dispose_static_vars();
    assert_eq!(again.released, 0);
    assert_eq!(count.load(Ordering::SeqCst), 1);
}

#[test]
fn inherited_auto_dispose_values_stay_with_their_owner() {
    static RESOURCE: SessionSlot<Tracker> = SessionSlot::auto_dispose(|| Tracker(None));
    let registry = registry();
    let count = Arc::new(AtomicUsize::new(0));
    let outer = registry.create(SessionOptions::empty()).expect("outer");
    RESOURCE.set(Tracker(Some(count.clone())));
    {
        let _inner = registry.create(SessionOptions::empty()).expect("inner");
        assert!(RESOURCE.get().0.is_some());
    }
    assert_eq!(count.load(Ordering::SeqCst), 0);
    drop(outer);
    assert_eq!(count.load(Ordering::SeqCst), 1);
}

#[test]
fn panicking_action_still_disposes() {
    let registry = registry();
    let disposed = Arc::new(AtomicUsize::new(0));
    let counted = disposed.clone();
    let started = registry
        .start(SessionOptions::empty(), move || {
            Session::current()
                .defer(move || {
                    counted.fetch_add(1, Ordering::SeqCst);
                })
                .expect("active");
            panic!("action failed");
        })
        .expect("session starts");
    assert_eq!(
        started.join(WAIT),
        Some(TaskOutcome::Panicked("action failed".to_string()))
    );
    assert_eq!(disposed.load(Ordering::SeqCst), 1);
    assert_eq!(started.session().state(), SessionState::Disposed);
    assert!(registry.is_empty());
}

#[test]
fn acquire_after_dispose_releases_immediately() {
    let registry = registry();
    let scope = registry.create(SessionOptions::empty()).expect("session");
    let session = scope.session().clone();
    drop(scope);
    let count = Arc::new(AtomicUsize::new(0));
    let result = session.acquire(Tracker(Some(count.clone())));
    assert!(matches!(result, Err(SessionError::Disposed(id)) if id == session.id()));
    assert_eq!(count.load(Ordering::SeqCst), 1);
}

#[test]
fn dispose_restores_the_creating_session() {
    let registry = registry();
    let outside = Session::current();
    let scope = registry.create(SessionOptions::empty()).expect("session");
    assert_eq!(Session::current(), *scope.session());
    assert_eq!(registry.ids(), vec![scope.id()]);
    drop(scope);
    assert_eq!(Session::current(), outside);
    assert!(registry.is_empty());
}

#[test]
fn hierarchy_root_does_not_inherit_task_fields() {
    static SLOT: SessionSlot<u32> = SessionSlot::new(|| 0);
    let field = ThreadField::new(0u32, FieldMode::CachedInherit);
    let registry = registry();
    let outer = registry.create(SessionOptions::empty()).expect("outer");
    SLOT.set(5);
    field.set(&TaskHandle::current(), 9);

    let detached = registry
        .create(SessionOptions::THREAD_HIERARCHY_ROOT)
        .expect("detached");
    assert_eq!(field.get_current(), 0);
    assert_eq!(SLOT.get(), 5);
    assert!(detached.home().is_some_and(|home| home.parent().is_none()));
    drop(detached);

    assert_eq!(field.get_current(), 9);
    drop(outer);
}

#[derive(Debug)]
struct Refusing;

impl SettingsOverlay for Refusing {
    fn begin_overlay_scope(
        &self,
        _session: &Session,
    ) -> Result<Box<dyn Disposable>, ActivationError> {
        Err(ActivationError::new("settings", "read-only store"))
    }
}

#[test]
fn activation_error_disposes_the_session() {
    let registry = SessionRegistry::new(
        Config::default()
            .min_workers(1)
            .settings(Arc::new(Refusing)),
    );
    let outside = Session::current();
    let result = registry.create(SessionOptions::OVERLAY_COMPONENT_SETTINGS);
    match result {
        Err(SessionError::Activation(e)) => assert_eq!(e.collaborator, "settings"),
        other => panic!("expected activation error, got {other:?}"),
    }
    assert!(registry.is_empty());
    assert_eq!(Session::current(), outside);

    let ran = Arc::new(AtomicUsize::new(0));
    let counted = ran.clone();
    let started = registry.start(SessionOptions::OVERLAY_COMPONENT_SETTINGS, move || {
        counted.fetch_add(1, Ordering::SeqCst);
    });
    assert!(matches!(started, Err(SessionError::Activation(_))));
    assert_eq!(ran.load(Ordering::SeqCst), 0);
    assert!(registry.is_empty());
}

#[test]
fn redirected_logging_goes_to_the_session_logger() {
    let redirect = Arc::new(InMemoryRedirect::new());
    let registry = SessionRegistry::new(
        Config::default()
            .min_workers(1)
            .log_redirect(redirect.clone()),
    );
    let scope = registry
        .create(SessionOptions::REDIRECT_LOGGING)
        .expect("session");
    crate::warn_sync!("only for this session");
    {
        let _nested = registry.create(SessionOptions::empty()).expect("nested");
        crate::warn_sync!("from a nested session");
    }
    let id = scope.id();
    drop(scope);

    let logs = redirect.take(id).expect("logger handed out").drain_logs();
    assert!(logs.contains("only for this session"), "got {logs}");
    assert!(logs.contains("from a nested session"), "got {logs}");
    assert!(logs.contains(&id.short()), "got {logs}");
}

#[test]
fn leaked_session_is_reported() {
    let _guard = crate::global_logger::tests::TEST_LOGGER_GUARD.lock();
    let original = crate::global_logger::global_loggers();
    let logger = Arc::new(crate::InMemoryLogger::new());
    crate::global_logger::set_global_loggers(vec![logger.clone()]);

    let home = TaskHandle::new_root();
    let session = Session::new(
        Session::root(),
        SessionOptions::empty(),
        &home,
        std::sync::Weak::new(),
    );
    session.activate(&Config::default()).expect("activates");
    let id = session.id();
    drop(session);
    drop(home);
    session_impl::current_field().prune();

    crate::global_logger::set_global_loggers(original);
    let logs = logger.drain_logs();
    assert!(
        logs.contains(&format!("session {id} was dropped without being disposed")),
        "got {logs}"
    );
}

#[test_executors::async_test]
async fn bound_future_runs_under_the_session() {
    static SLOT: SessionSlot<u32> = SessionSlot::new(|| 0);
    let registry = registry();
    let gate = CancelToken::new();
    let waiting = gate.clone();
    let (ready_tx, ready_rx) = mpsc::channel();
    let started = registry
        .start(SessionOptions::empty(), move || {
            SLOT.set(11);
            ready_tx.send(()).expect("receiver alive");
            waiting.wait(Some(Duration::from_secs(10)));
        })
        .expect("session starts");
    ready_rx
        .recv_timeout(Duration::from_secs(10))
        .expect("session ready");

    let session = started.session().clone();
    let outside = Session::current();
    let seen = session
        .bind(async { (SLOT.get(), Session::current().id()) })
        .expect("session is active")
        .await;
    assert_eq!(seen, (11, session.id()));
    assert_eq!(Session::current(), outside);

    gate.cancel();
    assert_eq!(started.join(WAIT), Some(TaskOutcome::Completed));
    assert_eq!(session.state(), SessionState::Disposed);
    assert!(matches!(
        session.bind(async { SLOT.get() }),
        Err(SessionError::Disposed(id)) if id == session.id()
    ));
}

#[test]
fn disposed_session_refuses_bind_after_home_is_gone() {
    static SLOT: SessionSlot<u32> = SessionSlot::new(|| 0);
    let registry = registry();
    let session = {
        let scope = registry.create(SessionOptions::empty()).expect("session");
        SLOT.set(11);
        scope.session().clone()
    };
    assert_eq!(session.state(), SessionState::Disposed);
    assert!(matches!(
        session.bind(async { SLOT.get() }),
        Err(SessionError::Disposed(_))
    ));
    assert!(matches!(
        session.run_in_session(|| SLOT.get()),
        Err(SessionError::Disposed(_))
    ));
    assert_eq!(SLOT.get(), 0);
}
