// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tests for the task module.

use super::executor::Executor;
use super::task_impl::{TaskHandle, TaskOutcome};
use crate::Config;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::time::Duration;

const WAIT: Option<Duration> = Some(Duration::from_secs(10));

fn executor() -> Executor {
    Executor::new(&Config::default().min_workers(1))
}

#[test]
fn test_handle_equality_and_hash() {
    use std::collections::HashMap;

    let a = TaskHandle::new_root();
    let b = a.clone();
    let c = TaskHandle::new_root();
    assert_eq!(a, b);
    assert_ne!(a, c);

    let mut map = HashMap::new();
    map.insert(a.clone(), "a");
    map.insert(c.clone(), "c");
    assert_eq!(map.get(&b), Some(&"a"));
    assert_eq!(map.len(), 2);
}

#[test]
fn test_depth_and_display() {
    let root = TaskHandle::new_root();
    let child = root.new_child();
    let grandchild = child.new_child();

    assert_eq!(root.depth(), 0);
    assert_eq!(grandchild.depth(), 2);
    assert!(grandchild.descends_from(&root));
    assert!(!root.descends_from(&grandchild));
    assert!(grandchild.descends_from(&grandchild));
    let cousin = root.new_child().new_child();
    assert!(!grandchild.descends_from(&cousin));
    assert!(!grandchild.descends_from(&root.new_child()));
    assert!(!grandchild.descends_from(&TaskHandle::new_root()));
    assert!(format!("{}", grandchild).starts_with("    "));
    assert!(!format!("{}", root).starts_with(' '));
}

#[test]
fn test_enter_child_restores_previous() {
    let before = TaskHandle::current();
    let exited = Arc::new(AtomicUsize::new(0));
    {
        let frame = TaskHandle::enter_child();
        let inside = TaskHandle::current();
        assert_eq!(&inside, frame.task());
        assert_eq!(inside.parent(), Some(before.clone()));
        let exited = exited.clone();
        inside.on_exit(move || {
            exited.fetch_add(1, Ordering::SeqCst);
        });
    }
    assert_eq!(TaskHandle::current(), before);
    assert_eq!(exited.load(Ordering::SeqCst), 1);
}

#[test]
fn test_enter_does_not_complete() {
    let handle = TaskHandle::new_root();
    {
        let _frame = handle.enter();
        assert_eq!(TaskHandle::current(), handle);
    }
    assert!(!handle.is_finished());
}

#[test]
fn test_frame_restored_after_panic() {
    let before = TaskHandle::current();
    let handle = TaskHandle::new_root();
    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        let _frame = handle.enter();
        panic!("inside frame");
    }));
    assert!(result.is_err());
    assert_eq!(TaskHandle::current(), before);
}

#[test]
fn test_exit_callbacks_run_in_reverse_once() {
    let handle = TaskHandle::new_root();
    let order = Arc::new(parking_lot::Mutex::new(Vec::new()));
    for i in 0..3 {
        let order = order.clone();
        handle.on_exit(move || order.lock().push(i));
    }
    handle.complete(TaskOutcome::Completed);
    handle.complete(TaskOutcome::Completed);
    assert_eq!(*order.lock(), vec![2, 1, 0]);

    // late registration runs immediately
    let order2 = order.clone();
    handle.on_exit(move || order2.lock().push(9));
    assert_eq!(*order.lock(), vec![2, 1, 0, 9]);
}

#[test]
fn test_cancel_propagates_to_descendants() {
    let root = TaskHandle::new_root();
    let child = root.new_child();
    let grandchild = child.new_child();
    let sibling_tree = TaskHandle::new_root();

    child.cancel();
    assert!(!root.is_cancelled());
    assert!(child.is_cancelled());
    assert!(grandchild.is_cancelled());
    assert!(!sibling_tree.is_cancelled());

    // created after the cancel: starts cancelled
    assert!(child.new_child().is_cancelled());
}

#[test]
fn test_wait_cancelled_times_out() {
    let handle = TaskHandle::new_root();
    assert!(!handle.wait_cancelled(Some(Duration::from_millis(5))));
}

#[test]
fn test_spawn_runs_as_child_of_caller() {
    let executor = executor();
    let frame = TaskHandle::enter_child();
    let parent = frame.task().clone();
    let (tx, rx) = mpsc::channel();
    let task = executor.spawn(move || {
        let me = TaskHandle::current();
        tx.send((me.id(), me.parent().map(|p| p.id())))
            .expect("receiver alive");
    });
    let (seen, seen_parent) = rx.recv_timeout(Duration::from_secs(10)).expect("task ran");
    assert_eq!(seen, task.id());
    assert_eq!(seen_parent, Some(parent.id()));
    assert_eq!(task.join(WAIT), Some(TaskOutcome::Completed));
    drop(frame);
}

#[test]
fn test_panicking_body_is_captured() {
    let executor = executor();
    let task = executor.spawn(|| panic!("boom"));
    assert_eq!(
        task.join(WAIT),
        Some(TaskOutcome::Panicked("boom".to_string()))
    );

    // the pool still works afterwards
    let after = executor.spawn(|| {});
    assert_eq!(after.join(WAIT), Some(TaskOutcome::Completed));
}

#[test]
fn test_blocked_tasks_do_not_starve_new_ones() {
    let executor = executor();
    let gate = TaskHandle::new_root();
    let blocked: Vec<TaskHandle> = (0..4)
        .map(|_| {
            let gate = gate.clone();
            executor.spawn(move || {
                gate.wait_cancelled(Some(Duration::from_secs(10)));
            })
        })
        .collect();

    let quick = executor.spawn(|| {});
    assert_eq!(quick.join(WAIT), Some(TaskOutcome::Completed));
    assert!(executor.workers() >= 5);

    gate.cancel();
    for task in blocked {
        assert_eq!(task.join(WAIT), Some(TaskOutcome::Completed));
    }
}

#[test]
fn test_idle_workers_retire_down_to_minimum() {
    let executor = Executor::new(
        &Config::default()
            .min_workers(1)
            .keep_alive(Duration::from_millis(20)),
    );
    let gate = TaskHandle::new_root();
    let tasks: Vec<TaskHandle> = (0..3)
        .map(|_| {
            let gate = gate.clone();
            executor.spawn(move || {
                gate.wait_cancelled(Some(Duration::from_secs(10)));
            })
        })
        .collect();
    gate.cancel();
    for task in tasks {
        task.join(WAIT);
    }
    let deadline = std::time::Instant::now() + Duration::from_secs(10);
    while executor.workers() > 1 && std::time::Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(10));
    }
    assert_eq!(executor.workers(), 1);
}

#[test]
fn test_join_times_out_on_running_task() {
    let executor = executor();
    let gate = TaskHandle::new_root();
    let waiting = gate.clone();
    let task = executor.spawn(move || {
        waiting.wait_cancelled(Some(Duration::from_secs(10)));
    });
    assert_eq!(task.join(Some(Duration::from_millis(10))), None);
    gate.cancel();
    assert_eq!(task.join(WAIT), Some(TaskOutcome::Completed));
}

#[test_executors::async_test]
async fn test_apply_task_binds_during_poll() {
    let task = TaskHandle::new_root().new_child();
    let expected = task.id();
    let before = TaskHandle::current();
    let seen = super::ApplyTask::new(task, async { TaskHandle::current().id() }).await;
    assert_eq!(seen, expected);
    assert_eq!(TaskHandle::current(), before);
}
