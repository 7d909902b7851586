// Replace-on-collision and delivery tests for the task runner

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use sysdash::core::task_runner::{TaskRunner, TaskState};
use sysdash::SysdashError;

#[test]
fn test_join_replaced_waits_for_first_worker() {
    let mut runner = TaskRunner::with_join_replaced(true).unwrap();
    let first_done = Arc::new(AtomicBool::new(false));
    let first_done_seen_by_second = Arc::new(AtomicBool::new(false));
    let results = Rc::new(RefCell::new(Vec::new()));

    let done = first_done.clone();
    let sink = results.clone();
    runner.execute(
        "refresh",
        move |_| {
            thread::sleep(Duration::from_millis(50));
            done.store(true, Ordering::SeqCst);
            Ok::<_, SysdashError>("first")
        },
        move |v| sink.borrow_mut().push(v),
        |_| {},
    );

    let done = first_done.clone();
    let seen = first_done_seen_by_second.clone();
    let sink = results.clone();
    runner.execute(
        "refresh",
        move |_| {
            seen.store(done.load(Ordering::SeqCst), Ordering::SeqCst);
            Ok::<_, SysdashError>("second")
        },
        move |v| sink.borrow_mut().push(v),
        |_| {},
    );

    assert!(first_done.load(Ordering::SeqCst), "execute should have joined the first worker");
    assert_eq!(runner.wait("refresh"), TaskState::Completed);
    runner.dispatch();

    assert!(first_done_seen_by_second.load(Ordering::SeqCst));
    assert_eq!(*results.borrow(), vec!["second"]);
}

#[test]
fn test_rapid_replacement_fires_last_callback_only() {
    let mut runner = TaskRunner::new().unwrap();
    let successes = Rc::new(RefCell::new(Vec::new()));
    let errors = Rc::new(AtomicUsize::new(0));

    for i in 0..5u32 {
        let sink = successes.clone();
        let errors = errors.clone();
        runner.execute(
            "burst",
            move |_| {
                thread::sleep(Duration::from_millis(10));
                Ok::<_, SysdashError>(i)
            },
            move |v| sink.borrow_mut().push(v),
            move |_| {
                errors.fetch_add(1, Ordering::SeqCst);
            },
        );
    }

    runner.wait("burst");
    // Give the replaced workers time to post their stale results.
    thread::sleep(Duration::from_millis(100));
    runner.dispatch();

    assert_eq!(*successes.borrow(), vec![4]);
    assert_eq!(errors.load(Ordering::SeqCst), 0);
}

#[test]
fn test_independent_names_all_deliver() {
    let mut runner = TaskRunner::new().unwrap();
    let delivered = Rc::new(RefCell::new(Vec::new()));

    for name in ["cpu", "disk", "net"] {
        let sink = delivered.clone();
        runner.execute(
            name,
            move |_| Ok::<_, SysdashError>(name.to_string()),
            move |v| sink.borrow_mut().push(v),
            |_| {},
        );
    }

    for name in ["cpu", "disk", "net"] {
        runner.wait(name);
    }

    let mut got = delivered.borrow().clone();
    got.sort();
    assert_eq!(got, vec!["cpu", "disk", "net"]);
    assert!(runner.running_tasks().is_empty());
}

#[test]
fn test_stop_all_cancels_cooperative_fetch() {
    let mut runner = TaskRunner::new().unwrap();
    let observed_cancel = Arc::new(AtomicBool::new(false));
    let fired = Rc::new(RefCell::new(false));

    let observed = observed_cancel.clone();
    let fired_clone = fired.clone();
    runner.execute(
        "long",
        move |cancel| {
            for _ in 0..200 {
                if cancel.is_cancelled() {
                    observed.store(true, Ordering::SeqCst);
                    return Err(SysdashError::task_failed("cancelled"));
                }
                thread::sleep(Duration::from_millis(5));
            }
            Ok(())
        },
        move |_| *fired_clone.borrow_mut() = true,
        |_| {},
    );

    runner.stop_all();
    assert_eq!(runner.state("long"), TaskState::Cancelled);

    for _ in 0..100 {
        if observed_cancel.load(Ordering::SeqCst) {
            break;
        }
        thread::sleep(Duration::from_millis(5));
    }
    runner.dispatch_timeout(Duration::from_millis(50));

    assert!(observed_cancel.load(Ordering::SeqCst));
    assert!(!*fired.borrow());
}
