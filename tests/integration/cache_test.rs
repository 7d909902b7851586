// Validity-window behaviour of CachedSource against a real runner

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use sysdash::core::cache::{fetch_fn, CachedSource, Fetch, ManualClock};
use sysdash::core::task_runner::TaskRunner;
use sysdash::SysdashError;

fn snapshot_source(
    clock: &ManualClock,
    validity: Duration,
) -> (CachedSource<Vec<u32>>, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let fetch = fetch_fn(move |_| {
        let n = counter.fetch_add(1, Ordering::SeqCst) as u32;
        Ok(vec![n, n + 1, n + 2])
    });
    (
        CachedSource::new("snapshots", validity, fetch, Rc::new(clock.clone())),
        calls,
    )
}

#[test]
fn test_two_second_window() {
    let clock = ManualClock::new();
    let mut runner = TaskRunner::new().unwrap();
    let (source, calls) = snapshot_source(&clock, Duration::from_secs(2));

    // t = 0
    let delivered = Rc::new(RefCell::new(None));
    let sink = delivered.clone();
    let fetch = source.get(&mut runner, false, move |result| {
        *sink.borrow_mut() = Some(result.unwrap());
    });
    assert!(matches!(fetch, Fetch::Pending));
    runner.wait("snapshots");
    let first = delivered.borrow().clone().unwrap();

    // t = 1
    clock.advance(Duration::from_secs(1));
    let Fetch::Ready(cached) = source.get(&mut runner, false, |_| {}) else {
        panic!("expected cached snapshot at t=1");
    };
    assert!(Arc::ptr_eq(&cached, &first));
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // t = 3
    clock.advance(Duration::from_secs(2));
    assert!(matches!(source.get(&mut runner, false, |_| {}), Fetch::Pending));
    runner.wait("snapshots");
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert!(!Arc::ptr_eq(&source.peek().unwrap(), &first));
}

#[test]
fn test_window_boundary_is_exclusive() {
    let clock = ManualClock::new();
    let mut runner = TaskRunner::new().unwrap();
    let (source, calls) = snapshot_source(&clock, Duration::from_secs(2));

    source.get_blocking(&mut runner, false).unwrap();
    clock.advance(Duration::from_secs(2));
    assert!(source.fresh().is_none());
    source.get_blocking(&mut runner, false).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn test_forced_refresh_inside_window() {
    let clock = ManualClock::new();
    let mut runner = TaskRunner::new().unwrap();
    let (source, calls) = snapshot_source(&clock, Duration::from_secs(60));

    let first = source.get_blocking(&mut runner, false).unwrap();
    let second = source.get_blocking(&mut runner, true).unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert!(!Arc::ptr_eq(&first, &second));
    assert!(Arc::ptr_eq(&source.peek().unwrap(), &second));
}

#[test]
fn test_error_without_previous_snapshot() {
    let clock = ManualClock::new();
    let mut runner = TaskRunner::new().unwrap();
    let fetch = fetch_fn(|_| -> sysdash::Result<u8> {
        Err(SysdashError::permission_denied("access to connection table denied"))
    });
    let source = CachedSource::new("denied", Duration::from_secs(3), fetch, Rc::new(clock));

    let failure = source.get_blocking(&mut runner, false).unwrap_err();
    assert!(!failure.message.is_empty());
    assert!(failure.stale.is_none());
    assert!(source.peek().is_none());
}

#[test]
fn test_panicking_fetch_reports_error() {
    let clock = ManualClock::new();
    let mut runner = TaskRunner::new().unwrap();
    let fetch = fetch_fn(|_| -> sysdash::Result<u8> { panic!("provider crashed") });
    let source = CachedSource::new("crashy", Duration::from_secs(3), fetch, Rc::new(clock));

    let failure = source.get_blocking(&mut runner, false).unwrap_err();
    assert!(failure.to_string().contains("provider crashed"));
}
