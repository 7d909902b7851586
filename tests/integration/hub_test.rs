// End-to-end tests for MonitorHub against the live system

use std::cell::RefCell;
use std::rc::Rc;
use std::time::{Duration, Instant};

use sysdash::core::cache::Fetch;
use sysdash::{DataKind, HubEvent, MonitorConfig, MonitorHub};

fn recording_hub(config: MonitorConfig) -> (MonitorHub, Rc<RefCell<Vec<HubEvent>>>) {
    let hub = MonitorHub::new(config).unwrap();
    let events = Rc::new(RefCell::new(Vec::new()));
    let sink = events.clone();
    hub.subscribe(move |event| sink.borrow_mut().push(event.clone()));
    (hub, events)
}

#[test]
fn test_processes_event_then_cache_hit() {
    let (mut hub, events) = recording_hub(MonitorConfig::default());

    assert!(matches!(hub.processes(false), Fetch::Pending));
    hub.wait(DataKind::Processes);

    let delivered = events
        .borrow()
        .iter()
        .find_map(|e| match e {
            HubEvent::Processes(list) => Some(list.clone()),
            _ => None,
        })
        .expect("process list event");
    assert!(!delivered.is_empty());
    assert!(delivered.len() <= 200);

    match hub.processes(false) {
        Fetch::Ready(cached) => assert!(std::sync::Arc::ptr_eq(&cached, &delivered)),
        Fetch::Pending => panic!("second request inside the window should hit the cache"),
    }
}

#[test]
fn test_joined_request_emits_one_event() {
    let (mut hub, events) = recording_hub(MonitorConfig::default());

    hub.details(false);
    hub.details(false);
    hub.wait(DataKind::Details);
    hub.dispatch();

    let count = events
        .borrow()
        .iter()
        .filter(|e| matches!(e, HubEvent::Details(_)))
        .count();
    assert_eq!(count, 1);
}

fn count_process_events(events: &RefCell<Vec<HubEvent>>) -> usize {
    events
        .borrow()
        .iter()
        .filter(|e| matches!(e, HubEvent::Processes(_)))
        .count()
}

#[test]
fn test_overlapping_forced_refreshes_emit_one_event() {
    let (mut hub, events) = recording_hub(MonitorConfig::default());

    hub.processes(true);
    hub.processes(true);
    hub.wait(DataKind::Processes);
    hub.dispatch();

    assert_eq!(count_process_events(&events), 1);
}

#[test]
fn test_requests_before_shutdown_are_dropped() {
    let (mut hub, events) = recording_hub(MonitorConfig::default());

    hub.processes(false);
    hub.shutdown();
    assert!(!hub.is_pending(DataKind::Processes));

    hub.processes(false);
    hub.wait(DataKind::Processes);
    hub.dispatch();

    assert_eq!(count_process_events(&events), 1);
}

#[test]
fn test_kill_vacant_pid_reports_error_event() {
    let (mut hub, events) = recording_hub(MonitorConfig::default());

    let outcome = hub.kill_process(4_194_305, false);
    assert!(!outcome.success);
    assert_eq!(outcome.message, "Process 4194305 does not exist");

    assert!(events.borrow().iter().any(|e| match e {
        HubEvent::Error {
            source: DataKind::Processes,
            message,
        } => message == "Process 4194305 does not exist",
        _ => false,
    }));
}

#[test]
fn test_monitoring_emits_system_and_traffic() {
    let config = MonitorConfig {
        system_interval_ms: 100,
        traffic_interval_ms: 100,
        ..Default::default()
    };
    let (mut hub, events) = recording_hub(config);

    hub.start_monitoring();
    hub.run_until(Instant::now() + Duration::from_millis(600));
    hub.stop_monitoring();

    let events = events.borrow();
    let systems = events.iter().filter(|e| matches!(e, HubEvent::System(_))).count();
    let traffic = events.iter().filter(|e| matches!(e, HubEvent::Traffic(_))).count();
    assert!(systems >= 1, "expected at least one system snapshot");
    assert!(traffic >= 1, "expected at least one traffic sample");
    assert!(!hub.is_monitoring());
}

#[test]
fn test_hardware_blocking_is_cached() {
    let (mut hub, _events) = recording_hub(MonitorConfig::default());

    let first = hub.hardware_blocking(false).unwrap();
    let second = hub.hardware_blocking(false).unwrap();
    assert!(std::sync::Arc::ptr_eq(&first, &second));
    assert!(first.cpu.logical_cores > 0);
}

#[test]
fn test_process_details_for_self() {
    let hub = MonitorHub::new(MonitorConfig::default()).unwrap();
    let details = hub.process_details(std::process::id()).unwrap();
    assert_eq!(details.record.pid, std::process::id());
    assert!(hub.process_details(4_194_305).is_err());
}

#[test]
fn test_events_serialize_as_json_lines() {
    let (mut hub, events) = recording_hub(MonitorConfig::default());
    hub.sensors();
    hub.wait(DataKind::Sensors);

    for event in events.borrow().iter() {
        let line = serde_json::to_string(event).unwrap();
        assert!(!line.contains('\n'));
        assert!(line.starts_with("{\"event\":"));
    }
}
