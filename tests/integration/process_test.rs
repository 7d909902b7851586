// Process listing and termination against real processes

use std::process::{Command, Stdio};
use std::thread;
use std::time::Duration;

use sysdash::core::system_monitor::{kill_process, process_details, ProcessProvider};
use sysdash::core::task_runner::CancelToken;
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};

fn pid_exists(pid: u32) -> bool {
    let mut system = System::new();
    system.refresh_processes_specifics(
        ProcessesToUpdate::Some(&[Pid::from_u32(pid)]),
        true,
        ProcessRefreshKind::nothing(),
    );
    system.process(Pid::from_u32(pid)).is_some()
}

#[test]
fn test_kill_pid_99999_when_vacant() {
    if pid_exists(99999) {
        return;
    }
    let outcome = kill_process(99999, false);
    assert!(!outcome.success);
    assert_eq!(outcome.message, "Process 99999 does not exist");
}

#[cfg(unix)]
#[test]
fn test_terminate_child_process() {
    let mut child = Command::new("sleep")
        .arg("30")
        .stdout(Stdio::null())
        .spawn()
        .unwrap();
    let pid = child.id();
    thread::sleep(Duration::from_millis(50));

    let outcome = kill_process(pid, false);
    assert!(outcome.success, "{}", outcome.message);
    assert!(outcome.message.starts_with("Terminated process"));
    assert!(outcome.message.ends_with(&format!("(PID: {})", pid)));

    let status = child.wait().unwrap();
    assert!(!status.success());
}

#[cfg(unix)]
#[test]
fn test_force_kill_child_process() {
    let mut child = Command::new("sleep")
        .arg("30")
        .stdout(Stdio::null())
        .spawn()
        .unwrap();
    let pid = child.id();
    thread::sleep(Duration::from_millis(50));

    let outcome = kill_process(pid, true);
    assert!(outcome.success, "{}", outcome.message);
    assert!(outcome.message.starts_with("Force killed process"));
    child.wait().unwrap();
}

#[cfg(unix)]
#[test]
fn test_child_listed_under_parent() {
    let mut child = Command::new("sleep")
        .arg("30")
        .stdout(Stdio::null())
        .spawn()
        .unwrap();
    thread::sleep(Duration::from_millis(50));

    let details = process_details(std::process::id()).unwrap();
    assert!(details.children.iter().any(|c| c.pid == child.id()));

    let _ = child.kill();
    let _ = child.wait();
}

#[test]
fn test_list_includes_current_process_when_uncapped() {
    let mut provider = ProcessProvider::new();
    let records = provider.list(usize::MAX, &CancelToken::new()).unwrap();
    assert!(records.iter().any(|r| r.pid == std::process::id()));
}
