//! Process enumeration, detail lookup and termination.

use std::cmp::Ordering;
use std::collections::HashMap;

use log::{debug, info, warn};
use sysinfo::{Pid, Process, ProcessRefreshKind, ProcessesToUpdate, System, UpdateKind};

use crate::core::task_runner::CancelToken;
use crate::error::{Result, SysdashError};
use crate::ui::formatters::format_timestamp;

use super::metrics::*;

/// Column a process list can be ordered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessSort {
    Cpu,
    Memory,
    Name,
    Pid,
}

/// Keeps one sysinfo `System` alive between samples so CPU usage is a
/// delta since the previous list.
pub struct ProcessProvider {
    system: System,
}

impl ProcessProvider {
    pub fn new() -> Self {
        Self {
            system: System::new(),
        }
    }

    /// Up to `cap` processes, busiest first. Processes that exit during the
    /// walk are simply absent; kernel threads are skipped.
    pub fn list(&mut self, cap: usize, cancel: &CancelToken) -> Result<Vec<ProcessRecord>> {
        self.system.refresh_memory();
        self.system.refresh_processes_specifics(
            ProcessesToUpdate::All,
            true,
            ProcessRefreshKind::nothing()
                .with_cpu()
                .with_memory()
                .with_exe(UpdateKind::OnlyIfNotSet)
                .with_tasks(),
        );
        cancel.check()?;

        let total_memory = self.system.total_memory();
        let mut records: Vec<ProcessRecord> = self
            .system
            .processes()
            .values()
            .filter(|p| p.thread_kind().is_none())
            .map(|p| process_record(p, total_memory))
            .collect();

        sort_processes(&mut records, ProcessSort::Cpu);
        records.truncate(cap);
        debug!("Listed {} processes", records.len());
        Ok(records)
    }

    /// Per-process I/O volume for every pid that owns one of `connections`,
    /// sorted by connection count.
    pub fn traffic(&mut self, connections: &[NetworkConnection]) -> Vec<ProcessTraffic> {
        let counts = count_connections_by_pid(connections);
        let pids: Vec<Pid> = counts.keys().map(|pid| Pid::from_u32(*pid)).collect();

        self.system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&pids),
            true,
            ProcessRefreshKind::nothing().with_disk_usage(),
        );

        let mut traffic: Vec<ProcessTraffic> = counts
            .into_iter()
            .filter_map(|(pid, connections_count)| {
                let process = self.system.process(Pid::from_u32(pid))?;
                let io = process.disk_usage();
                Some(ProcessTraffic {
                    pid,
                    name: process.name().to_string_lossy().to_string(),
                    bytes_sent: io.total_written_bytes,
                    bytes_recv: io.total_read_bytes,
                    connections_count,
                })
            })
            .collect();

        traffic.sort_by(|a, b| {
            b.connections_count
                .cmp(&a.connections_count)
                .then(a.pid.cmp(&b.pid))
        });
        traffic
    }
}

impl Default for ProcessProvider {
    fn default() -> Self {
        Self::new()
    }
}

fn process_record(process: &Process, total_memory: u64) -> ProcessRecord {
    let memory = process.memory();
    ProcessRecord {
        pid: process.pid().as_u32(),
        name: process.name().to_string_lossy().to_string(),
        cpu_percent: process.cpu_usage(),
        memory_percent: percent_of(memory, total_memory),
        memory_mb: memory as f64 / 1024.0 / 1024.0,
        status: process.status().to_string(),
        create_time: format_timestamp(process.start_time()),
        exe_path: process.exe().map(|p| p.display().to_string()),
        num_threads: process.tasks().map(|tasks| tasks.len()),
        parent_pid: process.parent().map(|p| p.as_u32()),
    }
}

/// Everything known about one process, including its parent and children.
pub fn process_details(pid: u32) -> Result<ProcessDetails> {
    let mut system = System::new();
    system.refresh_memory();
    system.refresh_processes_specifics(
        ProcessesToUpdate::All,
        true,
        ProcessRefreshKind::nothing()
            .with_cpu()
            .with_memory()
            .with_exe(UpdateKind::Always)
            .with_cmd(UpdateKind::Always)
            .with_cwd(UpdateKind::Always)
            .with_tasks(),
    );

    let target = Pid::from_u32(pid);
    let process = system
        .process(target)
        .ok_or_else(|| SysdashError::not_found(format!("Process {} does not exist", pid)))?;

    let parent = process.parent().and_then(|ppid| {
        system.process(ppid).map(|p| ProcessRef {
            pid: ppid.as_u32(),
            name: p.name().to_string_lossy().to_string(),
        })
    });

    let mut children: Vec<ProcessRef> = system
        .processes()
        .values()
        .filter(|p| p.parent() == Some(target) && p.thread_kind().is_none())
        .map(|p| ProcessRef {
            pid: p.pid().as_u32(),
            name: p.name().to_string_lossy().to_string(),
        })
        .collect();
    children.sort_by_key(|c| c.pid);

    Ok(ProcessDetails {
        record: process_record(process, system.total_memory()),
        cwd: process.cwd().map(|p| p.display().to_string()),
        cmdline: process
            .cmd()
            .iter()
            .map(|arg| arg.to_string_lossy().to_string())
            .collect(),
        rss_bytes: process.memory(),
        virtual_bytes: process.virtual_memory(),
        parent,
        children,
    })
}

/// Ask a process to exit (`force = false`) or kill it outright.
///
/// Never fails: every outcome, including a vanished pid, is reported in
/// the returned message.
pub fn kill_process(pid: u32, force: bool) -> KillOutcome {
    let Some(name) = process_name(pid) else {
        return not_found_outcome(pid);
    };

    kill_outcome(pid, &name, force, send_signal(pid, force))
}

/// Turn the result of signalling `pid` into the message shown to the user.
fn kill_outcome(pid: u32, name: &str, force: bool, sent: Result<()>) -> KillOutcome {
    match sent {
        Ok(()) => {
            let message = if force {
                format!("Force killed process {} (PID: {})", name, pid)
            } else {
                format!("Terminated process {} (PID: {})", name, pid)
            };
            info!("{}", message);
            KillOutcome {
                success: true,
                message,
            }
        }
        Err(SysdashError::NotFound(_)) => not_found_outcome(pid),
        Err(SysdashError::PermissionDenied(_)) => {
            warn!("Not allowed to signal process {}", pid);
            KillOutcome {
                success: false,
                message: format!("Permission denied: cannot terminate process {}", pid),
            }
        }
        Err(e) => KillOutcome {
            success: false,
            message: format!("Failed to terminate process {}: {}", pid, e),
        },
    }
}

fn not_found_outcome(pid: u32) -> KillOutcome {
    KillOutcome {
        success: false,
        message: format!("Process {} does not exist", pid),
    }
}

fn process_name(pid: u32) -> Option<String> {
    let target = Pid::from_u32(pid);
    let mut system = System::new();
    system.refresh_processes_specifics(
        ProcessesToUpdate::Some(&[target]),
        true,
        ProcessRefreshKind::nothing(),
    );
    system
        .process(target)
        .map(|p| p.name().to_string_lossy().to_string())
}

#[cfg(unix)]
fn send_signal(pid: u32, force: bool) -> Result<()> {
    let raw = libc::pid_t::try_from(pid)
        .ok()
        .filter(|p| *p > 0)
        .ok_or_else(|| SysdashError::not_found(format!("Process {} does not exist", pid)))?;
    let signal = if force { libc::SIGKILL } else { libc::SIGTERM };

    // SAFETY: kill(2) takes plain integers and has no memory effects.
    if unsafe { libc::kill(raw, signal) } == 0 {
        return Ok(());
    }

    let err = std::io::Error::last_os_error();
    match err.raw_os_error() {
        Some(libc::ESRCH) => Err(SysdashError::not_found(format!(
            "Process {} does not exist",
            pid
        ))),
        Some(libc::EPERM) => Err(SysdashError::permission_denied(format!(
            "cannot signal process {}",
            pid
        ))),
        _ => Err(err.into()),
    }
}

#[cfg(not(unix))]
fn send_signal(pid: u32, force: bool) -> Result<()> {
    let target = Pid::from_u32(pid);
    let mut system = System::new();
    system.refresh_processes_specifics(
        ProcessesToUpdate::Some(&[target]),
        true,
        ProcessRefreshKind::nothing(),
    );
    let process = system
        .process(target)
        .ok_or_else(|| SysdashError::not_found(format!("Process {} does not exist", pid)))?;

    let signal = if force {
        sysinfo::Signal::Kill
    } else {
        sysinfo::Signal::Term
    };
    let sent = process
        .kill_with(signal)
        .unwrap_or_else(|| process.kill());

    if sent {
        Ok(())
    } else {
        Err(SysdashError::permission_denied(format!(
            "cannot signal process {}",
            pid
        )))
    }
}

/// Case-insensitive substring match on the process name
pub fn filter_by_name(records: &[ProcessRecord], query: &str) -> Vec<ProcessRecord> {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return records.to_vec();
    }
    records
        .iter()
        .filter(|r| r.name.to_lowercase().contains(&needle))
        .cloned()
        .collect()
}

/// Order in place: CPU and memory descending, name and pid ascending.
pub fn sort_processes(records: &mut [ProcessRecord], by: ProcessSort) {
    match by {
        ProcessSort::Cpu => records.sort_by(|a, b| {
            b.cpu_percent
                .partial_cmp(&a.cpu_percent)
                .unwrap_or(Ordering::Equal)
        }),
        ProcessSort::Memory => records.sort_by(|a, b| {
            b.memory_mb
                .partial_cmp(&a.memory_mb)
                .unwrap_or(Ordering::Equal)
        }),
        ProcessSort::Name => records.sort_by_key(|r| r.name.to_lowercase()),
        ProcessSort::Pid => records.sort_by_key(|r| r.pid),
    }
}

pub fn count_connections_by_pid(connections: &[NetworkConnection]) -> HashMap<u32, usize> {
    let mut counts = HashMap::new();
    for pid in connections.iter().filter_map(|c| c.pid) {
        *counts.entry(pid).or_insert(0) += 1;
    }
    counts
}
