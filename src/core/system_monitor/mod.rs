//! Snapshot providers.
//!
//! Each provider wraps one family of OS calls and returns a whole
//! snapshot per call. Providers hold only what the OS library needs
//! between samples (sysinfo handles, previous counters for rates).

mod collector;
mod connections;
mod details;
mod gpu;
mod hardware;
mod metrics;
mod processes;
mod sensors;
mod traffic;

pub use collector::{main_disk_usage, SystemProvider};
pub use connections::{filter_protocol, list_connections, listening_ports};
pub use details::collect_details;
pub use gpu::GpuProvider;
pub use hardware::{ipv4_netmask, HardwareProvider};
pub use metrics::*;
pub use processes::{
    count_connections_by_pid, filter_by_name, kill_process, process_details, sort_processes,
    ProcessProvider, ProcessSort,
};
pub use sensors::SensorProvider;
pub use traffic::{rate, TrafficMonitor};

pub use crate::platform::services::list_services;
