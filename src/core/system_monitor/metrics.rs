//! Snapshot types produced by the providers.
//!
//! Every snapshot is built whole by one provider call and handed out as
//! `Arc<T>`; nothing here is mutated after construction.

use std::collections::BTreeMap;
use std::fmt;
use std::net::SocketAddr;

use serde::{Deserialize, Serialize};

/// Availability of a single field that depends on an optional source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", content = "value", rename_all = "snake_case")]
pub enum Probe<T> {
    Available(T),
    /// The source does not exist on this platform or machine.
    Unsupported(String),
    /// The source exists but the read failed this time.
    Failed(String),
}

impl<T> Probe<T> {
    pub fn unsupported<S: Into<String>>(reason: S) -> Self {
        Probe::Unsupported(reason.into())
    }

    pub fn failed<S: Into<String>>(reason: S) -> Self {
        Probe::Failed(reason.into())
    }

    pub fn is_available(&self) -> bool {
        matches!(self, Probe::Available(_))
    }

    pub fn as_option(&self) -> Option<&T> {
        match self {
            Probe::Available(value) => Some(value),
            _ => None,
        }
    }
}

impl<T> From<crate::error::Result<T>> for Probe<T> {
    fn from(result: crate::error::Result<T>) -> Self {
        match result {
            Ok(value) => Probe::Available(value),
            Err(crate::error::SysdashError::Unsupported(reason)) => Probe::Unsupported(reason),
            Err(e) => Probe::Failed(e.to_string()),
        }
    }
}

/// Periodic overview shown on the dashboard.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SystemSnapshot {
    pub timestamp: i64, // Unix timestamp
    pub cpu_percent: f32,
    pub cpu_count: usize,
    pub memory_percent: f32,
    pub memory_used: u64,
    pub memory_total: u64,
    pub memory_available: u64,
    pub main_disk: Option<DiskUsage>,
    pub boot_time: String,
    pub uptime_secs: u64,
    pub uptime: String,
    pub process_count: usize,
    pub bytes_sent: u64,
    pub bytes_recv: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DiskUsage {
    pub total: u64,
    pub used: u64,
    pub free: u64,
    pub percent: f32,
}

impl DiskUsage {
    pub fn from_space(total: u64, available: u64) -> Self {
        let used = total.saturating_sub(available);
        Self {
            total,
            used,
            free: available,
            percent: percent_of(used, total),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessRecord {
    pub pid: u32,
    pub name: String,
    pub cpu_percent: f32,
    pub memory_percent: f32,
    pub memory_mb: f64,
    pub status: String,
    pub create_time: String,
    pub exe_path: Option<String>,
    pub num_threads: Option<usize>,
    pub parent_pid: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessRef {
    pub pid: u32,
    pub name: String,
}

/// Everything the detail dialog shows for one process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessDetails {
    #[serde(flatten)]
    pub record: ProcessRecord,
    pub cwd: Option<String>,
    pub cmdline: Vec<String>,
    pub rss_bytes: u64,
    pub virtual_bytes: u64,
    pub parent: Option<ProcessRef>,
    pub children: Vec<ProcessRef>,
}

/// Result of a terminate/kill request, shaped for a status bar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KillOutcome {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Protocol {
    Tcp,
    Udp,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Tcp => write!(f, "TCP"),
            Protocol::Udp => write!(f, "UDP"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionStatus {
    Established,
    SynSent,
    SynRecv,
    FinWait1,
    FinWait2,
    TimeWait,
    Close,
    CloseWait,
    LastAck,
    Listen,
    Closing,
    NewSynRecv,
    /// Connectionless sockets (UDP)
    None,
    Unknown,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ConnectionStatus::Established => "ESTABLISHED",
            ConnectionStatus::SynSent => "SYN_SENT",
            ConnectionStatus::SynRecv => "SYN_RECV",
            ConnectionStatus::FinWait1 => "FIN_WAIT1",
            ConnectionStatus::FinWait2 => "FIN_WAIT2",
            ConnectionStatus::TimeWait => "TIME_WAIT",
            ConnectionStatus::Close => "CLOSE",
            ConnectionStatus::CloseWait => "CLOSE_WAIT",
            ConnectionStatus::LastAck => "LAST_ACK",
            ConnectionStatus::Listen => "LISTEN",
            ConnectionStatus::Closing => "CLOSING",
            ConnectionStatus::NewSynRecv => "NEW_SYN_RECV",
            ConnectionStatus::None => "NONE",
            ConnectionStatus::Unknown => "UNKNOWN",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkConnection {
    pub protocol: Protocol,
    pub local_addr: SocketAddr,
    pub remote_addr: Option<SocketAddr>,
    pub status: ConnectionStatus,
    pub pid: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrafficSample {
    pub timestamp: i64,
    pub total_sent: u64,
    pub total_recv: u64,
    pub upload_speed: f64,   // bytes/s
    pub download_speed: f64, // bytes/s
    pub packets_sent: u64,
    pub packets_recv: u64,
    pub interfaces: Vec<InterfaceTraffic>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InterfaceTraffic {
    pub interface: String,
    pub rx_bytes_total: u64,
    pub tx_bytes_total: u64,
    pub rx_bytes_per_sec: f64,
    pub tx_bytes_per_sec: f64,
    pub rx_errors: u64,
    pub tx_errors: u64,
}

/// Per-process I/O volume next to its open inet connections.
///
/// The byte counters are whole-process disk/IO counters; the OS does not
/// expose per-process network volume without packet capture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessTraffic {
    pub pid: u32,
    pub name: String,
    pub bytes_sent: u64,
    pub bytes_recv: u64,
    pub connections_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HardwareInventory {
    pub cpu: CpuInventory,
    pub memory: MemoryInventory,
    pub disks: Vec<DiskEntry>,
    pub network_interfaces: BTreeMap<String, InterfaceInventory>,
    pub gpus: Probe<Vec<GpuMetrics>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CpuInventory {
    pub brand: String,
    pub vendor: String,
    pub architecture: String,
    pub physical_cores: Option<usize>,
    pub logical_cores: usize,
    pub frequency_mhz: u64,
    pub frequency_limits: Probe<FrequencyLimits>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrequencyLimits {
    pub min_mhz: Option<u64>,
    pub max_mhz: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryInventory {
    pub total: u64,
    pub available: u64,
    pub used: u64,
    pub percent: f32,
    pub swap_total: u64,
    pub swap_used: u64,
    pub swap_free: u64,
    pub swap_percent: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiskEntry {
    pub device: String,
    pub mountpoint: String,
    pub fstype: String,
    pub usage: Probe<DiskUsage>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InterfaceInventory {
    pub mac_address: String,
    pub addresses: Vec<InterfaceAddress>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceAddress {
    pub family: AddressFamily,
    pub address: String,
    pub prefix: u8,
    pub netmask: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AddressFamily {
    IPv4,
    IPv6,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GpuMetrics {
    pub vendor: GpuVendor,
    pub name: String,
    pub utilization_percent: Option<u32>,
    pub memory_used_bytes: Option<u64>,
    pub memory_total_bytes: Option<u64>,
    pub memory_percent: Option<f32>,
    pub temperature_celsius: Option<u32>,
    pub fan_speed_percent: Option<u32>,
    pub power_draw_watts: Option<u32>,
    pub power_limit_watts: Option<u32>,
    pub clock_graphics_mhz: Option<u32>,
    pub clock_memory_mhz: Option<u32>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub enum GpuVendor {
    Nvidia,
    Amd,
    Intel,
    #[default]
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorReport {
    pub temperatures: Probe<Vec<TemperatureReading>>,
    pub battery: Probe<BatteryStatus>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TemperatureReading {
    pub label: String,
    pub current_celsius: Option<f32>,
    pub high_celsius: Option<f32>,
    pub critical_celsius: Option<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatteryStatus {
    pub percent: f32,
    pub power_plugged: bool,
    pub seconds_left: Option<u64>,
    pub time_left: String,
    pub status: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServiceStatus {
    Stopped,
    StartPending,
    StopPending,
    Running,
    ContinuePending,
    PausePending,
    Paused,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceEntry {
    pub name: String,
    pub display_name: String,
    pub status: ServiceStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemDetails {
    pub computer_name: String,
    pub os_name: String,
    pub os_release: String,
    pub os_version: String,
    pub kernel_version: String,
    pub architecture: String,
    pub boot_time: String,
    pub environment: BTreeMap<String, String>,
}

/// `part / whole` as a percentage, 0 when `whole` is 0
pub fn percent_of(part: u64, whole: u64) -> f32 {
    if whole > 0 {
        (part as f32 / whole as f32) * 100.0
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SysdashError;

    #[test]
    fn test_disk_usage_from_space() {
        let usage = DiskUsage::from_space(1000, 250);
        assert_eq!(usage.used, 750);
        assert_eq!(usage.free, 250);
        assert!((usage.percent - 75.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_disk_usage_zero_total() {
        let usage = DiskUsage::from_space(0, 0);
        assert_eq!(usage.percent, 0.0);
    }

    #[test]
    fn test_probe_from_result_keeps_unsupported_apart() {
        let unsupported: Probe<u32> = Err(SysdashError::unsupported("windows only")).into();
        assert_eq!(unsupported, Probe::Unsupported("windows only".to_string()));

        let failed: Probe<u32> = Err(SysdashError::provider("read failed")).into();
        assert!(matches!(failed, Probe::Failed(ref m) if m.contains("read failed")));

        let ok: Probe<u32> = Ok(7).into();
        assert_eq!(ok.as_option(), Some(&7));
    }

    #[test]
    fn test_connection_status_display() {
        assert_eq!(ConnectionStatus::Listen.to_string(), "LISTEN");
        assert_eq!(ConnectionStatus::FinWait2.to_string(), "FIN_WAIT2");
        assert_eq!(ConnectionStatus::None.to_string(), "NONE");
    }
}
