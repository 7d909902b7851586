//! Windows service inventory through WMI `Win32_Service`.

use crate::core::system_monitor::{ServiceEntry, ServiceStatus};
use crate::error::{Result, SysdashError};

/// Installed services, at most `cap` of them, in WMI order.
#[cfg(windows)]
pub fn list_services(cap: usize) -> Result<Vec<ServiceEntry>> {
    use serde::Deserialize;
    use wmi::WMIConnection;

    #[derive(Deserialize, Debug)]
    #[serde(rename = "Win32_Service")]
    #[serde(rename_all = "PascalCase")]
    struct Win32Service {
        name: String,
        display_name: Option<String>,
        state: Option<String>,
    }

    let wmi_con = WMIConnection::new()
        .map_err(|e| SysdashError::provider(format!("Failed to connect to WMI: {}", e)))?;

    let services: Vec<Win32Service> = wmi_con
        .query()
        .map_err(|e| SysdashError::provider(format!("WMI query failed: {}", e)))?;

    Ok(services
        .into_iter()
        .take(cap)
        .map(|s| ServiceEntry {
            display_name: s.display_name.unwrap_or_else(|| s.name.clone()),
            status: parse_state(s.state.as_deref().unwrap_or_default()),
            name: s.name,
        })
        .collect())
}

#[cfg(not(windows))]
pub fn list_services(_cap: usize) -> Result<Vec<ServiceEntry>> {
    Err(SysdashError::unsupported(
        "service listing is only available on Windows",
    ))
}

/// WMI reports the state as text ("Running", "Start Pending", ...)
pub fn parse_state(state: &str) -> ServiceStatus {
    match state.trim().to_ascii_lowercase().as_str() {
        "stopped" => ServiceStatus::Stopped,
        "start pending" => ServiceStatus::StartPending,
        "stop pending" => ServiceStatus::StopPending,
        "running" => ServiceStatus::Running,
        "continue pending" => ServiceStatus::ContinuePending,
        "pause pending" => ServiceStatus::PausePending,
        "paused" => ServiceStatus::Paused,
        _ => ServiceStatus::Unknown,
    }
}
