//! CPU frequency limits, which sysinfo does not expose.

use crate::core::system_monitor::FrequencyLimits;
use crate::error::{Result, SysdashError};

/// Minimum and maximum CPU clock in MHz.
pub fn frequency_limits() -> Result<FrequencyLimits> {
    #[cfg(target_os = "linux")]
    {
        linux::read_limits(std::path::Path::new("/sys/devices/system/cpu/cpu0/cpufreq"))
    }
    #[cfg(windows)]
    {
        windows::read_limits()
    }
    #[cfg(not(any(target_os = "linux", windows)))]
    {
        Err(SysdashError::unsupported(
            "CPU frequency limits are not available on this platform",
        ))
    }
}

#[cfg(target_os = "linux")]
mod linux {
    use std::fs;
    use std::path::Path;

    use super::*;

    fn read_khz(dir: &Path, file: &str) -> Result<u64> {
        let path = dir.join(file);
        let raw = fs::read_to_string(&path).map_err(|e| SysdashError::from_os_read(e, file))?;
        raw.trim()
            .parse()
            .map_err(|e| SysdashError::provider(format!("{}: {}", path.display(), e)))
    }

    /// cpufreq reports kHz
    pub fn read_limits(cpufreq: &Path) -> Result<FrequencyLimits> {
        if !cpufreq.exists() {
            return Err(SysdashError::unsupported("cpufreq is not available"));
        }
        let max = read_khz(cpufreq, "cpuinfo_max_freq")?;
        let min = read_khz(cpufreq, "cpuinfo_min_freq").ok();

        Ok(FrequencyLimits {
            min_mhz: min.map(|khz| khz / 1000),
            max_mhz: max / 1000,
        })
    }

}

#[cfg(windows)]
mod windows {
    use serde::Deserialize;
    use wmi::WMIConnection;

    use super::*;

    #[derive(Deserialize, Debug)]
    #[serde(rename = "Win32_Processor")]
    #[serde(rename_all = "PascalCase")]
    struct Win32Processor {
        max_clock_speed: Option<u32>,
    }

    pub fn read_limits() -> Result<FrequencyLimits> {
        let wmi_con = WMIConnection::new()
            .map_err(|e| SysdashError::provider(format!("Failed to connect to WMI: {}", e)))?;

        let processors: Vec<Win32Processor> = wmi_con
            .query()
            .map_err(|e| SysdashError::provider(format!("WMI query failed: {}", e)))?;

        let max = processors
            .first()
            .and_then(|p| p.max_clock_speed)
            .ok_or_else(|| SysdashError::unsupported("Win32_Processor has no MaxClockSpeed"))?;

        Ok(FrequencyLimits {
            min_mhz: None,
            max_mhz: u64::from(max),
        })
    }
}
