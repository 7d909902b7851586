use std::fs;
use std::path::{Path, PathBuf};

use crate::core::system_monitor::{percent_of, GpuMetrics, GpuProvider, GpuVendor};
use crate::error::{Result, SysdashError};

const AMD_VENDOR_ID: &str = "0x1002";

/// AMD GPU provider reading the amdgpu driver's sysfs files
pub struct AmdGpuProvider {
    device_dir: PathBuf,
    name: String,
}

impl AmdGpuProvider {
    /// One provider per `/sys/class/drm/cardN` backed by an AMD device.
    pub fn all() -> Result<Vec<Self>> {
        if cfg!(target_os = "linux") {
            Self::scan(Path::new("/sys/class/drm"))
        } else {
            Err(SysdashError::unsupported("AMD GPU metrics require Linux sysfs"))
        }
    }

    pub(crate) fn scan(drm_root: &Path) -> Result<Vec<Self>> {
        let entries =
            fs::read_dir(drm_root).map_err(|e| SysdashError::from_os_read(e, "drm class"))?;

        let mut providers: Vec<Self> = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| is_card_node(&entry.file_name().to_string_lossy()))
            .map(|entry| entry.path().join("device"))
            .filter(|device| read_trimmed(&device.join("vendor")).as_deref() == Some(AMD_VENDOR_ID))
            .map(|device_dir| {
                let name = read_trimmed(&device_dir.join("product_name"))
                    .filter(|n| !n.is_empty())
                    .unwrap_or_else(|| "AMD Radeon GPU".to_string());
                Self { device_dir, name }
            })
            .collect();

        providers.sort_by(|a, b| a.device_dir.cmp(&b.device_dir));
        Ok(providers)
    }

    fn read_u64(&self, file: &str) -> Option<u64> {
        read_trimmed(&self.device_dir.join(file))?.parse().ok()
    }

    /// First hwmon value of `file` under this device
    fn read_hwmon(&self, file: &str) -> Option<u64> {
        let hwmon = fs::read_dir(self.device_dir.join("hwmon")).ok()?;
        hwmon
            .filter_map(|entry| entry.ok())
            .find_map(|entry| read_trimmed(&entry.path().join(file))?.parse().ok())
    }
}

impl GpuProvider for AmdGpuProvider {
    fn vendor(&self) -> GpuVendor {
        GpuVendor::Amd
    }

    fn is_available(&self) -> bool {
        self.device_dir.join("vendor").exists()
    }

    fn collect_metrics(&mut self) -> Result<GpuMetrics> {
        if !self.is_available() {
            return Err(SysdashError::not_found(format!(
                "GPU device {} disappeared",
                self.device_dir.display()
            )));
        }

        let memory_used = self.read_u64("mem_info_vram_used");
        let memory_total = self.read_u64("mem_info_vram_total");
        let memory_percent = match (memory_used, memory_total) {
            (Some(used), Some(total)) => Some(percent_of(used, total)),
            _ => None,
        };

        Ok(GpuMetrics {
            vendor: GpuVendor::Amd,
            name: self.name.clone(),
            utilization_percent: self.read_u64("gpu_busy_percent").map(|v| v as u32),
            memory_used_bytes: memory_used,
            memory_total_bytes: memory_total,
            memory_percent,
            // millidegrees
            temperature_celsius: self.read_hwmon("temp1_input").map(|t| (t / 1000) as u32),
            fan_speed_percent: None,
            power_draw_watts: self
                .read_hwmon("power1_average")
                .map(|p| (p / 1_000_000) as u32), // microwatts to watts
            power_limit_watts: self.read_hwmon("power1_cap").map(|p| (p / 1_000_000) as u32),
            // Hz
            clock_graphics_mhz: self.read_hwmon("freq1_input").map(|f| (f / 1_000_000) as u32),
            clock_memory_mhz: self.read_hwmon("freq2_input").map(|f| (f / 1_000_000) as u32),
        })
    }
}

fn is_card_node(name: &str) -> bool {
    name.strip_prefix("card")
        .is_some_and(|rest| !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit()))
}

fn read_trimmed(path: &Path) -> Option<String> {
    fs::read_to_string(path).ok().map(|s| s.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fake_card(root: &Path, card: &str, vendor: &str) -> PathBuf {
        let device = root.join(card).join("device");
        fs::create_dir_all(device.join("hwmon").join("hwmon0")).unwrap();
        fs::write(device.join("vendor"), format!("{}\n", vendor)).unwrap();
        device
    }

    #[test]
    fn test_card_node_names() {
        assert!(is_card_node("card0"));
        assert!(is_card_node("card12"));
        assert!(!is_card_node("card0-DP-1"));
        assert!(!is_card_node("renderD128"));
        assert!(!is_card_node("card"));
    }

    #[test]
    fn test_scan_reads_amd_cards_only() {
        let root = tempfile::tempdir().unwrap();
        let amd = fake_card(root.path(), "card0", AMD_VENDOR_ID);
        fake_card(root.path(), "card1", "0x10de");
        fs::write(amd.join("gpu_busy_percent"), "37\n").unwrap();
        fs::write(amd.join("mem_info_vram_used"), "1073741824\n").unwrap();
        fs::write(amd.join("mem_info_vram_total"), "4294967296\n").unwrap();
        fs::write(amd.join("hwmon/hwmon0/temp1_input"), "54000\n").unwrap();

        let mut providers = AmdGpuProvider::scan(root.path()).unwrap();
        assert_eq!(providers.len(), 1);

        let metrics = providers[0].collect_metrics().unwrap();
        assert_eq!(metrics.vendor, GpuVendor::Amd);
        assert_eq!(metrics.utilization_percent, Some(37));
        assert_eq!(metrics.memory_total_bytes, Some(4294967296));
        assert_eq!(metrics.memory_percent, Some(25.0));
        assert_eq!(metrics.temperature_celsius, Some(54));
        assert_eq!(metrics.power_draw_watts, None);
    }
}
