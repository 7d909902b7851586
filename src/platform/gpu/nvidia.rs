#[cfg(feature = "nvml")]
use std::sync::Arc;

#[cfg(feature = "nvml")]
use nvml_wrapper::{
    enum_wrappers::device::{Clock, TemperatureSensor},
    Device, Nvml,
};

use crate::core::system_monitor::{percent_of, GpuMetrics, GpuProvider, GpuVendor};
use crate::error::{Result, SysdashError};

/// NVIDIA GPU provider using NVML
pub struct NvidiaGpuProvider {
    #[cfg(feature = "nvml")]
    nvml: Arc<Nvml>,
    device_index: u32,
}

impl NvidiaGpuProvider {
    /// One provider per NVIDIA device, all sharing a single NVML handle.
    pub fn all() -> Result<Vec<Self>> {
        #[cfg(feature = "nvml")]
        {
            let nvml = Arc::new(
                Nvml::init()
                    .map_err(|e| SysdashError::unsupported(format!("Failed to init NVML: {}", e)))?,
            );
            let count = nvml.device_count().map_err(|e| {
                SysdashError::provider(format!("Failed to count NVIDIA devices: {}", e))
            })?;

            Ok((0..count)
                .map(|device_index| Self {
                    nvml: Arc::clone(&nvml),
                    device_index,
                })
                .collect())
        }
        #[cfg(not(feature = "nvml"))]
        {
            Err(SysdashError::unsupported("NVIDIA GPU support not enabled"))
        }
    }

    pub fn device_index(&self) -> u32 {
        self.device_index
    }

    #[cfg(feature = "nvml")]
    fn get_device(&self) -> Result<Device<'_>> {
        self.nvml.device_by_index(self.device_index).map_err(|e| {
            SysdashError::not_found(format!("GPU {} not found: {}", self.device_index, e))
        })
    }
}

impl GpuProvider for NvidiaGpuProvider {
    fn vendor(&self) -> GpuVendor {
        GpuVendor::Nvidia
    }

    fn is_available(&self) -> bool {
        #[cfg(feature = "nvml")]
        {
            self.get_device().is_ok()
        }
        #[cfg(not(feature = "nvml"))]
        {
            false
        }
    }

    fn collect_metrics(&mut self) -> Result<GpuMetrics> {
        #[cfg(feature = "nvml")]
        {
            let device = self.get_device()?;

            let name = device
                .name()
                .unwrap_or_else(|_| "Unknown NVIDIA GPU".to_string());

            let utilization = device.utilization_rates().map(|u| u.gpu).ok();
            let memory_info = device.memory_info().ok();

            let power_draw = device
                .power_usage()
                .map(|p| p / 1000) // mW to W
                .ok();
            let power_limit = device
                .enforced_power_limit()
                .map(|p| p / 1000) // mW to W
                .ok();

            Ok(GpuMetrics {
                vendor: GpuVendor::Nvidia,
                name,
                utilization_percent: utilization,
                memory_used_bytes: memory_info.as_ref().map(|m| m.used),
                memory_total_bytes: memory_info.as_ref().map(|m| m.total),
                memory_percent: memory_info.as_ref().map(|m| percent_of(m.used, m.total)),
                temperature_celsius: device.temperature(TemperatureSensor::Gpu).ok(),
                fan_speed_percent: device.fan_speed(0).ok(),
                power_draw_watts: power_draw,
                power_limit_watts: power_limit,
                clock_graphics_mhz: device.clock_info(Clock::Graphics).ok(),
                clock_memory_mhz: device.clock_info(Clock::Memory).ok(),
            })
        }
        #[cfg(not(feature = "nvml"))]
        {
            Err(SysdashError::unsupported("NVIDIA GPU support not enabled"))
        }
    }
}
