//! GPU-specific platform code.
//!
//! NVIDIA devices are read through NVML (feature `nvml`), AMD devices
//! through the amdgpu sysfs files on Linux. Each vendor is probed on its
//! own; a missing driver for one never hides the other.

mod amd;
mod nvidia;

pub use amd::AmdGpuProvider;
pub use nvidia::NvidiaGpuProvider;

use log::debug;

use crate::core::system_monitor::GpuProvider;

/// Find every GPU this machine exposes, NVIDIA first.
pub fn detect_gpu_providers() -> Vec<Box<dyn GpuProvider>> {
    let mut providers: Vec<Box<dyn GpuProvider>> = Vec::new();

    match NvidiaGpuProvider::all() {
        Ok(devices) => {
            providers.extend(devices.into_iter().map(|p| Box::new(p) as Box<dyn GpuProvider>))
        }
        Err(e) => debug!("NVIDIA GPUs unavailable: {}", e),
    }

    match AmdGpuProvider::all() {
        Ok(devices) => {
            providers.extend(devices.into_iter().map(|p| Box::new(p) as Box<dyn GpuProvider>))
        }
        Err(e) => debug!("AMD GPUs unavailable: {}", e),
    }

    providers
}

