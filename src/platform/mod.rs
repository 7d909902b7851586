// Platform-specific code module

pub mod cpu_freq;
pub mod gpu;
#[cfg(target_os = "linux")]
pub mod procnet;
pub mod services;
