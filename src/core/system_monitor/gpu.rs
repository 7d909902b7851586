use super::metrics::GpuMetrics;
use crate::error::Result;

/// Trait for GPU metrics providers
///
/// One provider instance watches one device. Implementations live in the
/// platform layer; see [`crate::platform::gpu::detect_gpu_providers`].
pub trait GpuProvider: Send {
    /// Get the vendor of the GPU
    fn vendor(&self) -> GpuVendor;

    /// Collect current GPU metrics
    fn collect_metrics(&mut self) -> Result<GpuMetrics>;

    /// Check if the GPU provider is available and functional
    fn is_available(&self) -> bool;
}

// Re-export GpuVendor for convenience
pub use super::metrics::GpuVendor;
