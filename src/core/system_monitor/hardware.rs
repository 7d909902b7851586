//! Static-ish hardware inventory: CPU, memory, disks, interfaces, GPUs.
//!
//! Each part is read independently. A disk that cannot be measured or a
//! machine without a GPU shows up as a [`Probe`] on that entry instead of
//! failing the whole inventory.

use std::collections::BTreeMap;
use std::net::IpAddr;

use log::{debug, warn};
use sysinfo::{CpuRefreshKind, Disks, MemoryRefreshKind, Networks, RefreshKind, System};

use crate::core::task_runner::CancelToken;
use crate::error::Result;
use crate::platform::cpu_freq::frequency_limits;
use crate::platform::gpu::detect_gpu_providers;

use super::gpu::GpuProvider;
use super::metrics::*;

pub struct HardwareProvider {
    system: System,
    disks: Disks,
    networks: Networks,
    gpus: Option<Vec<Box<dyn GpuProvider>>>,
}

impl HardwareProvider {
    pub fn new() -> Self {
        let refresh_kind = RefreshKind::nothing()
            .with_cpu(CpuRefreshKind::nothing().with_frequency())
            .with_memory(MemoryRefreshKind::everything());

        Self {
            system: System::new_with_specifics(refresh_kind),
            disks: Disks::new_with_refreshed_list(),
            networks: Networks::new_with_refreshed_list(),
            gpus: None,
        }
    }

    pub fn collect(&mut self, cancel: &CancelToken) -> Result<HardwareInventory> {
        self.system
            .refresh_cpu_specifics(CpuRefreshKind::nothing().with_frequency());
        self.system.refresh_memory();
        let cpu = self.collect_cpu();
        let memory = self.collect_memory();
        cancel.check()?;

        self.disks.refresh(true);
        let disks = self.collect_disks();
        cancel.check()?;

        self.networks.refresh(true);
        let network_interfaces = self.collect_interfaces();
        cancel.check()?;

        let gpus = self.collect_gpus();

        Ok(HardwareInventory {
            cpu,
            memory,
            disks,
            network_interfaces,
            gpus,
        })
    }

    fn collect_cpu(&self) -> CpuInventory {
        let cpus = self.system.cpus();
        let first = cpus.first();

        CpuInventory {
            brand: first
                .map(|c| c.brand().trim().to_string())
                .unwrap_or_else(|| "Unknown".to_string()),
            vendor: first
                .map(|c| c.vendor_id().to_string())
                .unwrap_or_else(|| "Unknown".to_string()),
            architecture: System::cpu_arch(),
            physical_cores: System::physical_core_count(),
            logical_cores: cpus.len(),
            frequency_mhz: first.map(|c| c.frequency()).unwrap_or(0),
            frequency_limits: frequency_limits().into(),
        }
    }

    fn collect_memory(&self) -> MemoryInventory {
        let total = self.system.total_memory();
        let used = self.system.used_memory();
        let swap_total = self.system.total_swap();
        let swap_used = self.system.used_swap();

        MemoryInventory {
            total,
            available: self.system.available_memory(),
            used,
            percent: percent_of(used, total),
            swap_total,
            swap_used,
            swap_free: self.system.free_swap(),
            swap_percent: percent_of(swap_used, swap_total),
        }
    }

    fn collect_disks(&self) -> Vec<DiskEntry> {
        self.disks
            .iter()
            .map(|disk| {
                let total = disk.total_space();
                let usage = if total > 0 {
                    Probe::Available(DiskUsage::from_space(total, disk.available_space()))
                } else {
                    Probe::failed(format!(
                        "cannot read usage of {}",
                        disk.mount_point().display()
                    ))
                };

                DiskEntry {
                    device: disk.name().to_string_lossy().to_string(),
                    mountpoint: disk.mount_point().to_string_lossy().to_string(),
                    fstype: disk.file_system().to_string_lossy().to_string(),
                    usage,
                }
            })
            .collect()
    }

    fn collect_interfaces(&self) -> BTreeMap<String, InterfaceInventory> {
        self.networks
            .iter()
            .map(|(name, data)| {
                let addresses = data
                    .ip_networks()
                    .iter()
                    .map(|net| interface_address(net.addr, net.prefix))
                    .collect();

                (
                    name.to_string(),
                    InterfaceInventory {
                        mac_address: data.mac_address().to_string(),
                        addresses,
                    },
                )
            })
            .collect()
    }

    fn collect_gpus(&mut self) -> Probe<Vec<GpuMetrics>> {
        let providers = self.gpus.get_or_insert_with(|| {
            let found = detect_gpu_providers();
            debug!("Detected {} GPU(s)", found.len());
            found
        });

        if providers.is_empty() {
            return Probe::unsupported("No supported GPU found");
        }

        let mut metrics = Vec::with_capacity(providers.len());
        let mut last_error = None;
        for provider in providers.iter_mut() {
            match provider.collect_metrics() {
                Ok(m) => metrics.push(m),
                Err(e) => {
                    warn!("{:?} GPU read failed: {}", provider.vendor(), e);
                    last_error = Some(e.to_string());
                }
            }
        }

        match (metrics.is_empty(), last_error) {
            (true, Some(error)) => Probe::Failed(error),
            _ => Probe::Available(metrics),
        }
    }
}

impl Default for HardwareProvider {
    fn default() -> Self {
        Self::new()
    }
}

pub fn interface_address(addr: IpAddr, prefix: u8) -> InterfaceAddress {
    match addr {
        IpAddr::V4(_) => InterfaceAddress {
            family: AddressFamily::IPv4,
            address: addr.to_string(),
            prefix,
            netmask: Some(ipv4_netmask(prefix)),
        },
        IpAddr::V6(_) => InterfaceAddress {
            family: AddressFamily::IPv6,
            address: addr.to_string(),
            prefix,
            netmask: None,
        },
    }
}

/// Dotted netmask for an IPv4 prefix length ("255.255.255.0" for 24)
pub fn ipv4_netmask(prefix: u8) -> String {
    let bits = match prefix {
        0 => 0,
        p if p >= 32 => u32::MAX,
        p => u32::MAX << (32 - u32::from(p)),
    };
    std::net::Ipv4Addr::from(bits).to_string()
}
