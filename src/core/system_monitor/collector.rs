use std::path::Path;

use sysinfo::{
    CpuRefreshKind, Disks, MemoryRefreshKind, Networks, ProcessRefreshKind, ProcessesToUpdate,
    RefreshKind, System,
};

use crate::error::Result;
use crate::ui::formatters::{format_timestamp, format_uptime};

use super::metrics::*;

/// Samples the dashboard overview: CPU, memory, main disk, uptime and
/// network totals.
pub struct SystemProvider {
    system: System,
    disks: Disks,
    networks: Networks,
}

impl SystemProvider {
    /// Create the provider and prime the CPU counters, so the first
    /// sample already has a usage delta to report.
    pub fn new() -> Self {
        let refresh_kind = RefreshKind::nothing()
            .with_cpu(CpuRefreshKind::nothing().with_cpu_usage())
            .with_memory(MemoryRefreshKind::everything());

        let mut system = System::new_with_specifics(refresh_kind);
        system.refresh_cpu_usage();

        Self {
            system,
            disks: Disks::new_with_refreshed_list(),
            networks: Networks::new_with_refreshed_list(),
        }
    }

    pub fn sample(&mut self) -> Result<SystemSnapshot> {
        self.system.refresh_cpu_usage();
        self.system.refresh_memory();
        self.system.refresh_processes_specifics(
            ProcessesToUpdate::All,
            true,
            ProcessRefreshKind::nothing(),
        );
        self.disks.refresh(true);
        self.networks.refresh(true);

        let total = self.system.total_memory();
        let used = self.system.used_memory();
        let boot_time = System::boot_time();
        let uptime_secs = System::uptime();

        let (bytes_sent, bytes_recv) = self
            .networks
            .values()
            .fold((0u64, 0u64), |(sent, recv), data| {
                (
                    sent.saturating_add(data.total_transmitted()),
                    recv.saturating_add(data.total_received()),
                )
            });

        let main_disk = main_disk_usage(self.disks.iter().map(|disk| {
            (disk.mount_point(), disk.total_space(), disk.available_space())
        }));

        Ok(SystemSnapshot {
            timestamp: chrono::Utc::now().timestamp(),
            cpu_percent: self.system.global_cpu_usage(),
            cpu_count: self.system.cpus().len(),
            memory_percent: percent_of(used, total),
            memory_used: used,
            memory_total: total,
            memory_available: self.system.available_memory(),
            main_disk,
            boot_time: format_timestamp(boot_time),
            uptime_secs,
            uptime: format_uptime(uptime_secs),
            process_count: self
                .system
                .processes()
                .values()
                .filter(|p| p.thread_kind().is_none())
                .count(),
            bytes_sent,
            bytes_recv,
        })
    }
}

impl Default for SystemProvider {
    fn default() -> Self {
        Self::new()
    }
}

/// Usage of `/` (or `C:\`), falling back to the first listed disk
pub fn main_disk_usage<'a, I>(disks: I) -> Option<DiskUsage>
where
    I: IntoIterator<Item = (&'a Path, u64, u64)>,
{
    let disks: Vec<_> = disks.into_iter().collect();
    let preferred = [Path::new("/"), Path::new("C:\\")];

    preferred
        .iter()
        .find_map(|root| disks.iter().find(|(mount, _, _)| mount == root))
        .or_else(|| disks.first())
        .map(|(_, total, available)| DiskUsage::from_space(*total, *available))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_main_disk_prefers_root() {
        let disks = vec![
            (Path::new("/boot"), 1_000, 900),
            (Path::new("/"), 4_000, 1_000),
        ];
        let usage = main_disk_usage(disks).unwrap();
        assert_eq!(usage.total, 4_000);
        assert_eq!(usage.used, 3_000);
    }

    #[test]
    fn test_main_disk_falls_back_to_first() {
        let disks = vec![(Path::new("/data"), 2_000, 500)];
        assert_eq!(main_disk_usage(disks).unwrap().free, 500);
        assert!(main_disk_usage(Vec::new()).is_none());
    }

    #[test]
    fn test_sample_reports_memory_and_cpus() {
        let mut provider = SystemProvider::new();
        let snapshot = provider.sample().unwrap();

        assert!(snapshot.cpu_count > 0);
        assert!(snapshot.memory_total > 0);
        assert!(snapshot.memory_percent >= 0.0 && snapshot.memory_percent <= 100.0);
        assert!(snapshot.process_count > 0);
        assert!(!snapshot.uptime.is_empty());
    }
}
