use std::collections::HashMap;
use std::time::Instant;

use sysinfo::Networks;

use crate::error::Result;

use super::metrics::{InterfaceTraffic, TrafficSample};

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct Counters {
    sent: u64,
    recv: u64,
}

/// Network throughput since the previous sample.
pub struct TrafficMonitor {
    networks: Networks,
    last_update: Instant,
    last_totals: Counters,
    last_interfaces: HashMap<String, Counters>,
}

impl TrafficMonitor {
    /// Take the baseline now; the first sample reports rates against it.
    pub fn new() -> Self {
        let networks = Networks::new_with_refreshed_list();
        let last_interfaces = interface_counters(&networks);
        let last_totals = sum_counters(last_interfaces.values());

        Self {
            networks,
            last_update: Instant::now(),
            last_totals,
            last_interfaces,
        }
    }

    pub fn sample(&mut self) -> Result<TrafficSample> {
        self.networks.refresh(true);
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_update).as_secs_f64();

        let current = interface_counters(&self.networks);
        let totals = sum_counters(current.values());

        let mut interfaces: Vec<InterfaceTraffic> = self
            .networks
            .iter()
            .map(|(name, data)| {
                let cur = current.get(name).copied().unwrap_or_default();
                let prev = self.last_interfaces.get(name).copied().unwrap_or(cur);
                InterfaceTraffic {
                    interface: name.to_string(),
                    rx_bytes_total: cur.recv,
                    tx_bytes_total: cur.sent,
                    rx_bytes_per_sec: rate(prev.recv, cur.recv, elapsed),
                    tx_bytes_per_sec: rate(prev.sent, cur.sent, elapsed),
                    rx_errors: data.total_errors_on_received(),
                    tx_errors: data.total_errors_on_transmitted(),
                }
            })
            .collect();
        interfaces.sort_by(|a, b| a.interface.cmp(&b.interface));

        let (packets_sent, packets_recv) = self.networks.values().fold((0u64, 0u64), |(s, r), d| {
            (
                s.saturating_add(d.total_packets_transmitted()),
                r.saturating_add(d.total_packets_received()),
            )
        });

        let sample = TrafficSample {
            timestamp: chrono::Utc::now().timestamp(),
            total_sent: totals.sent,
            total_recv: totals.recv,
            upload_speed: rate(self.last_totals.sent, totals.sent, elapsed),
            download_speed: rate(self.last_totals.recv, totals.recv, elapsed),
            packets_sent,
            packets_recv,
            interfaces,
        };

        self.last_update = now;
        self.last_totals = totals;
        self.last_interfaces = current;
        Ok(sample)
    }
}

impl Default for TrafficMonitor {
    fn default() -> Self {
        Self::new()
    }
}

fn interface_counters(networks: &Networks) -> HashMap<String, Counters> {
    networks
        .iter()
        .map(|(name, data)| {
            (
                name.to_string(),
                Counters {
                    sent: data.total_transmitted(),
                    recv: data.total_received(),
                },
            )
        })
        .collect()
}

fn sum_counters<'a>(counters: impl Iterator<Item = &'a Counters>) -> Counters {
    counters.fold(Counters::default(), |acc, c| Counters {
        sent: acc.sent.saturating_add(c.sent),
        recv: acc.recv.saturating_add(c.recv),
    })
}

/// Bytes per second between two counter readings. Counter resets and a
/// zero interval both read as 0.
pub fn rate(previous: u64, current: u64, elapsed_secs: f64) -> f64 {
    if elapsed_secs <= 0.0 {
        return 0.0;
    }
    current.saturating_sub(previous) as f64 / elapsed_secs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate() {
        assert_eq!(rate(1_000, 3_000, 2.0), 1_000.0);
        assert_eq!(rate(1_000, 1_000, 1.0), 0.0);
    }

    #[test]
    fn test_rate_counter_reset_and_zero_interval() {
        assert_eq!(rate(5_000, 100, 1.0), 0.0);
        assert_eq!(rate(0, 100, 0.0), 0.0);
    }

    #[test]
    fn test_sum_counters_saturates() {
        let counters = [
            Counters { sent: u64::MAX, recv: 1 },
            Counters { sent: 10, recv: 2 },
        ];
        let total = sum_counters(counters.iter());
        assert_eq!(total.sent, u64::MAX);
        assert_eq!(total.recv, 3);
    }

    #[test]
    fn test_sample_totals_match_interfaces() {
        let mut monitor = TrafficMonitor::new();
        let sample = monitor.sample().unwrap();
        let rx: u64 = sample.interfaces.iter().map(|i| i.rx_bytes_total).sum();
        assert_eq!(rx, sample.total_recv);
        assert!(sample.upload_speed >= 0.0);
    }
}
