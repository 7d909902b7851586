use sysinfo::Components;

use crate::error::{Result, SysdashError};
use crate::ui::formatters::format_time_left;

use super::metrics::*;

/// Temperature sensors and the first battery
pub struct SensorProvider {
    components: Components,
}

impl SensorProvider {
    pub fn new() -> Self {
        Self {
            components: Components::new_with_refreshed_list(),
        }
    }

    pub fn collect(&mut self) -> Result<SensorReport> {
        self.components.refresh(true);

        Ok(SensorReport {
            temperatures: self.collect_temperatures(),
            battery: collect_battery().into(),
        })
    }

    fn collect_temperatures(&self) -> Probe<Vec<TemperatureReading>> {
        if self.components.iter().next().is_none() {
            return Probe::unsupported("No temperature sensors found");
        }

        Probe::Available(
            self.components
                .iter()
                .map(|comp| TemperatureReading {
                    label: comp.label().to_string(),
                    current_celsius: comp.temperature(),
                    high_celsius: comp.max(),
                    critical_celsius: comp.critical(),
                })
                .collect(),
        )
    }
}

impl Default for SensorProvider {
    fn default() -> Self {
        Self::new()
    }
}

fn collect_battery() -> Result<BatteryStatus> {
    use battery::units::{ratio::percent, time::second};
    use battery::{Manager, State};

    let manager = Manager::new()
        .map_err(|e| SysdashError::unsupported(format!("Battery monitoring unavailable: {}", e)))?;
    let mut batteries = manager
        .batteries()
        .map_err(|e| SysdashError::provider(format!("Failed to list batteries: {}", e)))?;

    let battery = batteries
        .next()
        .ok_or_else(|| SysdashError::unsupported("No battery detected"))?
        .map_err(|e| SysdashError::provider(format!("Failed to read battery: {}", e)))?;

    let state = battery.state();
    let power_plugged = matches!(state, State::Charging | State::Full);
    let seconds_left = if power_plugged {
        None
    } else {
        battery
            .time_to_empty()
            .map(|t| t.get::<second>().max(0.0) as u64)
    };

    Ok(BatteryStatus {
        percent: battery.state_of_charge().get::<percent>(),
        power_plugged,
        seconds_left,
        time_left: format_time_left(seconds_left, power_plugged),
        status: battery_status_text(state).to_string(),
    })
}

fn battery_status_text(state: battery::State) -> &'static str {
    match state {
        battery::State::Charging => "Charging",
        battery::State::Discharging => "On battery",
        battery::State::Full => "Full",
        battery::State::Empty => "Empty",
        _ => "Unknown",
    }
}
