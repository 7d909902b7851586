use chrono::{Local, TimeZone};

const BYTE_UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

/// Format a byte count with 1024 steps and one decimal ("1.5 GB")
pub fn format_bytes(bytes: u64) -> String {
    let mut value = bytes as f64;
    for unit in BYTE_UNITS {
        if value < 1024.0 {
            return format!("{:.1} {}", value, unit);
        }
        value /= 1024.0;
    }
    format!("{:.1} PB", value)
}

/// Format a clock frequency given in MHz ("800 MHz", "2.40 GHz")
pub fn format_frequency(mhz: f64) -> String {
    if mhz >= 1000.0 {
        format!("{:.2} GHz", mhz / 1000.0)
    } else {
        format!("{:.0} MHz", mhz)
    }
}

/// Format an uptime as days, hours and minutes, dropping leading zero units
pub fn format_uptime(seconds: u64) -> String {
    let days = seconds / 86_400;
    let hours = (seconds % 86_400) / 3600;
    let minutes = (seconds % 3600) / 60;

    if days > 0 {
        format!("{}d {}h {}m", days, hours, minutes)
    } else if hours > 0 {
        format!("{}h {}m", hours, minutes)
    } else {
        format!("{}m", minutes)
    }
}

/// Format a Unix timestamp in local time (YYYY-MM-DD HH:MM:SS)
pub fn format_timestamp(unix_secs: u64) -> String {
    i64::try_from(unix_secs)
        .ok()
        .and_then(|secs| Local.timestamp_opt(secs, 0).single())
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "Unknown".to_string())
}

/// Human readable seconds-left for a battery ("2h 05m", "Unlimited")
pub fn format_time_left(seconds: Option<u64>, plugged: bool) -> String {
    match seconds {
        Some(secs) => format!("{}h {:02}m", secs / 3600, (secs % 3600) / 60),
        None if plugged => "Unlimited".to_string(),
        None => "Unknown".to_string(),
    }
}
