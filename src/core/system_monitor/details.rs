use std::collections::BTreeMap;

use sysinfo::System;

use crate::error::Result;
use crate::ui::formatters::format_timestamp;

use super::metrics::SystemDetails;

const ENVIRONMENT_VARS: [&str; 5] = [
    "PATH",
    "HOME",
    "USER",
    "COMPUTERNAME",
    "PROCESSOR_IDENTIFIER",
];
const MAX_ENV_VALUE_CHARS: usize = 100;

/// Host identity, OS release and a handful of environment variables
pub fn collect_details() -> Result<SystemDetails> {
    let unknown = || "Unknown".to_string();

    let environment = ENVIRONMENT_VARS
        .iter()
        .map(|var| {
            let value = std::env::var(var).unwrap_or_else(|_| "N/A".to_string());
            (var.to_string(), truncate_value(&value, MAX_ENV_VALUE_CHARS))
        })
        .collect::<BTreeMap<_, _>>();

    Ok(SystemDetails {
        computer_name: System::host_name().unwrap_or_else(unknown),
        os_name: System::name().unwrap_or_else(unknown),
        os_release: System::os_version().unwrap_or_else(unknown),
        os_version: System::long_os_version().unwrap_or_else(unknown),
        kernel_version: System::kernel_version().unwrap_or_else(unknown),
        architecture: System::cpu_arch(),
        boot_time: format_timestamp(System::boot_time()),
        environment,
    })
}

/// Cut `value` to `max` characters, marking the cut with "..."
pub fn truncate_value(value: &str, max: usize) -> String {
    match value.char_indices().nth(max) {
        Some((cut, _)) => format!("{}...", &value[..cut]),
        None => value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_value() {
        assert_eq!(truncate_value("short", 100), "short");
        let long = "x".repeat(150);
        let cut = truncate_value(&long, 100);
        assert_eq!(cut.len(), 103);
        assert!(cut.ends_with("..."));
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        let value = "é".repeat(101);
        assert_eq!(truncate_value(&value, 100).chars().count(), 103);
    }

    #[test]
    fn test_collect_details_has_every_variable() {
        let details = collect_details().unwrap();
        for var in ENVIRONMENT_VARS {
            assert!(details.environment.contains_key(var));
        }
        assert!(!details.boot_time.is_empty());
    }
}
