// Formatting helpers for the presentation layer

pub mod formatters;

pub use formatters::{format_bytes, format_frequency, format_timestamp, format_uptime};
