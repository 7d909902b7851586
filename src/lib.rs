// sysdash library - public API

// Re-export error types
pub mod error;
pub use error::{Result, SysdashError};

// Module declarations
pub mod core;
pub mod platform;
pub mod ui;

// Re-export commonly used types
pub use core::config::MonitorConfig;
pub use core::hub::{DataKind, HubEvent, MonitorHub};

// Initialize logging; RUST_LOG overrides the info default
pub fn init_logging() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
}
