// Core data layer: runner, caches, hub and providers

pub mod cache;
pub mod config;
pub mod hub;
pub mod system_monitor;
pub mod task_runner;

// Re-export commonly used items
pub use cache::{CachedSource, Clock, Fetch, FetchFailure, ManualClock, SystemClock};
pub use config::MonitorConfig;
pub use hub::{DataKind, EventBus, HubEvent, MonitorHub};
pub use task_runner::{CancelToken, TaskRunner, TaskState};
