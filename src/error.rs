use std::io;
use thiserror::Error;

/// Custom error type for sysdash
#[derive(Error, Debug)]
pub enum SysdashError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Not supported: {0}")]
    Unsupported(String),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Task failed: {0}")]
    TaskFailed(String),
}

/// Result type alias for sysdash
pub type Result<T> = std::result::Result<T, SysdashError>;

impl SysdashError {
    /// Create a config error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        SysdashError::Config(msg.into())
    }

    /// Create a permission denied error
    pub fn permission_denied<S: Into<String>>(msg: S) -> Self {
        SysdashError::PermissionDenied(msg.into())
    }

    /// Create a not-found error (process vanished, missing device, ...)
    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        SysdashError::NotFound(msg.into())
    }

    /// Create an error for a source that does not exist on this platform
    pub fn unsupported<S: Into<String>>(msg: S) -> Self {
        SysdashError::Unsupported(msg.into())
    }

    pub fn provider<S: Into<String>>(msg: S) -> Self {
        SysdashError::Provider(msg.into())
    }

    pub fn task_failed<S: Into<String>>(msg: S) -> Self {
        SysdashError::TaskFailed(msg.into())
    }

    /// Map an I/O error from a procfs/sysfs read into the taxonomy
    /// the hub reports to the presentation layer.
    pub fn from_os_read(err: io::Error, what: &str) -> Self {
        match err.kind() {
            io::ErrorKind::PermissionDenied => {
                SysdashError::permission_denied(format!("{}: {}", what, err))
            }
            io::ErrorKind::NotFound => SysdashError::not_found(format!("{}: {}", what, err)),
            _ => SysdashError::provider(format!("{}: {}", what, err)),
        }
    }
}
