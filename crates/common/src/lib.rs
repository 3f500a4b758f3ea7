//! Runwatch Common Library
//!
//! Shared data model for observing a server-executed test run: the run
//! phase machine, full status snapshots, partial status patches and the
//! bounded run log.

pub mod error;
pub mod log;
pub mod types;

// Re-export commonly used types
pub use error::{Error, Result};
pub use log::{LogBuffer, LogClass, LogEntry};
pub use types::*;

/// Default directory for runwatch state and configuration
pub fn default_home() -> std::path::PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join(".runwatch")
}

/// Default configuration file path
pub fn default_config_path() -> std::path::PathBuf {
    default_home().join("config.toml")
}

/// Home directory helper
mod dirs {
    pub fn home_dir() -> Option<std::path::PathBuf> {
        std::env::var_os("HOME").map(std::path::PathBuf::from)
    }
}
