//! CLI Commands

pub mod config;
pub mod follow;
pub mod run;
pub mod status;
pub mod stop;
pub mod watch;

use std::path::PathBuf;

use runwatch_monitor::ClientConfig;

use crate::output::OutputFormat;

/// Settings shared by every command
pub struct Context {
    pub config: ClientConfig,
    pub config_path: PathBuf,
    pub format: OutputFormat,
}
