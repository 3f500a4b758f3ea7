//! Runwatch Monitor
//!
//! Client-side tracking of one server-executed test run. Two independent
//! producers feed a single merge loop:
//!
//! - [`PullPoller`] fetches full status snapshots on an interval and is the
//!   source of truth;
//! - [`PushListener`] follows the multiplexed event stream, keeps only this
//!   run's events and forwards log lines and partial patches.
//!
//! [`RunMonitor`] owns both, reconciles their output and exposes the result.

pub mod backend;
pub mod channel;
pub mod config;
pub mod error;
pub mod events;
pub mod listener;
pub mod merge;
pub mod monitor;
pub mod poller;

#[cfg(test)]
pub(crate) mod testing;

pub use backend::{HttpBackend, RunBackend, RunStatus};
pub use channel::{ChannelHandle, PushUpdate, Update};
pub use config::{BackendConfig, ClientConfig, MonitorConfig};
pub use error::{MonitorError, Result};
pub use events::{EventSource, EventStream, PushEvent, WsEventSource};
pub use listener::PushListener;
pub use merge::{MergeOutcome, MergeState};
pub use monitor::{MonitorEvent, MonitorState, MonitorView, RunMonitor};
pub use poller::PullPoller;

/// Build a monitor wired to the HTTP backend and WebSocket event stream
/// described by `config`.
pub fn connect(config: &ClientConfig) -> Result<RunMonitor> {
    config.monitor.validate()?;
    let backend = HttpBackend::new(&config.backend)?;
    let source = WsEventSource::from_config(&config.backend)?;
    Ok(RunMonitor::new(
        config.monitor.clone(),
        std::sync::Arc::new(backend),
        std::sync::Arc::new(source),
    ))
}
