//! Client configuration

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use url::Url;

use crate::error::{MonitorError, Result};

/// Top-level configuration file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Run-execution backend
    #[serde(default)]
    pub backend: BackendConfig,

    /// Monitor timing and buffering
    #[serde(default)]
    pub monitor: MonitorConfig,
}

/// Where the run-execution backend lives
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Base URL of the HTTP API
    pub base_url: String,

    /// WebSocket event stream URL (derived from `base_url` when unset)
    pub events_url: Option<String>,

    /// Per-request timeout for HTTP calls
    pub request_timeout_ms: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000".to_string(),
            events_url: None,
            request_timeout_ms: 10_000,
        }
    }
}

impl BackendConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Resolve the event stream URL
    ///
    /// `http://host:port/prefix` maps to `ws://host:port/prefix/api/events`,
    /// `https` to `wss`.
    pub fn events_url(&self) -> Result<Url> {
        if let Some(explicit) = &self.events_url {
            return Ok(Url::parse(explicit)?);
        }

        let mut url = Url::parse(&self.base_url)?;
        let scheme = match url.scheme() {
            "http" => "ws",
            "https" => "wss",
            other => {
                return Err(MonitorError::InvalidUrl(format!(
                    "cannot derive event stream from scheme '{}'",
                    other
                )))
            }
        };
        url.set_scheme(scheme)
            .map_err(|_| MonitorError::InvalidUrl(self.base_url.clone()))?;
        let path = format!("{}/api/events", url.path().trim_end_matches('/'));
        url.set_path(&path);
        Ok(url)
    }
}

/// Monitor timing and buffering
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Interval between status polls
    pub poll_interval_ms: u64,

    /// Number of retained log lines
    pub log_capacity: usize,

    /// Longest retained log line, in bytes
    pub max_line_bytes: usize,

    /// How long the push channel keeps draining after a terminal phase
    pub drain_grace_ms: u64,

    /// Push silence, after the poller gave up, before the run is reported stalled
    pub silence_threshold_ms: u64,

    /// How long a stop request may go unanswered before the caller is told
    pub stop_timeout_ms: u64,

    /// Delay before resubscribing to a dropped event stream
    pub reconnect_delay_ms: u64,

    /// Capacity of the monitor event broadcast
    pub event_capacity: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 2_000,
            log_capacity: runwatch_common::log::DEFAULT_LOG_CAPACITY,
            max_line_bytes: runwatch_common::log::DEFAULT_MAX_LINE_BYTES,
            drain_grace_ms: 1_500,
            silence_threshold_ms: 30_000,
            stop_timeout_ms: 15_000,
            reconnect_delay_ms: 1_000,
            event_capacity: 256,
        }
    }
}

impl MonitorConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn drain_grace(&self) -> Duration {
        Duration::from_millis(self.drain_grace_ms)
    }

    pub fn silence_threshold(&self) -> Duration {
        Duration::from_millis(self.silence_threshold_ms)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    /// Reject settings the monitor cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_ms == 0 {
            return Err(MonitorError::InvalidConfig(
                "poll_interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.log_capacity == 0 {
            return Err(MonitorError::InvalidConfig(
                "log_capacity must be greater than zero".to_string(),
            ));
        }
        if self.event_capacity == 0 {
            return Err(MonitorError::InvalidConfig(
                "event_capacity must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

impl ClientConfig {
    /// Load configuration from file, or defaults when the file is absent
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = toml::from_str(&content)?;
            config.monitor.validate()?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = MonitorConfig::default();
        assert_eq!(config.poll_interval(), Duration::from_secs(2));
        assert_eq!(config.log_capacity, 200);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_events_url_derived_from_base() {
        let backend = BackendConfig {
            base_url: "http://localhost:8000".to_string(),
            ..Default::default()
        };
        assert_eq!(
            backend.events_url().unwrap().as_str(),
            "ws://localhost:8000/api/events"
        );

        let backend = BackendConfig {
            base_url: "https://runs.example.com/console/".to_string(),
            ..Default::default()
        };
        assert_eq!(
            backend.events_url().unwrap().as_str(),
            "wss://runs.example.com/console/api/events"
        );
    }

    #[test]
    fn test_events_url_explicit() {
        let backend = BackendConfig {
            events_url: Some("ws://push.example.com/stream".to_string()),
            ..Default::default()
        };
        assert_eq!(
            backend.events_url().unwrap().as_str(),
            "ws://push.example.com/stream"
        );
    }

    #[test]
    fn test_events_url_rejects_other_schemes() {
        let backend = BackendConfig {
            base_url: "ftp://example.com".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            backend.events_url(),
            Err(MonitorError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_validate_rejects_zero_interval() {
        let config = MonitorConfig {
            poll_interval_ms: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(MonitorError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = ClientConfig::default();
        config.backend.base_url = "http://runs.internal:9000".to_string();
        config.monitor.poll_interval_ms = 500;
        config.save(&path).unwrap();

        let loaded = ClientConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_load_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = ClientConfig::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(loaded, ClientConfig::default());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let config: ClientConfig = toml::from_str(
            r#"
            [monitor]
            poll_interval_ms = 750
            "#,
        )
        .unwrap();
        assert_eq!(config.monitor.poll_interval_ms, 750);
        assert_eq!(config.monitor.log_capacity, 200);
        assert_eq!(config.backend, BackendConfig::default());
    }
}
