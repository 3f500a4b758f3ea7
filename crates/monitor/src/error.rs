//! Error types for the run monitor

use thiserror::Error;

/// Result type alias using MonitorError
pub type Result<T> = std::result::Result<T, MonitorError>;

#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("Run could not be started ({status}): {message}")]
    StartRejected { status: u16, message: String },

    #[error("Unexpected response from {endpoint}: HTTP {status}")]
    UnexpectedStatus { endpoint: String, status: u16 },

    #[error("Invalid backend URL: {0}")]
    InvalidUrl(String),

    #[error("Monitor already started")]
    AlreadyStarted,

    #[error("Monitor is closed")]
    Closed,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Config encode error: {0}")]
    ConfigEncode(#[from] toml::ser::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Common(#[from] runwatch_common::Error),
}

impl From<url::ParseError> for MonitorError {
    fn from(e: url::ParseError) -> Self {
        MonitorError::InvalidUrl(e.to_string())
    }
}
