//! Push event stream
//!
//! The backend multiplexes events for every run over one stream, so each
//! frame names the session it belongs to and subscribers filter on it.

use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use serde::Deserialize;
use tokio_tungstenite::tungstenite::Message;
use tracing::debug;
use url::Url;

use runwatch_common::{clamp_progress, Phase, SessionId, StatusPatch};

use crate::config::BackendConfig;
use crate::error::{MonitorError, Result};

/// Raw text frames of the event stream
pub type EventStream = BoxStream<'static, Result<String>>;

/// Subscription half of the backend contract
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Open a new subscription to the server-wide event stream
    async fn subscribe(&self) -> Result<EventStream>;
}

/// WebSocket implementation of [`EventSource`]
#[derive(Debug, Clone)]
pub struct WsEventSource {
    url: Url,
}

impl WsEventSource {
    pub fn new(url: Url) -> Self {
        Self { url }
    }

    pub fn from_config(config: &BackendConfig) -> Result<Self> {
        Ok(Self::new(config.events_url()?))
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl EventSource for WsEventSource {
    async fn subscribe(&self) -> Result<EventStream> {
        debug!("Connecting to event stream at {}", self.url);
        let (socket, _response) = tokio_tungstenite::connect_async(self.url.as_str()).await?;
        debug!("Connected to event stream");

        let frames = socket.filter_map(|msg| async move {
            match msg {
                Ok(Message::Text(text)) => Some(Ok(text)),
                Ok(Message::Binary(data)) => match String::from_utf8(data) {
                    Ok(text) => Some(Ok(text)),
                    Err(_) => {
                        debug!("Dropping non UTF-8 binary frame");
                        None
                    }
                },
                Ok(Message::Close(frame)) => {
                    debug!("Event stream closed by server: {:?}", frame);
                    None
                }
                Ok(_) => None,
                Err(e) => Some(Err(MonitorError::from(e))),
            }
        });

        Ok(frames.boxed())
    }
}

/// One event as carried on the stream
#[derive(Debug, Clone, Deserialize)]
pub struct PushEvent {
    #[serde(alias = "sessionId")]
    pub session_id: SessionId,
    #[serde(default, alias = "message")]
    pub text: Option<String>,
    #[serde(default)]
    pub phase: Option<String>,
    #[serde(default)]
    pub progress: Option<f64>,
    #[serde(default)]
    pub discovered: Option<u32>,
    #[serde(default)]
    pub passed: Option<u32>,
    #[serde(default)]
    pub failed: Option<u32>,
    #[serde(default)]
    pub skipped: Option<u32>,
    #[serde(default, alias = "currentTest")]
    pub current_test: Option<String>,
}

impl PushEvent {
    /// Structured fields of this event as a partial status patch.
    ///
    /// Phase names the client does not know are dropped.
    pub fn patch(&self) -> StatusPatch {
        let phase = self.phase.as_deref().and_then(|p| match p.parse::<Phase>() {
            Ok(phase) => Some(phase),
            Err(e) => {
                debug!("Ignoring push phase: {}", e);
                None
            }
        });

        StatusPatch {
            phase,
            progress_percent: self.progress.map(clamp_progress),
            discovered_count: self.discovered,
            passed_count: self.passed,
            failed_count: self.failed,
            skipped_count: self.skipped,
            current_test_name: self.current_test.clone().filter(|t| !t.is_empty()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_structured_event() {
        let event: PushEvent = serde_json::from_str(
            r#"{"session_id": "S1", "phase": "discovering", "progress": 10, "current_test": ""}"#,
        )
        .unwrap();
        assert_eq!(event.session_id, SessionId::from("S1"));

        let patch = event.patch();
        assert_eq!(patch.phase, Some(Phase::Discovering));
        assert_eq!(patch.progress_percent, Some(10));
        assert_eq!(patch.passed_count, None);
        assert_eq!(patch.current_test_name, None);
    }

    #[test]
    fn test_parse_aliases() {
        let event: PushEvent = serde_json::from_str(
            r#"{"sessionId": "S9", "message": "clicking #submit", "currentTest": "signup"}"#,
        )
        .unwrap();
        assert_eq!(event.session_id.as_str(), "S9");
        assert_eq!(event.text.as_deref(), Some("clicking #submit"));
        assert_eq!(event.patch().current_test_name.as_deref(), Some("signup"));
    }

    #[test]
    fn test_unknown_phase_dropped_from_patch() {
        let event: PushEvent =
            serde_json::from_str(r#"{"session_id": "S1", "phase": "dreaming", "passed": 3}"#)
                .unwrap();
        let patch = event.patch();
        assert_eq!(patch.phase, None);
        assert_eq!(patch.passed_count, Some(3));
    }

    #[test]
    fn test_event_without_session_is_rejected() {
        assert!(serde_json::from_str::<PushEvent>(r#"{"text": "orphan"}"#).is_err());
    }
}
