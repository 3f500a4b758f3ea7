//! Run-execution backend client
//!
//! The monitor talks to the backend through [`RunBackend`]; [`HttpBackend`]
//! is the JSON-over-HTTP implementation.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::debug;
use url::Url;

use runwatch_common::{
    clamp_progress, Phase, SessionId, SessionSnapshot, StartRunRequest, StopAck, TestOutcome,
    TestResult,
};

use crate::config::BackendConfig;
use crate::error::{MonitorError, Result};

/// Answer of a status request
#[derive(Debug, Clone, PartialEq)]
pub enum RunStatus {
    Found(SessionSnapshot),
    /// The backend no longer knows the session
    NotFound,
}

/// Request/response half of the backend contract
#[async_trait]
pub trait RunBackend: Send + Sync {
    /// Start a run and return its session identity
    async fn start_run(&self, request: &StartRunRequest) -> Result<SessionId>;

    /// Fetch the full status of a run
    async fn run_status(&self, session: &SessionId) -> Result<RunStatus>;

    /// Ask the backend to stop a run
    async fn stop_run(&self, session: &SessionId) -> Result<StopAck>;
}

/// HTTP implementation of [`RunBackend`]
#[derive(Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpBackend {
    pub fn new(config: &BackendConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;
        let mut base_url = Url::parse(&config.base_url)?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Ok(Self { client, base_url })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        Ok(self.base_url.join(path)?)
    }

    fn session_endpoint(&self, session: &SessionId, action: &str) -> Result<Url> {
        let mut url = self.endpoint("api/runs/")?;
        url.path_segments_mut()
            .map_err(|_| MonitorError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .push(session.as_str())
            .push(action);
        Ok(url)
    }
}

#[async_trait]
impl RunBackend for HttpBackend {
    async fn start_run(&self, request: &StartRunRequest) -> Result<SessionId> {
        let url = self.endpoint("api/runs")?;
        debug!("POST {}", url);

        let resp = self.client.post(url).json(request).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(MonitorError::StartRejected {
                status: status.as_u16(),
                message: error_message(&body),
            });
        }

        let body: StartRunBody = resp.json().await?;
        Ok(SessionId::new(body.session_id))
    }

    async fn run_status(&self, session: &SessionId) -> Result<RunStatus> {
        let url = self.session_endpoint(session, "status")?;
        let resp = self.client.get(url.clone()).send().await?;

        match resp.status() {
            StatusCode::NOT_FOUND => Ok(RunStatus::NotFound),
            status if status.is_success() => {
                let body: StatusBody = resp.json().await?;
                Ok(RunStatus::Found(body.into_snapshot()?))
            }
            status => Err(MonitorError::UnexpectedStatus {
                endpoint: url.path().to_string(),
                status: status.as_u16(),
            }),
        }
    }

    async fn stop_run(&self, session: &SessionId) -> Result<StopAck> {
        let url = self.session_endpoint(session, "stop")?;
        debug!("POST {}", url);

        let resp = self.client.post(url.clone()).send().await?;
        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(StopAck {
                accepted: false,
                message: format!("run {} not found", session),
            });
        }
        if !status.is_success() {
            return Err(MonitorError::UnexpectedStatus {
                endpoint: url.path().to_string(),
                status: status.as_u16(),
            });
        }
        Ok(resp.json().await?)
    }
}

/// Pull the human message out of an error body, falling back to the raw text
fn error_message(body: &str) -> String {
    #[derive(Deserialize)]
    struct ErrorBody {
        error: Option<String>,
        message: Option<String>,
        detail: Option<String>,
    }

    match serde_json::from_str::<ErrorBody>(body) {
        Ok(parsed) => parsed
            .error
            .or(parsed.message)
            .or(parsed.detail)
            .unwrap_or_else(|| body.to_string()),
        Err(_) if body.trim().is_empty() => "no response body".to_string(),
        Err(_) => body.trim().to_string(),
    }
}

#[derive(Deserialize)]
struct StartRunBody {
    #[serde(alias = "sessionId", alias = "id")]
    session_id: String,
}

/// Status body as served by the backend
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct StatusBody {
    phase: Option<String>,
    progress: Option<f64>,
    discovered: Option<u32>,
    passed: Option<u32>,
    failed: Option<u32>,
    skipped: Option<u32>,
    current_test: Option<String>,
    results: Vec<ResultBody>,
}

#[derive(Debug, Deserialize)]
struct ResultBody {
    #[serde(default, alias = "name")]
    test_name: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    duration_ms: u64,
    #[serde(default, alias = "error")]
    error_message: Option<String>,
}

impl StatusBody {
    pub(crate) fn into_snapshot(self) -> Result<SessionSnapshot> {
        let phase = match self.phase {
            Some(p) => p.parse::<Phase>()?,
            None => Phase::default(),
        };

        // A result row the client cannot read must not hide the run's phase
        let mut results = Vec::with_capacity(self.results.len());
        for r in self.results {
            match r.status.parse::<TestOutcome>() {
                Ok(status) => results.push(TestResult {
                    test_name: r.test_name,
                    status,
                    duration_ms: r.duration_ms,
                    error_message: r.error_message,
                }),
                Err(e) => debug!(test = %r.test_name, "Skipping result row: {}", e),
            }
        }

        Ok(SessionSnapshot {
            phase,
            progress_percent: self.progress.map(clamp_progress).unwrap_or(0),
            discovered_count: self.discovered.unwrap_or(0),
            passed_count: self.passed.unwrap_or(0),
            failed_count: self.failed.unwrap_or(0),
            skipped_count: self.skipped.unwrap_or(0),
            current_test_name: self.current_test.filter(|t| !t.is_empty()),
            results,
        })
    }
}
