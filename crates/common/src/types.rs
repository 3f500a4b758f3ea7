//! Core types for runwatch

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Opaque identity of one run, issued by the backend when the run starts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for SessionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Run phase
///
/// The server decides the order of the pre-terminal phases; the client only
/// enforces that `Completed`, `Failed` and `Stopped` are final.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    #[default]
    Initializing,
    Discovering,
    Planning,
    Executing,
    Analyzing,
    Completed,
    Failed,
    Stopped,
}

impl Phase {
    /// Whether no further phase transition is accepted after this one
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Completed | Phase::Failed | Phase::Stopped)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Initializing => "initializing",
            Phase::Discovering => "discovering",
            Phase::Planning => "planning",
            Phase::Executing => "executing",
            Phase::Analyzing => "analyzing",
            Phase::Completed => "completed",
            Phase::Failed => "failed",
            Phase::Stopped => "stopped",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Phase {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "initializing" => Ok(Phase::Initializing),
            "discovering" => Ok(Phase::Discovering),
            "planning" => Ok(Phase::Planning),
            "executing" => Ok(Phase::Executing),
            "analyzing" => Ok(Phase::Analyzing),
            "completed" => Ok(Phase::Completed),
            "failed" => Ok(Phase::Failed),
            "stopped" => Ok(Phase::Stopped),
            _ => Err(Error::UnknownPhase(s.to_string())),
        }
    }
}

/// Outcome of a single executed test
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestOutcome {
    Passed,
    Failed,
    Skipped,
}

impl fmt::Display for TestOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TestOutcome::Passed => write!(f, "passed"),
            TestOutcome::Failed => write!(f, "failed"),
            TestOutcome::Skipped => write!(f, "skipped"),
        }
    }
}

impl FromStr for TestOutcome {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "passed" | "pass" => Ok(TestOutcome::Passed),
            "failed" | "fail" => Ok(TestOutcome::Failed),
            "skipped" | "skip" => Ok(TestOutcome::Skipped),
            _ => Err(Error::UnknownOutcome(s.to_string())),
        }
    }
}

/// Result of one test within a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestResult {
    pub test_name: String,
    pub status: TestOutcome,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// Full, self-consistent view of a run as last reported by the backend.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub phase: Phase,
    /// Always within 0..=100
    pub progress_percent: u8,
    pub discovered_count: u32,
    pub passed_count: u32,
    pub failed_count: u32,
    pub skipped_count: u32,
    pub current_test_name: Option<String>,
    #[serde(default)]
    pub results: Vec<TestResult>,
}

/// Clamp an arbitrary progress figure into a whole percentage.
pub fn clamp_progress(value: f64) -> u8 {
    if value.is_nan() {
        return 0;
    }
    value.round().clamp(0.0, 100.0) as u8
}

/// Incremental update carried by a push event.
///
/// Only the fields that are `Some` are known; absent fields say nothing
/// about the current value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatusPatch {
    pub phase: Option<Phase>,
    pub progress_percent: Option<u8>,
    pub discovered_count: Option<u32>,
    pub passed_count: Option<u32>,
    pub failed_count: Option<u32>,
    pub skipped_count: Option<u32>,
    pub current_test_name: Option<String>,
}

impl StatusPatch {
    pub fn is_empty(&self) -> bool {
        self.phase.is_none()
            && self.progress_percent.is_none()
            && self.discovered_count.is_none()
            && self.passed_count.is_none()
            && self.failed_count.is_none()
            && self.skipped_count.is_none()
            && self.current_test_name.is_none()
    }

    /// One-line human summary, used when an event carries no text of its own
    pub fn describe(&self) -> String {
        let mut parts = Vec::new();
        if let Some(phase) = self.phase {
            parts.push(format!("phase: {}", phase));
        }
        if let Some(progress) = self.progress_percent {
            parts.push(format!("{}%", progress));
        }
        if let Some(n) = self.discovered_count {
            parts.push(format!("discovered {}", n));
        }
        if let Some(n) = self.passed_count {
            parts.push(format!("passed {}", n));
        }
        if let Some(n) = self.failed_count {
            parts.push(format!("failed {}", n));
        }
        if let Some(n) = self.skipped_count {
            parts.push(format!("skipped {}", n));
        }
        if let Some(name) = &self.current_test_name {
            parts.push(format!("running {}", name));
        }
        parts.join(" | ")
    }
}

/// Options forwarded to the backend when starting a run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunOptions {
    #[serde(default)]
    pub headless: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tests: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// Application URL the tests should target, when it differs from the project default
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

/// Start-run request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartRunRequest {
    /// Project or folder the run should cover
    pub target: String,
    #[serde(default)]
    pub options: RunOptions,
}

impl StartRunRequest {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            options: RunOptions::default(),
        }
    }

    pub fn with_options(mut self, options: RunOptions) -> Self {
        self.options = options;
        self
    }
}

/// Backend answer to a stop request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StopAck {
    pub accepted: bool,
    #[serde(default)]
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_phases() {
        assert!(Phase::Completed.is_terminal());
        assert!(Phase::Failed.is_terminal());
        assert!(Phase::Stopped.is_terminal());
        assert!(!Phase::Initializing.is_terminal());
        assert!(!Phase::Executing.is_terminal());
        assert!(!Phase::Analyzing.is_terminal());
    }

    #[test]
    fn test_phase_default_is_initializing() {
        assert_eq!(Phase::default(), Phase::Initializing);
        assert_eq!(SessionSnapshot::default().phase, Phase::Initializing);
    }

    #[test]
    fn test_phase_parse() {
        assert_eq!("discovering".parse::<Phase>().unwrap(), Phase::Discovering);
        assert_eq!(" Executing ".parse::<Phase>().unwrap(), Phase::Executing);
        assert_eq!("COMPLETED".parse::<Phase>().unwrap(), Phase::Completed);
        assert!(matches!(
            "warming_up".parse::<Phase>(),
            Err(Error::UnknownPhase(_))
        ));
    }

    #[test]
    fn test_phase_display_matches_wire_name() {
        let json = serde_json::to_string(&Phase::Planning).unwrap();
        assert_eq!(json, "\"planning\"");
        assert_eq!(Phase::Planning.to_string(), "planning");
    }

    #[test]
    fn test_clamp_progress() {
        assert_eq!(clamp_progress(-5.0), 0);
        assert_eq!(clamp_progress(42.4), 42);
        assert_eq!(clamp_progress(99.6), 100);
        assert_eq!(clamp_progress(250.0), 100);
        assert_eq!(clamp_progress(f64::NAN), 0);
    }

    #[test]
    fn test_patch_describe() {
        let patch = StatusPatch {
            phase: Some(Phase::Discovering),
            progress_percent: Some(10),
            ..Default::default()
        };
        assert!(!patch.is_empty());
        assert_eq!(patch.describe(), "phase: discovering | 10%");
        assert!(StatusPatch::default().is_empty());
    }

    #[test]
    fn test_outcome_parse() {
        assert_eq!("PASSED".parse::<TestOutcome>().unwrap(), TestOutcome::Passed);
        assert_eq!("skip".parse::<TestOutcome>().unwrap(), TestOutcome::Skipped);
        assert!("flaky".parse::<TestOutcome>().is_err());
    }
}
