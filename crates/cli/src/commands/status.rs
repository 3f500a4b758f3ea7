//! Status Command

use anyhow::Result;
use serde::Serialize;

use runwatch_common::{SessionId, SessionSnapshot, TestOutcome, TestResult};
use runwatch_monitor::{HttpBackend, RunBackend, RunStatus};

use super::Context;
use crate::output::{print_error, print_item, print_list, OutputFormat, TableDisplay};

/// Run summary display wrapper for serialization
#[derive(Serialize)]
pub struct RunSummary {
    pub session_id: String,
    pub state: String,
    pub progress_percent: u8,
    pub discovered: u32,
    pub passed: u32,
    pub failed: u32,
    pub skipped: u32,
    pub current_test: Option<String>,
}

impl RunSummary {
    pub fn new(session: &SessionId, state: impl ToString, snapshot: &SessionSnapshot) -> Self {
        Self {
            session_id: session.to_string(),
            state: state.to_string(),
            progress_percent: snapshot.progress_percent,
            discovered: snapshot.discovered_count,
            passed: snapshot.passed_count,
            failed: snapshot.failed_count,
            skipped: snapshot.skipped_count,
            current_test: snapshot.current_test_name.clone(),
        }
    }
}

impl TableDisplay for RunSummary {
    fn headers() -> Vec<&'static str> {
        vec![
            "Session", "State", "Progress", "Discovered", "Passed", "Failed", "Skipped",
            "Current Test",
        ]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.session_id.clone(),
            self.state.clone(),
            format!("{}%", self.progress_percent),
            self.discovered.to_string(),
            self.passed.to_string(),
            self.failed.to_string(),
            self.skipped.to_string(),
            self.current_test.clone().unwrap_or_else(|| "-".to_string()),
        ]
    }
}

/// Test result display wrapper for serialization
#[derive(Serialize)]
pub struct ResultDisplay {
    pub test_name: String,
    pub status: TestOutcome,
    pub duration_ms: u64,
    pub error: Option<String>,
}

impl From<&TestResult> for ResultDisplay {
    fn from(result: &TestResult) -> Self {
        Self {
            test_name: result.test_name.clone(),
            status: result.status,
            duration_ms: result.duration_ms,
            error: result.error_message.clone(),
        }
    }
}

impl TableDisplay for ResultDisplay {
    fn headers() -> Vec<&'static str> {
        vec!["Test", "Status", "Duration", "Error"]
    }

    fn row(&self) -> Vec<String> {
        let status = match self.status {
            TestOutcome::Passed => "✓ passed",
            TestOutcome::Failed => "✗ failed",
            TestOutcome::Skipped => "○ skipped",
        };
        vec![
            self.test_name.clone(),
            status.to_string(),
            format!("{}ms", self.duration_ms),
            self.error.clone().unwrap_or_default(),
        ]
    }
}

/// Print the summary and the per-test results of a run
pub fn print_outcome(summary: &RunSummary, snapshot: &SessionSnapshot, format: OutputFormat) {
    let results: Vec<ResultDisplay> = snapshot.results.iter().map(ResultDisplay::from).collect();

    if format == OutputFormat::Json {
        let combined = serde_json::json!({ "summary": summary, "results": results });
        println!("{}", serde_json::to_string_pretty(&combined).unwrap_or_default());
        return;
    }

    print_item(summary, format);
    if !results.is_empty() {
        println!();
        print_list(&results, format);
    }
}

/// One-shot status query
pub async fn execute(session: String, ctx: &Context) -> Result<i32> {
    let backend = HttpBackend::new(&ctx.config.backend)?;
    let session = SessionId::new(session);

    match backend.run_status(&session).await? {
        RunStatus::Found(snapshot) => {
            let summary = RunSummary::new(&session, snapshot.phase, &snapshot);
            print_outcome(&summary, &snapshot, ctx.format);
            Ok(0)
        }
        RunStatus::NotFound => {
            print_error(&format!("Run {} not found", session));
            Ok(1)
        }
    }
}
