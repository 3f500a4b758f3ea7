//! Following a run in the terminal
//!
//! Log lines scroll above a progress bar. The first Ctrl-C asks the backend
//! to stop the run; a second one, or a stop that is never confirmed, closes
//! the monitor and returns.

use anyhow::Result;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::Instant;
use tracing::debug;

use runwatch_common::{LogClass, LogEntry, SessionId, SessionSnapshot};
use runwatch_monitor::{MonitorEvent, MonitorState, RunMonitor};

use super::status::{print_outcome, RunSummary};
use super::Context;
use crate::output::{print_error, print_warning, OutputFormat};

/// Follow the monitor until the run finishes or the user gives up.
/// Returns the process exit code.
pub async fn follow(mut monitor: RunMonitor, ctx: &Context) -> Result<i32> {
    let format = ctx.format;
    let Some(session) = monitor.session().cloned() else {
        return Ok(2);
    };

    let mut events = monitor.subscribe();
    let bar = progress_bar(format);

    // Lines appended before we subscribed
    let mut last_sequence = None;
    for entry in monitor.logs() {
        last_sequence = Some(entry.sequence_no);
        print_log(&bar, &entry, format);
    }
    update_bar(&bar, &monitor.snapshot());

    let mut interrupts = 0u32;
    let mut finish_deadline: Option<Instant> = None;

    // The run may have finished before we subscribed
    match monitor.state() {
        MonitorState::Closed => return finish(monitor, session, bar, format),
        state if state.is_finished() => {
            finish_deadline = Some(Instant::now() + ctx.config.monitor.drain_grace());
        }
        _ => {}
    }

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                interrupts += 1;
                if interrupts == 1 && monitor.state().is_active() {
                    bar.suspend(|| print_warning("Stopping run, press Ctrl-C again to detach"));
                    match monitor.request_stop().await {
                        Ok(Some(ack)) if !ack.accepted => {
                            bar.suspend(|| print_warning(&format!("Stop not accepted: {}", ack.message)));
                        }
                        Ok(_) => {}
                        Err(e) => bar.suspend(|| print_error(&format!("Stop request failed: {}", e))),
                    }
                } else {
                    monitor.close();
                    break;
                }
            }
            event = events.recv() => match event {
                Ok(MonitorEvent::LogAppended(entry)) => {
                    if last_sequence.map_or(true, |seen| entry.sequence_no > seen) {
                        last_sequence = Some(entry.sequence_no);
                        print_log(&bar, &entry, format);
                    }
                }
                Ok(MonitorEvent::SnapshotChanged(snapshot)) => update_bar(&bar, &snapshot),
                Ok(MonitorEvent::StateChanged(MonitorState::Closed)) => break,
                Ok(MonitorEvent::StateChanged(state)) if state.is_finished() => {
                    // Keep printing trailing log lines while the push channel drains
                    finish_deadline.get_or_insert(Instant::now() + ctx.config.monitor.drain_grace());
                }
                Ok(MonitorEvent::StateChanged(_)) | Ok(MonitorEvent::Stalled { .. }) => {}
                Ok(MonitorEvent::StopUnacknowledged { waited }) => {
                    bar.suspend(|| print_warning(&format!(
                        "Backend did not confirm the stop within {}s, detaching",
                        waited.as_secs()
                    )));
                    monitor.close();
                    break;
                }
                Err(RecvError::Lagged(skipped)) => {
                    debug!("skipped {} monitor events", skipped);
                }
                Err(RecvError::Closed) => break,
            },
            _ = wait_until(finish_deadline) => break,
        }
    }

    finish(monitor, session, bar, format)
}

/// Close the monitor, print the outcome and pick the exit code
fn finish(
    mut monitor: RunMonitor,
    session: SessionId,
    bar: ProgressBar,
    format: OutputFormat,
) -> Result<i32> {
    let state = monitor.state();
    let snapshot = monitor.snapshot();
    monitor.close();
    bar.finish_and_clear();

    let label = match state {
        MonitorState::Closed => "detached".to_string(),
        other => other.to_string(),
    };
    if format.is_interactive() {
        println!();
    }
    print_outcome(&RunSummary::new(&session, label, &snapshot), &snapshot, format);

    Ok(exit_code(state, &snapshot))
}

/// 0 for a clean pass, 1 for a failed run or failed tests, 2 otherwise
pub fn exit_code(state: MonitorState, snapshot: &SessionSnapshot) -> i32 {
    match state {
        MonitorState::Completed if snapshot.failed_count == 0 => 0,
        MonitorState::Completed | MonitorState::Failed => 1,
        _ => 2,
    }
}

fn progress_bar(format: OutputFormat) -> ProgressBar {
    if !format.is_interactive() {
        return ProgressBar::hidden();
    }

    let style = ProgressStyle::with_template(
        "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos:>3}% {msg}",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar())
    .progress_chars("#>-");

    let bar = ProgressBar::new(100);
    bar.set_style(style);
    bar.enable_steady_tick(Duration::from_millis(120));
    bar
}

fn update_bar(bar: &ProgressBar, snapshot: &SessionSnapshot) {
    bar.set_position(u64::from(snapshot.progress_percent));
    let mut message = format!(
        "{} | {} passed, {} failed",
        snapshot.phase, snapshot.passed_count, snapshot.failed_count
    );
    if let Some(test) = &snapshot.current_test_name {
        message.push_str(&format!(" | {}", test));
    }
    bar.set_message(message);
}

fn print_log(bar: &ProgressBar, entry: &LogEntry, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            if let Ok(line) = serde_json::to_string(entry) {
                println!("{}", line);
            }
        }
        OutputFormat::Plain => println!("{}", entry.text),
        OutputFormat::Table => {
            let time = entry.received_at.with_timezone(&chrono::Local).format("%H:%M:%S");
            let text = match entry.class {
                LogClass::Error => entry.text.red(),
                LogClass::Pass => entry.text.green(),
                LogClass::Phase => entry.text.cyan().bold(),
                LogClass::Info => entry.text.normal(),
            };
            bar.suspend(|| println!("{} {}", time.to_string().dimmed(), text));
        }
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use futures::StreamExt;
    use runwatch_common::{Phase, StartRunRequest, StopAck};
    use runwatch_monitor::{
        ClientConfig, EventSource, EventStream, MonitorConfig, Result as MonitorResult,
        RunBackend, RunStatus,
    };
    use std::path::PathBuf;
    use std::sync::Arc;

    struct FinishedBackend;

    #[async_trait]
    impl RunBackend for FinishedBackend {
        async fn start_run(&self, _request: &StartRunRequest) -> MonitorResult<SessionId> {
            Ok(SessionId::from("S1"))
        }

        async fn run_status(&self, _session: &SessionId) -> MonitorResult<RunStatus> {
            Ok(RunStatus::Found(SessionSnapshot {
                phase: Phase::Completed,
                progress_percent: 100,
                passed_count: 3,
                ..Default::default()
            }))
        }

        async fn stop_run(&self, _session: &SessionId) -> MonitorResult<StopAck> {
            Ok(StopAck {
                accepted: false,
                message: "run already finished".to_string(),
            })
        }
    }

    struct SilentSource;

    #[async_trait]
    impl EventSource for SilentSource {
        async fn subscribe(&self) -> MonitorResult<EventStream> {
            Ok(futures::stream::pending().boxed())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_follow_returns_for_run_finished_before_subscribing() {
        let mut monitor = RunMonitor::new(
            MonitorConfig::default(),
            Arc::new(FinishedBackend),
            Arc::new(SilentSource),
        );
        monitor.attach(SessionId::from("S1")).unwrap();
        assert_eq!(monitor.wait_finished().await, MonitorState::Completed);

        let ctx = Context {
            config: ClientConfig::default(),
            config_path: PathBuf::from("runwatch.toml"),
            format: OutputFormat::Plain,
        };
        let code = tokio::time::timeout(Duration::from_secs(30), follow(monitor, &ctx))
            .await
            .expect("follow kept waiting for a finished run")
            .unwrap();
        assert_eq!(code, 0);
    }

    #[test]
    fn test_exit_codes() {
        let clean = SessionSnapshot {
            passed_count: 10,
            ..Default::default()
        };
        let with_failures = SessionSnapshot {
            passed_count: 8,
            failed_count: 2,
            ..Default::default()
        };

        assert_eq!(exit_code(MonitorState::Completed, &clean), 0);
        assert_eq!(exit_code(MonitorState::Completed, &with_failures), 1);
        assert_eq!(exit_code(MonitorState::Failed, &clean), 1);
        assert_eq!(exit_code(MonitorState::Stopped, &clean), 2);
        assert_eq!(exit_code(MonitorState::Closed, &with_failures), 2);
    }
}
