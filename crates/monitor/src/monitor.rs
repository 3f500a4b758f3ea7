//! Run monitor
//!
//! Owns one run session. Starting (or attaching) spawns three tasks:
//!
//! ```text
//!   PullPoller ──┐
//!                ├── mpsc ──► MergeLoop ──► watch<MonitorView>
//!   PushListener ┘                      └─► broadcast<MonitorEvent>
//! ```
//!
//! The merge loop is the only writer of the snapshot and the log buffer and
//! applies updates one at a time, in arrival order. Callers read published
//! copies through [`RunMonitor::view`] or the event broadcast.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use runwatch_common::{
    LogBuffer, LogClass, LogEntry, Phase, SessionId, SessionSnapshot, StartRunRequest, StopAck,
};

use crate::backend::RunBackend;
use crate::channel::{ChannelHandle, Update};
use crate::config::MonitorConfig;
use crate::error::{MonitorError, Result};
use crate::events::EventSource;
use crate::listener::PushListener;
use crate::merge::{MergeOutcome, MergeState};
use crate::poller::PullPoller;

const UPDATE_QUEUE: usize = 64;

/// Lifecycle of a monitor
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MonitorState {
    #[default]
    Idle,
    Starting,
    Active(Phase),
    Completed,
    Failed,
    Stopped,
    /// Torn down by the caller
    Closed,
}

impl MonitorState {
    fn from_phase(phase: Phase) -> Self {
        match phase {
            Phase::Completed => MonitorState::Completed,
            Phase::Failed => MonitorState::Failed,
            Phase::Stopped => MonitorState::Stopped,
            other => MonitorState::Active(other),
        }
    }

    pub fn is_active(self) -> bool {
        matches!(self, MonitorState::Active(_))
    }

    /// Terminal run outcome or closed
    pub fn is_finished(self) -> bool {
        matches!(
            self,
            MonitorState::Completed
                | MonitorState::Failed
                | MonitorState::Stopped
                | MonitorState::Closed
        )
    }
}

impl fmt::Display for MonitorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MonitorState::Idle => write!(f, "idle"),
            MonitorState::Starting => write!(f, "starting"),
            MonitorState::Active(phase) => write!(f, "{}", phase),
            MonitorState::Completed => write!(f, "completed"),
            MonitorState::Failed => write!(f, "failed"),
            MonitorState::Stopped => write!(f, "stopped"),
            MonitorState::Closed => write!(f, "closed"),
        }
    }
}

/// Published copy of the monitor's state
#[derive(Debug, Clone, Default)]
pub struct MonitorView {
    pub state: MonitorState,
    pub session: Option<SessionId>,
    pub snapshot: SessionSnapshot,
    pub logs: Vec<LogEntry>,
    /// A stop request was accepted and no terminal phase has arrived yet
    pub stopping: bool,
    /// Both channels went quiet after the backend lost the session
    pub stalled: bool,
}

/// Notifications for callers that render incrementally
#[derive(Debug, Clone)]
pub enum MonitorEvent {
    StateChanged(MonitorState),
    SnapshotChanged(SessionSnapshot),
    LogAppended(LogEntry),
    Stalled { silence: Duration },
    StopUnacknowledged { waited: Duration },
}

/// Tracks one server-side run from start to outcome
pub struct RunMonitor {
    config: MonitorConfig,
    backend: Arc<dyn RunBackend>,
    source: Arc<dyn EventSource>,
    session: Option<SessionId>,
    view_tx: Arc<watch::Sender<MonitorView>>,
    view_rx: watch::Receiver<MonitorView>,
    events: broadcast::Sender<MonitorEvent>,
    shutdown: CancellationToken,
    inputs: Option<mpsc::Sender<Update>>,
    closed: bool,
}

impl RunMonitor {
    pub fn new(
        config: MonitorConfig,
        backend: Arc<dyn RunBackend>,
        source: Arc<dyn EventSource>,
    ) -> Self {
        let (view_tx, view_rx) = watch::channel(MonitorView::default());
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        Self {
            config,
            backend,
            source,
            session: None,
            view_tx: Arc::new(view_tx),
            view_rx,
            events,
            shutdown: CancellationToken::new(),
            inputs: None,
            closed: false,
        }
    }

    pub fn state(&self) -> MonitorState {
        self.view_rx.borrow().state
    }

    pub fn session(&self) -> Option<&SessionId> {
        self.session.as_ref()
    }

    /// Receiver of the published view
    pub fn view(&self) -> watch::Receiver<MonitorView> {
        self.view_rx.clone()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.view_rx.borrow().snapshot.clone()
    }

    pub fn logs(&self) -> Vec<LogEntry> {
        self.view_rx.borrow().logs.clone()
    }

    /// Subscribe to incremental notifications
    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.events.subscribe()
    }

    /// Start a run on the backend and begin monitoring it.
    ///
    /// When the start call fails, or the returned future is dropped before
    /// it resolves, no channel is opened and the monitor goes back to `Idle`.
    pub async fn start(&mut self, request: &StartRunRequest) -> Result<SessionId> {
        self.ensure_idle()?;
        self.set_state(MonitorState::Starting);
        let reset = StartingReset {
            view: self.view_tx.clone(),
            events: self.events.clone(),
            armed: true,
        };

        match self.backend.start_run(request).await {
            Ok(session) => {
                reset.disarm();
                info!(session = %session, target = %request.target, "run started");
                self.launch(session.clone(), format!("Run started for {}", request.target));
                Ok(session)
            }
            Err(e) => {
                error!(target = %request.target, "failed to start run: {}", e);
                drop(reset);
                Err(e)
            }
        }
    }

    /// Monitor a run that was started elsewhere
    pub fn attach(&mut self, session: SessionId) -> Result<()> {
        self.ensure_idle()?;
        info!(session = %session, "attaching to run");
        self.launch(session.clone(), format!("Attached to run {}", session));
        Ok(())
    }

    /// Ask the backend to stop the run.
    ///
    /// Does not change the local phase; the outcome still arrives through
    /// the channels. Returns `Ok(None)` without contacting the backend when
    /// the monitor is not active.
    pub async fn request_stop(&self) -> Result<Option<StopAck>> {
        let Some(session) = self.session.as_ref() else {
            return Ok(None);
        };
        if !self.state().is_active() {
            debug!(session = %session, "stop requested while not active, ignoring");
            return Ok(None);
        }

        let ack = self.backend.stop_run(session).await?;
        if ack.accepted {
            info!(session = %session, "stop request accepted: {}", ack.message);
            if let Some(inputs) = &self.inputs {
                let _ = inputs.send(Update::StopRequested).await;
            }
        } else {
            warn!(session = %session, "stop request rejected: {}", ack.message);
        }
        Ok(Some(ack))
    }

    /// Tear the monitor down. Stops both channels and drops the session;
    /// safe from any state, any number of times.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.shutdown.cancel();
        self.inputs = None;

        let session = self.session.take();
        self.view_tx.send_modify(|view| {
            view.state = MonitorState::Closed;
            view.session = None;
            view.stopping = false;
        });
        let _ = self.events.send(MonitorEvent::StateChanged(MonitorState::Closed));

        match session {
            Some(session) => info!(session = %session, "monitor closed"),
            None => debug!("monitor closed"),
        }
    }

    /// Wait until the run reaches a terminal phase or the monitor is closed.
    ///
    /// Never resolves for a monitor that is never started.
    pub async fn wait_finished(&self) -> MonitorState {
        let mut rx = self.view_rx.clone();
        loop {
            let state = rx.borrow_and_update().state;
            if state.is_finished() {
                return state;
            }
            if rx.changed().await.is_err() {
                return rx.borrow().state;
            }
        }
    }

    fn ensure_idle(&self) -> Result<()> {
        match self.state() {
            MonitorState::Idle => Ok(()),
            MonitorState::Closed => Err(MonitorError::Closed),
            _ => Err(MonitorError::AlreadyStarted),
        }
    }

    fn set_state(&self, state: MonitorState) {
        self.view_tx.send_modify(|view| view.state = state);
        let _ = self.events.send(MonitorEvent::StateChanged(state));
    }

    fn launch(&mut self, session: SessionId, opening: String) {
        let (tx, rx) = mpsc::channel(UPDATE_QUEUE);

        self.view_tx.send_modify(|view| {
            view.session = Some(session.clone());
            view.state = MonitorState::Active(Phase::Initializing);
        });
        let _ = self.events.send(MonitorEvent::StateChanged(MonitorState::Active(
            Phase::Initializing,
        )));

        let poller = PullPoller::new(
            self.backend.clone(),
            session.clone(),
            self.config.poll_interval(),
        )
        .start(tx.clone(), self.shutdown.child_token());

        let listener = PushListener::new(
            self.source.clone(),
            session.clone(),
            self.config.reconnect_delay(),
        )
        .start(tx.clone(), self.shutdown.child_token());

        let merge_loop = MergeLoop {
            logs: LogBuffer::with_line_limit(self.config.log_capacity, self.config.max_line_bytes),
            config: self.config.clone(),
            session: session.clone(),
            inputs: rx,
            poller,
            listener,
            merge: MergeState::new(),
            view: self.view_tx.clone(),
            events: self.events.clone(),
            shutdown: self.shutdown.clone(),
            drain_deadline: None,
            stop_deadline: None,
            session_gone: false,
            last_push: Instant::now(),
            stalled: false,
        };
        tokio::spawn(merge_loop.run(opening));

        self.session = Some(session);
        self.inputs = Some(tx);
    }
}

impl Drop for RunMonitor {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Returns a monitor stuck in `Starting` to `Idle` when dropped armed
struct StartingReset {
    view: Arc<watch::Sender<MonitorView>>,
    events: broadcast::Sender<MonitorEvent>,
    armed: bool,
}

impl StartingReset {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for StartingReset {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let reset = self.view.send_if_modified(|view| {
            if view.state != MonitorState::Starting {
                return false;
            }
            view.state = MonitorState::Idle;
            true
        });
        if reset {
            let _ = self.events.send(MonitorEvent::StateChanged(MonitorState::Idle));
        }
    }
}

/// Single consumer applying channel updates to the held state
struct MergeLoop {
    config: MonitorConfig,
    session: SessionId,
    inputs: mpsc::Receiver<Update>,
    poller: ChannelHandle,
    listener: ChannelHandle,
    merge: MergeState,
    logs: LogBuffer,
    view: Arc<watch::Sender<MonitorView>>,
    events: broadcast::Sender<MonitorEvent>,
    shutdown: CancellationToken,
    drain_deadline: Option<Instant>,
    stop_deadline: Option<Instant>,
    session_gone: bool,
    last_push: Instant,
    stalled: bool,
}

impl MergeLoop {
    async fn run(mut self, opening: String) {
        self.append_log(opening, LogClass::Phase);

        loop {
            let stall_deadline = self.stall_deadline();

            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                input = self.inputs.recv() => match input {
                    Some(update) => self.handle(update),
                    None => break,
                },
                _ = wait_until(self.drain_deadline) => {
                    self.finish_drain();
                    break;
                }
                _ = wait_until(self.stop_deadline) => self.stop_unacknowledged(),
                _ = wait_until(stall_deadline) => self.report_stall(),
            }
        }

        self.poller.stop();
        self.listener.stop();
        debug!(session = %self.session, "merge loop exited");
    }

    fn handle(&mut self, update: Update) {
        match update {
            Update::Snapshot(snapshot) => {
                let outcome = self.merge.apply_snapshot(snapshot);
                self.after_merge(outcome);
            }
            Update::Push(push) => {
                self.touch_push();
                self.append_log(push.line, push.class);
                if let Some(patch) = push.patch {
                    let outcome = self.merge.apply_patch(&patch);
                    self.after_merge(outcome);
                }
            }
            Update::PushConnected => {
                debug!(session = %self.session, "push channel connected");
                self.touch_push();
            }
            Update::SessionGone => {
                if self.merge.terminal().is_none() {
                    warn!(session = %self.session, "backend lost the run before it finished");
                    self.session_gone = true;
                    self.append_log("Run status unavailable: session not found", LogClass::Error);
                }
            }
            Update::StopRequested => {
                if self.merge.terminal().is_none() && self.stop_deadline.is_none() {
                    self.stop_deadline = Some(Instant::now() + self.config.stop_timeout());
                    self.publish(|view| view.stopping = true);
                    self.append_log("Stop requested", LogClass::Phase);
                }
            }
        }
    }

    fn after_merge(&mut self, outcome: MergeOutcome) {
        if outcome.changed {
            let snapshot = self.merge.snapshot().clone();
            let state = MonitorState::from_phase(snapshot.phase);
            let previous = self.view.borrow().state;

            let published = self.publish(|view| {
                view.snapshot = snapshot.clone();
                view.state = state;
            });
            if published {
                let _ = self.events.send(MonitorEvent::SnapshotChanged(snapshot));
                if previous != state {
                    let _ = self.events.send(MonitorEvent::StateChanged(state));
                }
            }
        }

        if let Some(phase) = outcome.entered_terminal {
            info!(session = %self.session, %phase, "run reached terminal phase");
            self.poller.stop();
            self.stop_deadline = None;
            self.stalled = false;
            self.publish(|view| {
                view.stopping = false;
                view.stalled = false;
            });
            self.append_log(format!("Run {}", phase), LogClass::Phase);
            self.drain_deadline = Some(Instant::now() + self.config.drain_grace());
        }
    }

    /// Grace period after the terminal phase is over: stop listening and
    /// apply whatever is still queued.
    fn finish_drain(&mut self) {
        debug!(session = %self.session, "drain period over, closing push channel");
        self.listener.stop();
        self.poller.stop();
        while let Ok(update) = self.inputs.try_recv() {
            self.handle(update);
        }
    }

    fn stop_unacknowledged(&mut self) {
        self.stop_deadline = None;
        let waited = self.config.stop_timeout();
        warn!(session = %self.session, "no terminal phase {:?} after stop request", waited);
        self.append_log(
            format!("Stop not confirmed after {}s", waited.as_secs()),
            LogClass::Error,
        );
        let _ = self.events.send(MonitorEvent::StopUnacknowledged { waited });
    }

    fn stall_deadline(&self) -> Option<Instant> {
        if self.session_gone && !self.stalled && self.merge.terminal().is_none() {
            Some(self.last_push + self.config.silence_threshold())
        } else {
            None
        }
    }

    fn report_stall(&mut self) {
        let silence = self.last_push.elapsed();
        self.stalled = true;
        warn!(session = %self.session, ?silence, "run appears stalled");
        self.publish(|view| view.stalled = true);
        self.append_log(
            format!("No updates for {}s, the run may have stalled", silence.as_secs()),
            LogClass::Error,
        );
        let _ = self.events.send(MonitorEvent::Stalled { silence });
    }

    fn touch_push(&mut self) {
        self.last_push = Instant::now();
        if self.stalled {
            self.stalled = false;
            self.publish(|view| view.stalled = false);
        }
    }

    fn append_log(&mut self, text: impl Into<String>, class: LogClass) {
        let entry = self.logs.record(text, class);
        let logs = self.logs.to_vec();
        if self.publish(|view| view.logs = logs) {
            let _ = self.events.send(MonitorEvent::LogAppended(entry));
        }
    }

    /// Apply a change to the published view unless the monitor was closed
    fn publish(&self, update: impl FnOnce(&mut MonitorView)) -> bool {
        self.view.send_if_modified(|view| {
            if view.state == MonitorState::Closed {
                return false;
            }
            update(view);
            true
        })
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
