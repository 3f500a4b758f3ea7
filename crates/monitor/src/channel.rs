//! Messages flowing from the producer tasks into the merge loop

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use runwatch_common::{LogClass, SessionSnapshot, StatusPatch};

/// Input to the merge loop, applied strictly in arrival order
#[derive(Debug, Clone)]
pub enum Update {
    /// Full status from the poller
    Snapshot(SessionSnapshot),
    /// The poller got "not found" and stopped itself
    SessionGone,
    /// A push event for this session
    Push(PushUpdate),
    /// The event stream (re)connected
    PushConnected,
    /// The caller's stop request was accepted by the backend
    StopRequested,
}

/// A push event reduced to its log line and optional patch
#[derive(Debug, Clone, PartialEq)]
pub struct PushUpdate {
    pub line: String,
    pub class: LogClass,
    pub patch: Option<StatusPatch>,
}

/// Handle to a running producer task
#[derive(Debug)]
pub struct ChannelHandle {
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl ChannelHandle {
    pub(crate) fn new(token: CancellationToken, task: JoinHandle<()>) -> Self {
        Self { token, task }
    }

    /// Ask the task to stop. Safe to call repeatedly or after the task
    /// already ended on its own.
    pub fn stop(&self) {
        self.token.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.token.is_cancelled() || self.task.is_finished()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}
