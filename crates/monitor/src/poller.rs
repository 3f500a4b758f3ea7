//! Status poller
//!
//! Fetches the full run status right away and then once per interval. The
//! poller is the source of truth for the run: each successful answer is
//! forwarded as a complete snapshot. It ends itself when the run reaches a
//! terminal phase or the backend no longer knows the session; transport
//! errors are logged and retried on the next tick.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use runwatch_common::SessionId;

use crate::backend::{RunBackend, RunStatus};
use crate::channel::{ChannelHandle, Update};

const MIN_INTERVAL: Duration = Duration::from_millis(10);

pub struct PullPoller {
    backend: Arc<dyn RunBackend>,
    session: SessionId,
    interval: Duration,
}

impl PullPoller {
    pub fn new(backend: Arc<dyn RunBackend>, session: SessionId, interval: Duration) -> Self {
        Self {
            backend,
            session,
            interval: interval.max(MIN_INTERVAL),
        }
    }

    /// Spawn the poll loop
    pub fn start(self, updates: mpsc::Sender<Update>, token: CancellationToken) -> ChannelHandle {
        let task = tokio::spawn(self.run(updates, token.clone()));
        ChannelHandle::new(token, task)
    }

    async fn run(self, updates: mpsc::Sender<Update>, token: CancellationToken) {
        debug!(session = %self.session, interval = ?self.interval, "status poller started");

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                _ = ticker.tick() => {}
            }

            // A response that lands after cancellation is dropped unseen.
            let status = tokio::select! {
                biased;
                _ = token.cancelled() => break,
                status = self.backend.run_status(&self.session) => status,
            };

            match status {
                Ok(RunStatus::Found(snapshot)) => {
                    let phase = snapshot.phase;
                    if updates.send(Update::Snapshot(snapshot)).await.is_err() {
                        break;
                    }
                    if phase.is_terminal() {
                        info!(session = %self.session, %phase, "run finished, polling stopped");
                        break;
                    }
                }
                Ok(RunStatus::NotFound) => {
                    warn!(session = %self.session, "run not found, polling stopped");
                    let _ = updates.send(Update::SessionGone).await;
                    break;
                }
                Err(e) => {
                    warn!(session = %self.session, "status poll failed: {}", e);
                }
            }
        }

        debug!(session = %self.session, "status poller exited");
    }
}
