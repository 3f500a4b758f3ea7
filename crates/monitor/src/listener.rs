//! Push listener
//!
//! Subscribes to the multiplexed event stream, keeps only events for its
//! own session and turns them into log lines plus optional status patches.
//! A dropped or failed stream is resubscribed after a delay; the poller
//! covers the gap.

use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use runwatch_common::{LogClass, SessionId};

use crate::channel::{ChannelHandle, PushUpdate, Update};
use crate::events::{EventSource, PushEvent};

pub struct PushListener {
    source: Arc<dyn EventSource>,
    session: SessionId,
    reconnect_delay: Duration,
}

impl PushListener {
    pub fn new(source: Arc<dyn EventSource>, session: SessionId, reconnect_delay: Duration) -> Self {
        Self {
            source,
            session,
            reconnect_delay,
        }
    }

    /// Spawn the subscription loop
    pub fn start(self, updates: mpsc::Sender<Update>, token: CancellationToken) -> ChannelHandle {
        let task = tokio::spawn(self.run(updates, token.clone()));
        ChannelHandle::new(token, task)
    }

    async fn run(self, updates: mpsc::Sender<Update>, token: CancellationToken) {
        debug!(session = %self.session, "push listener started");

        'subscribe: loop {
            let subscribed = tokio::select! {
                biased;
                _ = token.cancelled() => break 'subscribe,
                subscribed = self.source.subscribe() => subscribed,
            };

            match subscribed {
                Ok(mut stream) => {
                    if updates.send(Update::PushConnected).await.is_err() {
                        break 'subscribe;
                    }

                    loop {
                        let frame = tokio::select! {
                            biased;
                            _ = token.cancelled() => break 'subscribe,
                            frame = stream.next() => frame,
                        };

                        match frame {
                            Some(Ok(text)) => {
                                if let Some(update) = self.translate(&text) {
                                    if updates.send(Update::Push(update)).await.is_err() {
                                        break 'subscribe;
                                    }
                                }
                            }
                            Some(Err(e)) => {
                                warn!(session = %self.session, "event stream error: {}", e);
                                break;
                            }
                            None => {
                                debug!(session = %self.session, "event stream ended");
                                break;
                            }
                        }
                    }
                }
                Err(e) => {
                    warn!(session = %self.session, "event stream subscription failed: {}", e);
                }
            }

            tokio::select! {
                biased;
                _ = token.cancelled() => break 'subscribe,
                _ = tokio::time::sleep(self.reconnect_delay) => {}
            }
        }

        debug!(session = %self.session, "push listener exited");
    }

    /// Reduce a raw frame to an update for this session, if it is one
    fn translate(&self, text: &str) -> Option<PushUpdate> {
        let event: PushEvent = match serde_json::from_str(text) {
            Ok(event) => event,
            Err(e) => {
                debug!("Dropping unparseable event frame: {}", e);
                return None;
            }
        };

        if event.session_id != self.session {
            trace!(other = %event.session_id, "ignoring event for another session");
            return None;
        }

        let patch = event.patch();
        let line = match event.text {
            Some(text) if !text.trim().is_empty() => text,
            _ if !patch.is_empty() => patch.describe(),
            _ => return None,
        };
        let class = if patch.phase.is_some() {
            LogClass::Phase
        } else {
            LogClass::classify(&line)
        };

        Some(PushUpdate {
            line,
            class,
            patch: (!patch.is_empty()).then_some(patch),
        })
    }
}
