//! In-memory backend and event source for unit tests

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;

use runwatch_common::{SessionId, StartRunRequest, StopAck};

use crate::backend::{RunBackend, RunStatus};
use crate::error::{MonitorError, Result};
use crate::events::{EventSource, EventStream};

enum Scripted {
    Status(RunStatus),
    Error(String),
}

/// Backend answering status calls from a script
pub(crate) struct ScriptedBackend {
    script: Mutex<VecDeque<Scripted>>,
    last: Mutex<Option<RunStatus>>,
    start_result: Mutex<std::result::Result<SessionId, (u16, String)>>,
    stop_ack: Mutex<StopAck>,
    status_delay: Mutex<Duration>,
    start_delay: Mutex<Duration>,
    start_calls: AtomicUsize,
    status_calls: AtomicUsize,
    stop_calls: AtomicUsize,
}

impl ScriptedBackend {
    pub(crate) fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            last: Mutex::new(None),
            start_result: Mutex::new(Ok(SessionId::from("S1"))),
            stop_ack: Mutex::new(StopAck {
                accepted: true,
                message: "stopping".to_string(),
            }),
            status_delay: Mutex::new(Duration::ZERO),
            start_delay: Mutex::new(Duration::ZERO),
            start_calls: AtomicUsize::new(0),
            status_calls: AtomicUsize::new(0),
            stop_calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn push_status(&self, status: RunStatus) {
        self.script.lock().push_back(Scripted::Status(status));
    }

    pub(crate) fn push_error(&self, message: &str) {
        self.script.lock().push_back(Scripted::Error(message.to_string()));
    }

    pub(crate) fn set_status_delay(&self, delay: Duration) {
        *self.status_delay.lock() = delay;
    }

    pub(crate) fn set_start_delay(&self, delay: Duration) {
        *self.start_delay.lock() = delay;
    }

    pub(crate) fn reject_start(&self, status: u16, message: &str) {
        *self.start_result.lock() = Err((status, message.to_string()));
    }

    pub(crate) fn set_stop_ack(&self, ack: StopAck) {
        *self.stop_ack.lock() = ack;
    }

    pub(crate) fn start_calls(&self) -> usize {
        self.start_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn stop_calls(&self) -> usize {
        self.stop_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RunBackend for ScriptedBackend {
    async fn start_run(&self, _request: &StartRunRequest) -> Result<SessionId> {
        self.start_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.start_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        match &*self.start_result.lock() {
            Ok(session) => Ok(session.clone()),
            Err((status, message)) => Err(MonitorError::StartRejected {
                status: *status,
                message: message.clone(),
            }),
        }
    }

    async fn run_status(&self, _session: &SessionId) -> Result<RunStatus> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.status_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let next = self.script.lock().pop_front();
        match next {
            Some(Scripted::Status(status)) => {
                *self.last.lock() = Some(status.clone());
                Ok(status)
            }
            Some(Scripted::Error(message)) => Err(MonitorError::Io(io::Error::new(
                io::ErrorKind::ConnectionReset,
                message,
            ))),
            None => Ok(self.last.lock().clone().unwrap_or(RunStatus::NotFound)),
        }
    }

    async fn stop_run(&self, _session: &SessionId) -> Result<StopAck> {
        self.stop_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.stop_ack.lock().clone())
    }
}

/// Event source whose subscriptions are fed by test-held senders
pub(crate) struct ChannelSource {
    pending: Mutex<VecDeque<mpsc::UnboundedReceiver<Result<String>>>>,
    subscribe_calls: AtomicUsize,
}

impl ChannelSource {
    pub(crate) fn new() -> Self {
        Self {
            pending: Mutex::new(VecDeque::new()),
            subscribe_calls: AtomicUsize::new(0),
        }
    }

    /// Prepare the stream handed out by the next subscription
    pub(crate) fn next_stream(&self) -> mpsc::UnboundedSender<Result<String>> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.pending.lock().push_back(rx);
        tx
    }

    pub(crate) fn subscribe_calls(&self) -> usize {
        self.subscribe_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EventSource for ChannelSource {
    async fn subscribe(&self) -> Result<EventStream> {
        self.subscribe_calls.fetch_add(1, Ordering::SeqCst);
        let next = self.pending.lock().pop_front();
        match next {
            Some(rx) => Ok(stream::unfold(rx, |mut rx| async move {
                rx.recv().await.map(|frame| (frame, rx))
            })
            .boxed()),
            None => Err(MonitorError::Io(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                "no event stream available",
            ))),
        }
    }
}

/// JSON frame for a push event
pub(crate) fn frame(value: serde_json::Value) -> Result<String> {
    Ok(value.to_string())
}
