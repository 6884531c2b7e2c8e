//! In-memory push sockets and status sources for driving the engine under
//! paused tokio time.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

use tasksync_core::{Notification, TaskId, TaskSnapshot, TaskStatus};
use tasksync_engine::{
    ApiError, ApiFailureKind, Inbound, PushConnector, PushSocket, StatusSource, TransportError,
    HEARTBEAT_FRAME,
};
use tokio::sync::mpsc;

pub fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(tasksync_logging::initialize_for_tests);
}

/// Server side of one accepted fake socket.
#[derive(Clone)]
pub struct FakeServer {
    inbound: mpsc::UnboundedSender<Inbound>,
    sent: Arc<Mutex<Vec<String>>>,
    closed: Arc<Mutex<Option<(u16, String)>>>,
}

impl FakeServer {
    pub fn push(&self, frame: &str) {
        let _ = self.inbound.send(Inbound::Text(frame.to_string()));
    }

    pub fn close(&self, code: u16, reason: &str) {
        let _ = self.inbound.send(Inbound::Closed {
            code,
            reason: reason.to_string(),
        });
    }

    pub fn fail(&self, cause: &str) {
        let _ = self.inbound.send(Inbound::Error(cause.to_string()));
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }

    pub fn pings(&self) -> usize {
        self.sent()
            .iter()
            .filter(|frame| frame.as_str() == HEARTBEAT_FRAME)
            .count()
    }

    /// Close code and reason the client sent, if it closed.
    pub fn closed_by_client(&self) -> Option<(u16, String)> {
        self.closed.lock().unwrap().clone()
    }
}

struct FakeSocket {
    inbound: mpsc::UnboundedReceiver<Inbound>,
    sent: Arc<Mutex<Vec<String>>>,
    closed: Arc<Mutex<Option<(u16, String)>>>,
}

#[async_trait::async_trait]
impl PushSocket for FakeSocket {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        self.sent.lock().unwrap().push(text);
        Ok(())
    }

    async fn recv(&mut self) -> Option<Inbound> {
        self.inbound.recv().await
    }

    async fn close(&mut self, code: u16, reason: &str) -> Result<(), TransportError> {
        *self.closed.lock().unwrap() = Some((code, reason.to_string()));
        Ok(())
    }
}

/// Hands out queued sockets in order; refuses once the queue is empty.
#[derive(Default)]
pub struct FakeConnector {
    queue: Mutex<VecDeque<FakeSocket>>,
    connects: AtomicUsize,
    delay: Option<Duration>,
}

impl FakeConnector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_delay(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay: Some(delay),
            ..Self::default()
        })
    }

    /// Queues a socket for the next successful connect.
    pub fn accept(&self) -> FakeServer {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let sent = Arc::new(Mutex::new(Vec::new()));
        let closed = Arc::new(Mutex::new(None));
        self.queue.lock().unwrap().push_back(FakeSocket {
            inbound: inbound_rx,
            sent: Arc::clone(&sent),
            closed: Arc::clone(&closed),
        });
        FakeServer {
            inbound: inbound_tx,
            sent,
            closed,
        }
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl PushConnector for FakeConnector {
    async fn connect(&self, _task_id: &TaskId) -> Result<Box<dyn PushSocket>, TransportError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let next = self.queue.lock().unwrap().pop_front();
        match next {
            Some(socket) => Ok(Box::new(socket)),
            None => Err(TransportError::Connect("connection refused".to_string())),
        }
    }
}

/// Status source answering every request with the current canned reply.
pub struct FakeStatus {
    reply: Mutex<Result<TaskSnapshot, ApiError>>,
    calls: AtomicUsize,
}

impl FakeStatus {
    pub fn new(reply: TaskSnapshot) -> Arc<Self> {
        Arc::new(Self {
            reply: Mutex::new(Ok(reply)),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn running() -> Arc<Self> {
        Self::new(TaskSnapshot::with_status(TaskStatus::Running))
    }

    pub fn set(&self, reply: TaskSnapshot) {
        *self.reply.lock().unwrap() = Ok(reply);
    }

    pub fn fail_with(&self, status: u16) {
        *self.reply.lock().unwrap() = Err(ApiError {
            kind: ApiFailureKind::HttpStatus(status),
            message: format!("status {status}"),
        });
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl StatusSource for FakeStatus {
    async fn task_status(&self, _task_id: &TaskId) -> Result<TaskSnapshot, ApiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.reply.lock().unwrap().clone()
    }
}

/// Reads notifications until one matches, returning it.
pub async fn wait_for(
    rx: &mut mpsc::UnboundedReceiver<Notification>,
    pred: impl Fn(&Notification) -> bool,
) -> Notification {
    loop {
        let notification = rx.recv().await.expect("subscriber channel closed");
        if pred(&notification) {
            return notification;
        }
    }
}

pub fn drain(rx: &mut mpsc::UnboundedReceiver<Notification>) -> Vec<Notification> {
    let mut out = Vec::new();
    while let Ok(notification) = rx.try_recv() {
        out.push(notification);
    }
    out
}
