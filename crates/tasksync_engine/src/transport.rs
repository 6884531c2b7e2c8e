use std::sync::Arc;
use std::time::Duration;

use tasksync_core::{ReconnectPolicy, TaskId, NORMAL_CLOSE};
use tasksync_logging::{sync_debug, sync_error, sync_info, sync_trace, sync_warn};
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, MissedTickBehavior};

use crate::{SyncSettings, TransportError};

/// Liveness frame sent while the socket is open.
pub const HEARTBEAT_FRAME: &str = r#"{"type":"ping"}"#;

/// Close code reported when the stream ends without a close frame.
pub const ABNORMAL_CLOSE: u16 = 1006;

/// One item read from a push socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Text(String),
    Closed { code: u16, reason: String },
    Error(String),
}

/// An established push socket.
#[async_trait::async_trait]
pub trait PushSocket: Send {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError>;
    /// Next inbound item, or `None` once the stream has ended.
    async fn recv(&mut self) -> Option<Inbound>;
    async fn close(&mut self, code: u16, reason: &str) -> Result<(), TransportError>;
}

/// Opens push sockets for a task.
#[async_trait::async_trait]
pub trait PushConnector: Send + Sync {
    async fn connect(&self, task_id: &TaskId) -> Result<Box<dyn PushSocket>, TransportError>;
}

/// Lifecycle callbacks of a [`TransportConnection`], delivered in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Opened,
    Message(String),
    Error(String),
    Closed { code: u16, reason: String },
    Reconnecting { attempt: u32, delay: Duration },
    /// Every reconnect attempt failed; nothing more will be tried.
    Exhausted { attempts: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionPhase {
    Connecting,
    Open,
    Closing,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionState {
    pub phase: ConnectionPhase,
    /// Reset to 0 on every successful open.
    pub reconnect_attempt: u32,
}

enum Command {
    Send(String),
    Close { code: u16, reason: String },
}

/// A push channel for one task id, reconnecting per a [`ReconnectPolicy`].
pub struct TransportConnection;

impl TransportConnection {
    /// Spawns the connection task and returns its handle. Must be called
    /// from within a tokio runtime.
    pub fn open(
        task_id: TaskId,
        connector: Arc<dyn PushConnector>,
        policy: ReconnectPolicy,
        settings: &SyncSettings,
    ) -> ConnectionHandle {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState {
            phase: ConnectionPhase::Connecting,
            reconnect_attempt: 0,
        });

        let worker = Worker {
            task_id: task_id.clone(),
            connector,
            policy,
            heartbeat_interval: settings.heartbeat_interval,
            connect_timeout: settings.connect_timeout,
            commands: command_rx,
            events: event_tx,
            state: state_tx,
        };
        tokio::spawn(worker.run());

        ConnectionHandle {
            task_id,
            commands: command_tx,
            events: event_rx,
            state: state_rx,
            manual_close: false,
        }
    }
}

/// Owner's end of a [`TransportConnection`]. Dropping it closes the
/// connection with a normal code.
pub struct ConnectionHandle {
    task_id: TaskId,
    commands: mpsc::UnboundedSender<Command>,
    events: mpsc::UnboundedReceiver<TransportEvent>,
    state: watch::Receiver<ConnectionState>,
    manual_close: bool,
}

impl ConnectionHandle {
    pub fn task_id(&self) -> &TaskId {
        &self.task_id
    }

    pub fn send(&self, frame: impl Into<String>) -> Result<(), TransportError> {
        if !self.is_open() {
            return Err(TransportError::Closed);
        }
        self.commands
            .send(Command::Send(frame.into()))
            .map_err(|_| TransportError::Closed)
    }

    /// Manual close. No reconnect follows; repeated calls are no-ops.
    pub fn close(&mut self, code: u16, reason: impl Into<String>) {
        if std::mem::replace(&mut self.manual_close, true) {
            return;
        }
        let _ = self.commands.send(Command::Close {
            code,
            reason: reason.into(),
        });
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn is_open(&self) -> bool {
        self.state().phase == ConnectionPhase::Open
    }

    pub fn is_manually_closed(&self) -> bool {
        self.manual_close
    }

    /// Next lifecycle event; `None` once the connection task has ended and
    /// every event has been read.
    pub async fn next_event(&mut self) -> Option<TransportEvent> {
        self.events.recv().await
    }
}

impl Drop for ConnectionHandle {
    fn drop(&mut self) {
        self.close(NORMAL_CLOSE, "connection handle dropped");
    }
}

enum Connect {
    Connected(Box<dyn PushSocket>),
    Failed(TransportError),
    Stop,
}

enum Served {
    /// Caller closed, or the handle is gone.
    Manual,
    /// Server closed with the normal code.
    ServerClosed,
    /// Abnormal close or socket error.
    Lost,
}

struct Worker {
    task_id: TaskId,
    connector: Arc<dyn PushConnector>,
    policy: ReconnectPolicy,
    heartbeat_interval: Duration,
    connect_timeout: Duration,
    commands: mpsc::UnboundedReceiver<Command>,
    events: mpsc::UnboundedSender<TransportEvent>,
    state: watch::Sender<ConnectionState>,
}

impl Worker {
    async fn run(mut self) {
        let mut attempt = 0u32;
        loop {
            self.set_state(ConnectionPhase::Connecting, attempt);
            match self.connect().await {
                Connect::Stop => break,
                Connect::Connected(socket) => {
                    attempt = 0;
                    self.set_state(ConnectionPhase::Open, 0);
                    sync_info!("task {}: push channel open", self.task_id);
                    self.emit(TransportEvent::Opened);
                    match self.serve(socket).await {
                        Served::Manual | Served::ServerClosed => break,
                        Served::Lost => {}
                    }
                }
                Connect::Failed(err) => {
                    sync_warn!("task {}: push connect failed: {}", self.task_id, err);
                    self.emit(TransportEvent::Error(err.to_string()));
                }
            }

            attempt += 1;
            if !self.policy.should_retry(attempt) {
                sync_error!(
                    "task {}: giving up on push channel after {} reconnect attempts",
                    self.task_id,
                    self.policy.max_attempts
                );
                self.emit(TransportEvent::Exhausted {
                    attempts: self.policy.max_attempts,
                });
                break;
            }
            let delay = self.policy.delay_for(attempt);
            sync_info!(
                "task {}: reconnecting {}/{} in {:?}",
                self.task_id,
                attempt,
                self.policy.max_attempts,
                delay
            );
            self.set_state(ConnectionPhase::Connecting, attempt);
            self.emit(TransportEvent::Reconnecting { attempt, delay });
            if !self.backoff(delay).await {
                break;
            }
        }
        self.set_state(ConnectionPhase::Closed, attempt);
        sync_debug!("task {}: push connection task finished", self.task_id);
    }

    async fn connect(&mut self) -> Connect {
        let connector = Arc::clone(&self.connector);
        let task_id = self.task_id.clone();
        let timeout = self.connect_timeout;
        let connecting = async move {
            match tokio::time::timeout(timeout, connector.connect(&task_id)).await {
                Ok(Ok(socket)) => Connect::Connected(socket),
                Ok(Err(err)) => Connect::Failed(err),
                Err(_) => Connect::Failed(TransportError::Timeout(timeout)),
            }
        };
        tokio::pin!(connecting);

        loop {
            tokio::select! {
                biased;
                command = self.commands.recv() => match command {
                    Some(Command::Send(_)) => {
                        sync_debug!("task {}: dropping frame while connecting", self.task_id);
                    }
                    Some(Command::Close { .. }) | None => return Connect::Stop,
                },
                outcome = &mut connecting => return outcome,
            }
        }
    }

    async fn serve(&mut self, mut socket: Box<dyn PushSocket>) -> Served {
        let period = self.heartbeat_interval;
        let mut heartbeat = tokio::time::interval_at(Instant::now() + period, period);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                command = self.commands.recv() => match command {
                    Some(Command::Send(frame)) => {
                        if let Err(err) = socket.send_text(frame).await {
                            sync_warn!("task {}: send failed: {}", self.task_id, err);
                        }
                    }
                    Some(Command::Close { code, reason }) => {
                        self.close_socket(socket.as_mut(), code, reason).await;
                        return Served::Manual;
                    }
                    None => {
                        self.close_socket(socket.as_mut(), NORMAL_CLOSE, "connection handle dropped".to_string())
                            .await;
                        return Served::Manual;
                    }
                },
                inbound = socket.recv() => match inbound {
                    Some(Inbound::Text(text)) => {
                        sync_trace!("task {}: frame {}", self.task_id, text);
                        self.emit(TransportEvent::Message(text));
                    }
                    Some(Inbound::Closed { code, reason }) => {
                        sync_info!(
                            "task {}: push channel closed by server ({} {})",
                            self.task_id,
                            code,
                            reason
                        );
                        self.emit(TransportEvent::Closed { code, reason });
                        return if ReconnectPolicy::is_abnormal_close(code) {
                            Served::Lost
                        } else {
                            Served::ServerClosed
                        };
                    }
                    Some(Inbound::Error(cause)) => {
                        sync_warn!("task {}: push socket error: {}", self.task_id, cause);
                        self.emit(TransportEvent::Error(cause.clone()));
                        self.emit(TransportEvent::Closed {
                            code: ABNORMAL_CLOSE,
                            reason: cause,
                        });
                        return Served::Lost;
                    }
                    None => {
                        sync_warn!("task {}: push stream ended without close", self.task_id);
                        self.emit(TransportEvent::Closed {
                            code: ABNORMAL_CLOSE,
                            reason: "stream ended".to_string(),
                        });
                        return Served::Lost;
                    }
                },
                _ = heartbeat.tick() => {
                    if let Err(err) = socket.send_text(HEARTBEAT_FRAME.to_string()).await {
                        sync_warn!("task {}: heartbeat failed: {}", self.task_id, err);
                    }
                }
            }
        }
    }

    async fn close_socket(&mut self, socket: &mut dyn PushSocket, code: u16, reason: String) {
        self.set_state(ConnectionPhase::Closing, 0);
        if let Err(err) = socket.close(code, &reason).await {
            sync_debug!("task {}: close handshake failed: {}", self.task_id, err);
        }
        sync_info!("task {}: push channel closed ({} {})", self.task_id, code, reason);
        self.emit(TransportEvent::Closed { code, reason });
    }

    /// Waits out a reconnect delay. Returns false if the caller closed meanwhile.
    async fn backoff(&mut self, delay: Duration) -> bool {
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                biased;
                command = self.commands.recv() => match command {
                    Some(Command::Send(_)) => {
                        sync_debug!("task {}: dropping frame while reconnecting", self.task_id);
                    }
                    Some(Command::Close { .. }) | None => return false,
                },
                () = &mut sleep => return true,
            }
        }
    }

    fn emit(&self, event: TransportEvent) {
        let _ = self.events.send(event);
    }

    fn set_state(&self, phase: ConnectionPhase, reconnect_attempt: u32) {
        self.state.send_replace(ConnectionState {
            phase,
            reconnect_attempt,
        });
    }
}
