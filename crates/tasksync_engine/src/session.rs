use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tasksync_core::{
    update, Effect, Msg, SyncState, TaskId, TaskProgressState, TaskSnapshot, TaskView,
};
use tasksync_logging::{sync_debug, sync_info, sync_trace, sync_warn};
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::poll::{PollObservation, Poller, SnapshotSink};
use crate::subscriber::{deliver, Subscriber};
use crate::transport::{ConnectionHandle, PushConnector, TransportConnection, TransportEvent};
use crate::{decode_frame, StatusSource, SyncSettings};

enum PollReport {
    Snapshot {
        snapshot: TaskSnapshot,
        one_shot: bool,
    },
    Failed {
        error: String,
        exhausted: bool,
    },
}

struct ReportSink {
    tx: mpsc::UnboundedSender<PollReport>,
}

impl SnapshotSink for ReportSink {
    fn observe(&self, observation: PollObservation) {
        let report = match observation {
            PollObservation::Snapshot(snapshot) => PollReport::Snapshot {
                snapshot,
                one_shot: false,
            },
            PollObservation::Failed(err) => PollReport::Failed {
                error: err.to_string(),
                exhausted: false,
            },
        };
        let _ = self.tx.send(report);
    }
}

/// Tracks one task over both channels until it is terminal or closed.
pub struct TaskSession;

impl TaskSession {
    /// Spawns the session driver. Must be called from within a tokio runtime.
    ///
    /// The driver owns the reconciler state and is the only task that
    /// touches it; the push connection, polls and timers all report back to
    /// it over channels.
    pub fn start(
        task_id: TaskId,
        settings: SyncSettings,
        connector: Arc<dyn PushConnector>,
        source: Arc<dyn StatusSource>,
        subscriber: Arc<dyn Subscriber>,
    ) -> SessionHandle {
        let cancel = CancellationToken::new();
        let (published, state_rx) = watch::channel(SyncState::new(task_id.clone()));
        let (poll_tx, poll_rx) = mpsc::unbounded_channel();

        let driver = Driver {
            task_id: task_id.clone(),
            state: SyncState::new(task_id.clone()),
            settings,
            connector,
            poller: Poller::new(source),
            subscriber,
            connection: None,
            watchdog: None,
            one_shot: None,
            degraded_running: false,
            polls: cancel.child_token(),
            poll_tx,
            poll_rx,
            published,
            cancel: cancel.clone(),
        };
        tokio::spawn(driver.run());

        SessionHandle {
            inner: Arc::new(SessionInner {
                task_id,
                cancel,
                state: state_rx,
            }),
        }
    }
}

/// Shared handle to a running session. The session closes when the last
/// clone is dropped.
#[derive(Clone)]
pub struct SessionHandle {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    task_id: TaskId,
    cancel: CancellationToken,
    state: watch::Receiver<SyncState>,
}

impl Drop for SessionInner {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl SessionHandle {
    pub fn task_id(&self) -> &TaskId {
        &self.inner.task_id
    }

    pub fn state(&self) -> SyncState {
        self.inner.state.borrow().clone()
    }

    pub fn snapshot(&self) -> TaskProgressState {
        self.inner.state.borrow().progress().clone()
    }

    pub fn view(&self) -> TaskView {
        self.inner.state.borrow().view()
    }

    pub fn is_finished(&self) -> bool {
        self.inner.cancel.is_cancelled() || self.inner.state.borrow().is_finished()
    }

    /// Tears both channels down. No subscriber callback fires afterwards.
    pub fn close(&self) {
        self.inner.cancel.cancel();
    }

    /// Resolves once the session has finished, either because the task
    /// reached a terminal status or because it was closed.
    pub async fn wait_terminal(&self) -> TaskProgressState {
        let mut rx = self.inner.state.clone();
        let finished = rx
            .wait_for(SyncState::is_finished)
            .await
            .map(|state| state.progress().clone());
        match finished {
            Ok(progress) => progress,
            Err(_) => rx.borrow().progress().clone(),
        }
    }
}

struct Driver {
    task_id: TaskId,
    state: SyncState,
    settings: SyncSettings,
    connector: Arc<dyn PushConnector>,
    poller: Poller,
    subscriber: Arc<dyn Subscriber>,
    connection: Option<ConnectionHandle>,
    watchdog: Option<Instant>,
    /// Cancels the in-flight status check, if any.
    one_shot: Option<CancellationToken>,
    degraded_running: bool,
    /// Cancels every poll task; a child of `cancel`.
    polls: CancellationToken,
    poll_tx: mpsc::UnboundedSender<PollReport>,
    poll_rx: mpsc::UnboundedReceiver<PollReport>,
    published: watch::Sender<SyncState>,
    cancel: CancellationToken,
}

impl Driver {
    async fn run(mut self) {
        sync_info!("task {}: session started", self.task_id);
        self.dispatch(Msg::Launch);

        while !self.state.is_finished() {
            let deadline = self.watchdog;
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => self.dispatch(Msg::Close),
                event = next_transport_event(&mut self.connection) => match event {
                    Some(event) => self.on_transport(event),
                    None => self.connection = None,
                },
                Some(report) = self.poll_rx.recv() => self.on_poll(report),
                () = watchdog(deadline) => {
                    self.watchdog = None;
                    self.dispatch(Msg::FirstEventTimeout);
                }
            }
        }

        self.polls.cancel();
        self.connection = None;
        sync_info!(
            "task {}: session finished ({})",
            self.task_id,
            self.state.progress().status()
        );
    }

    fn dispatch(&mut self, msg: Msg) {
        sync_trace!("task {}: {}", self.task_id, msg.label());
        let state = std::mem::replace(&mut self.state, SyncState::new(self.task_id.clone()));
        let (mut next, effects) = update(state, msg);
        if next.consume_dirty() {
            self.published.send_replace(next.clone());
        }
        self.state = next;
        for effect in effects {
            self.execute(effect);
        }
    }

    fn execute(&mut self, effect: Effect) {
        match effect {
            Effect::OpenPush => self.open_push(),
            Effect::ClosePush { code, reason } => {
                if let Some(mut connection) = self.connection.take() {
                    connection.close(code, reason);
                }
            }
            Effect::PollOnce => self.spawn_one_shot(),
            Effect::StartPolling => self.spawn_degraded(),
            Effect::StopPolling => self.polls.cancel(),
            Effect::ArmFirstEventTimer => {
                self.watchdog = Some(Instant::now() + self.settings.first_event_timeout);
            }
            Effect::DisarmFirstEventTimer => self.watchdog = None,
            Effect::Notify(notification) => {
                if self.cancel.is_cancelled() {
                    sync_trace!("task {}: closed, not notifying", self.task_id);
                    return;
                }
                deliver(self.subscriber.as_ref(), &notification);
            }
        }
    }

    fn open_push(&mut self) {
        if self.connection.is_some() {
            return;
        }
        self.connection = Some(TransportConnection::open(
            self.task_id.clone(),
            Arc::clone(&self.connector),
            self.settings.reconnect,
            &self.settings,
        ));
    }

    fn on_transport(&mut self, event: TransportEvent) {
        let msg = match event {
            TransportEvent::Opened => Msg::PushOpened,
            TransportEvent::Message(raw) => match decode_frame(&raw) {
                Ok(event) => Msg::PushEvent {
                    event,
                    at: Utc::now(),
                },
                Err(err) => {
                    sync_warn!("task {}: dropping push frame: {}", self.task_id, err);
                    return;
                }
            },
            TransportEvent::Error(cause) => Msg::PushError { cause },
            TransportEvent::Closed { code, reason } => Msg::PushClosed { code, reason },
            TransportEvent::Reconnecting { attempt, delay } => {
                Msg::PushReconnecting { attempt, delay }
            }
            TransportEvent::Exhausted { attempts } => Msg::PushExhausted { attempts },
        };
        self.dispatch(msg);
    }

    fn on_poll(&mut self, report: PollReport) {
        let msg = match report {
            PollReport::Snapshot { snapshot, one_shot } => {
                if one_shot {
                    self.one_shot = None;
                }
                Msg::Snapshot {
                    snapshot,
                    at: Utc::now(),
                }
            }
            PollReport::Failed { error, exhausted } => Msg::PollFailed { error, exhausted },
        };
        self.dispatch(msg);
    }

    /// One status check, retried until it gets an answer. At most one runs
    /// at a time, and none once degraded polling owns the pull channel.
    fn spawn_one_shot(&mut self) {
        if self.degraded_running {
            sync_trace!("task {}: degraded polling active, no status check", self.task_id);
            return;
        }
        if self.one_shot.is_some() {
            sync_trace!("task {}: status check already in flight", self.task_id);
            return;
        }
        let token = self.polls.child_token();
        self.one_shot = Some(token.clone());
        let poller = self.poller.clone();
        let task_id = self.task_id.clone();
        let tx = self.poll_tx.clone();
        let retry_delay = self.settings.poll_retry_delay;
        tokio::spawn(async move {
            tokio::select! {
                () = token.cancelled() => {}
                () = check_until_answered(poller, task_id, retry_delay, tx) => {}
            }
        });
    }

    fn spawn_degraded(&mut self) {
        if std::mem::replace(&mut self.degraded_running, true) {
            return;
        }
        if let Some(one_shot) = self.one_shot.take() {
            sync_debug!("task {}: degraded polling takes over status check", self.task_id);
            one_shot.cancel();
        }
        sync_info!(
            "task {}: polling every {:?}",
            self.task_id,
            self.settings.poll_interval
        );
        let poller = self.poller.clone();
        let task_id = self.task_id.clone();
        let tx = self.poll_tx.clone();
        let interval = self.settings.poll_interval;
        let ceiling = self.settings.poll_ceiling;
        let token = self.polls.clone();
        tokio::spawn(async move {
            let sink = ReportSink { tx: tx.clone() };
            tokio::select! {
                () = token.cancelled() => {}
                result = poller.poll_until_terminal_or_timeout(&task_id, interval, ceiling, &sink) => {
                    if let Err(err) = result {
                        let _ = tx.send(PollReport::Failed {
                            error: err.to_string(),
                            exhausted: true,
                        });
                    }
                }
            }
        });
    }
}

async fn check_until_answered(
    poller: Poller,
    task_id: TaskId,
    retry_delay: Duration,
    tx: mpsc::UnboundedSender<PollReport>,
) {
    loop {
        match poller.poll_once(&task_id).await {
            Ok(snapshot) => {
                let _ = tx.send(PollReport::Snapshot {
                    snapshot,
                    one_shot: true,
                });
                return;
            }
            Err(err) => {
                sync_debug!(
                    "task {}: status check failed, retrying in {:?}: {}",
                    task_id,
                    retry_delay,
                    err
                );
                let _ = tx.send(PollReport::Failed {
                    error: err.to_string(),
                    exhausted: false,
                });
                tokio::time::sleep(retry_delay).await;
            }
        }
    }
}

async fn next_transport_event(connection: &mut Option<ConnectionHandle>) -> Option<TransportEvent> {
    match connection {
        Some(connection) => connection.next_event().await,
        None => std::future::pending().await,
    }
}

async fn watchdog(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
