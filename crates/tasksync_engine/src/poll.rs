use std::sync::Arc;
use std::time::Duration;

use tasksync_core::{TaskId, TaskSnapshot};
use tasksync_logging::{sync_debug, sync_warn};
use tokio::time::{Instant, MissedTickBehavior};

use crate::{ApiError, PollError, StatusSource};

/// What one poll produced.
#[derive(Debug, Clone, PartialEq)]
pub enum PollObservation {
    Snapshot(TaskSnapshot),
    Failed(ApiError),
}

pub trait SnapshotSink: Send + Sync {
    fn observe(&self, observation: PollObservation);
}

/// Pull-channel driver over a [`StatusSource`].
#[derive(Clone)]
pub struct Poller {
    source: Arc<dyn StatusSource>,
}

impl Poller {
    pub fn new(source: Arc<dyn StatusSource>) -> Self {
        Self { source }
    }

    pub async fn poll_once(&self, task_id: &TaskId) -> Result<TaskSnapshot, PollError> {
        let snapshot = self.source.task_status(task_id).await?;
        sync_debug!(
            "task {}: polled status {} ({:?}/{:?})",
            task_id,
            snapshot.status,
            snapshot.current,
            snapshot.total
        );
        Ok(snapshot)
    }

    /// Polls every `interval` until a snapshot reports a terminal status.
    ///
    /// Every snapshot and every failure goes to `sink`; failures are retried
    /// on the next tick. With a `ceiling`, gives up once that much time has
    /// passed without a terminal snapshot.
    pub async fn poll_until_terminal_or_timeout(
        &self,
        task_id: &TaskId,
        interval: Duration,
        ceiling: Option<Duration>,
        sink: &dyn SnapshotSink,
    ) -> Result<TaskSnapshot, PollError> {
        let started = Instant::now();
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            match self.poll_once(task_id).await {
                Ok(snapshot) => {
                    let terminal = snapshot.status.is_terminal();
                    sink.observe(PollObservation::Snapshot(snapshot.clone()));
                    if terminal {
                        return Ok(snapshot);
                    }
                }
                Err(PollError::Api(err)) => {
                    sync_warn!("task {}: poll failed: {}", task_id, err);
                    sink.observe(PollObservation::Failed(err));
                }
                Err(err) => return Err(err),
            }
            if let Some(ceiling) = ceiling {
                if started.elapsed() >= ceiling {
                    sync_warn!("task {}: giving up polling after {:?}", task_id, ceiling);
                    return Err(PollError::CeilingExceeded(ceiling));
                }
            }
        }
    }
}
