use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tasksync_core::TaskId;
use tasksync_logging::sync_debug;

use crate::session::{SessionHandle, TaskSession};
use crate::subscriber::Subscriber;
use crate::transport::PushConnector;
use crate::{StatusSource, SyncSettings};

/// At most one live session per task id.
pub struct SessionRegistry {
    settings: SyncSettings,
    connector: Arc<dyn PushConnector>,
    source: Arc<dyn StatusSource>,
    sessions: Mutex<HashMap<TaskId, SessionHandle>>,
}

impl SessionRegistry {
    pub fn new(
        settings: SyncSettings,
        connector: Arc<dyn PushConnector>,
        source: Arc<dyn StatusSource>,
    ) -> Self {
        Self {
            settings,
            connector,
            source,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Starts a session for `task_id`, or returns the live one. In the
    /// latter case `subscriber` is not attached.
    pub fn open(&self, task_id: TaskId, subscriber: Arc<dyn Subscriber>) -> SessionHandle {
        let mut sessions = self.lock();
        sessions.retain(|_, handle| !handle.is_finished());
        if let Some(existing) = sessions.get(&task_id) {
            sync_debug!("task {}: already connected", task_id);
            return existing.clone();
        }
        let handle = TaskSession::start(
            task_id.clone(),
            self.settings.clone(),
            Arc::clone(&self.connector),
            Arc::clone(&self.source),
            subscriber,
        );
        sessions.insert(task_id, handle.clone());
        handle
    }

    /// Closes and forgets the session for `task_id`. Returns whether one existed.
    pub fn close(&self, task_id: &TaskId) -> bool {
        match self.lock().remove(task_id) {
            Some(handle) => {
                handle.close();
                true
            }
            None => false,
        }
    }

    pub fn close_all(&self) {
        for (_, handle) in self.lock().drain() {
            handle.close();
        }
    }

    pub fn active_count(&self) -> usize {
        let mut sessions = self.lock();
        sessions.retain(|_, handle| !handle.is_finished());
        sessions.len()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<TaskId, SessionHandle>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
