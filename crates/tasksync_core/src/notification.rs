use crate::{LogEntry, TaskId, TaskProgressState};

/// Reconciler output delivered to subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    Connected { task_id: TaskId },
    Progress(TaskProgressState),
    Step(LogEntry),
    ItemCompleted {
        item: Option<String>,
        state: TaskProgressState,
    },
    Completed(TaskProgressState),
    Error(ErrorNotice),
    Closed { code: u16, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorNotice {
    pub kind: ErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// One work item failed; the task keeps running.
    ItemFailed,
    /// The task itself failed. Terminal.
    TaskFailed,
    /// The push channel is gone for good; polling continues.
    TransportExhausted,
    /// Polling could not resolve the task within the ceiling.
    PollUnresolved,
}

impl ErrorKind {
    pub fn is_terminal(self) -> bool {
        matches!(self, ErrorKind::TaskFailed)
    }
}
