use crate::TaskStatus;

/// Typed push-channel event, produced by the frame decoder.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskEvent {
    /// Task accepted by the server. Handled exactly like `Progress`.
    Started(ProgressPayload),
    Progress(ProgressPayload),
    /// Informational; only ever appends to the log.
    Step(StepPayload),
    ItemCompleted(ItemCompleted),
    Completed(CompletionSummary),
    Error(ErrorPayload),
    /// Recognized frame that carries no task information.
    Control(ControlFrame),
}

impl TaskEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            TaskEvent::Started(_) => "started",
            TaskEvent::Progress(_) => "progress",
            TaskEvent::Step(_) => "step",
            TaskEvent::ItemCompleted(_) => "url_completed",
            TaskEvent::Completed(_) => "completed",
            TaskEvent::Error(_) => "error",
            TaskEvent::Control(ControlFrame::Connected) => "connected",
            TaskEvent::Control(ControlFrame::Pong) => "pong",
        }
    }

    pub fn is_control(&self) -> bool {
        matches!(self, TaskEvent::Control(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlFrame {
    Connected,
    Pong,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ProgressPayload {
    /// Directly reported percentage, used only while `total` is unknown.
    pub percent: Option<f64>,
    pub current: Option<u64>,
    pub total: Option<u64>,
    pub current_item: Option<String>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StepPayload {
    pub step: Option<String>,
    pub log: Option<String>,
    pub message: Option<String>,
}

impl StepPayload {
    /// Text for the log entry: `log`, then `message`, then the step name.
    pub fn text(&self) -> String {
        self.log
            .as_deref()
            .or(self.message.as_deref())
            .or(self.step.as_deref())
            .unwrap_or("processing...")
            .to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ItemCompleted {
    pub item: Option<String>,
    pub current: Option<u64>,
    pub total: Option<u64>,
    pub result_count: Option<u64>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct CompletionSummary {
    pub successful: Option<u64>,
    pub failed: Option<u64>,
    pub percent: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ErrorPayload {
    pub message: String,
    pub item: Option<String>,
    pub current: Option<u64>,
}

impl ErrorPayload {
    /// An error naming a specific work item is a per-item failure; the
    /// batch keeps running.
    pub fn is_item_failure(&self) -> bool {
        self.item.is_some() || self.current.is_some()
    }
}

/// Point-in-time status returned by the pull channel.
///
/// Always a full replacement of the numeric fields, never a delta.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TaskSnapshot {
    pub status: TaskStatus,
    pub percent: Option<f64>,
    pub current: Option<u64>,
    pub total: Option<u64>,
    pub current_item: Option<String>,
    pub result_count: Option<usize>,
    pub error: Option<String>,
    pub errors: Vec<String>,
}

impl TaskSnapshot {
    pub fn with_status(status: TaskStatus) -> Self {
        Self {
            status,
            ..Self::default()
        }
    }

    pub fn failure_text(&self) -> String {
        self.error
            .clone()
            .or_else(|| self.errors.first().cloned())
            .unwrap_or_else(|| "task failed".to_string())
    }
}
