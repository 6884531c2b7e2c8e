use std::fmt;

use chrono::{DateTime, Utc};

use crate::view_model::{ChannelHealth, TaskView};

/// Opaque identifier of a server-side task.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(String);

impl TaskId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for TaskId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Task status. The derived ordering is the only legal direction of travel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum TaskStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub message: String,
    pub severity: Severity,
}

/// Authoritative view of one task, mutated only by [`crate::update`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskProgressState {
    task_id: TaskId,
    status: TaskStatus,
    current: u64,
    total: u64,
    progress_percent: u8,
    current_item: Option<String>,
    log: Vec<LogEntry>,
    last_observed_at: Option<DateTime<Utc>>,
    terminal: bool,
    successful: Option<u64>,
    failed: Option<u64>,
    error: Option<String>,
}

/// Numeric fields proposed by an observation.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Numbers {
    pub current: Option<u64>,
    pub total: Option<u64>,
    pub percent: Option<f64>,
}

/// Numeric fields that admitting an observation would produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Projection {
    current: u64,
    total: u64,
    percent: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Rejection {
    Terminal,
    Regression {
        field: &'static str,
        from: u64,
        to: u64,
    },
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::Terminal => write!(f, "task already terminal"),
            Rejection::Regression { field, from, to } => {
                write!(f, "{field} would regress from {from} to {to}")
            }
        }
    }
}

impl TaskProgressState {
    pub fn new(task_id: TaskId) -> Self {
        Self {
            task_id,
            status: TaskStatus::Pending,
            current: 0,
            total: 0,
            progress_percent: 0,
            current_item: None,
            log: Vec::new(),
            last_observed_at: None,
            terminal: false,
            successful: None,
            failed: None,
            error: None,
        }
    }

    pub fn task_id(&self) -> &TaskId {
        &self.task_id
    }

    pub fn status(&self) -> TaskStatus {
        self.status
    }

    pub fn current(&self) -> u64 {
        self.current
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn progress_percent(&self) -> u8 {
        self.progress_percent
    }

    pub fn current_item(&self) -> Option<&str> {
        self.current_item.as_deref()
    }

    pub fn log(&self) -> &[LogEntry] {
        &self.log
    }

    pub fn last_observed_at(&self) -> Option<DateTime<Utc>> {
        self.last_observed_at
    }

    pub fn is_terminal(&self) -> bool {
        self.terminal
    }

    /// Summary counts reported with a completion, if any.
    pub fn summary(&self) -> (Option<u64>, Option<u64>) {
        (self.successful, self.failed)
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Computes the numeric fields that admitting `numbers` would produce,
    /// rejecting anything that moves `current` or the percentage backwards.
    pub(crate) fn project(&self, numbers: Numbers) -> Result<Projection, Rejection> {
        if self.terminal {
            return Err(Rejection::Terminal);
        }
        let projection = self.project_unchecked(numbers);
        if projection.current < self.current {
            return Err(Rejection::Regression {
                field: "current",
                from: self.current,
                to: projection.current,
            });
        }
        if projection.percent < self.progress_percent {
            return Err(Rejection::Regression {
                field: "progress_percent",
                from: u64::from(self.progress_percent),
                to: u64::from(projection.percent),
            });
        }
        Ok(projection)
    }

    fn project_unchecked(&self, numbers: Numbers) -> Projection {
        let total = numbers.total.unwrap_or(self.total);
        let mut current = numbers.current.unwrap_or(self.current);
        if total > 0 {
            current = current.min(total);
        }
        let percent = if total > 0 {
            derive_percent(current, total)
        } else {
            numbers
                .percent
                .map(clamp_percent)
                .unwrap_or(self.progress_percent)
        };
        Projection {
            current,
            total,
            percent,
        }
    }

    pub(crate) fn commit(&mut self, projection: Projection) {
        self.current = projection.current;
        self.total = projection.total;
        self.progress_percent = projection.percent;
    }

    /// Applies numbers from an authoritative terminal observation without
    /// letting any indicator move backwards.
    pub(crate) fn commit_monotonic(&mut self, numbers: Numbers) {
        let projection = self.project_unchecked(numbers);
        if projection.total > 0 && projection.total >= self.current {
            self.total = projection.total;
        }
        self.current = self.current.max(projection.current);
        self.progress_percent = self.progress_percent.max(projection.percent);
    }

    pub(crate) fn raise_percent(&mut self, percent: u8) {
        self.progress_percent = self.progress_percent.max(percent.min(100));
    }

    /// Advances `current` by one unit, staying within `total` once known.
    pub(crate) fn advance_one(&self) -> Projection {
        let mut current = self.current.saturating_add(1);
        if self.total > 0 {
            current = current.min(self.total);
        }
        let percent = if self.total > 0 {
            derive_percent(current, self.total)
        } else {
            self.progress_percent
        };
        Projection {
            current,
            total: self.total,
            percent: percent.max(self.progress_percent),
        }
    }

    pub(crate) fn advance_status(&mut self, status: TaskStatus) {
        if !self.terminal && status > self.status {
            self.status = status;
            self.terminal = status.is_terminal();
        }
    }

    pub(crate) fn set_current_item(&mut self, item: Option<String>) {
        if item.is_some() {
            self.current_item = item;
        }
    }

    pub(crate) fn set_summary(&mut self, successful: Option<u64>, failed: Option<u64>) {
        self.successful = successful.or(self.successful);
        self.failed = failed.or(self.failed);
    }

    pub(crate) fn set_error(&mut self, error: String) {
        self.error = Some(error);
    }

    pub(crate) fn push_log(
        &mut self,
        timestamp: DateTime<Utc>,
        message: impl Into<String>,
        severity: Severity,
    ) -> LogEntry {
        let entry = LogEntry {
            timestamp,
            message: message.into(),
            severity,
        };
        self.log.push(entry.clone());
        entry
    }

    pub(crate) fn touch(&mut self, at: DateTime<Utc>) {
        self.last_observed_at = Some(match self.last_observed_at {
            Some(previous) if previous > at => previous,
            _ => at,
        });
    }
}

fn derive_percent(current: u64, total: u64) -> u8 {
    let ratio = current as f64 / total as f64;
    clamp_percent(ratio * 100.0)
}

pub(crate) fn clamp_percent(percent: f64) -> u8 {
    if percent.is_nan() {
        return 0;
    }
    percent.clamp(0.0, 100.0).round() as u8
}

/// Reconciler state: the task progress plus channel bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncState {
    progress: TaskProgressState,
    health: ChannelHealth,
    launched: bool,
    degraded_polling: bool,
    watchdog_armed: bool,
    torn_down: bool,
    closed: bool,
    dirty: bool,
}

impl SyncState {
    pub fn new(task_id: TaskId) -> Self {
        Self {
            progress: TaskProgressState::new(task_id),
            health: ChannelHealth::Connecting,
            launched: false,
            degraded_polling: false,
            watchdog_armed: false,
            torn_down: false,
            closed: false,
            dirty: false,
        }
    }

    pub fn progress(&self) -> &TaskProgressState {
        &self.progress
    }

    pub fn health(&self) -> ChannelHealth {
        self.health
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded_polling
    }

    /// True once both channels have been torn down, either because the task
    /// reached a terminal status or because the owner closed the session.
    pub fn is_finished(&self) -> bool {
        self.torn_down || self.closed
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn view(&self) -> TaskView {
        TaskView {
            task_id: self.progress.task_id.clone(),
            status: self.progress.status,
            percent: self.progress.progress_percent,
            current: self.progress.current,
            total: self.progress.total,
            current_item: self.progress.current_item.clone(),
            health: self.health,
            log_len: self.progress.log.len(),
            last_log: self.progress.log.last().map(|entry| entry.message.clone()),
            error: self.progress.error.clone(),
            terminal: self.progress.terminal,
            dirty: self.dirty,
        }
    }

    /// Returns whether anything changed since the last call, and resets the flag.
    pub fn consume_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    pub(crate) fn progress_mut(&mut self) -> &mut TaskProgressState {
        self.dirty = true;
        &mut self.progress
    }

    pub(crate) fn set_health(&mut self, health: ChannelHealth) {
        if self.health != health {
            self.health = health;
            self.dirty = true;
        }
    }

    pub(crate) fn launched(&self) -> bool {
        self.launched
    }

    pub(crate) fn mark_launched(&mut self) {
        self.launched = true;
    }

    pub(crate) fn enter_degraded(&mut self) -> bool {
        !std::mem::replace(&mut self.degraded_polling, true)
    }

    pub(crate) fn arm_watchdog(&mut self) {
        self.watchdog_armed = true;
    }

    /// Disarms the first-event watchdog, returning whether it was armed.
    pub(crate) fn disarm_watchdog(&mut self) -> bool {
        std::mem::take(&mut self.watchdog_armed)
    }

    /// Marks both channels torn down; returns false if that already happened.
    pub(crate) fn mark_torn_down(&mut self) -> bool {
        !std::mem::replace(&mut self.torn_down, true)
    }

    pub(crate) fn mark_closed(&mut self) {
        self.closed = true;
        self.dirty = true;
    }
}
