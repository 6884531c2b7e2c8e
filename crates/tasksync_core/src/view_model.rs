use crate::{TaskId, TaskStatus};

/// Push-channel health as a page would display it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelHealth {
    #[default]
    Connecting,
    Live,
    /// Connection lost; waiting on the reconnection policy.
    Disconnected,
    Reconnecting {
        attempt: u32,
    },
    /// Push channel given up; the pull channel is the only source.
    Degraded,
    Closed,
}

impl ChannelHealth {
    pub fn label(self) -> &'static str {
        match self {
            ChannelHealth::Connecting => "connecting",
            ChannelHealth::Live => "live",
            ChannelHealth::Disconnected => "disconnected",
            ChannelHealth::Reconnecting { .. } => "reconnecting",
            ChannelHealth::Degraded => "polling",
            ChannelHealth::Closed => "closed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskView {
    pub task_id: TaskId,
    pub status: TaskStatus,
    pub percent: u8,
    pub current: u64,
    pub total: u64,
    pub current_item: Option<String>,
    pub health: ChannelHealth,
    pub log_len: usize,
    pub last_log: Option<String>,
    pub error: Option<String>,
    pub terminal: bool,
    pub dirty: bool,
}
