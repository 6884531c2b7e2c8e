use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::{TaskEvent, TaskSnapshot};

/// Everything the reconciler can observe.
#[derive(Debug, Clone, PartialEq)]
pub enum Msg {
    /// Task launched; bring up both channels.
    Launch,
    /// Push connection established (first open or a reconnect).
    PushOpened,
    /// Decoded push event.
    PushEvent {
        event: TaskEvent,
        at: DateTime<Utc>,
    },
    /// Socket-level failure on the push channel.
    PushError { cause: String },
    /// Push connection closed, by either side.
    PushClosed { code: u16, reason: String },
    /// Reconnection scheduled by the policy.
    PushReconnecting { attempt: u32, delay: Duration },
    /// Reconnection policy gave up.
    PushExhausted { attempts: u32 },
    /// No push event arrived within the window after opening.
    FirstEventTimeout,
    /// Pull-channel snapshot.
    Snapshot {
        snapshot: TaskSnapshot,
        at: DateTime<Utc>,
    },
    /// Pull-channel request failed. `exhausted` means the caller's ceiling
    /// was reached without a terminal status.
    PollFailed { error: String, exhausted: bool },
    /// The owner is going away.
    Close,
}

impl Msg {
    pub fn label(&self) -> &'static str {
        match self {
            Msg::Launch => "launch",
            Msg::PushOpened => "push_opened",
            Msg::PushEvent { .. } => "push_event",
            Msg::PushError { .. } => "push_error",
            Msg::PushClosed { .. } => "push_closed",
            Msg::PushReconnecting { .. } => "push_reconnecting",
            Msg::PushExhausted { .. } => "push_exhausted",
            Msg::FirstEventTimeout => "first_event_timeout",
            Msg::Snapshot { .. } => "snapshot",
            Msg::PollFailed { .. } => "poll_failed",
            Msg::Close => "close",
        }
    }
}
