use crate::Notification;

/// Work the driver must perform on behalf of the reconciler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Open the push connection for the task.
    OpenPush,
    /// Close the push connection as a manual close; no reconnect follows.
    ClosePush { code: u16, reason: String },
    /// Issue a single status request.
    PollOnce,
    /// Enter degraded mode: poll on the interval until terminal.
    StartPolling,
    /// Stop every outstanding poll.
    StopPolling,
    ArmFirstEventTimer,
    DisarmFirstEventTimer,
    /// Deliver to subscribers.
    Notify(Notification),
}
