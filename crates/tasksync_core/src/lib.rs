//! Tasksync core: pure reconciliation state machine for task progress.
//!
//! Nothing in this crate performs IO. Observations from the push and pull
//! channels arrive as [`Msg`] values, [`update`] folds them into a
//! [`SyncState`] and returns the [`Effect`]s the driver has to carry out.
mod effect;
mod event;
mod msg;
mod notification;
mod reconnect;
mod state;
mod update;
mod view_model;

pub use effect::Effect;
pub use event::{
    CompletionSummary, ControlFrame, ErrorPayload, ItemCompleted, ProgressPayload, StepPayload,
    TaskEvent, TaskSnapshot,
};
pub use msg::Msg;
pub use notification::{ErrorKind, ErrorNotice, Notification};
pub use reconnect::{ReconnectPolicy, NORMAL_CLOSE};
pub use state::{LogEntry, Severity, SyncState, TaskId, TaskProgressState, TaskStatus};
pub use update::update;
pub use view_model::{ChannelHealth, TaskView};
