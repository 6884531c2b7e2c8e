use tasksync_core::{ErrorNotice, LogEntry, Notification, TaskId, TaskProgressState};
use tokio::sync::mpsc;

/// Callback set a page registers for one task. Every method defaults to a no-op.
pub trait Subscriber: Send + Sync {
    fn on_connected(&self, _task_id: &TaskId) {}
    fn on_progress(&self, _state: &TaskProgressState) {}
    fn on_step(&self, _entry: &LogEntry) {}
    fn on_item_completed(&self, _item: Option<&str>, _state: &TaskProgressState) {}
    fn on_completed(&self, _state: &TaskProgressState) {}
    fn on_error(&self, _error: &ErrorNotice) {}
    fn on_close(&self, _code: u16, _reason: &str) {}
}

pub(crate) fn deliver(subscriber: &dyn Subscriber, notification: &Notification) {
    match notification {
        Notification::Connected { task_id } => subscriber.on_connected(task_id),
        Notification::Progress(state) => subscriber.on_progress(state),
        Notification::Step(entry) => subscriber.on_step(entry),
        Notification::ItemCompleted { item, state } => {
            subscriber.on_item_completed(item.as_deref(), state)
        }
        Notification::Completed(state) => subscriber.on_completed(state),
        Notification::Error(error) => subscriber.on_error(error),
        Notification::Closed { code, reason } => subscriber.on_close(*code, reason),
    }
}

/// Forwards every notification into a channel.
pub struct ChannelSubscriber {
    tx: mpsc::UnboundedSender<Notification>,
}

impl ChannelSubscriber {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn forward(&self, notification: Notification) {
        let _ = self.tx.send(notification);
    }
}

impl Subscriber for ChannelSubscriber {
    fn on_connected(&self, task_id: &TaskId) {
        self.forward(Notification::Connected {
            task_id: task_id.clone(),
        });
    }

    fn on_progress(&self, state: &TaskProgressState) {
        self.forward(Notification::Progress(state.clone()));
    }

    fn on_step(&self, entry: &LogEntry) {
        self.forward(Notification::Step(entry.clone()));
    }

    fn on_item_completed(&self, item: Option<&str>, state: &TaskProgressState) {
        self.forward(Notification::ItemCompleted {
            item: item.map(str::to_string),
            state: state.clone(),
        });
    }

    fn on_completed(&self, state: &TaskProgressState) {
        self.forward(Notification::Completed(state.clone()));
    }

    fn on_error(&self, error: &ErrorNotice) {
        self.forward(Notification::Error(error.clone()));
    }

    fn on_close(&self, code: u16, reason: &str) {
        self.forward(Notification::Closed {
            code,
            reason: reason.to_string(),
        });
    }
}
