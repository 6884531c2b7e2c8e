use chrono::{DateTime, Utc};
use tasksync_logging::{sync_debug, sync_info, sync_trace, sync_warn};

use crate::state::{clamp_percent, Numbers, Rejection};
use crate::{
    ChannelHealth, CompletionSummary, Effect, ErrorKind, ErrorNotice, ErrorPayload, ItemCompleted,
    Msg, Notification, ProgressPayload, ReconnectPolicy, Severity, StepPayload, SyncState,
    TaskEvent, TaskSnapshot, TaskStatus, NORMAL_CLOSE,
};

/// Pure update function: applies one observation to state and returns any effects.
///
/// Every observation from either channel goes through here, so this is the
/// only place where admission (terminal idempotence, monotonic progress and
/// forward-only status) is decided.
pub fn update(mut state: SyncState, msg: Msg) -> (SyncState, Vec<Effect>) {
    if matches!(msg, Msg::Close) {
        let effects = close(&mut state);
        return (state, effects);
    }
    if state.is_finished() {
        sync_trace!(
            "task {}: dropping {} after teardown",
            state.progress().task_id(),
            msg.label()
        );
        return (state, Vec::new());
    }

    let effects = match msg {
        Msg::Launch => {
            if state.launched() {
                Vec::new()
            } else {
                state.mark_launched();
                state.set_health(ChannelHealth::Connecting);
                vec![Effect::OpenPush, Effect::PollOnce]
            }
        }
        Msg::PushOpened => {
            state.set_health(ChannelHealth::Live);
            state.arm_watchdog();
            vec![
                Effect::ArmFirstEventTimer,
                Effect::Notify(Notification::Connected {
                    task_id: state.progress().task_id().clone(),
                }),
            ]
        }
        Msg::PushEvent { event, at } => push_event(&mut state, event, at),
        Msg::PushError { cause } => push_error(&mut state, &cause),
        Msg::PushClosed { code, reason } => push_closed(&mut state, code, reason),
        Msg::PushReconnecting { attempt, delay } => {
            sync_debug!(
                "task {}: reconnect attempt {} in {:?}",
                state.progress().task_id(),
                attempt,
                delay
            );
            state.set_health(ChannelHealth::Reconnecting { attempt });
            Vec::new()
        }
        Msg::PushExhausted { attempts } => push_exhausted(&mut state, attempts),
        Msg::FirstEventTimeout => {
            if state.disarm_watchdog() {
                sync_info!(
                    "task {}: no push event since open, verifying with a poll",
                    state.progress().task_id()
                );
                vec![Effect::PollOnce]
            } else {
                Vec::new()
            }
        }
        Msg::Snapshot { snapshot, at } => snapshot_observed(&mut state, snapshot, at),
        Msg::PollFailed { error, exhausted } => {
            if exhausted {
                sync_warn!(
                    "task {}: polling gave up: {}",
                    state.progress().task_id(),
                    error
                );
                // No channel is left to resolve the task, so the session ends here.
                let mut effects = teardown(&mut state, "status unresolved");
                effects.push(Effect::Notify(Notification::Error(ErrorNotice {
                    kind: ErrorKind::PollUnresolved,
                    message: error,
                })));
                effects
            } else {
                sync_debug!("task {}: poll failed: {}", state.progress().task_id(), error);
                Vec::new()
            }
        }
        Msg::Close => Vec::new(),
    };

    (state, effects)
}

fn push_event(state: &mut SyncState, event: TaskEvent, at: DateTime<Utc>) -> Vec<Effect> {
    if event.is_control() {
        sync_trace!(
            "task {}: control frame {}",
            state.progress().task_id(),
            event.kind()
        );
        return Vec::new();
    }

    let mut effects = Vec::new();
    if state.disarm_watchdog() {
        effects.push(Effect::DisarmFirstEventTimer);
    }
    match event {
        TaskEvent::Started(payload) | TaskEvent::Progress(payload) => {
            admit_progress(state, payload, at, &mut effects)
        }
        TaskEvent::Step(payload) => admit_step(state, payload, at, &mut effects),
        TaskEvent::ItemCompleted(item) => admit_item_completed(state, item, at, &mut effects),
        TaskEvent::Completed(summary) => admit_completed(state, summary, at, &mut effects),
        TaskEvent::Error(payload) => admit_error(state, payload, at, &mut effects),
        TaskEvent::Control(_) => {}
    }
    effects
}

fn admit_progress(
    state: &mut SyncState,
    payload: ProgressPayload,
    at: DateTime<Utc>,
    effects: &mut Vec<Effect>,
) {
    let numbers = Numbers {
        current: payload.current,
        total: payload.total,
        percent: payload.percent,
    };
    let projection = match state.progress().project(numbers) {
        Ok(projection) => projection,
        Err(rejection) => return discard(state, "progress", &rejection),
    };

    let progress = state.progress_mut();
    progress.commit(projection);
    progress.advance_status(TaskStatus::Running);
    progress.set_current_item(payload.current_item);
    if let Some(message) = payload.message {
        progress.push_log(at, message, Severity::Info);
    }
    progress.touch(at);
    effects.push(Effect::Notify(Notification::Progress(progress.clone())));
}

fn admit_step(
    state: &mut SyncState,
    payload: StepPayload,
    at: DateTime<Utc>,
    effects: &mut Vec<Effect>,
) {
    let progress = state.progress_mut();
    let entry = progress.push_log(at, payload.text(), Severity::Info);
    progress.touch(at);
    effects.push(Effect::Notify(Notification::Step(entry)));
}

fn admit_item_completed(
    state: &mut SyncState,
    item: ItemCompleted,
    at: DateTime<Utc>,
    effects: &mut Vec<Effect>,
) {
    let projection = if item.current.is_some() || item.total.is_some() {
        let numbers = Numbers {
            current: item.current,
            total: item.total,
            percent: None,
        };
        match state.progress().project(numbers) {
            Ok(projection) => projection,
            Err(rejection) => return discard(state, "url_completed", &rejection),
        }
    } else {
        state.progress().advance_one()
    };

    let message = match (&item.item, item.result_count) {
        (Some(url), Some(count)) => format!("completed {url} ({count} results)"),
        (Some(url), None) => format!("completed {url}"),
        (None, _) => item
            .message
            .clone()
            .unwrap_or_else(|| "item completed".to_string()),
    };

    let progress = state.progress_mut();
    progress.commit(projection);
    progress.advance_status(TaskStatus::Running);
    progress.push_log(at, message, Severity::Success);
    progress.touch(at);
    effects.push(Effect::Notify(Notification::ItemCompleted {
        item: item.item,
        state: progress.clone(),
    }));
}

fn admit_completed(
    state: &mut SyncState,
    summary: CompletionSummary,
    at: DateTime<Utc>,
    effects: &mut Vec<Effect>,
) {
    let progress = state.progress_mut();
    if let Some(percent) = summary.percent {
        progress.raise_percent(clamp_percent(percent));
    }
    progress.set_summary(summary.successful, summary.failed);
    let message = match (summary.successful, summary.failed) {
        (Some(ok), Some(failed)) => format!("task completed: {ok} succeeded, {failed} failed"),
        (Some(ok), None) => format!("task completed: {ok} succeeded"),
        (None, Some(failed)) => format!("task completed: {failed} failed"),
        (None, None) => "task completed".to_string(),
    };
    finish(state, TaskStatus::Completed, message, at, effects);
}

fn admit_error(
    state: &mut SyncState,
    payload: ErrorPayload,
    at: DateTime<Utc>,
    effects: &mut Vec<Effect>,
) {
    if payload.is_item_failure() {
        let text = match &payload.item {
            Some(item) => format!("{item}: {}", payload.message),
            None => payload.message.clone(),
        };
        let progress = state.progress_mut();
        progress.push_log(at, text, Severity::Error);
        progress.touch(at);
        effects.push(Effect::Notify(Notification::Error(ErrorNotice {
            kind: ErrorKind::ItemFailed,
            message: payload.message,
        })));
        return;
    }

    let message = format!("task failed: {}", payload.message);
    state.progress_mut().set_error(payload.message);
    finish(state, TaskStatus::Failed, message, at, effects);
}

fn snapshot_observed(
    state: &mut SyncState,
    snapshot: TaskSnapshot,
    at: DateTime<Utc>,
) -> Vec<Effect> {
    let mut effects = Vec::new();
    let numbers = Numbers {
        current: snapshot.current,
        total: snapshot.total,
        percent: snapshot.percent,
    };

    // Server truth on completion wins over lagging numbers; the numbers
    // themselves still never move backwards.
    if snapshot.status.is_terminal() {
        {
            let progress = state.progress_mut();
            progress.commit_monotonic(numbers);
            progress.set_current_item(snapshot.current_item.clone());
        }
        let message = if snapshot.status == TaskStatus::Completed {
            state.progress_mut().raise_percent(100);
            match snapshot.result_count {
                Some(count) => format!("task completed ({count} results)"),
                None => "task completed".to_string(),
            }
        } else {
            let text = snapshot.failure_text();
            state.progress_mut().set_error(text.clone());
            format!("task failed: {text}")
        };
        finish(state, snapshot.status, message, at, &mut effects);
        return effects;
    }

    let projection = match state.progress().project(numbers) {
        Ok(projection) => projection,
        Err(rejection) => {
            discard(state, "snapshot", &rejection);
            return effects;
        }
    };
    let progress = state.progress_mut();
    progress.commit(projection);
    progress.advance_status(snapshot.status);
    progress.set_current_item(snapshot.current_item);
    progress.touch(at);
    effects.push(Effect::Notify(Notification::Progress(progress.clone())));
    effects
}

fn push_error(state: &mut SyncState, cause: &str) -> Vec<Effect> {
    sync_debug!(
        "task {}: push channel degraded: {}",
        state.progress().task_id(),
        cause
    );
    if matches!(
        state.health(),
        ChannelHealth::Live | ChannelHealth::Connecting
    ) {
        state.set_health(ChannelHealth::Disconnected);
    }
    if state.is_degraded() {
        Vec::new()
    } else {
        vec![Effect::PollOnce]
    }
}

fn push_closed(state: &mut SyncState, code: u16, reason: String) -> Vec<Effect> {
    let mut effects = Vec::new();
    if state.disarm_watchdog() {
        effects.push(Effect::DisarmFirstEventTimer);
    }
    effects.push(Effect::Notify(Notification::Closed {
        code,
        reason: reason.clone(),
    }));

    if ReconnectPolicy::is_abnormal_close(code) {
        state.set_health(ChannelHealth::Disconnected);
        if !state.is_degraded() {
            effects.push(Effect::PollOnce);
        }
    } else {
        // A normal close from the server leaves no push source and no retry.
        sync_info!(
            "task {}: server closed push channel ({}), switching to polling",
            state.progress().task_id(),
            reason
        );
        state.set_health(ChannelHealth::Degraded);
        if state.enter_degraded() {
            effects.push(Effect::StartPolling);
        }
    }
    effects
}

fn push_exhausted(state: &mut SyncState, attempts: u32) -> Vec<Effect> {
    sync_warn!(
        "task {}: push channel unavailable after {} attempts, polling only",
        state.progress().task_id(),
        attempts
    );
    state.set_health(ChannelHealth::Degraded);
    let mut effects = Vec::with_capacity(2);
    if state.enter_degraded() {
        effects.push(Effect::StartPolling);
    }
    effects.push(Effect::Notify(Notification::Error(ErrorNotice {
        kind: ErrorKind::TransportExhausted,
        message: format!("unable to reconnect to server after {attempts} attempts"),
    })));
    effects
}

fn finish(
    state: &mut SyncState,
    status: TaskStatus,
    message: String,
    at: DateTime<Utc>,
    effects: &mut Vec<Effect>,
) {
    let severity = if status == TaskStatus::Completed {
        Severity::Success
    } else {
        Severity::Error
    };
    let snapshot = {
        let progress = state.progress_mut();
        progress.advance_status(status);
        progress.push_log(at, message, severity);
        progress.touch(at);
        progress.clone()
    };
    sync_info!(
        "task {}: {} at {}%",
        snapshot.task_id(),
        snapshot.status(),
        snapshot.progress_percent()
    );

    effects.extend(teardown(state, "task finished"));
    let notification = match status {
        TaskStatus::Completed => Notification::Completed(snapshot),
        _ => Notification::Error(ErrorNotice {
            kind: ErrorKind::TaskFailed,
            message: snapshot.error().unwrap_or("task failed").to_string(),
        }),
    };
    effects.push(Effect::Notify(notification));
}

/// Tears both channels down. Only the first call emits effects.
fn teardown(state: &mut SyncState, reason: &str) -> Vec<Effect> {
    if !state.mark_torn_down() {
        return Vec::new();
    }
    let mut effects = Vec::with_capacity(3);
    if state.disarm_watchdog() {
        effects.push(Effect::DisarmFirstEventTimer);
    }
    effects.push(Effect::ClosePush {
        code: NORMAL_CLOSE,
        reason: reason.to_string(),
    });
    effects.push(Effect::StopPolling);
    state.set_health(ChannelHealth::Closed);
    effects
}

fn close(state: &mut SyncState) -> Vec<Effect> {
    if state.is_closed() {
        return Vec::new();
    }
    let effects = teardown(state, "client closed connection");
    state.mark_closed();
    effects
}

fn discard(state: &SyncState, source: &str, rejection: &Rejection) {
    sync_debug!(
        "task {}: discarding {} observation: {}",
        state.progress().task_id(),
        source,
        rejection
    );
}
