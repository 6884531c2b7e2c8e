use std::sync::Once;

use chrono::{DateTime, TimeZone, Utc};
use pretty_assertions::assert_eq;
use tasksync_core::{
    update, Effect, ErrorKind, ErrorNotice, ErrorPayload, ItemCompleted, Msg, Notification,
    ProgressPayload, Severity, StepPayload, SyncState, TaskEvent, TaskId, TaskSnapshot,
    TaskStatus,
};

fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(tasksync_logging::initialize_for_tests);
}

fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
}

fn launched() -> SyncState {
    let (state, _) = update(SyncState::new(TaskId::from("task-2")), Msg::Launch);
    let (state, _) = update(state, Msg::PushOpened);
    let (state, _) = update(state, Msg::FirstEventTimeout);
    state
}

fn progress(current: u64, total: u64) -> TaskEvent {
    TaskEvent::Progress(ProgressPayload {
        current: Some(current),
        total: Some(total),
        ..ProgressPayload::default()
    })
}

fn push(state: SyncState, event: TaskEvent, secs: i64) -> (SyncState, Vec<Effect>) {
    update(
        state,
        Msg::PushEvent {
            event,
            at: at(secs),
        },
    )
}

fn snapshot(state: SyncState, snapshot: TaskSnapshot, secs: i64) -> (SyncState, Vec<Effect>) {
    update(
        state,
        Msg::Snapshot {
            snapshot,
            at: at(secs),
        },
    )
}

#[test]
fn progress_regression_is_discarded() {
    init_logging();
    let (state, _) = push(launched(), progress(3, 10), 1);
    assert_eq!(state.progress().progress_percent(), 30);
    assert_eq!(state.progress().status(), TaskStatus::Running);

    let (state, effects) = push(state, progress(2, 10), 2);
    assert!(effects.is_empty());
    assert_eq!(state.progress().current(), 3);
    assert_eq!(state.progress().progress_percent(), 30);
    assert_eq!(state.progress().last_observed_at(), Some(at(1)));
}

#[test]
fn percent_never_decreases_across_mixed_channels() {
    init_logging();
    let observations = vec![
        Msg::PushEvent {
            event: progress(1, 8),
            at: at(1),
        },
        Msg::Snapshot {
            snapshot: TaskSnapshot {
                status: TaskStatus::Running,
                current: Some(3),
                total: Some(8),
                ..TaskSnapshot::default()
            },
            at: at(2),
        },
        Msg::PushEvent {
            event: progress(2, 8),
            at: at(3),
        },
        Msg::Snapshot {
            snapshot: TaskSnapshot {
                status: TaskStatus::Running,
                current: Some(1),
                total: Some(8),
                ..TaskSnapshot::default()
            },
            at: at(4),
        },
        Msg::PushEvent {
            event: TaskEvent::ItemCompleted(ItemCompleted::default()),
            at: at(5),
        },
        Msg::PushEvent {
            event: progress(7, 8),
            at: at(6),
        },
        Msg::PushEvent {
            event: progress(4, 8),
            at: at(7),
        },
    ];

    let mut state = launched();
    let mut last_percent = 0;
    for msg in observations {
        let (next, _) = update(state, msg);
        assert!(next.progress().progress_percent() >= last_percent);
        assert!(next.progress().current() <= next.progress().total());
        last_percent = next.progress().progress_percent();
        state = next;
    }
    assert_eq!(state.progress().current(), 7);
    assert_eq!(last_percent, 88);
}

#[test]
fn step_only_appends_to_log() {
    init_logging();
    let (state, _) = push(launched(), progress(1, 4), 1);
    let before = state.progress().clone();

    let (state, effects) = push(
        state,
        TaskEvent::Step(StepPayload {
            step: Some("extracting_transcript".to_string()),
            log: Some("fetching transcript".to_string()),
            message: None,
        }),
        2,
    );

    let entry = &state.progress().log()[0];
    assert_eq!(entry.message, "fetching transcript");
    assert_eq!(entry.severity, Severity::Info);
    assert_eq!(effects, vec![Effect::Notify(Notification::Step(entry.clone()))]);
    assert_eq!(state.progress().status(), before.status());
    assert_eq!(state.progress().current(), before.current());
    assert_eq!(state.progress().progress_percent(), before.progress_percent());
}

#[test]
fn step_text_falls_back_to_step_name() {
    let named = StepPayload {
        step: Some("shadow_writing".to_string()),
        ..StepPayload::default()
    };
    assert_eq!(named.text(), "shadow_writing");
    assert_eq!(StepPayload::default().text(), "processing...");
}

#[test]
fn item_completion_advances_one_unit_when_current_missing() {
    init_logging();
    let (state, _) = push(launched(), progress(3, 10), 1);
    let (state, effects) = push(
        state,
        TaskEvent::ItemCompleted(ItemCompleted {
            item: Some("https://ted.com/a".to_string()),
            result_count: Some(4),
            ..ItemCompleted::default()
        }),
        2,
    );

    assert_eq!(state.progress().current(), 4);
    assert_eq!(state.progress().progress_percent(), 40);
    assert_eq!(
        state.progress().log().last().map(|entry| entry.message.as_str()),
        Some("completed https://ted.com/a (4 results)")
    );
    assert!(matches!(
        &effects[..],
        [Effect::Notify(Notification::ItemCompleted { item: Some(url), .. })] if url == "https://ted.com/a"
    ));
}

#[test]
fn item_completion_uses_reported_current_and_stays_within_total() {
    init_logging();
    let (state, _) = push(launched(), progress(2, 2), 1);
    let (state, _) = push(
        state,
        TaskEvent::ItemCompleted(ItemCompleted::default()),
        2,
    );
    assert_eq!(state.progress().current(), 2);

    let (state, _) = push(launched(), progress(1, 5), 1);
    let (state, _) = push(
        state,
        TaskEvent::ItemCompleted(ItemCompleted {
            current: Some(3),
            ..ItemCompleted::default()
        }),
        2,
    );
    assert_eq!(state.progress().current(), 3);
    assert_eq!(state.progress().progress_percent(), 60);
}

#[test]
fn reported_percent_is_used_until_total_is_known() {
    init_logging();
    let (state, _) = push(
        launched(),
        TaskEvent::Progress(ProgressPayload {
            percent: Some(42.4),
            ..ProgressPayload::default()
        }),
        1,
    );
    assert_eq!(state.progress().progress_percent(), 42);

    let (state, effects) = push(
        state,
        TaskEvent::Progress(ProgressPayload {
            percent: Some(40.0),
            ..ProgressPayload::default()
        }),
        2,
    );
    assert!(effects.is_empty());
    assert_eq!(state.progress().progress_percent(), 42);
}

#[test]
fn started_is_treated_like_progress() {
    init_logging();
    let (state, effects) = push(
        launched(),
        TaskEvent::Started(ProgressPayload {
            total: Some(3),
            message: Some("processing 3 talks".to_string()),
            ..ProgressPayload::default()
        }),
        1,
    );
    assert_eq!(state.progress().status(), TaskStatus::Running);
    assert_eq!(state.progress().total(), 3);
    assert_eq!(state.progress().log().len(), 1);
    assert!(matches!(&effects[..], [Effect::Notify(Notification::Progress(_))]));
}

#[test]
fn terminal_snapshot_wins_over_lagging_numbers() {
    init_logging();
    let (state, _) = push(launched(), progress(5, 10), 1);
    let (state, effects) = snapshot(
        state,
        TaskSnapshot {
            status: TaskStatus::Completed,
            current: Some(2),
            total: Some(10),
            result_count: Some(12),
            ..TaskSnapshot::default()
        },
        2,
    );

    assert_eq!(state.progress().status(), TaskStatus::Completed);
    assert!(state.progress().is_terminal());
    assert_eq!(state.progress().current(), 5);
    assert_eq!(state.progress().progress_percent(), 100);
    assert_eq!(
        state.progress().log().last().map(|entry| entry.message.as_str()),
        Some("task completed (12 results)")
    );
    assert!(effects.contains(&Effect::StopPolling));
}

#[test]
fn failed_snapshot_from_pending_is_admitted() {
    init_logging();
    let (state, effects) = snapshot(
        launched(),
        TaskSnapshot {
            status: TaskStatus::Failed,
            error: Some("transcript unavailable".to_string()),
            ..TaskSnapshot::default()
        },
        1,
    );

    assert_eq!(state.progress().status(), TaskStatus::Failed);
    assert_eq!(state.progress().error(), Some("transcript unavailable"));
    assert_eq!(
        effects.last(),
        Some(&Effect::Notify(Notification::Error(ErrorNotice {
            kind: ErrorKind::TaskFailed,
            message: "transcript unavailable".to_string(),
        })))
    );
}

#[test]
fn status_never_moves_backwards() {
    init_logging();
    let (state, _) = push(launched(), progress(1, 4), 1);
    let (state, effects) = snapshot(
        state,
        TaskSnapshot {
            status: TaskStatus::Pending,
            current: Some(1),
            total: Some(4),
            ..TaskSnapshot::default()
        },
        2,
    );
    assert_eq!(effects.len(), 1);
    assert_eq!(state.progress().status(), TaskStatus::Running);
    assert_eq!(state.progress().last_observed_at(), Some(at(2)));
}

#[test]
fn item_error_is_transient() {
    init_logging();
    let (state, _) = push(launched(), progress(1, 3), 1);
    let (state, effects) = push(
        state,
        TaskEvent::Error(ErrorPayload {
            message: "no transcript".to_string(),
            item: Some("https://ted.com/b".to_string()),
            current: Some(1),
        }),
        2,
    );

    assert_eq!(
        effects,
        vec![Effect::Notify(Notification::Error(ErrorNotice {
            kind: ErrorKind::ItemFailed,
            message: "no transcript".to_string(),
        }))]
    );
    assert!(!state.progress().is_terminal());
    let entry = state.progress().log().last().unwrap();
    assert_eq!(entry.severity, Severity::Error);
    assert_eq!(entry.message, "https://ted.com/b: no transcript");
}

#[test]
fn task_error_is_terminal_and_applied_once() {
    init_logging();
    let (state, effects) = push(
        launched(),
        TaskEvent::Error(ErrorPayload {
            message: "worker crashed".to_string(),
            ..ErrorPayload::default()
        }),
        1,
    );
    assert_eq!(state.progress().status(), TaskStatus::Failed);
    assert_eq!(
        effects
            .iter()
            .filter(|effect| matches!(effect, Effect::ClosePush { .. }))
            .count(),
        1
    );

    let (state, effects) = snapshot(
        state,
        TaskSnapshot {
            status: TaskStatus::Failed,
            error: Some("worker crashed".to_string()),
            ..TaskSnapshot::default()
        },
        2,
    );
    assert!(effects.is_empty());
    let failures = state
        .progress()
        .log()
        .iter()
        .filter(|entry| entry.message.starts_with("task failed"))
        .count();
    assert_eq!(failures, 1);
}

#[test]
fn completion_summary_is_recorded() {
    init_logging();
    let (state, _) = push(launched(), progress(3, 3), 1);
    let (state, _) = push(
        state,
        TaskEvent::Completed(tasksync_core::CompletionSummary {
            successful: Some(2),
            failed: Some(1),
            percent: None,
        }),
        2,
    );

    assert_eq!(state.progress().summary(), (Some(2), Some(1)));
    assert_eq!(
        state.progress().log().last().map(|entry| entry.message.as_str()),
        Some("task completed: 2 succeeded, 1 failed")
    );
    assert_eq!(state.progress().progress_percent(), 100);
}
