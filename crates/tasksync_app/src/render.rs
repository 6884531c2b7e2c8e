use chrono::Local;
use tasksync_core::{
    ErrorKind, ErrorNotice, LogEntry, Severity, TaskId, TaskProgressState, TaskStatus,
};
use tasksync_engine::{SearchResults, Subscriber};

/// Prints one line per notification to stdout.
#[derive(Debug, Default)]
pub struct TerminalSubscriber;

impl Subscriber for TerminalSubscriber {
    fn on_connected(&self, task_id: &TaskId) {
        println!("connected to task {task_id}");
    }

    fn on_progress(&self, state: &TaskProgressState) {
        println!("{}", progress_line(state));
    }

    fn on_step(&self, entry: &LogEntry) {
        println!("{}", log_line(entry));
    }

    fn on_item_completed(&self, item: Option<&str>, state: &TaskProgressState) {
        println!(
            "{}  done {}",
            progress_line(state),
            item.unwrap_or("(unnamed item)")
        );
    }

    fn on_completed(&self, state: &TaskProgressState) {
        println!("{}", completion_line(state));
    }

    fn on_error(&self, error: &ErrorNotice) {
        let label = match error.kind {
            ErrorKind::ItemFailed => "item failed",
            ErrorKind::TaskFailed => "task failed",
            ErrorKind::TransportExhausted => "push channel lost",
            ErrorKind::PollUnresolved => "status unknown",
        };
        eprintln!("{label}: {}", error.message);
    }

    fn on_close(&self, code: u16, reason: &str) {
        if reason.is_empty() {
            println!("connection closed ({code})");
        } else {
            println!("connection closed ({code}): {reason}");
        }
    }
}

const BAR_WIDTH: usize = 24;

pub fn progress_line(state: &TaskProgressState) -> String {
    let percent = state.progress_percent();
    let filled = usize::from(percent) * BAR_WIDTH / 100;
    let mut line = format!(
        "[{}{}] {:>3}%",
        "#".repeat(filled),
        "-".repeat(BAR_WIDTH - filled),
        percent
    );
    if state.total() > 0 {
        line.push_str(&format!("  {}/{}", state.current(), state.total()));
    }
    if let Some(item) = state.current_item() {
        line.push_str("  ");
        line.push_str(item);
    }
    line
}

pub fn log_line(entry: &LogEntry) -> String {
    let marker = match entry.severity {
        Severity::Info => " ",
        Severity::Success => "+",
        Severity::Warning => "!",
        Severity::Error => "x",
    };
    format!(
        "{} {marker} {}",
        entry.timestamp.with_timezone(&Local).format("%H:%M:%S"),
        entry.message
    )
}

pub fn completion_line(state: &TaskProgressState) -> String {
    match state.status() {
        TaskStatus::Failed => format!(
            "task {} failed: {}",
            state.task_id(),
            state.error().unwrap_or("unknown error")
        ),
        _ => match state.summary() {
            (Some(ok), Some(failed)) => format!(
                "task {} completed: {ok} succeeded, {failed} failed",
                state.task_id()
            ),
            _ => format!("task {} completed", state.task_id()),
        },
    }
}

pub fn print_search_results(results: &SearchResults) {
    println!("{} talk(s) found", results.total);
    for (index, talk) in results.candidates.iter().enumerate() {
        let speaker = talk.speaker.as_deref().unwrap_or("unknown speaker");
        let duration = talk.duration.as_deref().unwrap_or("?");
        println!("{:>2}. {} ({speaker}, {duration})", index + 1, talk.title);
        println!("    {}", talk.url);
        if let Some(score) = talk.relevance_score {
            println!("    relevance {score:.2}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tasksync_core::{
        update, CompletionSummary, Msg, ProgressPayload, SyncState, TaskEvent,
    };

    fn admitted(events: Vec<TaskEvent>) -> TaskProgressState {
        let (mut state, _) = update(SyncState::new(TaskId::from("t-1")), Msg::Launch);
        state = update(state, Msg::PushOpened).0;
        for event in events {
            state = update(
                state,
                Msg::PushEvent {
                    event,
                    at: Utc::now(),
                },
            )
            .0;
        }
        state.progress().clone()
    }

    #[test]
    fn fresh_task_renders_an_empty_bar() {
        let state = TaskProgressState::new(TaskId::from("t-1"));
        assert_eq!(progress_line(&state), format!("[{}]   0%", "-".repeat(BAR_WIDTH)));
    }

    #[test]
    fn progress_shows_counts_and_item() {
        let state = admitted(vec![TaskEvent::Progress(ProgressPayload {
            current: Some(1),
            total: Some(4),
            current_item: Some("https://www.ted.com/talks/a".to_string()),
            ..ProgressPayload::default()
        })]);
        let line = progress_line(&state);
        assert!(line.starts_with(&format!("[{}{}]  25%", "#".repeat(6), "-".repeat(18))));
        assert!(line.ends_with("1/4  https://www.ted.com/talks/a"));
    }

    #[test]
    fn completion_reports_summary() {
        let state = admitted(vec![TaskEvent::Completed(CompletionSummary {
            successful: Some(3),
            failed: Some(1),
            percent: None,
        })]);
        assert_eq!(completion_line(&state), "task t-1 completed: 3 succeeded, 1 failed");
    }
}
