use serde::Deserialize;
use tasksync_core::{
    CompletionSummary, ControlFrame, ErrorPayload, ItemCompleted, ProgressPayload, StepPayload,
    TaskEvent, TaskSnapshot, TaskStatus,
};

use crate::DecodeError;

/// Every field any push frame may carry. Unknown fields are ignored.
#[derive(Debug, Deserialize)]
struct WireFrame {
    #[serde(rename = "type")]
    kind: Option<String>,
    progress: Option<f64>,
    current: Option<u64>,
    total: Option<u64>,
    #[serde(rename = "currentUrl", alias = "current_url")]
    current_url: Option<String>,
    url: Option<String>,
    step: Option<String>,
    log: Option<String>,
    message: Option<String>,
    successful: Option<u64>,
    failed: Option<u64>,
    error: Option<String>,
    #[serde(alias = "resultCount")]
    result_count: Option<u64>,
}

impl WireFrame {
    /// `currentUrl` wins over `url`.
    fn item(&mut self) -> Option<String> {
        self.current_url.take().or_else(|| self.url.take())
    }

    fn progress_payload(mut self) -> ProgressPayload {
        ProgressPayload {
            percent: self.progress,
            current: self.current,
            total: self.total,
            current_item: self.item(),
            message: self.message,
        }
    }
}

/// Parses one push frame into a typed event.
///
/// Malformed JSON, a missing `type` and unrecognized types are all decode
/// errors; the caller drops the frame and keeps the connection.
pub fn decode_frame(raw: &str) -> Result<TaskEvent, DecodeError> {
    let mut frame: WireFrame =
        serde_json::from_str(raw).map_err(|err| DecodeError::Malformed(err.to_string()))?;
    let kind = frame.kind.take().ok_or(DecodeError::MissingType)?;

    let event = match kind.as_str() {
        "started" => TaskEvent::Started(frame.progress_payload()),
        "progress" => TaskEvent::Progress(frame.progress_payload()),
        "step" => TaskEvent::Step(StepPayload {
            step: frame.step,
            log: frame.log,
            message: frame.message,
        }),
        "url_completed" | "item_completed" => TaskEvent::ItemCompleted(ItemCompleted {
            item: frame.item(),
            current: frame.current,
            total: frame.total,
            result_count: frame.result_count,
            message: frame.message,
        }),
        "completed" | "task_completed" => TaskEvent::Completed(CompletionSummary {
            successful: frame.successful,
            failed: frame.failed,
            percent: frame.progress,
        }),
        "error" => TaskEvent::Error(ErrorPayload {
            item: frame.item(),
            current: frame.current,
            message: frame
                .error
                .or(frame.message)
                .unwrap_or_else(|| "unknown error".to_string()),
        }),
        "connected" => TaskEvent::Control(ControlFrame::Connected),
        "pong" => TaskEvent::Control(ControlFrame::Pong),
        other => return Err(DecodeError::UnknownType(other.to_string())),
    };
    Ok(event)
}

#[derive(Debug, Deserialize)]
struct WireSnapshot {
    status: String,
    progress: Option<f64>,
    current: Option<u64>,
    total: Option<u64>,
    #[serde(alias = "currentUrl")]
    current_url: Option<String>,
    results: Option<Vec<serde_json::Value>>,
    error: Option<String>,
    errors: Option<Vec<String>>,
}

/// Parses a status endpoint body into a full snapshot.
pub fn decode_snapshot(body: &[u8]) -> Result<TaskSnapshot, DecodeError> {
    let wire: WireSnapshot =
        serde_json::from_slice(body).map_err(|err| DecodeError::Malformed(err.to_string()))?;
    Ok(TaskSnapshot {
        status: parse_status(&wire.status)?,
        percent: wire.progress,
        current: wire.current,
        total: wire.total,
        current_item: wire.current_url,
        result_count: wire.results.as_ref().map(Vec::len),
        error: wire.error,
        errors: wire.errors.unwrap_or_default(),
    })
}

fn parse_status(raw: &str) -> Result<TaskStatus, DecodeError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "pending" => Ok(TaskStatus::Pending),
        "running" | "processing" => Ok(TaskStatus::Running),
        "completed" => Ok(TaskStatus::Completed),
        "failed" => Ok(TaskStatus::Failed),
        _ => Err(DecodeError::UnknownStatus(raw.to_string())),
    }
}
