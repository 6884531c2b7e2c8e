use std::time::Duration;

use tasksync_core::{ReconnectPolicy, TaskId};
use url::Url;

use crate::{ApiError, ApiFailureKind, TransportError};

/// Everything the engine needs to reach one server.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncSettings {
    pub api_base: String,
    pub ws_base: String,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    /// Period of the `{"type":"ping"}` liveness frame while the socket is open.
    pub heartbeat_interval: Duration,
    /// Window after open in which at least one push event is expected.
    pub first_event_timeout: Duration,
    pub poll_interval: Duration,
    pub poll_retry_delay: Duration,
    /// Degraded polling gives up after this long. `None` polls until terminal.
    pub poll_ceiling: Option<Duration>,
    pub reconnect: ReconnectPolicy,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            api_base: "http://localhost:8000".to_string(),
            ws_base: "ws://localhost:8000".to_string(),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            heartbeat_interval: Duration::from_secs(30),
            first_event_timeout: Duration::from_secs(30),
            poll_interval: Duration::from_secs(2),
            poll_retry_delay: Duration::from_secs(1),
            poll_ceiling: None,
            reconnect: ReconnectPolicy::default(),
        }
    }
}

impl SyncSettings {
    /// `{ws_base}/ws/progress/{task_id}`
    pub fn push_url(&self, task_id: &TaskId) -> Result<Url, TransportError> {
        join(&self.ws_base, &["ws", "progress", task_id.as_str()])
            .map_err(TransportError::InvalidUrl)
    }

    pub fn api_url(&self, segments: &[&str]) -> Result<Url, ApiError> {
        join(&self.api_base, segments).map_err(|err| ApiError::new(ApiFailureKind::InvalidUrl, err))
    }
}

fn join(base: &str, segments: &[&str]) -> Result<Url, String> {
    let mut url = Url::parse(base).map_err(|err| format!("{base}: {err}"))?;
    url.path_segments_mut()
        .map_err(|()| format!("{base}: cannot be a base"))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}
