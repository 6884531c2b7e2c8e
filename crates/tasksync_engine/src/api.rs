use reqwest::header::CONTENT_TYPE;
use serde::{Deserialize, Serialize};
use tasksync_core::{TaskId, TaskSnapshot};
use tasksync_logging::{sync_debug, sync_info};

use crate::{decode_snapshot, ApiError, ApiFailureKind, SyncSettings};

/// Point-in-time status lookups. The pull channel's only seam.
#[async_trait::async_trait]
pub trait StatusSource: Send + Sync {
    async fn task_status(&self, task_id: &TaskId) -> Result<TaskSnapshot, ApiError>;
}

#[derive(Deserialize)]
struct BatchStarted {
    task_id: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TedCandidate {
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub speaker: Option<String>,
    #[serde(default)]
    pub duration: Option<String>,
    #[serde(default)]
    pub views: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub relevance_score: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SearchResults {
    pub candidates: Vec<TedCandidate>,
    #[serde(default)]
    pub total: usize,
}

#[derive(Serialize)]
struct BatchRequest<'a> {
    urls: &'a [String],
    user_id: &'a str,
}

#[derive(Serialize)]
struct SearchRequest<'a> {
    topic: &'a str,
    user_id: &'a str,
}

/// REST client for the task server.
#[derive(Debug, Clone)]
pub struct ApiClient {
    settings: SyncSettings,
    client: reqwest::Client,
}

impl ApiClient {
    pub fn new(settings: SyncSettings) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout)
            .timeout(settings.request_timeout)
            .build()
            .map_err(|err| ApiError::new(ApiFailureKind::Network, err.to_string()))?;
        Ok(Self { settings, client })
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    /// Submits a batch of talk urls and returns the id of the new task.
    pub async fn start_batch(&self, urls: &[String], user_id: &str) -> Result<TaskId, ApiError> {
        if urls.is_empty() {
            return Err(ApiError::new(ApiFailureKind::Rejected, "no urls to process"));
        }
        let url = self.settings.api_url(&["process-batch"])?;
        let response = self
            .client
            .post(url)
            .json(&BatchRequest { urls, user_id })
            .send()
            .await
            .map_err(map_reqwest_error)?;
        let started: BatchStarted = read_json(response).await?;
        sync_info!(
            "started batch task {} for {} urls",
            started.task_id,
            urls.len()
        );
        Ok(TaskId::from(started.task_id))
    }

    pub async fn search(&self, topic: &str, user_id: &str) -> Result<SearchResults, ApiError> {
        let url = self.settings.api_url(&["search-ted"])?;
        let response = self
            .client
            .post(url)
            .json(&SearchRequest { topic, user_id })
            .send()
            .await
            .map_err(map_reqwest_error)?;
        let results: SearchResults = read_json(response).await?;
        sync_debug!("search {:?}: {} candidates", topic, results.candidates.len());
        Ok(results)
    }
}

#[async_trait::async_trait]
impl StatusSource for ApiClient {
    async fn task_status(&self, task_id: &TaskId) -> Result<TaskSnapshot, ApiError> {
        let url = self.settings.api_url(&["task", task_id.as_str()])?;
        let response = self.client.get(url).send().await.map_err(map_reqwest_error)?;
        let body = success_body(response).await?;
        decode_snapshot(&body).map_err(|err| ApiError::new(ApiFailureKind::Decode, err.to_string()))
    }
}

async fn success_body(response: reqwest::Response) -> Result<Vec<u8>, ApiError> {
    let status = response.status();
    if !status.is_success() {
        return Err(ApiError::new(
            ApiFailureKind::HttpStatus(status.as_u16()),
            status.to_string(),
        ));
    }
    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.to_string());
    if let Some(ct) = content_type.as_deref() {
        if !ct.split(';').any(|part| part.trim().eq_ignore_ascii_case("application/json")) {
            return Err(ApiError::new(
                ApiFailureKind::Decode,
                format!("unexpected content type {ct}"),
            ));
        }
    }
    let bytes = response.bytes().await.map_err(map_reqwest_error)?;
    Ok(bytes.to_vec())
}

async fn read_json<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, ApiError> {
    let body = success_body(response).await?;
    serde_json::from_slice(&body).map_err(|err| ApiError::new(ApiFailureKind::Decode, err.to_string()))
}

fn map_reqwest_error(err: reqwest::Error) -> ApiError {
    if err.is_timeout() {
        return ApiError::new(ApiFailureKind::Timeout, err.to_string());
    }
    if err.is_builder() {
        return ApiError::new(ApiFailureKind::InvalidUrl, err.to_string());
    }
    ApiError::new(ApiFailureKind::Network, err.to_string())
}
