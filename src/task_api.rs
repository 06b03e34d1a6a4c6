//! Generic hosted task API used for the "alternate" model.
//!
//! Submission returns a `taskId`; the record endpoint reports progress
//! through a numeric `successFlag`.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::json;
use tracing::info;

use crate::{
    models::GenerationOptions,
    prompt::build_image_prompt,
    upstream::{api_key_from_env, RemoteTaskState, UpstreamError, UpstreamProvider},
};

pub const API_KEY_VAR: &str = "TASK_API_KEY";
pub const DEFAULT_BASE_URL: &str = "https://api.kie.ai/api/v1/gpt4o-image";

pub struct TaskApiClient {
    client: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    code: u16,
    #[serde(default)]
    msg: String,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Submitted {
    task_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TaskRecord {
    success_flag: i64,
    #[serde(default)]
    response: Option<TaskResponse>,
    #[serde(default)]
    error_message: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct TaskResponse {
    #[serde(default)]
    result_urls: Vec<String>,
}

impl TaskApiClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self { client: Client::new(), base_url: base_url.into().trim_end_matches('/').to_string() }
    }

    async fn call<T: DeserializeOwned>(&self, request: reqwest::RequestBuilder) -> Result<T, UpstreamError> {
        let api_key = api_key_from_env(API_KEY_VAR)?;
        let response = request.bearer_auth(api_key).send().await.map_err(UpstreamError::from_reqwest)?;
        let status = response.status();
        let body = response.text().await.map_err(UpstreamError::from_reqwest)?;
        if !status.is_success() {
            return Err(UpstreamError::from_status(status, &body));
        }
        decode_envelope(&body)
    }
}

/// The API wraps everything in `{ code, msg, data }`; a non-200 `code`
/// is classified like an HTTP status.
fn decode_envelope<T: DeserializeOwned>(body: &str) -> Result<T, UpstreamError> {
    let envelope: Envelope<T> = serde_json::from_str(body)
        .map_err(|e| UpstreamError::Transient(format!("parse error: {e}")))?;
    if envelope.code != 200 {
        let status = StatusCode::from_u16(envelope.code).unwrap_or(StatusCode::BAD_GATEWAY);
        return Err(UpstreamError::from_status(status, &envelope.msg));
    }
    envelope.data.ok_or_else(|| UpstreamError::Transient(format!("empty response: {}", envelope.msg)))
}

fn record_state(record: TaskRecord) -> Result<RemoteTaskState, UpstreamError> {
    let locator = record.response.and_then(|r| r.result_urls.into_iter().next());
    RemoteTaskState::from_success_flag(record.success_flag, locator, record.error_message)
}

#[async_trait]
impl UpstreamProvider for TaskApiClient {
    fn name(&self) -> &'static str {
        "task-api"
    }

    fn check_configured(&self) -> Result<(), UpstreamError> {
        api_key_from_env(API_KEY_VAR).map(|_| ())
    }

    async fn submit(&self, options: &GenerationOptions) -> Result<String, UpstreamError> {
        let url = format!("{}/generate", self.base_url);
        let body = json!({
            "prompt": build_image_prompt(options),
            "size": options.aspect_ratio.ratio(),
            "nVariants": 1
        });
        let submitted: Submitted = self.call(self.client.post(&url).json(&body)).await?;
        info!(task_id = %submitted.task_id, "🔗 Task API accepted generation");
        Ok(submitted.task_id)
    }

    async fn query(&self, task_id: &str) -> Result<RemoteTaskState, UpstreamError> {
        let url = format!("{}/record-info", self.base_url);
        let record: TaskRecord = self.call(self.client.get(&url).query(&[("taskId", task_id)])).await?;
        record_state(record)
    }
}
