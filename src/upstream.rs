use async_trait::async_trait;
use reqwest::StatusCode;
use std::sync::Arc;
use thiserror::Error;

use crate::models::{AiModel, GenerationOptions};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum UpstreamError {
    /// Retry on the next poll; the job stays pending.
    #[error("transient upstream failure: {0}")]
    Transient(String),
    /// The provider rejected the work for good; the job fails.
    #[error("upstream rejected the request: {0}")]
    Permanent(String),
    #[error("{0}")]
    Configuration(String),
}

impl UpstreamError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, UpstreamError::Transient(_))
    }

    /// Network-level failures are always worth another try.
    pub fn from_reqwest(err: reqwest::Error) -> Self {
        UpstreamError::Transient(err.to_string())
    }

    pub fn from_status(status: StatusCode, body: &str) -> Self {
        let detail = format!("status={} body={}", status, truncate(body, 300));
        if status.is_server_error()
            || status == StatusCode::TOO_MANY_REQUESTS
            || status == StatusCode::REQUEST_TIMEOUT
        {
            UpstreamError::Transient(detail)
        } else {
            UpstreamError::Permanent(detail)
        }
    }
}

/// What a provider reports about one of its tasks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteTaskState {
    Generating,
    Succeeded { locator: String },
    Failed { reason: String },
}

impl RemoteTaskState {
    /// Decodes the `successFlag` convention: 0 generating, 1 success,
    /// 2 and 3 failure. Anything else is treated as a protocol hiccup.
    pub fn from_success_flag(
        flag: i64,
        locator: Option<String>,
        reason: Option<String>,
    ) -> Result<Self, UpstreamError> {
        match flag {
            0 => Ok(RemoteTaskState::Generating),
            1 => locator
                .filter(|l| !l.is_empty())
                .map(|locator| RemoteTaskState::Succeeded { locator })
                .ok_or_else(|| UpstreamError::Permanent("task succeeded without a result".into())),
            2 | 3 => Ok(RemoteTaskState::Failed {
                reason: reason.filter(|r| !r.is_empty()).unwrap_or_else(|| "generation failed".into()),
            }),
            other => Err(UpstreamError::Transient(format!("unexpected successFlag {other}"))),
        }
    }
}

/// A remote image generation service that runs work asynchronously.
#[async_trait]
pub trait UpstreamProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// Fails fast when credentials are missing, before any job exists.
    fn check_configured(&self) -> Result<(), UpstreamError>;

    /// Starts generation and returns the provider's task id.
    async fn submit(&self, options: &GenerationOptions) -> Result<String, UpstreamError>;

    async fn query(&self, task_id: &str) -> Result<RemoteTaskState, UpstreamError>;
}

/// Provider routing by the request's model selector.
#[derive(Clone)]
pub struct Providers {
    pub standard: Arc<dyn UpstreamProvider>,
    pub alternate: Arc<dyn UpstreamProvider>,
}

impl Providers {
    pub fn for_model(&self, model: AiModel) -> &Arc<dyn UpstreamProvider> {
        match model {
            AiModel::Standard => &self.standard,
            AiModel::Alternate => &self.alternate,
        }
    }
}

/// Reads an API key from the environment at call time.
pub fn api_key_from_env(var: &str) -> Result<String, UpstreamError> {
    match std::env::var(var) {
        Ok(key) if !key.trim().is_empty() => Ok(key),
        _ => Err(UpstreamError::Configuration(format!("{var} is not set; the upstream provider cannot be called"))),
    }
}

pub(crate) fn truncate(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}…", &s[..idx]),
        None => s.to_string(),
    }
}
