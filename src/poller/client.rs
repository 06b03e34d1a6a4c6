use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

use super::machine::TickOutcome;
use crate::models::{GenerationOptions, StatusResponse, SubmitResponse};

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Server returned error {0}: {1}")]
    Server(StatusCode, String),
}

/// The two calls the poller needs from the generation service.
#[async_trait]
pub trait GenerationApi: Send + Sync {
    async fn submit(&self, options: &GenerationOptions) -> Result<String, ClientError>;
    async fn status(&self, job_id: &str) -> Result<TickOutcome, ClientError>;
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

#[derive(Clone)]
pub struct HttpGenerationApi {
    base_url: String,
    client: Client,
}

impl HttpGenerationApi {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ClientError> {
        Self::with_request_timeout(base_url, DEFAULT_REQUEST_TIMEOUT)
    }

    /// Every request is abandoned after `timeout`, so one stuck call
    /// cannot hold a tick open.
    pub fn with_request_timeout(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ClientError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { base_url: base_url.into().trim_end_matches('/').to_string(), client })
    }

    fn server_error(status: StatusCode, text: String) -> ClientError {
        let message = serde_json::from_str::<ErrorBody>(&text).map(|b| b.error).unwrap_or(text);
        ClientError::Server(status, message)
    }
}

#[async_trait]
impl GenerationApi for HttpGenerationApi {
    async fn submit(&self, options: &GenerationOptions) -> Result<String, ClientError> {
        let url = format!("{}/api/generate", self.base_url);
        let response = self.client.post(&url).json(options).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Self::server_error(status, response.text().await.unwrap_or_default()));
        }
        let body: SubmitResponse = response.json().await?;
        Ok(body.job_id)
    }

    async fn status(&self, job_id: &str) -> Result<TickOutcome, ClientError> {
        let url = format!("{}/api/status/{}", self.base_url, job_id);
        let response = self.client.get(&url).send().await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(TickOutcome::NotFound),
            s if s.is_success() => Ok(match response.json::<StatusResponse>().await? {
                StatusResponse::Pending => TickOutcome::Pending,
                StatusResponse::Complete { result } => TickOutcome::Complete(result),
                StatusResponse::Failed { error } => TickOutcome::Failed(error),
            }),
            status => {
                let text = response.text().await.unwrap_or_default();
                // Some deployments report a failed job with a 500.
                match serde_json::from_str::<StatusResponse>(&text) {
                    Ok(StatusResponse::Failed { error }) => Ok(TickOutcome::Failed(error)),
                    _ => Err(Self::server_error(status, text)),
                }
            }
        }
    }
}
