use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn, error};

use crate::{
    models::GenerationOptions,
    prompt::build_image_prompt,
    upstream::{api_key_from_env, truncate, RemoteTaskState, UpstreamError, UpstreamProvider},
};

pub const API_KEY_VAR: &str = "GEMINI_API_KEY";
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_IMAGE_MODEL: &str = "imagen-4.0-fast-generate-001";
pub const DEFAULT_TEXT_MODEL: &str = "gemini-2.5-flash";

// Helper function to truncate base64 data in JSON for cleaner logging
fn truncate_base64_in_json(value: &mut serde_json::Value) {
    match value {
        serde_json::Value::Object(map) => {
            for (key, val) in map.iter_mut() {
                if key == "data" || key == "bytesBase64Encoded" {
                    if let serde_json::Value::String(s) = val {
                        if s.len() > 100 {
                            let head: String = s.chars().take(50).collect();
                            *val = serde_json::Value::String(format!("{}...[truncated {} chars]", head, s.len() - head.len()));
                        }
                    }
                } else {
                    truncate_base64_in_json(val);
                }
            }
        }
        serde_json::Value::Array(arr) => {
            for val in arr.iter_mut() {
                truncate_base64_in_json(val);
            }
        }
        _ => {}
    }
}

fn loggable(body: &str) -> String {
    match serde_json::from_str::<serde_json::Value>(body) {
        Ok(mut value) => {
            truncate_base64_in_json(&mut value);
            truncate(&value.to_string(), 1000)
        }
        Err(_) => truncate(body, 1000),
    }
}

/// Google Generative Language API: long-running image operations for the
/// "standard" model and plain `generateContent` for text.
pub struct GeminiClient {
    client: Client,
    base_url: String,
    image_model: String,
    text_model: String,
}

impl GeminiClient {
    pub fn new(base_url: impl Into<String>, image_model: impl Into<String>, text_model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            image_model: image_model.into(),
            text_model: text_model.into(),
        }
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<String, UpstreamError> {
        let api_key = api_key_from_env(API_KEY_VAR)?;
        let response = request
            .header("x-goog-api-key", api_key)
            .send()
            .await
            .map_err(UpstreamError::from_reqwest)?;

        let status = response.status();
        let body = response.text().await.map_err(UpstreamError::from_reqwest)?;
        info!(%status, "📥 Gemini response");

        if !status.is_success() {
            error!(%status, body = %loggable(&body), "❌ Gemini API error response");
            return Err(UpstreamError::from_status(status, &body));
        }
        Ok(body)
    }

    pub async fn generate_text(&self, prompt: &str) -> Result<String, UpstreamError> {
        let url = format!("{}/models/{}:generateContent", self.base_url, self.text_model);
        info!(model = %self.text_model, prompt = %truncate(prompt, 120), "Generating text with Gemini API...");

        let payload = json!({
            "contents": [{
                "parts": [{"text": prompt}]
            }],
            "generationConfig": {
                "temperature": 0.4,
                "topK": 40,
                "topP": 0.95,
                "maxOutputTokens": 800
            }
        });

        let body = self.send(self.client.post(&url).json(&payload)).await?;
        let parsed: GeminiResponse = serde_json::from_str(&body)
            .map_err(|e| UpstreamError::Permanent(format!("Failed to parse response: {}", e)))?;

        for candidate in &parsed.candidates {
            for part in &candidate.content.parts {
                if let Part::Text { text } = part {
                    let text = text.trim();
                    if !text.is_empty() {
                        return Ok(text.to_string());
                    }
                }
            }
        }

        Err(UpstreamError::Permanent("No text content found in response".to_string()))
    }
}

#[async_trait]
impl UpstreamProvider for GeminiClient {
    fn name(&self) -> &'static str {
        "gemini"
    }

    fn check_configured(&self) -> Result<(), UpstreamError> {
        api_key_from_env(API_KEY_VAR).map(|_| ())
    }

    async fn submit(&self, options: &GenerationOptions) -> Result<String, UpstreamError> {
        let url = format!("{}/models/{}:predictLongRunning", self.base_url, self.image_model);
        let request_body = json!({
            "instances": [{ "prompt": build_image_prompt(options) }],
            "parameters": {
                "sampleCount": 1,
                "aspectRatio": options.aspect_ratio.ratio()
            }
        });

        info!(model = %self.image_model, "🔗 Starting Gemini image operation");
        let body = self.send(self.client.post(&url).json(&request_body)).await?;
        let started: Operation = serde_json::from_str(&body)
            .map_err(|e| UpstreamError::Transient(format!("parse error: {e}")))?;
        if started.name.is_empty() {
            return Err(UpstreamError::Permanent("operation started without a name".into()));
        }
        Ok(started.name)
    }

    async fn query(&self, task_id: &str) -> Result<RemoteTaskState, UpstreamError> {
        let url = format!("{}/{}", self.base_url, task_id.trim_start_matches('/'));
        let body = self.send(self.client.get(&url)).await?;
        let op: Operation = serde_json::from_str(&body)
            .map_err(|e| UpstreamError::Transient(format!("parse error: {e}")))?;
        Ok(op.into_state())
    }
}

// --- Response Parsing Helpers ---

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate { #[serde(default)] content: Content }

#[derive(Debug, Deserialize, Default)]
struct Content { #[serde(default)] parts: Vec<Part> }

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Part {
    Text { text: String },
    #[allow(dead_code)]
    Other(serde_json::Value),
}

#[derive(Debug, Deserialize, Default)]
struct Operation {
    #[serde(default)]
    name: String,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<OperationError>,
    #[serde(default)]
    response: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct OperationError {
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Prediction {
    #[serde(default)]
    bytes_base64_encoded: Option<String>,
    #[serde(default)]
    mime_type: Option<String>,
    #[serde(default)]
    uri: Option<String>,
}

impl Operation {
    fn into_state(self) -> RemoteTaskState {
        if !self.done {
            return RemoteTaskState::Generating;
        }
        if let Some(err) = self.error {
            let reason = if err.message.is_empty() { "generation failed".to_string() } else { err.message };
            return RemoteTaskState::Failed { reason };
        }
        match self.response.as_ref().and_then(extract_first_image) {
            Some(locator) => RemoteTaskState::Succeeded { locator },
            None => {
                warn!("⚠️ Operation finished without image data");
                RemoteTaskState::Failed { reason: "no image data in response".into() }
            }
        }
    }
}

/// Finds the first image either as a hosted URI or as inline bytes,
/// which are turned into a `data:` URI.
fn extract_first_image(response: &serde_json::Value) -> Option<String> {
    let predictions = response.get("predictions")
        .or_else(|| response.pointer("/generateImageResponse/generatedSamples"))?
        .as_array()?;
    for value in predictions {
        let value = value.get("image").unwrap_or(value);
        let Ok(p) = serde_json::from_value::<Prediction>(value.clone()) else { continue };
        if let Some(uri) = p.uri.filter(|u| !u.is_empty()) {
            return Some(uri);
        }
        if let Some(data) = p.bytes_base64_encoded.filter(|d| !d.is_empty()) {
            let mime = p.mime_type.unwrap_or_else(|| sniff_mime(&data).to_string());
            info!(%mime, chars = data.len(), "🖼️ Extracted inline image");
            return Some(format!("data:{mime};base64,{data}"));
        }
    }
    None
}

fn sniff_mime(b64: &str) -> &'static str {
    let head = base64::engine::general_purpose::STANDARD
        .decode(b64.get(..b64.len().min(16)).unwrap_or(b64))
        .unwrap_or_default();
    if head.starts_with(&[0x89, b'P', b'N', b'G']) {
        "image/png"
    } else if head.starts_with(&[0xFF, 0xD8]) {
        "image/jpeg"
    } else if head.starts_with(b"<svg") {
        "image/svg+xml"
    } else {
        "application/octet-stream"
    }
}
