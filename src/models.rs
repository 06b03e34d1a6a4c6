use serde::{Serialize, Deserialize};
use serde_with::{serde_as, DurationMilliSeconds};
use chrono::{DateTime, Utc};
use std::{fmt, str::FromStr, time::Duration};

use crate::error::AppError;

pub const MAX_PROMPT_CHARS: usize = 500;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ArtStyle {
    Photorealistic,
    Artistic,
    Fantasy,
    Vintage,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum AspectRatio {
    Landscape,
    Square,
    Portrait,
}

/// Selects which provider path a job takes in upstream mode.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum AiModel {
    #[default]
    Standard,
    Alternate,
}

impl ArtStyle {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtStyle::Photorealistic => "photorealistic",
            ArtStyle::Artistic => "artistic",
            ArtStyle::Fantasy => "fantasy",
            ArtStyle::Vintage => "vintage",
        }
    }
}

impl AspectRatio {
    /// Pixel size of the placeholder artwork for this ratio.
    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            AspectRatio::Landscape => (1024, 576),
            AspectRatio::Portrait => (576, 1024),
            AspectRatio::Square => (1024, 1024),
        }
    }

    pub fn ratio(&self) -> &'static str {
        match self {
            AspectRatio::Landscape => "16:9",
            AspectRatio::Square => "1:1",
            AspectRatio::Portrait => "9:16",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AspectRatio::Landscape => "landscape",
            AspectRatio::Square => "square",
            AspectRatio::Portrait => "portrait",
        }
    }
}

impl AiModel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AiModel::Standard => "standard",
            AiModel::Alternate => "alternate",
        }
    }
}

impl FromStr for ArtStyle {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "photorealistic" => Ok(ArtStyle::Photorealistic),
            "artistic" => Ok(ArtStyle::Artistic),
            "fantasy" => Ok(ArtStyle::Fantasy),
            "vintage" => Ok(ArtStyle::Vintage),
            other => Err(format!("unknown style '{other}'")),
        }
    }
}

impl FromStr for AspectRatio {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Both the named form and the ratio form are accepted.
        match s.trim().to_ascii_lowercase().as_str() {
            "landscape" | "16:9" => Ok(AspectRatio::Landscape),
            "square" | "1:1" => Ok(AspectRatio::Square),
            "portrait" | "9:16" => Ok(AspectRatio::Portrait),
            other => Err(format!("unknown aspect ratio '{other}'")),
        }
    }
}

impl FromStr for AiModel {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "standard" => Ok(AiModel::Standard),
            "alternate" => Ok(AiModel::Alternate),
            other => Err(format!("unknown model '{other}'")),
        }
    }
}

/// Raw body of `POST /api/generate`, before validation.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub style: Option<String>,
    #[serde(default)]
    pub aspect_ratio: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
}

/// Validated generation options. Immutable once stored on a job.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GenerationOptions {
    pub prompt: String,
    pub style: ArtStyle,
    pub aspect_ratio: AspectRatio,
    #[serde(default)]
    pub model: AiModel,
}

impl GenerationOptions {
    pub fn new(prompt: impl Into<String>, style: ArtStyle, aspect_ratio: AspectRatio) -> Self {
        Self { prompt: prompt.into(), style, aspect_ratio, model: AiModel::default() }
    }

    pub fn with_model(mut self, model: AiModel) -> Self {
        self.model = model;
        self
    }
}

impl TryFrom<GenerateRequest> for GenerationOptions {
    type Error = AppError;

    fn try_from(body: GenerateRequest) -> Result<Self, Self::Error> {
        let prompt = body.prompt.as_deref().map(str::trim).unwrap_or_default();
        if prompt.is_empty() {
            return Err(AppError::Validation("prompt is required".into()));
        }
        if prompt.chars().count() > MAX_PROMPT_CHARS {
            return Err(AppError::Validation(format!("prompt must be at most {MAX_PROMPT_CHARS} characters")));
        }
        let style = body.style.as_deref()
            .ok_or_else(|| AppError::Validation("style is required".into()))?
            .parse::<ArtStyle>()
            .map_err(AppError::Validation)?;
        let aspect_ratio = body.aspect_ratio.as_deref()
            .ok_or_else(|| AppError::Validation("aspectRatio is required".into()))?
            .parse::<AspectRatio>()
            .map_err(AppError::Validation)?;
        let model = match body.model.as_deref() {
            Some(m) if !m.trim().is_empty() => m.parse::<AiModel>().map_err(AppError::Validation)?,
            _ => AiModel::default(),
        };
        Ok(Self { prompt: prompt.to_string(), style, aspect_ratio, model })
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Complete,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobStatus::Pending)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobStatus::Pending => "pending",
            JobStatus::Complete => "complete",
            JobStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// The only ways a stored job may change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobTransition {
    AttachRemote(String),
    Complete(String),
    Fail(String),
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct JobRecord {
    pub id: String,
    pub status: JobStatus,
    pub request: GenerationOptions,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_task_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobRecord {
    pub fn pending(id: impl Into<String>, request: GenerationOptions, now: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            status: JobStatus::Pending,
            request,
            result: None,
            error: None,
            remote_task_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Applies `transition` unless the job is already terminal.
    /// Returns whether the record changed.
    pub fn apply(&mut self, transition: JobTransition, now: DateTime<Utc>) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        match transition {
            JobTransition::AttachRemote(task_id) => {
                self.remote_task_id = Some(task_id);
            }
            JobTransition::Complete(result) => {
                self.status = JobStatus::Complete;
                self.result = Some(result);
            }
            JobTransition::Fail(reason) => {
                self.status = JobStatus::Failed;
                self.error = Some(reason);
            }
        }
        self.updated_at = now;
        true
    }

    pub fn elapsed(&self, now: DateTime<Utc>) -> Duration {
        (now - self.created_at).to_std().unwrap_or_default()
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponse {
    pub job_id: String,
}

/// Wire form of `GET /api/status/{jobId}`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum StatusResponse {
    Pending,
    Complete { result: String },
    Failed { error: String },
}

/// A finished image as handed to the presentation layer.
#[serde_as]
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedImage {
    pub id: String,
    pub url: String,
    pub prompt: String,
    pub style: ArtStyle,
    pub aspect_ratio: AspectRatio,
    pub created_at: DateTime<Utc>,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub generation_time: Duration,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct CurateRequest {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub custom_prompt: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct CuratedContent {
    pub url: String,
    pub summary: String,
    pub keywords: Vec<String>,
}
