use async_trait::async_trait;
use reqwest::Url;
use tracing::{info, error};

use crate::{
    error::AppError,
    gemini::GeminiClient,
    models::{CurateRequest, CuratedContent},
    prompt::{build_keywords_prompt, build_summary_prompt, parse_keywords},
    upstream::{UpstreamError, UpstreamProvider},
};

#[async_trait]
pub trait TextModel: Send + Sync {
    fn check_configured(&self) -> Result<(), UpstreamError>;
    async fn generate_text(&self, prompt: &str) -> Result<String, UpstreamError>;
}

#[async_trait]
impl TextModel for GeminiClient {
    fn check_configured(&self) -> Result<(), UpstreamError> {
        UpstreamProvider::check_configured(self)
    }

    async fn generate_text(&self, prompt: &str) -> Result<String, UpstreamError> {
        GeminiClient::generate_text(self, prompt).await
    }
}

pub fn validate_url(raw: Option<&str>) -> Result<Url, AppError> {
    let raw = raw.map(str::trim).filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::Validation("Please enter a valid URL.".into()))?;
    let url = Url::parse(raw).map_err(|_| AppError::Validation("Please enter a valid URL.".into()))?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(AppError::Validation("Only http(s) URLs can be curated.".into()));
    }
    Ok(url)
}

/// Summarizes a URL and extracts its keywords; both calls run concurrently.
pub async fn curate(model: &dyn TextModel, request: CurateRequest) -> Result<CuratedContent, AppError> {
    let url = validate_url(request.url.as_deref())?;
    model.check_configured()?;

    info!(%url, "🎯 Curating content");
    let summary_prompt = build_summary_prompt(url.as_str(), request.custom_prompt.as_deref());
    let keywords_prompt = build_keywords_prompt(url.as_str());
    let (summary, keywords) = tokio::join!(
        model.generate_text(&summary_prompt),
        model.generate_text(&keywords_prompt)
    );

    let summary = summary.inspect_err(|e| error!(%url, error = %e, "❌ Summary generation failed"))?;
    let keywords = parse_keywords(&keywords.inspect_err(|e| error!(%url, error = %e, "❌ Keyword extraction failed"))?);

    if summary.trim().is_empty() || keywords.is_empty() {
        return Err(AppError::Upstream(
            "AI failed to process the URL. The content might be inaccessible or in an unsupported format.".into(),
        ));
    }

    info!(%url, keywords = keywords.len(), "✅ Content curated");
    Ok(CuratedContent { url: url.to_string(), summary, keywords })
}
