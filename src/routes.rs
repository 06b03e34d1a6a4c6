use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use tower_http::{cors::{Any, CorsLayer}, trace::TraceLayer};

use crate::{
    clock::{Clock, SystemClock},
    config::{ServerConfig, StrategyKind},
    curator::{curate, TextModel},
    error::{AppError, AppResult},
    gemini::GeminiClient,
    models::{CurateRequest, CuratedContent, GenerateRequest, StatusResponse, SubmitResponse},
    registry::{FifoEviction, JobStore, MemoryJobStore},
    resolver::{CompletionStrategy, Resolution, StatusResolver},
    simulation::SimulationPolicy,
    submitter::GenerationSubmitter,
    task_api::TaskApiClient,
    upstream::Providers,
};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn JobStore>,
    pub submitter: GenerationSubmitter,
    pub resolver: StatusResolver,
    pub text_model: Arc<dyn TextModel>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn JobStore>,
        clock: Arc<dyn Clock>,
        strategy: CompletionStrategy,
        text_model: Arc<dyn TextModel>,
    ) -> Self {
        Self {
            submitter: GenerationSubmitter::new(store.clone(), clock.clone(), strategy.clone()),
            resolver: StatusResolver::new(store.clone(), clock, strategy),
            store,
            text_model,
        }
    }

    pub fn from_config(config: &ServerConfig) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let store: Arc<dyn JobStore> = Arc::new(MemoryJobStore::new(
            FifoEviction { max_entries: config.registry_capacity },
            clock.clone(),
        ));
        let gemini = Arc::new(GeminiClient::new(
            config.gemini_base.clone(),
            config.gemini_image_model.clone(),
            config.gemini_text_model.clone(),
        ));
        let strategy = match config.strategy {
            StrategyKind::Simulated => CompletionStrategy::Simulated(SimulationPolicy::new(
                config.simulation_delay,
                config.placeholder_base.clone(),
            )),
            StrategyKind::Upstream => CompletionStrategy::Upstream(Providers {
                standard: gemini.clone(),
                alternate: Arc::new(TaskApiClient::new(config.task_api_base.clone())),
            }),
        };
        tracing::info!(strategy = strategy.name(), capacity = config.registry_capacity, "Job subsystem configured");
        Self::new(store, clock, strategy, gemini)
    }
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/generate", post(generate_image))
        .route("/api/status/:job_id", get(get_status))
        .route("/api/curate", post(curate_content))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        )
        .with_state(state)
}

fn rejection(err: JsonRejection) -> AppError {
    AppError::Validation(err.body_text())
}

pub async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({ "status": "ok", "jobs": state.store.len().await }))
}

pub async fn generate_image(
    State(state): State<AppState>,
    body: Result<Json<GenerateRequest>, JsonRejection>,
) -> AppResult<Json<SubmitResponse>> {
    let Json(body) = body.map_err(rejection)?;
    let job_id = state.submitter.submit(body).await?;
    Ok(Json(SubmitResponse { job_id }))
}

pub async fn get_status(Path(job_id): Path<String>, State(state): State<AppState>) -> AppResult<Response> {
    let resolution = state.resolver.resolve(&job_id).await?;
    // 202 while the job runs; a failed job is still a successful lookup.
    let status = match resolution {
        Resolution::Pending => StatusCode::ACCEPTED,
        Resolution::Complete(_) | Resolution::Failed(_) => StatusCode::OK,
    };
    Ok((status, Json(StatusResponse::from(resolution))).into_response())
}

pub async fn curate_content(
    State(state): State<AppState>,
    body: Result<Json<CurateRequest>, JsonRejection>,
) -> AppResult<Json<CuratedContent>> {
    let Json(body) = body.map_err(rejection)?;
    Ok(Json(curate(state.text_model.as_ref(), body).await?))
}
