#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header::CONTENT_TYPE, Method, Request, Response, StatusCode},
    Router,
};
use parking_lot::Mutex;
use std::{
    collections::VecDeque,
    sync::{atomic::{AtomicUsize, Ordering}, Arc},
    time::Duration,
};
use tower::ServiceExt;

use landscape_studio::{
    app,
    clock::{Clock, ManualClock},
    curator::TextModel,
    models::{GenerationOptions, JobRecord},
    registry::{FifoEviction, JobStore, MemoryJobStore},
    resolver::CompletionStrategy,
    simulation::{SimulationPolicy, DEFAULT_PLACEHOLDER_BASE},
    upstream::{Providers, RemoteTaskState, UpstreamError, UpstreamProvider},
    AppState,
};

pub struct TestApp {
    pub router: Router,
    pub store: Arc<dyn JobStore>,
    pub clock: Arc<ManualClock>,
}

pub fn simulated_app(delay: Duration, capacity: usize) -> TestApp {
    let clock = Arc::new(ManualClock::default());
    let policy = SimulationPolicy::new(delay, DEFAULT_PLACEHOLDER_BASE.parse().unwrap());
    build(CompletionStrategy::Simulated(policy), clock, capacity)
}

pub fn upstream_app(standard: Arc<ScriptedProvider>, alternate: Arc<ScriptedProvider>) -> TestApp {
    app_with_providers(Providers { standard, alternate })
}

pub fn app_with_providers(providers: Providers) -> TestApp {
    let clock = Arc::new(ManualClock::default());
    build(CompletionStrategy::Upstream(providers), clock, 100)
}

fn build(strategy: CompletionStrategy, clock: Arc<ManualClock>, capacity: usize) -> TestApp {
    let dyn_clock: Arc<dyn Clock> = clock.clone();
    let store: Arc<dyn JobStore> = Arc::new(MemoryJobStore::new(FifoEviction { max_entries: capacity }, dyn_clock.clone()));
    let state = AppState::new(store.clone(), dyn_clock, strategy, Arc::new(CannedText));
    TestApp { router: app(state), store, clock }
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

pub async fn get(app: &Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    (response.status(), body_json(response).await)
}

pub async fn post_json(app: &Router, uri: &str, body: serde_json::Value) -> (StatusCode, serde_json::Value) {
    post_raw(app, uri, body.to_string()).await
}

pub async fn post_raw(app: &Router, uri: &str, body: String) -> (StatusCode, serde_json::Value) {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from(body))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    (response.status(), body_json(response).await)
}

/// Submits a request and returns the job id, asserting acceptance.
pub async fn submit(app: &Router, body: serde_json::Value) -> String {
    let (status, json) = post_json(app, "/api/generate", body).await;
    assert_eq!(status, StatusCode::OK, "submit failed: {json}");
    json["jobId"].as_str().unwrap().to_string()
}

/// Lets spawned background tasks run until the stored job satisfies `done`.
pub async fn wait_for_job(store: &Arc<dyn JobStore>, job_id: &str, done: impl Fn(&JobRecord) -> bool) -> JobRecord {
    for _ in 0..200 {
        if let Some(job) = store.get(job_id).await {
            if done(&job) {
                return job;
            }
        }
        tokio::task::yield_now().await;
    }
    panic!("job {job_id} did not settle");
}

/// Provider whose answers are queued up front. Once a queue runs dry the
/// last answer is repeated.
pub struct ScriptedProvider {
    configured: bool,
    submits: Mutex<VecDeque<Result<String, UpstreamError>>>,
    queries: Mutex<VecDeque<Result<RemoteTaskState, UpstreamError>>>,
    pub submit_calls: AtomicUsize,
    pub query_calls: AtomicUsize,
}

impl ScriptedProvider {
    pub fn new(
        submits: Vec<Result<String, UpstreamError>>,
        queries: Vec<Result<RemoteTaskState, UpstreamError>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            configured: true,
            submits: Mutex::new(submits.into()),
            queries: Mutex::new(queries.into()),
            submit_calls: AtomicUsize::new(0),
            query_calls: AtomicUsize::new(0),
        })
    }

    pub fn unconfigured() -> Arc<Self> {
        Arc::new(Self {
            configured: false,
            submits: Mutex::new(VecDeque::new()),
            queries: Mutex::new(VecDeque::new()),
            submit_calls: AtomicUsize::new(0),
            query_calls: AtomicUsize::new(0),
        })
    }

    fn next<T: Clone>(queue: &Mutex<VecDeque<T>>) -> Option<T> {
        let mut q = queue.lock();
        if q.len() > 1 { q.pop_front() } else { q.front().cloned() }
    }
}

#[async_trait]
impl UpstreamProvider for ScriptedProvider {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn check_configured(&self) -> Result<(), UpstreamError> {
        if self.configured {
            Ok(())
        } else {
            Err(UpstreamError::Configuration("TEST_API_KEY is not set".into()))
        }
    }

    async fn submit(&self, _options: &GenerationOptions) -> Result<String, UpstreamError> {
        self.submit_calls.fetch_add(1, Ordering::SeqCst);
        Self::next(&self.submits).unwrap_or_else(|| Err(UpstreamError::Permanent("no script".into())))
    }

    async fn query(&self, _task_id: &str) -> Result<RemoteTaskState, UpstreamError> {
        self.query_calls.fetch_add(1, Ordering::SeqCst);
        Self::next(&self.queries).unwrap_or(Ok(RemoteTaskState::Generating))
    }
}

pub struct CannedText;

#[async_trait]
impl TextModel for CannedText {
    fn check_configured(&self) -> Result<(), UpstreamError> {
        Ok(())
    }

    async fn generate_text(&self, prompt: &str) -> Result<String, UpstreamError> {
        if prompt.starts_with("Extract") {
            Ok("landscapes, photography, ai".into())
        } else {
            Ok("An article about AI landscape photography.".into())
        }
    }
}
