//! Client poller tests. Time is paused, so sleeps resolve instantly and
//! deterministically.

mod common;

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header::CONTENT_TYPE, Method, Request},
    Router,
};
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use reqwest::StatusCode;
use std::{
    collections::VecDeque,
    sync::{atomic::{AtomicUsize, Ordering}, Arc},
    time::Duration,
};
use tower::ServiceExt;

use common::{body_json, simulated_app};
use landscape_studio::{
    clock::ManualClock,
    models::{ArtStyle, AspectRatio, GenerationOptions, StatusResponse},
    poller::{
        generate, start_polling, ClientError, ClientProgressState, GenerationApi, GenerationError, PollerConfig, Stage,
        TickOutcome,
    },
};

/// Scripted service. The last status answer repeats once the script runs dry.
struct FakeApi {
    submit: Result<String, String>,
    statuses: Mutex<VecDeque<Result<TickOutcome, String>>>,
    status_calls: AtomicUsize,
}

impl FakeApi {
    fn new(submit: Result<&str, &str>, statuses: Vec<Result<TickOutcome, String>>) -> Arc<Self> {
        Arc::new(Self {
            submit: submit.map(str::to_string).map_err(str::to_string),
            statuses: Mutex::new(statuses.into()),
            status_calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GenerationApi for FakeApi {
    async fn submit(&self, _options: &GenerationOptions) -> Result<String, ClientError> {
        self.submit.clone().map_err(|msg| ClientError::Server(StatusCode::BAD_REQUEST, msg))
    }

    async fn status(&self, _job_id: &str) -> Result<TickOutcome, ClientError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        let next = {
            let mut q = self.statuses.lock();
            if q.len() > 1 { q.pop_front() } else { q.front().cloned() }
        };
        match next.unwrap_or(Ok(TickOutcome::Pending)) {
            Ok(outcome) => Ok(outcome),
            Err(msg) => Err(ClientError::Server(StatusCode::BAD_GATEWAY, msg)),
        }
    }
}

type Updates = Arc<Mutex<Vec<ClientProgressState>>>;

fn recorder() -> (Updates, impl FnMut(&ClientProgressState) + Send + 'static) {
    let updates: Updates = Arc::default();
    let sink = updates.clone();
    (updates, move |state: &ClientProgressState| sink.lock().push(state.clone()))
}

fn barn() -> GenerationOptions {
    GenerationOptions::new("a red barn at dusk", ArtStyle::Photorealistic, AspectRatio::Landscape)
}

fn assert_monotonic(updates: &[ClientProgressState]) {
    for pair in updates.windows(2) {
        assert!(pair[1].progress >= pair[0].progress, "progress dropped: {:?}", pair);
    }
}

#[tokio::test(start_paused = true)]
async fn generate_reports_progress_and_returns_image() {
    let api = FakeApi::new(
        Ok("job-1"),
        vec![
            Ok(TickOutcome::Pending),
            Ok(TickOutcome::Pending),
            Ok(TickOutcome::Complete("https://cdn.example/barn.png".into())),
        ],
    );
    let (updates, on_update) = recorder();

    let image = generate(api.clone(), barn(), PollerConfig::default(), on_update).join().await.unwrap();

    assert_eq!(image.id, "job-1");
    assert_eq!(image.url, "https://cdn.example/barn.png");
    assert_eq!(image.prompt, "a red barn at dusk");
    assert_eq!(image.aspect_ratio, AspectRatio::Landscape);
    assert!(image.generation_time >= Duration::from_secs(9));
    assert_eq!(api.calls(), 3);

    let updates = updates.lock();
    assert_monotonic(&updates);
    let stages: Vec<Stage> = updates.iter().map(|s| s.stage).collect();
    assert_eq!(
        stages,
        vec![
            Stage::Preparing,
            Stage::Generating,
            Stage::Generating,
            Stage::Generating,
            Stage::Finalizing,
            Stage::Complete,
        ]
    );
    assert_eq!(updates.last().unwrap().progress, 100);
    let (last, busy) = updates.split_last().unwrap();
    assert!(busy.iter().all(|s| s.stage.is_busy()));
    assert!(!last.stage.is_busy());
}

#[tokio::test(start_paused = true)]
async fn timeout_stops_status_calls() {
    let api = FakeApi::new(Ok("job-2"), vec![Ok(TickOutcome::Pending)]);
    let config = PollerConfig { timeout: Duration::from_secs(10), ..PollerConfig::default() };
    let (updates, on_update) = recorder();

    let err = start_polling(api.clone(), "job-2".into(), config, on_update).join().await.unwrap_err();
    assert_eq!(err, GenerationError::Timeout);
    // Calls at 3s, 6s and 9s; the 10s deadline fires before a fourth.
    assert_eq!(api.calls(), 3);

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(api.calls(), 3);

    let last = updates.lock().last().cloned().unwrap();
    assert_eq!(last.stage, Stage::Error);
    assert!(last.message.contains("took too long"));
    assert!(last.progress < 100);
}

/// A service that accepts work and then never answers.
struct Unresponsive {
    hang_submit: bool,
    status_calls: AtomicUsize,
}

#[async_trait]
impl GenerationApi for Unresponsive {
    async fn submit(&self, _options: &GenerationOptions) -> Result<String, ClientError> {
        if self.hang_submit {
            std::future::pending::<()>().await;
        }
        Ok("job-hung".into())
    }

    async fn status(&self, _job_id: &str) -> Result<TickOutcome, ClientError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        std::future::pending().await
    }
}

#[tokio::test(start_paused = true)]
async fn hung_status_call_still_times_out() {
    let api = Arc::new(Unresponsive { hang_submit: false, status_calls: AtomicUsize::new(0) });
    let config = PollerConfig { timeout: Duration::from_secs(10), ..PollerConfig::default() };
    let (updates, on_update) = recorder();

    let handle = start_polling(api.clone(), "job-hung".into(), config, on_update);
    let joined = tokio::time::timeout(Duration::from_secs(600), handle.join()).await.expect("poller kept running");

    assert_eq!(joined, Err(GenerationError::Timeout));
    assert_eq!(api.status_calls.load(Ordering::SeqCst), 1);
    let last = updates.lock().last().cloned().unwrap();
    assert_eq!(last.stage, Stage::Error);
    assert!(last.message.contains("took too long"));
}

#[tokio::test(start_paused = true)]
async fn hung_submit_times_out() {
    let api = Arc::new(Unresponsive { hang_submit: true, status_calls: AtomicUsize::new(0) });
    let config = PollerConfig { timeout: Duration::from_secs(10), ..PollerConfig::default() };
    let (updates, on_update) = recorder();

    let joined = tokio::time::timeout(Duration::from_secs(600), generate(api.clone(), barn(), config, on_update).join())
        .await
        .expect("generation kept running");

    assert_eq!(joined.unwrap_err(), GenerationError::Timeout);
    assert_eq!(api.status_calls.load(Ordering::SeqCst), 0);
    let stages: Vec<Stage> = updates.lock().iter().map(|s| s.stage).collect();
    assert_eq!(stages, vec![Stage::Preparing, Stage::Error]);
}

#[tokio::test(start_paused = true)]
async fn dropping_the_handle_abandons_polling() {
    let api = FakeApi::new(Ok("job-8"), vec![Ok(TickOutcome::Pending)]);
    let (updates, on_update) = recorder();
    let handle = start_polling(api.clone(), "job-8".into(), PollerConfig::default(), on_update);

    tokio::time::sleep(Duration::from_secs(4)).await;
    assert_eq!(api.calls(), 1);
    let seen = updates.lock().len();

    drop(handle);
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(api.calls(), 1);
    assert_eq!(updates.lock().len(), seen);
}

#[tokio::test(start_paused = true)]
async fn cancel_halts_polling_and_updates() {
    let api = FakeApi::new(Ok("job-3"), vec![Ok(TickOutcome::Pending)]);
    let (updates, on_update) = recorder();
    let handle = start_polling(api.clone(), "job-3".into(), PollerConfig::default(), on_update);

    tokio::time::sleep(Duration::from_secs(7)).await;
    assert_eq!(api.calls(), 2);
    let seen = updates.lock().len();

    handle.cancel();
    assert_eq!(handle.join().await, Err(GenerationError::Cancelled));

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(api.calls(), 2);
    assert_eq!(updates.lock().len(), seen);
}

#[tokio::test(start_paused = true)]
async fn not_found_is_tolerated_during_grace() {
    let api = FakeApi::new(
        Ok("job-4"),
        vec![
            Ok(TickOutcome::NotFound),
            Ok(TickOutcome::NotFound),
            Ok(TickOutcome::Complete("https://cdn.example/late.png".into())),
        ],
    );
    let (_, on_update) = recorder();
    let url = start_polling(api, "job-4".into(), PollerConfig::default(), on_update).join().await.unwrap();
    assert_eq!(url, "https://cdn.example/late.png");
}

#[tokio::test(start_paused = true)]
async fn not_found_past_grace_is_an_error() {
    let api = FakeApi::new(Ok("job-5"), vec![Ok(TickOutcome::NotFound)]);
    let (updates, on_update) = recorder();
    let err = start_polling(api.clone(), "job-5".into(), PollerConfig::default(), on_update).join().await.unwrap_err();
    assert_eq!(err, GenerationError::NotFound);
    // 3s, 6s and 9s fall inside the 10s grace; 12s does not.
    assert_eq!(api.calls(), 4);
    assert_eq!(updates.lock().last().unwrap().stage, Stage::Error);
}

#[tokio::test(start_paused = true)]
async fn failed_job_keeps_reason_and_progress() {
    let api = FakeApi::new(
        Ok("job-6"),
        vec![Ok(TickOutcome::Pending), Ok(TickOutcome::Failed("prompt blocked by safety filter".into()))],
    );
    let (updates, on_update) = recorder();
    let err = generate(api, barn(), PollerConfig::default(), on_update).join().await.unwrap_err();
    assert_eq!(err, GenerationError::Failed("prompt blocked by safety filter".into()));

    let updates = updates.lock();
    assert_monotonic(&updates);
    let last = updates.last().unwrap();
    assert_eq!(last.stage, Stage::Error);
    assert!(last.message.contains("prompt blocked by safety filter"));
    assert_eq!(last.progress, updates[updates.len() - 2].progress);
}

#[tokio::test(start_paused = true)]
async fn transport_errors_keep_polling() {
    let api = FakeApi::new(
        Ok("job-7"),
        vec![
            Err("bad gateway".into()),
            Err("bad gateway".into()),
            Ok(TickOutcome::Complete("https://cdn.example/ok.png".into())),
        ],
    );
    let (_, on_update) = recorder();
    let url = start_polling(api.clone(), "job-7".into(), PollerConfig::default(), on_update).join().await.unwrap();
    assert_eq!(url, "https://cdn.example/ok.png");
    assert_eq!(api.calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn rejected_submit_never_polls() {
    let api = FakeApi::new(Err("Prompt is required"), vec![]);
    let (updates, on_update) = recorder();
    let err = generate(api.clone(), barn(), PollerConfig::default(), on_update).join().await.unwrap_err();
    assert_eq!(err, GenerationError::Rejected("Prompt is required".into()));
    assert_eq!(api.calls(), 0);

    let stages: Vec<Stage> = updates.lock().iter().map(|s| s.stage).collect();
    assert_eq!(stages, vec![Stage::Preparing, Stage::Error]);
}

// ---------------------------------------------------------------------------
// Against the real router
// ---------------------------------------------------------------------------

/// Drives the in-process router and moves the server clock forward by one
/// poll interval before every status call.
struct RouterApi {
    router: Router,
    clock: Arc<ManualClock>,
    step: Duration,
}

#[async_trait]
impl GenerationApi for RouterApi {
    async fn submit(&self, options: &GenerationOptions) -> Result<String, ClientError> {
        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/generate")
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(serde_json::to_vec(options).unwrap()))
            .unwrap();
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = body_json(response).await;
        if !status.is_success() {
            return Err(ClientError::Server(StatusCode::from_u16(status.as_u16()).unwrap(), body["error"].to_string()));
        }
        Ok(body["jobId"].as_str().unwrap().to_string())
    }

    async fn status(&self, job_id: &str) -> Result<TickOutcome, ClientError> {
        self.clock.advance(self.step);
        let request = Request::builder().uri(format!("/api/status/{job_id}")).body(Body::empty()).unwrap();
        let response = self.router.clone().oneshot(request).await.unwrap();
        if response.status() == axum::http::StatusCode::NOT_FOUND {
            return Ok(TickOutcome::NotFound);
        }
        Ok(match serde_json::from_value::<StatusResponse>(body_json(response).await).unwrap() {
            StatusResponse::Pending => TickOutcome::Pending,
            StatusResponse::Complete { result } => TickOutcome::Complete(result),
            StatusResponse::Failed { error } => TickOutcome::Failed(error),
        })
    }
}

#[tokio::test(start_paused = true)]
async fn simulated_job_completes_end_to_end() {
    let t = simulated_app(Duration::from_secs(8), 100);
    let config = PollerConfig::default();
    let api = Arc::new(RouterApi { router: t.router.clone(), clock: t.clock.clone(), step: config.interval });
    let (updates, on_update) = recorder();

    let image = generate(api, barn(), config, on_update).join().await.unwrap();
    assert_eq!(image.url, "https://picsum.photos/seed/a%20red%20barn%20at%20dusk-standard/1024/576");

    // Pending at 3s and 6s, complete at 9s.
    let updates = updates.lock();
    assert_monotonic(&updates);
    let generating = updates.iter().filter(|s| s.stage == Stage::Generating).count();
    assert_eq!(generating, 3);
    assert_eq!(updates.last().unwrap().stage, Stage::Complete);
}
