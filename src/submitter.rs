use std::{sync::Arc, time::Duration};
use tracing::{info, warn, error, debug};
use uuid::Uuid;

use crate::{
    clock::Clock,
    error::AppError,
    models::{GenerateRequest, GenerationOptions, JobRecord, JobTransition},
    registry::JobStore,
    resolver::CompletionStrategy,
    upstream::UpstreamProvider,
};

/// Backoff for starting a remote task when the provider is flaky.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
            multiplier: 2.0,
            max_attempts: 4,
        }
    }
}

impl RetryPolicy {
    /// Next backoff delay, clamped to `max_delay`.
    pub fn next_delay(&self, current: Duration) -> Duration {
        let next_ms = (current.as_millis() as f64 * self.multiplier) as u64;
        Duration::from_millis(next_ms).min(self.max_delay)
    }
}

#[derive(Clone)]
pub struct GenerationSubmitter {
    store: Arc<dyn JobStore>,
    clock: Arc<dyn Clock>,
    strategy: CompletionStrategy,
    retry: RetryPolicy,
}

impl GenerationSubmitter {
    pub fn new(store: Arc<dyn JobStore>, clock: Arc<dyn Clock>, strategy: CompletionStrategy) -> Self {
        Self { store, clock, strategy, retry: RetryPolicy::default() }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Validates, records a pending job and returns its id. Remote work is
    /// spawned and never awaited here.
    pub async fn submit(&self, request: GenerateRequest) -> Result<String, AppError> {
        let options = GenerationOptions::try_from(request)?;

        let provider = match &self.strategy {
            CompletionStrategy::Upstream(providers) => {
                let provider = providers.for_model(options.model).clone();
                provider.check_configured()?;
                Some(provider)
            }
            CompletionStrategy::Simulated(_) => None,
        };

        let job_id = Uuid::new_v4().to_string();
        let record = JobRecord::pending(job_id.clone(), options.clone(), self.clock.now());
        if !self.store.put(record).await {
            return Err(AppError::Internal(format!("job id collision for {job_id}")));
        }
        info!(%job_id, style = options.style.as_str(), aspect_ratio = options.aspect_ratio.as_str(), model = options.model.as_str(), "🚀 Job accepted");

        if let Some(provider) = provider {
            tokio::spawn(start_remote_task(
                self.store.clone(),
                provider,
                job_id.clone(),
                options,
                self.retry.clone(),
            ));
        }
        Ok(job_id)
    }
}

/// Starts the provider task and binds it to the job. Transient failures
/// are retried with backoff; anything else fails the job for good.
pub async fn start_remote_task(
    store: Arc<dyn JobStore>,
    provider: Arc<dyn UpstreamProvider>,
    job_id: String,
    options: GenerationOptions,
    retry: RetryPolicy,
) {
    let mut delay = retry.initial_delay;
    let mut attempt = 0u32;

    let transition = loop {
        attempt += 1;
        match provider.submit(&options).await {
            Ok(task_id) => {
                info!(%job_id, %task_id, provider = provider.name(), attempt, "Remote task started");
                break JobTransition::AttachRemote(task_id);
            }
            Err(err) if err.is_retryable() && attempt < retry.max_attempts => {
                warn!(%job_id, provider = provider.name(), attempt, delay_ms = delay.as_millis() as u64, error = %err, "Remote start failed, retrying");
                tokio::time::sleep(delay).await;
                delay = retry.next_delay(delay);
                // Nobody can observe a job that was evicted meanwhile.
                if store.get(&job_id).await.is_none() {
                    debug!(%job_id, "Job evicted before the remote task started");
                    return;
                }
            }
            Err(err) => {
                error!(%job_id, provider = provider.name(), attempt, error = %err, "Remote start failed");
                break JobTransition::Fail(err.to_string());
            }
        }
    };

    if store.update(&job_id, transition).await.is_none() {
        debug!(%job_id, "Job evicted before remote start was recorded");
    }
}
