use std::sync::Arc;
use tracing::{info, warn, error};

use crate::{
    clock::Clock,
    error::AppError,
    models::{JobRecord, JobStatus, JobTransition, StatusResponse},
    registry::JobStore,
    simulation::{advance_simulated_job, SimulationPolicy},
    upstream::{Providers, RemoteTaskState, UpstreamError},
};

/// One completion policy per deployment.
#[derive(Clone)]
pub enum CompletionStrategy {
    Simulated(SimulationPolicy),
    Upstream(Providers),
}

impl CompletionStrategy {
    pub fn name(&self) -> &'static str {
        match self {
            CompletionStrategy::Simulated(_) => "simulated",
            CompletionStrategy::Upstream(_) => "upstream",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Pending,
    Complete(String),
    Failed(String),
}

impl From<&JobRecord> for Resolution {
    fn from(job: &JobRecord) -> Self {
        match job.status {
            JobStatus::Pending => Resolution::Pending,
            JobStatus::Complete => Resolution::Complete(job.result.clone().unwrap_or_default()),
            JobStatus::Failed => Resolution::Failed(job.error.clone().unwrap_or_else(|| "generation failed".into())),
        }
    }
}

impl From<Resolution> for StatusResponse {
    fn from(r: Resolution) -> Self {
        match r {
            Resolution::Pending => StatusResponse::Pending,
            Resolution::Complete(result) => StatusResponse::Complete { result },
            Resolution::Failed(error) => StatusResponse::Failed { error },
        }
    }
}

#[derive(Clone)]
pub struct StatusResolver {
    store: Arc<dyn JobStore>,
    clock: Arc<dyn Clock>,
    strategy: CompletionStrategy,
}

impl StatusResolver {
    pub fn new(store: Arc<dyn JobStore>, clock: Arc<dyn Clock>, strategy: CompletionStrategy) -> Self {
        Self { store, clock, strategy }
    }

    pub async fn resolve(&self, job_id: &str) -> Result<Resolution, AppError> {
        let job = self.store.get(job_id).await.ok_or_else(|| AppError::NotFound(job_id.to_string()))?;
        if job.status.is_terminal() {
            return Ok(Resolution::from(&job));
        }

        match &self.strategy {
            CompletionStrategy::Simulated(policy) => self.resolve_simulated(job, policy).await,
            CompletionStrategy::Upstream(providers) => self.resolve_upstream(job, providers).await,
        }
    }

    async fn resolve_simulated(&self, job: JobRecord, policy: &SimulationPolicy) -> Result<Resolution, AppError> {
        let next = advance_simulated_job(&job, self.clock.now(), policy);
        if next.status != JobStatus::Complete {
            return Ok(Resolution::Pending);
        }
        let result = next.result.unwrap_or_default();
        info!(job_id = %job.id, "Simulated job reached completion threshold");
        self.persist(&job.id, JobTransition::Complete(result)).await
    }

    async fn resolve_upstream(&self, job: JobRecord, providers: &Providers) -> Result<Resolution, AppError> {
        // The submit task has not attached a provider task yet.
        let Some(task_id) = job.remote_task_id.as_deref() else {
            return Ok(Resolution::Pending);
        };
        let provider = providers.for_model(job.request.model);

        match provider.query(task_id).await {
            Ok(RemoteTaskState::Generating) => Ok(Resolution::Pending),
            Ok(RemoteTaskState::Succeeded { locator }) => {
                info!(job_id = %job.id, provider = provider.name(), "Upstream job complete");
                self.persist(&job.id, JobTransition::Complete(locator)).await
            }
            Ok(RemoteTaskState::Failed { reason }) => {
                warn!(job_id = %job.id, provider = provider.name(), %reason, "Upstream reported failure");
                self.persist(&job.id, JobTransition::Fail(reason)).await
            }
            Err(UpstreamError::Transient(detail)) => {
                warn!(job_id = %job.id, provider = provider.name(), %detail, "Transient upstream error, will retry on next poll");
                Ok(Resolution::Pending)
            }
            // Our own setup is broken, not the job: report it and keep the job pending.
            Err(UpstreamError::Configuration(msg)) => Err(AppError::Configuration(msg)),
            Err(err) => {
                error!(job_id = %job.id, provider = provider.name(), error = %err, "Permanent upstream error");
                self.persist(&job.id, JobTransition::Fail(err.to_string())).await
            }
        }
    }

    /// Writes the transition and reports whatever the registry now holds,
    /// so concurrent resolvers agree on the first terminal write.
    async fn persist(&self, job_id: &str, transition: JobTransition) -> Result<Resolution, AppError> {
        self.store
            .update(job_id, transition)
            .await
            .map(|stored| Resolution::from(&stored))
            .ok_or_else(|| AppError::NotFound(job_id.to_string()))
    }
}
