//! Client side of a generation: submit, then poll until the job settles.
//!
//! [`start_polling`] and [`generate`] spawn one task per attempt and hand
//! back a [`PollHandle`]. Progress snapshots go to the `on_update`
//! callback; nothing is published or requested once the handle has been
//! cancelled or dropped.

pub mod client;
pub mod machine;
pub mod progress;

use chrono::Utc;
use std::sync::Arc;
use tokio::{task::JoinHandle, time::Instant};
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, info, warn};

pub use client::{ClientError, GenerationApi, HttpGenerationApi};
pub use machine::{GenerationError, GenerationMachine, PollerConfig, Step, TickOutcome};
pub use progress::{ClientProgressState, Stage};

use crate::models::{GeneratedImage, GenerationOptions};

/// Owns one generation attempt. Dropping the handle abandons the attempt.
pub struct PollHandle<T> {
    cancel: CancellationToken,
    _abandon: DropGuard,
    task: JoinHandle<Result<T, GenerationError>>,
}

impl<T> PollHandle<T> {
    fn spawn<F>(cancel: CancellationToken, attempt: F) -> Self
    where
        F: std::future::Future<Output = Result<T, GenerationError>> + Send + 'static,
        T: Send + 'static,
    {
        Self { _abandon: cancel.clone().drop_guard(), cancel, task: tokio::spawn(attempt) }
    }

    /// Stops the attempt; no further status calls or updates happen.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Waits for the outcome. The guard stays alive until the task is done,
    /// so awaiting here never cancels the attempt by itself.
    pub async fn join(self) -> Result<T, GenerationError> {
        self.task.await.unwrap_or(Err(GenerationError::Cancelled))
    }
}

/// Polls an already submitted job. Resolves to the result locator.
pub fn start_polling<F>(
    api: Arc<dyn GenerationApi>,
    job_id: String,
    config: PollerConfig,
    mut on_update: F,
) -> PollHandle<String>
where
    F: FnMut(&ClientProgressState) + Send + 'static,
{
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    PollHandle::spawn(cancel, async move {
        let mut machine = GenerationMachine::new(config);
        machine.submitted();
        on_update(machine.state());
        let result = poll_until_settled(api.as_ref(), &job_id, &mut machine, &mut on_update, &token).await;
        if result.is_ok() {
            machine.complete();
            on_update(machine.state());
        }
        result
    })
}

/// Full flow: preparing, submit, poll, and build the gallery entry.
pub fn generate<F>(
    api: Arc<dyn GenerationApi>,
    options: GenerationOptions,
    config: PollerConfig,
    mut on_update: F,
) -> PollHandle<GeneratedImage>
where
    F: FnMut(&ClientProgressState) + Send + 'static,
{
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    PollHandle::spawn(cancel, async move {
        let started = Instant::now();
        let mut machine = GenerationMachine::new(config);
        machine.start();
        on_update(machine.state());

        let submit_deadline = started + machine.config().timeout;
        let job_id = tokio::select! {
            biased;
            _ = token.cancelled() => return Err(GenerationError::Cancelled),
            _ = tokio::time::sleep_until(submit_deadline) => {
                warn!("Submit did not answer within the time budget");
                let err = machine.expire();
                on_update(machine.state());
                return Err(err);
            }
            submitted = api.submit(&options) => match submitted {
                Ok(job_id) => job_id,
                Err(err) => {
                    let reason = match err {
                        ClientError::Server(_, message) => message,
                        other => other.to_string(),
                    };
                    let err = machine.submit_failed(reason);
                    on_update(machine.state());
                    return Err(err);
                }
            },
        };
        info!(%job_id, "Generation accepted, polling for status");
        machine.submitted();
        on_update(machine.state());

        let url = poll_until_settled(api.as_ref(), &job_id, &mut machine, &mut on_update, &token).await?;
        let image = GeneratedImage {
            id: job_id,
            url,
            prompt: options.prompt,
            style: options.style,
            aspect_ratio: options.aspect_ratio,
            created_at: Utc::now(),
            generation_time: started.elapsed(),
        };
        machine.complete();
        on_update(machine.state());
        Ok(image)
    })
}

async fn poll_until_settled<F>(
    api: &dyn GenerationApi,
    job_id: &str,
    machine: &mut GenerationMachine,
    on_update: &mut F,
    cancel: &CancellationToken,
) -> Result<String, GenerationError>
where
    F: FnMut(&ClientProgressState),
{
    let started = Instant::now();
    let interval = machine.config().interval;
    let deadline = started + machine.config().timeout;

    loop {
        // Never sleep past the deadline.
        let wake = (Instant::now() + interval).min(deadline);
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(GenerationError::Cancelled),
            _ = tokio::time::sleep_until(wake) => {}
        }

        if let Some(err) = machine.check_deadline(started.elapsed()) {
            warn!(%job_id, "Polling timed out");
            on_update(machine.state());
            return Err(err);
        }

        // A hung status call must not outlive the budget either.
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(GenerationError::Cancelled),
            _ = tokio::time::sleep_until(deadline) => {
                warn!(%job_id, "Status call still pending at the deadline");
                let err = machine.expire();
                on_update(machine.state());
                return Err(err);
            }
            status = api.status(job_id) => status.unwrap_or_else(|err| {
                debug!(%job_id, error = %err, "Status call failed, retrying next tick");
                TickOutcome::Transport(err.to_string())
            }),
        };

        let step = machine.tick(outcome, started.elapsed());
        on_update(machine.state());
        match step {
            Step::Continue => {}
            Step::Finalize(url) => return Ok(url),
            Step::Stop(err) => {
                warn!(%job_id, error = %err, "Generation stopped");
                return Err(err);
            }
        }
    }
}
