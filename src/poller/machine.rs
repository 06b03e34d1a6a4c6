//! Pure generation state machine.
//!
//! Nothing here sleeps or performs I/O: the driver feeds it submit results
//! and poll outcomes together with the elapsed time, and publishes
//! [`GenerationMachine::state`] after every step. Tests drive ticks by hand.

use std::time::Duration;
use thiserror::Error;

use super::progress::{ClientProgressState, Stage};

pub const PREPARING_PROGRESS: u8 = 10;
pub const FINALIZING_PROGRESS: u8 = 98;

#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// Pause between status calls.
    pub interval: Duration,
    /// Wall-clock budget for the whole polling phase.
    pub timeout: Duration,
    /// How long a job may read as unknown before that counts as an error.
    pub not_found_grace: Duration,
    /// Progress shown once the job has been accepted.
    pub generating_floor: u8,
    /// Pending ticks approach this value and never pass it.
    pub progress_cap: u8,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3),
            timeout: Duration::from_secs(120),
            not_found_grace: Duration::from_secs(10),
            generating_floor: 20,
            progress_cap: 95,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GenerationError {
    #[error("Generation request rejected: {0}")]
    Rejected(String),
    #[error("Generation failed: {0}")]
    Failed(String),
    #[error("The generation job could not be found. Please try again.")]
    NotFound,
    #[error("Generation took too long. Please try again.")]
    Timeout,
    #[error("Generation cancelled")]
    Cancelled,
}

/// Result of one status call, as seen by the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    Pending,
    NotFound,
    Complete(String),
    Failed(String),
    /// Network trouble or a 5xx; counts as "still working".
    Transport(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Continue,
    /// The job produced a result; the machine sits in `finalizing`.
    Finalize(String),
    Stop(GenerationError),
}

#[derive(Debug, Clone)]
pub struct GenerationMachine {
    config: PollerConfig,
    state: ClientProgressState,
}

impl GenerationMachine {
    pub fn new(config: PollerConfig) -> Self {
        Self { config, state: ClientProgressState::idle() }
    }

    pub fn config(&self) -> &PollerConfig {
        &self.config
    }

    pub fn state(&self) -> &ClientProgressState {
        &self.state
    }

    pub fn is_finished(&self) -> bool {
        self.state.stage.is_terminal()
    }

    /// Moves forward only: progress never drops and terminal states stick.
    fn set(&mut self, stage: Stage, progress: u8, message: impl Into<String>) {
        if self.is_finished() {
            return;
        }
        self.state.stage = stage;
        self.state.progress = self.state.progress.max(progress.min(100));
        self.state.message = message.into();
    }

    pub fn start(&mut self) {
        self.set(Stage::Preparing, PREPARING_PROGRESS, "Preparing model...");
    }

    pub fn submitted(&mut self) {
        let floor = self.config.generating_floor;
        self.set(Stage::Generating, floor, "Generating image...");
    }

    pub fn submit_failed(&mut self, reason: impl Into<String>) -> GenerationError {
        self.fail(GenerationError::Rejected(reason.into()))
    }

    /// Checked before each status call so nothing is sent past the budget.
    pub fn check_deadline(&mut self, elapsed: Duration) -> Option<GenerationError> {
        (elapsed >= self.config.timeout).then(|| self.expire())
    }

    /// The budget ran out while a call was still in flight.
    pub fn expire(&mut self) -> GenerationError {
        self.fail(GenerationError::Timeout)
    }

    pub fn tick(&mut self, outcome: TickOutcome, elapsed: Duration) -> Step {
        if self.is_finished() {
            return Step::Continue;
        }
        match outcome {
            TickOutcome::Complete(url) => {
                self.set(Stage::Finalizing, FINALIZING_PROGRESS, "Finalizing...");
                Step::Finalize(url)
            }
            TickOutcome::Failed(reason) => Step::Stop(self.fail(GenerationError::Failed(reason))),
            TickOutcome::NotFound if elapsed >= self.config.not_found_grace => {
                Step::Stop(self.fail(GenerationError::NotFound))
            }
            TickOutcome::Pending | TickOutcome::NotFound | TickOutcome::Transport(_) => {
                if let Some(err) = self.check_deadline(elapsed) {
                    return Step::Stop(err);
                }
                let next = self.next_pending_progress();
                self.set(Stage::Generating, next, "Generating image...");
                Step::Continue
            }
        }
    }

    pub fn complete(&mut self) {
        self.set(Stage::Complete, 100, "Generation complete!");
    }

    fn fail(&mut self, err: GenerationError) -> GenerationError {
        let progress = self.state.progress;
        self.set(Stage::Error, progress, err.to_string());
        err
    }

    /// Closes a quarter of the gap to the cap, at least one point.
    fn next_pending_progress(&self) -> u8 {
        let cap = self.config.progress_cap.min(99);
        let current = self.state.progress;
        let gap = cap.saturating_sub(current);
        current + (gap / 4).max(gap.min(1))
    }
}
