//! Time-based completion for deployments without a real provider.

use chrono::{DateTime, Utc};
use reqwest::Url;
use std::time::Duration;

use crate::models::{GenerationOptions, JobRecord, JobTransition};

pub const DEFAULT_DELAY: Duration = Duration::from_millis(8000);
pub const DEFAULT_PLACEHOLDER_BASE: &str = "https://picsum.photos";

#[derive(Debug, Clone)]
pub struct SimulationPolicy {
    /// Elapsed time after which a pending job counts as done.
    pub delay: Duration,
    pub placeholder_base: Url,
}

impl SimulationPolicy {
    pub fn new(delay: Duration, placeholder_base: Url) -> Self {
        Self { delay, placeholder_base }
    }
}

/// Content-addressed placeholder: the same prompt, model and aspect ratio
/// always map to the same image.
pub fn placeholder_locator(base: &Url, options: &GenerationOptions) -> String {
    let seed = format!("{}-{}", options.prompt, options.model.as_str());
    let (width, height) = options.aspect_ratio.dimensions();
    let (width, height) = (width.to_string(), height.to_string());
    let mut url = base.clone();
    if let Ok(mut segments) = url.path_segments_mut() {
        segments
            .pop_if_empty()
            .extend(["seed", seed.as_str(), width.as_str(), height.as_str()]);
    }
    url.to_string()
}

/// Pure step of the simulation: returns the record as it should look at
/// `now`. Terminal or still-young records come back unchanged.
pub fn advance_simulated_job(record: &JobRecord, now: DateTime<Utc>, policy: &SimulationPolicy) -> JobRecord {
    let mut next = record.clone();
    if record.status.is_terminal() || record.elapsed(now) < policy.delay {
        return next;
    }
    next.apply(JobTransition::Complete(placeholder_locator(&policy.placeholder_base, &record.request)), now);
    next
}
