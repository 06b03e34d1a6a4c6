//! Process-wide job registry.
//!
//! [`JobStore`] is the seam a real deployment would back with a key-value
//! store; [`MemoryJobStore`] is the volatile in-process implementation.
//! Capacity is governed by an [`EvictionPolicy`] rather than a constant.

use async_trait::async_trait;
use indexmap::IndexMap;
use parking_lot::Mutex;
use std::sync::Arc;

use crate::{clock::Clock, models::{JobRecord, JobTransition}};

pub const DEFAULT_CAPACITY: usize = 100;

#[async_trait]
pub trait JobStore: Send + Sync {
    /// Stores a new record. Returns `false` if the id is already taken,
    /// in which case nothing is written.
    async fn put(&self, record: JobRecord) -> bool;

    /// `None` for unknown or evicted ids.
    async fn get(&self, id: &str) -> Option<JobRecord>;

    /// Applies `transition` atomically and returns the record as stored
    /// afterwards. Terminal records come back unchanged.
    async fn update(&self, id: &str, transition: JobTransition) -> Option<JobRecord>;

    /// Runs the eviction policy and returns the ids that were dropped.
    async fn evict(&self) -> Vec<String>;

    async fn len(&self) -> usize;
}

/// Decides how many of the oldest entries must go.
pub trait EvictionPolicy: Send + Sync {
    fn excess(&self, len: usize) -> usize;
}

/// Insertion-order eviction once `max_entries` is exceeded.
#[derive(Debug, Clone, Copy)]
pub struct FifoEviction {
    pub max_entries: usize,
}

impl Default for FifoEviction {
    fn default() -> Self {
        Self { max_entries: DEFAULT_CAPACITY }
    }
}

impl EvictionPolicy for FifoEviction {
    fn excess(&self, len: usize) -> usize {
        len.saturating_sub(self.max_entries)
    }
}

pub struct MemoryJobStore {
    jobs: Mutex<IndexMap<String, JobRecord>>,
    policy: Box<dyn EvictionPolicy>,
    clock: Arc<dyn Clock>,
}

impl MemoryJobStore {
    pub fn new(policy: impl EvictionPolicy + 'static, clock: Arc<dyn Clock>) -> Self {
        Self { jobs: Mutex::new(IndexMap::new()), policy: Box::new(policy), clock }
    }

    fn evict_locked(&self, jobs: &mut IndexMap<String, JobRecord>) -> Vec<String> {
        let excess = self.policy.excess(jobs.len());
        // `drain` keeps the relative order of the survivors.
        let evicted: Vec<String> = jobs.drain(..excess).map(|(id, _)| id).collect();
        if !evicted.is_empty() {
            tracing::info!(count = evicted.len(), remaining = jobs.len(), "Evicted oldest jobs");
        }
        evicted
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn put(&self, record: JobRecord) -> bool {
        let mut jobs = self.jobs.lock();
        if jobs.contains_key(&record.id) {
            return false;
        }
        jobs.insert(record.id.clone(), record);
        self.evict_locked(&mut jobs);
        true
    }

    async fn get(&self, id: &str) -> Option<JobRecord> {
        self.jobs.lock().get(id).cloned()
    }

    async fn update(&self, id: &str, transition: JobTransition) -> Option<JobRecord> {
        let now = self.clock.now();
        let mut jobs = self.jobs.lock();
        let job = jobs.get_mut(id)?;
        job.apply(transition, now);
        Some(job.clone())
    }

    async fn evict(&self) -> Vec<String> {
        let mut jobs = self.jobs.lock();
        self.evict_locked(&mut jobs)
    }

    async fn len(&self) -> usize {
        self.jobs.lock().len()
    }
}
