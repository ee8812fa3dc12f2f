//! Per-job in-process state the pool consults before claiming (§4.3).
//!
//! Tracks how many workers currently hold a task for a job (bounded by the
//! job's configured `concurrency`) and a cancellation flag workers check
//! before claiming their next task. Keyed in a `DashMap` the same way
//! `ServiceStatusRegistry` keys service health, just with richer values.

use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use uuid::Uuid;

pub struct JobState {
    pub domain_id: i32,
    pub concurrency: usize,
    pub find_links: bool,
    pub include_paths: Vec<String>,
    pub exclude_paths: Vec<String>,
    active_workers: AtomicUsize,
    cancelled: AtomicBool,
}

impl JobState {
    fn new(
        domain_id: i32,
        concurrency: usize,
        find_links: bool,
        include_paths: Vec<String>,
        exclude_paths: Vec<String>,
    ) -> Self {
        Self {
            domain_id,
            concurrency,
            find_links,
            include_paths,
            exclude_paths,
            active_workers: AtomicUsize::new(0),
            cancelled: AtomicBool::new(false),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    pub fn has_capacity(&self) -> bool {
        self.active_workers.load(Ordering::Acquire) < self.concurrency
    }

    pub fn active_workers(&self) -> usize {
        self.active_workers.load(Ordering::Acquire)
    }
}

/// Tracks live jobs the pool is currently dispatching for.
#[derive(Clone, Default)]
pub struct JobRegistry {
    inner: Arc<DashMap<Uuid, Arc<JobState>>>,
}

/// RAII guard incrementing a job's active-worker count for the lifetime of
/// one claimed task; decrements on drop regardless of how the task ends.
pub struct WorkerSlot {
    state: Arc<JobState>,
}

impl Drop for WorkerSlot {
    fn drop(&mut self) {
        self.state.active_workers.fetch_sub(1, Ordering::AcqRel);
    }
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &self,
        job_id: Uuid,
        domain_id: i32,
        concurrency: usize,
        find_links: bool,
        include_paths: Vec<String>,
        exclude_paths: Vec<String>,
    ) {
        self.inner.insert(
            job_id,
            Arc::new(JobState::new(
                domain_id,
                concurrency,
                find_links,
                include_paths,
                exclude_paths,
            )),
        );
    }

    pub fn unregister(&self, job_id: &Uuid) {
        self.inner.remove(job_id);
    }

    pub fn cancel(&self, job_id: &Uuid) {
        if let Some(state) = self.inner.get(job_id) {
            state.cancelled.store(true, Ordering::Release);
        }
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// All job ids currently registered, regardless of eligibility — used by
    /// recovery's reconciliation sweep to check each against Store state.
    pub fn job_ids(&self) -> Vec<Uuid> {
        self.inner.iter().map(|entry| *entry.key()).collect()
    }

    /// Job ids currently eligible to have a task claimed: registered, not
    /// cancelled, with spare per-job concurrency.
    pub fn eligible_job_ids(&self) -> Vec<Uuid> {
        self.inner
            .iter()
            .filter(|entry| !entry.value().is_cancelled() && entry.value().has_capacity())
            .map(|entry| *entry.key())
            .collect()
    }

    pub fn domain_of(&self, job_id: &Uuid) -> Option<i32> {
        self.inner.get(job_id).map(|s| s.domain_id)
    }

    pub fn find_links_for(&self, job_id: &Uuid) -> bool {
        self.inner.get(job_id).map(|s| s.find_links).unwrap_or(false)
    }

    /// (include_paths, exclude_paths) configured for the job, empty if it's
    /// no longer registered.
    pub fn path_filters_for(&self, job_id: &Uuid) -> (Vec<String>, Vec<String>) {
        self.inner
            .get(job_id)
            .map(|s| (s.include_paths.clone(), s.exclude_paths.clone()))
            .unwrap_or_default()
    }

    /// Reserve a worker slot for `job_id`; panics if the job was deregistered
    /// between `eligible_job_ids` and the claim (indicates a logic bug).
    pub fn reserve(&self, job_id: &Uuid) -> WorkerSlot {
        let state = self
            .inner
            .get(job_id)
            .expect("job deregistered while a task for it was in flight")
            .clone();
        state.active_workers.fetch_add(1, Ordering::AcqRel);
        WorkerSlot { state }
    }
}
