//! Worker Pool (§4.3): the in-process scheduler. A `Service` impl that
//! spawns a fixed internal shutdown broadcast channel and collects
//! `JoinHandle`s to await on `shutdown`, with a periodic rescale loop
//! (§4.3 dynamic scaling) on top of the worker loops themselves:
//! workers, a scaler, and (owned by this service so it shares the worker
//! count) recovery.

pub mod domain_limiter;
pub mod job_state;
pub mod worker;

use crate::config::{Config, PoolConfig};
use crate::fetcher::Fetcher;
use crate::job_manager::discovery::{RobotsCache, ROBOTS_CACHE_TTL};
use crate::recovery::Recovery;
use crate::services::Service;
use crate::status::{ServiceStatus, ServiceStatusRegistry};
use crate::store::jobs as jobs_store;
use crate::store::Store;
use crate::task_queue::TaskQueue;
use domain_limiter::DomainLimiter;
use job_state::JobRegistry;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;
use worker::Worker;

const RESCALE_INTERVAL: Duration = Duration::from_secs(5);

/// Handle the rest of the engine uses to tell the pool about job lifecycle
/// events; cheap to clone, shared with the Job Manager.
#[derive(Clone)]
pub struct PoolHandle {
    registry: JobRegistry,
}

impl PoolHandle {
    #[allow(clippy::too_many_arguments)]
    pub fn register_job(
        &self,
        job_id: Uuid,
        domain_id: i32,
        concurrency: i32,
        find_links: bool,
        include_paths: Vec<String>,
        exclude_paths: Vec<String>,
    ) {
        self.registry.register(
            job_id,
            domain_id,
            concurrency.max(1) as usize,
            find_links,
            include_paths,
            exclude_paths,
        );
    }

    pub fn active_job_count(&self) -> usize {
        self.registry.len()
    }

    pub fn registered_job_ids(&self) -> Vec<Uuid> {
        self.registry.job_ids()
    }

    /// `CancelJobTasks(jobID)` (§4.3): flips the in-process flag workers
    /// check before claiming. The caller is responsible for the durable
    /// `status='cancelled'` transition and the skip-non-terminal-tasks
    /// update via the Task Queue; this only stops new claims.
    pub fn cancel_job(&self, job_id: &Uuid) {
        self.registry.cancel(job_id);
    }

    pub fn deregister_job(&self, job_id: &Uuid) {
        self.registry.unregister(job_id);
    }
}

pub struct WorkerPoolService {
    queue: TaskQueue,
    fetcher: Arc<dyn Fetcher>,
    recovery: Recovery,
    pool_config: PoolConfig,
    user_agent: String,
    fetch_timeout: Duration,
    registry: JobRegistry,
    limiter: DomainLimiter,
    robots_cache: RobotsCache,
    service_statuses: ServiceStatusRegistry,
    worker_handles: Vec<JoinHandle<()>>,
    scaler_handle: Option<JoinHandle<()>>,
    recovery_handle: Option<JoinHandle<()>>,
    shutdown_tx: Option<broadcast::Sender<()>>,
    stopped: Arc<AtomicBool>,
    target_workers: Arc<AtomicUsize>,
}

impl WorkerPoolService {
    pub fn new(
        queue: TaskQueue,
        fetcher: Arc<dyn Fetcher>,
        recovery: Recovery,
        config: &Config,
        service_statuses: ServiceStatusRegistry,
    ) -> (Self, PoolHandle) {
        let registry = JobRegistry::new();
        let handle = PoolHandle {
            registry: registry.clone(),
        };
        let recovery = recovery.with_pool_handle(handle.clone());
        let service = Self {
            queue,
            fetcher,
            recovery,
            pool_config: config.pool.clone(),
            user_agent: config.user_agent.clone(),
            fetch_timeout: config.task.fetch_timeout,
            registry,
            limiter: DomainLimiter::new(),
            robots_cache: RobotsCache::new(ROBOTS_CACHE_TTL),
            service_statuses,
            worker_handles: Vec::new(),
            scaler_handle: None,
            recovery_handle: None,
            shutdown_tx: None,
            stopped: Arc::new(AtomicBool::new(false)),
            target_workers: Arc::new(AtomicUsize::new(config.pool.base_workers)),
        };
        (service, handle)
    }

    /// N = min(pool_cap, base + active_jobs * per_job_factor) (§4.3 dynamic scaling).
    fn desired_worker_count(&self) -> usize {
        let active_jobs = self.registry.len();
        let desired = self.pool_config.base_workers + active_jobs * self.pool_config.per_job_workers;
        desired.min(self.pool_config.max_workers)
    }

    fn spawn_worker(&self, id: usize, shutdown_tx: &broadcast::Sender<()>) -> JoinHandle<()> {
        let worker = Worker::new(
            id,
            self.registry.clone(),
            self.limiter.clone(),
            self.queue.clone(),
            self.fetcher.clone(),
            self.user_agent.clone(),
            self.fetch_timeout,
            self.robots_cache.clone(),
        );
        let shutdown_rx = shutdown_tx.subscribe();
        let stopped = self.stopped.clone();
        tokio::spawn(async move { worker.run(shutdown_rx, stopped).await })
    }

    /// Periodically recompute the target worker count; scale up immediately,
    /// scale down only after a sustained period of lower demand (§4.3).
    async fn run_scaler(&mut self, shutdown_tx: broadcast::Sender<()>) {
        let scale_down_delay = self.pool_config.scale_down_delay;
        let mut low_demand_since: Option<tokio::time::Instant> = None;
        let mut next_id = self.worker_handles.len();

        loop {
            tokio::time::sleep(RESCALE_INTERVAL).await;
            if self.stopped.load(Ordering::Acquire) {
                return;
            }

            let desired = self.desired_worker_count();
            let current = self.worker_handles.len();

            if desired > current {
                for _ in current..desired {
                    let handle = self.spawn_worker(next_id, &shutdown_tx);
                    self.worker_handles.push(handle);
                    next_id += 1;
                }
                low_demand_since = None;
                info!(current = self.worker_handles.len(), "scaled worker pool up");
            } else if desired < current {
                let since = low_demand_since.get_or_insert_with(tokio::time::Instant::now);
                if since.elapsed() >= scale_down_delay {
                    let excess = current - desired;
                    for _ in 0..excess {
                        if let Some(handle) = self.worker_handles.pop() {
                            handle.abort();
                        }
                    }
                    low_demand_since = None;
                    info!(current = self.worker_handles.len(), "scaled worker pool down");
                }
            } else {
                low_demand_since = None;
            }

            self.target_workers.store(desired, Ordering::Release);
        }
    }
}

#[async_trait::async_trait]
impl Service for WorkerPoolService {
    fn name(&self) -> &'static str {
        "worker_pool"
    }

    async fn run(&mut self) -> Result<(), anyhow::Error> {
        info!("worker pool starting");
        self.recovery.recover_on_boot().await?;

        let (shutdown_tx, _) = broadcast::channel(1);
        self.shutdown_tx = Some(shutdown_tx.clone());

        for id in 0..self.pool_config.base_workers {
            let handle = self.spawn_worker(id, &shutdown_tx);
            self.worker_handles.push(handle);
        }
        self.service_statuses.set("worker_pool", ServiceStatus::Active);

        let recovery = self.recovery.clone();
        let recovery_shutdown = shutdown_tx.subscribe();
        self.recovery_handle = Some(tokio::spawn(async move {
            recovery.run_periodic(recovery_shutdown).await;
        }));

        // The scaler loop owns `&mut self`, so this service's `run` future
        // simply drives it until shutdown is requested from outside.
        self.run_scaler(shutdown_tx).await;
        Ok(())
    }

    async fn shutdown(&mut self) -> Result<(), anyhow::Error> {
        self.service_statuses
            .set("worker_pool", ServiceStatus::Disabled);
        self.stopped.store(true, Ordering::Release);

        let Some(shutdown_tx) = self.shutdown_tx.take() else {
            warn!("worker pool had no shutdown channel");
            return Err(anyhow::anyhow!("no shutdown channel available"));
        };
        let _ = shutdown_tx.send(());

        let mut handles = std::mem::take(&mut self.worker_handles);
        if let Some(h) = self.recovery_handle.take() {
            handles.push(h);
        }
        let results = futures::future::join_all(handles).await;
        let failed = results.iter().filter(|r| r.is_err()).count();
        if failed > 0 {
            warn!(failed, "some worker tasks panicked during shutdown");
            return Err(anyhow::anyhow!("{failed} task(s) panicked"));
        }

        info!("worker pool shut down cleanly");
        Ok(())
    }
}

/// `RecalculateJob`'s terminal transition (driven by `TaskQueue::complete`/
/// `fail` on a task completing a job) flips the Store row to `completed` but
/// has no way to reach `PoolHandle::deregister_job` from inside a `Store`
/// transaction; `JobManager::cancel_job` deregisters directly, but a job
/// that finishes normally stays registered until this sweep catches it and
/// deregisters anything the registry still holds that Store now considers
/// terminal. Called from `Recovery`'s periodic sweep.
pub async fn reconcile_registry(store: &Store, handle: &PoolHandle) -> anyhow::Result<usize> {
    let ids = handle.registered_job_ids();
    if ids.is_empty() {
        return Ok(0);
    }
    let store = store.clone();
    let terminal_ids = store
        .execute_maintenance(move |conn| {
            let ids = ids.clone();
            Box::pin(async move { jobs_store::find_terminal_among(conn, &ids).await })
        })
        .await?;
    for id in &terminal_ids {
        handle.deregister_job(id);
    }
    Ok(terminal_ids.len())
}
