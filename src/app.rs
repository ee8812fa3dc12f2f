//! Application wiring: `Store`, `Fetcher`, `TaskQueue`, `WorkerPoolService`,
//! `JobManager`/`SchedulerService`, the thin `api` router, and the
//! `ServiceManager` that runs them.

use crate::api::{ApiService, ApiState};
use crate::config::Config;
use crate::fetcher::http::HttpFetcher;
use crate::fetcher::Fetcher;
use crate::job_manager::{JobManager, SchedulerService};
use crate::recovery::Recovery;
use crate::services::manager::ServiceManager;
use crate::status::ServiceStatusRegistry;
use crate::store::Store;
use crate::task_queue::TaskQueue;
use crate::worker_pool::WorkerPoolService;
use anyhow::Context;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::info;

/// Top-level application struct holding every long-lived component the
/// services are built from.
pub struct App {
    config: Config,
    service_statuses: ServiceStatusRegistry,
    store: Store,
    fetcher: Arc<dyn Fetcher>,
    queue: TaskQueue,
    job_manager: JobManager,
    service_manager: ServiceManager,
}

impl App {
    /// Connect the Store (which runs `ensure_schema`) and construct every
    /// component short of spawning services. `config` is loaded by the
    /// caller via `Config::load()` before logging is configured, so errors
    /// here are already loggable.
    pub async fn new(config: Config) -> Result<Self, anyhow::Error> {
        let store = Store::connect(&config.database_url, config.db_max_open_conns)
            .await
            .context("failed to connect to database")?;

        let service_statuses = ServiceStatusRegistry::new();
        let fetcher: Arc<dyn Fetcher> =
            Arc::new(HttpFetcher::new().context("failed to build HTTP fetcher")?);
        let queue = TaskQueue::new(store.clone(), config.task.max_retries);

        let recovery = Recovery::new(
            store.clone(),
            config.stuck_task_threshold,
            config.recovery_interval,
        );

        let (worker_pool, pool_handle) =
            WorkerPoolService::new(queue.clone(), fetcher.clone(), recovery, &config, service_statuses.clone());

        let job_manager = JobManager::new(store.clone(), queue.clone(), fetcher.clone(), pool_handle, &config);

        let mut service_manager = ServiceManager::new();
        service_manager.register_service("worker_pool", Box::new(worker_pool));
        service_manager.register_service("scheduler", Box::new(SchedulerService::new(job_manager.clone())));

        let api_state = ApiState {
            jobs: job_manager.clone(),
            service_statuses: service_statuses.clone(),
        };
        service_manager.register_service("api", Box::new(ApiService::new(config.port, api_state)));

        info!(
            port = config.port,
            shutdown_timeout = format!("{:.2?}", config.shutdown_timeout),
            "configuration loaded"
        );

        Ok(App {
            config,
            service_statuses,
            store,
            fetcher,
            queue,
            job_manager,
            service_manager,
        })
    }

    /// Spawn every registered service.
    pub fn start_services(&mut self) {
        self.service_manager.spawn_all();
    }

    /// Run until a service exits or a shutdown signal arrives.
    pub async fn run(self) -> ExitCode {
        use crate::signals::handle_shutdown_signals;
        handle_shutdown_signals(self.service_manager, self.config.shutdown_timeout).await
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn service_statuses(&self) -> &ServiceStatusRegistry {
        &self.service_statuses
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn fetcher(&self) -> &Arc<dyn Fetcher> {
        &self.fetcher
    }

    pub fn queue(&self) -> &TaskQueue {
        &self.queue
    }

    pub fn job_manager(&self) -> &JobManager {
        &self.job_manager
    }
}
