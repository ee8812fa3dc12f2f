//! Job Manager (§4.4): translates a user request into a durable Job plus
//! its initial URL set, and exposes status queries. The scheduler tick is
//! a `Service` running a `tokio::select!` loop against a shutdown channel
//! on a configurable per-component interval.

pub mod discovery;
pub mod validation;

use crate::config::Config;
use crate::error::Result;
use crate::fetcher::{FetchOptions, Fetcher};
use crate::models::{Job, JobStatus, Scheduler, SourceType};
use crate::services::Service;
use crate::store::{domains, jobs, schedulers, Store};
use crate::task_queue::{QueuedUrl, TaskQueue};
use crate::worker_pool::PoolHandle;
use chrono::{DateTime, Utc};
use discovery::{discover, DiscoveryOptions, RobotsCache, ROBOTS_CACHE_TTL};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Clone)]
pub struct JobManager {
    store: Store,
    queue: TaskQueue,
    fetcher: Arc<dyn Fetcher>,
    pool: PoolHandle,
    user_agent: String,
    scheduler_tick_interval: Duration,
    robots_cache: RobotsCache,
}

pub struct CreateJobOptions {
    pub organisation_id: Uuid,
    pub user_id: Uuid,
    pub domain: String,
    pub concurrency: i32,
    pub find_links: bool,
    pub max_pages: i32,
    pub include_paths: Vec<String>,
    pub exclude_paths: Vec<String>,
    pub use_sitemap: bool,
    pub manual_urls: Vec<String>,
    pub required_workers: i32,
    pub source_type: SourceType,
}

pub struct ListJobsOptions {
    pub organisation_id: Uuid,
    pub status: Option<JobStatus>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub page: i64,
    pub page_size: i64,
}

impl JobManager {
    pub fn new(
        store: Store,
        queue: TaskQueue,
        fetcher: Arc<dyn Fetcher>,
        pool: PoolHandle,
        config: &Config,
    ) -> Self {
        Self {
            store,
            queue,
            fetcher,
            pool,
            user_agent: config.user_agent.clone(),
            scheduler_tick_interval: config.scheduler_tick_interval,
            robots_cache: RobotsCache::new(ROBOTS_CACHE_TTL),
        }
    }

    /// CreateJob(options) — §4.4.
    pub async fn create_job(&self, options: CreateJobOptions) -> anyhow::Result<Job> {
        let domain_name = validation::validate_and_normalize(&options.domain)?;
        let organisation_id = options.organisation_id;
        let user_id = options.user_id;
        let concurrency = options.concurrency;
        let find_links = options.find_links;
        let max_pages = options.max_pages;
        let include_paths = options.include_paths.clone();
        let exclude_paths = options.exclude_paths.clone();
        let use_sitemap = options.use_sitemap;
        let manual_urls = options.manual_urls.clone();
        let required_workers = options.required_workers;
        let source_type = options.source_type;

        let domain = self
            .store
            .execute(move |conn| {
                let domain_name = domain_name.clone();
                Box::pin(async move { domains::find_or_create(conn, &domain_name).await })
            })
            .await?;
        let domain_id = domain.id;

        // Step 3: supersede any existing active job for this (org, domain).
        let existing = self
            .store
            .execute(move |conn| {
                Box::pin(async move {
                    jobs::find_active_for_org_domain(conn, organisation_id, domain_id).await
                })
            })
            .await?;
        if let Some(existing) = existing {
            if let Err(e) = self.cancel_job(existing.id).await {
                warn!(job_id = %existing.id, error = %e, "failed to cancel superseded job");
            }
        }

        let include_paths_for_insert = include_paths.clone();
        let exclude_paths_for_insert = exclude_paths.clone();
        let job = self
            .store
            .execute(move |conn| {
                let new_job = jobs::NewJob {
                    domain_id,
                    organisation_id,
                    user_id,
                    concurrency,
                    find_links,
                    max_pages,
                    include_paths: include_paths_for_insert.clone(),
                    exclude_paths: exclude_paths_for_insert.clone(),
                    use_sitemap,
                    source_type,
                    required_workers,
                };
                Box::pin(async move { jobs::create(conn, new_job).await })
            })
            .await?;

        self.spawn_discovery_and_start(job.clone(), manual_urls);
        Ok(job)
    }

    /// Kick off URL discovery in the background after the creating
    /// transaction commits, then transition the job to `running` (§4.4
    /// steps 5-6). Spawned rather than awaited so `create_job` returns
    /// immediately with the pending job row.
    fn spawn_discovery_and_start(&self, job: Job, manual_urls: Vec<String>) {
        let manager = self.clone();
        tokio::spawn(async move {
            if let Err(e) = manager.run_discovery(&job, &manual_urls).await {
                warn!(job_id = %job.id, error = %e, "discovery failed");
                let _ = manager
                    .store
                    .execute(move |conn| {
                        let message = e.to_string();
                        Box::pin(async move { jobs::fail(conn, job.id, &message).await })
                    })
                    .await;
                return;
            }

            let job_id = job.id;
            if let Err(e) = manager
                .store
                .execute(move |conn| Box::pin(async move { jobs::start(conn, job_id).await }))
                .await
            {
                warn!(job_id = %job_id, error = %e, "failed to start job after discovery");
                return;
            }

            manager.pool.register_job(
                job.id,
                job.domain_id,
                job.concurrency,
                job.find_links,
                job.include_paths.clone(),
                job.exclude_paths.clone(),
            );
            info!(job_id = %job.id, "job running");
        });
    }

    async fn run_discovery(&self, job: &Job, manual_urls: &[String]) -> Result<()> {
        let domain_id = job.domain_id;
        let domain = self
            .store
            .execute(move |conn| Box::pin(async move { domains::find_by_id(conn, domain_id).await }))
            .await?
            .ok_or_else(|| crate::error::EngineError::InvalidInput("domain vanished".into()))?;

        let options = DiscoveryOptions {
            domain: &domain.name,
            use_sitemap: job.use_sitemap,
            manual_urls,
            include_paths: &job.include_paths,
            exclude_paths: &job.exclude_paths,
            max_pages: job.max_pages,
        };

        let discovered = discover(self.fetcher.as_ref(), &self.robots_cache, &options).await;
        let source_type = discovered
            .first()
            .map(|d| d.source_type)
            .unwrap_or(SourceType::Fallback);

        let queued: Vec<QueuedUrl> = discovered
            .into_iter()
            .map(|d| QueuedUrl {
                domain_name: domain.name.clone(),
                path: d.path,
                priority: d.priority,
                depth: 0,
            })
            .collect();

        self.queue
            .enqueue_urls(job.id, queued, source_type, None)
            .await?;
        Ok(())
    }

    /// GetJobStatus(jobID) — §4.4.
    pub async fn get_job_status(&self, job_id: Uuid) -> anyhow::Result<Option<Job>> {
        Ok(self
            .store
            .execute(move |conn| Box::pin(async move { jobs::find_by_id(conn, job_id).await }))
            .await?)
    }

    /// ListJobs — §4.4, pagination + status/date-range filter.
    pub async fn list_jobs(&self, options: ListJobsOptions) -> anyhow::Result<Vec<Job>> {
        let page_size = options.page_size.max(1);
        let offset = options.page.max(0) * page_size;
        let filter = jobs::ListFilter {
            organisation_id: options.organisation_id,
            status: options.status,
            since: options.since,
            until: options.until,
            limit: page_size,
            offset,
        };
        Ok(self
            .store
            .execute(move |conn| {
                let filter = jobs::ListFilter {
                    organisation_id: filter.organisation_id,
                    status: filter.status,
                    since: filter.since,
                    until: filter.until,
                    limit: filter.limit,
                    offset: filter.offset,
                };
                Box::pin(async move { jobs::list(conn, filter).await })
            })
            .await?)
    }

    /// Cancel a job: durable `status='cancelled'` plus skip of all
    /// non-terminal tasks (§4.3 cancellation), and stop the pool from
    /// claiming further tasks for it.
    pub async fn cancel_job(&self, job_id: Uuid) -> anyhow::Result<()> {
        self.pool.cancel_job(&job_id);
        self.store
            .execute(move |conn| {
                Box::pin(async move {
                    jobs::cancel(conn, job_id).await?;
                    tasks_skip_non_terminal(conn, job_id).await
                })
            })
            .await?;
        self.pool.deregister_job(&job_id);
        Ok(())
    }

    /// Scheduler tick (§4.4): schedulers due now produce a Job each, unless
    /// a previous job for the same scheduler is still running.
    async fn tick(&self) {
        let due: Vec<Scheduler> = match self
            .store
            .execute_maintenance(|conn| Box::pin(async move { schedulers::find_due(conn).await }))
            .await
        {
            Ok(due) => due,
            Err(e) => {
                warn!(error = %e, "failed to query due schedulers");
                return;
            }
        };

        for scheduler in due {
            let overlapping = self
                .store
                .execute_maintenance(move |conn| {
                    Box::pin(async move {
                        schedulers::has_running_job(conn, scheduler.domain_id, scheduler.organisation_id).await
                    })
                })
                .await
                .unwrap_or(true);
            if overlapping {
                continue;
            }

            let domain = match self
                .store
                .execute(move |conn| Box::pin(async move { domains::find_by_id(conn, scheduler.domain_id).await }))
                .await
            {
                Ok(Some(domain)) => domain,
                _ => continue,
            };

            let options = CreateJobOptions {
                organisation_id: scheduler.organisation_id,
                user_id: scheduler.organisation_id,
                domain: domain.name,
                concurrency: scheduler.concurrency,
                find_links: scheduler.find_links,
                max_pages: scheduler.max_pages,
                include_paths: scheduler.include_paths.clone(),
                exclude_paths: scheduler.exclude_paths.clone(),
                use_sitemap: true,
                manual_urls: Vec::new(),
                required_workers: scheduler.required_workers,
                source_type: SourceType::Scheduler,
            };
            if let Err(e) = self.create_job(options).await {
                warn!(scheduler_id = %scheduler.id, error = %e, "scheduler tick failed to create job");
                continue;
            }

            let _ = self
                .store
                .execute_maintenance(move |conn| {
                    Box::pin(async move {
                        schedulers::advance(conn, scheduler.id, scheduler.schedule_interval_hours).await
                    })
                })
                .await;
        }
    }
}

async fn tasks_skip_non_terminal(
    conn: &mut sqlx::PgConnection,
    job_id: Uuid,
) -> Result<()> {
    crate::store::tasks::skip_non_terminal_for_job(conn, job_id).await?;
    Ok(())
}

pub struct SchedulerService {
    manager: JobManager,
}

impl SchedulerService {
    pub fn new(manager: JobManager) -> Self {
        Self { manager }
    }
}

#[async_trait::async_trait]
impl Service for SchedulerService {
    fn name(&self) -> &'static str {
        "scheduler"
    }

    async fn run(&mut self) -> std::result::Result<(), anyhow::Error> {
        // `run_service` races this future against the shutdown channel and
        // drops it on signal, so this loop relies on outer cancellation
        // rather than its own receiver.
        loop {
            tokio::time::sleep(self.manager.scheduler_tick_interval).await;
            self.manager.tick().await;
        }
    }

    async fn shutdown(&mut self) -> std::result::Result<(), anyhow::Error> {
        Ok(())
    }
}
