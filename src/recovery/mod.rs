//! Recovery (§4.5): stuck-task and stuck-job reset, plus reconciling the
//! worker pool's in-process `JobRegistry` against jobs Store already
//! considers terminal. A `tokio::select!` loop between a sleep and
//! shutdown, with the sleep interval computed once up front rather than a
//! cron expression, since there is nothing here that needs sub-minute
//! precision.

use crate::store::{jobs, tasks, Store};
use crate::worker_pool::{self, PoolHandle};
use num_format::{Locale, ToFormattedString};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time;
use tracing::{info, warn};

#[derive(Clone)]
pub struct Recovery {
    store: Store,
    stuck_task_threshold: Duration,
    recovery_interval: Duration,
    pool: Option<PoolHandle>,
}

impl Recovery {
    pub fn new(store: Store, stuck_task_threshold: Duration, recovery_interval: Duration) -> Self {
        Self {
            store,
            stuck_task_threshold,
            recovery_interval,
            pool: None,
        }
    }

    /// Attach the worker pool handle so the periodic sweep can also
    /// reconcile `JobRegistry` against jobs Store already considers
    /// terminal (§4.3). Set by `WorkerPoolService::new` once the handle
    /// exists, since `Recovery` is constructed before it.
    pub fn with_pool_handle(mut self, pool: PoolHandle) -> Self {
        self.pool = Some(pool);
        self
    }

    /// Run once, at process start, before workers begin claiming (§4.5).
    pub async fn recover_on_boot(&self) -> anyhow::Result<()> {
        let swept = self.sweep().await?;
        if !swept.is_noop() {
            info!(
                stuck_tasks = swept.stuck_tasks.to_formatted_string(&Locale::en),
                stuck_jobs = swept.stuck_jobs.to_formatted_string(&Locale::en),
                reconciled_jobs = swept.reconciled,
                "recovered state from previous run"
            );
        }
        Ok(())
    }

    /// Run forever on the configured interval until shutdown (§4.5).
    pub async fn run_periodic(&self, mut shutdown_rx: broadcast::Receiver<()>) {
        info!("recovery loop started");
        loop {
            tokio::select! {
                _ = time::sleep(self.recovery_interval) => {
                    match self.sweep().await {
                        Ok(swept) if !swept.is_noop() => {
                            info!(
                                stuck_tasks = swept.stuck_tasks.to_formatted_string(&Locale::en),
                                stuck_jobs = swept.stuck_jobs.to_formatted_string(&Locale::en),
                                reconciled_jobs = swept.reconciled,
                                "recovery sweep reset stuck state"
                            );
                        }
                        Ok(_) => {}
                        Err(e) => warn!(error = %e, "recovery sweep failed"),
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("recovery loop exiting");
                    break;
                }
            }
        }
    }

    async fn sweep(&self) -> anyhow::Result<SweepResult> {
        let threshold_secs = self.stuck_task_threshold.as_secs() as i64;
        let stuck_tasks = self
            .store
            .execute_maintenance(move |conn| {
                Box::pin(async move { tasks::reset_stuck(conn, threshold_secs).await })
            })
            .await?;

        let stuck_job_ids = self
            .store
            .execute_maintenance(|conn| Box::pin(async move { jobs::find_stuck(conn).await }))
            .await?;

        for job_id in &stuck_job_ids {
            let job_id = *job_id;
            self.store
                .execute_maintenance(move |conn| {
                    Box::pin(async move { jobs::recalculate(conn, job_id).await })
                })
                .await?;
        }

        let reconciled = if let Some(pool) = &self.pool {
            worker_pool::reconcile_registry(&self.store, pool).await?
        } else {
            0
        };

        Ok(SweepResult {
            stuck_tasks,
            stuck_jobs: stuck_job_ids.len() as i64,
            reconciled,
        })
    }
}

struct SweepResult {
    stuck_tasks: i64,
    stuck_jobs: i64,
    reconciled: usize,
}

impl SweepResult {
    fn is_noop(&self) -> bool {
        self.stuck_tasks == 0 && self.stuck_jobs == 0 && self.reconciled == 0
    }
}
