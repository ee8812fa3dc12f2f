//! Task Queue (§4.2).
//!
//! A thin layer over `Store` that gives the rest of the engine the six
//! named operations from the design doc, each wrapped in a single
//! transaction via `Store::execute`. Callers never see `sqlx` or raw SQL.

pub mod priority;

use crate::error::{EngineError, Result};
use crate::models::{SourceType, Task};
use crate::store::tasks::{NewTask, RetryDecision, TaskResult};
use crate::store::{domains, pages, tasks, Store};
use uuid::Uuid;

#[derive(Clone)]
pub struct TaskQueue {
    store: Store,
    max_retries: i32,
}

/// One URL to enqueue, prior to page resolution.
pub struct QueuedUrl {
    pub domain_name: String,
    pub path: String,
    pub priority: f64,
    pub depth: i32,
}

impl TaskQueue {
    pub fn new(store: Store, max_retries: i32) -> Self {
        Self { store, max_retries }
    }

    /// EnqueueURLs(jobID, pages[], sourceType, sourceURL) — §4.2.
    pub async fn enqueue_urls(
        &self,
        job_id: Uuid,
        urls: Vec<QueuedUrl>,
        source_type: SourceType,
        source_url: Option<String>,
    ) -> Result<i64> {
        self.store
            .execute(move |conn| {
                let urls = &urls;
                let source_url = source_url.clone();
                Box::pin(async move {
                    let mut new_tasks = Vec::with_capacity(urls.len());
                    let mut seen = std::collections::HashSet::new();
                    for url in urls {
                        if !seen.insert((url.domain_name.clone(), url.path.clone())) {
                            continue;
                        }
                        let domain = domains::find_or_create(conn, &url.domain_name).await?;
                        let page = pages::find_or_create(conn, domain.id, &url.path).await?;
                        new_tasks.push(NewTask {
                            page_id: page.id,
                            priority: url.priority,
                            depth: url.depth,
                        });
                    }
                    tasks::insert_missing(
                        conn,
                        job_id,
                        &new_tasks,
                        source_type,
                        source_url.as_deref(),
                    )
                    .await
                })
            })
            .await
    }

    /// ClaimNext(jobScope) — §4.2.
    pub async fn claim_next(&self, job_ids: Vec<Uuid>) -> Result<Option<Task>> {
        self.store
            .execute(move |conn| {
                let job_ids = job_ids.clone();
                Box::pin(async move { tasks::claim_next(conn, &job_ids).await })
            })
            .await
    }

    /// Complete(task, result) — §4.2. Recalculates job aggregates in the
    /// same transaction for consistency (§7).
    pub async fn complete(&self, task_id: Uuid, job_id: Uuid, result: TaskResult) -> Result<()> {
        self.store
            .execute(move |conn| {
                let result = TaskResult {
                    status_code: result.status_code,
                    response_time_ms: result.response_time_ms,
                    cache_status: result.cache_status.clone(),
                    content_type: result.content_type.clone(),
                    redirect_url: result.redirect_url.clone(),
                };
                Box::pin(async move {
                    tasks::complete(conn, task_id, result).await?;
                    crate::store::jobs::recalculate(conn, job_id).await
                })
            })
            .await
    }

    /// Fail(task, err, retryPolicy) — §4.2. Retries below `max_retries`,
    /// otherwise gives up and recalculates job aggregates.
    pub async fn fail(
        &self,
        task_id: Uuid,
        job_id: Uuid,
        retry_count: i32,
        error: String,
        retryable: bool,
    ) -> Result<()> {
        let max_retries = self.max_retries;
        self.store
            .execute(move |conn| {
                let error = error.clone();
                Box::pin(async move {
                    let decision = if retryable && retry_count < max_retries {
                        RetryDecision::Retry
                    } else {
                        RetryDecision::GiveUp
                    };
                    let is_final = matches!(decision, RetryDecision::GiveUp);
                    tasks::fail(conn, task_id, &error, decision).await?;
                    if is_final {
                        crate::store::jobs::recalculate(conn, job_id).await?;
                    }
                    Ok(())
                })
            })
            .await
    }

    /// Skip(task, reason) — §4.2.
    pub async fn skip(&self, task_id: Uuid, job_id: Uuid, reason: String) -> Result<()> {
        self.store
            .execute(move |conn| {
                let reason = reason.clone();
                Box::pin(async move {
                    tasks::skip(conn, task_id, &reason).await?;
                    crate::store::jobs::recalculate(conn, job_id).await
                })
            })
            .await
    }

    /// RecalculateJob(jobID) — §4.2.
    pub async fn recalculate_job(&self, job_id: Uuid) -> Result<()> {
        self.store
            .execute(move |conn| Box::pin(async move { crate::store::jobs::recalculate(conn, job_id).await }))
            .await
    }

    /// Page ids already enqueued for a job, for the worker's link-dedup step (§4.3).
    pub async fn existing_page_ids(&self, job_id: Uuid) -> Result<Vec<i32>> {
        self.store
            .execute(move |conn| Box::pin(async move { tasks::existing_page_ids(conn, job_id).await }))
            .await
    }

    pub(crate) fn store(&self) -> &Store {
        &self.store
    }
}

/// Classify a fetch-side failure as retryable or not for `Fail`'s retry policy.
pub fn is_retryable(err: &EngineError) -> bool {
    matches!(err, EngineError::FetchTransient(_) | EngineError::StorageTransient(_))
}
