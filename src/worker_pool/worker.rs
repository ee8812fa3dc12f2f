//! A single worker's task loop (§4.3): claim, process, update,
//! sleep-and-retry on empty queue.

use super::domain_limiter::DomainLimiter;
use super::job_state::JobRegistry;
use crate::error::classify_fetch_status;
use crate::fetcher::{FetchOptions, Fetcher, Link, LinkContext as FetchLinkContext};
use crate::job_manager::discovery::{fetch_robots, is_disallowed, passes_filters, RobotsCache};
use crate::models::{SourceType, Task};
use crate::store::{domains, pages};
use crate::task_queue::priority::{self, LinkContext as PriorityLinkContext};
use crate::task_queue::{is_retryable, QueuedUrl, TaskQueue};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, error, trace, warn};
use url::Url;

const EMPTY_QUEUE_BACKOFF: Duration = Duration::from_millis(500);

pub struct Worker {
    id: usize,
    registry: JobRegistry,
    limiter: DomainLimiter,
    queue: TaskQueue,
    fetcher: Arc<dyn Fetcher>,
    user_agent: String,
    fetch_timeout: Duration,
    robots_cache: RobotsCache,
}

impl Worker {
    pub fn new(
        id: usize,
        registry: JobRegistry,
        limiter: DomainLimiter,
        queue: TaskQueue,
        fetcher: Arc<dyn Fetcher>,
        user_agent: String,
        fetch_timeout: Duration,
        robots_cache: RobotsCache,
    ) -> Self {
        Self {
            id,
            registry,
            limiter,
            queue,
            fetcher,
            user_agent,
            fetch_timeout,
            robots_cache,
        }
    }

    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>, stopped: Arc<AtomicBool>) {
        debug!(worker_id = self.id, "worker started");
        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => break,
                _ = self.tick() => {}
            }
            if stopped.load(Ordering::Acquire) {
                break;
            }
        }
        debug!(worker_id = self.id, "worker stopped");
    }

    async fn tick(&self) {
        let eligible = self.eligible_job_ids_under_rate_limit().await;
        if eligible.is_empty() {
            tokio::time::sleep(EMPTY_QUEUE_BACKOFF).await;
            return;
        }

        let task = match self.queue.claim_next(eligible).await {
            Ok(Some(task)) => task,
            Ok(None) => {
                tokio::time::sleep(EMPTY_QUEUE_BACKOFF).await;
                return;
            }
            Err(e) => {
                warn!(worker_id = self.id, error = %e, "claim failed");
                tokio::time::sleep(EMPTY_QUEUE_BACKOFF).await;
                return;
            }
        };

        let _slot = self.registry.reserve(&task.job_id);
        if let Err(e) = self.process(task).await {
            error!(worker_id = self.id, error = %e, "task processing failed");
        }
    }

    /// Job ids that are registered, have spare per-job concurrency, and
    /// whose domain's next-allowed-fetch time has passed (§4.3 step 1).
    async fn eligible_job_ids_under_rate_limit(&self) -> Vec<uuid::Uuid> {
        let candidates = self.registry.eligible_job_ids();
        let mut eligible = Vec::with_capacity(candidates.len());
        for job_id in candidates {
            let Some(domain_id) = self.registry.domain_of(&job_id) else {
                continue;
            };
            let floor = self.domain_floor(domain_id).await;
            if self.limiter.is_eligible(domain_id, floor).await {
                eligible.push(job_id);
            }
        }
        eligible
    }

    async fn domain_floor(&self, domain_id: i32) -> Duration {
        let store = self.queue.store().clone();
        let floor = store
            .execute(move |conn| {
                Box::pin(async move { domains::find_by_id(conn, domain_id).await })
            })
            .await
            .ok()
            .flatten()
            .map(|d| d.adaptive_delay_floor_seconds)
            .unwrap_or(0.0);
        Duration::from_secs_f64(floor.max(0.0))
    }

    async fn process(&self, task: Task) -> anyhow::Result<()> {
        let store = self.queue.store().clone();
        let page_id = task.page_id;
        let page = store
            .execute(move |conn| Box::pin(async move { pages::find_by_id(conn, page_id).await }))
            .await?
            .ok_or_else(|| anyhow::anyhow!("page {page_id} vanished"))?;
        let domain_id = page.domain_id;
        let domain = store
            .execute(move |conn| Box::pin(async move { domains::find_by_id(conn, domain_id).await }))
            .await?
            .ok_or_else(|| anyhow::anyhow!("domain {domain_id} vanished"))?;

        let find_links = self.registry.find_links_for(&task.job_id);

        if let Some(robots) = fetch_robots(self.fetcher.as_ref(), &self.robots_cache, &domain.name).await {
            if let Some(delay) = crate::fetcher::sitemap::crawl_delay_from_robots_txt(&robots)
                && domain.crawl_delay_seconds != Some(delay)
            {
                let store3 = store.clone();
                let domain_id_for_delay = domain.id;
                let _ = store3
                    .execute_maintenance(move |conn| {
                        Box::pin(async move { domains::set_crawl_delay(conn, domain_id_for_delay, delay).await })
                    })
                    .await;
            }

            let disallowed = crate::fetcher::sitemap::disallowed_from_robots_txt(&robots);
            if is_disallowed(&page.path, &disallowed) {
                self.queue
                    .skip(task.id, task.job_id, "disallowed by robots.txt".to_string())
                    .await?;
                return Ok(());
            }
        }

        let url = format!("https://{}{}", domain.name, page.path);
        let options = FetchOptions {
            timeout: self.fetch_timeout,
            user_agent: self.user_agent.clone(),
            extract_links: find_links,
        };

        trace!(worker_id = self.id, url, "fetching");
        let outcome = self.fetcher.fetch(&url, &options).await;

        let status_code = match &outcome {
            Ok(result) => result.status_code,
            Err(_) => 0,
        };
        let crawl_delay = Duration::from_secs_f64(domain.crawl_delay_seconds.unwrap_or(0.0));
        let floor = Duration::from_secs_f64(domain.adaptive_delay_floor_seconds.max(0.0));
        let adaptive_delay = self
            .limiter
            .record_outcome(domain.id, crawl_delay, floor, status_code)
            .await;
        let domains_clone = domain.clone();
        let store2 = store.clone();
        let _ = store2
            .execute_maintenance(move |conn| {
                let delay = adaptive_delay.as_secs_f64();
                let id = domains_clone.id;
                Box::pin(async move { domains::set_adaptive_delay(conn, id, delay).await })
            })
            .await;

        match outcome {
            Ok(result) if (200..400).contains(&result.status_code) => {
                let links = result.links;
                self.queue
                    .complete(
                        task.id,
                        task.job_id,
                        crate::store::tasks::TaskResult {
                            status_code: Some(result.status_code as i32),
                            response_time_ms: Some(result.response_time.as_millis() as i32),
                            cache_status: result.cache_status,
                            content_type: result.content_type,
                            redirect_url: result.redirect_url,
                        },
                    )
                    .await?;
                if find_links {
                    self.enqueue_discovered_links(&task, &domain.name, links).await?;
                }
            }
            Ok(result) => {
                // Non-2xx/3xx: classify by status so 429/5xx retry and
                // permanent client errors (4xx, minus 429) give up (§7).
                let engine_err = classify_fetch_status(result.status_code);
                let retryable = is_retryable(&engine_err);
                self.queue
                    .fail(task.id, task.job_id, task.retry_count, engine_err.to_string(), retryable)
                    .await?;
            }
            Err(e) => {
                self.queue
                    .fail(
                        task.id,
                        task.job_id,
                        task.retry_count,
                        e.to_string(),
                        e.is_retryable(),
                    )
                    .await?;
            }
        }

        Ok(())
    }

    /// §4.3 step 5: filter same-domain, allowed, not-already-present links
    /// and enqueue as a new batch through the Task Queue.
    async fn enqueue_discovered_links(
        &self,
        task: &Task,
        domain_name: &str,
        links: Vec<Link>,
    ) -> anyhow::Result<()> {
        if links.is_empty() {
            return Ok(());
        }

        let (include_paths, exclude_paths) = self.registry.path_filters_for(&task.job_id);
        let mut queued = Vec::with_capacity(links.len());
        for (index, link) in links.into_iter().enumerate() {
            let Ok(parsed) = Url::parse(&link.url) else {
                continue;
            };
            if parsed.host_str() != Some(domain_name) {
                continue;
            }
            if !passes_filters(&link.url, &include_paths, &exclude_paths) {
                continue;
            }
            let context = match link.context {
                FetchLinkContext::Header => PriorityLinkContext::Header,
                FetchLinkContext::Footer => PriorityLinkContext::Footer,
                FetchLinkContext::Body => PriorityLinkContext::Body,
            };
            let is_homepage = task.depth == 0;
            let priority = priority::step(task.priority, context, index, is_homepage);
            queued.push(QueuedUrl {
                domain_name: domain_name.to_string(),
                path: parsed.path().to_string(),
                priority,
                depth: task.depth + 1,
            });
        }

        if queued.is_empty() {
            return Ok(());
        }

        self.queue
            .enqueue_urls(task.job_id, queued, SourceType::Manual, Some(task.source_url.clone().unwrap_or_default()))
            .await?;
        Ok(())
    }
}
