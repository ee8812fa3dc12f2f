//! Row types for the five persisted entities (§3).
//!
//! Plain `sqlx::FromRow` structs bound with `query_as::<_, T>` against
//! Postgres at runtime.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, Serialize, Deserialize)]
#[sqlx(type_name = "job_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Paused,
    Completed,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, Serialize, Deserialize)]
#[sqlx(type_name = "task_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
    Waiting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, Serialize, Deserialize)]
#[sqlx(type_name = "source_type", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Sitemap,
    Manual,
    Fallback,
    Scheduler,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, Serialize, Deserialize)]
#[sqlx(type_name = "link_context", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum LinkContext {
    Header,
    Footer,
    Body,
}

/// A stable reference to a crawled host. Created lazily, never deleted
/// while pages reference it.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct Domain {
    pub id: i32,
    pub name: String,
    pub crawl_delay_seconds: Option<f64>,
    pub adaptive_delay_seconds: f64,
    pub adaptive_delay_floor_seconds: f64,
}

/// A (domain, path) pair, shared across jobs.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct Page {
    pub id: i32,
    pub domain_id: i32,
    pub path: String,
}

/// One crawl request (§3).
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct Job {
    pub id: Uuid,
    pub domain_id: i32,
    pub organisation_id: Uuid,
    pub user_id: Uuid,
    pub status: JobStatus,
    pub total_tasks: i32,
    pub completed_tasks: i32,
    pub failed_tasks: i32,
    pub skipped_tasks: i32,
    pub concurrency: i32,
    pub find_links: bool,
    pub max_pages: i32,
    pub include_paths: Vec<String>,
    pub exclude_paths: Vec<String>,
    pub use_sitemap: bool,
    pub source_type: SourceType,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub required_workers: i32,
}

impl Job {
    /// `progress = 100 * (completed + failed + skipped) / max(total_tasks, 1)` (§3 invariant).
    pub fn progress(&self) -> f64 {
        let finished = (self.completed_tasks + self.failed_tasks + self.skipped_tasks) as f64;
        100.0 * finished / (self.total_tasks.max(1) as f64)
    }

    pub fn duration_seconds(&self) -> Option<f64> {
        let started = self.started_at?;
        let end = self.completed_at.unwrap_or_else(Utc::now);
        Some((end - started).num_milliseconds() as f64 / 1000.0)
    }

    pub fn avg_time_per_task_seconds(&self) -> Option<f64> {
        let duration = self.duration_seconds()?;
        let finished = self.completed_tasks + self.failed_tasks + self.skipped_tasks;
        if finished == 0 {
            return None;
        }
        Some(duration / finished as f64)
    }

    /// §3 invariant: a Job is `completed` iff no task is in pending/running/waiting
    /// and `total_tasks > 0`.
    pub fn is_terminal_eligible(&self, non_terminal_count: i64) -> bool {
        non_terminal_count == 0 && self.total_tasks > 0
    }
}

/// One URL to warm, in the context of one job (§3).
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct Task {
    pub id: Uuid,
    pub job_id: Uuid,
    pub page_id: i32,
    pub status: TaskStatus,
    pub priority: f64,
    pub depth: i32,
    pub source_type: SourceType,
    pub source_url: Option<String>,
    pub retry_count: i32,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub status_code: Option<i32>,
    pub response_time_ms: Option<i32>,
    pub cache_status: Option<String>,
    pub content_type: Option<String>,
    pub redirect_url: Option<String>,
    pub error: Option<String>,
}

/// A recurring job template (§3).
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct Scheduler {
    pub id: Uuid,
    pub domain_id: i32,
    pub organisation_id: Uuid,
    pub schedule_interval_hours: i32,
    pub next_run_at: DateTime<Utc>,
    pub is_enabled: bool,
    pub concurrency: i32,
    pub find_links: bool,
    pub max_pages: i32,
    pub include_paths: Vec<String>,
    pub exclude_paths: Vec<String>,
    pub required_workers: i32,
}

/// Aggregate counts per status, used by `RecalculateJob` (§4.2).
#[derive(Debug, Clone, Copy, Default)]
pub struct TaskCounts {
    pub pending: i64,
    pub running: i64,
    pub waiting: i64,
    pub completed: i64,
    pub failed: i64,
    pub skipped: i64,
}

impl TaskCounts {
    pub fn non_terminal(&self) -> i64 {
        self.pending + self.running + self.waiting
    }

    pub fn total(&self) -> i64 {
        self.non_terminal() + self.completed + self.failed + self.skipped
    }
}
