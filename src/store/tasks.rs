//! Task queue row operations (§4.2).
//!
//! `claim_next` is the hot path: a single `UPDATE ... FROM (SELECT ...
//! FOR UPDATE SKIP LOCKED)` so many workers can call concurrently without
//! blocking each other on the same candidate row, mirroring the CTE claim
//! pattern from `cyclotron`'s job queue that this design is modelled on.

use crate::error::Result;
use crate::models::{SourceType, Task, TaskCounts, TaskStatus};
use sqlx::PgConnection;
use uuid::Uuid;

/// One URL queued for insertion, already resolved to a page id.
pub struct NewTask {
    pub page_id: i32,
    pub priority: f64,
    pub depth: i32,
}

/// Insert any (job_id, page_id) pairs not already present. Returns the
/// number of rows actually inserted (duplicates within the batch and
/// against existing tasks are absorbed, per §4.2).
pub async fn insert_missing(
    conn: &mut PgConnection,
    job_id: Uuid,
    tasks: &[NewTask],
    source_type: SourceType,
    source_url: Option<&str>,
) -> Result<i64> {
    let mut inserted = 0i64;
    for task in tasks {
        let result = sqlx::query(
            "INSERT INTO tasks (job_id, page_id, priority, depth, source_type, source_url)
             VALUES ($1, $2, $3, $4, $5, $6)
             ON CONFLICT (job_id, page_id) DO NOTHING",
        )
        .bind(job_id)
        .bind(task.page_id)
        .bind(task.priority.clamp(0.0, 1.0))
        .bind(task.depth)
        .bind(source_type)
        .bind(source_url)
        .execute(&mut *conn)
        .await?;
        inserted += result.rows_affected() as i64;
    }

    if inserted > 0 {
        sqlx::query("UPDATE jobs SET total_tasks = total_tasks + $2 WHERE id = $1")
            .bind(job_id)
            .bind(inserted)
            .execute(conn)
            .await?;
    }

    Ok(inserted)
}

/// Atomically claim the highest-priority, oldest pending task among
/// `job_ids`, skipping rows already locked by another claimant.
pub async fn claim_next(conn: &mut PgConnection, job_ids: &[Uuid]) -> Result<Option<Task>> {
    if job_ids.is_empty() {
        return Ok(None);
    }

    let task = sqlx::query_as::<_, Task>(
        "WITH candidate AS (
            SELECT id FROM tasks
            WHERE job_id = ANY($1) AND status = 'pending'
            ORDER BY priority DESC, created_at ASC
            FOR UPDATE SKIP LOCKED
            LIMIT 1
         )
         UPDATE tasks SET status = 'running', started_at = NOW()
         FROM candidate
         WHERE tasks.id = candidate.id
         RETURNING tasks.id, tasks.job_id, tasks.page_id, tasks.status, tasks.priority,
                   tasks.depth, tasks.source_type, tasks.source_url, tasks.retry_count,
                   tasks.created_at, tasks.started_at, tasks.completed_at, tasks.status_code,
                   tasks.response_time_ms, tasks.cache_status, tasks.content_type,
                   tasks.redirect_url, tasks.error",
    )
    .bind(job_ids)
    .fetch_optional(conn)
    .await?;

    Ok(task)
}

/// Result fields persisted by a successful fetch.
pub struct TaskResult {
    pub status_code: Option<i32>,
    pub response_time_ms: Option<i32>,
    pub cache_status: Option<String>,
    pub content_type: Option<String>,
    pub redirect_url: Option<String>,
}

/// `running -> completed`. A no-op if the task is already completed.
pub async fn complete(conn: &mut PgConnection, task_id: Uuid, result: TaskResult) -> Result<()> {
    sqlx::query(
        "UPDATE tasks SET status = 'completed', completed_at = NOW(), status_code = $2,
                response_time_ms = $3, cache_status = $4, content_type = $5, redirect_url = $6
         WHERE id = $1 AND status <> 'completed'",
    )
    .bind(task_id)
    .bind(result.status_code)
    .bind(result.response_time_ms)
    .bind(result.cache_status)
    .bind(result.content_type)
    .bind(result.redirect_url)
    .execute(conn)
    .await?;
    Ok(())
}

/// Retry classification for `fail` (§4.2, §7).
pub enum RetryDecision {
    Retry,
    GiveUp,
}

pub async fn fail(
    conn: &mut PgConnection,
    task_id: Uuid,
    error: &str,
    decision: RetryDecision,
) -> Result<()> {
    match decision {
        RetryDecision::Retry => {
            sqlx::query(
                "UPDATE tasks SET status = 'pending', retry_count = retry_count + 1,
                        started_at = NULL, error = $2
                 WHERE id = $1",
            )
            .bind(task_id)
            .bind(error)
            .execute(conn)
            .await?;
        }
        RetryDecision::GiveUp => {
            sqlx::query(
                "UPDATE tasks SET status = 'failed', completed_at = NOW(), error = $2
                 WHERE id = $1",
            )
            .bind(task_id)
            .bind(error)
            .execute(conn)
            .await?;
        }
    }
    Ok(())
}

pub async fn skip(conn: &mut PgConnection, task_id: Uuid, reason: &str) -> Result<()> {
    sqlx::query(
        "UPDATE tasks SET status = 'skipped', completed_at = NOW(), error = $2
         WHERE id = $1 AND status NOT IN ('completed', 'skipped')",
    )
    .bind(task_id)
    .bind(reason)
    .execute(conn)
    .await?;
    Ok(())
}

/// Transition every pending/waiting task of a job to `skipped` (§4.3 cancellation).
pub async fn skip_non_terminal_for_job(conn: &mut PgConnection, job_id: Uuid) -> Result<i64> {
    let result = sqlx::query(
        "UPDATE tasks SET status = 'skipped', completed_at = NOW()
         WHERE job_id = $1 AND status IN ('pending', 'waiting')",
    )
    .bind(job_id)
    .execute(conn)
    .await?;
    Ok(result.rows_affected() as i64)
}

/// Reset any task stuck in `running` past the stuck threshold (§4.5).
pub async fn reset_stuck(conn: &mut PgConnection, stuck_threshold_seconds: i64) -> Result<i64> {
    let result = sqlx::query(
        "UPDATE tasks SET status = 'pending', started_at = NULL
         WHERE status = 'running' AND started_at < NOW() - make_interval(secs => $1)",
    )
    .bind(stuck_threshold_seconds as f64)
    .execute(conn)
    .await?;
    Ok(result.rows_affected() as i64)
}

pub async fn count_by_status(conn: &mut PgConnection, job_id: Uuid) -> Result<TaskCounts> {
    let rows: Vec<(TaskStatus, i64)> =
        sqlx::query_as("SELECT status, COUNT(*) FROM tasks WHERE job_id = $1 GROUP BY status")
            .bind(job_id)
            .fetch_all(conn)
            .await?;

    let mut counts = TaskCounts::default();
    for (status, count) in rows {
        match status {
            TaskStatus::Pending => counts.pending = count,
            TaskStatus::Running => counts.running = count,
            TaskStatus::Waiting => counts.waiting = count,
            TaskStatus::Completed => counts.completed = count,
            TaskStatus::Failed => counts.failed = count,
            TaskStatus::Skipped => counts.skipped = count,
        }
    }
    Ok(counts)
}

/// URLs (as page ids) already present as tasks for a job, used by the
/// worker's link-discovery dedup step (§4.3 step 5).
pub async fn existing_page_ids(conn: &mut PgConnection, job_id: Uuid) -> Result<Vec<i32>> {
    let ids: Vec<(i32,)> = sqlx::query_as("SELECT page_id FROM tasks WHERE job_id = $1")
        .bind(job_id)
        .fetch_all(conn)
        .await?;
    Ok(ids.into_iter().map(|(id,)| id).collect())
}
