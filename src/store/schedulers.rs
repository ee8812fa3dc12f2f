//! Scheduler row operations (§3, §4.4 scheduler tick).

use crate::error::Result;
use crate::models::Scheduler;
use sqlx::PgConnection;
use uuid::Uuid;

const SCHEDULER_COLUMNS: &str = "id, domain_id, organisation_id, schedule_interval_hours,
    next_run_at, is_enabled, concurrency, find_links, max_pages, include_paths,
    exclude_paths, required_workers";

/// Schedulers due to run right now, per the tick's `is_enabled AND
/// next_run_at <= now` predicate.
pub async fn find_due(conn: &mut PgConnection) -> Result<Vec<Scheduler>> {
    let query = format!(
        "SELECT {SCHEDULER_COLUMNS} FROM schedulers WHERE is_enabled AND next_run_at <= NOW()"
    );
    let schedulers = sqlx::query_as::<_, Scheduler>(&query)
        .fetch_all(conn)
        .await?;
    Ok(schedulers)
}

/// Advance `next_run_at` by the scheduler's configured interval.
pub async fn advance(conn: &mut PgConnection, id: Uuid, interval_hours: i32) -> Result<()> {
    sqlx::query("UPDATE schedulers SET next_run_at = next_run_at + make_interval(hours => $2) WHERE id = $1")
        .bind(id)
        .bind(interval_hours)
        .execute(conn)
        .await?;
    Ok(())
}

/// True if a job created from this scheduler is still running, used to
/// skip a tick rather than stack overlapping jobs (§4.4).
pub async fn has_running_job(conn: &mut PgConnection, domain_id: i32, organisation_id: Uuid) -> Result<bool> {
    let row: Option<(i64,)> = sqlx::query_as(
        "SELECT 1 FROM jobs
         WHERE domain_id = $1 AND organisation_id = $2 AND status = 'running'
           AND source_type = 'scheduler'
         LIMIT 1",
    )
    .bind(domain_id)
    .bind(organisation_id)
    .fetch_optional(conn)
    .await?;
    Ok(row.is_some())
}
