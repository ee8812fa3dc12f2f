//! Job row operations (§3, §4.4).

use crate::error::Result;
use crate::models::{Job, JobStatus, SourceType};
use chrono::{DateTime, Utc};
use sqlx::PgConnection;
use uuid::Uuid;

const JOB_COLUMNS: &str = "id, domain_id, organisation_id, user_id, status, total_tasks,
    completed_tasks, failed_tasks, skipped_tasks, concurrency, find_links, max_pages,
    include_paths, exclude_paths, use_sitemap, source_type, created_at, started_at,
    completed_at, error_message, required_workers";

pub struct NewJob {
    pub domain_id: i32,
    pub organisation_id: Uuid,
    pub user_id: Uuid,
    pub concurrency: i32,
    pub find_links: bool,
    pub max_pages: i32,
    pub include_paths: Vec<String>,
    pub exclude_paths: Vec<String>,
    pub use_sitemap: bool,
    pub source_type: SourceType,
    pub required_workers: i32,
}

pub async fn create(conn: &mut PgConnection, new_job: NewJob) -> Result<Job> {
    let query = format!(
        "INSERT INTO jobs (domain_id, organisation_id, user_id, concurrency, find_links,
            max_pages, include_paths, exclude_paths, use_sitemap, source_type, required_workers)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
         RETURNING {JOB_COLUMNS}"
    );
    let job = sqlx::query_as::<_, Job>(&query)
        .bind(new_job.domain_id)
        .bind(new_job.organisation_id)
        .bind(new_job.user_id)
        .bind(new_job.concurrency)
        .bind(new_job.find_links)
        .bind(new_job.max_pages)
        .bind(new_job.include_paths)
        .bind(new_job.exclude_paths)
        .bind(new_job.use_sitemap)
        .bind(new_job.source_type)
        .bind(new_job.required_workers)
        .fetch_one(conn)
        .await?;
    Ok(job)
}

pub async fn find_by_id(conn: &mut PgConnection, id: Uuid) -> Result<Option<Job>> {
    let query = format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = $1");
    let job = sqlx::query_as::<_, Job>(&query)
        .bind(id)
        .fetch_optional(conn)
        .await?;
    Ok(job)
}

/// Existing non-terminal job for the same (organisation, domain) pair, used
/// to decide whether a new `CreateJob` call must first supersede one (§4.4).
pub async fn find_active_for_org_domain(
    conn: &mut PgConnection,
    organisation_id: Uuid,
    domain_id: i32,
) -> Result<Option<Job>> {
    let query = format!(
        "SELECT {JOB_COLUMNS} FROM jobs
         WHERE organisation_id = $1 AND domain_id = $2 AND status IN ('pending', 'running')
         LIMIT 1"
    );
    let job = sqlx::query_as::<_, Job>(&query)
        .bind(organisation_id)
        .bind(domain_id)
        .fetch_optional(conn)
        .await?;
    Ok(job)
}

pub struct ListFilter {
    pub organisation_id: Uuid,
    pub status: Option<JobStatus>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub limit: i64,
    pub offset: i64,
}

pub async fn list(conn: &mut PgConnection, filter: ListFilter) -> Result<Vec<Job>> {
    let query = format!(
        "SELECT {JOB_COLUMNS} FROM jobs
         WHERE organisation_id = $1
           AND ($2::job_status IS NULL OR status = $2)
           AND ($3::timestamptz IS NULL OR created_at >= $3)
           AND ($4::timestamptz IS NULL OR created_at < $4)
         ORDER BY created_at DESC
         LIMIT $5 OFFSET $6"
    );
    let jobs = sqlx::query_as::<_, Job>(&query)
        .bind(filter.organisation_id)
        .bind(filter.status)
        .bind(filter.since)
        .bind(filter.until)
        .bind(filter.limit)
        .bind(filter.offset)
        .fetch_all(conn)
        .await?;
    Ok(jobs)
}

pub async fn start(conn: &mut PgConnection, id: Uuid) -> Result<()> {
    sqlx::query("UPDATE jobs SET status = 'running', started_at = NOW() WHERE id = $1 AND status = 'pending'")
        .bind(id)
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn cancel(conn: &mut PgConnection, id: Uuid) -> Result<()> {
    sqlx::query(
        "UPDATE jobs SET status = 'cancelled', completed_at = NOW()
         WHERE id = $1 AND status IN ('pending', 'running')",
    )
    .bind(id)
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn fail(conn: &mut PgConnection, id: Uuid, error_message: &str) -> Result<()> {
    sqlx::query(
        "UPDATE jobs SET status = 'failed', completed_at = NOW(), error_message = $2 WHERE id = $1",
    )
    .bind(id)
    .bind(error_message)
    .execute(conn)
    .await?;
    Ok(())
}

/// Recompute counters from `tasks` and mark the job `completed` if the
/// terminal condition holds (§4.2 RecalculateJob, §4.5 stuck jobs).
pub async fn recalculate(conn: &mut PgConnection, id: Uuid) -> Result<()> {
    let counts = super::tasks::count_by_status(conn, id).await?;

    sqlx::query(
        "UPDATE jobs SET completed_tasks = $2, failed_tasks = $3, skipped_tasks = $4 WHERE id = $1",
    )
    .bind(id)
    .bind(counts.completed)
    .bind(counts.failed)
    .bind(counts.skipped)
    .execute(&mut *conn)
    .await?;

    if counts.non_terminal() == 0 {
        sqlx::query(
            "UPDATE jobs SET status = 'completed', completed_at = NOW()
             WHERE id = $1 AND status = 'running' AND total_tasks > 0",
        )
        .bind(id)
        .execute(conn)
        .await?;
    }

    Ok(())
}

/// Among `ids`, those whose Store row has already reached a terminal status
/// (completed/failed/cancelled) — used to reconcile the in-process worker
/// pool registry against jobs it never got an explicit deregister call for.
pub async fn find_terminal_among(conn: &mut PgConnection, ids: &[Uuid]) -> Result<Vec<Uuid>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let rows: Vec<(Uuid,)> = sqlx::query_as(
        "SELECT id FROM jobs WHERE id = ANY($1) AND status IN ('completed', 'failed', 'cancelled')",
    )
    .bind(ids)
    .fetch_all(conn)
    .await?;
    Ok(rows.into_iter().map(|(id,)| id).collect())
}

/// Jobs in `running` with zero non-terminal tasks remaining (§4.5 stuck jobs).
pub async fn find_stuck(conn: &mut PgConnection) -> Result<Vec<Uuid>> {
    let ids: Vec<(Uuid,)> = sqlx::query_as(
        "SELECT j.id FROM jobs j
         WHERE j.status = 'running'
           AND NOT EXISTS (
               SELECT 1 FROM tasks t
               WHERE t.job_id = j.id AND t.status IN ('pending', 'running', 'waiting')
           )",
    )
    .fetch_all(conn)
    .await?;
    Ok(ids.into_iter().map(|(id,)| id).collect())
}
