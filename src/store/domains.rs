//! Domain lookups (§3, §4.1).
//!
//! A domain row is created lazily the first time a job references its
//! hostname; after that it's looked up by unique name. Adaptive delay
//! state lives here rather than in the in-memory limiter alone so it
//! survives a restart (§4.3).

use crate::error::Result;
use crate::models::Domain;
use sqlx::PgConnection;

pub async fn find_by_name(conn: &mut PgConnection, name: &str) -> Result<Option<Domain>> {
    let domain = sqlx::query_as::<_, Domain>(
        "SELECT id, name, crawl_delay_seconds, adaptive_delay_seconds, adaptive_delay_floor_seconds
         FROM domains WHERE name = $1",
    )
    .bind(name)
    .fetch_optional(conn)
    .await?;
    Ok(domain)
}

/// Insert the domain if absent and return its row either way.
pub async fn find_or_create(conn: &mut PgConnection, name: &str) -> Result<Domain> {
    let domain = sqlx::query_as::<_, Domain>(
        "INSERT INTO domains (name) VALUES ($1)
         ON CONFLICT (name) DO UPDATE SET name = EXCLUDED.name
         RETURNING id, name, crawl_delay_seconds, adaptive_delay_seconds, adaptive_delay_floor_seconds",
    )
    .bind(name)
    .fetch_one(conn)
    .await?;
    Ok(domain)
}

pub async fn find_by_id(conn: &mut PgConnection, id: i32) -> Result<Option<Domain>> {
    let domain = sqlx::query_as::<_, Domain>(
        "SELECT id, name, crawl_delay_seconds, adaptive_delay_seconds, adaptive_delay_floor_seconds
         FROM domains WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(conn)
    .await?;
    Ok(domain)
}

/// Persist an updated adaptive delay, clamped at the floor by the caller (§4.3).
pub async fn set_adaptive_delay(conn: &mut PgConnection, id: i32, delay_seconds: f64) -> Result<()> {
    sqlx::query("UPDATE domains SET adaptive_delay_seconds = $2 WHERE id = $1")
        .bind(id)
        .bind(delay_seconds)
        .execute(conn)
        .await?;
    Ok(())
}

/// Persist a `Crawl-delay:` value parsed from `robots.txt` (§3). Only ever
/// set once discovery or a worker has actually seen a value; absent the
/// directive the column stays `NULL`.
pub async fn set_crawl_delay(conn: &mut PgConnection, id: i32, delay_seconds: f64) -> Result<()> {
    sqlx::query("UPDATE domains SET crawl_delay_seconds = $2 WHERE id = $1")
        .bind(id)
        .bind(delay_seconds)
        .execute(conn)
        .await?;
    Ok(())
}
