//! Page lookups (§3, §4.1).
//!
//! Pages are shared across jobs on the same domain: re-warming a URL that
//! already has a page row must not create a duplicate.

use crate::error::Result;
use crate::models::Page;
use sqlx::PgConnection;

pub async fn find_or_create(conn: &mut PgConnection, domain_id: i32, path: &str) -> Result<Page> {
    let page = sqlx::query_as::<_, Page>(
        "INSERT INTO pages (domain_id, path) VALUES ($1, $2)
         ON CONFLICT (domain_id, path) DO UPDATE SET path = EXCLUDED.path
         RETURNING id, domain_id, path",
    )
    .bind(domain_id)
    .bind(path)
    .fetch_one(conn)
    .await?;
    Ok(page)
}

pub async fn find_by_id(conn: &mut PgConnection, id: i32) -> Result<Option<Page>> {
    let page = sqlx::query_as::<_, Page>("SELECT id, domain_id, path FROM pages WHERE id = $1")
        .bind(id)
        .fetch_optional(conn)
        .await?;
    Ok(page)
}
