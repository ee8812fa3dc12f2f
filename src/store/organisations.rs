//! Organisation/user bookkeeping.
//!
//! Authentication and membership are outside this engine's scope; these
//! rows exist only so jobs and schedulers can carry a foreign key to
//! "who asked for this".

use crate::error::Result;
use sqlx::PgConnection;
use uuid::Uuid;

pub async fn ensure_organisation(conn: &mut PgConnection, id: Uuid, name: &str) -> Result<()> {
    sqlx::query(
        "INSERT INTO organisations (id, name) VALUES ($1, $2)
         ON CONFLICT (id) DO NOTHING",
    )
    .bind(id)
    .bind(name)
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn ensure_user(conn: &mut PgConnection, id: Uuid, organisation_id: Uuid) -> Result<()> {
    sqlx::query(
        "INSERT INTO users (id, organisation_id) VALUES ($1, $2)
         ON CONFLICT (id) DO NOTHING",
    )
    .bind(id)
    .bind(organisation_id)
    .execute(conn)
    .await?;
    Ok(())
}
