//! Relational persistence (§4.1).
//!
//! `Store` wraps a `PgPool` with the transactional primitive the rest of the
//! engine is built on: `execute` runs a unit of work against a transaction
//! and commits it, retrying on a transient ("locked/busy") failure with
//! exponential backoff and jitter, up to a handful of attempts. A bounded
//! semaphore in front of it caps how many transactions are in flight at
//! once, independent of the pool's own connection ceiling — the same
//! "bounded worker pool sitting in front of the connection pool" discipline
//! the original codebase implements with a small goroutine pool (§9).
//!
//! `execute_maintenance` is the same primitive through a separate, smaller
//! semaphore so long-running administrative work (recovery sweeps, the
//! scheduler tick) never starves the hot task-claim path.

pub mod domains;
pub mod jobs;
pub mod organisations;
pub mod pages;
pub mod schedulers;
pub mod schema;
pub mod tasks;

use crate::error::{EngineError, Result};
use futures::future::BoxFuture;
use rand::Rng;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{PgConnection, PgPool};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

/// Number of concurrent transaction-holding slots for the normal path.
const TX_SLOTS: usize = 2;
/// Number of concurrent slots reserved for maintenance work.
const MAINTENANCE_SLOTS: usize = 1;
/// Maximum attempts for a transient-error retry loop.
const MAX_ATTEMPTS: u32 = 3;
/// Base for the exponential backoff: `100ms * 2^attempt`, plus jitter (§4.1).
const BACKOFF_BASE_MS: u64 = 100;

#[derive(Clone)]
pub struct Store {
    pool: PgPool,
    tx_slots: Arc<Semaphore>,
    maintenance_slots: Arc<Semaphore>,
}

impl Store {
    /// Connect and size the pool per §4.1: bounded below the backend's hard
    /// limit, idle connections kept around 40% of max, lifetime bounded to
    /// force periodic refresh.
    pub async fn connect(database_url: &str, max_open_conns: u32) -> anyhow::Result<Self> {
        let idle = (max_open_conns as f64 * 0.4).round() as u32;
        let options = PgConnectOptions::from_str(database_url)?;

        let pool = PgPoolOptions::new()
            .max_connections(max_open_conns)
            .min_connections(idle.min(max_open_conns))
            .acquire_timeout(Duration::from_secs(10))
            .idle_timeout(Duration::from_secs(5 * 60))
            .max_lifetime(Duration::from_secs(5 * 60))
            .connect_with(options)
            .await?;

        debug!(max_open_conns, idle, "database pool established");

        let store = Self {
            pool,
            tx_slots: Arc::new(Semaphore::new(TX_SLOTS)),
            maintenance_slots: Arc::new(Semaphore::new(MAINTENANCE_SLOTS)),
        };

        schema::ensure_schema(&store.pool).await?;

        Ok(store)
    }

    #[cfg(test)]
    pub fn from_pool(pool: PgPool) -> Self {
        Self {
            pool,
            tx_slots: Arc::new(Semaphore::new(TX_SLOTS)),
            maintenance_slots: Arc::new(Semaphore::new(MAINTENANCE_SLOTS)),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run `f` inside a transaction, retrying transient failures with
    /// backoff. `f` receives the live connection and must complete all of
    /// its statements before returning; the transaction is committed (or
    /// rolled back on error) by this function, never by `f`.
    pub async fn execute<T, F>(&self, f: F) -> Result<T>
    where
        F: for<'c> Fn(&'c mut PgConnection) -> BoxFuture<'c, Result<T>> + Send + Sync,
        T: Send,
    {
        let _permit = self.tx_slots.acquire().await.expect("semaphore closed");
        self.run_with_retry(&f).await
    }

    /// Same as `execute`, through the maintenance slot pool. Never blocks
    /// the normal task-claim path on the same semaphore.
    pub async fn execute_maintenance<T, F>(&self, f: F) -> Result<T>
    where
        F: for<'c> Fn(&'c mut PgConnection) -> BoxFuture<'c, Result<T>> + Send + Sync,
        T: Send,
    {
        let _permit = self
            .maintenance_slots
            .acquire()
            .await
            .expect("semaphore closed");
        self.run_with_retry(&f).await
    }

    async fn run_with_retry<T, F>(&self, f: &F) -> Result<T>
    where
        F: for<'c> Fn(&'c mut PgConnection) -> BoxFuture<'c, Result<T>> + Send + Sync,
        T: Send,
    {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let mut tx = self.pool.begin().await.map_err(EngineError::from)?;
            match f(&mut *tx).await {
                Ok(value) => {
                    tx.commit().await.map_err(EngineError::from)?;
                    return Ok(value);
                }
                Err(EngineError::StorageTransient(reason)) if attempt < MAX_ATTEMPTS => {
                    let _ = tx.rollback().await;
                    let backoff = backoff_with_jitter(attempt);
                    warn!(
                        attempt,
                        reason = %reason,
                        backoff_ms = backoff.as_millis() as u64,
                        "retrying transient storage error"
                    );
                    tokio::time::sleep(backoff).await;
                    continue;
                }
                Err(other) => {
                    let _ = tx.rollback().await;
                    return Err(other);
                }
            }
        }
    }
}

fn backoff_with_jitter(attempt: u32) -> Duration {
    let base = BACKOFF_BASE_MS * 2u64.pow(attempt.saturating_sub(1));
    let jitter = rand_range(0, base / 2 + 1);
    Duration::from_millis(base + jitter)
}

fn rand_range(lo: u64, hi: u64) -> u64 {
    if hi <= lo {
        return lo;
    }
    rand::rng().random_range(lo..hi)
}
