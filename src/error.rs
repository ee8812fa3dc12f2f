//! Engine-wide error type.
//!
//! The Store classifies low-level `sqlx` failures into `StorageTransient`
//! (retried internally, see `store::retry`) or `StorageFatal` (surfaced).
//! Everything above the Store matches on `EngineError` directly rather than
//! threading `anyhow::Error` through the task/job lifecycle, since the Task
//! Queue and Job Manager need to tell these kinds apart (§7).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("storage temporarily unavailable: {0}")]
    StorageTransient(String),

    #[error("storage error: {0}")]
    StorageFatal(#[source] sqlx::Error),

    #[error("fetch failed (retryable): {0}")]
    FetchTransient(String),

    #[error("fetch failed (permanent): {0}")]
    FetchPermanent(String),

    #[error("rejected by policy: {0}")]
    PolicyReject(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;

/// Classify a raw `sqlx::Error` into a transient-vs-fatal `EngineError`.
///
/// "Locked/busy" conditions (serialization failures, deadlocks, connection
/// acquisition timeouts) are transient and retried by the caller (§4.1);
/// everything else — constraint violations the caller didn't already expect,
/// schema errors, connection loss — is fatal and surfaced.
pub fn classify_db_error(err: sqlx::Error) -> EngineError {
    use sqlx::Error as E;
    match &err {
        E::PoolTimedOut | E::Io(_) => {
            EngineError::StorageTransient(err.to_string())
        }
        E::Database(db_err) => {
            // Postgres SQLSTATE class 40 = transaction rollback (serialization
            // failure, deadlock detected) -- safe to retry.
            if let Some(code) = db_err.code()
                && code.starts_with("40")
            {
                return EngineError::StorageTransient(err.to_string());
            }
            EngineError::StorageFatal(err)
        }
        _ => EngineError::StorageFatal(err),
    }
}

impl From<sqlx::Error> for EngineError {
    fn from(err: sqlx::Error) -> Self {
        classify_db_error(err)
    }
}

/// Classify a non-2xx/3xx HTTP response into a retryable-vs-permanent
/// `EngineError` (§7): 429 and 5xx are transient (the server asked us to
/// back off or is having trouble), everything else is permanent.
pub fn classify_fetch_status(status_code: u16) -> EngineError {
    if status_code == 429 || (500..600).contains(&status_code) {
        EngineError::FetchTransient(format!("http {status_code}"))
    } else {
        EngineError::FetchPermanent(format!("http {status_code}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_timeout_is_transient() {
        let err = classify_db_error(sqlx::Error::PoolTimedOut);
        assert!(matches!(err, EngineError::StorageTransient(_)));
    }

    #[test]
    fn server_error_status_is_transient() {
        assert!(matches!(classify_fetch_status(503), EngineError::FetchTransient(_)));
        assert!(matches!(classify_fetch_status(429), EngineError::FetchTransient(_)));
    }

    #[test]
    fn client_error_status_is_permanent() {
        assert!(matches!(classify_fetch_status(404), EngineError::FetchPermanent(_)));
        assert!(matches!(classify_fetch_status(403), EngineError::FetchPermanent(_)));
    }
}
