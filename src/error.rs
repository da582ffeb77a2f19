//! Error types for fetching and persistence.
//!
//! Per-store and per-job failures are recoverable and stay local to the job
//! that produced them. Only a store that cannot be reached at all is fatal
//! for a run (see [`StoreError::is_fatal`]).

use thiserror::Error;

/// Errors returned by a [`StoreFetcher`](crate::traits::StoreFetcher).
#[derive(Debug, Error)]
pub enum FetchError {
    /// The store did not answer within the deadline.
    #[error("fetch timed out")]
    Timeout,

    /// Adapter-level failure (blocked page, unexpected payload, ...).
    #[error("fetch from {store} failed: {message}")]
    Failure { store: String, message: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("decode error: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl FetchError {
    pub fn failure(store: impl Into<String>, message: impl Into<String>) -> Self {
        FetchError::Failure {
            store: store.into(),
            message: message.into(),
        }
    }
}

/// Errors returned by a [`ProductStore`](crate::store::ProductStore).
#[derive(Debug, Error)]
pub enum StoreError {
    /// Insert or update rejected by the store.
    #[error("persistence conflict: {0}")]
    Conflict(String),

    /// The store cannot be reached.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("product {0} not found")]
    NotFound(i64),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl StoreError {
    /// Whether this error should terminate the whole run.
    pub fn is_fatal(&self) -> bool {
        match self {
            StoreError::Unavailable(_) => true,
            StoreError::Database(e) => matches!(
                e,
                sqlx::Error::PoolTimedOut
                    | sqlx::Error::PoolClosed
                    | sqlx::Error::Io(_)
                    | sqlx::Error::Configuration(_)
            ),
            StoreError::Conflict(_) | StoreError::NotFound(_) => false,
        }
    }
}

/// Failure to ingest one canonical group.
#[derive(Debug, Error)]
#[error("ingest of group '{group_key}' failed: {source}")]
pub struct IngestError {
    pub group_key: String,
    #[source]
    pub source: StoreError,
}

impl IngestError {
    pub fn new(group_key: impl Into<String>, source: StoreError) -> Self {
        Self {
            group_key: group_key.into(),
            source,
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.source.is_fatal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_unavailable_is_fatal() {
        assert!(StoreError::Unavailable("down".into()).is_fatal());
        assert!(!StoreError::Conflict("dup".into()).is_fatal());
        assert!(!StoreError::NotFound(7).is_fatal());
        assert!(StoreError::Database(sqlx::Error::PoolTimedOut).is_fatal());
        assert!(!StoreError::Database(sqlx::Error::RowNotFound).is_fatal());
    }

    #[test]
    fn ingest_error_names_group() {
        let err = IngestError::new("NexGard 1 Comp.", StoreError::Conflict("dup".into()));
        assert!(err.to_string().contains("NexGard 1 Comp."));
        assert!(!err.is_fatal());
    }
}
