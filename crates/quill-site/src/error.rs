//! Error types for quill-site.
//!
//! [`Error`] is the general storage/node error. The remaining types follow
//! the read-tracking pipeline: which step failed decides whether the action
//! fails ([`IdentityError`], [`WriteError`]) or degrades quietly
//! ([`AggregationError`], [`NotifyError`]).

use std::sync::Arc;
use thiserror::Error;

/// Result type for quill-site operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in storage, configuration and node startup.
#[derive(Debug, Error)]
pub enum Error {
    /// Storage error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Configuration error
    #[error("Config error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<rocksdb::Error> for Error {
    fn from(e: rocksdb::Error) -> Self {
        Error::Storage(e.to_string())
    }
}

/// The session store could not be consulted, so no reader can be attributed.
#[derive(Debug, Error)]
#[error("identity resolution failed: {0}")]
pub struct IdentityError(#[source] pub Error);

/// Appending a read event failed.
#[derive(Debug, Error)]
pub enum WriteError {
    #[error("read store append failed: {0}")]
    Store(#[source] Error),

    /// The append task died before reporting back.
    #[error("read store append was interrupted")]
    Interrupted,
}

/// Computing a ranking snapshot failed.
///
/// Cloneable because one computation result is shared by every caller that
/// joined it.
#[derive(Debug, Clone, Error)]
pub enum AggregationError {
    #[error("ranking computation failed: {0}")]
    Store(Arc<Error>),

    #[error("ranking computation was interrupted")]
    Interrupted,
}

impl From<Error> for AggregationError {
    fn from(e: Error) -> Self {
        AggregationError::Store(Arc::new(e))
    }
}

/// Delivering a leader-change notification failed.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("webhook request failed: {0}")]
    Webhook(#[from] reqwest::Error),

    #[error("notifier rejected notice: {0}")]
    Rejected(String),
}

/// Failure of the read-tracking action as a whole.
#[derive(Debug, Error)]
pub enum TrackError {
    #[error("invalid slug: {0}")]
    InvalidSlug(String),

    #[error(transparent)]
    Identity(#[from] IdentityError),

    #[error(transparent)]
    Write(#[from] WriteError),
}
