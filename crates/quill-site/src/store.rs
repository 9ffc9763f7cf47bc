//! Storage seams used by the read-tracking pipeline.
//!
//! [`Storage`](crate::storage::Storage) implements both traits on RocksDB.
//! Everything above this layer only sees the traits, so tests can swap in
//! stores that fail or count calls.

use crate::error::Result;
use crate::models::{ClientIdentity, ReadEvent, SessionRecord, User};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use quill_rankings::{Scope, Team};

/// Append-only record of read events.
#[async_trait]
pub trait ReadStore: Send + Sync {
    /// Append one read event.
    async fn append_read(&self, event: &ReadEvent) -> Result<()>;

    /// When `reader` last read `slug`, if ever.
    async fn latest_read(&self, reader: &ClientIdentity, slug: &str)
        -> Result<Option<DateTime<Utc>>>;

    /// Every read event within `scope`, oldest first per post.
    async fn reads_in(&self, scope: &Scope) -> Result<Vec<ReadEvent>>;

    /// Team a reader's reads score for. Anonymous clients are always
    /// [`Team::Unknown`].
    async fn team_of(&self, reader: &ClientIdentity) -> Result<Team>;
}

/// Session and user lookups for identity resolution.
#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn session(&self, id: &str) -> Result<Option<SessionRecord>>;

    async fn user(&self, id: &str) -> Result<Option<User>>;
}
