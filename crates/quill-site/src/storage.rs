//! Persistent storage using RocksDB.
//!
//! Key layout:
//!
//! ```text
//! read:{slug}/{micros:020}/{reader}/{uuid}   ReadEvent (JSON)
//! last-read:{reader}/{slug}                  timestamp of the reader's latest read
//! user:{id}                                  User (JSON)
//! session:{id}                               SessionRecord (JSON)
//! ```
//!
//! Slugs never contain `/`, so `read:{slug}/` only matches that post.

use crate::error::{Error, Result};
use crate::models::{ClientIdentity, ReadEvent, SessionRecord, User};
use crate::store::{AccountStore, ReadStore};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use quill_rankings::{Scope, Team};
use rocksdb::{Options, WriteBatch, DB};
use serde::de::DeserializeOwned;
use std::path::Path;

/// Storage backend for quill data.
pub struct Storage {
    db: DB,
}

impl Storage {
    /// Open or create storage at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        let db = DB::open(&opts, path)?;
        Ok(Self { db })
    }

    fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.db.get(key.as_bytes())? {
            Some(data) => Ok(Some(serde_json::from_slice(&data)?)),
            None => Ok(None),
        }
    }

    /// Decode every value under `prefix`, in key order.
    fn scan<T: DeserializeOwned>(&self, prefix: &str) -> Result<Vec<T>> {
        let prefix = prefix.as_bytes();
        let mut values = Vec::new();

        for item in self.db.prefix_iterator(prefix) {
            let (key, value) = item?;
            if !key.starts_with(prefix) {
                break;
            }
            values.push(serde_json::from_slice(&value)?);
        }

        Ok(values)
    }

    // --- Reads ---

    /// The trailing uuid keeps reads with equal timestamp and reader apart.
    fn read_key(event: &ReadEvent) -> String {
        format!(
            "read:{}/{:020}/{}/{}",
            event.slug,
            event.timestamp.timestamp_micros().max(0),
            event.reader.key(),
            uuid::Uuid::new_v4()
        )
    }

    fn last_read_key(reader: &ClientIdentity, slug: &str) -> String {
        format!("last-read:{}/{}", reader.key(), slug)
    }

    fn scope_prefix(scope: &Scope) -> String {
        match scope {
            Scope::Post(slug) => format!("read:{}/", slug),
            Scope::Overall => "read:".to_string(),
        }
    }

    /// Store a read event and update the reader's last-read index in one batch.
    pub fn put_read(&self, event: &ReadEvent) -> Result<()> {
        let mut batch = WriteBatch::default();
        batch.put(Self::read_key(event).as_bytes(), serde_json::to_vec(event)?);
        batch.put(
            Self::last_read_key(&event.reader, &event.slug).as_bytes(),
            serde_json::to_vec(&event.timestamp)?,
        );
        self.db.write(batch)?;
        Ok(())
    }

    /// Latest read of `slug` by `reader`.
    pub fn get_latest_read(
        &self,
        reader: &ClientIdentity,
        slug: &str,
    ) -> Result<Option<DateTime<Utc>>> {
        self.get_json(&Self::last_read_key(reader, slug))
    }

    /// All read events in a scope.
    pub fn list_reads(&self, scope: &Scope) -> Result<Vec<ReadEvent>> {
        self.scan(&Self::scope_prefix(scope))
    }

    /// Posts a reader has read, with the time of their latest read of each.
    pub fn reads_by(&self, reader: &ClientIdentity) -> Result<Vec<(String, DateTime<Utc>)>> {
        let prefix = format!("last-read:{}/", reader.key());
        let mut reads = Vec::new();

        for item in self.db.prefix_iterator(prefix.as_bytes()) {
            let (key, value) = item?;
            if !key.starts_with(prefix.as_bytes()) {
                break;
            }
            let key = String::from_utf8_lossy(&key);
            if let Some(slug) = key.strip_prefix(prefix.as_str()) {
                reads.push((slug.to_string(), serde_json::from_slice(&value)?));
            }
        }

        Ok(reads)
    }

    // --- Users ---

    /// Store a user.
    pub fn put_user(&self, user: &User) -> Result<()> {
        let key = format!("user:{}", user.id);
        self.db.put(key.as_bytes(), serde_json::to_vec(user)?)?;
        Ok(())
    }

    /// Get a user by ID.
    pub fn get_user(&self, id: &str) -> Result<Option<User>> {
        self.get_json(&format!("user:{}", id))
    }

    /// List all users.
    pub fn list_users(&self) -> Result<Vec<User>> {
        self.scan("user:")
    }

    /// Move a user to another team.
    pub fn set_team(&self, user_id: &str, team: Team) -> Result<User> {
        let mut user = self
            .get_user(user_id)?
            .ok_or_else(|| Error::NotFound(format!("user {}", user_id)))?;
        user.team = team;
        self.put_user(&user)?;
        Ok(user)
    }

    // --- Sessions ---

    /// Open a new session for an existing user.
    pub fn open_session(&self, user_id: &str, lifetime: Duration) -> Result<SessionRecord> {
        if self.get_user(user_id)?.is_none() {
            return Err(Error::NotFound(format!("user {}", user_id)));
        }
        let session = SessionRecord::open(user_id.to_string(), lifetime);
        let key = format!("session:{}", session.id);
        self.db.put(key.as_bytes(), serde_json::to_vec(&session)?)?;
        Ok(session)
    }

    /// Get a session by ID.
    pub fn get_session(&self, id: &str) -> Result<Option<SessionRecord>> {
        self.get_json(&format!("session:{}", id))
    }

    /// Delete a session.
    pub fn close_session(&self, id: &str) -> Result<()> {
        let key = format!("session:{}", id);
        self.db.delete(key.as_bytes())?;
        Ok(())
    }
}

#[async_trait]
impl ReadStore for Storage {
    async fn append_read(&self, event: &ReadEvent) -> Result<()> {
        self.put_read(event)
    }

    async fn latest_read(
        &self,
        reader: &ClientIdentity,
        slug: &str,
    ) -> Result<Option<DateTime<Utc>>> {
        self.get_latest_read(reader, slug)
    }

    async fn reads_in(&self, scope: &Scope) -> Result<Vec<ReadEvent>> {
        self.list_reads(scope)
    }

    async fn team_of(&self, reader: &ClientIdentity) -> Result<Team> {
        match reader {
            ClientIdentity::User(id) => Ok(self.get_user(id)?.map(|u| u.team).unwrap_or_default()),
            ClientIdentity::AnonymousClient(_) => Ok(Team::Unknown),
        }
    }
}

#[async_trait]
impl AccountStore for Storage {
    async fn session(&self, id: &str) -> Result<Option<SessionRecord>> {
        self.get_session(id)
    }

    async fn user(&self, id: &str) -> Result<Option<User>> {
        self.get_user(id)
    }
}
