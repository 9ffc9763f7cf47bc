//! In-memory stores and notifiers for unit tests.

use crate::error::{Error, NotifyError, Result};
use crate::models::{ClientIdentity, ReadEvent, SessionRecord, User};
use crate::notify::{LeaderChangeNotice, LeaderChangeNotifier};
use crate::store::{AccountStore, ReadStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use quill_rankings::{Scope, Team};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio::sync::{Notify, Semaphore};

/// Holds store calls open until released, so tests can act mid-call.
struct Gate {
    held: AtomicBool,
    entered: Notify,
    open: Semaphore,
}

impl Default for Gate {
    fn default() -> Self {
        Self {
            held: AtomicBool::new(false),
            entered: Notify::new(),
            open: Semaphore::new(0),
        }
    }
}

impl Gate {
    async fn pass(&self) {
        if !self.held.load(Ordering::SeqCst) {
            return;
        }
        self.entered.notify_one();
        // Closing the semaphore is how the gate opens; the error is expected.
        let _ = self.open.acquire().await;
    }

    fn release(&self) {
        self.held.store(false, Ordering::SeqCst);
        self.open.close();
    }
}

/// Read and account store backed by plain collections, with failure switches.
#[derive(Default)]
pub struct MemoryStore {
    reads: Mutex<Vec<ReadEvent>>,
    users: Mutex<HashMap<String, User>>,
    sessions: Mutex<HashMap<String, SessionRecord>>,
    fail_appends: AtomicBool,
    fail_scans: AtomicBool,
    appends: AtomicUsize,
    scans: AtomicUsize,
    append_gate: Gate,
    scan_gate: Gate,
}

impl MemoryStore {
    /// Register a user on `team` and return their identity.
    pub fn user_on(&self, team: Team, name: &str) -> ClientIdentity {
        let user = User {
            id: format!("user-{}", name),
            email: format!("{}@example.com", name),
            first_name: name.to_string(),
            team,
        };
        let identity = ClientIdentity::User(user.id.clone());
        self.users.lock().unwrap().insert(user.id.clone(), user);
        identity
    }

    pub fn add_session(&self, session: SessionRecord) {
        self.sessions.lock().unwrap().insert(session.id.clone(), session);
    }

    pub fn fail_appends(&self, fail: bool) {
        self.fail_appends.store(fail, Ordering::SeqCst);
    }

    pub fn fail_scans(&self, fail: bool) {
        self.fail_scans.store(fail, Ordering::SeqCst);
    }

    /// Make every `append_read` wait for [`release_appends`](Self::release_appends).
    pub fn hold_appends(&self) {
        self.append_gate.held.store(true, Ordering::SeqCst);
    }

    /// Resolves once a held `append_read` is waiting.
    pub async fn append_started(&self) {
        self.append_gate.entered.notified().await;
    }

    pub fn release_appends(&self) {
        self.append_gate.release();
    }

    /// Make every `reads_in` wait, after taking its snapshot of the reads,
    /// for [`release_scans`](Self::release_scans).
    pub fn hold_scans(&self) {
        self.scan_gate.held.store(true, Ordering::SeqCst);
    }

    /// Resolves once a held `reads_in` has read the store.
    pub async fn scan_started(&self) {
        self.scan_gate.entered.notified().await;
    }

    pub fn release_scans(&self) {
        self.scan_gate.release();
    }

    /// Successful appends so far.
    pub fn appends(&self) -> usize {
        self.appends.load(Ordering::SeqCst)
    }

    /// `reads_in` calls so far, failed ones included.
    pub fn scans(&self) -> usize {
        self.scans.load(Ordering::SeqCst)
    }

    pub fn stored_reads(&self) -> Vec<ReadEvent> {
        self.reads.lock().unwrap().clone()
    }
}

#[async_trait]
impl ReadStore for MemoryStore {
    async fn append_read(&self, event: &ReadEvent) -> Result<()> {
        if self.fail_appends.load(Ordering::SeqCst) {
            return Err(Error::Storage("append refused".into()));
        }
        self.append_gate.pass().await;
        self.reads.lock().unwrap().push(event.clone());
        self.appends.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn latest_read(
        &self,
        reader: &ClientIdentity,
        slug: &str,
    ) -> Result<Option<DateTime<Utc>>> {
        Ok(self
            .reads
            .lock()
            .unwrap()
            .iter()
            .filter(|e| &e.reader == reader && e.slug == slug)
            .map(|e| e.timestamp)
            .max())
    }

    async fn reads_in(&self, scope: &Scope) -> Result<Vec<ReadEvent>> {
        self.scans.fetch_add(1, Ordering::SeqCst);
        if self.fail_scans.load(Ordering::SeqCst) {
            return Err(Error::Storage("scan refused".into()));
        }
        let events: Vec<ReadEvent> = self
            .reads
            .lock()
            .unwrap()
            .iter()
            .filter(|e| scope.slug().map_or(true, |slug| e.slug == slug))
            .cloned()
            .collect();
        self.scan_gate.pass().await;
        Ok(events)
    }

    async fn team_of(&self, reader: &ClientIdentity) -> Result<Team> {
        Ok(match reader {
            ClientIdentity::User(id) => self
                .users
                .lock()
                .unwrap()
                .get(id)
                .map(|u| u.team)
                .unwrap_or_default(),
            ClientIdentity::AnonymousClient(_) => Team::Unknown,
        })
    }
}

#[async_trait]
impl AccountStore for MemoryStore {
    async fn session(&self, id: &str) -> Result<Option<SessionRecord>> {
        Ok(self.sessions.lock().unwrap().get(id).cloned())
    }

    async fn user(&self, id: &str) -> Result<Option<User>> {
        Ok(self.users.lock().unwrap().get(id).cloned())
    }
}

/// Account store whose every lookup fails.
pub struct BrokenAccounts;

#[async_trait]
impl AccountStore for BrokenAccounts {
    async fn session(&self, _id: &str) -> Result<Option<SessionRecord>> {
        Err(Error::Storage("session store offline".into()))
    }

    async fn user(&self, _id: &str) -> Result<Option<User>> {
        Err(Error::Storage("session store offline".into()))
    }
}

/// Notifier that remembers every notice, optionally failing each delivery.
#[derive(Default)]
pub struct RecordingNotifier {
    notices: Mutex<Vec<LeaderChangeNotice>>,
    fail: AtomicBool,
}

impl RecordingNotifier {
    pub fn failing() -> Self {
        let notifier = Self::default();
        notifier.fail.store(true, Ordering::SeqCst);
        notifier
    }

    pub fn notices(&self) -> Vec<LeaderChangeNotice> {
        self.notices.lock().unwrap().clone()
    }
}

#[async_trait]
impl LeaderChangeNotifier for RecordingNotifier {
    async fn notify_leader_change(
        &self,
        notice: &LeaderChangeNotice,
    ) -> std::result::Result<(), NotifyError> {
        self.notices.lock().unwrap().push(notice.clone());
        if self.fail.load(Ordering::SeqCst) {
            return Err(NotifyError::Rejected("recording notifier set to fail".into()));
        }
        Ok(())
    }
}
