//! Leader-change notifications.
//!
//! Detection happens in the request path; delivery does not. Notices are
//! queued to a [`NotificationDispatcher`] whose worker task calls the
//! configured [`LeaderChangeNotifier`]. A slow or failing notifier never
//! holds up or fails a read.
//!
//! ```text
//! track_read ──dispatch()──▶ [mpsc queue] ──▶ worker ──▶ notifier (log / webhook)
//! ```

use crate::error::NotifyError;
use async_trait::async_trait;
use quill_rankings::{LeaderShift, Scope};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex, Notify};
use tokio::task::JoinHandle;

/// Default queue depth for pending notices.
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// A leadership change worth announcing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeaderChangeNotice {
    pub shift: LeaderShift,
    /// Post whose read caused the change.
    pub post_slug: String,
    /// First name of the reader, when logged in.
    pub reader: Option<String>,
}

impl LeaderChangeNotice {
    /// Human-readable announcement.
    pub fn message(&self) -> String {
        let new = self.shift.new_leader;
        let reader = self.reader.as_deref().unwrap_or("an anonymous reader");
        let prev = match self.shift.prev_leader {
            Some(prev) => format!("team {} {}", prev, prev.emoji()),
            None => "nobody".to_string(),
        };

        match &self.shift.scope {
            Scope::Post(slug) => format!(
                "Team {} {} took the lead on \"{}\" from {} after a read by {}.",
                new,
                new.emoji(),
                slug,
                prev,
                reader
            ),
            Scope::Overall => format!(
                "Team {} {} now leads overall, taking over from {} after {} read \"{}\".",
                new,
                new.emoji(),
                prev,
                reader,
                self.post_slug
            ),
        }
    }
}

/// Something that can announce a leader change.
#[async_trait]
pub trait LeaderChangeNotifier: Send + Sync {
    async fn notify_leader_change(&self, notice: &LeaderChangeNotice) -> Result<(), NotifyError>;
}

/// Writes announcements to the log.
pub struct LogNotifier;

#[async_trait]
impl LeaderChangeNotifier for LogNotifier {
    async fn notify_leader_change(&self, notice: &LeaderChangeNotice) -> Result<(), NotifyError> {
        tracing::info!(
            scope = %notice.shift.scope,
            new_leader = %notice.shift.new_leader,
            "{}",
            notice.message()
        );
        Ok(())
    }
}

/// Posts announcements to a chat webhook as `{"content": "..."}`.
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

#[derive(Serialize)]
struct WebhookPayload {
    content: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl LeaderChangeNotifier for WebhookNotifier {
    async fn notify_leader_change(&self, notice: &LeaderChangeNotice) -> Result<(), NotifyError> {
        self.client
            .post(&self.url)
            .json(&WebhookPayload {
                content: notice.message(),
            })
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

/// Delivery counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DispatchStats {
    pub delivered: u64,
    pub failed: u64,
    /// Notices refused because the queue was full or closed.
    pub dropped: u64,
}

#[derive(Default)]
struct Counters {
    delivered: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
}

/// Queue plus worker task that delivers notices off the request path.
pub struct NotificationDispatcher {
    tx: mpsc::Sender<LeaderChangeNotice>,
    closing: Arc<Notify>,
    worker: Mutex<Option<JoinHandle<()>>>,
    counters: Arc<Counters>,
}

impl NotificationDispatcher {
    /// Start the worker task. Must be called inside a tokio runtime.
    pub fn start(notifier: Arc<dyn LeaderChangeNotifier>, capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let closing = Arc::new(Notify::new());
        let counters = Arc::new(Counters::default());

        let worker = tokio::spawn(run_worker(
            rx,
            notifier,
            Arc::clone(&closing),
            Arc::clone(&counters),
        ));

        Self {
            tx,
            closing,
            worker: Mutex::new(Some(worker)),
            counters,
        }
    }

    /// Queue a notice. Never blocks; a full or closed queue drops the notice.
    pub fn dispatch(&self, notice: LeaderChangeNotice) {
        if let Err(e) = self.tx.try_send(notice) {
            self.counters.dropped.fetch_add(1, Ordering::Relaxed);
            let reason = match e {
                mpsc::error::TrySendError::Full(_) => "queue full",
                mpsc::error::TrySendError::Closed(_) => "dispatcher stopped",
            };
            tracing::warn!("Dropping leader-change notice: {}", reason);
        }
    }

    /// Deliver everything already queued, then stop the worker.
    pub async fn shutdown(&self) {
        let worker = self.worker.lock().await.take();
        if let Some(worker) = worker {
            self.closing.notify_one();
            if let Err(e) = worker.await {
                tracing::error!("Notification worker died: {}", e);
            }
        }
    }

    pub fn stats(&self) -> DispatchStats {
        DispatchStats {
            delivered: self.counters.delivered.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
        }
    }
}

async fn run_worker(
    mut rx: mpsc::Receiver<LeaderChangeNotice>,
    notifier: Arc<dyn LeaderChangeNotifier>,
    closing: Arc<Notify>,
    counters: Arc<Counters>,
) {
    loop {
        tokio::select! {
            biased;
            Some(notice) = rx.recv() => deliver(notifier.as_ref(), &notice, &counters).await,
            _ = closing.notified() => break,
        }
    }

    rx.close();
    while let Some(notice) = rx.recv().await {
        deliver(notifier.as_ref(), &notice, &counters).await;
    }
    tracing::debug!("Notification worker stopped");
}

async fn deliver(
    notifier: &dyn LeaderChangeNotifier,
    notice: &LeaderChangeNotice,
    counters: &Counters,
) {
    match notifier.notify_leader_change(notice).await {
        Ok(()) => {
            counters.delivered.fetch_add(1, Ordering::Relaxed);
        }
        Err(e) => {
            counters.failed.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(
                scope = %notice.shift.scope,
                post = %notice.post_slug,
                "Leader-change notification failed: {}",
                e
            );
        }
    }
}
