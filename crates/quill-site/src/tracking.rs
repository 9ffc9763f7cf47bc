//! The read-tracking action.
//!
//! One call walks a fixed sequence:
//!
//! ```text
//! identity resolved (by caller)
//!   → pre-write leaders captured (cached rankings, post + overall)
//!   → read recorded
//!   → post-write rankings recomputed (forced fresh)
//!   → leaders compared per scope
//!   → shifts handed to the dispatcher
//! ```
//!
//! Only an invalid slug or a failed write fails the action. Ranking and
//! notification problems are logged and skip the affected scope.

use crate::error::{AggregationError, TrackError, WriteError};
use crate::identity::Resolution;
use crate::models::{validate_slug, ClientIdentity, ReadEvent};
use crate::notify::{LeaderChangeNotice, NotificationDispatcher};
use crate::ranking::RankingAggregator;
use crate::store::ReadStore;
use chrono::Utc;
use quill_rankings::{detect_leader_change, ranking_leader, Leader, Scope};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Whether a read was stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordOutcome {
    Recorded,
    /// Same reader, same post, inside the dedupe window. The earlier read stands.
    Duplicate,
}

/// Result of a successful tracking action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadReceipt {
    pub outcome: RecordOutcome,
    /// Notices handed to the dispatcher.
    pub notices: usize,
}

impl ReadReceipt {
    pub fn recorded(&self) -> bool {
        self.outcome == RecordOutcome::Recorded
    }
}

/// One lock per reader and post, held across the dedupe check and the append.
///
/// Entries are dropped once nobody holds or waits on them.
#[derive(Default)]
struct ReaderLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl ReaderLocks {
    async fn acquire(&self, key: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        Arc::clone(locks.entry(key.to_string()).or_default())
    }

    async fn release(&self, key: &str, lock: Arc<Mutex<()>>) {
        let mut locks = self.locks.lock().await;
        drop(lock);
        if locks.get(key).map_or(false, |lock| Arc::strong_count(lock) == 1) {
            locks.remove(key);
        }
    }

    #[cfg(test)]
    async fn len(&self) -> usize {
        self.locks.lock().await.len()
    }
}

/// Records reads and announces leadership changes.
pub struct ReadTracker {
    store: Arc<dyn ReadStore>,
    aggregator: RankingAggregator,
    dispatcher: Arc<NotificationDispatcher>,
    dedupe_window: Duration,
    reader_locks: Arc<ReaderLocks>,
}

impl ReadTracker {
    pub fn new(
        store: Arc<dyn ReadStore>,
        aggregator: RankingAggregator,
        dispatcher: Arc<NotificationDispatcher>,
        dedupe_window: Duration,
    ) -> Self {
        Self {
            store,
            aggregator,
            dispatcher,
            dedupe_window,
            reader_locks: Arc::new(ReaderLocks::default()),
        }
    }

    pub fn aggregator(&self) -> &RankingAggregator {
        &self.aggregator
    }

    /// Track one read of `slug` by the resolved reader.
    pub async fn track_read(
        &self,
        slug: &str,
        resolution: &Resolution,
    ) -> Result<ReadReceipt, TrackError> {
        validate_slug(slug).map_err(TrackError::InvalidSlug)?;
        let scopes = [Scope::post(slug), Scope::Overall];

        let (post_before, overall_before) = tokio::join!(
            self.leader(&scopes[0], false),
            self.leader(&scopes[1], false),
        );

        let outcome = self.record_read(slug, &resolution.identity).await?;
        if outcome == RecordOutcome::Duplicate {
            tracing::debug!(slug, reader = %resolution.identity, "Duplicate read ignored");
            return Ok(ReadReceipt { outcome, notices: 0 });
        }

        let (post_after, overall_after) = tokio::join!(
            self.leader(&scopes[0], true),
            self.leader(&scopes[1], true),
        );

        let mut notices = 0;
        for (scope, before, after) in [
            (&scopes[0], post_before, post_after),
            (&scopes[1], overall_before, overall_after),
        ] {
            let (before, after) = match (before, after) {
                (Ok(before), Ok(after)) => (before, after),
                (Err(e), _) | (_, Err(e)) => {
                    tracing::warn!(scope = %scope, "Skipping leader check: {}", e);
                    continue;
                }
            };

            if let Some(shift) = detect_leader_change(scope, before, after) {
                tracing::info!(
                    scope = %scope,
                    new_leader = %shift.new_leader,
                    prev_leader = ?shift.prev_leader,
                    "Team leader changed"
                );
                self.dispatcher.dispatch(LeaderChangeNotice {
                    shift,
                    post_slug: slug.to_string(),
                    reader: resolution.reader_name(),
                });
                notices += 1;
            }
        }

        Ok(ReadReceipt { outcome, notices })
    }

    /// Store a read unless the reader already read `slug` within the dedupe
    /// window.
    ///
    /// Check and append run in their own task, under a lock per reader and
    /// post, so concurrent reads by one reader store at most one event and
    /// the append completes even if the caller is dropped mid-request.
    pub async fn record_read(
        &self,
        slug: &str,
        identity: &ClientIdentity,
    ) -> Result<RecordOutcome, WriteError> {
        let store = Arc::clone(&self.store);
        let locks = Arc::clone(&self.reader_locks);
        let window = self.dedupe_window;
        let (task_slug, reader) = (slug.to_string(), identity.clone());

        let outcome = tokio::spawn(async move {
            let key = format!("{}/{}", reader.key(), task_slug);
            let lock = locks.acquire(&key).await;
            let outcome = {
                let _turn = lock.lock().await;
                append_unless_recent(store.as_ref(), task_slug, reader, window).await
            };
            locks.release(&key, lock).await;
            outcome
        })
        .await
        .map_err(|_| WriteError::Interrupted)??;

        if outcome == RecordOutcome::Recorded {
            tracing::debug!(slug, reader = %identity, "Recorded read");
        }
        Ok(outcome)
    }

    async fn leader(
        &self,
        scope: &Scope,
        force_fresh: bool,
    ) -> Result<Option<Leader>, AggregationError> {
        let snapshot = self.aggregator.get_rankings(scope, force_fresh).await?;
        Ok(ranking_leader(&snapshot))
    }
}

async fn append_unless_recent(
    store: &dyn ReadStore,
    slug: String,
    reader: ClientIdentity,
    window: Duration,
) -> Result<RecordOutcome, WriteError> {
    if !window.is_zero() {
        let latest = store
            .latest_read(&reader, &slug)
            .await
            .map_err(WriteError::Store)?;
        if let Some(latest) = latest {
            let age = Utc::now().signed_duration_since(latest);
            if age.to_std().map_or(true, |age| age < window) {
                return Ok(RecordOutcome::Duplicate);
            }
        }
    }

    store
        .append_read(&ReadEvent::now(slug, reader))
        .await
        .map_err(WriteError::Store)?;
    Ok(RecordOutcome::Recorded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ranking::RankingCache;
    use crate::testing::{MemoryStore, RecordingNotifier};
    use quill_rankings::Team;

    struct Harness {
        store: Arc<MemoryStore>,
        notifier: Arc<RecordingNotifier>,
        dispatcher: Arc<NotificationDispatcher>,
        tracker: ReadTracker,
    }

    fn harness(dedupe_window: Duration) -> Harness {
        let store = Arc::new(MemoryStore::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let dispatcher = Arc::new(NotificationDispatcher::start(notifier.clone(), 16));
        let cache = Arc::new(RankingCache::new(Duration::from_secs(60), 64));
        let aggregator = RankingAggregator::new(store.clone(), cache);
        let tracker = ReadTracker::new(store.clone(), aggregator, dispatcher.clone(), dedupe_window);
        Harness {
            store,
            notifier,
            dispatcher,
            tracker,
        }
    }

    fn resolved(identity: ClientIdentity) -> Resolution {
        Resolution {
            identity,
            user: None,
            cookies: Vec::new(),
        }
    }

    impl Harness {
        async fn read_as(&self, team: Team, name: &str, slug: &str) -> ReadReceipt {
            let identity = self.store.user_on(team, name);
            self.tracker.track_read(slug, &resolved(identity)).await.unwrap()
        }

        async fn flush(&self) -> Vec<LeaderChangeNotice> {
            self.dispatcher.shutdown().await;
            self.notifier.notices()
        }
    }

    #[tokio::test]
    async fn overtaking_fires_one_notice_per_scope() {
        let h = harness(Duration::ZERO);
        h.read_as(Team::Blue, "a", "intro").await; // BLUE leads post and overall
        h.read_as(Team::Red, "b", "intro").await; // tie, nobody leads
        let receipt = h.read_as(Team::Red, "c", "intro").await; // RED takes over

        assert!(receipt.recorded());
        assert_eq!(receipt.notices, 2);

        let notices = h.flush().await;
        let red: Vec<_> = notices
            .iter()
            .filter(|n| n.shift.new_leader == Team::Red)
            .collect();
        assert_eq!(red.len(), 2);
        assert!(red.iter().all(|n| n.shift.prev_leader.is_none()));
        assert!(red.iter().any(|n| n.shift.scope == Scope::post("intro")));
        assert!(red.iter().any(|n| n.shift.scope == Scope::Overall));
    }

    #[tokio::test]
    async fn direct_takeover_reports_previous_leader() {
        let h = harness(Duration::ZERO);
        let store = &h.store;
        for (team, name) in [(Team::Blue, "b1"), (Team::Blue, "b2"), (Team::Red, "r1")] {
            let reader = store.user_on(team, name);
            store.append_read(&ReadEvent::now("intro", reader)).await.unwrap();
        }
        // Cache sees BLUE=2 RED=1 overall.
        h.tracker.aggregator().get_rankings(&Scope::Overall, false).await.unwrap();

        // A concurrent RED read lands without refreshing the cache.
        let concurrent = store.user_on(Team::Red, "r2");
        store.append_read(&ReadEvent::now("other", concurrent)).await.unwrap();

        // This read takes RED to 3 overall, straight past the cached BLUE lead.
        let receipt = h.read_as(Team::Red, "r3", "other").await;
        assert_eq!(receipt.notices, 1);

        let notices = h.flush().await;
        let overall: Vec<_> = notices.iter().filter(|n| n.shift.scope == Scope::Overall).collect();
        assert_eq!(overall.len(), 1);
        assert_eq!(overall[0].shift.prev_leader, Some(Team::Blue));
        assert_eq!(overall[0].shift.new_leader, Team::Red);
        assert_eq!(overall[0].post_slug, "other");
    }

    #[tokio::test]
    async fn same_leader_fires_nothing() {
        let h = harness(Duration::ZERO);
        h.read_as(Team::Blue, "a", "intro").await;
        let receipt = h.read_as(Team::Blue, "b", "intro").await;
        assert_eq!(receipt.notices, 0);

        // Only the first read produced notices.
        assert_eq!(h.flush().await.len(), 2);
    }

    #[tokio::test]
    async fn anonymous_reads_never_change_leaders() {
        let h = harness(Duration::ZERO);
        let receipt = h
            .tracker
            .track_read("intro", &resolved(ClientIdentity::AnonymousClient("c".into())))
            .await
            .unwrap();
        assert!(receipt.recorded());
        assert_eq!(receipt.notices, 0);
        assert_eq!(h.tracker.aggregator().get_total_post_reads("intro").await.unwrap(), 1);
        assert!(h.flush().await.is_empty());
    }

    #[tokio::test]
    async fn failed_write_stops_the_action() {
        let h = harness(Duration::ZERO);
        let reader = h.store.user_on(Team::Blue, "a");
        let aggregator = h.tracker.aggregator();
        aggregator.get_rankings(&Scope::post("intro"), false).await.unwrap();
        aggregator.get_rankings(&Scope::Overall, false).await.unwrap();
        let computed = aggregator.computations();

        h.store.fail_appends(true);
        let result = h.tracker.track_read("intro", &resolved(reader)).await;

        assert!(matches!(result, Err(TrackError::Write(WriteError::Store(_)))));
        assert_eq!(aggregator.computations(), computed);
        assert!(h.flush().await.is_empty());
    }

    #[tokio::test]
    async fn ranking_failure_does_not_fail_the_read() {
        let h = harness(Duration::ZERO);
        let reader = h.store.user_on(Team::Blue, "a");
        h.store.fail_scans(true);

        let receipt = h.tracker.track_read("intro", &resolved(reader)).await.unwrap();
        assert!(receipt.recorded());
        assert_eq!(receipt.notices, 0);
        assert_eq!(h.store.appends(), 1);
        assert!(h.flush().await.is_empty());
    }

    #[tokio::test]
    async fn repeated_read_inside_window_is_deduplicated() {
        let h = harness(Duration::from_secs(600));
        let reader = h.store.user_on(Team::Yellow, "y");

        let first = h.tracker.track_read("intro", &resolved(reader.clone())).await.unwrap();
        let second = h.tracker.track_read("intro", &resolved(reader.clone())).await.unwrap();
        let other = h.tracker.track_read("other", &resolved(reader)).await.unwrap();

        assert_eq!(first.outcome, RecordOutcome::Recorded);
        assert_eq!(second.outcome, RecordOutcome::Duplicate);
        assert_eq!(other.outcome, RecordOutcome::Recorded);

        let stored = h.store.stored_reads();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0].slug, "intro");
    }

    #[tokio::test]
    async fn concurrent_reads_by_one_reader_store_one_event() {
        let h = harness(Duration::from_secs(600));
        let reader = resolved(h.store.user_on(Team::Blue, "b"));

        let (first, second) = tokio::join!(
            h.tracker.track_read("intro", &reader),
            h.tracker.track_read("intro", &reader),
        );

        let mut outcomes = vec![first.unwrap().outcome, second.unwrap().outcome];
        outcomes.sort_by_key(|outcome| *outcome == RecordOutcome::Duplicate);
        assert_eq!(outcomes, vec![RecordOutcome::Recorded, RecordOutcome::Duplicate]);
        assert_eq!(h.store.stored_reads().len(), 1);
        assert_eq!(h.tracker.reader_locks.len().await, 0);
    }

    #[tokio::test]
    async fn append_finishes_after_the_caller_goes_away() {
        let h = harness(Duration::ZERO);
        let reader = resolved(h.store.user_on(Team::Red, "r"));
        h.store.hold_appends();

        {
            let mut request = Box::pin(h.tracker.track_read("intro", &reader));
            tokio::select! {
                biased;
                _ = &mut request => panic!("append should still be held"),
                _ = h.store.append_started() => {}
            }
        }
        assert!(h.store.stored_reads().is_empty());

        h.store.release_appends();
        for _ in 0..100 {
            if !h.store.stored_reads().is_empty() {
                break;
            }
            tokio::task::yield_now().await;
        }

        let stored = h.store.stored_reads();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].slug, "intro");
        assert_eq!(stored[0].reader, reader.identity);
    }

    #[tokio::test]
    async fn invalid_slug_is_rejected_before_anything_runs() {
        let h = harness(Duration::ZERO);
        let reader = h.store.user_on(Team::Blue, "a");
        let result = h.tracker.track_read("../etc", &resolved(reader)).await;
        assert!(matches!(result, Err(TrackError::InvalidSlug(_))));
        assert_eq!(h.tracker.aggregator().computations(), 0);
        assert_eq!(h.store.appends(), 0);
    }
}
