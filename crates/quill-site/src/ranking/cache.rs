//! Per-scope ranking cache with single-flight recomputation.
//!
//! One lock guards both the cached snapshots and the in-flight computations,
//! so checking the cache, joining a running computation and registering a
//! new one happen atomically per scope.
//!
//! A forced lookup must observe every write that finished before it began.
//! It therefore only joins a computation that has not yet started reading
//! the store. If the running one already has, a follow-up computation is
//! queued behind it, and later forced callers join that follow-up.

use crate::error::AggregationError;
use futures::future::{BoxFuture, Shared};
use quill_rankings::{RankingSnapshot, Scope};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Result of one ranking computation, shared by everyone who joined it.
pub type RankingResult = Result<Arc<RankingSnapshot>, AggregationError>;

/// A running computation that any number of callers can await.
pub type SharedComputation = Shared<BoxFuture<'static, RankingResult>>;

/// Handed to the starter of a new computation.
pub struct ComputationTicket {
    /// Identifies the computation when it reports back through
    /// [`RankingCache::complete`].
    pub id: u64,
    /// Must be set right before the computation reads the store.
    pub scanning: Arc<AtomicBool>,
    /// Earlier computation for the same scope that has to finish first.
    pub after: Option<SharedComputation>,
}

#[derive(Clone)]
struct CachedRanking {
    snapshot: Arc<RankingSnapshot>,
    computed_at: Instant,
}

struct InFlight {
    id: u64,
    computation: SharedComputation,
    scanning: Arc<AtomicBool>,
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<Scope, CachedRanking>,
    inflight: HashMap<Scope, InFlight>,
    next_id: u64,
}

/// What a lookup found.
pub enum Lookup {
    /// A snapshot younger than the TTL.
    Hit(Arc<RankingSnapshot>),
    /// A computation to await, either joined or just started.
    Pending(SharedComputation),
}

/// Ranking snapshots keyed by scope.
pub struct RankingCache {
    ttl: Duration,
    max_entries: usize,
    state: Mutex<CacheState>,
}

impl RankingCache {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            ttl,
            max_entries: max_entries.max(1),
            state: Mutex::new(CacheState::default()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Serve from cache, join the running computation, or start one.
    ///
    /// Without `force_fresh` any running computation is joined. With it the
    /// cached snapshot is skipped and only a computation that has not begun
    /// scanning is joined. `start` runs under the cache lock and must only
    /// spawn, never await.
    pub async fn lookup_or_start<F>(&self, scope: &Scope, force_fresh: bool, start: F) -> Lookup
    where
        F: FnOnce(ComputationTicket) -> SharedComputation,
    {
        let mut state = self.state.lock().await;

        if !force_fresh {
            if let Some(entry) = state.entries.get(scope) {
                if entry.computed_at.elapsed() <= self.ttl {
                    return Lookup::Hit(Arc::clone(&entry.snapshot));
                }
            }
        }

        let after = match state.inflight.get(scope) {
            Some(running) if !force_fresh || !running.scanning.load(Ordering::SeqCst) => {
                tracing::trace!(scope = %scope, "Joining in-flight ranking computation");
                return Lookup::Pending(running.computation.clone());
            }
            Some(running) => {
                tracing::trace!(scope = %scope, "Queueing ranking computation behind a running scan");
                Some(running.computation.clone())
            }
            None => None,
        };

        state.next_id += 1;
        let id = state.next_id;
        let scanning = Arc::new(AtomicBool::new(false));
        let computation = start(ComputationTicket {
            id,
            scanning: Arc::clone(&scanning),
            after,
        });
        state.inflight.insert(
            scope.clone(),
            InFlight {
                id,
                computation: computation.clone(),
                scanning,
            },
        );
        Lookup::Pending(computation)
    }

    /// Record the outcome of computation `id` and clear its in-flight slot,
    /// unless a newer computation has taken that slot over.
    ///
    /// Failures leave any previous snapshot in place.
    pub async fn complete(&self, scope: &Scope, id: u64, result: &RankingResult) {
        let mut state = self.state.lock().await;
        if state.inflight.get(scope).map_or(false, |running| running.id == id) {
            state.inflight.remove(scope);
        }

        if let Ok(snapshot) = result {
            let ttl = self.ttl;
            state.entries.retain(|_, entry| entry.computed_at.elapsed() <= ttl);
            if !state.entries.contains_key(scope) && state.entries.len() >= self.max_entries {
                if let Some(victim) = state
                    .entries
                    .iter()
                    .min_by_key(|(_, entry)| entry.computed_at)
                    .map(|(key, _)| key.clone())
                {
                    state.entries.remove(&victim);
                }
            }
            state.entries.insert(
                scope.clone(),
                CachedRanking {
                    snapshot: Arc::clone(snapshot),
                    computed_at: Instant::now(),
                },
            );
        }
    }

    /// Cached snapshot for `scope` regardless of age.
    pub async fn peek(&self, scope: &Scope) -> Option<Arc<RankingSnapshot>> {
        let state = self.state.lock().await;
        state.entries.get(scope).map(|entry| Arc::clone(&entry.snapshot))
    }

    /// Drop the cached snapshot for `scope`.
    pub async fn invalidate(&self, scope: &Scope) {
        self.state.lock().await.entries.remove(scope);
    }

    /// Number of cached snapshots, stale ones included.
    pub async fn len(&self) -> usize {
        self.state.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
