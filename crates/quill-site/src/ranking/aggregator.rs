//! Team read rankings computed from the read store.

use super::cache::{ComputationTicket, Lookup, RankingCache, RankingResult, SharedComputation};
use crate::error::{AggregationError, Result};
use crate::models::ClientIdentity;
use crate::store::ReadStore;
use futures::FutureExt;
use quill_rankings::{RankingSnapshot, Scope, Team};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::time::Instant;

/// Computes and caches ranking snapshots.
#[derive(Clone)]
pub struct RankingAggregator {
    store: Arc<dyn ReadStore>,
    cache: Arc<RankingCache>,
    computations: Arc<AtomicU64>,
}

impl RankingAggregator {
    pub fn new(store: Arc<dyn ReadStore>, cache: Arc<RankingCache>) -> Self {
        Self {
            store,
            cache,
            computations: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Rankings for `scope`.
    ///
    /// Without `force_fresh` a snapshot younger than the cache TTL is returned
    /// as-is. Otherwise the snapshot is recomputed, and concurrent callers for
    /// the same scope share a single recomputation.
    pub async fn get_rankings(&self, scope: &Scope, force_fresh: bool) -> RankingResult {
        let lookup = self
            .cache
            .lookup_or_start(scope, force_fresh, |ticket| {
                self.start_computation(scope.clone(), ticket)
            })
            .await;

        match lookup {
            Lookup::Hit(snapshot) => Ok(snapshot),
            Lookup::Pending(computation) => computation.await,
        }
    }

    /// Rankings for one post, or overall when `slug` is `None`.
    pub async fn get_blog_read_rankings(&self, slug: Option<&str>, force_fresh: bool) -> RankingResult {
        let scope = slug.map_or(Scope::Overall, Scope::post);
        self.get_rankings(&scope, force_fresh).await
    }

    /// Total reads of one post across all teams.
    pub async fn get_total_post_reads(&self, slug: &str) -> std::result::Result<u64, AggregationError> {
        let snapshot = self.get_rankings(&Scope::post(slug), false).await?;
        Ok(snapshot.total_reads())
    }

    /// Drop the cached snapshot for a scope.
    pub async fn invalidate(&self, scope: &Scope) {
        self.cache.invalidate(scope).await;
    }

    /// Number of recomputations started since creation.
    pub fn computations(&self) -> u64 {
        self.computations.load(Ordering::Relaxed)
    }

    pub fn cache(&self) -> &Arc<RankingCache> {
        &self.cache
    }

    /// Spawn the computation so it finishes even if every caller goes away.
    fn start_computation(&self, scope: Scope, ticket: ComputationTicket) -> SharedComputation {
        let store = Arc::clone(&self.store);
        let cache = Arc::clone(&self.cache);
        let computations = Arc::clone(&self.computations);
        let task_scope = scope.clone();
        let ComputationTicket { id, scanning, after } = ticket;

        let handle = tokio::spawn(async move {
            if let Some(previous) = after {
                // Its result is ignored; only its scan has to be out of the way.
                let _ = previous.await;
            }
            scanning.store(true, Ordering::SeqCst);
            computations.fetch_add(1, Ordering::Relaxed);
            let started = Instant::now();
            let result: RankingResult = compute_snapshot(store.as_ref(), task_scope.clone())
                .await
                .map(Arc::new)
                .map_err(AggregationError::from);
            cache.complete(&task_scope, id, &result).await;

            match &result {
                Ok(snapshot) => tracing::debug!(
                    scope = %task_scope,
                    total_reads = snapshot.total_reads(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Recomputed rankings"
                ),
                Err(e) => tracing::warn!(scope = %task_scope, "Ranking computation failed: {}", e),
            }
            result
        });

        let cache = Arc::clone(&self.cache);
        async move {
            match handle.await {
                Ok(result) => result,
                Err(e) => {
                    tracing::error!(scope = %scope, "Ranking task died: {}", e);
                    let result = Err(AggregationError::Interrupted);
                    cache.complete(&scope, id, &result).await;
                    result
                }
            }
        }
        .boxed()
        .shared()
    }
}

/// Count every read in `scope` toward its reader's team.
pub async fn compute_snapshot(store: &dyn ReadStore, scope: Scope) -> Result<RankingSnapshot> {
    let events = store.reads_in(&scope).await?;
    let mut teams: HashMap<ClientIdentity, Team> = HashMap::new();
    let mut snapshot = RankingSnapshot::empty(scope);

    for event in events {
        let team = match teams.get(&event.reader) {
            Some(team) => *team,
            None => {
                let team = store.team_of(&event.reader).await?;
                teams.insert(event.reader, team);
                team
            }
        };
        snapshot.record(team);
    }

    Ok(snapshot)
}
