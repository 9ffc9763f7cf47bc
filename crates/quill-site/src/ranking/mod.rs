//! Ranking aggregation.
//!
//! [`RankingAggregator`] turns stored reads into [`RankingSnapshot`]s and
//! keeps them in an injected [`RankingCache`]. The cache is created at node
//! startup and lives as long as the node.
//!
//! [`RankingSnapshot`]: quill_rankings::RankingSnapshot

mod aggregator;
mod cache;

pub use aggregator::{compute_snapshot, RankingAggregator};
pub use cache::{ComputationTicket, Lookup, RankingCache, RankingResult, SharedComputation};
pub use quill_rankings::ranking_leader as get_ranking_leader;
