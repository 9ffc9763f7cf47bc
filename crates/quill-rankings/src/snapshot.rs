//! Ranking snapshots: team read counts over a scope.

use crate::leader::{ranking_leader, Leader};
use crate::team::Team;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Aggregation boundary for a ranking.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "slug", rename_all = "snake_case")]
pub enum Scope {
    /// Reads of a single post.
    Post(String),
    /// Reads across all posts.
    Overall,
}

impl Scope {
    /// Scope for a single post.
    pub fn post(slug: impl Into<String>) -> Self {
        Scope::Post(slug.into())
    }

    /// The post slug, if this is a post scope.
    pub fn slug(&self) -> Option<&str> {
        match self {
            Scope::Post(slug) => Some(slug),
            Scope::Overall => None,
        }
    }

    /// Stable textual key, used for logging and storage prefixes.
    pub fn cache_key(&self) -> String {
        match self {
            Scope::Post(slug) => format!("post:{}", slug),
            Scope::Overall => "overall".to_string(),
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Post(slug) => write!(f, "post {}", slug),
            Scope::Overall => f.write_str("overall"),
        }
    }
}

/// Team read counts for one scope at one point in time.
///
/// Every team is always present, so a freshly created snapshot is all zeros.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankingSnapshot {
    scope: Scope,
    counts: BTreeMap<Team, u64>,
}

impl RankingSnapshot {
    /// An all-zero snapshot.
    pub fn empty(scope: Scope) -> Self {
        Self {
            scope,
            counts: Team::ALL.iter().map(|team| (*team, 0)).collect(),
        }
    }

    /// Build a snapshot from `(team, count)` pairs. Repeated teams are summed.
    pub fn from_counts<I>(scope: Scope, counts: I) -> Self
    where
        I: IntoIterator<Item = (Team, u64)>,
    {
        let mut snapshot = Self::empty(scope);
        for (team, count) in counts {
            *snapshot.counts.entry(team).or_insert(0) += count;
        }
        snapshot
    }

    /// Count one read for `team`.
    pub fn record(&mut self, team: Team) {
        *self.counts.entry(team).or_insert(0) += 1;
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    pub fn count(&self, team: Team) -> u64 {
        self.counts.get(&team).copied().unwrap_or(0)
    }

    /// All reads in scope, including readers without a team.
    pub fn total_reads(&self) -> u64 {
        self.counts.values().sum()
    }

    /// Share of the total held by `team`, in percent. Zero when empty.
    pub fn percent(&self, team: Team) -> f64 {
        let total = self.total_reads();
        if total == 0 {
            return 0.0;
        }
        self.count(team) as f64 * 100.0 / total as f64
    }

    /// `(team, count)` pairs in team order.
    pub fn entries(&self) -> impl Iterator<Item = (Team, u64)> + '_ {
        self.counts.iter().map(|(team, count)| (*team, *count))
    }

    /// The leading team, if one exists. See [`ranking_leader`].
    pub fn leader(&self) -> Option<Leader> {
        ranking_leader(self)
    }
}
