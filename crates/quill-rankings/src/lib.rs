//! Team Read Rankings
//!
//! Every read of a post scores a point for the reader's team. This crate
//! holds the pure side of that game: the closed set of teams, ranking
//! snapshots over a scope, and the rules for who is leading.
//!
//! # Scopes
//!
//! Rankings are computed over a [`Scope`]:
//! - `Post(slug)` counts only reads of one post
//! - `Overall` counts reads across every post
//!
//! # Leadership
//!
//! A team leads a scope only with a strictly higher count than every other
//! contender. Ties and empty snapshots have no leader:
//!
//! ```text
//! BLUE=5 RED=2 YELLOW=0   → BLUE leads with 5
//! BLUE=3 RED=3 YELLOW=1   → no leader
//! BLUE=0 RED=0 YELLOW=0   → no leader
//! ```
//!
//! Readers without a team (`UNKNOWN`) add to the total but never lead.
//!
//! Nothing in here performs I/O. Snapshots are built by the service layer
//! from stored read events and handed back to these functions.

mod leader;
mod snapshot;
mod team;

pub use leader::{detect_leader_change, ranking_leader, Leader, LeaderShift};
pub use snapshot::{RankingSnapshot, Scope};
pub use team::{ParseTeamError, Team};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leader_follows_recorded_reads() {
        let mut snapshot = RankingSnapshot::empty(Scope::Overall);
        assert_eq!(ranking_leader(&snapshot), None);

        snapshot.record(Team::Red);
        assert_eq!(
            ranking_leader(&snapshot),
            Some(Leader { team: Team::Red, count: 1 })
        );

        snapshot.record(Team::Blue);
        assert_eq!(ranking_leader(&snapshot), None); // 1-1 tie

        snapshot.record(Team::Blue);
        let before = Some(Leader { team: Team::Red, count: 1 });
        let after = ranking_leader(&snapshot);
        let shift = detect_leader_change(&Scope::Overall, before, after).unwrap();
        assert_eq!(shift.new_leader, Team::Blue);
        assert_eq!(shift.prev_leader, Some(Team::Red));
    }
}
