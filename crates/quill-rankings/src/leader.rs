//! Leader determination and leader-change detection.
//!
//! Both functions are pure: the same snapshots always give the same answer.

use crate::snapshot::{RankingSnapshot, Scope};
use crate::team::Team;
use serde::{Deserialize, Serialize};

/// The team currently leading a scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Leader {
    pub team: Team,
    pub count: u64,
}

/// A change of leadership within one scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderShift {
    pub scope: Scope,
    pub new_leader: Team,
    /// `None` when nobody led before (empty or tied).
    pub prev_leader: Option<Team>,
}

/// Find the contender with the strictly highest count.
///
/// Returns `None` when the snapshot has no reads from contenders or when two
/// or more contenders share the highest count.
///
/// # Examples
///
/// ```
/// use quill_rankings::{ranking_leader, RankingSnapshot, Scope, Team};
///
/// let tied = RankingSnapshot::from_counts(
///     Scope::Overall,
///     [(Team::Blue, 3), (Team::Red, 3), (Team::Yellow, 1)],
/// );
/// assert_eq!(ranking_leader(&tied), None);
///
/// let clear = RankingSnapshot::from_counts(Scope::Overall, [(Team::Blue, 5), (Team::Red, 2)]);
/// assert_eq!(ranking_leader(&clear).map(|l| (l.team, l.count)), Some((Team::Blue, 5)));
/// ```
pub fn ranking_leader(snapshot: &RankingSnapshot) -> Option<Leader> {
    let mut best: Option<Leader> = None;
    let mut tied = false;

    for team in Team::CONTENDERS {
        let count = snapshot.count(team);
        match best {
            Some(current) if count < current.count => {}
            Some(current) if count == current.count => tied = true,
            _ => {
                best = Some(Leader { team, count });
                tied = false;
            }
        }
    }

    match best {
        Some(leader) if leader.count > 0 && !tied => Some(leader),
        _ => None,
    }
}

/// Compare leaders from before and after a read.
///
/// A shift is reported only when there is a leader afterwards and it is a
/// different team than before. Losing the lead to a tie is not a shift.
pub fn detect_leader_change(
    scope: &Scope,
    before: Option<Leader>,
    after: Option<Leader>,
) -> Option<LeaderShift> {
    let after = after?;
    let prev_leader = before.map(|leader| leader.team);
    if prev_leader == Some(after.team) {
        return None;
    }
    Some(LeaderShift {
        scope: scope.clone(),
        new_leader: after.team,
        prev_leader,
    })
}
