//! Teams readers can score points for.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A team in the read game.
///
/// The set is closed. `Unknown` is the sentinel for readers whose team
/// can't be determined, which includes every anonymous client.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Team {
    Blue,
    Red,
    Yellow,
    #[default]
    Unknown,
}

impl Team {
    /// Every team, sentinel included.
    pub const ALL: [Team; 4] = [Team::Blue, Team::Red, Team::Yellow, Team::Unknown];

    /// Teams that can hold the lead.
    pub const CONTENDERS: [Team; 3] = [Team::Blue, Team::Red, Team::Yellow];

    /// Whether this team can lead a ranking.
    pub const fn is_contender(self) -> bool {
        !matches!(self, Team::Unknown)
    }

    /// Canonical upper-case name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Team::Blue => "BLUE",
            Team::Red => "RED",
            Team::Yellow => "YELLOW",
            Team::Unknown => "UNKNOWN",
        }
    }

    /// Emoji used in announcements.
    pub const fn emoji(self) -> &'static str {
        match self {
            Team::Blue => "🔵",
            Team::Red => "🔴",
            Team::Yellow => "🟡",
            Team::Unknown => "⚪",
        }
    }
}

impl fmt::Display for Team {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a string doesn't name a team.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown team name: {0:?}")]
pub struct ParseTeamError(pub String);

impl FromStr for Team {
    type Err = ParseTeamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "BLUE" => Ok(Team::Blue),
            "RED" => Ok(Team::Red),
            "YELLOW" => Ok(Team::Yellow),
            "UNKNOWN" => Ok(Team::Unknown),
            _ => Err(ParseTeamError(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_is_case_insensitive() {
        assert_eq!("blue".parse::<Team>(), Ok(Team::Blue));
        assert_eq!(" Yellow ".parse::<Team>(), Ok(Team::Yellow));
        assert_eq!("RED".parse::<Team>(), Ok(Team::Red));
        assert!("green".parse::<Team>().is_err());
    }

    #[test]
    fn unknown_never_contends() {
        assert!(!Team::Unknown.is_contender());
        assert!(Team::CONTENDERS.iter().all(|t| t.is_contender()));
        assert_eq!(Team::default(), Team::Unknown);
    }

    #[test]
    fn serializes_upper_case() {
        assert_eq!(serde_json::to_string(&Team::Yellow).unwrap(), "\"YELLOW\"");
        let parsed: Team = serde_json::from_str("\"UNKNOWN\"").unwrap();
        assert_eq!(parsed, Team::Unknown);
        assert_eq!(Team::Red.to_string(), "RED");
    }
}
