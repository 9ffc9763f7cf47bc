//! Authenticated readers.

use quill_rankings::Team;
use serde::{Deserialize, Serialize};

/// A registered reader. Their team decides where their reads score.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    /// Unique identifier
    pub id: String,

    /// Login email
    pub email: String,

    /// Name shown in announcements
    pub first_name: String,

    /// Team the user plays for
    #[serde(default)]
    pub team: Team,
}

impl User {
    /// Create a user with a fresh ID.
    pub fn new(email: String, first_name: String, team: Team) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            email,
            first_name,
            team,
        }
    }
}
