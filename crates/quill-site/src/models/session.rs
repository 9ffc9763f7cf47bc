//! Login sessions.

use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};

/// Sessions last a year unless closed.
pub const DEFAULT_SESSION_LIFETIME_DAYS: i64 = 365;

/// Server-side record behind a session cookie.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionRecord {
    /// Opaque token stored in the cookie
    pub id: String,

    /// User the session belongs to
    pub user_id: String,

    pub created_at: DateTime<Utc>,

    pub expires_at: DateTime<Utc>,
}

impl SessionRecord {
    /// Open a session for `user_id` with a random 256-bit token.
    pub fn open(user_id: String, lifetime: Duration) -> Self {
        let mut token = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut token);
        let created_at = Utc::now();
        Self {
            id: hex::encode(token),
            user_id,
            created_at,
            expires_at: created_at + lifetime,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_session() {
        let session = SessionRecord::open("u1".into(), Duration::days(1));
        assert_eq!(session.id.len(), 64);
        assert_eq!(session.user_id, "u1");
        assert!(!session.is_expired(Utc::now()));
        assert!(session.is_expired(Utc::now() + Duration::days(2)));
    }
}
