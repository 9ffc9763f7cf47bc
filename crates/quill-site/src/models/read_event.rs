//! Read events and the identities they are attributed to.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Longest slug accepted.
pub const MAX_SLUG_LEN: usize = 200;

/// Who a read is attributed to. Exactly one is active per request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "kebab-case")]
pub enum ClientIdentity {
    /// Logged-in user, resolved from the session cookie.
    User(String),
    /// Anonymous visitor, resolved from the client cookie.
    AnonymousClient(String),
}

impl ClientIdentity {
    pub fn id(&self) -> &str {
        match self {
            ClientIdentity::User(id) | ClientIdentity::AnonymousClient(id) => id,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, ClientIdentity::User(_))
    }

    /// Storage key component, e.g. `user:abc` or `client:xyz`.
    pub fn key(&self) -> String {
        match self {
            ClientIdentity::User(id) => format!("user:{}", id),
            ClientIdentity::AnonymousClient(id) => format!("client:{}", id),
        }
    }
}

impl fmt::Display for ClientIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

/// One read of one post. Immutable once recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadEvent {
    pub slug: String,
    pub reader: ClientIdentity,
    pub timestamp: DateTime<Utc>,
}

impl ReadEvent {
    /// A read happening now.
    pub fn now(slug: impl Into<String>, reader: ClientIdentity) -> Self {
        Self {
            slug: slug.into(),
            reader,
            timestamp: Utc::now(),
        }
    }
}

/// Check that a slug is usable as a post identifier and storage key segment.
///
/// Slugs are non-empty, at most [`MAX_SLUG_LEN`] bytes, and limited to ASCII
/// alphanumerics, `-`, `_` and `.`.
pub fn validate_slug(slug: &str) -> Result<(), String> {
    if slug.is_empty() {
        return Err("slug is empty".to_string());
    }
    if slug.len() > MAX_SLUG_LEN {
        return Err(format!("slug longer than {} bytes", MAX_SLUG_LEN));
    }
    if let Some(bad) = slug
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
    {
        return Err(format!("slug contains invalid character {:?}", bad));
    }
    Ok(())
}
