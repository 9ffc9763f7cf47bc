//! Identity resolution: who gets credit for a read.
//!
//! The decision itself ([`decide_identity`]) is pure. [`IdentityResolver`]
//! does the session lookup around it and returns any cookies that must be
//! set as an explicit part of its result, so callers decide where the
//! headers go.

use crate::error::IdentityError;
use crate::models::{ClientIdentity, User};
use crate::store::AccountStore;
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::Utc;
use std::sync::Arc;

/// Cookie holding the login session token.
pub const SESSION_COOKIE: &str = "quill_session";

/// Cookie holding the anonymous client ID.
pub const CLIENT_COOKIE: &str = "quill_client";

/// Outcome of the pure identity decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityDecision {
    pub identity: ClientIdentity,
    /// New client ID that must be persisted in [`CLIENT_COOKIE`].
    pub issue_client_cookie: Option<String>,
}

/// Pick the identity for a request.
///
/// An authenticated user always wins. Otherwise a well-formed client cookie
/// is reused, and failing that `mint` produces a new client ID that the
/// caller has to persist.
pub fn decide_identity(
    user: Option<&User>,
    client_cookie: Option<&str>,
    mint: impl FnOnce() -> String,
) -> IdentityDecision {
    if let Some(user) = user {
        return IdentityDecision {
            identity: ClientIdentity::User(user.id.clone()),
            issue_client_cookie: None,
        };
    }

    match client_cookie.and_then(|value| uuid::Uuid::parse_str(value).ok()) {
        Some(client_id) => IdentityDecision {
            identity: ClientIdentity::AnonymousClient(client_id.to_string()),
            issue_client_cookie: None,
        },
        None => {
            let client_id = mint();
            IdentityDecision {
                identity: ClientIdentity::AnonymousClient(client_id.clone()),
                issue_client_cookie: Some(client_id),
            }
        }
    }
}

/// A resolved identity plus the cookies the response must carry.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub identity: ClientIdentity,
    pub user: Option<User>,
    pub cookies: Vec<Cookie<'static>>,
}

impl Resolution {
    /// Add this resolution's cookies to an outgoing jar.
    pub fn apply(&self, jar: CookieJar) -> CookieJar {
        self.cookies
            .iter()
            .cloned()
            .fold(jar, |jar, cookie| jar.add(cookie))
    }

    /// Name used when announcing this reader, if they're logged in.
    pub fn reader_name(&self) -> Option<String> {
        self.user.as_ref().map(|user| user.first_name.clone())
    }
}

/// Resolves request cookies into a [`Resolution`].
pub struct IdentityResolver {
    accounts: Arc<dyn AccountStore>,
    secure_cookies: bool,
}

impl IdentityResolver {
    pub fn new(accounts: Arc<dyn AccountStore>, secure_cookies: bool) -> Self {
        Self {
            accounts,
            secure_cookies,
        }
    }

    /// Resolve the identity for a request's cookies.
    pub async fn resolve(&self, jar: &CookieJar) -> Result<Resolution, IdentityError> {
        let mut cookies = Vec::new();

        let user = match jar.get(SESSION_COOKIE) {
            Some(cookie) => {
                let user = self.session_user(cookie.value()).await?;
                if user.is_none() {
                    tracing::debug!("Dropping stale session cookie");
                    cookies.push(
                        Cookie::build((SESSION_COOKIE, ""))
                            .path("/")
                            .removal()
                            .build(),
                    );
                }
                user
            }
            None => None,
        };

        let decision = decide_identity(
            user.as_ref(),
            jar.get(CLIENT_COOKIE).map(|cookie| cookie.value()),
            || uuid::Uuid::new_v4().to_string(),
        );

        if let Some(client_id) = decision.issue_client_cookie {
            tracing::debug!(client_id = %client_id, "Issuing new client cookie");
            cookies.push(self.client_cookie(client_id));
        }

        Ok(Resolution {
            identity: decision.identity,
            user,
            cookies,
        })
    }

    async fn session_user(&self, session_id: &str) -> Result<Option<User>, IdentityError> {
        let session = match self.accounts.session(session_id).await.map_err(IdentityError)? {
            Some(session) if !session.is_expired(Utc::now()) => session,
            _ => return Ok(None),
        };
        self.accounts
            .user(&session.user_id)
            .await
            .map_err(IdentityError)
    }

    fn client_cookie(&self, client_id: String) -> Cookie<'static> {
        Cookie::build((CLIENT_COOKIE, client_id))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax)
            .secure(self.secure_cookies)
            .permanent()
            .build()
    }
}
