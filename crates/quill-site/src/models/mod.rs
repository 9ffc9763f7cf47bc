//! Data models for quill-site.
//!
//! - [`ReadEvent`] - one recorded read of a post
//! - [`ClientIdentity`] - who a read is attributed to
//! - [`User`] - an authenticated reader with a team
//! - [`SessionRecord`] - a login session backing the session cookie

mod read_event;
mod session;
mod user;

pub use read_event::{validate_slug, ClientIdentity, ReadEvent, MAX_SLUG_LEN};
pub use session::{SessionRecord, DEFAULT_SESSION_LIFETIME_DAYS};
pub use user::User;
