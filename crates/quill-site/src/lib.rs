//! Quill Site - read tracking and team leaderboards
//!
//! Every reader belongs to a team. Each read of a post counts toward the
//! reader's team, and whenever a read hands the lead on that post (or
//! overall) to another team, the change is announced.
//!
//! # Architecture
//!
//! - **Models**: Read events, reader identities, users, sessions
//! - **Storage**: RocksDB-backed read log and account store
//! - **Identity**: Session and client cookies resolved into a reader
//! - **Ranking**: Cached, single-flight team ranking snapshots
//! - **Tracking**: The read action and leader-change detection
//! - **Notify**: Background delivery of leader-change announcements
//! - **API**: HTTP endpoints for reads and leaderboards
//! - **Admin Socket**: Unix socket for local admin commands (quill-admin CLI)
//!
//! # Example
//!
//! ```no_run
//! use quill_site::{SiteConfig, SiteNode};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = SiteConfig::from_env()?;
//!     let node = SiteNode::new(config).await?;
//!     node.run().await?;
//!     Ok(())
//! }
//! ```

pub mod models;
pub mod store;
pub mod storage;
pub mod identity;
pub mod ranking;
pub mod notify;
pub mod tracking;
pub mod node;
pub mod api;
pub mod admin_socket;
pub mod error;

#[cfg(test)]
mod testing;

pub use error::{Error, Result};
pub use identity::{IdentityResolver, Resolution};
pub use models::{ClientIdentity, ReadEvent, SessionRecord, User};
pub use node::{SiteConfig, SiteNode, SiteState};
pub use notify::{LeaderChangeNotice, LeaderChangeNotifier, NotificationDispatcher};
pub use ranking::{RankingAggregator, RankingCache};
pub use storage::Storage;
pub use store::{AccountStore, ReadStore};
pub use tracking::{ReadReceipt, ReadTracker, RecordOutcome};
