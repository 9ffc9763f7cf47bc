//! Site node - the main application entry point.
//!
//! Architecture:
//! - Single daemon process with shared RocksDB storage
//! - HTTP API for the read action and leaderboards
//! - Unix admin socket for local admin ops (quill-admin CLI)
//! - Background worker delivering leader-change notifications

use crate::admin_socket::AdminSocket;
use crate::api;
use crate::error::{Error, Result};
use crate::identity::IdentityResolver;
use crate::notify::{
    LeaderChangeNotifier, LogNotifier, NotificationDispatcher, WebhookNotifier,
    DEFAULT_QUEUE_CAPACITY,
};
use crate::ranking::{RankingAggregator, RankingCache};
use crate::storage::Storage;
use crate::tracking::ReadTracker;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// Configuration for a site node.
#[derive(Debug, Clone)]
pub struct SiteConfig {
    /// Data directory for storage
    pub data_dir: PathBuf,

    /// HTTP API listen address
    pub api_addr: SocketAddr,

    /// Admin socket path (for quill-admin CLI)
    pub admin_socket: PathBuf,

    /// How long a cached ranking snapshot may be served
    pub ranking_ttl: Duration,

    /// Maximum cached ranking snapshots
    pub ranking_cache_max: usize,

    /// Repeat reads of a post by the same reader inside this window are ignored
    pub read_dedupe_window: Duration,

    /// Chat webhook for leader-change announcements
    pub webhook_url: Option<String>,

    /// Mark issued cookies `Secure`
    pub secure_cookies: bool,
}

impl Default for SiteConfig {
    fn default() -> Self {
        let data_dir = PathBuf::from("./quill-data");
        Self {
            admin_socket: data_dir.join("admin.sock"),
            data_dir,
            api_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            ranking_ttl: Duration::from_secs(60),
            ranking_cache_max: 1024,
            read_dedupe_window: Duration::from_secs(600),
            webhook_url: None,
            secure_cookies: false,
        }
    }
}

impl SiteConfig {
    /// Create config from environment variables with sensible defaults.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create config from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let data_dir = lookup("QUILL_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.data_dir);

        let admin_socket = lookup("QUILL_ADMIN_SOCKET")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("admin.sock"));

        Ok(Self {
            api_addr: parse_var(&lookup, "QUILL_API_ADDR")?.unwrap_or(defaults.api_addr),
            ranking_ttl: parse_var(&lookup, "QUILL_RANKING_TTL_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.ranking_ttl),
            ranking_cache_max: parse_var(&lookup, "QUILL_RANKING_CACHE_MAX")?
                .unwrap_or(defaults.ranking_cache_max),
            read_dedupe_window: parse_var(&lookup, "QUILL_READ_DEDUPE_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.read_dedupe_window),
            webhook_url: lookup("QUILL_WEBHOOK_URL").filter(|url| !url.trim().is_empty()),
            secure_cookies: parse_var(&lookup, "QUILL_SECURE_COOKIES")?
                .unwrap_or(defaults.secure_cookies),
            data_dir,
            admin_socket,
        })
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| Error::Config(format!("invalid {}={:?}: {}", key, raw, e))),
        None => Ok(None),
    }
}

/// Shared state for the site node - one storage instance shared by all components.
pub struct SiteState {
    pub storage: Arc<Storage>,
    pub config: SiteConfig,
    pub resolver: IdentityResolver,
    pub tracker: ReadTracker,
    pub dispatcher: Arc<NotificationDispatcher>,
}

impl SiteState {
    /// Wire up the read pipeline around `storage`. Spawns the notification worker.
    pub fn new(
        storage: Arc<Storage>,
        config: SiteConfig,
        notifier: Arc<dyn LeaderChangeNotifier>,
    ) -> Self {
        let cache = Arc::new(RankingCache::new(config.ranking_ttl, config.ranking_cache_max));
        let aggregator = RankingAggregator::new(storage.clone(), cache);
        let dispatcher = Arc::new(NotificationDispatcher::start(notifier, DEFAULT_QUEUE_CAPACITY));
        let tracker = ReadTracker::new(
            storage.clone(),
            aggregator,
            Arc::clone(&dispatcher),
            config.read_dedupe_window,
        );
        let resolver = IdentityResolver::new(storage.clone(), config.secure_cookies);

        Self {
            storage,
            config,
            resolver,
            tracker,
            dispatcher,
        }
    }

    pub fn aggregator(&self) -> &RankingAggregator {
        self.tracker.aggregator()
    }
}

/// Pick the notifier the config asks for.
pub fn build_notifier(config: &SiteConfig) -> Result<Arc<dyn LeaderChangeNotifier>> {
    match &config.webhook_url {
        Some(url) => {
            let notifier = WebhookNotifier::new(url.clone())
                .map_err(|e| Error::Config(format!("webhook notifier: {}", e)))?;
            Ok(Arc::new(notifier))
        }
        None => Ok(Arc::new(LogNotifier)),
    }
}

/// A site node instance.
pub struct SiteNode {
    state: Arc<SiteState>,
    config: SiteConfig,
}

impl SiteNode {
    /// Create a new site node. Must be called inside a tokio runtime.
    pub async fn new(config: SiteConfig) -> Result<Self> {
        // Ensure data directory exists
        std::fs::create_dir_all(&config.data_dir)?;

        let storage = Arc::new(Storage::open(&config.data_dir)?);
        let notifier = build_notifier(&config)?;
        let state = Arc::new(SiteState::new(storage, config.clone(), notifier));

        Ok(Self { state, config })
    }

    /// Get the shared state (for API handlers).
    pub fn state(&self) -> Arc<SiteState> {
        Arc::clone(&self.state)
    }

    /// Run the node until Ctrl-C, then drain pending notifications.
    pub async fn run(self) -> Result<()> {
        tracing::info!("Quill node starting");
        tracing::info!("  API: http://{}", self.config.api_addr);
        tracing::info!("  Admin: {:?}", self.config.admin_socket);
        tracing::info!("  Data: {:?}", self.config.data_dir);
        tracing::info!(
            "  Rankings: ttl={:?} max_entries={} dedupe={:?}",
            self.config.ranking_ttl,
            self.config.ranking_cache_max,
            self.config.read_dedupe_window
        );

        let admin_socket = AdminSocket::new(
            Arc::clone(&self.state.storage),
            self.config.admin_socket.clone(),
        )
        .with_aggregator(self.state.aggregator().clone());
        tokio::spawn(async move {
            if let Err(e) = admin_socket.run().await {
                tracing::error!("Admin socket error: {}", e);
            }
        });

        let app = api::build_router(self.state());

        let listener = tokio::net::TcpListener::bind(self.config.api_addr).await?;
        tracing::info!("HTTP server listening on {}", self.config.api_addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        tracing::info!("HTTP server stopped, draining notifications");
        self.state.dispatcher.shutdown().await;
        let stats = self.state.dispatcher.stats();
        tracing::info!(
            delivered = stats.delivered,
            failed = stats.failed,
            dropped = stats.dropped,
            "Quill node stopped"
        );

        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults_without_environment() {
        let config = SiteConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("./quill-data"));
        assert_eq!(config.admin_socket, PathBuf::from("./quill-data/admin.sock"));
        assert_eq!(config.api_addr.port(), 8080);
        assert_eq!(config.ranking_ttl, Duration::from_secs(60));
        assert_eq!(config.read_dedupe_window, Duration::from_secs(600));
        assert!(config.webhook_url.is_none());
        assert!(!config.secure_cookies);
    }

    #[test]
    fn reads_overrides() {
        let config = SiteConfig::from_lookup(lookup(&[
            ("QUILL_DATA_DIR", "/var/lib/quill"),
            ("QUILL_API_ADDR", "127.0.0.1:3000"),
            ("QUILL_RANKING_TTL_SECS", "5"),
            ("QUILL_RANKING_CACHE_MAX", "10"),
            ("QUILL_READ_DEDUPE_SECS", "0"),
            ("QUILL_WEBHOOK_URL", "https://chat.example.com/hook"),
            ("QUILL_SECURE_COOKIES", "true"),
        ]))
        .unwrap();

        assert_eq!(config.admin_socket, PathBuf::from("/var/lib/quill/admin.sock"));
        assert_eq!(config.api_addr, "127.0.0.1:3000".parse().unwrap());
        assert_eq!(config.ranking_ttl, Duration::from_secs(5));
        assert_eq!(config.ranking_cache_max, 10);
        assert!(config.read_dedupe_window.is_zero());
        assert_eq!(config.webhook_url.as_deref(), Some("https://chat.example.com/hook"));
        assert!(config.secure_cookies);
    }

    #[test]
    fn bad_values_are_config_errors() {
        let result = SiteConfig::from_lookup(lookup(&[("QUILL_RANKING_TTL_SECS", "soon")]));
        assert!(matches!(result, Err(Error::Config(_))));
        let result = SiteConfig::from_lookup(lookup(&[("QUILL_API_ADDR", "nowhere")]));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn node_opens_storage_in_data_dir() {
        let dir = tempfile::tempdir().unwrap();
        let config = SiteConfig {
            data_dir: dir.path().join("data"),
            ..SiteConfig::default()
        };
        let node = SiteNode::new(config).await.unwrap();
        assert!(dir.path().join("data").exists());
        assert!(node.state().storage.list_users().unwrap().is_empty());
        node.state().dispatcher.shutdown().await;
    }
}
