//! Quill site binary
//!
//! Records post reads and keeps the team leaderboards.

use quill_site::{SiteConfig, SiteNode};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "quill_site=info,quill=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Quill site");

    let config = SiteConfig::from_env()?;

    // Create and run node
    let node = SiteNode::new(config).await?;
    node.run().await?;

    Ok(())
}
