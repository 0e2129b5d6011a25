//! Atlas — cloud inventory to catalog synchronization.
//!
//! Entry point for one sync run: initialize logging, load settings from the
//! environment, wire the HTTP collaborators into the engine, and drive the
//! orchestrator once. The process exits non-zero on fatal configuration or
//! discovery errors; individual delivery failures are logged and dropped by
//! the engine and do not affect the exit code.

use std::sync::Arc;

use anyhow::Context;
use atlas_core::{GraphQueryExecutor, InventoryDiscovery, SyncOrchestrator};
use atlas_infra::{config, CatalogWebhookClient, ResourceGraphClient};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging first so settings loading is visible.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    match dotenvy::dotenv() {
        Ok(path) => info!(path = %path.display(), "Loaded .env"),
        Err(e) => debug!(error = %e, "No .env file loaded"),
    }

    let settings = config::load_from_env().context("failed to load settings")?;

    let graph = Arc::new(
        ResourceGraphClient::new(&settings.graph).context("failed to build graph client")?,
    );
    let catalog = Arc::new(
        CatalogWebhookClient::new(&settings.catalog).context("failed to build catalog client")?,
    );

    let discovery: Arc<dyn InventoryDiscovery> = graph.clone();
    let executor: Arc<dyn GraphQueryExecutor> = graph;
    let orchestrator = SyncOrchestrator::new(discovery, executor, catalog, settings)
        .context("failed to build orchestrator")?;

    orchestrator.run().await.context("sync run failed")?;

    Ok(())
}
