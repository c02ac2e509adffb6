//! Rebuild the vector and keyword indices from the crawled documents.

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use docs_chat::config::Config;
use docs_chat::documents::DocumentStore;
use docs_chat::indexer::IndexLock;
use docs_chat::state::Services;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env();
    config.validate()?;

    let store = DocumentStore::open(&config.raw_dir())?;
    let documents = store
        .load_all()
        .with_context(|| format!("Failed to load documents from {}", store.dir().display()))?;
    tracing::info!("Loaded {} documents from {}", documents.len(), store.dir().display());

    let _lock = IndexLock::acquire(&config.lock_path())?;

    let services = Services::from_config(&config)?;
    let indexer = services.indexer(&config)?;
    let report = indexer.rebuild(&documents).await?;

    tracing::info!(
        "Indexed {} of {} chunks from {} documents ({} skipped)",
        report.indexed,
        report.chunks,
        report.documents,
        report.skipped
    );
    Ok(())
}
