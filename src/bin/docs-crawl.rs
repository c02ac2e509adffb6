//! Crawl the documentation site into the document store.

use tracing_subscriber::EnvFilter;

use docs_chat::config::Config;
use docs_chat::crawl::Crawler;
use docs_chat::documents::DocumentStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env();
    config.validate()?;
    tracing::info!(
        "Crawling {} (max {} pages)",
        config.crawl.domain,
        config.crawl.max_pages
    );

    let store = DocumentStore::open(&config.raw_dir())?;
    let report = Crawler::new(config.crawl.clone())?.run(&store).await?;

    tracing::info!(
        "Saved {} of {} discovered pages to {} ({} skipped)",
        report.saved,
        report.discovered,
        store.dir().display(),
        report.skipped
    );
    Ok(())
}
