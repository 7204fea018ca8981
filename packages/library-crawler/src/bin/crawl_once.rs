//! Run a single crawl against the Postgres catalog.
//!
//! Wires the real provider clients, the file credential store and
//! filesystem byte storage, then logs every outcome as it is produced.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use library_crawler::stores::{FsByteStorage, PostgresCatalog};
use library_crawler::strategies::HttpHtmlClient;
use library_crawler::{
    CloudStorageStrategy, CrawlOutcome, CrawlerId, CrawlerSettings, FileCredentialStore,
    FileFilterConfig, GenericApiStrategy, LibraryId, Orchestrator, RemoteShareStrategy,
    SourceDescriptor, SourceKind, StrategyRegistry, WebStrategy,
};
use smb_crawler_client::SmbCrawlerClient;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "crawl-once")]
#[command(about = "Crawl one source into a library and print the outcomes")]
struct Cli {
    #[arg(long)]
    crawler_id: Uuid,

    #[arg(long)]
    library_id: Uuid,

    /// web, smb, box or api
    #[arg(long)]
    kind: SourceKind,

    #[arg(long, default_value = "")]
    uri: String,

    #[arg(long, default_value_t = library_crawler::model::DEFAULT_MAX_DEPTH)]
    max_depth: u32,

    #[arg(long, default_value_t = library_crawler::model::DEFAULT_MAX_PAGES)]
    max_pages: u32,

    /// File filter as JSON, e.g. '{"includePatterns":["\\.pdf$"]}'
    #[arg(long)]
    filter: Option<String>,

    /// Provider configuration as JSON (generic API endpoint settings)
    #[arg(long)]
    provider_config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,library_crawler=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_line_number(true),
        )
        .init();

    let cli = Cli::parse();
    let settings = CrawlerSettings::from_env().context("Invalid crawler configuration")?;

    let database_url = settings
        .database_url
        .clone()
        .context("DATABASE_URL must be set")?;
    let catalog = PostgresCatalog::connect(&database_url)
        .await
        .context("Failed to connect to database")?;

    let registry = StrategyRegistry::new()
        .with(WebStrategy::new(
            HttpHtmlClient::new().context("Failed to build HTTP client")?,
        ))
        .with(RemoteShareStrategy::new(SmbCrawlerClient::new(
            settings.smb_crawler_url.clone(),
        )))
        .with(CloudStorageStrategy::for_box())
        .with(GenericApiStrategy::default());

    let orchestrator = Orchestrator::new(
        Arc::new(catalog),
        Arc::new(FsByteStorage::new(settings.storage_dir.clone())),
        Arc::new(FileCredentialStore::new(settings.credentials_dir.clone())),
        registry,
    )
    .with_settings(&settings);

    let mut descriptor = SourceDescriptor::new(
        CrawlerId::from_uuid(cli.crawler_id),
        LibraryId::from_uuid(cli.library_id),
        cli.kind,
        cli.uri,
    )
    .with_max_depth(cli.max_depth)
    .with_max_pages(cli.max_pages);
    if let Some(filter) = cli.filter {
        let filter: FileFilterConfig =
            serde_json::from_str(&filter).context("--filter is not a valid filter config")?;
        descriptor = descriptor.with_filter(filter);
    }
    if let Some(config) = cli.provider_config {
        let config: serde_json::Value =
            serde_json::from_str(&config).context("--provider-config is not valid JSON")?;
        descriptor = descriptor.with_provider_config(config);
    }

    let report = orchestrator
        .run_with(&descriptor, |outcome| match outcome {
            CrawlOutcome::Error { message, hints, .. } => {
                tracing::warn!(hints = %hints, "{}", message)
            }
            other => tracing::info!(
                kind = other.kind(),
                origin_uri = other.origin_uri().unwrap_or_default(),
                "outcome"
            ),
        })
        .await
        .context("Crawl failed")?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
