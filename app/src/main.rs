//! Dealscout command-line shell.
//!
//! Thin wrapper that loads configuration, wires the crates together and
//! prints results as JSON. Core logic lives in the `crates/` directory.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dealscout_browser::{ChromiumDriver, PageDriver};
use dealscout_core::{AppConfig, ProxyEndpoint, RecordId, SiteId};
use dealscout_proxy::{PoolObserver, ProxyMetrics, ProxyPool};
use dealscout_scanner::{DiscoveredRecord, DiscoveryPipeline, DiscoverySink, MarketplaceEnricher};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(name = "dealscout")]
#[command(about = "Deal scraping orchestrator")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load the proxy list, probe every proxy against every site and print metrics
    Probe {
        /// Proxy list to load instead of the configured one
        #[arg(long)]
        source: Option<PathBuf>,
    },

    /// Print metrics for the last saved proxy snapshot
    Metrics,

    /// Run one item through the enrichment stage and print the merged record
    Enrich {
        /// Brand name
        #[arg(long)]
        brand: String,

        /// Product name
        #[arg(long)]
        name: String,

        /// Record id (random if omitted)
        #[arg(long)]
        id: Option<String>,

        /// Site the item was found on
        #[arg(long, default_value = "home_depot")]
        site: String,
    },
}

/// Logs pool events.
struct LogObserver;

impl PoolObserver for LogObserver {
    fn on_metrics(&self, metrics: &ProxyMetrics) {
        info!("Proxy pool has {} proxies", metrics.total_proxies);
    }

    fn on_alert(&self, proxy: &ProxyEndpoint, site: &SiteId) {
        tracing::warn!("Proxy {} alerted for {}", proxy, site);
    }
}

/// Initialize tracing subscriber for logging
fn init_tracing() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,dealscout=debug"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn build_pool(config: &AppConfig, driver: Arc<dyn PageDriver>) -> Arc<ProxyPool> {
    Arc::new(ProxyPool::from_config(config, driver).with_observer(Arc::new(LogObserver)))
}

async fn probe(config: &AppConfig, source: Option<PathBuf>) -> Result<()> {
    let driver: Arc<dyn PageDriver> = Arc::new(ChromiumDriver::new(config.browser.clone()));
    let pool = build_pool(config, driver);

    let source = source.unwrap_or_else(|| config.proxies.source_path.clone());
    info!("Refreshing proxies from {}", source.display());
    let metrics = pool
        .refresh_from_file(&source)
        .await
        .with_context(|| format!("failed to read proxy source {}", source.display()))?;

    println!("{}", serde_json::to_string_pretty(&metrics)?);
    Ok(())
}

async fn metrics(config: &AppConfig) -> Result<()> {
    let driver: Arc<dyn PageDriver> = Arc::new(ChromiumDriver::new(config.browser.clone()));
    let pool = build_pool(config, driver);

    if pool.restore().await == 0 {
        info!("No saved proxy snapshot");
    }
    println!("{}", serde_json::to_string_pretty(&pool.metrics())?);
    Ok(())
}

async fn enrich(
    config: &AppConfig,
    brand: String,
    name: String,
    id: Option<String>,
    site: String,
) -> Result<()> {
    config.enrichment.validate()?;

    let driver: Arc<dyn PageDriver> = Arc::new(ChromiumDriver::new(config.browser.clone()));
    let pool = build_pool(config, driver.clone());
    if config.proxies.restore_snapshot {
        pool.restore().await;
    }

    let enricher = MarketplaceEnricher::from_config(config, pool, driver)?;
    let pipeline = DiscoveryPipeline::new(Arc::new(enricher))?;

    let id = id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let record = DiscoveredRecord::new(RecordId::new(id)?, SiteId::new(site)?, brand, name);
    pipeline.on_discovered(record);
    pipeline.wait_idle().await;

    for record in pipeline.active_records() {
        println!("{}", serde_json::to_string_pretty(&record)?);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env file is fine
    let _ = dotenvy::dotenv();
    init_tracing();

    let cli = Cli::parse();
    info!("Starting Dealscout v{}", env!("CARGO_PKG_VERSION"));

    let config = AppConfig::load_with_env().context("failed to load configuration")?;

    match cli.command {
        Commands::Probe { source } => probe(&config, source).await,
        Commands::Metrics => metrics(&config).await,
        Commands::Enrich {
            brand,
            name,
            id,
            site,
        } => enrich(&config, brand, name, id, site).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_enrich() {
        let cli = Cli::try_parse_from([
            "dealscout", "enrich", "--brand", "DeWalt", "--name", "20V Drill",
        ])
        .unwrap();
        match cli.command {
            Commands::Enrich { brand, site, id, .. } => {
                assert_eq!(brand, "DeWalt");
                assert_eq!(site, "home_depot");
                assert!(id.is_none());
            }
            _ => panic!("expected enrich"),
        }
    }
}
