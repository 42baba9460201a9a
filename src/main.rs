use anyhow::{Context, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod models;
mod resolver;
mod services;

use config::AppConfig;
use models::ListingRecord;
use resolver::cache::ResolutionCache;
use resolver::market::MarketProfile;
use resolver::pace::Pacer;
use resolver::Resolver;
use services::tmdb::TmdbClient;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "showtime_enricher=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load .env file if present
    dotenvy::dotenv().ok();

    let config = AppConfig::load();
    config.paths.ensure_dirs()?;
    config.log_config();

    let raw = std::fs::read_to_string(&config.listings_path).with_context(|| {
        format!(
            "Failed to read listings file {}",
            config.listings_path.display()
        )
    })?;
    let mut listings: Vec<ListingRecord> =
        serde_json::from_str(&raw).context("Failed to parse listings JSON")?;
    tracing::info!(
        "Loaded {} listings from {}",
        listings.len(),
        config.listings_path.display()
    );

    let Some(api_key) = config.tmdb_api_key.clone() else {
        // No key: pass listings through unenriched. Downstream consumers
        // treat missing enrichment as a normal state.
        write_listings(&listings, &config)?;
        return Ok(());
    };

    let profile = match &config.market_profile {
        Some(path) => MarketProfile::from_toml_file(path)?,
        None => MarketProfile::default(),
    };

    let mut cache = ResolutionCache::load(&config.paths.cache_file(), config.retry_not_found);
    tracing::info!("Resolution cache: {} entries", cache.len());

    let client = TmdbClient::new(api_key, config.request_timeout());
    let pacer = Pacer::new(config.title_delay());
    let enricher = Resolver::new(&client, &profile, &config.tuning, &pacer);

    let summary = enricher.enrich(&mut listings, &mut cache).await;

    cache.flush().context("Failed to persist resolution cache")?;
    write_listings(&listings, &config)?;

    tracing::info!(
        "Enrichment report: {} unique titles | {} resolved | {} from cache | {} not found | {} skipped | {} transient failures",
        summary.unique_titles,
        summary.resolved,
        summary.from_cache,
        summary.not_found,
        summary.skipped,
        summary.transient_failures
    );
    tracing::info!(
        "{} of {} listings enriched",
        summary.enriched_listings,
        listings.len()
    );

    Ok(())
}

fn write_listings(listings: &[ListingRecord], config: &AppConfig) -> Result<()> {
    if let Some(parent) = config.output_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create output dir {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(listings).context("Failed to serialize listings")?;
    std::fs::write(&config.output_path, json).with_context(|| {
        format!(
            "Failed to write enriched listings to {}",
            config.output_path.display()
        )
    })?;
    tracing::info!(
        "Saved {} listings to {}",
        listings.len(),
        config.output_path.display()
    );
    Ok(())
}
