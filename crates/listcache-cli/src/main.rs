//! listcache - command line front end for the listing caches.
//!
//! Wires configuration, the local cache, and the offline controller together
//! and exposes their operations as subcommands.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use url::Url;

use listcache_core::cache::{open_storage, CacheManager};
use listcache_core::offline::{
    CacheStorage, DirCacheStorage, HttpFetcher, OfflineController, Request,
};
use listcache_core::utils::format_bytes;
use listcache_core::{CachedListings, Config, ListingFilters, ListingsClient};

#[derive(Parser)]
#[command(name = "listcache", version, about = "Local and offline caches for the listings site")]
struct Cli {
    /// Config file to use instead of the default location
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Precache the manifest for the configured version and take control,
    /// deleting buckets from older versions
    Deploy,
    /// List offline buckets
    Buckets,
    /// Fetch a URL through the offline cache
    Fetch {
        url: String,
        /// Send as a page navigation (Accept: text/html)
        #[arg(long)]
        html: bool,
        /// Send as an image request
        #[arg(long, conflicts_with = "html")]
        image: bool,
    },
    /// Read listings through the local cache
    Listings {
        /// Single listing by id
        #[arg(long)]
        id: Option<String>,
        /// Search filters as JSON, e.g. '{"operation":"venta","bedrooms":2}'
        #[arg(long, conflicts_with = "id")]
        search: Option<String>,
    },
    /// Show local cache statistics
    Stats,
    /// Remove every entry in the local cache namespace
    Clear,
}

/// Initialize the tracing subscriber for logging
fn init_tracing() -> tracing_appender::non_blocking::WorkerGuard {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let (writer, guard) = tracing_appender::non_blocking(io::stderr());

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(writer))
        .with(filter)
        .init();

    guard
}

fn load_config(path: Option<PathBuf>) -> Result<Config> {
    match path {
        Some(path) => {
            let mut config = Config::load_from(&path)?;
            config.apply_env();
            Ok(config)
        }
        None => Config::load(),
    }
}

fn local_cache(config: &Config) -> Result<Arc<CacheManager>> {
    let path = config.storage_path()?;
    let storage = open_storage(Some(&path), config.local.quota_bytes);
    Ok(Arc::new(CacheManager::new(config.local.namespace.clone(), storage)))
}

fn offline_controller(config: &Config) -> Result<OfflineController> {
    let storage = Arc::new(DirCacheStorage::new(config.buckets_dir()?));
    let fetcher = Arc::new(HttpFetcher::new()?);
    OfflineController::new(config.offline.clone(), storage, fetcher)
        .with_context(|| format!("Invalid origin: {}", config.offline.origin))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let _guard = init_tracing();
    let cli = Cli::parse();
    let config = load_config(cli.config)?;

    match cli.command {
        Command::Deploy => deploy(&config).await,
        Command::Buckets => buckets(&config).await,
        Command::Fetch { url, html, image } => fetch(&config, &url, html, image).await,
        Command::Listings { id, search } => listings(&config, id, search).await,
        Command::Stats => stats(&config),
        Command::Clear => clear(&config),
    }
}

async fn deploy(config: &Config) -> Result<()> {
    let controller = offline_controller(config)?;
    let count = controller.install().await?;
    let deleted = controller.activate().await?;

    println!("Installed {} ({} assets)", controller.bucket_name(), count);
    for name in deleted {
        println!("Deleted old cache {}", name);
    }
    Ok(())
}

async fn buckets(config: &Config) -> Result<()> {
    let storage = DirCacheStorage::new(config.buckets_dir()?);
    let current = config.offline.bucket_name();
    for name in storage.keys().await? {
        let marker = if name == current { " (current)" } else { "" };
        println!("{}{}", name, marker);
    }
    Ok(())
}

async fn fetch(config: &Config, url: &str, html: bool, image: bool) -> Result<()> {
    let url = Url::parse(url)
        .or_else(|_| config.offline.origin_url()?.join(url))
        .with_context(|| format!("Invalid URL: {}", url))?;

    let request = if html {
        Request::navigate(url)
    } else if image {
        Request::image(url)
    } else {
        Request::get(url)
    };

    let controller = offline_controller(config)?;
    if !controller.resume().await? {
        info!("Offline cache not deployed yet, installing");
        controller.install().await?;
        controller.activate().await?;
    }

    let route = controller.router().route(&request);
    let response = controller.fetch(&request).await?;
    controller.drain().await;

    println!("{} {}", response.status, request.url);
    println!("route: {}", route.as_str());
    println!("size: {}", format_bytes(response.body.len()));
    if response.is_offline_fallback() {
        println!("served offline fallback");
    }
    Ok(())
}

async fn listings(config: &Config, id: Option<String>, search: Option<String>) -> Result<()> {
    let base_url = config
        .backend
        .url
        .as_deref()
        .context("No backend URL configured (set LISTCACHE_BACKEND_URL)")?;
    let key = config.backend.anon_key.clone().unwrap_or_default();

    let client = ListingsClient::new(base_url, key)?;
    let listings = CachedListings::new(client, local_cache(config)?).with_ttl(config.local.listings_ttl());

    let output = match (id, search) {
        (Some(id), _) => listings.by_id(&id).await?,
        (None, Some(search)) => {
            let filters: ListingFilters =
                serde_json::from_str(&search).context("Failed to parse search filters")?;
            serde_json::Value::Array(listings.search(&filters).await?)
        }
        (None, None) => serde_json::Value::Array(listings.all().await?),
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn stats(config: &Config) -> Result<()> {
    let cache = local_cache(config)?;
    let stats = cache.stats();
    println!("namespace: {}", stats.namespace);
    println!("storage: {}", cache.storage_kind().as_str());
    println!("items: {}", stats.item_count);
    println!("size: {}", format_bytes(stats.total_size_bytes));
    Ok(())
}

fn clear(config: &Config) -> Result<()> {
    let cache = local_cache(config)?;
    if cache.clear() {
        println!("Cleared namespace {}", cache.namespace());
        Ok(())
    } else {
        anyhow::bail!("Failed to clear namespace {}", cache.namespace())
    }
}
