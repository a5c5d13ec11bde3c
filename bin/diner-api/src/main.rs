//! Diner API - restaurant directory HTTP service
//!
//! Serves the directory from a redb store, optionally fronted by memcached
//! or an in-process cache.

use anyhow::{Context, Result};
use clap::Parser;
use diner_cache::{CacheClient, MemcacheClient, MemcacheConfig, MemoryCache};
use diner_common::{CacheBackend, Config};
use diner_core::Coordinator;
use diner_store::{RedbRestaurantStore, RestaurantStore};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "diner-api")]
#[command(about = "Diner restaurant directory API")]
#[command(version)]
struct Args {
    /// Memcached endpoint (`host[:port]`), or `memory://` for the in-process cache
    #[arg(long, env = "MEMCACHED_CONFIGURATION_ENDPOINT")]
    cache_endpoint: Option<String>,

    /// Store table identifier
    #[arg(long, env = "TABLE_NAME", default_value = "Restaurants")]
    table_name: String,

    /// Deployment region reported on `GET /`
    #[arg(long, env = "AWS_REGION", default_value = "us-east-1")]
    region: String,

    /// Enable caching; only the exact value `true` turns it on
    #[arg(long, env = "USE_CACHE", default_value = "false")]
    use_cache: String,

    /// Listen address
    #[arg(short, long, env = "DINER_LISTEN", default_value = "0.0.0.0:80")]
    listen: SocketAddr,

    /// Directory for the store database
    #[arg(long, env = "DINER_DATA_DIR", default_value = "/var/lib/diner")]
    data_dir: PathBuf,

    /// Pooled memcached connections
    #[arg(long, default_value = "4")]
    cache_pool_size: usize,

    /// Memcached request timeout in milliseconds
    #[arg(long, default_value = "500")]
    cache_timeout_ms: u64,

    /// In-process cache capacity in entries
    #[arg(long, default_value = "10000")]
    memory_cache_entries: usize,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Args {
    fn config(&self) -> Config {
        Config {
            cache_endpoint: self.cache_endpoint.clone(),
            table_name: self.table_name.clone(),
            region: self.region.clone(),
            use_cache: self.use_cache == "true",
            listen: self.listen,
            data_dir: self.data_dir.clone(),
        }
    }

    /// Build the configured cache, plus a typed handle when it is in-process
    fn cache_client(&self, config: &Config) -> (Arc<dyn CacheClient>, Option<Arc<MemoryCache>>) {
        match config.cache_backend() {
            CacheBackend::Memory => {
                let cache = Arc::new(MemoryCache::new(diner_cache::CacheCapacity::Entries(
                    self.memory_cache_entries,
                )));
                (cache.clone(), Some(cache))
            }
            CacheBackend::Memcached(address) => (
                Arc::new(MemcacheClient::new(
                    MemcacheConfig::new(address)
                        .with_pool_size(self.cache_pool_size)
                        .with_timeout(Duration::from_millis(self.cache_timeout_ms)),
                )),
                None,
            ),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| args.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = args.config();
    config.validate()?;

    info!("Starting Diner API");
    info!("Table: {}", config.table_name);
    info!("Data directory: {}", config.data_dir.display());

    let store: Arc<dyn RestaurantStore> = Arc::new(
        RedbRestaurantStore::open(config.database_path(), &config.table_name)
            .context("opening restaurant store")?,
    );

    let (cache, memory_cache) = match config.use_cache.then(|| args.cache_client(&config)) {
        Some((cache, memory_cache)) => {
            info!("Cache backend: {:?} ({})", config.cache_backend(), cache.name());
            (Some(cache), memory_cache)
        }
        None => (None, None),
    };
    let coordinator = Coordinator::from_config(&config, store, cache);

    let listen = config.listen;
    let mut state = diner_api::AppState::new(coordinator, config);
    if let Some(memory_cache) = memory_cache {
        state = state.with_memory_cache(memory_cache);
    }
    let state = Arc::new(state);
    let app = diner_api::router(state);

    info!("Starting HTTP server on {}", listen);
    let listener = TcpListener::bind(listen).await?;

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            info!("Shutting down...");
        })
        .await?;

    info!("Diner API shut down gracefully");

    Ok(())
}
