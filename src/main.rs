//! Aria service entry point.
//!
//! Wires the data access layer, the task pool and the music pipeline
//! together and keeps them running until Ctrl-C.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use aria::cache::CacheRegistry;
use aria::config::{Config, NodeConfig};
use aria::database::{DaoManager, DriverManager};
use aria::events::DeletionRegistry;
use aria::music::{
    AudioLoader, DisabledBackend, LavalinkBackend, MusicPlayerManager, SearchBackend, SessionSweeper,
    VoiceConnections,
};
use aria::tasks::{TaskManager, spawn_periodic};

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

/// Song cache rows untouched for this long are pruned.
const SONG_CACHE_RETENTION: Duration = Duration::from_secs(30 * 24 * 3600);

/// Voice view used while no gateway is attached: no guild has a connection.
struct DetachedVoice;

impl VoiceConnections for DetachedVoice {
    fn guild_exists(&self, _guild_id: u64) -> bool {
        true
    }

    fn connected_channel(&self, _guild_id: u64) -> Option<u64> {
        None
    }
}

fn backend(name: &'static str, node: Option<&NodeConfig>, timeout: Duration) -> Arc<dyn SearchBackend> {
    let Some(node) = node else {
        info!("No {} node configured", name);
        return Arc::new(DisabledBackend);
    };
    match LavalinkBackend::new(name, node, timeout) {
        Ok(backend) => {
            info!(url = %node.url, "Using {} node", name);
            Arc::new(backend)
        }
        Err(err) => {
            warn!(error = %err, "Invalid {} node, disabling it", name);
            Arc::new(DisabledBackend)
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file first (before anything else)
    dotenvy::dotenv().ok();

    // If RUST_LOG is not set, default to "info" level for our crate
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("aria=info,sqlx=warn"));

    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Starting Aria...");

    let config = Config::from_env().context("invalid configuration")?;
    info!("Configuration loaded successfully");

    if config.owner_ids.is_empty() {
        info!("No owner IDs configured (OWNER_IDS is empty)");
    } else {
        info!("Bot owners: {:?}", config.owner_ids);
    }

    let driver = DriverManager::connect(&config.database)
        .await
        .context("failed to open database")?;
    let driver = Arc::new(driver);
    driver.health_check().await.context("database health check failed")?;

    let caches = CacheRegistry::new();
    let tasks = TaskManager::new(config.worker_threads);
    let daos = DaoManager::init(Arc::clone(&driver), tasks.clone(), &caches)
        .await
        .context("failed to register tables")?;

    let players = Arc::new(MusicPlayerManager::new(config.music.search_menu_ttl));
    let primary = backend("primary", config.music.primary_node.as_ref(), config.music.search_timeout);
    let fallback = backend("fallback", config.music.fallback_node.as_ref(), config.music.search_timeout);
    let _loader = AudioLoader::new(
        Arc::clone(&players),
        daos.song_cache.clone(),
        daos.premium_guilds.clone(),
        primary,
        fallback,
        config.music.clone(),
    );
    let _deletions = DeletionRegistry::new(config.deletion_memory);

    let sweeper = Arc::new(SessionSweeper::new(Arc::clone(&players), Arc::new(DetachedVoice)));
    let services = vec![
        sweeper.start(config.sweep_interval),
        spawn_periodic("song_cache_pruner", Duration::from_secs(24 * 3600), {
            let song_cache = daos.song_cache.clone();
            move || {
                let song_cache = song_cache.clone();
                async move {
                    if let Err(err) = song_cache.prune(SONG_CACHE_RETENTION).await {
                        warn!(error = %err, "Song cache prune failed");
                    }
                }
            }
        }),
    ];

    info!(workers = tasks.workers(), "Aria is running, press Ctrl-C to stop");
    tokio::signal::ctrl_c().await.context("failed to listen for Ctrl-C")?;
    info!("Shutting down...");

    for service in services {
        service.stop().await;
    }
    tasks.shutdown();
    caches.clear_all();
    driver.close().await;

    info!("Bye");
    Ok(())
}
