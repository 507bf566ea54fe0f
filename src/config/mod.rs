//! Configuration module for Aria.
//!
//! Loads configuration from environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

/// Connection settings for one Lavalink-style search node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeConfig {
    pub url: String,
    pub password: Option<String>,
}

/// Database settings.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    /// Attempts for transient failures, including the first one.
    pub retry_attempts: u32,
    /// Backoff before the second attempt; doubled for every further attempt.
    pub retry_base_delay: Duration,
    /// How long a statement waits on a locked database before failing busy.
    pub busy_timeout: Duration,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://aria.db".to_string(),
            max_connections: 4,
            retry_attempts: 3,
            retry_base_delay: Duration::from_millis(100),
            busy_timeout: Duration::from_secs(5),
        }
    }
}

/// Music pipeline settings.
#[derive(Debug, Clone)]
pub struct MusicConfig {
    pub primary_node: Option<NodeConfig>,
    pub fallback_node: Option<NodeConfig>,
    pub search_timeout: Duration,
    pub queue_limit: usize,
    pub premium_queue_limit: usize,
    /// Maximum tracks accepted from one playlist-style request.
    pub playlist_limit: usize,
    /// Allowed duration difference when matching external catalog tracks.
    pub match_tolerance_ms: u64,
    /// How many search results are considered when matching.
    pub match_candidates: usize,
    /// Entries offered by a pick-one search menu.
    pub menu_size: usize,
    pub search_menu_ttl: Duration,
}

impl Default for MusicConfig {
    fn default() -> Self {
        Self {
            primary_node: None,
            fallback_node: None,
            search_timeout: Duration::from_millis(5_000),
            queue_limit: 150,
            premium_queue_limit: 1_000,
            playlist_limit: 150,
            match_tolerance_ms: 10_000,
            match_candidates: 5,
            menu_size: 5,
            search_menu_ttl: Duration::from_secs(120),
        }
    }
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub database: DatabaseConfig,
    pub music: MusicConfig,

    /// Parallelism of the shared worker pool.
    pub worker_threads: usize,

    /// How long deleted message ids are remembered.
    pub deletion_memory: Duration,

    /// Period of the voice session sweeper.
    pub sweep_interval: Duration,

    /// Owner user IDs (comma-separated)
    pub owner_ids: Vec<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            music: MusicConfig::default(),
            worker_threads: 16,
            deletion_memory: Duration::from_secs(300),
            sweep_interval: Duration::from_secs(60),
            owner_ids: Vec::new(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Reads `.env` first when present.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = Self::default();

        let database = DatabaseConfig {
            url: get("DATABASE_URL").unwrap_or(defaults.database.url),
            max_connections: parse_or(&get, "DB_MAX_CONNECTIONS", defaults.database.max_connections)?,
            retry_attempts: parse_or(&get, "DB_RETRY_ATTEMPTS", defaults.database.retry_attempts)?
                .max(1),
            retry_base_delay: Duration::from_millis(parse_or(&get, "DB_RETRY_BASE_MS", 100u64)?),
            busy_timeout: Duration::from_millis(parse_or(&get, "DB_BUSY_TIMEOUT_MS", 5_000u64)?),
        };

        let node = |url_key: &str, password_key: &str| {
            get(url_key).map(|url| NodeConfig {
                url: url.trim_end_matches('/').to_string(),
                password: get(password_key),
            })
        };

        let queue_limit = parse_or(&get, "QUEUE_LIMIT", defaults.music.queue_limit)?;
        let music = MusicConfig {
            primary_node: node("LAVALINK_URL", "LAVALINK_PASSWORD"),
            fallback_node: node("FALLBACK_LAVALINK_URL", "FALLBACK_LAVALINK_PASSWORD"),
            search_timeout: Duration::from_millis(parse_or(&get, "SEARCH_TIMEOUT_MS", 5_000u64)?),
            queue_limit,
            premium_queue_limit: parse_or(
                &get,
                "PREMIUM_QUEUE_LIMIT",
                defaults.music.premium_queue_limit,
            )?,
            playlist_limit: parse_or(&get, "PLAYLIST_LIMIT", queue_limit)?,
            match_tolerance_ms: parse_or(
                &get,
                "MATCH_TOLERANCE_MS",
                defaults.music.match_tolerance_ms,
            )?,
            match_candidates: parse_or(&get, "MATCH_CANDIDATES", defaults.music.match_candidates)?,
            menu_size: parse_or(&get, "SEARCH_MENU_SIZE", defaults.music.menu_size)?.max(1),
            search_menu_ttl: Duration::from_secs(parse_or(&get, "SEARCH_MENU_TTL_SECS", 120u64)?),
        };

        // Parse owner IDs
        let owner_ids = get("OWNER_IDS")
            .unwrap_or_default()
            .split(',')
            .filter_map(|s| s.trim().parse::<u64>().ok())
            .collect();

        Ok(Self {
            database,
            music,
            worker_threads: parse_or(&get, "WORKER_THREADS", defaults.worker_threads)?.max(1),
            deletion_memory: Duration::from_secs(parse_or(&get, "DELETION_MEMORY_SECS", 300u64)?),
            sweep_interval: Duration::from_secs(parse_or(&get, "SWEEP_INTERVAL_SECS", 60u64)?.max(1)),
            owner_ids,
        })
    }
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw
            .parse::<T>()
            .with_context(|| format!("invalid value for {key}: {raw:?}")),
        None => Ok(default),
    }
}
