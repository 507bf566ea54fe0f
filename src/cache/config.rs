//! Cache configuration.

use std::time::Duration;

/// Retention class for cached records.
///
/// Every tier expires entries a fixed time after their last access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheTier {
    /// Data read on nearly every event (prefixes, spaced-prefix flags).
    Short,
    /// Data read by most commands.
    Medium,
    /// Data that changes rarely (permissions, premium status).
    Long,
    /// Data that is expensive to rebuild (resolved tracks).
    Critical,
}

impl CacheTier {
    /// Time-to-idle of the tier.
    pub fn idle_timeout(self) -> Duration {
        match self {
            Self::Short => Duration::from_secs(60),
            Self::Medium => Duration::from_secs(5 * 60),
            Self::Long => Duration::from_secs(10 * 60),
            Self::Critical => Duration::from_secs(30 * 60),
        }
    }
}

/// Configuration for a cache instance.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum number of entries in the cache.
    pub max_capacity: u64,

    /// Time-to-live for cache entries.
    /// After this duration, entries are automatically evicted.
    pub ttl: Option<Duration>,

    /// Time-to-idle for cache entries.
    /// Entries are evicted if not accessed within this duration.
    pub tti: Option<Duration>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_capacity: 10_000,
            ttl: Some(Duration::from_secs(300)), // 5 minutes
            tti: None,
        }
    }
}

impl CacheConfig {
    /// Create a new cache config with the given max capacity.
    pub fn with_capacity(max_capacity: u64) -> Self {
        Self {
            max_capacity,
            ..Default::default()
        }
    }

    /// Config for a retention tier: idle-based expiry, no hard TTL.
    pub fn tier(tier: CacheTier) -> Self {
        Self {
            max_capacity: 10_000,
            ttl: None,
            tti: Some(tier.idle_timeout()),
        }
    }

    /// Set max capacity for cache (builder pattern).
    #[must_use]
    pub fn max_capacity(mut self, max_capacity: u64) -> Self {
        self.max_capacity = max_capacity;
        self
    }

    /// Set time-to-live for cache entries.
    #[must_use]
    pub fn ttl(mut self, duration: Duration) -> Self {
        self.ttl = Some(duration);
        self
    }

    /// Set time-to-idle for cache entries.
    #[must_use]
    pub fn tti(mut self, duration: Duration) -> Self {
        self.tti = Some(duration);
        self
    }

    /// Disable TTL (entries never expire based on time).
    #[must_use]
    pub fn no_ttl(mut self) -> Self {
        self.ttl = None;
        self
    }

    /// Create config for short-lived bookkeeping (deleted message ids, menus).
    /// Hard TTL, nothing keeps an entry alive by reading it.
    pub fn ephemeral(ttl: Duration) -> Self {
        Self {
            max_capacity: 50_000,
            ttl: Some(ttl),
            tti: None,
        }
    }
}
