//! Cache module - Modular caching system using Moka.
//!
//! ## Architecture
//!
//! - `CacheRegistry` - Central registry holding all named caches
//! - `TypedCache` - plain in-memory cache (menus, deletion bookkeeping)
//! - `LoadingCache` - async cache with single-flight loading, used by the
//!   database wrappers
//! - `CacheConfig` / `CacheTier` - capacity and retention classes
//!
//! ## Usage
//!
//! ```rust,ignore
//! let cache = registry.loading::<u64, bool>("premium_guilds", CacheConfig::tier(CacheTier::Long));
//! let premium = cache.get_or_load(guild_id, dao.contains(guild_id)).await?;
//! ```

use std::any::Any;

mod config;
mod loading;
mod registry;
mod typed;

pub use config::{CacheConfig, CacheTier};
pub use loading::LoadingCache;
pub use registry::CacheRegistry;
pub use typed::TypedCache;

/// Type-erased view of a cache, as stored in the registry.
pub trait ManagedCache: Send + Sync {
    /// Remove every entry.
    fn clear(&self);

    /// Approximate number of live entries.
    fn entry_count(&self) -> u64;

    fn as_any(&self) -> &dyn Any;
}
