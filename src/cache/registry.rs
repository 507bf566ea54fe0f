//! Cache registry - Central management for all caches.

use std::any::type_name;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info};

use super::{CacheConfig, LoadingCache, ManagedCache, TypedCache};

/// Central registry for every named cache in the process.
///
/// Asking twice for the same name returns the same cache, which lets
/// independent components share state and gives operators one place to
/// clear caches from.
///
/// ## Example
///
/// ```rust,ignore
/// let registry = CacheRegistry::new();
///
/// let perms: LoadingCache<(u64, u64, String), PermState> =
///     registry.loading("user_permissions", CacheConfig::tier(CacheTier::Long));
///
/// // Administrative clear
/// registry.clear("user_permissions");
/// ```
#[derive(Clone)]
pub struct CacheRegistry {
    caches: Arc<RwLock<HashMap<String, CacheEntry>>>,
}

/// Internal cache entry storing type-erased cache.
struct CacheEntry {
    cache: Arc<dyn ManagedCache>,
    type_name: &'static str,
}

impl CacheRegistry {
    /// Create a new empty cache registry.
    pub fn new() -> Self {
        info!("Cache registry initialized");
        Self {
            caches: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Get or create a plain typed cache.
    ///
    /// # Panics
    /// Panics if a cache with the same name but a different type exists.
    pub fn typed<K, V>(&self, name: &str, config: CacheConfig) -> TypedCache<K, V>
    where
        K: Hash + Eq + Send + Sync + 'static,
        V: Clone + Send + Sync + 'static,
    {
        self.get_or_insert(name, || TypedCache::new(name, config))
    }

    /// Get or create an async loading cache.
    ///
    /// # Panics
    /// Panics if a cache with the same name but a different type exists.
    pub fn loading<K, V>(&self, name: &str, config: CacheConfig) -> LoadingCache<K, V>
    where
        K: Hash + Eq + Send + Sync + 'static,
        V: Clone + Send + Sync + 'static,
    {
        self.get_or_insert(name, || LoadingCache::new(name, config))
    }

    fn get_or_insert<C, F>(&self, name: &str, create: F) -> C
    where
        C: ManagedCache + Clone + 'static,
        F: FnOnce() -> C,
    {
        let mut caches = self.caches.write();

        if let Some(existing) = caches.get(name) {
            return match existing.cache.as_any().downcast_ref::<C>() {
                Some(cache) => cache.clone(),
                None => panic!(
                    "Cache '{}' already exists with different types: expected {}, got {}",
                    name,
                    type_name::<C>(),
                    existing.type_name
                ),
            };
        }

        debug!("Creating cache: {}", name);
        let cache = create();
        caches.insert(
            name.to_string(),
            CacheEntry {
                cache: Arc::new(cache.clone()),
                type_name: type_name::<C>(),
            },
        );

        cache
    }

    /// Check if a cache with the given name exists.
    pub fn contains(&self, name: &str) -> bool {
        self.caches.read().contains_key(name)
    }

    /// Drop every entry of one cache. Returns `false` for unknown names.
    pub fn clear(&self, name: &str) -> bool {
        match self.caches.read().get(name) {
            Some(entry) => {
                entry.cache.clear();
                info!("Cleared cache: {}", name);
                true
            }
            None => false,
        }
    }

    /// Drop every entry of every cache.
    pub fn clear_all(&self) {
        let caches = self.caches.read();
        for entry in caches.values() {
            entry.cache.clear();
        }
        info!("Cleared {} caches", caches.len());
    }

    /// Approximate entry count per cache, sorted by name.
    pub fn stats(&self) -> Vec<(String, u64)> {
        let mut stats: Vec<_> = self
            .caches
            .read()
            .iter()
            .map(|(name, entry)| (name.clone(), entry.cache.entry_count()))
            .collect();
        stats.sort();
        stats
    }

    /// Get the number of registered caches.
    pub fn len(&self) -> usize {
        self.caches.read().len()
    }

    /// Check if the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.caches.read().is_empty()
    }
}

impl Default for CacheRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CacheRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let caches = self.caches.read();
        f.debug_struct("CacheRegistry")
            .field("cache_count", &caches.len())
            .field("cache_names", &caches.keys().collect::<Vec<_>>())
            .finish()
    }
}
