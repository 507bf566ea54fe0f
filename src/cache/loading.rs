//! Async loading cache used by the wrappers.
//!
//! Concurrent misses on the same key share one load. A failed load is not
//! stored, so the next call retries it. A load that overlaps a write to its
//! key is not kept: the write is always the value readers end up with.

use std::any::Any;
use std::future::Future;
use std::hash::{BuildHasher, Hash, RandomState};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use moka::future::Cache;
use tracing::debug;

use super::{CacheConfig, ManagedCache};
use crate::error::{StorageError, StorageResult};

const STRIPES: usize = 64;

/// Write counters, striped by key hash. A stripe moves whenever a key in it
/// is written or invalidated; `epoch` moves on `invalidate_all`.
struct Generations {
    hasher: RandomState,
    stripes: Box<[AtomicU64]>,
    epoch: AtomicU64,
}

impl Generations {
    fn new() -> Self {
        Self {
            hasher: RandomState::new(),
            stripes: (0..STRIPES).map(|_| AtomicU64::new(0)).collect(),
            epoch: AtomicU64::new(0),
        }
    }

    fn stripe_of<K: Hash>(&self, key: &K) -> usize {
        (self.hasher.hash_one(key) % STRIPES as u64) as usize
    }

    fn stamp(&self, stripe: usize) -> u64 {
        self.stripes[stripe]
            .load(Ordering::Acquire)
            .wrapping_add(self.epoch.load(Ordering::Acquire))
    }

    fn bump(&self, stripe: usize) {
        self.stripes[stripe].fetch_add(1, Ordering::AcqRel);
    }

    fn bump_all(&self) {
        self.epoch.fetch_add(1, Ordering::AcqRel);
    }
}

/// Async cache with single-flight loading on top of Moka's future cache.
pub struct LoadingCache<K, V>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    inner: Cache<K, V>,
    name: Arc<str>,
    loads: Arc<AtomicU64>,
    generations: Arc<Generations>,
}

impl<K, V> Clone for LoadingCache<K, V>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            name: Arc::clone(&self.name),
            loads: Arc::clone(&self.loads),
            generations: Arc::clone(&self.generations),
        }
    }
}

impl<K, V> LoadingCache<K, V>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new(name: impl Into<Arc<str>>, config: CacheConfig) -> Self {
        let mut builder = Cache::builder().max_capacity(config.max_capacity);

        if let Some(ttl) = config.ttl {
            builder = builder.time_to_live(ttl);
        }

        if let Some(tti) = config.tti {
            builder = builder.time_to_idle(tti);
        }

        Self {
            inner: builder.build(),
            name: name.into(),
            loads: Arc::new(AtomicU64::new(0)),
            generations: Arc::new(Generations::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Return the cached value, or run `load` exactly once for all
    /// concurrent callers of this key and cache its success.
    ///
    /// If the key is written while `load` runs, the loaded value is still
    /// returned to the callers but dropped from the cache.
    pub async fn get_or_load<F>(&self, key: K, load: F) -> StorageResult<V>
    where
        K: Clone,
        F: Future<Output = StorageResult<V>> + Send,
    {
        let stripe = self.generations.stripe_of(&key);
        let generations = &self.generations;
        let loads = &self.loads;
        let mut started = None;

        let counted = async {
            started = Some(generations.stamp(stripe));
            loads.fetch_add(1, Ordering::Relaxed);
            load.await
        };

        let value = self
            .inner
            .try_get_with(key.clone(), counted)
            .await
            .map_err(|err: Arc<StorageError>| {
                debug!(cache = %self.name, error = %err, "cache load failed, entry not stored");
                (*err).clone()
            })?;

        if started.is_some_and(|stamp| stamp != self.generations.stamp(stripe)) {
            debug!(cache = %self.name, "key written during load, dropping loaded entry");
            self.inner.invalidate(&key).await;
        }

        Ok(value)
    }

    /// Cached value without loading.
    pub async fn get(&self, key: &K) -> Option<V> {
        self.inner.get(key).await
    }

    pub async fn insert(&self, key: K, value: V) {
        self.generations.bump(self.generations.stripe_of(&key));
        self.inner.insert(key, value).await;
    }

    pub async fn invalidate(&self, key: &K) {
        self.generations.bump(self.generations.stripe_of(key));
        self.inner.invalidate(key).await;
    }

    pub fn invalidate_all(&self) {
        self.generations.bump_all();
        self.inner.invalidate_all();
    }

    /// Number of loads started since creation.
    pub fn load_count(&self) -> u64 {
        self.loads.load(Ordering::Relaxed)
    }
}

impl<K, V> ManagedCache for LoadingCache<K, V>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn clear(&self) {
        self.invalidate_all();
    }

    fn entry_count(&self) -> u64 {
        self.inner.entry_count()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl<K, V> std::fmt::Debug for LoadingCache<K, V>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadingCache")
            .field("name", &self.name)
            .field("loads", &self.load_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn cache() -> LoadingCache<u64, String> {
        LoadingCache::new("test", CacheConfig::default())
    }

    #[tokio::test]
    async fn test_concurrent_misses_share_one_load() {
        let cache = cache();

        let calls = (0..8).map(|_| {
            let cache = cache.clone();
            tokio::spawn(async move {
                cache
                    .get_or_load(1, async {
                        tokio::time::sleep(Duration::from_millis(30)).await;
                        Ok("value".to_string())
                    })
                    .await
            })
        });

        for result in futures::future::join_all(calls).await {
            assert_eq!(result.unwrap().unwrap(), "value");
        }
        assert_eq!(cache.load_count(), 1);
    }

    #[tokio::test]
    async fn test_failed_load_is_retried() {
        let cache = cache();

        let err = cache
            .get_or_load(5, async { Err(StorageError::Query("boom".into())) })
            .await
            .unwrap_err();
        assert_eq!(err, StorageError::Query("boom".into()));
        assert!(cache.get(&5).await.is_none());

        let value = cache
            .get_or_load(5, async { Ok("second".to_string()) })
            .await
            .unwrap();
        assert_eq!(value, "second");
        assert_eq!(cache.load_count(), 2);
    }

    #[tokio::test]
    async fn test_write_during_load_is_not_overwritten() {
        let cache = cache();
        let (release, gate) = tokio::sync::oneshot::channel::<()>();

        let reader = {
            let cache = cache.clone();
            tokio::spawn(async move {
                cache
                    .get_or_load(1, async move {
                        let _ = gate.await;
                        Ok("old".to_string())
                    })
                    .await
            })
        };
        while cache.load_count() == 0 {
            tokio::task::yield_now().await;
        }

        cache.insert(1, "new".to_string()).await;
        release.send(()).unwrap();
        assert!(reader.await.unwrap().is_ok());

        assert_ne!(cache.get(&1).await.as_deref(), Some("old"));
        let value = cache
            .get_or_load(1, async { Ok("stored".to_string()) })
            .await
            .unwrap();
        assert_ne!(value, "old");
    }

    #[tokio::test]
    async fn test_quiet_load_stays_cached() {
        let cache = cache();
        cache.insert(2, "other".to_string()).await;

        cache.get_or_load(1, async { Ok("one".to_string()) }).await.unwrap();
        assert_eq!(cache.get(&1).await.as_deref(), Some("one"));
    }
}
