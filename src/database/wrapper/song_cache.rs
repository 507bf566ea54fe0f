use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::debug;

use super::join;
use crate::cache::{CacheConfig, CacheRegistry, LoadingCache};
use crate::database::dao::SongCacheDao;
use crate::error::StorageResult;
use crate::music::TrackDescriptor;
use crate::tasks::TaskManager;

/// Previously resolved tracks, keyed by the exact raw query.
#[derive(Clone)]
pub struct SongCacheWrapper {
    dao: Arc<SongCacheDao>,
    tasks: TaskManager,
    cache: LoadingCache<String, Option<TrackDescriptor>>,
}

impl SongCacheWrapper {
    pub fn new(dao: Arc<SongCacheDao>, tasks: TaskManager, caches: &CacheRegistry, config: CacheConfig) -> Self {
        Self {
            dao,
            tasks,
            cache: caches.loading("song_cache", config),
        }
    }

    /// Cached track for `query`. A miss is cached too.
    pub async fn get_track_info(&self, query: &str) -> StorageResult<Option<TrackDescriptor>> {
        let dao = Arc::clone(&self.dao);
        let tasks = self.tasks.clone();
        let owned = query.to_string();

        self.cache
            .get_or_load(query.to_string(), async move {
                join(tasks.spawn(async move { dao.get(&owned).await })).await
            })
            .await
    }

    /// Remember `track` as the answer to `query` and count a hit.
    pub async fn add_track(&self, query: &str, track: TrackDescriptor) -> StorageResult<()> {
        let this = self.clone();
        let query = query.to_string();

        join(self.tasks.spawn(async move {
            this.dao.add_hit(&query, &track).await?;
            this.cache.insert(query, Some(track)).await;
            Ok(())
        }))
        .await
    }

    pub async fn hits(&self, query: &str) -> StorageResult<u64> {
        let dao = Arc::clone(&self.dao);
        let query = query.to_string();
        join(self.tasks.spawn(async move { dao.hits(&query).await })).await
    }

    /// Forget entries not hit within `max_age`. Returns how many were removed.
    pub async fn prune(&self, max_age: Duration) -> StorageResult<usize> {
        let this = self.clone();
        let cutoff = Utc::now() - chrono::Duration::from_std(max_age).unwrap_or(chrono::Duration::zero());

        join(self.tasks.spawn(async move {
            let removed = this.dao.prune(cutoff).await?;
            for query in &removed {
                this.cache.invalidate(query).await;
            }
            debug!(removed = removed.len(), "Pruned song cache");
            Ok(removed.len())
        }))
        .await
    }

    pub async fn invalidate(&self, query: &str) {
        self.cache.invalidate(&query.to_string()).await;
    }
}
