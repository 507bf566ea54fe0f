use std::sync::Arc;

use super::join;
use crate::cache::{CacheConfig, CacheRegistry, LoadingCache};
use crate::database::dao::WarnDao;
use crate::database::models::Warn;
use crate::error::StorageResult;
use crate::tasks::{AffinityKey, TaskManager};

/// Warnings of one member, cached per `(guild, member)`.
#[derive(Clone)]
pub struct WarnWrapper {
    dao: Arc<WarnDao>,
    tasks: TaskManager,
    cache: LoadingCache<(u64, u64), Vec<Warn>>,
}

impl WarnWrapper {
    pub fn new(dao: Arc<WarnDao>, tasks: TaskManager, caches: &CacheRegistry, config: CacheConfig) -> Self {
        Self {
            dao,
            tasks,
            cache: caches.loading("warns", config),
        }
    }

    pub async fn get(&self, guild_id: u64, warned_id: u64) -> StorageResult<Vec<Warn>> {
        let dao = Arc::clone(&self.dao);
        let tasks = self.tasks.clone();

        self.cache
            .get_or_load((guild_id, warned_id), async move {
                join(tasks.spawn(async move { dao.get(guild_id, warned_id).await })).await
            })
            .await
    }

    /// Every warning in a guild. Not cached.
    pub async fn get_by_guild(&self, guild_id: u64) -> StorageResult<Vec<Warn>> {
        let dao = Arc::clone(&self.dao);
        join(self.tasks.spawn(async move { dao.get_by_guild(guild_id).await })).await
    }

    pub async fn add(&self, warn: Warn) -> StorageResult<()> {
        let this = self.clone();

        join(self.tasks.spawn_keyed(AffinityKey::Guild(warn.guild_id), async move {
            this.dao.add(&warn).await?;
            this.cache.invalidate(&(warn.guild_id, warn.warned_id)).await;
            Ok(())
        }))
        .await
    }

    /// Delete one warning by id. Returns whether it existed.
    pub async fn delete(&self, guild_id: u64, warn_id: &str) -> StorageResult<bool> {
        let this = self.clone();
        let warn_id = warn_id.to_string();

        join(self.tasks.spawn_keyed(AffinityKey::Guild(guild_id), async move {
            let Some(warn) = this.dao.get_by_id(guild_id, &warn_id).await? else {
                return Ok(false);
            };
            let deleted = this.dao.delete(guild_id, &warn_id).await?;
            this.cache.invalidate(&(guild_id, warn.warned_id)).await;
            Ok(deleted)
        }))
        .await
    }

    /// Remove every warning of a member. Returns how many were removed.
    pub async fn clear(&self, guild_id: u64, warned_id: u64) -> StorageResult<u64> {
        let this = self.clone();

        join(self.tasks.spawn_keyed(AffinityKey::Guild(guild_id), async move {
            let removed = this.dao.clear(guild_id, warned_id).await?;
            this.cache.insert((guild_id, warned_id), Vec::new()).await;
            Ok(removed)
        }))
        .await
    }

    pub async fn invalidate(&self, guild_id: u64, warned_id: u64) {
        self.cache.invalidate(&(guild_id, warned_id)).await;
    }
}
