use std::sync::Arc;

use super::join;
use crate::cache::{CacheConfig, CacheRegistry, LoadingCache};
use crate::database::dao::PremiumGuildDao;
use crate::error::StorageResult;
use crate::tasks::{AffinityKey, TaskManager};

/// Cached premium flag per guild.
#[derive(Clone)]
pub struct PremiumGuildWrapper {
    dao: Arc<PremiumGuildDao>,
    tasks: TaskManager,
    cache: LoadingCache<u64, bool>,
}

impl PremiumGuildWrapper {
    pub fn new(dao: Arc<PremiumGuildDao>, tasks: TaskManager, caches: &CacheRegistry, config: CacheConfig) -> Self {
        Self {
            dao,
            tasks,
            cache: caches.loading("premium_guilds", config),
        }
    }

    pub async fn is_premium(&self, guild_id: u64) -> StorageResult<bool> {
        let dao = Arc::clone(&self.dao);
        let tasks = self.tasks.clone();

        self.cache
            .get_or_load(guild_id, async move {
                join(tasks.spawn(async move { dao.contains(guild_id).await })).await
            })
            .await
    }

    pub async fn set_premium(&self, guild_id: u64, premium: bool) -> StorageResult<()> {
        let this = self.clone();

        join(self.tasks.spawn_keyed(AffinityKey::Guild(guild_id), async move {
            if premium {
                this.dao.add(guild_id).await?;
            } else {
                this.dao.remove(guild_id).await?;
            }
            this.cache.insert(guild_id, premium).await;
            Ok(())
        }))
        .await
    }
}
