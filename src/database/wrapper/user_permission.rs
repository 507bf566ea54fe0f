use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use super::join;
use crate::cache::{CacheConfig, CacheRegistry, LoadingCache};
use crate::database::dao::UserPermissionDao;
use crate::database::models::PermState;
use crate::error::StorageResult;
use crate::tasks::{AffinityKey, TaskManager};

type StateKey = (u64, u64, String);
type UserKey = (u64, u64);

/// Cached user permissions. Absence reads as [`PermState::Default`].
#[derive(Clone)]
pub struct UserPermissionWrapper {
    dao: Arc<UserPermissionDao>,
    tasks: TaskManager,
    states: LoadingCache<StateKey, PermState>,
    maps: LoadingCache<UserKey, HashMap<String, PermState>>,
}

impl UserPermissionWrapper {
    pub fn new(
        dao: Arc<UserPermissionDao>,
        tasks: TaskManager,
        caches: &CacheRegistry,
        config: CacheConfig,
    ) -> Self {
        Self {
            dao,
            tasks,
            states: caches.loading("user_permissions", config.clone()),
            maps: caches.loading("user_permission_maps", config),
        }
    }

    pub async fn get(&self, guild_id: u64, user_id: u64, permission: &str) -> StorageResult<PermState> {
        let key = (guild_id, user_id, permission.to_string());
        let dao = Arc::clone(&self.dao);
        let tasks = self.tasks.clone();
        let permission = permission.to_string();

        self.states
            .get_or_load(key, async move {
                join(tasks.spawn(async move { dao.get(guild_id, user_id, &permission).await })).await
            })
            .await
    }

    /// Every explicitly stored permission of a user.
    pub async fn get_map(&self, guild_id: u64, user_id: u64) -> StorageResult<HashMap<String, PermState>> {
        let dao = Arc::clone(&self.dao);
        let tasks = self.tasks.clone();

        self.maps
            .get_or_load((guild_id, user_id), async move {
                join(tasks.spawn(async move { dao.get_map(guild_id, user_id).await })).await
            })
            .await
    }

    /// Write through to the database, then cache the new state.
    pub async fn set(&self, guild_id: u64, user_id: u64, permission: &str, state: PermState) -> StorageResult<()> {
        let this = self.clone();
        let permission = permission.to_string();

        join(self.tasks.spawn_keyed(AffinityKey::User(user_id), async move {
            this.dao.set(guild_id, user_id, &permission, state).await?;
            this.states.insert((guild_id, user_id, permission), state).await;
            this.maps.invalidate(&(guild_id, user_id)).await;
            Ok(())
        }))
        .await
    }

    /// Remove every permission of a user. Returns the removed names.
    pub async fn clear(&self, guild_id: u64, user_id: u64) -> StorageResult<Vec<String>> {
        let this = self.clone();

        join(self.tasks.spawn_keyed(AffinityKey::User(user_id), async move {
            let removed = this.dao.clear(guild_id, user_id).await?;
            for permission in &removed {
                this.states
                    .insert((guild_id, user_id, permission.clone()), PermState::Default)
                    .await;
            }
            this.maps.invalidate(&(guild_id, user_id)).await;
            debug!(guild_id, user_id, removed = removed.len(), "Cleared user permissions");
            Ok(removed)
        }))
        .await
    }

    /// Give many permissions the same state in one statement.
    pub async fn bulk_set(
        &self,
        guild_id: u64,
        user_id: u64,
        permissions: Vec<String>,
        state: PermState,
    ) -> StorageResult<()> {
        let this = self.clone();

        join(self.tasks.spawn_keyed(AffinityKey::User(user_id), async move {
            this.dao.bulk_put(guild_id, user_id, &permissions, state).await?;
            for permission in permissions {
                this.states.insert((guild_id, user_id, permission), state).await;
            }
            this.maps.invalidate(&(guild_id, user_id)).await;
            Ok(())
        }))
        .await
    }

    /// Reset many permissions to the default in one statement.
    pub async fn bulk_delete(&self, guild_id: u64, user_id: u64, permissions: Vec<String>) -> StorageResult<()> {
        let this = self.clone();

        join(self.tasks.spawn_keyed(AffinityKey::User(user_id), async move {
            this.dao.bulk_delete(guild_id, user_id, &permissions).await?;
            for permission in permissions {
                this.states
                    .insert((guild_id, user_id, permission), PermState::Default)
                    .await;
            }
            this.maps.invalidate(&(guild_id, user_id)).await;
            Ok(())
        }))
        .await
    }

    /// Drop the cached state so the next read goes to the database.
    pub async fn invalidate(&self, guild_id: u64, user_id: u64, permission: &str) {
        self.states
            .invalidate(&(guild_id, user_id, permission.to_string()))
            .await;
        self.maps.invalidate(&(guild_id, user_id)).await;
    }
}
