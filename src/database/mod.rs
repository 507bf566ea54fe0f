//! Data access: driver, Daos, cached wrappers.

pub mod dao;
mod driver;
pub mod models;
pub mod wrapper;

use std::sync::Arc;

use tracing::info;

pub use driver::{DriverManager, DriverStats, SqlParam, TableSpec, row_placeholders};
pub use models::*;
pub use wrapper::{PremiumGuildWrapper, SongCacheWrapper, UserPermissionWrapper, WarnWrapper};

use crate::cache::{CacheConfig, CacheRegistry, CacheTier};
use crate::error::StorageResult;
use crate::tasks::TaskManager;
use dao::{PremiumGuildDao, SongCacheDao, UserPermissionDao, WarnDao};

/// Every wrapper, built over one driver.
///
/// Construction registers each Dao's table; tables are created once all of
/// them are registered.
#[derive(Clone)]
pub struct DaoManager {
    driver: Arc<DriverManager>,
    pub user_permissions: UserPermissionWrapper,
    pub warns: WarnWrapper,
    pub song_cache: SongCacheWrapper,
    pub premium_guilds: PremiumGuildWrapper,
}

impl DaoManager {
    pub async fn init(driver: Arc<DriverManager>, tasks: TaskManager, caches: &CacheRegistry) -> StorageResult<Self> {
        let user_permissions = UserPermissionWrapper::new(
            Arc::new(UserPermissionDao::new(Arc::clone(&driver))),
            tasks.clone(),
            caches,
            CacheConfig::tier(CacheTier::Long).max_capacity(50_000),
        );
        let warns = WarnWrapper::new(
            Arc::new(WarnDao::new(Arc::clone(&driver))),
            tasks.clone(),
            caches,
            CacheConfig::tier(CacheTier::Medium).max_capacity(5_000),
        );
        let song_cache = SongCacheWrapper::new(
            Arc::new(SongCacheDao::new(Arc::clone(&driver))),
            tasks.clone(),
            caches,
            CacheConfig::tier(CacheTier::Critical).max_capacity(20_000),
        );
        let premium_guilds = PremiumGuildWrapper::new(
            Arc::new(PremiumGuildDao::new(Arc::clone(&driver))),
            tasks,
            caches,
            CacheConfig::tier(CacheTier::Long),
        );

        driver.execute_table_registration().await?;
        info!("Data access layer ready");

        Ok(Self {
            driver,
            user_permissions,
            warns,
            song_cache,
            premium_guilds,
        })
    }

    pub fn driver(&self) -> &Arc<DriverManager> {
        &self.driver
    }
}
