//! Cached async facades over the Daos.
//!
//! Reads go through a [`LoadingCache`](crate::cache::LoadingCache), so
//! concurrent misses on one key share a single Dao call scheduled on the
//! task pool. Writes run on the affinity queue of the entity they touch,
//! go to the database first and only then update the cache.

mod premium_guild;
mod song_cache;
mod user_permission;
mod warn;

pub use premium_guild::PremiumGuildWrapper;
pub use song_cache::SongCacheWrapper;
pub use user_permission::UserPermissionWrapper;
pub use warn::WarnWrapper;

use crate::error::StorageResult;
use crate::tasks::TaskHandle;

/// Wait for a storage task, folding a lost worker into the storage error.
pub(crate) async fn join<T>(handle: TaskHandle<StorageResult<T>>) -> StorageResult<T> {
    handle.await?
}
