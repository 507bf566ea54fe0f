//! Data access objects - one per table, no caching.

mod premium_guild;
mod song_cache;
mod user_permission;
mod warn;

pub use premium_guild::PremiumGuildDao;
pub use song_cache::SongCacheDao;
pub use user_permission::UserPermissionDao;
pub use warn::WarnDao;

use sqlx::sqlite::SqliteRow;
use sqlx::{Decode, Row, Sqlite, Type};

use crate::error::{StorageError, StorageResult};

/// Read one column, reporting the table on failure.
pub(crate) fn column<T>(row: &SqliteRow, table: &'static str, name: &str) -> StorageResult<T>
where
    T: for<'r> Decode<'r, Sqlite> + Type<Sqlite>,
{
    row.try_get(name).map_err(|e| StorageError::decode(table, e))
}

/// `?, ?, ?` for an `IN (...)` list.
pub(crate) fn list_placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}
