//! Warnings issued to guild members.

use std::sync::Arc;

use sqlx::sqlite::SqliteRow;

use super::column;
use crate::database::driver::{DriverManager, TableSpec};
use crate::database::models::Warn;
use crate::error::StorageResult;
use crate::sql_params;

const TABLE: TableSpec = TableSpec::new(
    "warns",
    "warn_id TEXT NOT NULL, guild_id INTEGER NOT NULL, warned_id INTEGER NOT NULL, \
     author_id INTEGER NOT NULL, reason TEXT NOT NULL, moment INTEGER NOT NULL",
    "UNIQUE (warn_id)",
);

const SELECT: &str = "SELECT warn_id, guild_id, warned_id, author_id, reason, moment FROM warns";

fn read_warn(row: &SqliteRow) -> StorageResult<Warn> {
    Ok(Warn {
        warn_id: column(row, TABLE.name, "warn_id")?,
        guild_id: column::<i64>(row, TABLE.name, "guild_id")? as u64,
        warned_id: column::<i64>(row, TABLE.name, "warned_id")? as u64,
        author_id: column::<i64>(row, TABLE.name, "author_id")? as u64,
        reason: column(row, TABLE.name, "reason")?,
        moment: column(row, TABLE.name, "moment")?,
    })
}

fn read_all(rows: Vec<SqliteRow>) -> StorageResult<Vec<Warn>> {
    rows.iter().map(read_warn).collect()
}

pub struct WarnDao {
    driver: Arc<DriverManager>,
}

impl WarnDao {
    pub fn new(driver: Arc<DriverManager>) -> Self {
        driver.register_table(TABLE);
        Self { driver }
    }

    /// Plain insert; a reused `warn_id` is a constraint violation.
    pub async fn add(&self, warn: &Warn) -> StorageResult<()> {
        self.driver
            .execute_update(
                "INSERT INTO warns (warn_id, guild_id, warned_id, author_id, reason, moment) \
                 VALUES (?, ?, ?, ?, ?, ?)",
                &sql_params![
                    warn.warn_id.as_str(),
                    warn.guild_id,
                    warn.warned_id,
                    warn.author_id,
                    warn.reason.as_str(),
                    warn.moment,
                ],
            )
            .await?;
        Ok(())
    }

    /// Warnings of one member, oldest first.
    pub async fn get(&self, guild_id: u64, warned_id: u64) -> StorageResult<Vec<Warn>> {
        self.driver
            .execute_query(
                &format!("{SELECT} WHERE guild_id = ? AND warned_id = ? ORDER BY moment, warn_id"),
                &sql_params![guild_id, warned_id],
                read_all,
            )
            .await
    }

    /// Every warning in a guild, oldest first.
    pub async fn get_by_guild(&self, guild_id: u64) -> StorageResult<Vec<Warn>> {
        self.driver
            .execute_query(
                &format!("{SELECT} WHERE guild_id = ? ORDER BY moment, warn_id"),
                &sql_params![guild_id],
                read_all,
            )
            .await
    }

    pub async fn get_by_id(&self, guild_id: u64, warn_id: &str) -> StorageResult<Option<Warn>> {
        self.driver
            .execute_query(
                &format!("{SELECT} WHERE guild_id = ? AND warn_id = ?"),
                &sql_params![guild_id, warn_id],
                |rows| rows.first().map(read_warn).transpose(),
            )
            .await
    }

    pub async fn delete(&self, guild_id: u64, warn_id: &str) -> StorageResult<bool> {
        let affected = self
            .driver
            .execute_update(
                "DELETE FROM warns WHERE guild_id = ? AND warn_id = ?",
                &sql_params![guild_id, warn_id],
            )
            .await?;
        Ok(affected > 0)
    }

    pub async fn clear(&self, guild_id: u64, warned_id: u64) -> StorageResult<u64> {
        self.driver
            .execute_update(
                "DELETE FROM warns WHERE guild_id = ? AND warned_id = ?",
                &sql_params![guild_id, warned_id],
            )
            .await
    }
}
