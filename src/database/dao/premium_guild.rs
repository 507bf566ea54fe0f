//! Guilds entitled to the elevated queue tier.

use std::sync::Arc;

use crate::database::driver::{DriverManager, TableSpec};
use crate::error::StorageResult;
use crate::sql_params;

const TABLE: TableSpec = TableSpec::new(
    "premium_guilds",
    "guild_id INTEGER NOT NULL, added_at INTEGER NOT NULL",
    "UNIQUE (guild_id)",
);

pub struct PremiumGuildDao {
    driver: Arc<DriverManager>,
}

impl PremiumGuildDao {
    pub fn new(driver: Arc<DriverManager>) -> Self {
        driver.register_table(TABLE);
        Self { driver }
    }

    pub async fn contains(&self, guild_id: u64) -> StorageResult<bool> {
        self.driver
            .execute_query(
                "SELECT 1 FROM premium_guilds WHERE guild_id = ?",
                &sql_params![guild_id],
                |rows| Ok(!rows.is_empty()),
            )
            .await
    }

    pub async fn add(&self, guild_id: u64) -> StorageResult<()> {
        self.driver
            .execute_update(
                "INSERT INTO premium_guilds (guild_id, added_at) VALUES (?, ?) ON CONFLICT (guild_id) DO NOTHING",
                &sql_params![guild_id, chrono::Utc::now().timestamp_millis()],
            )
            .await?;
        Ok(())
    }

    pub async fn remove(&self, guild_id: u64) -> StorageResult<()> {
        self.driver
            .execute_update("DELETE FROM premium_guilds WHERE guild_id = ?", &sql_params![guild_id])
            .await?;
        Ok(())
    }
}
