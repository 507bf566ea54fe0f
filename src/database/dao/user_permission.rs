//! Per-user command permissions.

use std::collections::HashMap;
use std::sync::Arc;

use super::{column, list_placeholders};
use crate::database::driver::{DriverManager, SqlParam, TableSpec, row_placeholders};
use crate::database::models::PermState;
use crate::error::{StorageError, StorageResult};
use crate::sql_params;

const TABLE: TableSpec = TableSpec::new(
    "user_permissions",
    "guild_id INTEGER NOT NULL, user_id INTEGER NOT NULL, permission TEXT NOT NULL, state TEXT NOT NULL",
    "UNIQUE (guild_id, user_id, permission)",
);

fn parse_state(raw: &str) -> StorageResult<PermState> {
    PermState::from_str(raw).ok_or_else(|| StorageError::decode(TABLE.name, format!("unknown state {raw:?}")))
}

pub struct UserPermissionDao {
    driver: Arc<DriverManager>,
}

impl UserPermissionDao {
    pub fn new(driver: Arc<DriverManager>) -> Self {
        driver.register_table(TABLE);
        Self { driver }
    }

    /// Stored state, or `PermState::Default` when nothing is stored.
    pub async fn get(&self, guild_id: u64, user_id: u64, permission: &str) -> StorageResult<PermState> {
        self.driver
            .execute_query(
                "SELECT state FROM user_permissions WHERE guild_id = ? AND user_id = ? AND permission = ?",
                &sql_params![guild_id, user_id, permission],
                |rows| match rows.first() {
                    Some(row) => parse_state(&column::<String>(row, TABLE.name, "state")?),
                    None => Ok(PermState::Default),
                },
            )
            .await
    }

    /// Upsert a state. `Default` removes the row instead.
    pub async fn set(
        &self,
        guild_id: u64,
        user_id: u64,
        permission: &str,
        state: PermState,
    ) -> StorageResult<()> {
        if state == PermState::Default {
            return self.delete(guild_id, user_id, permission).await;
        }

        self.driver
            .execute_update(
                "INSERT INTO user_permissions (guild_id, user_id, permission, state) VALUES (?, ?, ?, ?) \
                 ON CONFLICT (guild_id, user_id, permission) DO UPDATE SET state = excluded.state",
                &sql_params![guild_id, user_id, permission, state.as_str()],
            )
            .await?;
        Ok(())
    }

    pub async fn delete(&self, guild_id: u64, user_id: u64, permission: &str) -> StorageResult<()> {
        self.driver
            .execute_update(
                "DELETE FROM user_permissions WHERE guild_id = ? AND user_id = ? AND permission = ?",
                &sql_params![guild_id, user_id, permission],
            )
            .await?;
        Ok(())
    }

    /// Remove every permission of a user. Returns the removed permission names.
    ///
    /// One statement, so the returned names are exactly the rows deleted.
    pub async fn clear(&self, guild_id: u64, user_id: u64) -> StorageResult<Vec<String>> {
        self.driver
            .execute_query(
                "DELETE FROM user_permissions WHERE guild_id = ? AND user_id = ? RETURNING permission",
                &sql_params![guild_id, user_id],
                |rows| rows.iter().map(|row| column(row, TABLE.name, "permission")).collect(),
            )
            .await
    }

    /// Every stored permission of a user.
    pub async fn get_map(&self, guild_id: u64, user_id: u64) -> StorageResult<HashMap<String, PermState>> {
        self.driver
            .execute_query(
                "SELECT permission, state FROM user_permissions WHERE guild_id = ? AND user_id = ?",
                &sql_params![guild_id, user_id],
                |rows| {
                    rows.iter()
                        .map(|row| {
                            let permission = column::<String>(row, TABLE.name, "permission")?;
                            let state = parse_state(&column::<String>(row, TABLE.name, "state")?)?;
                            Ok((permission, state))
                        })
                        .collect()
                },
            )
            .await
    }

    /// Upsert the same state for many permissions in one statement.
    pub async fn bulk_put(
        &self,
        guild_id: u64,
        user_id: u64,
        permissions: &[String],
        state: PermState,
    ) -> StorageResult<()> {
        if permissions.is_empty() {
            return Ok(());
        }
        if state == PermState::Default {
            return self.bulk_delete(guild_id, user_id, permissions).await;
        }

        let sql = format!(
            "INSERT INTO user_permissions (guild_id, user_id, permission, state) VALUES {} \
             ON CONFLICT (guild_id, user_id, permission) DO UPDATE SET state = excluded.state",
            row_placeholders(permissions.len(), 4)
        );
        let params: Vec<SqlParam> = permissions
            .iter()
            .flat_map(|perm| sql_params![guild_id, user_id, perm.as_str(), state.as_str()])
            .collect();

        self.driver.execute_batch(sql, params).await?;
        Ok(())
    }

    /// Delete many permissions in one statement.
    pub async fn bulk_delete(&self, guild_id: u64, user_id: u64, permissions: &[String]) -> StorageResult<()> {
        if permissions.is_empty() {
            return Ok(());
        }

        let sql = format!(
            "DELETE FROM user_permissions WHERE guild_id = ? AND user_id = ? AND permission IN ({})",
            list_placeholders(permissions.len())
        );
        let mut params = sql_params![guild_id, user_id];
        params.extend(permissions.iter().map(|p| SqlParam::from(p.as_str())));

        self.driver.execute_batch(sql, params).await?;
        Ok(())
    }
}
