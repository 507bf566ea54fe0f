//! Resolved tracks keyed by the raw query that produced them.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::column;
use crate::database::driver::{DriverManager, TableSpec};
use crate::error::StorageResult;
use crate::music::TrackDescriptor;
use crate::sql_params;

const TABLE: TableSpec = TableSpec::new(
    "song_cache",
    "query TEXT NOT NULL, title TEXT NOT NULL, author TEXT NOT NULL, duration_ms INTEGER NOT NULL, \
     uri TEXT NOT NULL, encoded TEXT NOT NULL, hits INTEGER NOT NULL, last_hit INTEGER NOT NULL",
    "UNIQUE (query)",
);

pub struct SongCacheDao {
    driver: Arc<DriverManager>,
}

impl SongCacheDao {
    pub fn new(driver: Arc<DriverManager>) -> Self {
        driver.register_table(TABLE);
        Self { driver }
    }

    pub async fn get(&self, query: &str) -> StorageResult<Option<TrackDescriptor>> {
        self.driver
            .execute_query(
                "SELECT title, author, duration_ms, uri, encoded FROM song_cache WHERE query = ?",
                &sql_params![query],
                |rows| {
                    rows.first()
                        .map(|row| {
                            Ok(TrackDescriptor {
                                title: column(row, TABLE.name, "title")?,
                                author: column(row, TABLE.name, "author")?,
                                duration_ms: column::<i64>(row, TABLE.name, "duration_ms")?.max(0) as u64,
                                uri: column(row, TABLE.name, "uri")?,
                                encoded: column(row, TABLE.name, "encoded")?,
                            })
                        })
                        .transpose()
                },
            )
            .await
    }

    /// Store or refresh the track for `query` and count a hit.
    pub async fn add_hit(&self, query: &str, track: &TrackDescriptor) -> StorageResult<()> {
        let now = Utc::now().timestamp_millis();
        self.driver
            .execute_update(
                "INSERT INTO song_cache (query, title, author, duration_ms, uri, encoded, hits, last_hit) \
                 VALUES (?, ?, ?, ?, ?, ?, 1, ?) \
                 ON CONFLICT (query) DO UPDATE SET title = excluded.title, author = excluded.author, \
                 duration_ms = excluded.duration_ms, uri = excluded.uri, encoded = excluded.encoded, \
                 hits = song_cache.hits + 1, last_hit = excluded.last_hit",
                &sql_params![
                    query,
                    track.title.as_str(),
                    track.author.as_str(),
                    track.duration_ms as i64,
                    track.uri.as_str(),
                    track.encoded.as_str(),
                    now,
                ],
            )
            .await?;
        Ok(())
    }

    pub async fn hits(&self, query: &str) -> StorageResult<u64> {
        self.driver
            .execute_query(
                "SELECT hits FROM song_cache WHERE query = ?",
                &sql_params![query],
                |rows| match rows.first() {
                    Some(row) => Ok(column::<i64>(row, TABLE.name, "hits")?.max(0) as u64),
                    None => Ok(0),
                },
            )
            .await
    }

    /// Remove entries last hit before `cutoff`. Returns the removed queries.
    pub async fn prune(&self, cutoff: DateTime<Utc>) -> StorageResult<Vec<String>> {
        self.driver
            .execute_query(
                "DELETE FROM song_cache WHERE last_hit < ? RETURNING query",
                &sql_params![cutoff.timestamp_millis()],
                |rows| rows.iter().map(|row| column(row, TABLE.name, "query")).collect(),
            )
            .await
    }
}
