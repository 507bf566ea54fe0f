//! Connection pool and statement execution.
//!
//! Every Dao talks to the database through [`DriverManager`]. It owns the
//! pool, retries transient failures with exponential backoff and creates
//! registered tables once all Daos have been constructed.

use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures::future::BoxFuture;
use parking_lot::Mutex;
use sqlx::query::Query;
use sqlx::sqlite::{
    SqliteArguments, SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow,
    SqliteSynchronous,
};
use sqlx::{Pool, Sqlite, SqliteConnection};
use tracing::{debug, info, warn};

use crate::config::DatabaseConfig;
use crate::error::{StorageError, StorageResult};

/// Structure of one table: name, column definitions and key clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableSpec {
    pub name: &'static str,
    pub columns: &'static str,
    pub keys: &'static str,
}

impl TableSpec {
    pub const fn new(name: &'static str, columns: &'static str, keys: &'static str) -> Self {
        Self {
            name,
            columns,
            keys,
        }
    }

    fn create_statement(&self) -> String {
        if self.keys.is_empty() {
            format!("CREATE TABLE IF NOT EXISTS {} ({})", self.name, self.columns)
        } else {
            format!(
                "CREATE TABLE IF NOT EXISTS {} ({}, {})",
                self.name, self.columns, self.keys
            )
        }
    }
}

/// A bound statement parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    Int(i64),
    Text(String),
    Bool(bool),
    Null,
}

impl From<i64> for SqlParam {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<u64> for SqlParam {
    fn from(v: u64) -> Self {
        // Snowflakes fit in 63 bits.
        Self::Int(v as i64)
    }
}

impl From<bool> for SqlParam {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<&str> for SqlParam {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for SqlParam {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl<T: Into<SqlParam>> From<Option<T>> for SqlParam {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Self::Null)
    }
}

/// Build a `Vec<SqlParam>` from heterogeneous values.
#[macro_export]
macro_rules! sql_params {
    ($($value:expr),* $(,)?) => {
        vec![$($crate::database::SqlParam::from($value)),*]
    };
}

fn bind_all<'q>(
    mut query: Query<'q, Sqlite, SqliteArguments<'q>>,
    params: &'q [SqlParam],
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    for param in params {
        query = match param {
            SqlParam::Int(v) => query.bind(*v),
            SqlParam::Text(v) => query.bind(v.as_str()),
            SqlParam::Bool(v) => query.bind(*v),
            SqlParam::Null => query.bind(None::<i64>),
        };
    }
    query
}

/// `(?, ?, ?), (?, ?, ?)` for a multi-row statement.
pub fn row_placeholders(rows: usize, columns: usize) -> String {
    let row = format!("({})", vec!["?"; columns].join(", "));
    vec![row; rows].join(", ")
}

/// Counters of executed work, for diagnostics.
#[derive(Debug, Default)]
pub struct DriverStats {
    queries: AtomicU64,
    updates: AtomicU64,
    batches: AtomicU64,
    retries: AtomicU64,
}

impl DriverStats {
    pub fn queries(&self) -> u64 {
        self.queries.load(Ordering::Relaxed)
    }

    pub fn updates(&self) -> u64 {
        self.updates.load(Ordering::Relaxed)
    }

    pub fn batches(&self) -> u64 {
        self.batches.load(Ordering::Relaxed)
    }

    pub fn retries(&self) -> u64 {
        self.retries.load(Ordering::Relaxed)
    }

    /// Statements of any kind sent to the database.
    pub fn statements(&self) -> u64 {
        self.queries() + self.updates() + self.batches()
    }
}

enum Failure {
    Transient(sqlx::Error),
    Fatal(StorageError),
}

fn classify(err: sqlx::Error) -> Failure {
    let transient = match &err {
        sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) | sqlx::Error::WorkerCrashed => true,
        // SQLITE_BUSY / SQLITE_LOCKED, including their extended codes.
        sqlx::Error::Database(db) => db
            .code()
            .and_then(|code| code.parse::<i32>().ok())
            .is_some_and(|code| matches!(code & 0xff, 5 | 6)),
        _ => false,
    };
    if transient {
        return Failure::Transient(err);
    }

    let fatal = match err {
        sqlx::Error::PoolClosed => StorageError::Unavailable {
            attempts: 1,
            reason: sqlx::Error::PoolClosed.to_string(),
        },
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            StorageError::ConstraintViolation(db.message().to_string())
        }
        other => StorageError::Query(other.to_string()),
    };
    Failure::Fatal(fatal)
}

/// Owner of the connection pool.
pub struct DriverManager {
    pool: Pool<Sqlite>,
    pending_tables: Mutex<Vec<TableSpec>>,
    retry_attempts: u32,
    retry_base_delay: Duration,
    stats: Arc<DriverStats>,
}

impl DriverManager {
    /// Open the pool described by `config`.
    pub async fn connect(config: &DatabaseConfig) -> StorageResult<Self> {
        let opts = SqliteConnectOptions::from_str(&config.url)
            .map_err(|e| StorageError::Query(e.to_string()))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            // Writers wait for each other instead of failing immediately.
            .busy_timeout(config.busy_timeout);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections.max(1))
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(opts)
            .await
            .map_err(|e| StorageError::Unavailable {
                attempts: 1,
                reason: e.to_string(),
            })?;

        info!(
            url = %config.url,
            max_connections = config.max_connections,
            "Database pool ready"
        );

        Ok(Self::with_pool(pool, config))
    }

    /// Wrap an existing pool.
    pub fn with_pool(pool: Pool<Sqlite>, config: &DatabaseConfig) -> Self {
        Self {
            pool,
            pending_tables: Mutex::new(Vec::new()),
            retry_attempts: config.retry_attempts.max(1),
            retry_base_delay: config.retry_base_delay,
            stats: Arc::new(DriverStats::default()),
        }
    }

    pub fn stats(&self) -> &DriverStats {
        &self.stats
    }

    /// Queue a table for creation. Registering the same name twice is a no-op.
    pub fn register_table(&self, spec: TableSpec) {
        let mut pending = self.pending_tables.lock();
        if !pending.iter().any(|t| t.name == spec.name) {
            debug!("Registered table {}", spec.name);
            pending.push(spec);
        }
    }

    /// Create every registered table, in registration order.
    ///
    /// Safe to run on every startup: existing tables are left untouched.
    pub async fn execute_table_registration(&self) -> StorageResult<()> {
        let tables: Vec<TableSpec> = std::mem::take(&mut *self.pending_tables.lock());

        for table in &tables {
            let statement = table.create_statement();
            self.execute_update(&statement, &[]).await?;
        }

        info!("Registered {} tables", tables.len());
        Ok(())
    }

    /// Run a read and hand the rows to `handler`.
    pub async fn execute_query<T, F>(
        &self,
        sql: &str,
        params: &[SqlParam],
        handler: F,
    ) -> StorageResult<T>
    where
        F: FnOnce(Vec<SqliteRow>) -> StorageResult<T>,
    {
        self.stats.queries.fetch_add(1, Ordering::Relaxed);
        let pool = &self.pool;
        let rows = self
            .with_retry(sql, || async move {
                bind_all(sqlx::query(sql), params).fetch_all(pool).await
            })
            .await?;
        handler(rows)
    }

    /// Run a write. Returns the number of affected rows.
    pub async fn execute_update(&self, sql: &str, params: &[SqlParam]) -> StorageResult<u64> {
        self.stats.updates.fetch_add(1, Ordering::Relaxed);
        let pool = &self.pool;
        let result = self
            .with_retry(sql, || async move {
                bind_all(sqlx::query(sql), params).execute(pool).await
            })
            .await?;
        Ok(result.rows_affected())
    }

    /// Run one multi-row statement atomically in its own transaction.
    ///
    /// A transient failure anywhere between acquiring the connection and the
    /// commit rolls back and retries the whole transaction.
    pub async fn execute_batch(&self, sql: String, params: Vec<SqlParam>) -> StorageResult<u64> {
        self.stats.batches.fetch_add(1, Ordering::Relaxed);
        let pool = &self.pool;
        let (sql, params) = (sql.as_str(), params.as_slice());
        self.with_retry(sql, || async move {
            let mut tx = pool.begin().await?;
            let result = bind_all(sqlx::query(sql), params).execute(&mut *tx).await?;
            tx.commit().await?;
            Ok(result.rows_affected())
        })
        .await
    }

    /// Lease a raw connection for the duration of `work`.
    ///
    /// The connection goes back to the pool on every exit path, including
    /// errors and panics inside `work`. Only the acquisition is retried.
    pub async fn with_connection<T, F>(&self, work: F) -> StorageResult<T>
    where
        F: for<'c> FnOnce(&'c mut SqliteConnection) -> BoxFuture<'c, Result<T, sqlx::Error>>,
    {
        let pool = &self.pool;
        let mut conn = self
            .with_retry("acquire", || async move { pool.acquire().await })
            .await?;

        work(&mut *conn).await.map_err(|err| match classify(err) {
            Failure::Transient(err) => StorageError::Unavailable {
                attempts: 1,
                reason: err.to_string(),
            },
            Failure::Fatal(err) => err,
        })
    }

    /// Verify the database answers.
    pub async fn health_check(&self) -> StorageResult<()> {
        self.execute_query("SELECT 1", &[], |_| Ok(())).await
    }

    /// Close the pool, waiting for leased connections to come back.
    pub async fn close(&self) {
        self.pool.close().await;
        info!("Database pool closed");
    }

    async fn with_retry<T, F, Fut>(&self, what: &str, mut op: F) -> StorageResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, sqlx::Error>>,
    {
        let mut attempt = 1;
        loop {
            let err = match op().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            match classify(err) {
                Failure::Fatal(err) => return Err(err),
                Failure::Transient(err) if attempt >= self.retry_attempts => {
                    warn!(attempts = attempt, error = %err, "Giving up on {}", what);
                    return Err(StorageError::Unavailable {
                        attempts: attempt,
                        reason: err.to_string(),
                    });
                }
                Failure::Transient(err) => {
                    let delay = self.retry_base_delay * 2u32.saturating_pow(attempt - 1);
                    debug!(attempt, ?delay, error = %err, "Transient failure on {}, retrying", what);
                    self.stats.retries.fetch_add(1, Ordering::Relaxed);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

impl std::fmt::Debug for DriverManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriverManager")
            .field("pool_size", &self.pool.size())
            .field("stats", &self.stats)
            .finish()
    }
}
