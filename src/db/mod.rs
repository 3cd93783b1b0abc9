//! The storage collaborator: a pooled SQLite connection, the embedded schema
//! migrations, and the retry policy every operation runs under.

use std::future::Future;
use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Sqlite, SqlitePool, Transaction};

use crate::config::Config;
use crate::error::AdminResult;

mod retry;

pub use retry::RetryPolicy;

/// Handle to the membership store.
///
/// Cheap to clone; every clone shares the same pool.
#[derive(Debug, Clone)]
pub struct Db {
    pool: SqlitePool,
    retry: RetryPolicy,
}

impl Db {
    pub async fn connect(config: &Config) -> AdminResult<Self> {
        let mut options = SqliteConnectOptions::from_str(&config.database_url)?
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(config.busy_timeout);

        let mut pool_options = SqlitePoolOptions::new().max_connections(config.max_connections);

        // Every connection to `:memory:` is its own database, so keep exactly
        // one alive for the life of the pool.
        if config.is_in_memory() {
            pool_options = pool_options
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
        } else {
            options = options.journal_mode(SqliteJournalMode::Wal);
        }

        let pool = pool_options.connect_with(options).await?;
        tracing::info!(
            "Connected to membership store (max_connections={})",
            config.max_connections
        );

        Ok(Self::from_pool(pool, config.retry))
    }

    pub fn from_pool(pool: SqlitePool, retry: RetryPolicy) -> Self {
        Self { pool, retry }
    }

    /// An empty, fully migrated in-memory store.
    pub async fn in_memory() -> AdminResult<Self> {
        let db = Self::connect(&Config::in_memory()).await?;
        db.migrate().await?;

        Ok(db)
    }

    /// Apply any schema migrations the database has not seen yet.
    pub async fn migrate(&self) -> AdminResult<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        tracing::info!("Membership schema migrations applied");

        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Open a write transaction, taking the write lock up front so that
    /// waiting on another writer falls under the busy timeout.
    pub(crate) async fn begin(&self) -> AdminResult<Transaction<'static, Sqlite>> {
        self.pool
            .begin_with("BEGIN IMMEDIATE")
            .await
            .map_err(Into::into)
    }

    /// Run one unit of work under this store's retry policy.
    ///
    /// `operation` must open and commit its own transaction so that a retried
    /// attempt never observes a half-applied earlier one.
    pub(crate) async fn retrying<T, F, Fut>(&self, label: &str, operation: F) -> AdminResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = AdminResult<T>>,
    {
        self.retry.run(label, operation).await
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}
