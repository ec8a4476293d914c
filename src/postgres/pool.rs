use std::str::FromStr;

use async_trait::async_trait;
use deadpool::managed::QueueMode;
use deadpool_postgres::{
    Manager, ManagerConfig, Object, Pool, PoolConfig as DeadpoolPoolConfig, RecyclingMethod,
    Runtime,
};
use tokio::runtime::Handle;
use tokio_postgres::{NoTls, SimpleQueryMessage};
use tracing::{debug, info, warn};

use super::params::Params;
use super::query::build_result_set;
use crate::config::PoolConfig;
use crate::error::AccessError;
use crate::pool::{Driver, DriverConnection};
use crate::results::ResultSet;
use crate::types::RowValues;

/// `deadpool-postgres` pool with a FIFO wait queue.
#[derive(Clone, Debug)]
pub struct PgPool {
    pool: Pool,
}

impl PgPool {
    /// Build the pool from `config`.
    ///
    /// With `validate_on_start` set, one connection is opened and checked with `SELECT 1`
    /// before returning, so a bad URL or unreachable server fails here instead of on the
    /// first query.
    ///
    /// # Errors
    /// Returns `AccessError::Configuration` for an unparseable URL or pool settings, and the
    /// acquisition/statement error of the startup check.
    pub async fn connect(config: &PoolConfig) -> Result<Self, AccessError> {
        let pg_config = tokio_postgres::Config::from_str(&config.url).map_err(|e| {
            AccessError::Configuration(format!("invalid connection string: {e}"))
        })?;
        let manager = Manager::from_config(
            pg_config,
            NoTls,
            ManagerConfig {
                recycling_method: RecyclingMethod::Fast,
            },
        );

        let mut pool_config = DeadpoolPoolConfig::new(config.pool_size);
        pool_config.queue_mode = QueueMode::Fifo;
        pool_config.timeouts.wait = config.acquire_timeout;

        let pool = Pool::builder(manager)
            .config(pool_config)
            .runtime(Runtime::Tokio1)
            .build()
            .map_err(|e| {
                AccessError::Configuration(format!("Failed to create Postgres pool: {e}"))
            })?;

        info!(pool_size = config.pool_size, "postgres pool created");
        let pg_pool = Self { pool };
        if config.validate_on_start {
            pg_pool.validate().await?;
        }
        Ok(pg_pool)
    }

    /// Wrap an existing pool.
    #[must_use]
    pub fn from_pool(pool: Pool) -> Self {
        Self { pool }
    }

    async fn validate(&self) -> Result<(), AccessError> {
        let client = self.pool.get().await?;
        client.simple_query("SELECT 1").await?;
        debug!("postgres pool validated");
        Ok(())
    }

    /// Configured maximum number of connections.
    #[must_use]
    pub fn max_size(&self) -> usize {
        self.pool.status().max_size
    }
}

#[async_trait]
impl Driver for PgPool {
    type Connection = PgConnection;

    async fn acquire(&self) -> Result<PgConnection, AccessError> {
        let client = self.pool.get().await?;
        Ok(PgConnection { client })
    }
}

/// A client borrowed from [`PgPool`]; returned to the pool on drop.
pub struct PgConnection {
    client: Object,
}

impl std::fmt::Debug for PgConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgConnection").finish_non_exhaustive()
    }
}

#[async_trait]
impl DriverConnection for PgConnection {
    async fn query(&mut self, sql: &str, args: &[RowValues]) -> Result<ResultSet, AccessError> {
        let stmt = self.client.prepare(sql).await?;
        let params = Params::convert(args);
        let rows = self.client.query(&stmt, params.as_refs()).await?;
        build_result_set(&stmt, &rows)
    }

    async fn execute(&mut self, sql: &str, args: &[RowValues]) -> Result<u64, AccessError> {
        // Without arguments the text may hold several statements; the count is the last one's.
        if args.is_empty() {
            let messages = self.client.simple_query(sql).await?;
            let affected = messages
                .iter()
                .rev()
                .find_map(|message| match message {
                    SimpleQueryMessage::CommandComplete(count) => Some(*count),
                    _ => None,
                })
                .unwrap_or(0);
            return Ok(affected);
        }
        let params = Params::convert(args);
        Ok(self.client.execute(sql, params.as_refs()).await?)
    }

    async fn batch_execute(&mut self, sql: &str) -> Result<(), AccessError> {
        self.client.batch_execute(sql).await?;
        Ok(())
    }

    fn abandon_transaction(self) {
        let client = self.client;
        if let Ok(handle) = Handle::try_current() {
            // The client goes back to the pool only after the rollback has run.
            handle.spawn(async move {
                if let Err(e) = client.batch_execute("ROLLBACK").await {
                    warn!(error = %e, "rollback of abandoned transaction failed");
                    let _ = Object::take(client);
                }
            });
        } else {
            warn!("no runtime to roll back abandoned transaction; closing connection");
            let _ = Object::take(client);
        }
    }
}
