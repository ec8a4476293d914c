use tracing::warn;

use crate::bridge::SyncBridge;
use crate::config::PoolConfig;
use crate::database::{ConnFuture, Database};
use crate::error::AccessError;
use crate::pool::{Driver, DriverConnection};
use crate::postgres::PgPool;
use crate::results::EntryRow;
use crate::transaction::Transaction;
use crate::types::RowValues;

/// Synchronous version of [`Database`] for callers that cannot `.await`.
///
/// Each call runs on the [`SyncBridge`] runtime while the calling thread blocks, so calls
/// must not be made from inside an async task. Dropping it is fine anywhere.
///
/// ```rust,no_run
/// use pg_access::prelude::*;
///
/// # fn demo() -> Result<(), AccessError> {
/// let db = BlockingDatabase::connect(PoolConfig::from_env()?)?;
/// db.execute("UPDATE t SET name = ? WHERE id = ?", &["b".into(), 7.into()])?;
/// let rows = db.query_array("SELECT id FROM t", &[])?;
/// # let _ = rows;
/// # Ok(())
/// # }
/// ```
pub struct BlockingDatabase<D: Driver> {
    database: Database<D>,
    bridge: SyncBridge,
}

impl BlockingDatabase<PgPool> {
    /// Start a bridge and build the pool on its runtime, so the connections are driven by
    /// threads that never block.
    ///
    /// # Errors
    /// Returns bridge, configuration, and startup validation errors.
    pub fn connect(config: PoolConfig) -> Result<Self, AccessError> {
        let bridge = SyncBridge::new()?;
        let translation = config.translation;
        let pool = bridge.run_synchronously(async move { PgPool::connect(&config).await })?;
        Ok(Self::new(Database::new(pool).with_translation(translation), bridge))
    }
}

impl<D: Driver> BlockingDatabase<D> {
    /// Pair an existing facade with a bridge. The driver's connections should be driven
    /// by the bridge runtime or another runtime the caller never blocks.
    #[must_use]
    pub fn new(database: Database<D>, bridge: SyncBridge) -> Self {
        Self { database, bridge }
    }

    #[must_use]
    pub fn database(&self) -> &Database<D> {
        &self.database
    }

    #[must_use]
    pub fn bridge(&self) -> &SyncBridge {
        &self.bridge
    }

    /// # Errors
    /// See [`Database::query_entries`].
    pub fn query_entries(&self, text: &str, args: &[RowValues]) -> Result<Vec<EntryRow>, AccessError> {
        let db = self.database.clone();
        let (text, args) = (text.to_string(), args.to_vec());
        self.bridge
            .run_synchronously(async move { db.query_entries(&text, &args).await })
    }

    /// # Errors
    /// See [`Database::query_array`].
    pub fn query_array(
        &self,
        text: &str,
        args: &[RowValues],
    ) -> Result<Vec<Vec<RowValues>>, AccessError> {
        let db = self.database.clone();
        let (text, args) = (text.to_string(), args.to_vec());
        self.bridge
            .run_synchronously(async move { db.query_array(&text, &args).await })
    }

    /// # Errors
    /// See [`Database::execute`].
    pub fn execute(&self, text: &str, args: &[RowValues]) -> Result<(), AccessError> {
        self.execute_count(text, args).map(|_| ())
    }

    /// Same as [`BlockingDatabase::execute`].
    ///
    /// # Errors
    /// See [`Database::execute`].
    pub fn query(&self, text: &str, args: &[RowValues]) -> Result<(), AccessError> {
        self.execute(text, args)
    }

    /// # Errors
    /// See [`Database::execute_count`].
    pub fn execute_count(&self, text: &str, args: &[RowValues]) -> Result<u64, AccessError> {
        let db = self.database.clone();
        let (text, args) = (text.to_string(), args.to_vec());
        self.bridge
            .run_synchronously(async move { db.execute_count(&text, &args).await })
    }

    /// Run a plain closure inside `BEGIN` / `COMMIT` on one connection.
    ///
    /// Semantics match [`Database::transaction`]: an error from `callback` rolls back
    /// (a rollback failure is logged, not returned) and is handed back unchanged.
    ///
    /// # Errors
    /// Returns acquisition, `BEGIN`, and `COMMIT` errors, or the callback's own error.
    pub fn transaction<T, E, F>(&self, callback: F) -> Result<T, E>
    where
        F: FnOnce(&mut BlockingTransaction<'_, D::Connection>) -> Result<T, E>,
        E: From<AccessError>,
    {
        let db = self.database.clone();
        let tx = self.bridge.run_synchronously(async move { db.begin().await })?;
        let mut tx = BlockingTransaction {
            tx: Some(tx),
            bridge: &self.bridge,
        };

        match callback(&mut tx) {
            Ok(value) => {
                let open = tx.take()?;
                self.bridge
                    .run_synchronously(async move { open.commit().await })?;
                Ok(value)
            }
            Err(err) => {
                // `take` fails only when a bridged statement lost the connection; it was
                // abandoned on the bridge runtime already.
                if let Ok(open) = tx.take()
                    && let Err(rollback_err) =
                        self.bridge.run_synchronously(async move { open.rollback().await })
                {
                    warn!(error = %rollback_err, "rollback failed; returning the original error");
                }
                Err(err)
            }
        }
    }
}

/// Synchronous view of a [`Transaction`], handed to [`BlockingDatabase::transaction`].
pub struct BlockingTransaction<'b, C: DriverConnection> {
    tx: Option<Transaction<C>>,
    bridge: &'b SyncBridge,
}

impl<C: DriverConnection> BlockingTransaction<'_, C> {
    fn take(&mut self) -> Result<Transaction<C>, AccessError> {
        self.tx.take().ok_or_else(|| {
            AccessError::Bridge("transaction connection was lost by an earlier statement".into())
        })
    }

    // Ship the transaction to the bridge runtime for one statement and bring it back.
    fn run<R, F>(&mut self, op: F) -> Result<R, AccessError>
    where
        F: for<'t> FnOnce(&'t mut Transaction<C>) -> ConnFuture<'t, R, AccessError> + Send + 'static,
        R: Send + 'static,
    {
        let mut tx = self.take()?;
        let (tx, result) = self.bridge.run_synchronously(async move {
            let result = op(&mut tx).await;
            Ok::<_, AccessError>((tx, result))
        })?;
        self.tx = Some(tx);
        result
    }

    /// # Errors
    /// See [`Transaction::query_entries`].
    pub fn query_entries(&mut self, text: &str, args: &[RowValues]) -> Result<Vec<EntryRow>, AccessError> {
        let (text, args) = (text.to_string(), args.to_vec());
        self.run(move |tx| Box::pin(async move { tx.query_entries(&text, &args).await }))
    }

    /// # Errors
    /// See [`Transaction::query_array`].
    pub fn query_array(
        &mut self,
        text: &str,
        args: &[RowValues],
    ) -> Result<Vec<Vec<RowValues>>, AccessError> {
        let (text, args) = (text.to_string(), args.to_vec());
        self.run(move |tx| Box::pin(async move { tx.query_array(&text, &args).await }))
    }

    /// # Errors
    /// See [`Transaction::execute`].
    pub fn execute(&mut self, text: &str, args: &[RowValues]) -> Result<(), AccessError> {
        self.execute_count(text, args).map(|_| ())
    }

    /// Same as [`BlockingTransaction::execute`].
    ///
    /// # Errors
    /// See [`Transaction::execute`].
    pub fn query(&mut self, text: &str, args: &[RowValues]) -> Result<(), AccessError> {
        self.execute(text, args)
    }

    /// # Errors
    /// See [`Transaction::execute_count`].
    pub fn execute_count(&mut self, text: &str, args: &[RowValues]) -> Result<u64, AccessError> {
        let (text, args) = (text.to_string(), args.to_vec());
        self.run(move |tx| Box::pin(async move { tx.execute_count(&text, &args).await }))
    }

    /// Always fails with [`AccessError::NestedTransaction`] without running `callback`.
    ///
    /// # Errors
    /// Always.
    pub fn transaction<T, E, F>(&mut self, _callback: F) -> Result<T, E>
    where
        F: FnOnce(&mut BlockingTransaction<'_, C>) -> Result<T, E>,
        E: From<AccessError>,
    {
        warn!("nested transaction rejected");
        Err(AccessError::NestedTransaction.into())
    }
}

impl<C: DriverConnection> Drop for BlockingTransaction<'_, C> {
    fn drop(&mut self) {
        // Reached with a live transaction only when the callback panicked. Drop it inside
        // the bridge runtime so the rollback can be spawned there.
        if let Some(tx) = self.tx.take() {
            let _entered = self.bridge.handle().enter();
            drop(tx);
        }
    }
}
