use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tracing::warn;

use crate::error::AccessError;
use crate::executor;
use crate::pool::Driver;
use crate::results::{EntryRow, ResultSet};
use crate::scoped::ScopedConnection;
use crate::transaction::Transaction;
use crate::translation::{PreparedQuery, TranslationMode};
use crate::types::RowValues;

/// Boxed future returned by the closures given to [`Database::with_connection`] and
/// [`Database::transaction`]. It may borrow the connection or transaction it was handed.
pub type ConnFuture<'c, T, E> = Pin<Box<dyn Future<Output = Result<T, E>> + Send + 'c>>;

/// Query facade over a pooled driver.
///
/// Cloning is cheap; clones share the pool. Every statement is translated from `?` markers
/// and runs on a connection borrowed for that one call.
///
/// ```rust,no_run
/// use pg_access::prelude::*;
///
/// # async fn demo() -> Result<(), AccessError> {
/// let config = PoolConfig::from_env()?;
/// let db = Database::new(PgPool::connect(&config).await?);
/// let rows = db
///     .query_entries("SELECT id, name FROM t WHERE id = ?", &[RowValues::Int(7)])
///     .await?;
/// for row in &rows {
///     println!("{:?}", row.get("name"));
/// }
/// # Ok(())
/// # }
/// ```
pub struct Database<D: Driver> {
    driver: Arc<D>,
    translation: TranslationMode,
}

impl<D: Driver> Clone for Database<D> {
    fn clone(&self) -> Self {
        Self {
            driver: Arc::clone(&self.driver),
            translation: self.translation,
        }
    }
}

impl<D: Driver + std::fmt::Debug> std::fmt::Debug for Database<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("driver", &self.driver)
            .field("translation", &self.translation)
            .finish()
    }
}

impl<D: Driver> Database<D> {
    #[must_use]
    pub fn new(driver: D) -> Self {
        Self {
            driver: Arc::new(driver),
            translation: TranslationMode::default(),
        }
    }

    #[must_use]
    pub fn with_translation(mut self, translation: TranslationMode) -> Self {
        self.translation = translation;
        self
    }

    #[must_use]
    pub fn driver(&self) -> &D {
        &self.driver
    }

    #[must_use]
    pub fn translation(&self) -> TranslationMode {
        self.translation
    }

    /// Translate `text` the way every query of this facade does.
    #[must_use]
    pub fn prepare(&self, text: &str, args: &[RowValues]) -> PreparedQuery {
        PreparedQuery::new(text, args, self.translation)
    }

    /// The only place a connection leaves the pool; `with_connection` and `begin` share it.
    pub(crate) async fn checkout(&self) -> Result<ScopedConnection<D::Connection>, AccessError> {
        let conn = self.driver.acquire().await?;
        Ok(ScopedConnection::new(conn))
    }

    /// Borrow one connection, run `op` on it, and give it back.
    ///
    /// The connection is back in the pool before this returns, whether `op` succeeds,
    /// fails, or fails before doing any I/O.
    ///
    /// # Errors
    /// Returns the acquisition error converted into `E`, or whatever `op` returns.
    pub async fn with_connection<T, E, F>(&self, op: F) -> Result<T, E>
    where
        F: for<'c> FnOnce(&'c mut D::Connection) -> ConnFuture<'c, T, E> + Send,
        E: From<AccessError>,
    {
        let mut conn = self.checkout().await?;
        let result = op(&mut *conn).await;
        drop(conn);
        result
    }

    /// Rows as column-name to value mappings, in the order the server returned them.
    ///
    /// # Errors
    /// Propagates acquisition and statement errors unmodified.
    pub async fn query_entries(
        &self,
        text: &str,
        args: &[RowValues],
    ) -> Result<Vec<EntryRow>, AccessError> {
        let prepared = self.prepare(text, args);
        self.with_connection(move |conn| {
            Box::pin(async move { executor::entries(conn, &prepared).await })
        })
        .await
    }

    /// Rows as value tuples, without column names.
    ///
    /// # Errors
    /// Propagates acquisition and statement errors unmodified.
    pub async fn query_array(
        &self,
        text: &str,
        args: &[RowValues],
    ) -> Result<Vec<Vec<RowValues>>, AccessError> {
        let prepared = self.prepare(text, args);
        self.with_connection(move |conn| {
            Box::pin(async move { executor::arrays(conn, &prepared).await })
        })
        .await
    }

    /// Rows together with column metadata.
    ///
    /// # Errors
    /// Propagates acquisition and statement errors unmodified.
    pub async fn query_result_set(
        &self,
        text: &str,
        args: &[RowValues],
    ) -> Result<ResultSet, AccessError> {
        let prepared = self.prepare(text, args);
        self.with_connection(move |conn| {
            Box::pin(async move { executor::result_set(conn, &prepared).await })
        })
        .await
    }

    /// Run a statement and discard any rows it returns.
    ///
    /// # Errors
    /// Propagates acquisition and statement errors unmodified.
    pub async fn execute(&self, text: &str, args: &[RowValues]) -> Result<(), AccessError> {
        self.execute_count(text, args).await.map(|_| ())
    }

    /// Same as [`Database::execute`].
    ///
    /// # Errors
    /// Propagates acquisition and statement errors unmodified.
    pub async fn query(&self, text: &str, args: &[RowValues]) -> Result<(), AccessError> {
        self.execute(text, args).await
    }

    /// Run a statement and return the number of rows it affected.
    ///
    /// # Errors
    /// Propagates acquisition and statement errors unmodified.
    pub async fn execute_count(&self, text: &str, args: &[RowValues]) -> Result<u64, AccessError> {
        let prepared = self.prepare(text, args);
        self.with_connection(move |conn| {
            Box::pin(async move { executor::execute(conn, &prepared).await })
        })
        .await
    }

    pub(crate) async fn begin(&self) -> Result<Transaction<D::Connection>, AccessError> {
        let conn = self.checkout().await?;
        Transaction::begin(conn, self.translation).await
    }

    /// Run `callback` inside `BEGIN` / `COMMIT` on a single connection.
    ///
    /// Every statement the callback issues through its [`Transaction`] runs on that same
    /// connection. If the callback returns an error (SQL or not) the transaction is rolled
    /// back and that error is returned; a failing `ROLLBACK` is logged and never replaces
    /// it. A failing `COMMIT` is returned as the error.
    ///
    /// ```rust,no_run
    /// use pg_access::prelude::*;
    ///
    /// # async fn demo(db: Database<PgPool>) -> Result<(), AccessError> {
    /// let id: i64 = db
    ///     .transaction(|tx| {
    ///         Box::pin(async move {
    ///             tx.execute("INSERT INTO t (name) VALUES (?)", &["a".into()]).await?;
    ///             let rows = tx.query_array("SELECT max(id) FROM t", &[]).await?;
    ///             Ok::<_, AccessError>(rows[0][0].as_int().copied().unwrap_or_default())
    ///         })
    ///     })
    ///     .await?;
    /// # let _ = id;
    /// # Ok(())
    /// # }
    /// ```
    ///
    /// # Errors
    /// Returns acquisition, `BEGIN`, and `COMMIT` errors, or the callback's own error.
    pub async fn transaction<T, E, F>(&self, callback: F) -> Result<T, E>
    where
        F: for<'t> FnOnce(&'t mut Transaction<D::Connection>) -> ConnFuture<'t, T, E> + Send,
        T: Send,
        E: From<AccessError> + Send,
    {
        let mut tx = self.begin().await?;
        match callback(&mut tx).await {
            Ok(value) => {
                tx.commit().await?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    warn!(error = %rollback_err, "rollback failed; returning the original error");
                }
                Err(err)
            }
        }
    }
}
