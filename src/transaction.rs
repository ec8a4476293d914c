use tracing::{debug, warn};

use crate::database::ConnFuture;
use crate::error::AccessError;
use crate::executor;
use crate::pool::DriverConnection;
use crate::results::{EntryRow, ResultSet};
use crate::scoped::ScopedConnection;
use crate::translation::{PreparedQuery, TranslationMode};
use crate::types::RowValues;

/// Query facade bound to the one connection a transaction was opened on.
///
/// Handed to the callback of [`Database::transaction`](crate::Database::transaction). If it
/// is dropped while the transaction is still open (a panic, or the surrounding future
/// being cancelled) the connection is released through
/// [`DriverConnection::abandon_transaction`] so the open transaction never reaches the
/// next borrower.
pub struct Transaction<C: DriverConnection> {
    conn: ScopedConnection<C>,
    translation: TranslationMode,
    open: bool,
}

impl<C: DriverConnection> Transaction<C> {
    pub(crate) async fn begin(
        mut conn: ScopedConnection<C>,
        translation: TranslationMode,
    ) -> Result<Self, AccessError> {
        conn.batch_execute("BEGIN").await?;
        debug!("transaction started");
        Ok(Self {
            conn,
            translation,
            open: true,
        })
    }

    pub(crate) async fn commit(self) -> Result<(), AccessError> {
        self.finish("COMMIT").await
    }

    pub(crate) async fn rollback(self) -> Result<(), AccessError> {
        self.finish("ROLLBACK").await
    }

    async fn finish(mut self, sql: &str) -> Result<(), AccessError> {
        // On failure `open` stays set and Drop abandons the connection.
        self.conn.batch_execute(sql).await?;
        self.open = false;
        debug!(statement = sql, "transaction finished");
        Ok(())
    }

    fn prepare(&self, text: &str, args: &[RowValues]) -> PreparedQuery {
        PreparedQuery::new(text, args, self.translation)
    }

    /// See [`Database::query_entries`](crate::Database::query_entries).
    ///
    /// # Errors
    /// Propagates statement errors unmodified.
    pub async fn query_entries(
        &mut self,
        text: &str,
        args: &[RowValues],
    ) -> Result<Vec<EntryRow>, AccessError> {
        let prepared = self.prepare(text, args);
        executor::entries(&mut *self.conn, &prepared).await
    }

    /// See [`Database::query_array`](crate::Database::query_array).
    ///
    /// # Errors
    /// Propagates statement errors unmodified.
    pub async fn query_array(
        &mut self,
        text: &str,
        args: &[RowValues],
    ) -> Result<Vec<Vec<RowValues>>, AccessError> {
        let prepared = self.prepare(text, args);
        executor::arrays(&mut *self.conn, &prepared).await
    }

    /// # Errors
    /// Propagates statement errors unmodified.
    pub async fn query_result_set(
        &mut self,
        text: &str,
        args: &[RowValues],
    ) -> Result<ResultSet, AccessError> {
        let prepared = self.prepare(text, args);
        executor::result_set(&mut *self.conn, &prepared).await
    }

    /// # Errors
    /// Propagates statement errors unmodified.
    pub async fn execute(&mut self, text: &str, args: &[RowValues]) -> Result<(), AccessError> {
        self.execute_count(text, args).await.map(|_| ())
    }

    /// Same as [`Transaction::execute`].
    ///
    /// # Errors
    /// Propagates statement errors unmodified.
    pub async fn query(&mut self, text: &str, args: &[RowValues]) -> Result<(), AccessError> {
        self.execute(text, args).await
    }

    /// # Errors
    /// Propagates statement errors unmodified.
    pub async fn execute_count(
        &mut self,
        text: &str,
        args: &[RowValues],
    ) -> Result<u64, AccessError> {
        let prepared = self.prepare(text, args);
        executor::execute(&mut *self.conn, &prepared).await
    }

    /// Always fails with [`AccessError::NestedTransaction`]; the callback is not run and no
    /// statement is sent.
    ///
    /// # Errors
    /// Always.
    #[allow(clippy::unused_async)]
    pub async fn transaction<T, E, F>(&mut self, _callback: F) -> Result<T, E>
    where
        F: for<'t> FnOnce(&'t mut Transaction<C>) -> ConnFuture<'t, T, E> + Send,
        E: From<AccessError>,
    {
        warn!("nested transaction rejected");
        Err(AccessError::NestedTransaction.into())
    }

    /// True until `COMMIT` or `ROLLBACK` succeeds.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.open
    }
}

impl<C: DriverConnection> Drop for Transaction<C> {
    fn drop(&mut self) {
        if self.open {
            warn!("transaction dropped while open; abandoning its connection");
            self.conn.abandon();
        }
    }
}
