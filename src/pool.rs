//! The seam between the access layer and a pooled database driver.
//!
//! [`Database`](crate::Database) only talks to these traits, so the pool can be the real
//! `deadpool-postgres` one ([`PgPool`](crate::postgres::PgPool)) or an in-memory fake in tests.

use async_trait::async_trait;

use crate::error::AccessError;
use crate::results::ResultSet;
use crate::types::RowValues;

/// A bounded pool of connections.
///
/// `acquire` waits while every connection is borrowed. Dropping the returned connection
/// hands it back to the pool; that drop is the only release path.
#[async_trait]
pub trait Driver: Send + Sync + 'static {
    type Connection: DriverConnection;

    /// Borrow one connection.
    ///
    /// # Errors
    /// Returns an acquisition error when the pool cannot produce a connection.
    async fn acquire(&self) -> Result<Self::Connection, AccessError>;
}

/// One borrowed session.
#[async_trait]
pub trait DriverConnection: Send + 'static {
    /// Run a statement and collect its rows together with the column names.
    ///
    /// # Errors
    /// Propagates the driver's statement error unmodified.
    async fn query(&mut self, sql: &str, args: &[RowValues]) -> Result<ResultSet, AccessError>;

    /// Run a statement and return the affected row count.
    ///
    /// # Errors
    /// Propagates the driver's statement error unmodified.
    async fn execute(&mut self, sql: &str, args: &[RowValues]) -> Result<u64, AccessError>;

    /// Run raw statement text without parameters (`BEGIN`, `COMMIT`, `ROLLBACK`).
    ///
    /// # Errors
    /// Propagates the driver's statement error unmodified.
    async fn batch_execute(&mut self, sql: &str) -> Result<(), AccessError>;

    /// Called instead of a plain drop when a transaction is still open on this connection.
    ///
    /// Implementations must make sure the open transaction never reaches the next borrower.
    fn abandon_transaction(self);
}
