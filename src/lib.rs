//! Pooled PostgreSQL access with portable `?` placeholders, scoped transactions, and a
//! blocking bridge for callers that cannot `.await`.
//!
//! ```rust,no_run
//! use pg_access::prelude::*;
//!
//! # async fn demo() -> Result<(), AccessError> {
//! let db = pg_access::shared::database().await?;
//! let rows = db
//!     .query_entries("SELECT id, name FROM t WHERE id = ?", &[RowValues::Int(7)])
//!     .await?;
//! # let _ = rows;
//! # Ok(())
//! # }
//! ```

pub mod blocking;
pub mod bridge;
pub mod config;
pub mod database;
pub mod error;
mod executor;
pub mod pool;
pub mod postgres;
pub mod prelude;
pub mod results;
pub mod scoped;
pub mod shared;
pub mod transaction;
pub mod translation;
pub mod types;

#[cfg(feature = "test-utils")]
pub mod test_utils;

pub use blocking::{BlockingDatabase, BlockingTransaction};
pub use bridge::SyncBridge;
pub use config::PoolConfig;
pub use database::{ConnFuture, Database};
pub use error::AccessError;
pub use transaction::Transaction;
