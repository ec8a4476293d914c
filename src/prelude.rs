//! Convenient imports for common functionality.

pub use crate::blocking::{BlockingDatabase, BlockingTransaction};
pub use crate::bridge::SyncBridge;
pub use crate::config::{ConnectionArgs, PoolConfig};
pub use crate::database::{ConnFuture, Database};
pub use crate::error::AccessError;
pub use crate::pool::{Driver, DriverConnection};
pub use crate::postgres::{PgConnection, PgPool};
pub use crate::results::{EntryRow, ResultSet};
pub use crate::transaction::Transaction;
pub use crate::translation::{
    PreparedQuery, TranslationMode, count_placeholders, translate_placeholders,
};
pub use crate::types::RowValues;
