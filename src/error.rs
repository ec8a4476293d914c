use thiserror::Error;

/// Every failure surfaced by the access layer.
///
/// Driver errors are carried unmodified (`Statement`, `Pool`); nothing here is retried.
#[derive(Debug, Error)]
pub enum AccessError {
    /// A required setting is missing or unparseable. Fatal for the process.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The pool could not hand out a connection.
    #[error(transparent)]
    Pool(#[from] deadpool_postgres::PoolError),

    /// A connection could not be acquired (non-pool drivers).
    #[error("Acquisition error: {0}")]
    Acquisition(String),

    /// The server rejected a statement (syntax, constraint, type mismatch, lost connection).
    #[error(transparent)]
    Statement(#[from] tokio_postgres::Error),

    #[error("SQL execution error: {0}")]
    Execution(String),

    /// `transaction` was invoked on a connection that already has one open.
    #[error("Nested transactions are not supported")]
    NestedTransaction,

    /// The synchronous bridge could not deliver an outcome.
    #[error("Bridge error: {0}")]
    Bridge(String),
}

impl AccessError {
    /// True for errors raised while borrowing a connection.
    #[must_use]
    pub fn is_acquisition(&self) -> bool {
        matches!(self, Self::Pool(_) | Self::Acquisition(_))
    }
}
