use std::sync::LazyLock;
use tokio::runtime::Runtime;

/// Runtime used to start and stop embedded servers outside of a test's own runtime.
pub(crate) static SHARED_RUNTIME: LazyLock<Runtime> =
    LazyLock::new(|| Runtime::new().expect("Failed to create tokio runtime for test utilities"));

/// Embedded `PostgreSQL` for live tests.
pub mod postgres;

pub use postgres::*;
