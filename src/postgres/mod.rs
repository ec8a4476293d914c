// PostgreSQL backend:
// - pool: deadpool-postgres driver and borrowed connections
// - params: argument binding
// - query: row extraction
// - codec: wire formats for numeric, uuid, interval, inet

mod codec;
pub mod params;
pub mod pool;
pub mod query;

pub use params::Params;
pub use pool::{PgConnection, PgPool};
pub use query::{build_result_set, postgres_extract_value};
