//! Process-wide access points.
//!
//! Both accessors create their state on first use from [`PoolConfig::from_env`] and keep
//! it for the life of the process; there is no teardown. Code that can be handed a
//! [`Database`] should take one as a parameter instead of calling these.
//!
//! The environment is read once. A configuration error is remembered and returned on
//! every later call. Failures after configuration (an unreachable server during the
//! startup check) are not remembered, so a later call tries again.

use std::sync::{Mutex, OnceLock, PoisonError};

use tokio::sync::OnceCell;

use crate::blocking::BlockingDatabase;
use crate::config::PoolConfig;
use crate::database::Database;
use crate::error::AccessError;
use crate::postgres::PgPool;

static CONFIG: OnceLock<Result<PoolConfig, String>> = OnceLock::new();
static DATABASE: OnceCell<Database<PgPool>> = OnceCell::const_new();
static BLOCKING: OnceLock<BlockingDatabase<PgPool>> = OnceLock::new();
static BLOCKING_INIT: Mutex<()> = Mutex::new(());

fn config() -> Result<PoolConfig, AccessError> {
    CONFIG
        .get_or_init(|| {
            PoolConfig::from_env().map_err(|e| match e {
                AccessError::Configuration(msg) => msg,
                other => other.to_string(),
            })
        })
        .clone()
        .map_err(AccessError::Configuration)
}

/// The process-wide pool facade.
///
/// The pool's connections are driven by the runtime of the first caller; use it from
/// that runtime.
///
/// # Errors
/// Returns the configuration error, or the pool's startup validation error.
pub async fn database() -> Result<&'static Database<PgPool>, AccessError> {
    DATABASE
        .get_or_try_init(|| async {
            let config = config()?;
            let pool = PgPool::connect(&config).await?;
            Ok(Database::new(pool).with_translation(config.translation))
        })
        .await
}

/// The process-wide blocking facade, with its own bridge runtime.
///
/// Must not be called from inside an async task; use [`database`] there.
///
/// # Errors
/// Returns the configuration error, or the pool's startup validation error.
pub fn blocking() -> Result<&'static BlockingDatabase<PgPool>, AccessError> {
    if let Some(db) = BLOCKING.get() {
        return Ok(db);
    }
    let _init = BLOCKING_INIT.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(db) = BLOCKING.get() {
        return Ok(db);
    }
    let db = BlockingDatabase::connect(config()?)?;
    Ok(BLOCKING.get_or_init(|| db))
}
