use postgresql_embedded::PostgreSQL;

use super::SHARED_RUNTIME;
use crate::config::PoolConfig;

/// A running embedded `PostgreSQL` instance with one test database.
pub struct EmbeddedPostgres {
    pub postgresql: PostgreSQL,
    pub port: u16,
    pub database_url: String,
}

impl EmbeddedPostgres {
    /// Pool settings pointing at the test database.
    #[must_use]
    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig::new(self.database_url.clone())
    }
}

/// Start an embedded server and create `db_name` on it.
///
/// # Errors
/// Returns an error if the server cannot be set up or started, or the database cannot be
/// created.
pub fn setup_postgres_embedded(
    db_name: &str,
) -> Result<EmbeddedPostgres, Box<dyn std::error::Error>> {
    SHARED_RUNTIME.block_on(async {
        let mut postgresql = PostgreSQL::default();
        postgresql.setup().await?;
        postgresql.start().await?;
        postgresql.create_database(db_name).await?;

        let settings = postgresql.settings();
        let port = settings.port;
        let database_url = format!(
            "postgres://{}:{}@{}:{}/{}",
            settings.username, settings.password, settings.host, port, db_name
        );
        tracing::info!(port, "embedded postgres started");

        Ok(EmbeddedPostgres {
            postgresql,
            port,
            database_url,
        })
    })
}

/// Stop a previously started embedded server.
pub fn stop_postgres_embedded(postgres: EmbeddedPostgres) {
    let EmbeddedPostgres { postgresql, .. } = postgres;
    SHARED_RUNTIME.block_on(async move {
        let _ = postgresql.stop().await;
    });
}
