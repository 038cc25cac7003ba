//! Database module - PostgreSQL connection and schema

use std::fmt;
use std::time::Duration;

use sqlx::{postgres::PgPoolOptions, PgPool};

use crate::config::{redact_url, Config};

/// Which configured database the pool ended up on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOrigin {
    Primary,
    Fallback,
}

impl StoreOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreOrigin::Primary => "primary",
            StoreOrigin::Fallback => "fallback",
        }
    }
}

impl fmt::Display for StoreOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Create database connection pool
pub async fn create_pool(database_url: &str, connect_timeout: Duration) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(connect_timeout)
        .connect(database_url)
        .await
}

/// Connect to the primary database, falling back to the local one if the
/// primary cannot be reached.
pub async fn connect_with_fallback(config: &Config) -> Result<(PgPool, StoreOrigin), sqlx::Error> {
    match create_pool(&config.database_url, config.db_connect_timeout).await {
        Ok(pool) => {
            tracing::info!("Database connected: {}", redact_url(&config.database_url));
            Ok((pool, StoreOrigin::Primary))
        }
        Err(e) => {
            tracing::warn!("Primary database connection failed: {}", e);
            tracing::warn!("Falling back to {}", redact_url(&config.fallback_database_url));
            let pool = create_pool(&config.fallback_database_url, config.db_connect_timeout).await?;
            Ok((pool, StoreOrigin::Fallback))
        }
    }
}

/// Create the predictions table if it does not exist
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query(SCHEMA_SQL)
        .execute(pool)
        .await?;

    tracing::info!("Database schema applied successfully");
    Ok(())
}

/// Database schema SQL
const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS predictions (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    timestamp TIMESTAMPTZ NOT NULL,
    model VARCHAR(64) NOT NULL,
    features JSONB NOT NULL,
    prediction VARCHAR(255) NOT NULL,
    prediction_index INT NOT NULL,
    probabilities JSONB NOT NULL,
    confidence DOUBLE PRECISION NOT NULL
)
"#;
