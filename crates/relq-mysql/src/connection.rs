//! Database connection management

use relq_core::{RelqError, Result};
use relq_shared::{DatabaseConfig, ExponentialBackoff, RetryConfig};
use sqlx::mysql::{MySqlConnectOptions, MySqlPoolOptions};
use sqlx::{MySql, Pool, Row};
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, instrument};

/// Errors worth another connection attempt: the server may come up later,
/// but bad credentials or an unknown schema will not fix themselves.
fn is_transient(error: &sqlx::Error) -> bool {
    matches!(
        error,
        sqlx::Error::Io(_) | sqlx::Error::Tls(_) | sqlx::Error::PoolTimedOut
    )
}

/// MySQL connection manager
pub struct MySqlConnectionManager {
    pool: Pool<MySql>,
    schema: String,
}

impl MySqlConnectionManager {
    /// Create the connection pool, retrying with exponential backoff
    #[instrument(skip_all, fields(schema = %config.schema, max_connections = config.max_connections))]
    pub async fn connect(config: &DatabaseConfig, retry: &RetryConfig) -> Result<Self> {
        info!("Creating MySQL connection pool");

        let options = MySqlConnectOptions::from_str(&config.url)
            .map_err(|e| RelqError::Database(format!("Invalid connection options: {}", e)))?;
        let max_connections = config.max_connections;
        let acquire_timeout = Duration::from_secs(config.connection_timeout);
        let idle_timeout = Duration::from_secs(config.idle_timeout);

        let pool = ExponentialBackoff::new(retry.clone())
            .retry(
                || {
                    MySqlPoolOptions::new()
                        .max_connections(max_connections)
                        .acquire_timeout(acquire_timeout)
                        .idle_timeout(idle_timeout)
                        .connect_with(options.clone())
                },
                is_transient,
            )
            .await
            .map_err(|e| RelqError::Database(format!("Failed to create pool: {}", e)))?;

        Ok(Self {
            pool,
            schema: config.schema.clone(),
        })
    }

    /// Get the connection pool
    pub fn pool(&self) -> &Pool<MySql> {
        &self.pool
    }

    /// Schema whose tables queries are built against
    pub fn schema(&self) -> &str {
        &self.schema
    }

    /// Test database connectivity
    pub async fn test_connection(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| RelqError::Database(format!("Connection test failed: {}", e)))?;

        Ok(())
    }

    /// Get database version
    pub async fn get_version(&self) -> Result<String> {
        let row = sqlx::query("SELECT VERSION() as version")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| RelqError::Database(format!("Failed to get version: {}", e)))?;

        row.try_get("version")
            .map_err(|e| RelqError::Database(format!("Failed to read version: {}", e)))
    }
}
