//! `PostgreSQL` pool for lines, history and appointments.
//!
//! Queries are built at runtime, so builds never need a live database.

use std::time::Duration;

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

use crate::error::DbError;

const MAX_CONNECTIONS: u32 = 10;
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

/// Connection pool handle to `PostgreSQL`.
#[derive(Clone)]
pub struct PostgresPool {
    pool: PgPool,
}

impl PostgresPool {
    fn options() -> PgPoolOptions {
        PgPoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .acquire_timeout(ACQUIRE_TIMEOUT)
    }

    /// Connect and verify the database is reachable.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the URL is invalid or the
    /// connection fails.
    pub async fn connect_url(url: &str) -> Result<Self, DbError> {
        let pool = Self::options().connect(url).await?;
        tracing::info!(max_connections = MAX_CONNECTIONS, "Connected to PostgreSQL");
        Ok(Self { pool })
    }

    /// Build a pool that opens its first connection on first use.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the URL is invalid.
    pub fn connect_lazy(url: &str) -> Result<Self, DbError> {
        let pool = Self::options().connect_lazy(url)?;
        Ok(Self { pool })
    }

    /// Apply pending migrations from `migrations/`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Migration`] if a migration fails.
    pub async fn run_migrations(&self) -> Result<(), DbError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        tracing::info!("Database migrations completed");
        Ok(())
    }

    /// The underlying [`PgPool`].
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }
}
