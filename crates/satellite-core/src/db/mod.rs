//! Database access layer for PostgreSQL.

mod buckets;
mod ledger;
mod risk_state;
mod settings;

use crate::config::DatabaseConfig;
use crate::Result;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::path::Path;

/// Create a PostgreSQL connection pool.
pub async fn create_pool(config: &DatabaseConfig) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.url)
        .await?;

    Ok(pool)
}

/// Run database migrations from the migrations directory.
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    let migrator = sqlx::migrate::Migrator::new(Path::new("./migrations")).await?;
    migrator.run(pool).await?;
    Ok(())
}

/// PostgreSQL-backed [`crate::SatelliteStore`].
///
/// Ledger batches run inside one database transaction; balance rows are
/// locked with `SELECT ... FOR UPDATE` so concurrent writers to the same
/// (bucket, currency) serialize.
#[derive(Clone)]
pub struct PgSatelliteStore {
    pool: PgPool,
}

impl PgSatelliteStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}
