use anyhow::Context;
use sqlx::migrate::Migrator;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::path::Path;

use crate::config::Config;

pub async fn create_pool(config: &Config) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(&config.database_url)
        .await
}

pub async fn run_migrations(pool: &PgPool) -> anyhow::Result<()> {
    let migrator = Migrator::new(Path::new("./migrations"))
        .await
        .context("Failed to load migrations")?;
    migrator
        .run(pool)
        .await
        .context("Failed to run migrations")?;
    tracing::info!("Database migrations completed");
    Ok(())
}
