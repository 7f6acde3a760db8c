use anyhow::Context;
use pipespace_store::config::StoreConfig;
use pipespace_store::db;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pipespace_store=debug,pipespace_migrate=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Pipespace migrations...");

    let config = StoreConfig::from_env().context("Invalid store configuration")?;
    let backend = config.backend()?;

    tracing::info!("Connecting to {:?} database...", backend);

    let pool = db::create_pool(&config)
        .await
        .context("Failed to create database pool")?;

    tracing::info!("Database connection pool created");

    db::run_migrations(&pool, backend)
        .await
        .context("Failed to run database migrations")?;

    pool.close().await;
    tracing::info!("Schema is up to date");

    Ok(())
}
