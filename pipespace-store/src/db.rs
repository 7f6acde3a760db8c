use sqlx::{AnyPool, any::AnyPoolOptions};

use crate::config::StoreConfig;

/// Database engine behind the pool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Postgres,
    Sqlite,
}

impl Backend {
    /// Column definition for a store-generated 64-bit primary key
    fn identity_column(self) -> &'static str {
        match self {
            Backend::Postgres => "BIGINT GENERATED BY DEFAULT AS IDENTITY PRIMARY KEY",
            Backend::Sqlite => "INTEGER PRIMARY KEY AUTOINCREMENT",
        }
    }
}

pub async fn create_pool(config: &StoreConfig) -> Result<AnyPool, sqlx::Error> {
    sqlx::any::install_default_drivers();

    let mut options = AnyPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(config.acquire_timeout);

    if config.is_in_memory() {
        // Keep exactly one connection alive for the lifetime of the pool
        options = options
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None);
    }

    options.connect(&config.database_url).await
}

pub async fn run_migrations(pool: &AnyPool, backend: Backend) -> Result<(), sqlx::Error> {
    let id = backend.identity_column();

    // Create pipelines table
    sqlx::query(&format!(
        r#"
        CREATE TABLE IF NOT EXISTS pipelines (
            id {id},
            workspace_id BIGINT NOT NULL,
            name VARCHAR(255) NOT NULL,
            sources TEXT NOT NULL,
            create_user VARCHAR(255) NOT NULL,
            update_user VARCHAR(255) NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            version BIGINT NOT NULL DEFAULT 1
        )
        "#
    ))
    .execute(pool)
    .await?;

    // Create stages table. No uniqueness on prev_stage_id: relinking
    // during an update passes through states where two stages share it.
    sqlx::query(&format!(
        r#"
        CREATE TABLE IF NOT EXISTS pipeline_stages (
            id {id},
            pipeline_id BIGINT NOT NULL REFERENCES pipelines(id),
            prev_stage_id BIGINT NOT NULL DEFAULT 0,
            name VARCHAR(255) NOT NULL,
            trigger_mode VARCHAR(20) NOT NULL,
            jobs TEXT NOT NULL
        )
        "#
    ))
    .execute(pool)
    .await?;

    // Create run history tables
    sqlx::query(&format!(
        r#"
        CREATE TABLE IF NOT EXISTS pipeline_runs (
            id {id},
            pipeline_id BIGINT NOT NULL REFERENCES pipelines(id),
            build_number BIGINT NOT NULL,
            status VARCHAR(20) NOT NULL,
            operator VARCHAR(255) NOT NULL,
            params TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#
    ))
    .execute(pool)
    .await?;

    sqlx::query(&format!(
        r#"
        CREATE TABLE IF NOT EXISTS pipeline_run_stages (
            id {id},
            pipeline_run_id BIGINT NOT NULL REFERENCES pipeline_runs(id),
            prev_stage_run_id BIGINT NOT NULL DEFAULT 0,
            name VARCHAR(255) NOT NULL,
            trigger_mode VARCHAR(20) NOT NULL,
            status VARCHAR(20) NOT NULL
        )
        "#
    ))
    .execute(pool)
    .await?;

    sqlx::query(&format!(
        r#"
        CREATE TABLE IF NOT EXISTS pipeline_run_jobs (
            id {id},
            pipeline_run_id BIGINT NOT NULL REFERENCES pipeline_runs(id),
            stage_run_id BIGINT NOT NULL REFERENCES pipeline_run_stages(id),
            name VARCHAR(255) NOT NULL,
            plugin_key VARCHAR(255) NOT NULL,
            status VARCHAR(20) NOT NULL,
            params TEXT NOT NULL
        )
        "#
    ))
    .execute(pool)
    .await?;

    sqlx::query(&format!(
        r#"
        CREATE TABLE IF NOT EXISTS pipeline_run_job_logs (
            id {id},
            job_run_id BIGINT NOT NULL REFERENCES pipeline_run_jobs(id),
            logs TEXT NOT NULL,
            created_at TEXT NOT NULL
        )
        "#
    ))
    .execute(pool)
    .await?;

    // Create indexes for the lookups the manager performs
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_pipelines_workspace_id ON pipelines(workspace_id)")
        .execute(pool)
        .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_pipeline_stages_pipeline_id ON pipeline_stages(pipeline_id)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_pipeline_runs_pipeline_id ON pipeline_runs(pipeline_id)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_pipeline_run_stages_run_id ON pipeline_run_stages(pipeline_run_id)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_pipeline_run_jobs_run_id ON pipeline_run_jobs(pipeline_run_id)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_pipeline_run_job_logs_job_id ON pipeline_run_job_logs(job_run_id)",
    )
    .execute(pool)
    .await?;

    tracing::info!("Database migrations completed successfully");
    Ok(())
}
