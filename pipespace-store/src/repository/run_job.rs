//! Run Job Repository
//!
//! Handles database operations on the `pipeline_run_jobs` table.

use pipespace_core::domain::run::PipelineRunJob;
use sqlx::{Any, Executor};

use super::{status_to_string, string_to_status, to_json};

/// Record a run job and return its generated ID
pub async fn create<'e, E>(executor: E, job: &PipelineRunJob) -> Result<i64, sqlx::Error>
where
    E: Executor<'e, Database = Any>,
{
    let id = sqlx::query_scalar::<_, i64>(
        r#"
        INSERT INTO pipeline_run_jobs (pipeline_run_id, stage_run_id, name, plugin_key, status, params)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING id
        "#,
    )
    .bind(job.pipeline_run_id)
    .bind(job.stage_run_id)
    .bind(&job.name)
    .bind(&job.plugin_key)
    .bind(status_to_string(job.status))
    .bind(to_json(&job.params)?)
    .fetch_one(executor)
    .await?;

    Ok(id)
}

/// Find the jobs executed by a run
pub async fn find_by_run<'e, E>(
    executor: E,
    pipeline_run_id: i64,
) -> Result<Vec<PipelineRunJob>, sqlx::Error>
where
    E: Executor<'e, Database = Any>,
{
    let rows = sqlx::query_as::<_, RunJobRow>(
        r#"
        SELECT id, pipeline_run_id, stage_run_id, name, plugin_key, status, params
        FROM pipeline_run_jobs
        WHERE pipeline_run_id = $1
        ORDER BY id ASC
        "#,
    )
    .bind(pipeline_run_id)
    .fetch_all(executor)
    .await?;

    Ok(rows.into_iter().map(|r| r.into()).collect())
}

/// Delete all jobs of a run
pub async fn delete_by_run<'e, E>(executor: E, pipeline_run_id: i64) -> Result<u64, sqlx::Error>
where
    E: Executor<'e, Database = Any>,
{
    let result = sqlx::query("DELETE FROM pipeline_run_jobs WHERE pipeline_run_id = $1")
        .bind(pipeline_run_id)
        .execute(executor)
        .await?;

    Ok(result.rows_affected())
}

/// Count the run jobs recorded across every run of a pipeline
pub async fn count_by_pipeline<'e, E>(executor: E, pipeline_id: i64) -> Result<i64, sqlx::Error>
where
    E: Executor<'e, Database = Any>,
{
    sqlx::query_scalar::<_, i64>(
        r#"
        SELECT COUNT(*)
        FROM pipeline_run_jobs j
        JOIN pipeline_runs r ON r.id = j.pipeline_run_id
        WHERE r.pipeline_id = $1
        "#,
    )
    .bind(pipeline_id)
    .fetch_one(executor)
    .await
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct RunJobRow {
    id: i64,
    pipeline_run_id: i64,
    stage_run_id: i64,
    name: String,
    plugin_key: String,
    status: String,
    params: String,
}

impl From<RunJobRow> for PipelineRunJob {
    fn from(row: RunJobRow) -> Self {
        let params = serde_json::from_str(&row.params).unwrap_or_default();

        PipelineRunJob {
            id: row.id,
            pipeline_run_id: row.pipeline_run_id,
            stage_run_id: row.stage_run_id,
            name: row.name,
            plugin_key: row.plugin_key,
            status: string_to_status(&row.status),
            params,
        }
    }
}
