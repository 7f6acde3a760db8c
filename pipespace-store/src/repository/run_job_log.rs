//! Run Job Log Repository
//!
//! Handles database operations on the `pipeline_run_job_logs` table.

use pipespace_core::domain::run::PipelineRunJobLog;
use sqlx::{Any, Executor};

use super::{string_to_time, time_to_string};

/// Append a log chunk for a run job and return its generated ID
pub async fn create<'e, E>(executor: E, log: &PipelineRunJobLog) -> Result<i64, sqlx::Error>
where
    E: Executor<'e, Database = Any>,
{
    let id = sqlx::query_scalar::<_, i64>(
        r#"
        INSERT INTO pipeline_run_job_logs (job_run_id, logs, created_at)
        VALUES ($1, $2, $3)
        RETURNING id
        "#,
    )
    .bind(log.job_run_id)
    .bind(&log.logs)
    .bind(time_to_string(&log.created_at))
    .fetch_one(executor)
    .await?;

    Ok(id)
}

/// Get all log chunks of a run job in write order
pub async fn find_by_job<'e, E>(
    executor: E,
    job_run_id: i64,
) -> Result<Vec<PipelineRunJobLog>, sqlx::Error>
where
    E: Executor<'e, Database = Any>,
{
    let rows = sqlx::query_as::<_, LogRow>(
        r#"
        SELECT id, job_run_id, logs, created_at
        FROM pipeline_run_job_logs
        WHERE job_run_id = $1
        ORDER BY id ASC
        "#,
    )
    .bind(job_run_id)
    .fetch_all(executor)
    .await?;

    Ok(rows.into_iter().map(|r| r.into()).collect())
}

/// Delete all logs of a run job
pub async fn delete_by_job<'e, E>(executor: E, job_run_id: i64) -> Result<u64, sqlx::Error>
where
    E: Executor<'e, Database = Any>,
{
    let result = sqlx::query("DELETE FROM pipeline_run_job_logs WHERE job_run_id = $1")
        .bind(job_run_id)
        .execute(executor)
        .await?;

    Ok(result.rows_affected())
}

/// Count the log chunks recorded across every run of a pipeline
pub async fn count_by_pipeline<'e, E>(executor: E, pipeline_id: i64) -> Result<i64, sqlx::Error>
where
    E: Executor<'e, Database = Any>,
{
    sqlx::query_scalar::<_, i64>(
        r#"
        SELECT COUNT(*)
        FROM pipeline_run_job_logs l
        JOIN pipeline_run_jobs j ON j.id = l.job_run_id
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
struct LogRow {
    id: i64,
    job_run_id: i64,
    logs: String,
    created_at: String,
}

impl From<LogRow> for PipelineRunJobLog {
    fn from(row: LogRow) -> Self {
        PipelineRunJobLog {
            id: row.id,
            job_run_id: row.job_run_id,
            logs: row.logs,
            created_at: string_to_time(&row.created_at),
        }
    }
}
