//! Run Stage Repository
//!
//! Handles database operations on the `pipeline_run_stages` table.

use pipespace_core::domain::run::PipelineRunStage;
use sqlx::{Any, Executor};

use super::{mode_to_string, status_to_string, string_to_mode, string_to_status};

/// Record a run stage and return its generated ID
pub async fn create<'e, E>(executor: E, stage: &PipelineRunStage) -> Result<i64, sqlx::Error>
where
    E: Executor<'e, Database = Any>,
{
    let id = sqlx::query_scalar::<_, i64>(
        r#"
        INSERT INTO pipeline_run_stages (pipeline_run_id, prev_stage_run_id, name, trigger_mode, status)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id
        "#,
    )
    .bind(stage.pipeline_run_id)
    .bind(stage.prev_stage_run_id)
    .bind(&stage.name)
    .bind(mode_to_string(stage.trigger_mode))
    .bind(status_to_string(stage.status))
    .fetch_one(executor)
    .await?;

    Ok(id)
}

/// Find the stages recorded for a run
pub async fn find_by_run<'e, E>(
    executor: E,
    pipeline_run_id: i64,
) -> Result<Vec<PipelineRunStage>, sqlx::Error>
where
    E: Executor<'e, Database = Any>,
{
    let rows = sqlx::query_as::<_, RunStageRow>(
        r#"
        SELECT id, pipeline_run_id, prev_stage_run_id, name, trigger_mode, status
        FROM pipeline_run_stages
        WHERE pipeline_run_id = $1
        ORDER BY id ASC
        "#,
    )
    .bind(pipeline_run_id)
    .fetch_all(executor)
    .await?;

    Ok(rows.into_iter().map(|r| r.into()).collect())
}

/// Delete all stages recorded for a run
pub async fn delete_by_run<'e, E>(executor: E, pipeline_run_id: i64) -> Result<u64, sqlx::Error>
where
    E: Executor<'e, Database = Any>,
{
    let result = sqlx::query("DELETE FROM pipeline_run_stages WHERE pipeline_run_id = $1")
        .bind(pipeline_run_id)
        .execute(executor)
        .await?;

    Ok(result.rows_affected())
}

/// Count the run stages recorded across every run of a pipeline
pub async fn count_by_pipeline<'e, E>(executor: E, pipeline_id: i64) -> Result<i64, sqlx::Error>
where
    E: Executor<'e, Database = Any>,
{
    sqlx::query_scalar::<_, i64>(
        r#"
        SELECT COUNT(*)
        FROM pipeline_run_stages s
        JOIN pipeline_runs r ON r.id = s.pipeline_run_id
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
struct RunStageRow {
    id: i64,
    pipeline_run_id: i64,
    prev_stage_run_id: i64,
    name: String,
    trigger_mode: String,
    status: String,
}

impl From<RunStageRow> for PipelineRunStage {
    fn from(row: RunStageRow) -> Self {
        PipelineRunStage {
            id: row.id,
            pipeline_run_id: row.pipeline_run_id,
            prev_stage_run_id: row.prev_stage_run_id,
            name: row.name,
            trigger_mode: string_to_mode(&row.trigger_mode),
            status: string_to_status(&row.status),
        }
    }
}
