//! Stage Repository
//!
//! Handles all database operations on the `pipeline_stages` table. Rows come
//! back in storage order; ordering by chain is the caller's job.

use pipespace_core::domain::stage::PipelineStage;
use sqlx::{Any, Executor};

use super::{mode_to_string, string_to_mode, to_json};

/// Insert a stage and return its generated ID
pub async fn create<'e, E>(executor: E, stage: &PipelineStage) -> Result<i64, sqlx::Error>
where
    E: Executor<'e, Database = Any>,
{
    let id = sqlx::query_scalar::<_, i64>(
        r#"
        INSERT INTO pipeline_stages (pipeline_id, prev_stage_id, name, trigger_mode, jobs)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id
        "#,
    )
    .bind(stage.pipeline_id)
    .bind(stage.prev_stage_id)
    .bind(&stage.name)
    .bind(mode_to_string(stage.trigger_mode))
    .bind(to_json(&stage.jobs)?)
    .fetch_one(executor)
    .await?;

    Ok(id)
}

/// Overwrite every field of a stage, including its chain link
///
/// Returns false when no stage with this ID belongs to `stage.pipeline_id`.
pub async fn update<'e, E>(executor: E, stage: &PipelineStage) -> Result<bool, sqlx::Error>
where
    E: Executor<'e, Database = Any>,
{
    let result = sqlx::query(
        r#"
        UPDATE pipeline_stages
        SET prev_stage_id = $1, name = $2, trigger_mode = $3, jobs = $4
        WHERE id = $5 AND pipeline_id = $6
        "#,
    )
    .bind(stage.prev_stage_id)
    .bind(&stage.name)
    .bind(mode_to_string(stage.trigger_mode))
    .bind(to_json(&stage.jobs)?)
    .bind(stage.id)
    .bind(stage.pipeline_id)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Find all stages of a pipeline, unordered by chain
pub async fn find_by_pipeline<'e, E>(
    executor: E,
    pipeline_id: i64,
) -> Result<Vec<PipelineStage>, sqlx::Error>
where
    E: Executor<'e, Database = Any>,
{
    let rows = sqlx::query_as::<_, StageRow>(
        r#"
        SELECT id, pipeline_id, prev_stage_id, name, trigger_mode, jobs
        FROM pipeline_stages
        WHERE pipeline_id = $1
        ORDER BY id ASC
        "#,
    )
    .bind(pipeline_id)
    .fetch_all(executor)
    .await?;

    Ok(rows.into_iter().map(|r| r.into()).collect())
}

/// Delete a single stage
pub async fn delete<'e, E>(executor: E, id: i64) -> Result<bool, sqlx::Error>
where
    E: Executor<'e, Database = Any>,
{
    let result = sqlx::query("DELETE FROM pipeline_stages WHERE id = $1")
        .bind(id)
        .execute(executor)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// Delete all stages of a pipeline
pub async fn delete_by_pipeline<'e, E>(executor: E, pipeline_id: i64) -> Result<u64, sqlx::Error>
where
    E: Executor<'e, Database = Any>,
{
    let result = sqlx::query("DELETE FROM pipeline_stages WHERE pipeline_id = $1")
        .bind(pipeline_id)
        .execute(executor)
        .await?;

    Ok(result.rows_affected())
}

/// Count the stages of a pipeline
pub async fn count_by_pipeline<'e, E>(executor: E, pipeline_id: i64) -> Result<i64, sqlx::Error>
where
    E: Executor<'e, Database = Any>,
{
    let count = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM pipeline_stages WHERE pipeline_id = $1",
    )
    .bind(pipeline_id)
    .fetch_one(executor)
    .await?;

    Ok(count)
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct StageRow {
    id: i64,
    pipeline_id: i64,
    prev_stage_id: i64,
    name: String,
    trigger_mode: String,
    jobs: String,
}

impl From<StageRow> for PipelineStage {
    fn from(row: StageRow) -> Self {
        let jobs = serde_json::from_str(&row.jobs).unwrap_or_default();

        PipelineStage {
            id: row.id,
            pipeline_id: row.pipeline_id,
            prev_stage_id: row.prev_stage_id,
            name: row.name,
            trigger_mode: string_to_mode(&row.trigger_mode),
            jobs,
        }
    }
}
