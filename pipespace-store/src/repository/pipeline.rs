//! Pipeline Repository
//!
//! Handles all database operations on the `pipelines` table.

use pipespace_core::domain::pipeline::Pipeline;
use sqlx::{Any, Executor};

use super::{string_to_time, time_to_string, to_json};

/// Insert a pipeline and return its generated ID
///
/// The row starts at the version carried by `pipeline`.
pub async fn create<'e, E>(executor: E, pipeline: &Pipeline) -> Result<i64, sqlx::Error>
where
    E: Executor<'e, Database = Any>,
{
    let id = sqlx::query_scalar::<_, i64>(
        r#"
        INSERT INTO pipelines (
            workspace_id, name, sources, create_user, update_user,
            created_at, updated_at, version
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING id
        "#,
    )
    .bind(pipeline.workspace_id)
    .bind(&pipeline.name)
    .bind(to_json(&pipeline.sources)?)
    .bind(&pipeline.create_user)
    .bind(&pipeline.update_user)
    .bind(time_to_string(&pipeline.created_at))
    .bind(time_to_string(&pipeline.updated_at))
    .bind(pipeline.version)
    .fetch_one(executor)
    .await?;

    Ok(id)
}

/// Find a pipeline by ID
pub async fn find_by_id<'e, E>(executor: E, id: i64) -> Result<Option<Pipeline>, sqlx::Error>
where
    E: Executor<'e, Database = Any>,
{
    let row = sqlx::query_as::<_, PipelineRow>(
        r#"
        SELECT id, workspace_id, name, sources, create_user, update_user,
               created_at, updated_at, version
        FROM pipelines
        WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(executor)
    .await?;

    Ok(row.map(|r| r.into()))
}

/// List the pipelines of a workspace in creation order
pub async fn list_by_workspace<'e, E>(
    executor: E,
    workspace_id: i64,
) -> Result<Vec<Pipeline>, sqlx::Error>
where
    E: Executor<'e, Database = Any>,
{
    let rows = sqlx::query_as::<_, PipelineRow>(
        r#"
        SELECT id, workspace_id, name, sources, create_user, update_user,
               created_at, updated_at, version
        FROM pipelines
        WHERE workspace_id = $1
        ORDER BY id ASC
        "#,
    )
    .bind(workspace_id)
    .fetch_all(executor)
    .await?;

    Ok(rows.into_iter().map(|r| r.into()).collect())
}

/// Replace the mutable fields of a pipeline and bump its version
///
/// Only matches when the stored version equals `pipeline.version`; returns
/// false when the row is missing or was updated by someone else.
/// Workspace, creator and creation time are never rewritten.
pub async fn update<'e, E>(executor: E, pipeline: &Pipeline) -> Result<bool, sqlx::Error>
where
    E: Executor<'e, Database = Any>,
{
    let result = sqlx::query(
        r#"
        UPDATE pipelines
        SET name = $1, sources = $2, update_user = $3, updated_at = $4,
            version = version + 1
        WHERE id = $5 AND version = $6
        "#,
    )
    .bind(&pipeline.name)
    .bind(to_json(&pipeline.sources)?)
    .bind(&pipeline.update_user)
    .bind(time_to_string(&pipeline.updated_at))
    .bind(pipeline.id)
    .bind(pipeline.version)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Delete a pipeline by ID
pub async fn delete<'e, E>(executor: E, id: i64) -> Result<bool, sqlx::Error>
where
    E: Executor<'e, Database = Any>,
{
    let result = sqlx::query("DELETE FROM pipelines WHERE id = $1")
        .bind(id)
        .execute(executor)
        .await?;

    Ok(result.rows_affected() > 0)
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct PipelineRow {
    id: i64,
    workspace_id: i64,
    name: String,
    sources: String,
    create_user: String,
    update_user: String,
    created_at: String,
    updated_at: String,
    version: i64,
}

impl From<PipelineRow> for Pipeline {
    fn from(row: PipelineRow) -> Self {
        let sources = serde_json::from_str(&row.sources).unwrap_or_default();

        Pipeline {
            id: row.id,
            workspace_id: row.workspace_id,
            name: row.name,
            sources,
            create_user: row.create_user,
            update_user: row.update_user,
            created_at: string_to_time(&row.created_at),
            updated_at: string_to_time(&row.updated_at),
            version: row.version,
        }
    }
}
