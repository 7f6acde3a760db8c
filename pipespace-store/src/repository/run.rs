//! Run Repository
//!
//! Handles database operations on the `pipeline_runs` table. Runs are
//! recorded by the execution engine; the manager only reads them to find
//! what has to be erased with a pipeline.

use pipespace_core::domain::run::PipelineRun;
use sqlx::{Any, Executor};

use super::{status_to_string, string_to_status, string_to_time, time_to_string, to_json};

/// Record a run and return its generated ID
pub async fn create<'e, E>(executor: E, run: &PipelineRun) -> Result<i64, sqlx::Error>
where
    E: Executor<'e, Database = Any>,
{
    let id = sqlx::query_scalar::<_, i64>(
        r#"
        INSERT INTO pipeline_runs (
            pipeline_id, build_number, status, operator, params, created_at, updated_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING id
        "#,
    )
    .bind(run.pipeline_id)
    .bind(run.build_number)
    .bind(status_to_string(run.status))
    .bind(&run.operator)
    .bind(to_json(&run.params)?)
    .bind(time_to_string(&run.created_at))
    .bind(time_to_string(&run.updated_at))
    .fetch_one(executor)
    .await?;

    Ok(id)
}

/// Find the runs of a pipeline, newest first
pub async fn find_by_pipeline<'e, E>(
    executor: E,
    pipeline_id: i64,
) -> Result<Vec<PipelineRun>, sqlx::Error>
where
    E: Executor<'e, Database = Any>,
{
    let rows = sqlx::query_as::<_, RunRow>(
        r#"
        SELECT id, pipeline_id, build_number, status, operator, params, created_at, updated_at
        FROM pipeline_runs
        WHERE pipeline_id = $1
        ORDER BY id DESC
        "#,
    )
    .bind(pipeline_id)
    .fetch_all(executor)
    .await?;

    Ok(rows.into_iter().map(|r| r.into()).collect())
}

/// Delete all runs of a pipeline
pub async fn delete_by_pipeline<'e, E>(executor: E, pipeline_id: i64) -> Result<u64, sqlx::Error>
where
    E: Executor<'e, Database = Any>,
{
    let result = sqlx::query("DELETE FROM pipeline_runs WHERE pipeline_id = $1")
        .bind(pipeline_id)
        .execute(executor)
        .await?;

    Ok(result.rows_affected())
}

/// Count the runs of a pipeline
pub async fn count_by_pipeline<'e, E>(executor: E, pipeline_id: i64) -> Result<i64, sqlx::Error>
where
    E: Executor<'e, Database = Any>,
{
    sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM pipeline_runs WHERE pipeline_id = $1")
        .bind(pipeline_id)
        .fetch_one(executor)
        .await
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct RunRow {
    id: i64,
    pipeline_id: i64,
    build_number: i64,
    status: String,
    operator: String,
    params: String,
    created_at: String,
    updated_at: String,
}

impl From<RunRow> for PipelineRun {
    fn from(row: RunRow) -> Self {
        let params = serde_json::from_str(&row.params).unwrap_or_default();

        PipelineRun {
            id: row.id,
            pipeline_id: row.pipeline_id,
            build_number: row.build_number,
            status: string_to_status(&row.status),
            operator: row.operator,
            params,
            created_at: string_to_time(&row.created_at),
            updated_at: string_to_time(&row.updated_at),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;
    use pipespace_core::domain::run::RunStatus;

    #[tokio::test]
    async fn test_find_by_pipeline_newest_first() {
        let pool = testing::memory_pool().await;
        let pipeline_id = testing::insert_pipeline(&pool, 1, "ci").await;

        let mut ids = Vec::new();
        for build_number in 1..=3 {
            let run = testing::run(pipeline_id, build_number);
            ids.push(create(&pool, &run).await.unwrap());
        }

        let runs = find_by_pipeline(&pool, pipeline_id).await.unwrap();
        let found: Vec<i64> = runs.iter().map(|r| r.id).collect();
        ids.reverse();
        assert_eq!(found, ids);
        assert_eq!(runs[0].build_number, 3);
        assert_eq!(runs[0].status, RunStatus::Ok);
    }
}
