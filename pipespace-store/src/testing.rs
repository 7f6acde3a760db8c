//! Shared fixtures for store-backed tests

use chrono::Utc;
use pipespace_core::domain::pipeline::Pipeline;
use pipespace_core::domain::run::{
    PipelineRun, PipelineRunJob, PipelineRunJobLog, PipelineRunStage, RunStatus,
};
use pipespace_core::domain::stage::{PipelineJob, PipelineStage, TriggerMode};
use sqlx::AnyPool;
use std::collections::HashMap;

use crate::config::StoreConfig;
use crate::db::{self, Backend};
use crate::repository::{
    pipeline_repository, run_job_log_repository, run_job_repository, run_repository,
    run_stage_repository,
};

/// A migrated private in-memory database
pub async fn memory_pool() -> AnyPool {
    let config = StoreConfig::new("sqlite::memory:");
    let pool = db::create_pool(&config).await.expect("create pool");
    db::run_migrations(&pool, Backend::Sqlite)
        .await
        .expect("run migrations");
    pool
}

pub async fn count_rows(pool: &AnyPool, table: &str) -> i64 {
    sqlx::query_scalar::<_, i64>(&format!("SELECT COUNT(*) FROM {table}"))
        .fetch_one(pool)
        .await
        .expect("count rows")
}

pub async fn insert_pipeline(pool: &AnyPool, workspace_id: i64, name: &str) -> i64 {
    let mut pipeline = Pipeline::new(workspace_id, name, vec![], "tester");
    pipeline.version = 1;
    pipeline_repository::create(pool, &pipeline)
        .await
        .expect("insert pipeline")
}

pub fn stage(name: &str) -> PipelineStage {
    PipelineStage::new(
        name,
        TriggerMode::Auto,
        vec![PipelineJob::new(name, "shell")],
    )
}

pub fn run(pipeline_id: i64, build_number: i64) -> PipelineRun {
    PipelineRun {
        id: 0,
        pipeline_id,
        build_number,
        status: RunStatus::Ok,
        operator: "tester".to_string(),
        params: HashMap::new(),
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

/// Record `runs` runs, each with one stage, `jobs` jobs and `logs` logs per job
pub async fn seed_history(pool: &AnyPool, pipeline_id: i64, runs: i64, jobs: usize, logs: usize) {
    for build_number in 1..=runs {
        let run_id = run_repository::create(pool, &run(pipeline_id, build_number))
            .await
            .expect("insert run");

        let stage_run_id = run_stage_repository::create(
            pool,
            &PipelineRunStage {
                id: 0,
                pipeline_run_id: run_id,
                prev_stage_run_id: 0,
                name: "build".to_string(),
                trigger_mode: TriggerMode::Auto,
                status: RunStatus::Ok,
            },
        )
        .await
        .expect("insert run stage");

        for job in 0..jobs {
            let job_run_id = run_job_repository::create(
                pool,
                &PipelineRunJob {
                    id: 0,
                    pipeline_run_id: run_id,
                    stage_run_id,
                    name: format!("job-{job}"),
                    plugin_key: "shell".to_string(),
                    status: RunStatus::Ok,
                    params: HashMap::new(),
                },
            )
            .await
            .expect("insert run job");

            for line in 0..logs {
                run_job_log_repository::create(
                    pool,
                    &PipelineRunJobLog {
                        id: 0,
                        job_run_id,
                        logs: format!("line {line}"),
                        created_at: Utc::now(),
                    },
                )
                .await
                .expect("insert run job log");
            }
        }
    }
}
