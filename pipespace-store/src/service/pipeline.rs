//! Pipeline Service
//!
//! Lifecycle of pipeline definitions: creating and replacing a pipeline
//! together with its ordered stages, reading them back in order, and erasing
//! a pipeline with its whole run history. Every mutation runs inside one
//! [`UnitOfWork`] and either fully commits or leaves nothing behind.

use chrono::Utc;
use pipespace_core::chain::{self, Rechain};
use pipespace_core::defaults;
use pipespace_core::domain::pipeline::Pipeline;
use pipespace_core::domain::stage::PipelineStage;
use pipespace_core::domain::user::{RoleType, User};
use sqlx::{AnyConnection, AnyPool};
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;

use crate::auth::{RoleChecker, ScopedResource};
use crate::repository::{
    pipeline_repository, run_job_log_repository, run_job_repository, run_repository,
    run_stage_repository, stage_repository,
};
use crate::store::UnitOfWork;

/// Service error type
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("pipeline {0} not found")]
    NotFound(i64),

    #[error("stage {stage_id} does not belong to pipeline {pipeline_id}")]
    StageNotFound { pipeline_id: i64, stage_id: i64 },

    #[error("pipeline {pipeline_id} was modified concurrently (expected version {expected_version})")]
    Conflict {
        pipeline_id: i64,
        expected_version: i64,
    },

    #[error("database error: {0}")]
    DatabaseError(#[from] sqlx::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;

/// Rows erased by a pipeline delete
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct DeleteSummary {
    runs: u64,
    run_stages: u64,
    run_jobs: u64,
    run_job_logs: u64,
    stages: u64,
}

/// Identity and link fields of caller stages, restored after a failed save
struct ChainFields(Vec<(i64, i64, i64)>);

impl ChainFields {
    fn capture(stages: &[PipelineStage]) -> Self {
        Self(
            stages
                .iter()
                .map(|s| (s.id, s.pipeline_id, s.prev_stage_id))
                .collect(),
        )
    }

    fn restore(self, stages: &mut [PipelineStage]) {
        for (stage, (id, pipeline_id, prev_stage_id)) in stages.iter_mut().zip(self.0) {
            stage.id = id;
            stage.pipeline_id = pipeline_id;
            stage.prev_stage_id = prev_stage_id;
        }
    }
}

/// Persists pipelines and their ordered stages
#[derive(Clone)]
pub struct PipelineManager {
    pool: AnyPool,
    roles: Arc<dyn RoleChecker>,
}

impl PipelineManager {
    pub fn new(pool: AnyPool, roles: Arc<dyn RoleChecker>) -> Self {
        Self { pool, roles }
    }

    /// Create a pipeline with its stages in the given order
    ///
    /// Stage IDs are ignored on input and written back into `stages` as they
    /// are assigned, together with owning pipeline and chain links. If the
    /// create fails nothing is stored and `stages` is left as it was passed.
    pub async fn create_pipeline(
        &self,
        pipeline: Pipeline,
        stages: &mut [PipelineStage],
    ) -> Result<Pipeline> {
        let saved = ChainFields::capture(stages);

        let mut uow = UnitOfWork::begin(&self.pool, "create_pipeline").await?;
        let result = insert_with_stages(uow.conn(), pipeline, stages).await;

        let pipeline = match uow.finish(result).await {
            Ok(pipeline) => pipeline,
            Err(err) => {
                saved.restore(stages);
                return Err(err);
            }
        };

        tracing::info!(
            "Pipeline created: {} ({}) with {} stages",
            pipeline.name,
            pipeline.id,
            stages.len()
        );

        Ok(pipeline)
    }

    /// Replace a pipeline and make `ordered_stages` its exact stage list
    ///
    /// Slice order always becomes the stored order, whatever the stages'
    /// previous positions. Stages with ID 0 are inserted, stages with an ID
    /// are overwritten, and stored stages missing from the slice are deleted.
    /// Non-zero IDs must be unique within the slice: a repeated ID leaves the
    /// stored chain without a head.
    ///
    /// `pipeline.version` must match the stored version; a stale version
    /// fails with [`PipelineError::Conflict`] and changes nothing. On any
    /// failure `ordered_stages` is left as it was passed.
    pub async fn update_pipeline(
        &self,
        pipeline: Pipeline,
        ordered_stages: &mut [PipelineStage],
    ) -> Result<Pipeline> {
        let saved = ChainFields::capture(ordered_stages);

        let mut uow = UnitOfWork::begin(&self.pool, "update_pipeline").await?;
        let result = replace_with_stages(uow.conn(), pipeline, ordered_stages).await;

        let pipeline = match uow.finish(result).await {
            Ok(pipeline) => pipeline,
            Err(err) => {
                saved.restore(ordered_stages);
                return Err(err);
            }
        };

        tracing::info!(
            "Pipeline updated: {} ({}) now at version {} with {} stages",
            pipeline.name,
            pipeline.id,
            pipeline.version,
            ordered_stages.len()
        );

        Ok(pipeline)
    }

    /// Get a pipeline by ID
    pub async fn get(&self, pipeline_id: i64) -> Result<Pipeline> {
        let pipeline = pipeline_repository::find_by_id(&self.pool, pipeline_id)
            .await?
            .ok_or(PipelineError::NotFound(pipeline_id))?;

        Ok(pipeline)
    }

    /// List the workspace's pipelines the user may view
    ///
    /// Pipelines the user has no viewer role on are left out silently.
    pub async fn list(&self, user: &User, workspace_id: i64) -> Result<Vec<Pipeline>> {
        let pipelines = pipeline_repository::list_by_workspace(&self.pool, workspace_id).await?;
        let total = pipelines.len();

        let visible: Vec<Pipeline> = pipelines
            .into_iter()
            .filter(|p| {
                self.roles.has_scope_role(
                    user,
                    &ScopedResource::pipeline(workspace_id, p.id, &p.name),
                    RoleType::Viewer,
                )
            })
            .collect();

        tracing::debug!(
            "Listed {} of {} pipelines in workspace {} for {}",
            visible.len(),
            total,
            workspace_id,
            user.name
        );

        Ok(visible)
    }

    /// Stages of a pipeline in chain order
    ///
    /// A broken chain is not an error: stages unreachable from the head are
    /// left out and a warning is logged.
    pub async fn stages(&self, pipeline_id: i64) -> Result<Vec<PipelineStage>> {
        let stored = stage_repository::find_by_pipeline(&self.pool, pipeline_id).await?;
        let total = stored.len();

        let ordered = chain::linearize(stored);
        if ordered.len() < total {
            tracing::warn!(
                "Pipeline {} has {} stage(s) unreachable from the head of its chain",
                pipeline_id,
                total - ordered.len()
            );
        }

        Ok(ordered)
    }

    /// Delete a pipeline, its stages and its whole run history
    ///
    /// Deleting a pipeline that is already gone succeeds and removes nothing.
    pub async fn delete(&self, pipeline_id: i64) -> Result<()> {
        let mut uow = UnitOfWork::begin(&self.pool, "delete_pipeline").await?;
        let result = cascade_delete(uow.conn(), pipeline_id).await;
        let summary = uow.finish(result).await?;

        tracing::info!(
            "Pipeline deleted: {} ({} stages, {} runs, {} run stages, {} run jobs, {} log chunks)",
            pipeline_id,
            summary.stages,
            summary.runs,
            summary.run_stages,
            summary.run_jobs,
            summary.run_job_logs
        );

        Ok(())
    }

    /// Create the built-in pipelines of a new code workspace
    ///
    /// All of them are created in one unit of work.
    pub async fn create_default_pipelines(
        &self,
        workspace_id: i64,
        operator: &str,
    ) -> Result<Vec<Pipeline>> {
        let templates = defaults::code_pipelines(workspace_id, operator);

        let mut uow = UnitOfWork::begin(&self.pool, "create_default_pipelines").await?;
        let result = insert_templates(uow.conn(), templates).await;
        let pipelines = uow.finish(result).await?;

        tracing::info!(
            "Created {} default pipelines in workspace {}",
            pipelines.len(),
            workspace_id
        );

        Ok(pipelines)
    }
}

// =============================================================================
// Transaction Bodies
// =============================================================================

async fn insert_with_stages(
    conn: &mut AnyConnection,
    mut pipeline: Pipeline,
    stages: &mut [PipelineStage],
) -> Result<Pipeline> {
    let now = Utc::now();
    pipeline.created_at = now;
    pipeline.updated_at = now;
    pipeline.version = 1;
    pipeline.id = pipeline_repository::create(&mut *conn, &pipeline).await?;

    let mut chain = Rechain::new();
    for stage in stages.iter_mut() {
        stage.pipeline_id = pipeline.id;
        chain.link(stage);
        stage.id = stage_repository::create(&mut *conn, stage).await?;
        chain.advance(stage.id);
    }

    Ok(pipeline)
}

async fn insert_templates(
    conn: &mut AnyConnection,
    templates: Vec<defaults::PipelineTemplate>,
) -> Result<Vec<Pipeline>> {
    let mut pipelines = Vec::with_capacity(templates.len());
    for (pipeline, mut stages) in templates {
        pipelines.push(insert_with_stages(&mut *conn, pipeline, &mut stages).await?);
    }

    Ok(pipelines)
}

async fn replace_with_stages(
    conn: &mut AnyConnection,
    mut pipeline: Pipeline,
    ordered_stages: &mut [PipelineStage],
) -> Result<Pipeline> {
    let pipeline_id = pipeline.id;
    let expected_version = pipeline.version;
    pipeline.updated_at = Utc::now();

    // Version-checked row update first: it also holds the row lock for the
    // rest of the transaction on backends with row locking.
    if !pipeline_repository::update(&mut *conn, &pipeline).await? {
        return Err(
            match pipeline_repository::find_by_id(&mut *conn, pipeline_id).await? {
                Some(_) => PipelineError::Conflict {
                    pipeline_id,
                    expected_version,
                },
                None => PipelineError::NotFound(pipeline_id),
            },
        );
    }

    let keep: HashSet<i64> = ordered_stages
        .iter()
        .filter(|s| !s.is_new())
        .map(|s| s.id)
        .collect();

    let existing = stage_repository::find_by_pipeline(&mut *conn, pipeline_id).await?;
    for stage in existing.iter().filter(|s| !keep.contains(&s.id)) {
        stage_repository::delete(&mut *conn, stage.id).await?;
        tracing::debug!("Removed stage {} from pipeline {}", stage.id, pipeline_id);
    }

    let mut chain = Rechain::new();
    for stage in ordered_stages.iter_mut() {
        stage.pipeline_id = pipeline_id;
        chain.link(stage);

        if stage.is_new() {
            stage.id = stage_repository::create(&mut *conn, stage).await?;
        } else if !stage_repository::update(&mut *conn, stage).await? {
            return Err(PipelineError::StageNotFound {
                pipeline_id,
                stage_id: stage.id,
            });
        }

        chain.advance(stage.id);
    }

    pipeline_repository::find_by_id(&mut *conn, pipeline_id)
        .await?
        .ok_or(PipelineError::NotFound(pipeline_id))
}

/// Erase leaf tables first so no foreign key is ever left dangling
async fn cascade_delete(conn: &mut AnyConnection, pipeline_id: i64) -> Result<DeleteSummary> {
    let mut summary = DeleteSummary::default();

    let runs = run_repository::find_by_pipeline(&mut *conn, pipeline_id).await?;
    for run in &runs {
        let jobs = run_job_repository::find_by_run(&mut *conn, run.id).await?;
        for job in &jobs {
            summary.run_job_logs += run_job_log_repository::delete_by_job(&mut *conn, job.id).await?;
        }
        summary.run_jobs += run_job_repository::delete_by_run(&mut *conn, run.id).await?;
        summary.run_stages += run_stage_repository::delete_by_run(&mut *conn, run.id).await?;
    }

    summary.runs = run_repository::delete_by_pipeline(&mut *conn, pipeline_id).await?;
    summary.stages = stage_repository::delete_by_pipeline(&mut *conn, pipeline_id).await?;

    if !pipeline_repository::delete(&mut *conn, pipeline_id).await? {
        tracing::debug!("Pipeline {} was already absent", pipeline_id);
    }

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{GrantTable, RoleGrant};
    use crate::testing;
    use pipespace_core::chain::{ChainError, HEAD};
    use pipespace_core::domain::pipeline::{BranchType, PipelineSource, TriggerOperator};
    use pipespace_core::domain::stage::TriggerMode;
    use pipespace_core::domain::user::RoleScope;

    fn manager(pool: &AnyPool) -> PipelineManager {
        PipelineManager::new(pool.clone(), Arc::new(GrantTable::new()))
    }

    fn pipeline(name: &str) -> Pipeline {
        Pipeline::new(
            1,
            name,
            vec![PipelineSource::new(
                BranchType::Branch,
                TriggerOperator::Equal,
                "master",
            )],
            "alice",
        )
    }

    fn stages(names: &[&str]) -> Vec<PipelineStage> {
        names.iter().map(|n| testing::stage(n)).collect()
    }

    fn names(stages: &[PipelineStage]) -> Vec<&str> {
        stages.iter().map(|s| s.name.as_str()).collect()
    }

    async fn fail_when(pool: &AnyPool, trigger: &str) {
        sqlx::query(trigger).execute(pool).await.unwrap();
    }

    #[tokio::test]
    async fn test_create_links_stages_in_order() {
        let pool = testing::memory_pool().await;
        let manager = manager(&pool);
        let mut input = stages(&["A", "B", "C"]);

        let created = manager
            .create_pipeline(pipeline("ci"), &mut input)
            .await
            .unwrap();
        assert!(created.id > 0);
        assert_eq!(created.version, 1);

        let stored = manager.stages(created.id).await.unwrap();
        assert_eq!(names(&stored), vec!["A", "B", "C"]);
        assert_eq!(stored[0].prev_stage_id, HEAD);
        assert_eq!(stored[1].prev_stage_id, stored[0].id);
        assert_eq!(stored[2].prev_stage_id, stored[1].id);

        // Caller's slice carries the assigned IDs and links
        assert_eq!(stored, input);

        let raw = stage_repository::find_by_pipeline(&pool, created.id)
            .await
            .unwrap();
        assert_eq!(raw.len(), 3);
        assert_eq!(chain::verify(&raw), Ok(()));
    }

    #[tokio::test]
    async fn test_create_ignores_supplied_stage_ids() {
        let pool = testing::memory_pool().await;
        let manager = manager(&pool);
        let mut input = stages(&["build", "test"]);
        input[0].id = 500;
        input[1].id = 7;

        let created = manager
            .create_pipeline(pipeline("ci"), &mut input)
            .await
            .unwrap();

        let stored = manager.stages(created.id).await.unwrap();
        assert_eq!(names(&stored), vec!["build", "test"]);
        assert_ne!(input[0].id, 500);
        assert_eq!(testing::count_rows(&pool, "pipeline_stages").await, 2);
    }

    #[tokio::test]
    async fn test_create_without_stages() {
        let pool = testing::memory_pool().await;
        let manager = manager(&pool);

        let created = manager
            .create_pipeline(pipeline("empty"), &mut [])
            .await
            .unwrap();

        assert!(manager.stages(created.id).await.unwrap().is_empty());
        assert_eq!(manager.get(created.id).await.unwrap().name, "empty");
    }

    #[tokio::test]
    async fn test_create_rolls_back_when_a_stage_insert_fails() {
        let pool = testing::memory_pool().await;
        let manager = manager(&pool);
        fail_when(
            &pool,
            r#"
            CREATE TRIGGER reject_third_stage BEFORE INSERT ON pipeline_stages
            WHEN NEW.name = 'stage-3'
            BEGIN SELECT RAISE(ABORT, 'stage insert rejected'); END
            "#,
        )
        .await;

        let mut input = stages(&["stage-1", "stage-2", "stage-3", "stage-4", "stage-5"]);
        let before = input.clone();
        let result = manager.create_pipeline(pipeline("ci"), &mut input).await;

        assert!(matches!(result, Err(PipelineError::DatabaseError(_))));
        assert_eq!(testing::count_rows(&pool, "pipelines").await, 0);
        assert_eq!(testing::count_rows(&pool, "pipeline_stages").await, 0);

        // IDs, owner and links written during the attempt are undone
        assert_eq!(input, before);
    }

    #[tokio::test]
    async fn test_update_reorders_to_input_order() {
        let pool = testing::memory_pool().await;
        let manager = manager(&pool);
        let mut input = stages(&["A", "B", "C"]);
        let created = manager
            .create_pipeline(pipeline("ci"), &mut input)
            .await
            .unwrap();
        let ids: Vec<i64> = input.iter().map(|s| s.id).collect();

        let mut reordered = vec![input[2].clone(), input[0].clone(), input[1].clone()];
        let updated = manager
            .update_pipeline(created, &mut reordered)
            .await
            .unwrap();
        assert_eq!(updated.version, 2);

        let stored = manager.stages(updated.id).await.unwrap();
        assert_eq!(names(&stored), vec!["C", "A", "B"]);
        assert_eq!(
            stored.iter().map(|s| s.id).collect::<Vec<_>>(),
            vec![ids[2], ids[0], ids[1]]
        );

        let raw = stage_repository::find_by_pipeline(&pool, updated.id)
            .await
            .unwrap();
        assert_eq!(raw.len(), 3);
        assert_eq!(chain::verify(&raw), Ok(()));
    }

    #[tokio::test]
    async fn test_update_deletes_omitted_stage_rows() {
        let pool = testing::memory_pool().await;
        let manager = manager(&pool);
        let mut input = stages(&["A", "B", "C"]);
        let created = manager
            .create_pipeline(pipeline("ci"), &mut input)
            .await
            .unwrap();
        let dropped = input[1].id;

        let mut kept = vec![input[0].clone(), input[2].clone()];
        manager.update_pipeline(created.clone(), &mut kept).await.unwrap();

        let stored = stage_repository::find_by_pipeline(&pool, created.id)
            .await
            .unwrap();
        assert_eq!(stored.len(), 2);
        assert!(stored.iter().all(|s| s.id != dropped));
        assert_eq!(names(&manager.stages(created.id).await.unwrap()), vec!["A", "C"]);
    }

    #[tokio::test]
    async fn test_update_inserts_new_and_overwrites_existing() {
        let pool = testing::memory_pool().await;
        let manager = manager(&pool);
        let mut input = stages(&["build", "deploy"]);
        let mut created = manager
            .create_pipeline(pipeline("ci"), &mut input)
            .await
            .unwrap();

        created.name = "renamed".to_string();
        created.update_user = "bob".to_string();
        let mut deploy = input[1].clone();
        deploy.trigger_mode = TriggerMode::Manual;
        let mut next = vec![input[0].clone(), testing::stage("test"), deploy];

        let updated = manager
            .update_pipeline(created.clone(), &mut next)
            .await
            .unwrap();
        assert_eq!(updated.name, "renamed");
        assert_eq!(updated.update_user, "bob");
        assert_eq!(updated.create_user, "alice");
        assert!(next[1].id > 0);

        let stored = manager.stages(created.id).await.unwrap();
        assert_eq!(names(&stored), vec!["build", "test", "deploy"]);
        assert_eq!(stored[2].trigger_mode, TriggerMode::Manual);
        assert_eq!(stored, next);
    }

    #[tokio::test]
    async fn test_update_with_stale_version_conflicts() {
        let pool = testing::memory_pool().await;
        let manager = manager(&pool);
        let mut input = stages(&["A", "B"]);
        let created = manager
            .create_pipeline(pipeline("ci"), &mut input)
            .await
            .unwrap();

        let mut first = vec![input[1].clone(), input[0].clone()];
        manager
            .update_pipeline(created.clone(), &mut first)
            .await
            .unwrap();

        // Second writer still holds version 1
        let mut second = vec![input[0].clone()];
        let result = manager.update_pipeline(created.clone(), &mut second).await;
        assert!(matches!(
            result,
            Err(PipelineError::Conflict {
                expected_version: 1,
                ..
            })
        ));

        let stored = manager.stages(created.id).await.unwrap();
        assert_eq!(names(&stored), vec!["B", "A"]);
    }

    #[tokio::test]
    async fn test_update_missing_pipeline() {
        let pool = testing::memory_pool().await;
        let manager = manager(&pool);
        let mut ghost = pipeline("ghost");
        ghost.id = 99;
        ghost.version = 1;

        let result = manager
            .update_pipeline(ghost, &mut stages(&["A"]))
            .await;
        assert!(matches!(result, Err(PipelineError::NotFound(99))));
        assert_eq!(testing::count_rows(&pool, "pipeline_stages").await, 0);
    }

    #[tokio::test]
    async fn test_update_rejects_stage_of_another_pipeline() {
        let pool = testing::memory_pool().await;
        let manager = manager(&pool);
        let mut own = stages(&["A", "B"]);
        let created = manager
            .create_pipeline(pipeline("own"), &mut own)
            .await
            .unwrap();
        let mut foreign = stages(&["X"]);
        manager
            .create_pipeline(pipeline("other"), &mut foreign)
            .await
            .unwrap();

        let mut next = vec![testing::stage("new"), own[0].clone(), foreign[0].clone()];
        let before = next.clone();
        let result = manager.update_pipeline(created.clone(), &mut next).await;

        assert!(matches!(
            result,
            Err(PipelineError::StageNotFound { stage_id, .. }) if stage_id == foreign[0].id
        ));
        assert_eq!(next, before);
        assert_eq!(next[2].pipeline_id, foreign[0].pipeline_id);

        // Nothing from the failed update survives, including B's removal
        let stored = manager.stages(created.id).await.unwrap();
        assert_eq!(stored, own);
        assert_eq!(manager.get(created.id).await.unwrap().version, 1);
    }

    #[tokio::test]
    async fn test_update_rolls_back_when_a_stage_write_fails() {
        let pool = testing::memory_pool().await;
        let manager = manager(&pool);
        let mut input = stages(&["A", "B", "C"]);
        let created = manager
            .create_pipeline(pipeline("ci"), &mut input)
            .await
            .unwrap();
        fail_when(
            &pool,
            r#"
            CREATE TRIGGER reject_rename BEFORE UPDATE ON pipeline_stages
            WHEN NEW.name = 'boom'
            BEGIN SELECT RAISE(ABORT, 'stage update rejected'); END
            "#,
        )
        .await;

        let mut renamed = input[0].clone();
        renamed.name = "boom".to_string();
        let mut next = vec![input[2].clone(), input[1].clone(), renamed];
        let result = manager.update_pipeline(created.clone(), &mut next).await;

        assert!(matches!(result, Err(PipelineError::DatabaseError(_))));
        let stored = manager.stages(created.id).await.unwrap();
        assert_eq!(names(&stored), vec!["A", "B", "C"]);
        assert_eq!(manager.get(created.id).await.unwrap().version, 1);
    }

    #[tokio::test]
    async fn test_update_with_repeated_stage_id_leaves_no_head() {
        let pool = testing::memory_pool().await;
        let manager = manager(&pool);
        let mut input = stages(&["A", "B"]);
        let created = manager
            .create_pipeline(pipeline("ci"), &mut input)
            .await
            .unwrap();

        // Unique IDs are the caller's responsibility
        let mut repeated = vec![input[0].clone(), input[1].clone(), input[0].clone()];
        manager
            .update_pipeline(created.clone(), &mut repeated)
            .await
            .unwrap();

        let raw = stage_repository::find_by_pipeline(&pool, created.id)
            .await
            .unwrap();
        assert_eq!(chain::verify(&raw), Err(ChainError::MissingHead));
        assert!(manager.stages(created.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_stages_returns_reachable_prefix_of_broken_chain() {
        let pool = testing::memory_pool().await;
        let manager = manager(&pool);
        let pipeline_id = testing::insert_pipeline(&pool, 1, "ci").await;

        let mut head = testing::stage("head");
        head.pipeline_id = pipeline_id;
        head.id = stage_repository::create(&pool, &head).await.unwrap();

        let mut next = testing::stage("next");
        next.pipeline_id = pipeline_id;
        next.prev_stage_id = head.id;
        stage_repository::create(&pool, &next).await.unwrap();

        let mut orphan = testing::stage("orphan");
        orphan.pipeline_id = pipeline_id;
        orphan.prev_stage_id = 12345;
        stage_repository::create(&pool, &orphan).await.unwrap();

        let stored = manager.stages(pipeline_id).await.unwrap();
        assert_eq!(names(&stored), vec!["head", "next"]);
    }

    #[tokio::test]
    async fn test_stages_of_unknown_pipeline_is_empty() {
        let pool = testing::memory_pool().await;
        assert!(manager(&pool).stages(404).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_removes_unreachable_stages() {
        let pool = testing::memory_pool().await;
        let manager = manager(&pool);
        let mut input = stages(&["A"]);
        let created = manager
            .create_pipeline(pipeline("ci"), &mut input)
            .await
            .unwrap();

        let mut orphan = testing::stage("orphan");
        orphan.pipeline_id = created.id;
        orphan.prev_stage_id = 12345;
        stage_repository::create(&pool, &orphan).await.unwrap();

        manager
            .update_pipeline(created.clone(), &mut input)
            .await
            .unwrap();

        assert_eq!(
            stage_repository::count_by_pipeline(&pool, created.id)
                .await
                .unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn test_get_missing_pipeline() {
        let pool = testing::memory_pool().await;
        let result = manager(&pool).get(1).await;
        assert!(matches!(result, Err(PipelineError::NotFound(1))));
    }

    #[tokio::test]
    async fn test_list_keeps_only_viewable_pipelines() {
        let pool = testing::memory_pool().await;
        let p1 = testing::insert_pipeline(&pool, 1, "p1").await;
        testing::insert_pipeline(&pool, 1, "p2").await;
        testing::insert_pipeline(&pool, 2, "p3").await;

        let roles = GrantTable::new().with_grant(RoleGrant::new(
            10,
            RoleScope::Pipeline,
            p1,
            RoleType::Viewer,
        ));
        let manager = PipelineManager::new(pool.clone(), Arc::new(roles));

        let user = User::new(10, "carol");
        let visible = manager.list(&user, 1).await.unwrap();
        assert_eq!(visible.iter().map(|p| p.id).collect::<Vec<_>>(), vec![p1]);

        let admin = User::super_admin(1, "root");
        assert_eq!(manager.list(&admin, 1).await.unwrap().len(), 2);
        assert!(manager.list(&user, 3).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_erases_pipeline_and_history() {
        let pool = testing::memory_pool().await;
        let manager = manager(&pool);

        let mut doomed_stages = stages(&["A", "B"]);
        let doomed = manager
            .create_pipeline(pipeline("doomed"), &mut doomed_stages)
            .await
            .unwrap();
        testing::seed_history(&pool, doomed.id, 2, 2, 2).await;

        let mut kept_stages = stages(&["X"]);
        let kept = manager
            .create_pipeline(pipeline("kept"), &mut kept_stages)
            .await
            .unwrap();
        testing::seed_history(&pool, kept.id, 1, 1, 1).await;

        manager.delete(doomed.id).await.unwrap();

        assert!(matches!(
            manager.get(doomed.id).await,
            Err(PipelineError::NotFound(_))
        ));
        assert_eq!(stage_repository::count_by_pipeline(&pool, doomed.id).await.unwrap(), 0);
        assert_eq!(run_repository::count_by_pipeline(&pool, doomed.id).await.unwrap(), 0);

        // Only the surviving pipeline's rows remain anywhere
        assert_eq!(testing::count_rows(&pool, "pipelines").await, 1);
        assert_eq!(testing::count_rows(&pool, "pipeline_stages").await, 1);
        assert_eq!(testing::count_rows(&pool, "pipeline_runs").await, 1);
        assert_eq!(testing::count_rows(&pool, "pipeline_run_stages").await, 1);
        assert_eq!(testing::count_rows(&pool, "pipeline_run_jobs").await, 1);
        assert_eq!(testing::count_rows(&pool, "pipeline_run_job_logs").await, 1);
        assert_eq!(
            run_job_log_repository::count_by_pipeline(&pool, kept.id)
                .await
                .unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn test_delete_is_all_or_nothing() {
        let pool = testing::memory_pool().await;
        let manager = manager(&pool);
        let mut input = stages(&["A"]);
        let created = manager
            .create_pipeline(pipeline("ci"), &mut input)
            .await
            .unwrap();
        testing::seed_history(&pool, created.id, 2, 1, 3).await;

        // Fails after every history table has already been cleared
        fail_when(
            &pool,
            r#"
            CREATE TRIGGER keep_stages BEFORE DELETE ON pipeline_stages
            BEGIN SELECT RAISE(ABORT, 'stage delete rejected'); END
            "#,
        )
        .await;

        let result = manager.delete(created.id).await;
        assert!(matches!(result, Err(PipelineError::DatabaseError(_))));

        assert!(manager.get(created.id).await.is_ok());
        assert_eq!(run_repository::count_by_pipeline(&pool, created.id).await.unwrap(), 2);
        assert_eq!(
            run_stage_repository::count_by_pipeline(&pool, created.id)
                .await
                .unwrap(),
            2
        );
        assert_eq!(
            run_job_repository::count_by_pipeline(&pool, created.id)
                .await
                .unwrap(),
            2
        );
        assert_eq!(
            run_job_log_repository::count_by_pipeline(&pool, created.id)
                .await
                .unwrap(),
            6
        );
    }

    #[tokio::test]
    async fn test_delete_missing_pipeline_succeeds() {
        let pool = testing::memory_pool().await;
        let manager = manager(&pool);
        let kept = testing::insert_pipeline(&pool, 1, "kept").await;

        assert!(manager.delete(8).await.is_ok());
        assert!(manager.get(kept).await.is_ok());
    }

    #[tokio::test]
    async fn test_create_default_pipelines() {
        let pool = testing::memory_pool().await;
        let manager = manager(&pool);

        let created = manager.create_default_pipelines(4, "admin").await.unwrap();
        assert_eq!(created.len(), 2);
        assert!(created.iter().all(|p| p.workspace_id == 4 && p.id > 0));

        let trunk = manager.stages(created[1].id).await.unwrap();
        assert_eq!(names(&trunk), vec!["Build code image", "Release"]);
        assert_eq!(trunk[1].trigger_mode, TriggerMode::Manual);
        assert_eq!(trunk[1].prev_stage_id, trunk[0].id);
    }
}
