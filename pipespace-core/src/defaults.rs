//! Built-in pipelines for code workspaces
//!
//! Every workspace backed by a code repository starts with two pipelines:
//! one building every non-trunk branch, and one building and releasing trunk.

use crate::domain::pipeline::{BranchType, Pipeline, PipelineSource, TriggerOperator};
use crate::domain::stage::{PipelineJob, PipelineStage, TriggerMode};

pub const TRUNK_BRANCH: &str = "master";

pub const PLUGIN_BUILD_CODE_TO_IMAGE: &str = "build_code_to_image";
pub const PLUGIN_RELEASE: &str = "release";

/// A pipeline definition together with its stages in order
pub type PipelineTemplate = (Pipeline, Vec<PipelineStage>);

/// Default pipelines for a new code workspace, in creation order
pub fn code_pipelines(workspace_id: i64, operator: &str) -> Vec<PipelineTemplate> {
    vec![
        branch_pipeline(workspace_id, operator),
        trunk_pipeline(workspace_id, operator),
    ]
}

fn branch_pipeline(workspace_id: i64, operator: &str) -> PipelineTemplate {
    let pipeline = Pipeline::new(
        workspace_id,
        "Branch pipeline",
        vec![PipelineSource::new(
            BranchType::Branch,
            TriggerOperator::Exclude,
            TRUNK_BRANCH,
        )],
        operator,
    );

    (pipeline, vec![build_stage()])
}

fn trunk_pipeline(workspace_id: i64, operator: &str) -> PipelineTemplate {
    let pipeline = Pipeline::new(
        workspace_id,
        "Trunk pipeline",
        vec![PipelineSource::new(
            BranchType::Branch,
            TriggerOperator::Equal,
            TRUNK_BRANCH,
        )],
        operator,
    );

    let release = PipelineStage::new(
        "Release",
        TriggerMode::Manual,
        vec![PipelineJob::new("Release", PLUGIN_RELEASE)],
    );

    (pipeline, vec![build_stage(), release])
}

fn build_stage() -> PipelineStage {
    PipelineStage::new(
        "Build code image",
        TriggerMode::Auto,
        vec![PipelineJob::new("Build code image", PLUGIN_BUILD_CODE_TO_IMAGE)],
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_branch_and_trunk_pipelines_split_refs() {
        let templates = code_pipelines(3, "admin");
        assert_eq!(templates.len(), 2);

        let (branch, branch_stages) = &templates[0];
        let (trunk, trunk_stages) = &templates[1];

        assert!(branch.is_triggered_by(BranchType::Branch, "feature/x"));
        assert!(!branch.is_triggered_by(BranchType::Branch, TRUNK_BRANCH));
        assert!(trunk.is_triggered_by(BranchType::Branch, TRUNK_BRANCH));
        assert!(!trunk.is_triggered_by(BranchType::Branch, "feature/x"));

        assert_eq!(branch_stages.len(), 1);
        assert_eq!(trunk_stages.len(), 2);
        assert_eq!(trunk_stages[1].trigger_mode, TriggerMode::Manual);
        assert_eq!(trunk_stages[1].jobs[0].plugin_key, PLUGIN_RELEASE);
    }

    #[test]
    fn test_templates_are_unsaved_and_scoped() {
        for (pipeline, stages) in code_pipelines(9, "bob") {
            assert_eq!(pipeline.id, 0);
            assert_eq!(pipeline.workspace_id, 9);
            assert_eq!(pipeline.create_user, "bob");
            assert!(stages.iter().all(|s| s.is_new()));
        }
    }
}
