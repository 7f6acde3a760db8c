//! Pipeline domain types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Pipeline definition
///
/// A named, ordered CI/CD process scoped to a workspace. The ordered stages
/// are stored separately and read through the pipeline manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pipeline {
    /// Store-assigned identity; 0 until the pipeline is persisted.
    pub id: i64,
    /// Owning workspace. Never changes after creation.
    pub workspace_id: i64,
    pub name: String,
    /// Branch/tag filter rules deciding which refs trigger the pipeline.
    pub sources: Vec<PipelineSource>,
    pub create_user: String,
    pub update_user: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Optimistic concurrency counter, bumped on every update.
    pub version: i64,
}

impl Pipeline {
    /// Build an unsaved pipeline owned by `operator`.
    pub fn new(
        workspace_id: i64,
        name: impl Into<String>,
        sources: Vec<PipelineSource>,
        operator: impl Into<String>,
    ) -> Self {
        let operator = operator.into();
        let now = Utc::now();

        Self {
            id: 0,
            workspace_id,
            name: name.into(),
            sources,
            create_user: operator.clone(),
            update_user: operator,
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    /// Whether a push to the given ref should trigger this pipeline
    pub fn is_triggered_by(&self, branch_type: BranchType, name: &str) -> bool {
        self.sources.iter().any(|s| s.matches(branch_type, name))
    }
}

/// A trigger rule on the workspace's code repository
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineSource {
    pub branch_type: BranchType,
    pub operator: TriggerOperator,
    pub branch: String,
}

impl PipelineSource {
    pub fn new(branch_type: BranchType, operator: TriggerOperator, branch: impl Into<String>) -> Self {
        Self {
            branch_type,
            operator,
            branch: branch.into(),
        }
    }

    pub fn matches(&self, branch_type: BranchType, name: &str) -> bool {
        if self.branch_type != branch_type {
            return false;
        }

        match self.operator {
            TriggerOperator::Equal => self.branch == name,
            TriggerOperator::Exclude => self.branch != name,
        }
    }
}

/// Kind of git ref a source filters on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BranchType {
    Branch,
    Tag,
}

/// How a source compares its branch against the pushed ref
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerOperator {
    Equal,
    Exclude,
}
