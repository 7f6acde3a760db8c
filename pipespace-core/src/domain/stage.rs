//! Stage domain types

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One ordered phase of a pipeline
///
/// Order is not stored as an index: each stage references the stage before
/// it, and the head of the chain references 0. See [`crate::chain`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineStage {
    /// Store-assigned identity; 0 means "new, not yet persisted".
    pub id: i64,
    pub pipeline_id: i64,
    /// ID of the preceding stage, or 0 for the first stage.
    pub prev_stage_id: i64,
    pub name: String,
    pub trigger_mode: TriggerMode,
    pub jobs: Vec<PipelineJob>,
}

impl PipelineStage {
    /// Build an unsaved stage. Pipeline and chain links are assigned on save.
    pub fn new(name: impl Into<String>, trigger_mode: TriggerMode, jobs: Vec<PipelineJob>) -> Self {
        Self {
            id: 0,
            pipeline_id: 0,
            prev_stage_id: 0,
            name: name.into(),
            trigger_mode,
            jobs,
        }
    }

    pub fn is_new(&self) -> bool {
        self.id == 0
    }
}

/// Whether a stage starts as soon as its predecessor finishes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerMode {
    Auto,
    Manual,
}

/// A job executed by a stage through a plugin
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineJob {
    pub name: String,
    pub plugin_key: String,
    #[serde(default)]
    pub params: HashMap<String, serde_json::Value>,
}

impl PipelineJob {
    pub fn new(name: impl Into<String>, plugin_key: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            plugin_key: plugin_key.into(),
            params: HashMap::new(),
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.params.insert(key.into(), value);
        self
    }
}
