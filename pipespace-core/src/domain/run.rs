//! Run history domain types
//!
//! Records produced by the execution engine each time a pipeline is
//! triggered. This crate never creates them as part of a pipeline
//! definition change; they are only erased together with their pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::domain::stage::TriggerMode;

/// One execution of a pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRun {
    pub id: i64,
    pub pipeline_id: i64,
    pub build_number: i64,
    pub status: RunStatus,
    pub operator: String,
    pub params: HashMap<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Snapshot of a pipeline stage taken for one run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRunStage {
    pub id: i64,
    pub pipeline_run_id: i64,
    pub prev_stage_run_id: i64,
    pub name: String,
    pub trigger_mode: TriggerMode,
    pub status: RunStatus,
}

/// A job executed as part of a run stage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRunJob {
    pub id: i64,
    pub pipeline_run_id: i64,
    pub stage_run_id: i64,
    pub name: String,
    pub plugin_key: String,
    pub status: RunStatus,
    pub params: HashMap<String, serde_json::Value>,
}

/// Output captured for a run job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRunJobLog {
    pub id: i64,
    pub job_run_id: i64,
    pub logs: String,
    pub created_at: DateTime<Utc>,
}

/// Execution status shared by runs, run stages and run jobs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    Wait,
    Doing,
    Ok,
    Error,
    Cancel,
}
