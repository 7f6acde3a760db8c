//! Repository Module
//!
//! Data access layer for the pipeline store.
//! Each repository handles database operations for one table. Functions that
//! run a single statement accept any executor, so they work both on the pool
//! and inside a [`crate::store::UnitOfWork`].

pub mod pipeline;
pub mod run;
pub mod run_job;
pub mod run_job_log;
pub mod run_stage;
pub mod stage;

// Re-export for convenience
pub use pipeline as pipeline_repository;
pub use run as run_repository;
pub use run_job as run_job_repository;
pub use run_job_log as run_job_log_repository;
pub use run_stage as run_stage_repository;
pub use stage as stage_repository;

use chrono::{DateTime, SecondsFormat, Utc};
use pipespace_core::domain::run::RunStatus;
use pipespace_core::domain::stage::TriggerMode;
use serde::Serialize;

// =============================================================================
// Helper Functions
// =============================================================================

fn time_to_string(time: &DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn string_to_time(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_default()
}

fn to_json<T: Serialize>(value: &T) -> Result<String, sqlx::Error> {
    serde_json::to_string(value).map_err(|e| sqlx::Error::Encode(Box::new(e)))
}

fn mode_to_string(mode: TriggerMode) -> &'static str {
    match mode {
        TriggerMode::Auto => "auto",
        TriggerMode::Manual => "manual",
    }
}

fn string_to_mode(s: &str) -> TriggerMode {
    match s {
        "manual" => TriggerMode::Manual,
        _ => TriggerMode::Auto,
    }
}

fn status_to_string(status: RunStatus) -> &'static str {
    match status {
        RunStatus::Wait => "wait",
        RunStatus::Doing => "doing",
        RunStatus::Ok => "ok",
        RunStatus::Error => "error",
        RunStatus::Cancel => "cancel",
    }
}

fn string_to_status(s: &str) -> RunStatus {
    match s {
        "doing" => RunStatus::Doing,
        "ok" => RunStatus::Ok,
        "error" => RunStatus::Error,
        "cancel" => RunStatus::Cancel,
        _ => RunStatus::Wait,
    }
}
