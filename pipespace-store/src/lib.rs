//! Pipespace Store
//!
//! Persistence for pipeline definitions and their run history.
//!
//! This crate contains:
//! - Pool setup and schema migrations for Postgres and SQLite
//! - Repositories: one module of free functions per table
//! - Unit of work: one transaction per manager operation
//! - Pipeline manager: create, update, list, read and delete pipelines

pub mod auth;
pub mod config;
pub mod db;
pub mod repository;
pub mod service;
pub mod store;

#[cfg(test)]
mod testing;

pub use service::pipeline::{PipelineError, PipelineManager};
