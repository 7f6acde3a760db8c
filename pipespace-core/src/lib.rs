//! Pipespace Core
//!
//! Core types and abstractions for Pipespace pipeline definitions.
//!
//! This crate contains:
//! - Domain types: Pipelines, their ordered stages, and run history records
//! - Stage chain: encoding stage order as previous-stage references
//! - Defaults: built-in pipelines seeded into new code workspaces

pub mod chain;
pub mod defaults;
pub mod domain;
