//! Core domain types
//!
//! This module contains the core domain structures used across Pipespace services.
//! These types represent the persisted pipeline definitions, the execution history
//! produced when a pipeline is triggered, and the identities that access them.

pub mod pipeline;
pub mod run;
pub mod stage;
pub mod user;
