//! # bk-protocol
//!
//! Shared data models for bulk-kit.
//!
//! This crate defines all shared data structures used for:
//! - Configuration file parsing (TOML config, YAML job files)
//! - Runtime process state of bulk jobs
//! - Job inputs, options and results
//! - Events streamed to observers
//!
//! ## Modules
//!
//! - [`config_models`]: Global configuration and job definitions
//! - [`entity_models`]: Directory entities (users, teams, departments, ...)
//! - [`job_models`]: Work items, options and auth context
//! - [`process_models`]: Runtime process state and status
//! - [`result_models`]: Bulk operation results
//! - [`ipc`]: Events for observers of running jobs
//!
//! ## Design Principles
//!
//! - Minimal dependencies: serde, ts-rs, uuid and chrono
//! - TypeScript generation: All types derive `TS` for client compatibility
//! - Independent compilation: No dependencies on other bulk-kit crates

pub mod config_models;
pub mod entity_models;
pub mod ipc;
pub mod job_models;
pub mod process_models;
pub mod result_models;

// Re-export all public types for convenience
pub use config_models::*;
pub use entity_models::*;
pub use ipc::*;
pub use job_models::*;
pub use process_models::*;
pub use result_models::*;
