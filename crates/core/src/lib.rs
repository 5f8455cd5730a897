//! # bk-core
//!
//! Bulk operation engine and job orchestrators for bulk-kit.
//!
//! This crate provides:
//! - Configuration loading from `.bulk-kit/` directory
//! - Collaborator traits for the remote directory and its sinks
//! - A generic job engine (concurrency gate, batch runner, result aggregation)
//! - The five orchestrators built on it
//! - Process registry and cancellation state
//!
//! ## Modules
//!
//! - [`collaborators`]: External systems and their in-memory doubles
//! - [`config`]: Configuration loading and management
//! - [`engine`]: Generic bulk job execution
//! - [`init`]: Project scaffolding from embedded templates
//! - [`jobs`]: Onboarding, lifecycle, school-year, health and reporting jobs
//! - [`state`]: Process state management

pub mod collaborators;
pub mod config;
pub mod engine;
pub mod init;
pub mod jobs;
pub mod state;
