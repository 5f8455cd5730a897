//! State management for bulk job processes.
//!
//! This module provides:
//! - Process state machine logic
//! - Concurrent process and cancellation registries
//! - ProcessManager for coordinating multiple processes

pub mod manager;
pub mod process;
pub mod registry;
