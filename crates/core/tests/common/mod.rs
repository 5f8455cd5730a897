//! Common test utilities shared by the integration tests.
//!
//! This module provides:
//! - Test fixtures (directory snapshots, work items, wired orchestrators)
//! - Custom assertions on results, process records and event streams

pub mod assertions;
pub mod fixtures;

#[allow(unused_imports)]
pub use assertions::*;
#[allow(unused_imports)]
pub use fixtures::*;
