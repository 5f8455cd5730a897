//! Error types for the job engine.
//!
//! Only orchestrator-level problems are represented here. Per-item failures
//! never become an `EngineError`; they are recorded as result entries.

use crate::collaborators::CollaboratorError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// The request as a whole is malformed (e.g. empty item list).
    #[error("Invalid request: {0}")]
    Validation(String),

    /// The job's cancellation token fired.
    #[error("Operation was cancelled")]
    Cancelled,

    /// The concurrency gate was shut down.
    #[error("Concurrency gate is closed")]
    GateClosed,

    /// A precondition of the whole job failed before any item was attempted.
    #[error("Preflight check failed: {0}")]
    Preflight(String),

    /// The job itself panicked or its task was lost.
    #[error("Job aborted: {0}")]
    Aborted(String),

    /// A collaborator failed outside the per-item error boundary.
    #[error("Collaborator failure: {0}")]
    Collaborator(#[from] CollaboratorError),
}

/// Type alias for Result with EngineError.
pub type EngineResult<T> = Result<T, EngineError>;
