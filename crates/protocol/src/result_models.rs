//! Outcome models returned to callers of the bulk orchestrators.

use crate::process_models::{ProcessStatus, ProcessType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

/// Identifier and display name of the entity an operation touched.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, TS)]
pub struct EntityRef {
    pub id: String,
    pub name: String,
}

impl EntityRef {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// One successful step for one work item.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, TS)]
pub struct OperationSuccess {
    /// Name of the step, e.g. `"OnboardUser"`.
    pub operation: String,
    pub entity_id: String,
    pub entity_name: String,
    pub message: String,

    /// Structured payload for jobs that produce more than a message
    /// (health measurements, export locations).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub details: Option<serde_json::Value>,
}

impl OperationSuccess {
    pub fn new(
        operation: impl Into<String>,
        entity: &EntityRef,
        message: impl Into<String>,
    ) -> Self {
        Self {
            operation: operation.into(),
            entity_id: entity.id.clone(),
            entity_name: entity.name.clone(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

/// One failed (or skipped) step for one work item.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, TS)]
pub struct OperationError {
    pub operation: String,
    pub entity_id: String,
    pub entity_name: String,
    pub message: String,

    /// Underlying failure reported by the collaborator, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub cause: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub details: Option<serde_json::Value>,
}

impl OperationError {
    pub fn new(
        operation: impl Into<String>,
        entity: &EntityRef,
        message: impl Into<String>,
    ) -> Self {
        Self {
            operation: operation.into(),
            entity_id: entity.id.clone(),
            entity_name: entity.name.clone(),
            message: message.into(),
            cause: None,
            details: None,
        }
    }

    pub fn with_cause(mut self, cause: impl ToString) -> Self {
        self.cause = Some(cause.to_string());
        self
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

/// Final, immutable outcome of one bulk job.
#[derive(Serialize, Deserialize, Debug, Clone, TS)]
pub struct BulkOperationResult {
    /// `None` when the request was rejected before a process was created.
    #[ts(type = "string | null")]
    pub process_id: Option<Uuid>,

    pub operation_type: ProcessType,

    /// Terminal status of the job.
    pub status: ProcessStatus,

    /// True if and only if `errors` is empty.
    pub success: bool,

    pub successful_operations: Vec<OperationSuccess>,
    pub errors: Vec<OperationError>,

    /// Items excluded from processing for a benign reason ("already archived").
    #[serde(default)]
    pub warnings: Vec<OperationError>,

    #[ts(type = "string")]
    pub processed_at: DateTime<Utc>,
}

impl BulkOperationResult {
    pub fn is_success(&self) -> bool {
        self.success
    }

    pub fn success_count(&self) -> usize {
        self.successful_operations.len()
    }

    pub fn error_count(&self) -> usize {
        self.errors.len()
    }
}
