pub mod base;
pub mod memory;

pub use base::{
    AuditEntry, AuditLog, CacheInvalidator, CollaboratorError, CollaboratorResult, Collaborators,
    DirectoryService, EntityChangeKind, ExportStore, HealthChecker, NotificationSink, CheckReport,
};
pub use memory::{DirectorySnapshot, InMemoryDirectory, CheckBehavior, Sandbox};
