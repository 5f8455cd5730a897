//! Event stream protocol.
//!
//! This module defines the message types the core sends to whoever is
//! watching bulk jobs (an admin UI, the CLI). Events are delivered over an
//! asynchronous channel so that job execution never blocks on a slow viewer.
//!
//! Uses tagged enum serialization for TypeScript compatibility:
//! ```json
//! {
//!   "type": "processProgress",
//!   "payload": {
//!     "process_id": "uuid-here",
//!     "percent": 40,
//!     "label": "Batch 2/5"
//!   }
//! }
//! ```

use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

use crate::process_models::{ProcessStatus, ProcessType};

/// Importance of a user-facing notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "lowercase")]
pub enum NotificationSeverity {
    Info,
    Success,
    Warning,
    Error,
}

/// Events sent from the core to observers.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum Event {
    /// A new process has been registered.
    ProcessStarted {
        #[ts(type = "string")]
        process_id: Uuid,
        process_type: ProcessType,
        total_items: usize,
    },

    /// Progress of a running process.
    ProcessProgress {
        #[ts(type = "string")]
        process_id: Uuid,
        percent: u8,
        label: String,
    },

    /// A process reached a terminal status.
    ProcessFinished {
        #[ts(type = "string")]
        process_id: Uuid,
        status: ProcessStatus,
        succeeded: usize,
        failed: usize,
    },

    /// A message addressed to a user.
    Notification {
        recipient: String,
        message: String,
        severity: NotificationSeverity,
    },
}
