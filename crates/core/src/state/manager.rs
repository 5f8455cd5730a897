//! Process manager shared by every orchestrator.
//!
//! The ProcessManager owns the process registry and the cancellation
//! registry. Orchestrators register their jobs here, report progress through
//! it, and external callers use it to poll status and request cancellation.

use crate::state::process::{cancel_process, set_operation, set_progress};
use crate::state::registry::{CancellationRegistry, ProcessRegistry};
use bk_protocol::ipc::Event;
use bk_protocol::process_models::Process;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

/// Default time a finished process stays visible to status polls.
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(300);

/// Coordinates the registries of all in-flight bulk jobs.
///
/// Cloning a ProcessManager is cheap; all clones share the same registries.
#[derive(Clone)]
pub struct ProcessManager {
    processes: Arc<ProcessRegistry>,
    tokens: Arc<CancellationRegistry>,
    retention: Duration,
    events_tx: Option<mpsc::Sender<Event>>,
}

impl Default for ProcessManager {
    fn default() -> Self {
        Self::new(DEFAULT_RETENTION)
    }
}

impl ProcessManager {
    /// Create a new ProcessManager.
    ///
    /// # Arguments
    ///
    /// * `retention` - How long a finished process remains queryable before eviction
    pub fn new(retention: Duration) -> Self {
        Self {
            processes: Arc::new(ProcessRegistry::new()),
            tokens: Arc::new(CancellationRegistry::new()),
            retention,
            events_tx: None,
        }
    }

    /// Stream lifecycle events of every process to `events_tx`.
    ///
    /// Events are sent with `try_send`: an observer that falls behind loses
    /// events instead of slowing jobs down.
    pub fn with_events(mut self, events_tx: mpsc::Sender<Event>) -> Self {
        self.events_tx = Some(events_tx);
        self
    }

    pub fn retention(&self) -> Duration {
        self.retention
    }

    /// Register a new process and create its cancellation token.
    pub fn begin(&self, process: Process) -> CancellationToken {
        let id = process.id;
        self.register(process, |tokens| tokens.create(id))
    }

    /// Register a process that runs on behalf of another one.
    ///
    /// The returned token is a child of `parent`: cancelling the parent
    /// cancels this process too, while cancelling this process leaves the
    /// parent running.
    pub fn begin_child(&self, process: Process, parent: &CancellationToken) -> CancellationToken {
        let id = process.id;
        self.register(process, |tokens| tokens.insert(id, parent.child_token()))
    }

    fn register(
        &self,
        process: Process,
        token: impl FnOnce(&CancellationRegistry) -> CancellationToken,
    ) -> CancellationToken {
        let id = process.id;
        let event = Event::ProcessStarted {
            process_id: id,
            process_type: process.process_type,
            total_items: process.total_items,
        };
        info!(
            process_id = %id,
            process_type = %process.process_type,
            total_items = process.total_items,
            "process registered"
        );
        self.processes.register(process);
        let token = token(&self.tokens);
        self.emit(event);
        token
    }

    /// Apply `mutator` to the live process record.
    pub fn update<R>(&self, id: Uuid, mutator: impl FnOnce(&mut Process) -> R) -> Option<R> {
        self.processes.update(id, mutator)
    }

    /// Set the phase label (and optionally the phase percentage) and notify observers.
    pub fn report_progress(&self, id: Uuid, label: &str, percent: Option<u8>) {
        let percent = self.processes.update(id, |process| {
            set_operation(process, label);
            if let Some(percent) = percent {
                set_progress(process, percent);
            }
            process.progress_percent
        });
        if let Some(percent) = percent {
            self.emit(Event::ProcessProgress {
                process_id: id,
                percent,
                label: label.to_string(),
            });
        }
    }

    /// Get the current state of a process.
    ///
    /// `None` means the process never existed or finished and expired.
    pub fn get_process(&self, id: Uuid) -> Option<Process> {
        self.processes.get(id)
    }

    /// All processes that are still running.
    pub fn list_active_processes(&self) -> Vec<Process> {
        self.processes.list_active()
    }

    /// All retained processes, running or recently finished.
    pub fn list_processes(&self) -> Vec<Process> {
        self.processes.list_all()
    }

    /// Request cooperative cancellation of a running process.
    ///
    /// Signals the process token and marks the process `Cancelled`
    /// immediately. Returns `true` only if a running process was found; an
    /// unknown id, or a process that already finished (including one
    /// cancelled earlier), returns `false` and changes nothing.
    pub fn cancel_process(&self, id: Uuid) -> bool {
        let cancelled = self
            .processes
            .update(id, cancel_process)
            .unwrap_or(false);
        if cancelled {
            self.tokens.cancel(id);
            info!(process_id = %id, "cancellation requested");
        }
        cancelled
    }

    /// Mark the end of a process: emit the final event and schedule eviction.
    pub fn finish(&self, id: Uuid) {
        self.tokens.remove(id);
        if let Some(process) = self.processes.get(id) {
            self.emit(Event::ProcessFinished {
                process_id: id,
                status: process.status,
                succeeded: process.processed_items,
                failed: process.failed_items,
            });
        }
        self.schedule_eviction(id);
    }

    /// Evict `id` from both registries once the retention window has elapsed.
    pub fn schedule_eviction(&self, id: Uuid) {
        let processes = Arc::clone(&self.processes);
        let tokens = Arc::clone(&self.tokens);
        let retention = self.retention;
        tokio::spawn(async move {
            tokio::time::sleep(retention).await;
            processes.evict(id);
            tokens.remove(id);
            debug!(process_id = %id, "process evicted");
        });
    }

    /// Evict every finished process older than the retention window.
    pub fn evict_expired(&self) -> usize {
        let retention = chrono::Duration::from_std(self.retention)
            .unwrap_or_else(|_| chrono::Duration::seconds(0));
        let evicted = self.processes.evict_expired(retention);
        for id in &evicted {
            self.tokens.remove(*id);
        }
        evicted.len()
    }

    fn emit(&self, event: Event) {
        if let Some(tx) = &self.events_tx {
            let _ = tx.try_send(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::process::{complete_process, create_process};
    use bk_protocol::process_models::{ProcessStatus, ProcessType};

    fn new_process() -> Process {
        create_process(ProcessType::Onboarding, vec!["u-1".to_string()], "admin")
    }

    #[tokio::test]
    async fn test_process_manager_new() {
        let manager = ProcessManager::default();
        assert!(manager.list_active_processes().is_empty());
        assert_eq!(manager.retention(), DEFAULT_RETENTION);
    }

    #[tokio::test]
    async fn test_begin_registers_and_emits() {
        let (tx, mut rx) = mpsc::channel(10);
        let manager = ProcessManager::default().with_events(tx);
        let process = new_process();
        let id = process.id;

        let token = manager.begin(process);
        assert!(!token.is_cancelled());
        assert_eq!(manager.list_active_processes().len(), 1);

        let event = rx.recv().await.unwrap();
        assert!(matches!(
            event,
            Event::ProcessStarted { process_id, total_items: 1, .. } if process_id == id
        ));
    }

    #[tokio::test]
    async fn test_cancel_process_marks_cancelled() {
        let manager = ProcessManager::default();
        let process = new_process();
        let id = process.id;
        let token = manager.begin(process);

        assert!(manager.cancel_process(id));
        assert!(token.is_cancelled());

        let snapshot = manager.get_process(id).unwrap();
        assert_eq!(snapshot.status, ProcessStatus::Cancelled);
        assert!(snapshot.completed_at.is_some());

        // Second request is a no-op.
        assert!(!manager.cancel_process(id));
        assert_eq!(manager.get_process(id).unwrap().completed_at, snapshot.completed_at);
    }

    #[tokio::test]
    async fn test_child_follows_parent_cancellation() {
        let manager = ProcessManager::default();
        let parent = new_process();
        let parent_id = parent.id;
        let parent_token = manager.begin(parent);

        let first = new_process();
        let first_id = first.id;
        let first_token = manager.begin_child(first, &parent_token);
        let second = new_process();
        let second_token = manager.begin_child(second, &parent_token);

        // Cancelling a child leaves the parent and its siblings alone.
        assert!(manager.cancel_process(first_id));
        assert!(first_token.is_cancelled());
        assert!(!parent_token.is_cancelled());
        assert!(!second_token.is_cancelled());

        assert!(manager.cancel_process(parent_id));
        assert!(second_token.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancel_unknown_process() {
        let manager = ProcessManager::default();
        let process = new_process();
        let id = process.id;
        manager.begin(process);

        assert!(!manager.cancel_process(Uuid::new_v4()));
        assert_eq!(manager.get_process(id).unwrap().status, ProcessStatus::Running);
    }

    #[tokio::test]
    async fn test_cancel_finished_process_is_noop() {
        let manager = ProcessManager::default();
        let process = new_process();
        let id = process.id;
        let token = manager.begin(process);
        manager.update(id, |p| complete_process(p, false));

        assert!(!manager.cancel_process(id));
        assert!(!token.is_cancelled());
        assert_eq!(manager.get_process(id).unwrap().status, ProcessStatus::Completed);
    }

    #[tokio::test]
    async fn test_report_progress_updates_label() {
        let (tx, mut rx) = mpsc::channel(10);
        let manager = ProcessManager::default().with_events(tx);
        let process = new_process();
        let id = process.id;
        manager.begin(process);
        let _ = rx.recv().await;

        manager.report_progress(id, "Rendering", Some(70));

        let snapshot = manager.get_process(id).unwrap();
        assert_eq!(snapshot.current_operation, "Rendering");
        assert_eq!(snapshot.progress_percent, 70);
        assert!(matches!(rx.recv().await.unwrap(), Event::ProcessProgress { percent: 70, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_finished_process_is_evicted_after_retention() {
        let manager = ProcessManager::new(Duration::from_secs(30));
        let process = new_process();
        let id = process.id;
        manager.begin(process);
        manager.update(id, |p| complete_process(p, false));
        manager.finish(id);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(manager.get_process(id).is_some());

        tokio::time::sleep(Duration::from_secs(25)).await;
        assert!(manager.get_process(id).is_none());
    }

    #[tokio::test]
    async fn test_evict_expired_sweeps_old_processes() {
        let manager = ProcessManager::new(Duration::from_secs(0));
        let process = new_process();
        let id = process.id;
        manager.begin(process);
        manager.update(id, |p| complete_process(p, false));

        assert_eq!(manager.evict_expired(), 1);
        assert!(manager.get_process(id).is_none());
    }
}
