//! Concurrent registries for live processes and their cancellation tokens.
//!
//! Both registries are backed by [`DashMap`], so status polling, updates from
//! the owning job and cancellation requests never contend on a global lock.

use bk_protocol::process_models::Process;
use chrono::{Duration, Utc};
use dashmap::DashMap;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Map from process id to the live [`Process`] record.
///
/// Readers receive clones. Each process id has a single writer (the job
/// that created it) plus the cancellation path, and every mutation goes
/// through [`ProcessRegistry::update`] which holds the shard lock only for
/// the duration of the closure.
#[derive(Debug, Default)]
pub struct ProcessRegistry {
    processes: DashMap<Uuid, Process>,
}

impl ProcessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a freshly created process. An existing entry with the same id is kept.
    pub fn register(&self, process: Process) -> bool {
        match self.processes.entry(process.id) {
            dashmap::mapref::entry::Entry::Occupied(_) => false,
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(process);
                true
            }
        }
    }

    /// A snapshot of the process, or `None` if unknown or already evicted.
    pub fn get(&self, id: Uuid) -> Option<Process> {
        self.processes.get(&id).map(|entry| entry.value().clone())
    }

    /// Apply `mutator` to the process in place.
    ///
    /// Returns `None` if the process is not registered.
    pub fn update<R>(&self, id: Uuid, mutator: impl FnOnce(&mut Process) -> R) -> Option<R> {
        self.processes
            .get_mut(&id)
            .map(|mut entry| mutator(entry.value_mut()))
    }

    /// All processes that have not reached a terminal status.
    pub fn list_active(&self) -> Vec<Process> {
        let mut active: Vec<Process> = self
            .processes
            .iter()
            .filter(|entry| !entry.status.is_terminal())
            .map(|entry| entry.value().clone())
            .collect();
        active.sort_by_key(|process| process.started_at);
        active
    }

    /// All registered processes, including finished ones still retained.
    pub fn list_all(&self) -> Vec<Process> {
        let mut all: Vec<Process> = self
            .processes
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        all.sort_by_key(|process| process.started_at);
        all
    }

    pub fn evict(&self, id: Uuid) -> Option<Process> {
        self.processes.remove(&id).map(|(_, process)| process)
    }

    /// Drop every terminal process that finished more than `retention` ago.
    ///
    /// Returns the evicted ids.
    pub fn evict_expired(&self, retention: Duration) -> Vec<Uuid> {
        let cutoff = Utc::now() - retention;
        let expired: Vec<Uuid> = self
            .processes
            .iter()
            .filter(|entry| entry.completed_at.is_some_and(|done| done <= cutoff))
            .map(|entry| *entry.key())
            .collect();
        for id in &expired {
            self.processes.remove(id);
        }
        expired
    }

    pub fn len(&self) -> usize {
        self.processes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processes.is_empty()
    }
}

/// Map from process id to the token that cancels it.
#[derive(Debug, Default)]
pub struct CancellationRegistry {
    tokens: DashMap<Uuid, CancellationToken>,
}

impl CancellationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create and store a token for `id`, returning a handle to it.
    pub fn create(&self, id: Uuid) -> CancellationToken {
        self.tokens.entry(id).or_default().value().clone()
    }

    /// Store an existing token for `id`, e.g. a child of another process' token.
    pub fn insert(&self, id: Uuid, token: CancellationToken) -> CancellationToken {
        self.tokens.insert(id, token.clone());
        token
    }

    pub fn get(&self, id: Uuid) -> Option<CancellationToken> {
        self.tokens.get(&id).map(|entry| entry.value().clone())
    }

    /// Signal the token for `id`.
    ///
    /// Returns `false` if there is no token. Signalling twice is harmless.
    pub fn cancel(&self, id: Uuid) -> bool {
        match self.tokens.get(&id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn remove(&self, id: Uuid) -> Option<CancellationToken> {
        self.tokens.remove(&id).map(|(_, token)| token)
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}
