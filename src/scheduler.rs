//! Write scheduler
//!
//! Owns every persistence call the session makes: per-task debouncing,
//! cancel-then-replace for superseded writes, and the pending-write set
//! that gates destructive session-ending actions. At most one write is
//! in flight per task id; writes for different ids are unordered.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::sleep;

use crate::client::{TaskClient, TaskPatch, TaskPayload};
use crate::error::MomentumError;
use crate::model::{Task, TaskId};
use crate::store::TaskStore;

/// How a write request is timed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Coalesce bursts of edits: the write fires after a quiet period.
    Debounced,
    /// Fire on the next tick with no delay.
    Immediate,
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Quiet period for [`WriteMode::Debounced`] writes.
    pub debounce: Duration,
    /// Owner id stamped on create payloads.
    pub owner_id: i64,
}

impl SchedulerConfig {
    pub fn new(owner_id: i64) -> Self {
        Self {
            debounce: Duration::from_millis(500),
            owner_id,
        }
    }
}

/// A persistence failure surfaced exactly once to the initiating view.
/// The optimistic local change is not rolled back; callers may reconcile
/// via a full snapshot reload instead.
#[derive(Debug)]
pub struct WriteFailure {
    pub task_id: TaskId,
    pub error: MomentumError,
}

enum WriteOp {
    Create { payload: TaskPayload, snapshot: Task },
    Update { patch: TaskPatch },
    Delete { server_id: i64 },
}

struct PendingWrite {
    handle: JoinHandle<()>,
    seq: u64,
}

#[derive(Default)]
struct PendingState {
    writes: HashMap<TaskId, PendingWrite>,
    next_seq: u64,
}

struct Shared<C> {
    store: Arc<TaskStore>,
    client: Arc<C>,
    config: SchedulerConfig,
    pending: Mutex<PendingState>,
    pending_gauge: watch::Sender<usize>,
    failures: mpsc::UnboundedSender<WriteFailure>,
    failures_rx: Mutex<Option<mpsc::UnboundedReceiver<WriteFailure>>>,
}

/// Cheap-clone handle; all clones share the same pending set.
pub struct WriteScheduler<C: TaskClient> {
    shared: Arc<Shared<C>>,
}

impl<C: TaskClient> Clone for WriteScheduler<C> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<C: TaskClient> WriteScheduler<C> {
    pub fn new(store: Arc<TaskStore>, client: Arc<C>, config: SchedulerConfig) -> Self {
        let (failures, failures_rx) = mpsc::unbounded_channel();
        Self {
            shared: Arc::new(Shared {
                store,
                client,
                config,
                pending: Mutex::new(PendingState::default()),
                pending_gauge: watch::Sender::new(0),
                failures,
                failures_rx: Mutex::new(Some(failures_rx)),
            }),
        }
    }

    pub fn store(&self) -> &Arc<TaskStore> {
        &self.shared.store
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.shared.config
    }

    /// Receiver for persistence failures. Can be taken once; the
    /// initiating view listens here for user-visible error reporting.
    pub fn take_failures(&self) -> Option<mpsc::UnboundedReceiver<WriteFailure>> {
        self.shared
            .failures_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    /// Flush a task's local state to the remote store.
    ///
    /// Cancels any pending write for the same id first (debounce timer or
    /// in-flight request), then schedules the new one. Updates for a
    /// temporary id are a no-op: draft edits are captured by the store
    /// and flushed by the commit flow.
    pub fn schedule_update(&self, id: TaskId, patch: TaskPatch, mode: WriteMode) {
        if id.is_temporary() {
            tracing::debug!(task_id = %id, "draft edit kept local until commit");
            return;
        }
        Shared::spawn_write(&self.shared, id, WriteOp::Update { patch }, mode);
    }

    /// Create the remote counterpart of a draft. Always immediate.
    ///
    /// `snapshot` is the draft as it looked at commit time; edits made
    /// while the create is in flight survive the identity swap and are
    /// flushed with one follow-up update.
    pub fn schedule_create(&self, id: TaskId, payload: TaskPayload, snapshot: Task) {
        Shared::spawn_write(
            &self.shared,
            id,
            WriteOp::Create { payload, snapshot },
            WriteMode::Immediate,
        );
    }

    /// Destroy a task: cancel its pending write, drop it from the
    /// canonical collection, then fire the remote delete. Drafts are
    /// purely local, so only persisted ids reach the remote store.
    pub fn delete_task(&self, id: TaskId) {
        self.cancel(&id);
        self.shared.store.remove(&id);
        if let Some(server_id) = id.persisted() {
            Shared::spawn_write(
                &self.shared,
                id,
                WriteOp::Delete { server_id },
                WriteMode::Immediate,
            );
        }
    }

    /// Cancel the pending write for `id`, if any. Cancellation mutates
    /// nothing and surfaces no error; it is expected, not exceptional.
    pub fn cancel(&self, id: &TaskId) {
        let mut state = self.shared.lock_pending();
        if let Some(prev) = state.writes.remove(id) {
            prev.handle.abort();
            tracing::trace!(task_id = %id, "canceled pending write");
        }
        let len = state.writes.len();
        drop(state);
        self.shared.pending_gauge.send_replace(len);
    }

    pub fn is_pending(&self, id: &TaskId) -> bool {
        self.shared.lock_pending().writes.contains_key(id)
    }

    /// Number of task ids with an active pending write; non-zero blocks
    /// page-leave/reload actions until cleared or user override.
    pub fn pending_count(&self) -> usize {
        self.shared.lock_pending().writes.len()
    }

    pub fn pending_ids(&self) -> Vec<TaskId> {
        self.shared.lock_pending().writes.keys().copied().collect()
    }

    /// Watch channel mirroring [`Self::pending_count`].
    pub fn pending_watch(&self) -> watch::Receiver<usize> {
        self.shared.pending_gauge.subscribe()
    }

    /// Resolve once no writes are pending.
    pub async fn wait_idle(&self) {
        let mut rx = self.shared.pending_gauge.subscribe();
        loop {
            if *rx.borrow_and_update() == 0 {
                return;
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

impl<C: TaskClient> Shared<C> {
    fn lock_pending(&self) -> std::sync::MutexGuard<'_, PendingState> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Cancel-then-replace: abort whatever is pending for `id` and
    /// install the new write in its place, all under one lock section.
    fn spawn_write(shared: &Arc<Self>, id: TaskId, op: WriteOp, mode: WriteMode) {
        let mut state = shared.lock_pending();
        state.next_seq += 1;
        let seq = state.next_seq;

        if let Some(prev) = state.writes.remove(&id) {
            prev.handle.abort();
            tracing::trace!(task_id = %id, "superseded pending write");
        }

        let worker = Arc::clone(shared);
        let handle = tokio::spawn(async move {
            if mode == WriteMode::Debounced {
                sleep(worker.config.debounce).await;
            }
            Shared::execute(&worker, id, op).await;
            worker.complete(id, seq);
        });

        state.writes.insert(id, PendingWrite { handle, seq });
        let len = state.writes.len();
        drop(state);
        shared.pending_gauge.send_replace(len);
    }

    /// Remove our own pending entry unless a newer write already took
    /// the slot.
    fn complete(&self, id: TaskId, seq: u64) {
        let mut state = self.lock_pending();
        if state.writes.get(&id).is_some_and(|w| w.seq == seq) {
            state.writes.remove(&id);
        }
        let len = state.writes.len();
        drop(state);
        self.pending_gauge.send_replace(len);
    }

    async fn execute(shared: &Arc<Self>, id: TaskId, op: WriteOp) {
        match op {
            WriteOp::Update { patch } => shared.execute_update(id, patch).await,
            WriteOp::Create { payload, snapshot } => {
                Shared::execute_create(shared, id, payload, snapshot).await
            },
            WriteOp::Delete { server_id } => shared.execute_delete(id, server_id).await,
        }
    }

    async fn execute_update(&self, id: TaskId, patch: TaskPatch) {
        let Some(server_id) = id.persisted() else {
            return;
        };
        // Pre-write snapshot: newer local edits beat the stale echo.
        let snapshot = self.store.get(&id);

        match self.client.update_task(server_id, &patch).await {
            Ok(remote) => {
                let server = remote.into_task();
                match (self.store.get(&id), snapshot) {
                    (Some(current), Some(snapshot)) => {
                        let merged = Task::merge_server_echo(&current, &snapshot, server);
                        self.store.upsert(vec![merged], None);
                    },
                    // Deleted locally while the write was in flight; the
                    // echo must not resurrect it.
                    (None, _) => {
                        tracing::debug!(task_id = %id, "dropping echo for locally removed task");
                    },
                    (Some(_), None) => {
                        self.store.upsert(vec![server], None);
                    },
                }
            },
            Err(error) => self.report_failure(id, error),
        }
    }

    async fn execute_create(shared: &Arc<Self>, id: TaskId, payload: TaskPayload, snapshot: Task) {
        match shared.client.create_task(&payload).await {
            Ok(remote) => {
                let server = remote.into_task();
                let new_id = server.id;
                match shared.store.swap_identity(id, new_id, &snapshot, server.clone()) {
                    Ok(merged) => {
                        tracing::debug!(old = %id, new = %new_id, "draft persisted");
                        // Edits that accumulated while the create was in
                        // flight still need flushing, as one update.
                        if merged != server {
                            let scheduler = WriteScheduler {
                                shared: Arc::clone(shared),
                            };
                            scheduler.schedule_update(
                                new_id,
                                TaskPatch::from_task(&merged),
                                WriteMode::Debounced,
                            );
                        }
                    },
                    Err(error) => shared.report_failure(id, error),
                }
            },
            Err(error) => shared.report_failure(id, error),
        }
    }

    async fn execute_delete(&self, id: TaskId, server_id: i64) {
        if let Err(error) = self.client.delete_task(server_id).await {
            self.report_failure(id, error);
        }
    }

    fn report_failure(&self, task_id: TaskId, error: MomentumError) {
        tracing::warn!(task_id = %task_id, error = %error, "persistence write failed");
        if self.failures.send(WriteFailure { task_id, error }).is_err() {
            tracing::debug!(task_id = %task_id, "no failure listener registered");
        }
    }
}
