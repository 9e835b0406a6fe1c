//! Canonical task collection
//!
//! The single source of truth for every view. All mutation entry points
//! live here; no other module touches the canonical map directly, so the
//! "filtered view silently drops unrelated tasks" bug class cannot occur
//! by construction.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Mutex, PoisonError};

use tokio::sync::mpsc;

use crate::error::{MomentumError, Result};
use crate::model::{Task, TaskId};

/// Notification emitted after every canonical mutation. Consumers
/// recompute their projections on receipt; `IdentitySwapped` additionally
/// lets them rekey selection/expansion state in the same logical step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    Upserted(Vec<TaskId>),
    Removed(TaskId),
    IdentitySwapped { old: TaskId, new: TaskId },
}

/// In-memory, ordered-by-id map of all tasks owned by the session.
#[derive(Debug, Default)]
pub struct TaskStore {
    tasks: Mutex<BTreeMap<TaskId, Task>>,
    subscribers: Mutex<Vec<mpsc::UnboundedSender<StoreEvent>>>,
}

impl TaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<TaskId, Task>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a consumer; every mutation is delivered as a
    /// [`StoreEvent`]. Dropped receivers are pruned on the next emit.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<StoreEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        rx
    }

    fn emit(&self, event: StoreEvent) {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// Merge a set of updated/new tasks into the canonical collection.
    ///
    /// Every task in `tasks` overwrites its canonical entry; entries not
    /// mentioned are left untouched. A filtered view must never cause
    /// tasks outside its filter to disappear, so removal only happens for
    /// ids inside the caller's `scope` that are missing from `tasks`
    /// (deletions the view itself performed). Each such removal is
    /// delivered as its own `Removed` event.
    pub fn upsert(&self, tasks: Vec<Task>, scope: Option<&HashSet<TaskId>>) {
        let incoming: HashSet<TaskId> = tasks.iter().map(|t| t.id).collect();
        let ids: Vec<TaskId> = tasks.iter().map(|t| t.id).collect();

        let mut removed: Vec<TaskId> = Vec::new();
        let mut map = self.lock();
        if let Some(scope) = scope {
            map.retain(|id, _| {
                let keep = !scope.contains(id) || incoming.contains(id);
                if !keep {
                    removed.push(*id);
                }
                keep
            });
        }
        for task in tasks {
            map.insert(task.id, task);
        }
        drop(map);

        for id in removed {
            self.emit(StoreEvent::Removed(id));
        }
        if !ids.is_empty() {
            self.emit(StoreEvent::Upserted(ids));
        }
    }

    /// Replace the whole canonical collection with a fresh snapshot
    /// (initial load, or recovery after a failed optimistic update).
    pub fn replace_snapshot(&self, tasks: Vec<Task>) {
        let scope: HashSet<TaskId> = self.lock().keys().copied().collect();
        self.upsert(tasks, Some(&scope));
    }

    pub fn remove(&self, id: &TaskId) -> Option<Task> {
        let removed = self.lock().remove(id);
        if removed.is_some() {
            self.emit(StoreEvent::Removed(*id));
        }
        removed
    }

    /// Atomically rename a task's key and reconcile the server echo into
    /// its value. Used exactly once per task, at the draft -> persisted
    /// transition. `snapshot` is the local state captured when the create
    /// was issued; local edits made since then survive the swap.
    ///
    /// Subscribers receive `IdentitySwapped` so that any state keyed by
    /// the old id (view expansion, selection) is rekeyed in the same
    /// logical step.
    pub fn swap_identity(&self, old: TaskId, new: TaskId, snapshot: &Task, server: Task) -> Result<Task> {
        let merged = {
            let mut map = self.lock();
            let current = map.remove(&old).ok_or_else(|| {
                MomentumError::IdentitySwap(format!("no task with id {old} to swap"))
            })?;
            let merged = Task::merge_server_echo(&current, snapshot, server);
            map.insert(new, merged.clone());
            merged
        };
        self.emit(StoreEvent::IdentitySwapped { old, new });
        Ok(merged)
    }

    pub fn get(&self, id: &TaskId) -> Option<Task> {
        self.lock().get(id).cloned()
    }

    pub fn contains(&self, id: &TaskId) -> bool {
        self.lock().contains_key(id)
    }

    /// Clone of the full canonical collection, in id order.
    pub fn snapshot(&self) -> Vec<Task> {
        self.lock().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
