//! Draft lifecycle
//!
//! A "new task" starts as a client-only draft with a temporary identity.
//! It either becomes persisted (exactly once, via an atomic identity
//! swap) or is discarded without the remote store ever hearing about it.

use std::sync::Arc;

use chrono::NaiveDate;

use crate::client::{TaskClient, TaskPatch, TaskPayload};
use crate::model::{Lifecycle, Task, TaskId};
use crate::scheduler::{WriteMode, WriteScheduler};
use crate::store::TaskStore;

/// Defaults a new draft inherits from the view that requested it
/// (typically the active filter). When `goal_id` is set, `area_id` must
/// be the goal's area; the area is not independently editable while a
/// goal is assigned.
#[derive(Debug, Clone, Default)]
pub struct DraftPrefill {
    pub scheduled_date: Option<NaiveDate>,
    pub goal_id: Option<i64>,
    pub area_id: Option<i64>,
}

pub struct DraftLifecycle<C: TaskClient> {
    store: Arc<TaskStore>,
    scheduler: WriteScheduler<C>,
}

impl<C: TaskClient> DraftLifecycle<C> {
    pub fn new(store: Arc<TaskStore>, scheduler: WriteScheduler<C>) -> Self {
        Self { store, scheduler }
    }

    /// Create an empty draft with a temporary id and add it to the
    /// canonical collection immediately, so the originating view sees it
    /// on its next projection.
    pub fn begin_draft(&self, prefill: DraftPrefill) -> Task {
        let mut task = Task::new_draft();
        task.scheduled_date = prefill.scheduled_date;
        task.goal_id = prefill.goal_id;
        task.area_id = prefill.area_id;

        tracing::debug!(task_id = %task.id, "draft started");
        self.store.upsert(vec![task.clone()], None);
        task
    }

    /// Commit point for a draft (blur, explicit save, navigation-away).
    ///
    /// A whitespace-only title discards the draft: it is removed from the
    /// canonical collection and no create call is ever issued. Otherwise
    /// exactly one create is scheduled; on success the store swaps the
    /// temporary identity for the server one.
    ///
    /// Idempotent: an unknown id, a task that already left the draft
    /// state, or a create already in flight are all no-ops, so duplicate
    /// triggers (blur plus programmatic close) converge on one outcome.
    pub fn commit_or_discard(&self, id: TaskId, final_title: &str) {
        let Some(task) = self.store.get(&id) else {
            return;
        };
        if task.lifecycle != Lifecycle::Draft || !id.is_temporary() {
            return;
        }
        if self.scheduler.is_pending(&id) {
            tracing::debug!(task_id = %id, "commit already in flight");
            return;
        }

        let title = final_title.trim();
        if title.is_empty() {
            tracing::debug!(task_id = %id, "empty draft discarded");
            self.scheduler.cancel(&id);
            self.store.remove(&id);
            return;
        }

        let mut committed = task;
        committed.title = title.to_string();
        self.store.upsert(vec![committed.clone()], None);

        let payload = TaskPayload::from_task(&committed, self.scheduler.config().owner_id);
        self.scheduler.schedule_create(id, payload, committed);
    }

    /// State-settling point for recurrence: called when a view collapses
    /// or leaves edit mode for a task with a rule set. An invalid rule
    /// (weekly/monthly with no days selected) means "recurrence
    /// disabled": it is normalized to `None` locally and, for persisted
    /// tasks, that normalization is flushed immediately so a
    /// half-configured rule never persists as active.
    pub fn settle_recurrence(&self, id: TaskId) {
        let Some(mut task) = self.store.get(&id) else {
            return;
        };
        let valid = task.recurrence.as_ref().map(|rule| rule.is_valid());
        if valid != Some(false) {
            return;
        }

        tracing::debug!(task_id = %id, "normalizing invalid recurrence rule");
        task.recurrence = None;
        self.store.upsert(vec![task], None);

        if !id.is_temporary() {
            let patch = TaskPatch {
                recurrence: Some(None),
                ..TaskPatch::default()
            };
            self.scheduler.schedule_update(id, patch, WriteMode::Immediate);
        }
    }
}
