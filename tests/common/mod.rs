//! Common utilities for integration tests
//!
//! Provides a controllable in-memory implementation of the persistence
//! client: every call is recorded, responses can be held back behind a
//! gate to exercise in-flight races, and failures can be injected.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{NaiveDate, Utc};
use tokio::sync::watch;

use momentum_core::client::{RemoteTask, TaskClient, TaskPatch, TaskPayload};
use momentum_core::error::{MomentumError, Result};
use momentum_core::model::{Task, TaskId};
use momentum_core::scheduler::{SchedulerConfig, WriteScheduler};
use momentum_core::store::TaskStore;

pub const OWNER_ID: i64 = 1;

/// One recorded remote call.
#[derive(Debug, Clone)]
pub enum Call {
    Create(TaskPayload),
    Update(i64, TaskPatch),
    Delete(i64),
    List,
}

impl Call {
    pub fn is_create(&self) -> bool {
        matches!(self, Call::Create(_))
    }

    pub fn is_update(&self) -> bool {
        matches!(self, Call::Update(..))
    }

    pub fn is_delete(&self) -> bool {
        matches!(self, Call::Delete(_))
    }
}

/// Recording mock of the remote task store.
pub struct MockClient {
    calls: Mutex<Vec<Call>>,
    remote: Mutex<HashMap<i64, RemoteTask>>,
    next_id: AtomicI64,
    fail_writes: AtomicBool,
    gate: Mutex<Option<watch::Receiver<bool>>>,
}

impl MockClient {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            remote: Mutex::new(HashMap::new()),
            next_id: AtomicI64::new(100),
            fail_writes: AtomicBool::new(false),
            gate: Mutex::new(None),
        })
    }

    /// Hold every subsequent write until the returned sender transmits
    /// `true`; lets tests act while a request is "on the wire".
    pub fn hold_responses(&self) -> watch::Sender<bool> {
        let (tx, rx) = watch::channel(false);
        *self.gate.lock().unwrap_or_else(PoisonError::into_inner) = Some(rx);
        tx
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Seed the remote side for `list_tasks`.
    pub fn seed_remote(&self, tasks: Vec<RemoteTask>) {
        let mut remote = self.remote.lock().unwrap_or_else(PoisonError::into_inner);
        for task in tasks {
            remote.insert(task.id, task);
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn create_calls(&self) -> Vec<TaskPayload> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Create(payload) => Some(payload),
                _ => None,
            })
            .collect()
    }

    pub fn update_calls(&self) -> Vec<(i64, TaskPatch)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Update(id, patch) => Some((id, patch)),
                _ => None,
            })
            .collect()
    }

    pub fn delete_calls(&self) -> Vec<i64> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Delete(id) => Some(id),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: Call) {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(call);
    }

    async fn wait_gate(&self) {
        let gate = self
            .gate
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(mut rx) = gate {
            loop {
                if *rx.borrow_and_update() {
                    return;
                }
                if rx.changed().await.is_err() {
                    return;
                }
            }
        }
    }

    fn check_failure(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(MomentumError::RemoteRejected {
                status: 500,
                message: "injected failure".to_string(),
            });
        }
        Ok(())
    }
}

fn remote_from_payload(id: i64, payload: &TaskPayload) -> RemoteTask {
    RemoteTask {
        id,
        owner_id: payload.owner_id,
        title: payload.title.clone(),
        description: payload.description.clone(),
        checklist: payload.checklist.clone(),
        scheduled_date: payload.scheduled_date,
        completed: false,
        completed_at: None,
        recurrence: payload.recurrence.clone(),
        goal_id: payload.goal_id,
        area_id: payload.area_id,
        template_link_id: None,
        estimated_minutes: payload.estimated_minutes,
        importance: payload.importance,
        urgency: payload.urgency,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

fn apply_patch(task: &mut RemoteTask, patch: &TaskPatch) {
    if let Some(title) = &patch.title {
        task.title = title.clone();
    }
    if let Some(description) = &patch.description {
        task.description = description.clone();
    }
    if let Some(checklist) = &patch.checklist {
        task.checklist = checklist.clone();
    }
    if let Some(scheduled_date) = patch.scheduled_date {
        task.scheduled_date = scheduled_date;
    }
    if let Some(completed) = patch.completed {
        task.completed = completed;
    }
    if let Some(completed_at) = patch.completed_at {
        task.completed_at = completed_at;
    }
    if let Some(recurrence) = &patch.recurrence {
        task.recurrence = recurrence.clone();
    }
    if let Some(goal_id) = patch.goal_id {
        task.goal_id = goal_id;
    }
    if let Some(area_id) = patch.area_id {
        task.area_id = area_id;
    }
    if let Some(estimated_minutes) = patch.estimated_minutes {
        task.estimated_minutes = estimated_minutes;
    }
    if let Some(importance) = patch.importance {
        task.importance = importance;
    }
    if let Some(urgency) = patch.urgency {
        task.urgency = urgency;
    }
    task.updated_at = Utc::now();
}

impl TaskClient for MockClient {
    async fn create_task(&self, payload: &TaskPayload) -> Result<RemoteTask> {
        self.wait_gate().await;
        self.record(Call::Create(payload.clone()));
        self.check_failure()?;
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let task = remote_from_payload(id, payload);
        self.remote
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, task.clone());
        Ok(task)
    }

    async fn update_task(&self, id: i64, patch: &TaskPatch) -> Result<RemoteTask> {
        self.wait_gate().await;
        self.record(Call::Update(id, patch.clone()));
        self.check_failure()?;
        let mut remote = self.remote.lock().unwrap_or_else(PoisonError::into_inner);
        let task = remote
            .get_mut(&id)
            .ok_or(MomentumError::TaskNotFound(TaskId::Persisted(id)))?;
        apply_patch(task, patch);
        Ok(task.clone())
    }

    async fn delete_task(&self, id: i64) -> Result<()> {
        self.wait_gate().await;
        self.record(Call::Delete(id));
        self.check_failure()?;
        self.remote
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
        Ok(())
    }

    async fn list_tasks(
        &self,
        _owner_id: i64,
        _from: NaiveDate,
        _to: NaiveDate,
    ) -> Result<Vec<RemoteTask>> {
        self.record(Call::List);
        let remote = self.remote.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(remote.values().cloned().collect())
    }
}

/// Store + scheduler wired to a fresh mock client.
pub fn harness() -> (Arc<TaskStore>, WriteScheduler<MockClient>, Arc<MockClient>) {
    let store = Arc::new(TaskStore::new());
    let client = MockClient::new();
    let scheduler = WriteScheduler::new(
        Arc::clone(&store),
        Arc::clone(&client),
        SchedulerConfig::new(OWNER_ID),
    );
    (store, scheduler, client)
}

/// A persisted task already known to both sides, installed in the store
/// and on the mock's remote side.
pub fn seeded_task(store: &TaskStore, client: &MockClient, id: i64, title: &str) -> Task {
    let remote = RemoteTask {
        id,
        owner_id: OWNER_ID,
        title: title.to_string(),
        description: String::new(),
        checklist: Vec::new(),
        scheduled_date: None,
        completed: false,
        completed_at: None,
        recurrence: None,
        goal_id: None,
        area_id: None,
        template_link_id: None,
        estimated_minutes: 0,
        importance: false,
        urgency: false,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    };
    client.seed_remote(vec![remote.clone()]);
    let task = remote.into_task();
    store.upsert(vec![task.clone()], None);
    task
}

/// Let spawned scheduler tasks reach their first suspension point.
pub async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}
