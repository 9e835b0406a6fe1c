//! Persistence client
//!
//! The remote store is a plain CRUD endpoint; this module defines the
//! trait the scheduler writes through, the wire payload shapes, and the
//! reqwest-backed implementation. Cancellation is cooperative: dropping
//! a returned future (the scheduler aborts the tokio task driving it)
//! abandons the request.

use std::future::Future;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{MomentumError, Result};
use crate::model::{ChecklistItem, Lifecycle, RecurrenceRule, Task, TaskId};

/// Create body: everything the remote store needs for a brand-new task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskPayload {
    pub owner_id: i64,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub checklist: Vec<ChecklistItem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheduled_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recurrence: Option<RecurrenceRule>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub goal_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub area_id: Option<i64>,
    pub estimated_minutes: u32,
    pub importance: bool,
    pub urgency: bool,
}

impl TaskPayload {
    /// Build the create body from a local draft.
    pub fn from_task(task: &Task, owner_id: i64) -> Self {
        Self {
            owner_id,
            title: task.title.clone(),
            description: task.description.clone(),
            checklist: task.checklist.clone(),
            scheduled_date: task.scheduled_date,
            recurrence: task.recurrence.clone(),
            goal_id: task.goal_id,
            area_id: task.area_id,
            estimated_minutes: task.estimated_minutes,
            importance: task.importance,
            urgency: task.urgency,
        }
    }
}

/// Partial update body. Omitted fields are left unchanged server-side,
/// so every field is optional and absent unless explicitly set.
/// `recurrence` is doubly-optional: `Some(None)` clears the rule.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checklist: Option<Vec<ChecklistItem>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheduled_date: Option<Option<NaiveDate>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<Option<NaiveDate>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recurrence: Option<Option<RecurrenceRule>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub goal_id: Option<Option<i64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub area_id: Option<Option<i64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_minutes: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub importance: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub urgency: Option<bool>,
}

impl TaskPatch {
    /// Full-state patch mirroring a local task; used by the scheduler
    /// when flushing an optimistic edit.
    pub fn from_task(task: &Task) -> Self {
        Self {
            title: Some(task.title.clone()),
            description: Some(task.description.clone()),
            checklist: Some(task.checklist.clone()),
            scheduled_date: Some(task.scheduled_date),
            completed: Some(task.completed),
            completed_at: Some(task.completed_at),
            recurrence: Some(task.recurrence.clone()),
            goal_id: Some(task.goal_id),
            area_id: Some(task.area_id),
            estimated_minutes: Some(task.estimated_minutes),
            importance: Some(task.importance),
            urgency: Some(task.urgency),
        }
    }
}

/// Server echo of a task. Server-computed fields (id, owner, timestamps)
/// are authoritative; `into_task` maps it back into the domain model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteTask {
    pub id: i64,
    pub owner_id: i64,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub checklist: Vec<ChecklistItem>,
    #[serde(default)]
    pub scheduled_date: Option<NaiveDate>,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub completed_at: Option<NaiveDate>,
    #[serde(default)]
    pub recurrence: Option<RecurrenceRule>,
    #[serde(default)]
    pub goal_id: Option<i64>,
    #[serde(default)]
    pub area_id: Option<i64>,
    #[serde(default)]
    pub template_link_id: Option<i64>,
    #[serde(default)]
    pub estimated_minutes: u32,
    #[serde(default)]
    pub importance: bool,
    #[serde(default)]
    pub urgency: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RemoteTask {
    pub fn into_task(self) -> Task {
        Task {
            id: TaskId::Persisted(self.id),
            title: self.title,
            description: self.description,
            checklist: self.checklist,
            scheduled_date: self.scheduled_date,
            completed: self.completed,
            completed_at: self.completed_at,
            importance: self.importance,
            urgency: self.urgency,
            estimated_minutes: self.estimated_minutes,
            recurrence: self.recurrence,
            goal_id: self.goal_id,
            area_id: self.area_id,
            template_link_id: self.template_link_id.map(TaskId::Persisted),
            lifecycle: Lifecycle::Persisted,
            created_at: self.created_at,
        }
    }
}

/// The remote CRUD surface the scheduler writes through.
///
/// Methods return `impl Future + Send` rather than plain `async fn` so
/// the futures can be driven inside spawned tokio tasks; implementors
/// can still write `async fn`.
pub trait TaskClient: Send + Sync + 'static {
    fn create_task(&self, payload: &TaskPayload) -> impl Future<Output = Result<RemoteTask>> + Send;

    fn update_task(
        &self,
        id: i64,
        patch: &TaskPatch,
    ) -> impl Future<Output = Result<RemoteTask>> + Send;

    fn delete_task(&self, id: i64) -> impl Future<Output = Result<()>> + Send;

    fn list_tasks(
        &self,
        owner_id: i64,
        from: NaiveDate,
        to: NaiveDate,
    ) -> impl Future<Output = Result<Vec<RemoteTask>>> + Send;
}

/// Configuration for the HTTP persistence client.
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Base URL of the task API, e.g. `https://api.example.com/v1`.
    pub base_url: String,
    /// Bearer token for the session.
    pub auth_token: String,
    /// Request timeout; long-hung writes are the transport's concern,
    /// not the scheduler's.
    pub timeout: std::time::Duration,
}

impl HttpClientConfig {
    pub fn new(base_url: impl Into<String>, auth_token: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            auth_token: auth_token.into(),
            timeout: std::time::Duration::from_secs(30),
        }
    }
}

/// reqwest-backed implementation of [`TaskClient`].
pub struct HttpTaskClient {
    config: HttpClientConfig,
    client: reqwest::Client,
}

impl HttpTaskClient {
    pub fn new(config: HttpClientConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;
        Ok(Self { config, client })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder
            .header("Authorization", format!("Bearer {}", self.config.auth_token))
            .header("Content-Type", "application/json")
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let message = response
            .text()
            .await
            .unwrap_or_else(|_| "(no body)".to_string());
        Err(MomentumError::RemoteRejected { status, message })
    }
}

impl TaskClient for HttpTaskClient {
    async fn create_task(&self, payload: &TaskPayload) -> Result<RemoteTask> {
        let response = self
            .authorized(self.client.post(self.url("tasks")))
            .json(payload)
            .send()
            .await?;
        let task = Self::check(response).await?.json::<RemoteTask>().await?;
        tracing::debug!(task_id = task.id, "created remote task");
        Ok(task)
    }

    async fn update_task(&self, id: i64, patch: &TaskPatch) -> Result<RemoteTask> {
        let response = self
            .authorized(self.client.patch(self.url(&format!("tasks/{id}"))))
            .json(patch)
            .send()
            .await?;
        let task = Self::check(response).await?.json::<RemoteTask>().await?;
        tracing::debug!(task_id = task.id, "updated remote task");
        Ok(task)
    }

    async fn delete_task(&self, id: i64) -> Result<()> {
        let response = self
            .authorized(self.client.delete(self.url(&format!("tasks/{id}"))))
            .send()
            .await?;
        Self::check(response).await?;
        tracing::debug!(task_id = id, "deleted remote task");
        Ok(())
    }

    async fn list_tasks(
        &self,
        owner_id: i64,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<RemoteTask>> {
        let response = self
            .authorized(self.client.get(self.url("tasks")))
            .query(&[
                ("owner", owner_id.to_string()),
                ("from", from.to_string()),
                ("to", to.to_string()),
            ])
            .send()
            .await?;
        let tasks = Self::check(response)
            .await?
            .json::<Vec<RemoteTask>>()
            .await?;
        Ok(tasks)
    }
}

/// Fetch a fresh canonical snapshot and install it in the store.
///
/// Used for the initial load and for recovery after a failed optimistic
/// update: the server's list replaces the canonical collection wholesale.
pub async fn load_snapshot<C: TaskClient>(
    store: &crate::store::TaskStore,
    client: &C,
    owner_id: i64,
    from: NaiveDate,
    to: NaiveDate,
) -> Result<usize> {
    let remote = client.list_tasks(owner_id, from, to).await?;
    let count = remote.len();
    store.replace_snapshot(remote.into_iter().map(RemoteTask::into_task).collect());
    tracing::info!(count, "loaded canonical snapshot from remote store");
    Ok(count)
}
