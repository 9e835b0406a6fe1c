//! Domain model for the Momentum task core
//!
//! A `Task` is the unit of work; its identity is a tagged union so that
//! draft (client-only) and persisted (server-confirmed) tasks cannot be
//! confused by string sniffing.

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Task identity.
///
/// `Temporary` tokens are client-generated and never leave the session;
/// `Persisted` ids are assigned by the remote store. The identity of a
/// task changes exactly once, at the draft -> persisted transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TaskId {
    Temporary(u64),
    Persisted(i64),
}

impl TaskId {
    /// Generate a fresh temporary identity for a new draft.
    pub fn fresh_temporary() -> Self {
        TaskId::Temporary(rand::random::<u64>())
    }

    pub fn is_temporary(&self) -> bool {
        matches!(self, TaskId::Temporary(_))
    }

    /// The server-side id, if this identity is persisted.
    pub fn persisted(&self) -> Option<i64> {
        match self {
            TaskId::Persisted(id) => Some(*id),
            TaskId::Temporary(_) => None,
        }
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskId::Temporary(token) => write!(f, "tmp:{:016x}", token),
            TaskId::Persisted(id) => write!(f, "{}", id),
        }
    }
}

/// Lifecycle tag, used only for sort/merge precedence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lifecycle {
    /// Unsaved, temporary id; unknown to the remote store.
    Draft,
    /// Confirmed id; may still have unflushed local edits.
    Persisted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecklistItem {
    pub id: u32,
    pub text: String,
    pub completed: bool,
}

/// Recurrence frequency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
}

/// A recurrence rule: frequency + day selection + validity window.
///
/// `selected_days` holds weekday indices (0 = Monday .. 6 = Sunday) for
/// weekly rules and day-of-month numbers (1..=31) for monthly rules; it
/// is unused for daily rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecurrenceRule {
    pub frequency: Frequency,
    #[serde(default)]
    pub selected_days: BTreeSet<u32>,
    pub start_date: NaiveDate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date: Option<NaiveDate>,
}

/// A schedulable unit of work, possibly recurring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub checklist: Vec<ChecklistItem>,
    /// Calendar date; `None` for a recurrence template.
    pub scheduled_date: Option<NaiveDate>,
    pub completed: bool,
    /// Date of completion; required when `completed` is true. Closes the
    /// occurrence it belongs to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<NaiveDate>,
    pub importance: bool,
    pub urgency: bool,
    pub estimated_minutes: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recurrence: Option<RecurrenceRule>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub goal_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub area_id: Option<i64>,
    /// Set on a materialized occurrence of a recurring template; unset on
    /// standalone tasks and on the template itself.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template_link_id: Option<TaskId>,
    pub lifecycle: Lifecycle,
    pub created_at: DateTime<Utc>,
}

impl Task {
    /// Build an empty draft with a fresh temporary identity.
    pub fn new_draft() -> Self {
        Self {
            id: TaskId::fresh_temporary(),
            title: String::new(),
            description: String::new(),
            checklist: Vec::new(),
            scheduled_date: None,
            completed: false,
            completed_at: None,
            importance: false,
            urgency: false,
            estimated_minutes: 0,
            recurrence: None,
            goal_id: None,
            area_id: None,
            template_link_id: None,
            lifecycle: Lifecycle::Draft,
            created_at: Utc::now(),
        }
    }

    /// Sort weight: importance counts double, urgency single.
    pub fn priority_weight(&self) -> u8 {
        (self.importance as u8) * 2 + (self.urgency as u8)
    }

    /// True for a recurring template that must never be displayed
    /// directly (occurrences are materialized from it instead).
    pub fn is_recurring_template(&self) -> bool {
        self.recurrence.is_some() && self.template_link_id.is_none()
    }

    /// Assign (or clear) the goal, keeping the derivation invariant:
    /// while a goal is set, the area comes from the goal and is not
    /// independently editable.
    pub fn assign_goal(&mut self, goal_id: Option<i64>, goal_areas: &HashMap<i64, i64>) {
        self.goal_id = goal_id;
        if let Some(gid) = goal_id {
            self.area_id = goal_areas.get(&gid).copied();
        }
    }

    /// Effective area for filtering: the task's own area if set, else the
    /// area of its goal.
    pub fn effective_area(&self, goal_areas: &HashMap<i64, i64>) -> Option<i64> {
        self.area_id
            .or_else(|| self.goal_id.and_then(|gid| goal_areas.get(&gid).copied()))
    }

    /// Reconcile a server echo against the local state.
    ///
    /// `snapshot` is the local task as it looked when the write was
    /// issued. Fields the user edited after that point (current value
    /// differs from the snapshot) keep their local value; everything else
    /// takes the server's word. Identity, lifecycle and creation time are
    /// always server-authoritative.
    pub fn merge_server_echo(current: &Task, snapshot: &Task, server: Task) -> Task {
        fn pick<T: PartialEq + Clone>(current: &T, snapshot: &T, server: T) -> T {
            if current != snapshot {
                current.clone()
            } else {
                server
            }
        }

        Task {
            id: server.id,
            title: pick(&current.title, &snapshot.title, server.title),
            description: pick(&current.description, &snapshot.description, server.description),
            checklist: pick(&current.checklist, &snapshot.checklist, server.checklist),
            scheduled_date: pick(
                &current.scheduled_date,
                &snapshot.scheduled_date,
                server.scheduled_date,
            ),
            completed: pick(&current.completed, &snapshot.completed, server.completed),
            completed_at: pick(
                &current.completed_at,
                &snapshot.completed_at,
                server.completed_at,
            ),
            importance: pick(&current.importance, &snapshot.importance, server.importance),
            urgency: pick(&current.urgency, &snapshot.urgency, server.urgency),
            estimated_minutes: pick(
                &current.estimated_minutes,
                &snapshot.estimated_minutes,
                server.estimated_minutes,
            ),
            recurrence: pick(&current.recurrence, &snapshot.recurrence, server.recurrence),
            goal_id: pick(&current.goal_id, &snapshot.goal_id, server.goal_id),
            area_id: pick(&current.area_id, &snapshot.area_id, server.area_id),
            template_link_id: pick(
                &current.template_link_id,
                &snapshot.template_link_id,
                server.template_link_id,
            ),
            lifecycle: server.lifecycle,
            created_at: server.created_at,
        }
    }
}
