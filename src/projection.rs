//! View projection
//!
//! Pure derivation of what one consumer displays from the canonical
//! collection: recurring-occurrence materialization, deduplication,
//! filtering, ordering and pagination. Edits flow back through
//! [`merge_back`], which can never drop canonical entries outside the
//! view's filter.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use chrono::NaiveDate;

use crate::model::{Lifecycle, Task, TaskId};
use crate::recurrence::current_occurrence;
use crate::store::{StoreEvent, TaskStore};

/// Goal filter, including the sentinel "tasks without a goal".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GoalFilter {
    #[default]
    Any,
    None,
    Goal(i64),
}

/// What one view wants to see.
#[derive(Debug, Clone, Default)]
pub struct ViewFilter {
    pub goal: GoalFilter,
    /// Matched against the task's effective area (its own area if set,
    /// else the area of its goal).
    pub area: Option<i64>,
    /// Exact scheduled-date match.
    pub scheduled_on: Option<NaiveDate>,
    /// When false, completed tasks are hidden.
    pub show_completed: bool,
}

impl ViewFilter {
    fn matches(&self, task: &Task, goal_areas: &HashMap<i64, i64>) -> bool {
        match self.goal {
            GoalFilter::Any => {},
            GoalFilter::None => {
                if task.goal_id.is_some() {
                    return false;
                }
            },
            GoalFilter::Goal(goal_id) => {
                if task.goal_id != Some(goal_id) {
                    return false;
                }
            },
        }
        if let Some(area) = self.area {
            if task.effective_area(goal_areas) != Some(area) {
                return false;
            }
        }
        if let Some(date) = self.scheduled_on {
            if task.scheduled_date != Some(date) {
                return false;
            }
        }
        if !self.show_completed && task.completed {
            return false;
        }
        true
    }
}

/// Per-view UI state that participates in ordering: expanded-for-editing
/// and newly-created tasks are pinned to the top. Keyed by task id, so
/// it must be rekeyed when a draft's identity is swapped.
#[derive(Debug, Clone, Default)]
pub struct ViewState {
    pub expanded: HashSet<TaskId>,
    pub newly_created: HashSet<TaskId>,
}

impl ViewState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_pinned(&self, id: &TaskId) -> bool {
        self.expanded.contains(id) || self.newly_created.contains(id)
    }

    /// Rename every reference from `old` to `new`.
    pub fn rekey(&mut self, old: &TaskId, new: TaskId) {
        if self.expanded.remove(old) {
            self.expanded.insert(new);
        }
        if self.newly_created.remove(old) {
            self.newly_created.insert(new);
        }
    }

    /// Keep view state consistent with a canonical mutation.
    pub fn apply_event(&mut self, event: &StoreEvent) {
        match event {
            StoreEvent::IdentitySwapped { old, new } => self.rekey(old, *new),
            StoreEvent::Removed(id) => {
                self.expanded.remove(id);
                self.newly_created.remove(id);
            },
            StoreEvent::Upserted(_) => {},
        }
    }
}

/// Pagination window applied after ordering.
#[derive(Debug, Clone, Copy)]
pub struct Page {
    pub offset: usize,
    pub limit: usize,
}

/// The current occurrence a recurring template contributes for `today`,
/// or `None` when the series is exhausted.
///
/// The instance keeps the template's id (edits merge back onto the
/// template) and records the link through `template_link_id`. A
/// completion dated on or after the displayed occurrence closes it; an
/// older completion belongs to a past occurrence, so the instance shows
/// as open.
fn materialize_occurrence(template: &Task, today: NaiveDate) -> Option<Task> {
    let rule = template.recurrence.as_ref()?;
    let occurrence = current_occurrence(rule, today)?;

    let mut instance = template.clone();
    instance.template_link_id = Some(template.id);
    instance.scheduled_date = Some(occurrence);
    match template.completed_at {
        Some(done) if template.completed && done >= occurrence => {
            instance.completed = true;
            instance.completed_at = Some(done);
        },
        _ => {
            instance.completed = false;
            instance.completed_at = None;
        },
    }
    Some(instance)
}

/// Precedence when two representations share an id during a transient
/// state: a recurring representation beats a plain one, and a draft
/// beats a persisted one.
fn representation_rank(task: &Task) -> u8 {
    let recurring = task.recurrence.is_some() as u8;
    let draft = (task.lifecycle == Lifecycle::Draft) as u8;
    (recurring << 1) | draft
}

fn dedup_by_id(tasks: Vec<Task>) -> Vec<Task> {
    let mut order: Vec<TaskId> = Vec::with_capacity(tasks.len());
    let mut best: HashMap<TaskId, Task> = HashMap::with_capacity(tasks.len());
    for task in tasks {
        match best.get(&task.id) {
            Some(existing) if representation_rank(existing) >= representation_rank(&task) => {},
            Some(_) => {
                best.insert(task.id, task);
            },
            None => {
                order.push(task.id);
                best.insert(task.id, task);
            },
        }
    }
    order.into_iter().filter_map(|id| best.remove(&id)).collect()
}

fn sort_group(task: &Task, state: &ViewState) -> u8 {
    if state.is_pinned(&task.id) {
        0
    } else if !task.completed {
        1
    } else {
        2
    }
}

/// `None` dates sort after concrete ones within the incomplete group.
fn date_key(date: Option<NaiveDate>) -> (bool, Option<NaiveDate>) {
    (date.is_none(), date)
}

fn compare(a: &Task, b: &Task, state: &ViewState) -> Ordering {
    let group = sort_group(a, state).cmp(&sort_group(b, state));
    if group != Ordering::Equal {
        return group;
    }
    match sort_group(a, state) {
        // Pinned: newest first.
        0 => b.created_at.cmp(&a.created_at),
        // Incomplete: date ascending, then priority weight descending,
        // then creation time descending.
        1 => date_key(a.scheduled_date)
            .cmp(&date_key(b.scheduled_date))
            .then_with(|| b.priority_weight().cmp(&a.priority_weight()))
            .then_with(|| b.created_at.cmp(&a.created_at)),
        // Completed last, most recently completed first.
        _ => date_key(b.completed_at)
            .cmp(&date_key(a.completed_at))
            .then_with(|| b.created_at.cmp(&a.created_at)),
    }
}

/// Produce the ordered list one view displays.
///
/// Recurring templates with a valid rule contribute their current
/// occurrence and are never shown directly; a template whose rule is
/// invalid counts as "recurrence disabled" and passes through as a plain
/// task (normalization happens at the next settle point).
pub fn project(
    tasks: &[Task],
    filter: &ViewFilter,
    state: &ViewState,
    goal_areas: &HashMap<i64, i64>,
    today: NaiveDate,
) -> Vec<Task> {
    let mut visible: Vec<Task> = Vec::with_capacity(tasks.len());
    for task in tasks {
        if task.is_recurring_template()
            && task.recurrence.as_ref().is_some_and(|rule| rule.is_valid())
        {
            if let Some(instance) = materialize_occurrence(task, today) {
                visible.push(instance);
            }
            continue;
        }
        visible.push(task.clone());
    }

    let mut visible: Vec<Task> = dedup_by_id(visible)
        .into_iter()
        .filter(|task| filter.matches(task, goal_areas))
        .collect();
    visible.sort_by(|a, b| compare(a, b, state));
    visible
}

/// Apply a pagination window to an ordered projection.
pub fn paginate(ordered: Vec<Task>, page: Page) -> Vec<Task> {
    ordered
        .into_iter()
        .skip(page.offset)
        .take(page.limit)
        .collect()
}

/// Fold a view's local edits back into the canonical collection.
///
/// Delegates to [`TaskStore::upsert`]: entries outside the view's scope
/// are untouched, so a filtered view can never erase tasks it does not
/// display.
pub fn merge_back(store: &TaskStore, edits: Vec<Task>, scope: Option<&HashSet<TaskId>>) {
    store.upsert(edits, scope);
}
