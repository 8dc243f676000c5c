//! Task store.
//!
//! Tasks live in memory in insertion order and persist as a single snapshot
//! (`tasks.json`). Every mutation refreshes `updated_at`; lookups never do.
//! Unknown ids are soft failures: the operation returns `false` and leaves the
//! store untouched.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::clock::{next_timestamp, SharedClock};
use crate::error::{Error, Result};
use crate::ids::{self, TASK_ID_PREFIX};
use crate::query::{run_query, TaskFilter, TaskSort};
use crate::storage::Storage;

const TASKS_SCHEMA_VERSION: &str = "rally.tasks.v1";
const CHECKLIST_ID_PREFIX: &str = "item";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Todo,
    InProgress,
    Done,
}

impl TaskStatus {
    /// Kanban column order.
    pub const ALL: [TaskStatus; 3] = [TaskStatus::Todo, TaskStatus::InProgress, TaskStatus::Done];

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Todo => "todo",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Done => "done",
        }
    }

    /// Sort key: todo < in_progress < done.
    pub fn rank(self) -> u8 {
        match self {
            TaskStatus::Todo => 0,
            TaskStatus::InProgress => 1,
            TaskStatus::Done => 2,
        }
    }

    /// Exact match against a column identifier.
    pub fn from_column_id(value: &str) -> Option<Self> {
        TaskStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == value)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        let normalized = value.trim().to_ascii_lowercase().replace('-', "_");
        TaskStatus::from_column_id(&normalized).ok_or_else(|| {
            Error::InvalidArgument(format!(
                "unknown task status '{}' (expected todo|in_progress|done)",
                value.trim()
            ))
        })
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
    Urgent,
}

impl Priority {
    pub const ALL: [Priority; 4] = [
        Priority::Low,
        Priority::Medium,
        Priority::High,
        Priority::Urgent,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
            Priority::Urgent => "urgent",
        }
    }

    /// Sort key: urgent < high < medium < low.
    pub fn rank(self) -> u8 {
        match self {
            Priority::Urgent => 0,
            Priority::High => 1,
            Priority::Medium => 2,
            Priority::Low => 3,
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        let normalized = value.trim().to_ascii_lowercase();
        Priority::ALL
            .into_iter()
            .find(|priority| priority.as_str() == normalized)
            .ok_or_else(|| {
                Error::InvalidArgument(format!(
                    "unknown task priority '{}' (expected low|medium|high|urgent)",
                    value.trim()
                ))
            })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChecklistItem {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub completed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub status: TaskStatus,
    pub priority: Priority,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_id: Option<String>,
    #[serde(default)]
    pub assignee_ids: BTreeSet<String>,
    pub due_date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub checklist: Vec<ChecklistItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reminder_date: Option<DateTime<Utc>>,
}

impl Task {
    pub fn checklist_progress(&self) -> (usize, usize) {
        let done = self.checklist.iter().filter(|item| item.completed).count();
        (done, self.checklist.len())
    }
}

/// Caller-supplied fields for a new task. Status and priority are explicit.
#[derive(Debug, Clone)]
pub struct NewTask {
    pub title: String,
    pub description: String,
    pub status: TaskStatus,
    pub priority: Priority,
    pub category_id: Option<String>,
    pub assignee_ids: BTreeSet<String>,
    pub due_date: DateTime<Utc>,
    /// Checklist entry texts; ids are assigned by the store.
    pub checklist: Vec<String>,
    pub reminder_date: Option<DateTime<Utc>>,
}

impl NewTask {
    pub fn new(
        title: impl Into<String>,
        status: TaskStatus,
        priority: Priority,
        due_date: DateTime<Utc>,
    ) -> Self {
        Self {
            title: title.into(),
            description: String::new(),
            status,
            priority,
            category_id: None,
            assignee_ids: BTreeSet::new(),
            due_date,
            checklist: Vec::new(),
            reminder_date: None,
        }
    }
}

/// Partial edit. Status changes go through [`TaskStore::move_status`].
#[derive(Debug, Clone, Default)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub priority: Option<Priority>,
    pub category_id: Option<Option<String>>,
    pub assignee_ids: Option<BTreeSet<String>>,
    pub due_date: Option<DateTime<Utc>>,
    /// Replace the checklist wholesale.
    pub checklist: Option<Vec<ChecklistItem>>,
    pub reminder_date: Option<Option<DateTime<Utc>>>,
}

impl TaskPatch {
    fn apply(self, task: &mut Task) {
        if let Some(title) = self.title {
            task.title = title;
        }
        if let Some(description) = self.description {
            task.description = description;
        }
        if let Some(priority) = self.priority {
            task.priority = priority;
        }
        if let Some(category_id) = self.category_id {
            task.category_id = category_id;
        }
        if let Some(assignee_ids) = self.assignee_ids {
            task.assignee_ids = assignee_ids;
        }
        if let Some(due_date) = self.due_date {
            task.due_date = due_date;
        }
        if let Some(checklist) = self.checklist {
            task.checklist = checklist;
        }
        if let Some(reminder_date) = self.reminder_date {
            task.reminder_date = reminder_date;
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSnapshot {
    pub schema_version: String,
    pub generated_at: DateTime<Utc>,
    pub tasks: Vec<Task>,
}

pub struct TaskStore {
    tasks: Vec<Task>,
    clock: SharedClock,
}

impl fmt::Debug for TaskStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskStore")
            .field("tasks", &self.tasks.len())
            .finish()
    }
}

impl TaskStore {
    pub fn new(clock: SharedClock) -> Self {
        Self {
            tasks: Vec::new(),
            clock,
        }
    }

    pub fn from_snapshot(snapshot: TaskSnapshot, clock: SharedClock) -> Result<Self> {
        if snapshot.schema_version != TASKS_SCHEMA_VERSION {
            return Err(Error::OperationFailed(format!(
                "unsupported task snapshot version '{}'",
                snapshot.schema_version
            )));
        }
        Ok(Self {
            tasks: snapshot.tasks,
            clock,
        })
    }

    /// Load `tasks.json`, or start empty when it does not exist.
    pub fn load(storage: &Storage, clock: SharedClock) -> Result<Self> {
        match storage.read_json_opt::<TaskSnapshot>(&storage.tasks_file())? {
            Some(snapshot) => Self::from_snapshot(snapshot, clock),
            None => Ok(Self::new(clock)),
        }
    }

    /// Replace in-memory records with the snapshot on disk.
    pub fn reload(&mut self, storage: &Storage) -> Result<()> {
        let fresh = Self::load(storage, Arc::clone(&self.clock))?;
        self.tasks = fresh.tasks;
        Ok(())
    }

    pub fn save(&self, storage: &Storage) -> Result<()> {
        storage.write_json(&storage.tasks_file(), &self.snapshot())
    }

    pub fn snapshot(&self) -> TaskSnapshot {
        TaskSnapshot {
            schema_version: TASKS_SCHEMA_VERSION.to_string(),
            generated_at: self.clock.now(),
            tasks: self.tasks.clone(),
        }
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|task| task.id == id)
    }

    /// Resolve a typed id or unique id prefix to a stored task id.
    pub fn resolve_id(&self, input: &str) -> Result<String> {
        ids::resolve_id(input, self.tasks.iter().map(|task| task.id.as_str()))
            .map_err(|_| Error::TaskNotFound(input.trim().to_string()))
    }

    pub fn add(&mut self, data: NewTask) -> String {
        let id = ids::generate_id(TASK_ID_PREFIX, self.tasks.iter().map(|task| task.id.as_str()));
        let now = self.clock.now();

        let mut checklist: Vec<ChecklistItem> = Vec::with_capacity(data.checklist.len());
        for text in data.checklist {
            let item_id =
                ids::generate_id(CHECKLIST_ID_PREFIX, checklist.iter().map(|item| item.id.as_str()));
            checklist.push(ChecklistItem {
                id: item_id,
                text,
                completed: false,
            });
        }

        self.tasks.push(Task {
            id: id.clone(),
            title: data.title,
            description: data.description,
            status: data.status,
            priority: data.priority,
            category_id: data.category_id,
            assignee_ids: data.assignee_ids,
            due_date: data.due_date,
            created_at: now,
            updated_at: now,
            checklist,
            reminder_date: data.reminder_date,
        });
        debug!(task_id = %id, "task added");
        id
    }

    /// Merge `patch` into the task and refresh `updated_at`.
    pub fn update(&mut self, id: &str, patch: TaskPatch) -> bool {
        let clock = self.clock.clone();
        let Some(task) = self.task_mut(id) else {
            debug!(task_id = id, "update ignored: unknown task");
            return false;
        };
        patch.apply(task);
        task.updated_at = next_timestamp(clock.as_ref(), task.updated_at);
        true
    }

    /// Remove the task. Deleting a missing id is a no-op.
    pub fn delete(&mut self, id: &str) -> bool {
        let before = self.tasks.len();
        self.tasks.retain(|task| task.id != id);
        let removed = self.tasks.len() != before;
        if !removed {
            debug!(task_id = id, "delete ignored: unknown task");
        }
        removed
    }

    /// Set the status and refresh `updated_at`. The single path for status
    /// changes (kanban drops, completion toggles, edits).
    pub fn move_status(&mut self, id: &str, status: TaskStatus) -> bool {
        let clock = self.clock.clone();
        let Some(task) = self.task_mut(id) else {
            debug!(task_id = id, "status move ignored: unknown task");
            return false;
        };
        task.status = status;
        task.updated_at = next_timestamp(clock.as_ref(), task.updated_at);
        true
    }

    /// Flip one checklist entry. No-op when either id is unknown.
    pub fn toggle_checklist_item(&mut self, task_id: &str, item_id: &str) -> bool {
        let clock = self.clock.clone();
        let Some(task) = self.task_mut(task_id) else {
            debug!(task_id, "checklist toggle ignored: unknown task");
            return false;
        };
        let Some(item) = task.checklist.iter_mut().find(|item| item.id == item_id) else {
            debug!(task_id, item_id, "checklist toggle ignored: unknown item");
            return false;
        };
        item.completed = !item.completed;
        task.updated_at = next_timestamp(clock.as_ref(), task.updated_at);
        true
    }

    /// Append a checklist entry and return its id.
    pub fn add_checklist_item(&mut self, task_id: &str, text: impl Into<String>) -> Option<String> {
        let clock = self.clock.clone();
        let task = self.task_mut(task_id)?;
        let item_id = ids::generate_id(
            CHECKLIST_ID_PREFIX,
            task.checklist.iter().map(|item| item.id.as_str()),
        );
        task.checklist.push(ChecklistItem {
            id: item_id.clone(),
            text: text.into(),
            completed: false,
        });
        task.updated_at = next_timestamp(clock.as_ref(), task.updated_at);
        Some(item_id)
    }

    /// Filter, then optionally sort. Pure; never touches `updated_at`.
    pub fn query(&self, filter: &TaskFilter, sort: Option<TaskSort>) -> Vec<&Task> {
        run_query(&self.tasks, filter, sort)
    }

    fn task_mut(&mut self, id: &str) -> Option<&mut Task> {
        self.tasks.iter_mut().find(|task| task.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::query::SortField;
    use chrono::{Duration, TimeZone};
    use tempfile::tempdir;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap()
    }

    fn store() -> (TaskStore, ManualClock) {
        let clock = ManualClock::new(start());
        (TaskStore::new(clock.shared()), clock)
    }

    fn new_task(title: &str, status: TaskStatus, priority: Priority, due_days: i64) -> NewTask {
        NewTask::new(title, status, priority, start() + Duration::days(due_days))
    }

    #[test]
    fn add_assigns_id_and_timestamps() {
        let (mut store, _clock) = store();
        let id = store.add(new_task("Book venue", TaskStatus::Todo, Priority::High, 3));

        let task = store.get(&id).expect("task");
        assert!(id.starts_with("task-"));
        assert_eq!(task.created_at, start());
        assert_eq!(task.updated_at, task.created_at);
        assert_eq!(task.status, TaskStatus::Todo);
    }

    #[test]
    fn add_assigns_checklist_ids() {
        let (mut store, _clock) = store();
        let mut data = new_task("Setup", TaskStatus::Todo, Priority::Low, 1);
        data.checklist = vec!["Tables".to_string(), "Chairs".to_string()];
        let id = store.add(data);

        let task = store.get(&id).expect("task");
        assert_eq!(task.checklist.len(), 2);
        assert_ne!(task.checklist[0].id, task.checklist[1].id);
        assert!(task.checklist.iter().all(|item| !item.completed));
    }

    #[test]
    fn update_merges_and_bumps_updated_at() {
        let (mut store, clock) = store();
        let id = store.add(new_task("Flyers", TaskStatus::Todo, Priority::Low, 2));

        clock.advance(Duration::minutes(1));
        let patch = TaskPatch {
            description: Some("Print 200".to_string()),
            priority: Some(Priority::Medium),
            ..TaskPatch::default()
        };
        assert!(store.update(&id, patch));

        let task = store.get(&id).expect("task");
        assert_eq!(task.title, "Flyers");
        assert_eq!(task.description, "Print 200");
        assert_eq!(task.priority, Priority::Medium);
        assert_eq!(task.updated_at, start() + Duration::minutes(1));
    }

    #[test]
    fn unknown_ids_are_soft_failures() {
        let (mut store, _clock) = store();
        let id = store.add(new_task("Flyers", TaskStatus::Todo, Priority::Low, 2));
        let before = store.get(&id).cloned();

        assert!(!store.update("task-zzz", TaskPatch::default()));
        assert!(!store.move_status("task-zzz", TaskStatus::Done));
        assert!(!store.toggle_checklist_item("task-zzz", "item-abc"));
        assert!(!store.toggle_checklist_item(&id, "item-abc"));
        assert_eq!(store.get(&id).cloned(), before);
    }

    #[test]
    fn delete_is_idempotent() {
        let (mut store, _clock) = store();
        let keep = store.add(new_task("Keep", TaskStatus::Todo, Priority::Low, 1));
        let gone = store.add(new_task("Gone", TaskStatus::Todo, Priority::Low, 1));

        assert!(store.delete(&gone));
        let once: Vec<Task> = store.tasks().to_vec();
        assert!(!store.delete(&gone));
        assert_eq!(store.tasks(), once.as_slice());
        assert_eq!(store.tasks()[0].id, keep);
    }

    #[test]
    fn updated_at_strictly_increases_when_clock_stalls() {
        let (mut store, _clock) = store();
        let mut data = new_task("Sound check", TaskStatus::Todo, Priority::Urgent, 1);
        data.checklist = vec!["Mics".to_string()];
        let id = store.add(data);
        let item_id = store.get(&id).expect("task").checklist[0].id.clone();

        let mut last = store.get(&id).expect("task").updated_at;
        assert!(store.move_status(&id, TaskStatus::InProgress));
        let after_move = store.get(&id).expect("task").updated_at;
        assert!(after_move > last);
        last = after_move;

        assert!(store.toggle_checklist_item(&id, &item_id));
        let after_toggle = store.get(&id).expect("task").updated_at;
        assert!(after_toggle > last);
        last = after_toggle;

        assert!(store.update(&id, TaskPatch::default()));
        assert!(store.get(&id).expect("task").updated_at > last);
    }

    #[test]
    fn toggle_flips_completion() {
        let (mut store, _clock) = store();
        let id = store.add(new_task("Signage", TaskStatus::Todo, Priority::Low, 1));
        let item_id = store.add_checklist_item(&id, "Entrance sign").expect("item");

        assert!(store.toggle_checklist_item(&id, &item_id));
        assert_eq!(store.get(&id).expect("task").checklist_progress(), (1, 1));
        assert!(store.toggle_checklist_item(&id, &item_id));
        assert_eq!(store.get(&id).expect("task").checklist_progress(), (0, 1));
    }

    #[test]
    fn query_does_not_touch_updated_at() {
        let (mut store, clock) = store();
        let id = store.add(new_task("Tickets", TaskStatus::Todo, Priority::Low, 1));
        let before = store.get(&id).expect("task").updated_at;

        clock.advance(Duration::hours(1));
        let _ = store.query(&TaskFilter::default(), Some(TaskSort::asc(SortField::Title)));
        assert_eq!(store.get(&id).expect("task").updated_at, before);
    }

    #[test]
    fn snapshot_round_trip_through_storage() {
        let dir = tempdir().expect("tempdir");
        let storage = Storage::new(dir.path().to_path_buf());
        let (mut store, clock) = store();
        let mut data = new_task("Raffle", TaskStatus::InProgress, Priority::High, 4);
        data.reminder_date = Some(start() + Duration::days(3));
        data.assignee_ids = ["ana".to_string(), "lee".to_string()].into_iter().collect();
        let id = store.add(data);
        store.save(&storage).expect("save");

        let loaded = TaskStore::load(&storage, clock.shared()).expect("load");
        assert_eq!(loaded.tasks(), store.tasks());
        let task = loaded.get(&id).expect("task");
        assert_eq!(task.reminder_date, Some(start() + Duration::days(3)));
    }

    #[test]
    fn load_missing_snapshot_is_empty() {
        let dir = tempdir().expect("tempdir");
        let storage = Storage::new(dir.path().to_path_buf());
        let (_, clock) = store();
        let loaded = TaskStore::load(&storage, clock.shared()).expect("load");
        assert!(loaded.is_empty());
    }

    #[test]
    fn resolve_id_accepts_prefix() {
        let (mut store, _clock) = store();
        let id = store.add(new_task("Tickets", TaskStatus::Todo, Priority::Low, 1));
        let suffix = id.trim_start_matches("task-");
        assert_eq!(store.resolve_id(suffix).expect("resolve"), id);
        assert!(matches!(
            store.resolve_id("nothing-here"),
            Err(Error::TaskNotFound(_))
        ));
    }

    #[test]
    fn status_and_priority_parse() {
        assert_eq!("in-progress".parse::<TaskStatus>().expect("status"), TaskStatus::InProgress);
        assert_eq!("URGENT".parse::<Priority>().expect("priority"), Priority::Urgent);
        assert!("blocked".parse::<TaskStatus>().is_err());
        assert_eq!(TaskStatus::from_column_id("In_Progress"), None);
    }
}
