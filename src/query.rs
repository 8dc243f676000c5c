//! Task filtering and ordering.
//!
//! Filters combine as an AND-conjunction; an unset field matches everything.
//! Sorting is stable on one key with insertion order as the tie-break, and
//! the direction flips only the key comparison so equal keys keep insertion
//! order both ways.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::task::{Priority, Task, TaskStatus};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee_id: Option<String>,
    /// Inclusive lower bound on `due_date`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_from: Option<DateTime<Utc>>,
    /// Inclusive upper bound on `due_date`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_to: Option<DateTime<Utc>>,
    /// Case-insensitive substring of title or description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl TaskFilter {
    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_category(mut self, category_id: impl Into<String>) -> Self {
        self.category_id = Some(category_id.into());
        self
    }

    pub fn with_assignee(mut self, assignee_id: impl Into<String>) -> Self {
        self.assignee_id = Some(assignee_id.into());
        self
    }

    pub fn with_due_range(
        mut self,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Self {
        self.date_from = from;
        self.date_to = to;
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn matches(&self, task: &Task) -> bool {
        if let Some(category_id) = &self.category_id {
            if task.category_id.as_deref() != Some(category_id.as_str()) {
                return false;
            }
        }
        if self.status.is_some_and(|status| task.status != status) {
            return false;
        }
        if self.priority.is_some_and(|priority| task.priority != priority) {
            return false;
        }
        if let Some(assignee_id) = &self.assignee_id {
            if !task.assignee_ids.contains(assignee_id) {
                return false;
            }
        }
        if self.date_from.is_some_and(|from| task.due_date < from) {
            return false;
        }
        if self.date_to.is_some_and(|to| task.due_date > to) {
            return false;
        }
        if let Some(needle) = self.needle() {
            let in_title = task.title.to_lowercase().contains(&needle);
            let in_description = task.description.to_lowercase().contains(&needle);
            if !in_title && !in_description {
                return false;
            }
        }
        true
    }

    fn needle(&self) -> Option<String> {
        let text = self.text.as_deref()?.trim();
        if text.is_empty() {
            None
        } else {
            Some(text.to_lowercase())
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    DueDate,
    Priority,
    Status,
    Title,
    CreatedAt,
}

impl SortField {
    pub const ALL: [SortField; 5] = [
        SortField::DueDate,
        SortField::Priority,
        SortField::Status,
        SortField::Title,
        SortField::CreatedAt,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SortField::DueDate => "due_date",
            SortField::Priority => "priority",
            SortField::Status => "status",
            SortField::Title => "title",
            SortField::CreatedAt => "created_at",
        }
    }

    fn compare(self, left: &Task, right: &Task) -> Ordering {
        match self {
            SortField::DueDate => left.due_date.cmp(&right.due_date),
            SortField::Priority => left.priority.rank().cmp(&right.priority.rank()),
            SortField::Status => left.status.rank().cmp(&right.status.rank()),
            SortField::Title => left.title.cmp(&right.title),
            SortField::CreatedAt => left.created_at.cmp(&right.created_at),
        }
    }
}

impl fmt::Display for SortField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SortField {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        let normalized = value.trim().to_ascii_lowercase().replace('-', "_");
        SortField::ALL
            .into_iter()
            .find(|field| field.as_str() == normalized)
            .ok_or_else(|| {
                Error::InvalidArgument(format!(
                    "unknown sort field '{}' (expected due_date|priority|status|title|created_at)",
                    value.trim()
                ))
            })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl FromStr for SortDirection {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "asc" => Ok(SortDirection::Asc),
            "desc" => Ok(SortDirection::Desc),
            other => Err(Error::InvalidArgument(format!(
                "unknown sort direction '{other}' (expected asc|desc)"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSort {
    pub field: SortField,
    #[serde(default)]
    pub direction: SortDirection,
}

impl TaskSort {
    pub fn asc(field: SortField) -> Self {
        Self {
            field,
            direction: SortDirection::Asc,
        }
    }

    pub fn desc(field: SortField) -> Self {
        Self {
            field,
            direction: SortDirection::Desc,
        }
    }

    fn compare(&self, left: &Task, right: &Task) -> Ordering {
        let ordering = self.field.compare(left, right);
        match self.direction {
            SortDirection::Asc => ordering,
            SortDirection::Desc => ordering.reverse(),
        }
    }
}

/// Filter `tasks` (kept in insertion order) and optionally sort the result.
pub fn run_query<'a>(
    tasks: &'a [Task],
    filter: &TaskFilter,
    sort: Option<TaskSort>,
) -> Vec<&'a Task> {
    let mut matched: Vec<&Task> = tasks.iter().filter(|task| filter.matches(task)).collect();
    if let Some(sort) = sort {
        // `sort_by` is stable; ties stay in insertion order.
        matched.sort_by(|left, right| sort.compare(left, right));
    }
    matched
}
