//! Kanban drop resolution.
//!
//! Turns the end of a drag on the board into a status change, or decides
//! that nothing moved. Resolution is pure; [`apply_drop`] is the only part
//! that touches the store.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::task::{Task, TaskStatus, TaskStore};

/// What the card was released over.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum DropTarget {
    /// A column drop zone carrying its status.
    Column(TaskStatus),
    /// Another card; the target status is that card's current status.
    Task(String),
    /// An untyped identifier reported by the board.
    Raw(String),
}

/// End-of-drag event from the board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DropEvent {
    pub task_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<DropTarget>,
}

impl DropEvent {
    pub fn new(task_id: impl Into<String>, target: Option<DropTarget>) -> Self {
        Self {
            task_id: task_id.into(),
            target,
        }
    }
}

/// A status change to apply through [`TaskStore::move_status`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusMove {
    pub task_id: String,
    pub from: TaskStatus,
    pub to: TaskStatus,
}

/// Status the drop points at, before comparing with the dragged card.
pub fn target_status(tasks: &[Task], target: Option<&DropTarget>) -> Option<TaskStatus> {
    match target? {
        DropTarget::Column(status) => Some(*status),
        DropTarget::Task(card_id) => tasks
            .iter()
            .find(|task| &task.id == card_id)
            .map(|task| task.status),
        DropTarget::Raw(identifier) => TaskStatus::from_column_id(identifier),
    }
}

/// Resolve a drop to a move, or `None` when nothing changes: no target, an
/// unknown target, an unknown dragged task, or a target status equal to the
/// dragged task's current status.
pub fn resolve_drop(tasks: &[Task], event: &DropEvent) -> Option<StatusMove> {
    let to = target_status(tasks, event.target.as_ref())?;
    let dragged = tasks.iter().find(|task| task.id == event.task_id)?;
    if dragged.status == to {
        return None;
    }
    Some(StatusMove {
        task_id: dragged.id.clone(),
        from: dragged.status,
        to,
    })
}

/// Resolve against the store and apply the move. Same-status drops leave
/// `updated_at` alone.
pub fn apply_drop(store: &mut TaskStore, event: &DropEvent) -> Option<StatusMove> {
    let Some(status_move) = resolve_drop(store.tasks(), event) else {
        debug!(task_id = %event.task_id, target = ?event.target, "drop resolved to no move");
        return None;
    };
    if store.move_status(&status_move.task_id, status_move.to) {
        Some(status_move)
    } else {
        None
    }
}
