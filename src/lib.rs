//! rally - task lifecycle and reminder scheduling
//!
//! This library provides the core of the rally CLI: a task store with
//! filtering and kanban moves, a reminder store, and a scheduler that turns
//! due reminders into notifications.
//!
//! # Core Concepts
//!
//! - **Tasks**: units of work with status, priority, due date and checklist
//! - **Kanban drops**: drag-end events resolved to status changes
//! - **Reminders**: one-time notifications tied to a task, sent at most once
//! - **Notifier**: permission-gated notification capability
//! - **Scheduler**: periodic loop dispatching due reminders
//!
//! # Module Organization
//!
//! - `cli`: Command-line interface using clap
//! - `clock`: Injectable time source
//! - `config`: Configuration loading from `.rally.toml`
//! - `error`: Error types and result aliases
//! - `events`: JSONL change events
//! - `ids`: Short id generation and prefix resolution
//! - `kanban`: Drop resolution
//! - `lock`: File locking for snapshot writes
//! - `notify`: Notification capability and backends
//! - `output`: Shared human/JSON output
//! - `query`: Task filters and sorting
//! - `reminder`: Reminder store
//! - `scheduler`: Reminder scheduler
//! - `storage`: Data directory and snapshot I/O
//! - `task`: Task store

pub mod cli;
pub mod clock;
pub mod config;
pub mod error;
pub mod events;
pub mod ids;
pub mod kanban;
pub mod lock;
pub mod notify;
pub mod output;
pub mod query;
pub mod reminder;
pub mod scheduler;
pub mod storage;
pub mod task;

pub use error::{Error, Result};
