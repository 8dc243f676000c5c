//! Command-line interface for rally
//!
//! This module defines the CLI structure using clap derive macros.
//! Each command group is implemented in its own submodule.

use std::path::PathBuf;

use chrono::{DateTime, NaiveDate, Utc};
use clap::{ArgGroup, Parser, Subcommand};
use serde::Serialize;

use crate::clock::{system_clock, SharedClock};
use crate::config::{parse_duration, Config};
use crate::error::{Error, Result};
use crate::events::{Event, EventDestination, EventKind, EventSink};
use crate::reminder::ReminderStore;
use crate::storage::Storage;
use crate::task::TaskStore;

mod board;
mod notify;
mod remind;
mod task;
mod watch;

/// rally - task lifecycle and reminders
///
/// Track tasks through todo, in progress and done, move them on a kanban
/// board, and get notified when their reminders come due.
#[derive(Parser, Debug)]
#[command(name = "rally")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Data directory (defaults to the platform data directory)
    #[arg(long, global = true, env = "RALLY_DIR")]
    pub dir: Option<PathBuf>,

    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Emit change events as JSON lines to a file, or "-" for stdout
    #[arg(long, global = true)]
    pub events: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Task management
    #[command(subcommand)]
    Task(TaskCommands),

    /// Kanban board operations
    #[command(subcommand)]
    Board(BoardCommands),

    /// Reminder management
    #[command(subcommand)]
    Remind(RemindCommands),

    /// Notification permission and testing
    #[command(subcommand)]
    Notify(NotifyCommands),

    /// Run the reminder scheduler until interrupted
    Watch {
        /// Poll interval (e.g. "30s", "5m"); defaults to scheduler.interval
        #[arg(long)]
        interval: Option<String>,

        /// Run a single cycle and exit
        #[arg(long)]
        once: bool,
    },
}

/// Task subcommands
#[derive(Subcommand, Debug)]
pub enum TaskCommands {
    /// Create a task
    Add {
        /// Task title
        title: String,

        /// Due date: RFC 3339, YYYY-MM-DD, "now", or "+2d"
        #[arg(long)]
        due: String,

        /// Longer description
        #[arg(long)]
        description: Option<String>,

        /// Initial status: todo, in_progress, done
        #[arg(long, default_value = "todo")]
        status: String,

        /// Priority: low, medium, high, urgent
        #[arg(long, default_value = "medium")]
        priority: String,

        /// Category id
        #[arg(long)]
        category: Option<String>,

        /// Assignee id (repeatable)
        #[arg(long = "assignee")]
        assignees: Vec<String>,

        /// Checklist item text (repeatable)
        #[arg(long = "item")]
        items: Vec<String>,

        /// Also schedule a browser reminder at this time
        #[arg(long, allow_hyphen_values = true)]
        remind: Option<String>,
    },

    /// List tasks
    List {
        #[arg(long)]
        status: Option<String>,

        #[arg(long)]
        priority: Option<String>,

        #[arg(long)]
        category: Option<String>,

        #[arg(long)]
        assignee: Option<String>,

        /// Earliest due date (inclusive)
        #[arg(long, allow_hyphen_values = true)]
        from: Option<String>,

        /// Latest due date (inclusive)
        #[arg(long, allow_hyphen_values = true)]
        to: Option<String>,

        /// Case-insensitive text in title or description
        #[arg(long)]
        text: Option<String>,

        /// Sort field: due_date, priority, status, title, created_at
        #[arg(long)]
        sort: Option<String>,

        /// Sort direction: asc or desc
        #[arg(long)]
        direction: Option<String>,
    },

    /// Show task details
    Show {
        /// Task ID (or unique prefix)
        id: String,
    },

    /// Edit task fields
    Edit {
        /// Task ID (or unique prefix)
        id: String,

        #[arg(long)]
        title: Option<String>,

        #[arg(long)]
        description: Option<String>,

        #[arg(long)]
        priority: Option<String>,

        #[arg(long, conflicts_with = "clear_category")]
        category: Option<String>,

        #[arg(long)]
        clear_category: bool,

        /// Replace assignees (repeatable)
        #[arg(long = "assignee", conflicts_with = "clear_assignees")]
        assignees: Vec<String>,

        #[arg(long)]
        clear_assignees: bool,

        #[arg(long, allow_hyphen_values = true)]
        due: Option<String>,

        #[arg(long, allow_hyphen_values = true, conflicts_with = "clear_remind")]
        remind: Option<String>,

        #[arg(long)]
        clear_remind: bool,
    },

    /// Change task status
    Move {
        /// Task ID (or unique prefix)
        id: String,

        /// New status: todo, in_progress, done
        status: String,
    },

    /// Delete a task
    Delete {
        /// Task ID (or unique prefix)
        id: String,
    },

    /// Toggle a checklist item
    Check {
        /// Task ID (or unique prefix)
        id: String,

        /// Checklist item ID (or unique prefix)
        item: String,
    },

    /// Add a checklist item
    Item {
        /// Task ID (or unique prefix)
        id: String,

        /// Item text
        text: String,
    },
}

/// Board subcommands
#[derive(Subcommand, Debug)]
pub enum BoardCommands {
    /// Drop a card on a column or on another card
    #[command(group(ArgGroup::new("drop_target").args(["column", "card", "target"])))]
    Drop {
        /// Dragged task ID (or unique prefix)
        task: String,

        /// Column status
        #[arg(long)]
        column: Option<String>,

        /// Card the task was dropped on
        #[arg(long)]
        card: Option<String>,

        /// Raw drop-zone identifier
        #[arg(long)]
        target: Option<String>,
    },
}

/// Reminder subcommands
#[derive(Subcommand, Debug)]
pub enum RemindCommands {
    /// Schedule a reminder for a task
    Add {
        /// Task ID (or unique prefix)
        task: String,

        /// Fire time: RFC 3339, YYYY-MM-DD, "now", "+30m" or "-5m"
        #[arg(long, allow_hyphen_values = true)]
        at: String,

        /// Channel: browser or email
        #[arg(long, default_value = "browser")]
        channel: String,
    },

    /// List reminders
    List {
        /// Only reminders for this task
        #[arg(long)]
        task: Option<String>,

        /// Only unsent reminders
        #[arg(long)]
        pending: bool,
    },

    /// Edit an unsent reminder
    Edit {
        /// Reminder ID (or unique prefix)
        id: String,

        #[arg(long)]
        task: Option<String>,

        #[arg(long, allow_hyphen_values = true)]
        at: Option<String>,

        #[arg(long)]
        channel: Option<String>,
    },

    /// Delete a reminder
    Delete {
        /// Reminder ID (or unique prefix)
        id: String,
    },

    /// Show due and upcoming reminders
    Due,

    /// Drop sent reminders older than a cutoff
    Compact {
        /// Age cutoff (e.g. "30d"); defaults to reminders.retention
        #[arg(long)]
        older_than: Option<String>,
    },
}

/// Notification subcommands
#[derive(Subcommand, Debug)]
pub enum NotifyCommands {
    /// Show the notification permission
    Status,

    /// Ask for notification permission
    #[command(group(ArgGroup::new("answer").args(["yes", "no"])))]
    Request {
        /// Grant without prompting
        #[arg(long)]
        yes: bool,

        /// Deny without prompting
        #[arg(long)]
        no: bool,
    },

    /// Show a test notification
    Test {
        #[arg(long, default_value = "rally")]
        title: String,

        #[arg(long, default_value = "Notifications are working")]
        body: String,
    },
}

impl Commands {
    /// Name reported in output envelopes, e.g. `task add`.
    pub fn name(&self) -> &'static str {
        match self {
            Commands::Task(cmd) => match cmd {
                TaskCommands::Add { .. } => "task add",
                TaskCommands::List { .. } => "task list",
                TaskCommands::Show { .. } => "task show",
                TaskCommands::Edit { .. } => "task edit",
                TaskCommands::Move { .. } => "task move",
                TaskCommands::Delete { .. } => "task delete",
                TaskCommands::Check { .. } => "task check",
                TaskCommands::Item { .. } => "task item",
            },
            Commands::Board(BoardCommands::Drop { .. }) => "board drop",
            Commands::Remind(cmd) => match cmd {
                RemindCommands::Add { .. } => "remind add",
                RemindCommands::List { .. } => "remind list",
                RemindCommands::Edit { .. } => "remind edit",
                RemindCommands::Delete { .. } => "remind delete",
                RemindCommands::Due => "remind due",
                RemindCommands::Compact { .. } => "remind compact",
            },
            Commands::Notify(cmd) => match cmd {
                NotifyCommands::Status => "notify status",
                NotifyCommands::Request { .. } => "notify request",
                NotifyCommands::Test { .. } => "notify test",
            },
            Commands::Watch { .. } => "watch",
        }
    }
}

/// Global flags shared by every command.
#[derive(Debug, Clone)]
pub(crate) struct Globals {
    pub dir: Option<PathBuf>,
    pub json: bool,
    pub quiet: bool,
    pub events: Option<String>,
}

/// Loaded data directory for one command.
pub(crate) struct Context {
    pub storage: Storage,
    pub config: Config,
    pub clock: SharedClock,
    pub tasks: TaskStore,
    pub reminders: ReminderStore,
}

impl Context {
    pub fn load(dir: Option<&std::path::Path>) -> Result<Self> {
        let storage = Storage::resolve(dir)?;
        storage.init()?;
        let config = Config::load_from_dir(storage.root())?;
        let clock = system_clock();
        let tasks = TaskStore::load(&storage, clock.clone())?;
        let reminders = ReminderStore::load(&storage, clock.clone())?;
        Ok(Self {
            storage,
            config,
            clock,
            tasks,
            reminders,
        })
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }
}

/// Event sink for `--events`, plus whether it writes to stdout.
pub(crate) struct Events {
    sink: Option<EventSink>,
    pub to_stdout: bool,
}

impl Events {
    pub fn open(raw: Option<&str>) -> Result<Self> {
        let destination = EventDestination::parse(raw);
        let sink = destination.as_ref().map(|dest| dest.open()).transpose()?;
        let to_stdout = matches!(destination, Some(EventDestination::Stdout));
        Ok(Self { sink, to_stdout })
    }

    pub fn into_sink(self) -> Option<EventSink> {
        self.sink
    }

    /// Emit one event; failures come back as a warning line.
    pub fn emit<T: Serialize>(
        &mut self,
        kind: EventKind,
        timestamp: DateTime<Utc>,
        data: T,
    ) -> Option<String> {
        let sink = self.sink.as_mut()?;
        let event = match Event::new(kind, timestamp).with_data(data) {
            Ok(event) => event,
            Err(err) => return Some(format!("event output failed: {err}")),
        };
        if let Err(err) = sink.emit(&event) {
            return Some(format!("event output failed: {err}"));
        }
        None
    }
}

impl Globals {
    pub fn output(&self, events_to_stdout: bool) -> crate::output::OutputOptions {
        crate::output::OutputOptions {
            json: self.json && !events_to_stdout,
            quiet: self.quiet || events_to_stdout,
        }
    }
}

/// Single-threaded runtime for the commands that await.
pub(crate) fn runtime() -> Result<tokio::runtime::Runtime> {
    Ok(tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?)
}

/// Parse a point in time relative to `now`.
///
/// Accepts RFC 3339, a bare `YYYY-MM-DD` (midnight UTC), `now`, or a signed
/// offset such as `+2d` / `-5m`.
pub(crate) fn parse_when(label: &str, value: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
    let trimmed = value.trim();
    if trimmed.eq_ignore_ascii_case("now") {
        return Ok(now);
    }
    if let Some(offset) = trimmed.strip_prefix('+') {
        return now
            .checked_add_signed(parse_offset(label, offset)?)
            .ok_or_else(|| out_of_range(label, value));
    }
    if let Some(offset) = trimmed.strip_prefix('-') {
        return now
            .checked_sub_signed(parse_offset(label, offset)?)
            .ok_or_else(|| out_of_range(label, value));
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(parsed.with_timezone(&Utc));
    }
    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        if let Some(midnight) = date.and_hms_opt(0, 0, 0) {
            return Ok(midnight.and_utc());
        }
    }
    Err(Error::InvalidArgument(format!(
        "invalid {label} '{value}' (expected RFC 3339, YYYY-MM-DD, now, or +/-duration)"
    )))
}

fn out_of_range(label: &str, value: &str) -> Error {
    Error::InvalidArgument(format!("{label} '{}' is out of range", value.trim()))
}

fn parse_offset(label: &str, offset: &str) -> Result<chrono::Duration> {
    parse_duration(offset)
        .map_err(|err| Error::InvalidArgument(format!("invalid {label} offset: {err}")))
}

pub(crate) fn parse_opt_when(
    label: &str,
    value: Option<&str>,
    now: DateTime<Utc>,
) -> Result<Option<DateTime<Utc>>> {
    value.map(|value| parse_when(label, value, now)).transpose()
}

impl Cli {
    /// Execute the CLI command
    pub fn run(self) -> Result<()> {
        let globals = Globals {
            dir: self.dir,
            json: self.json,
            quiet: self.quiet,
            events: self.events,
        };
        match self.command {
            Commands::Task(cmd) => match cmd {
                TaskCommands::Add {
                    title,
                    due,
                    description,
                    status,
                    priority,
                    category,
                    assignees,
                    items,
                    remind,
                } => task::run_add(
                    task::AddOptions {
                        title,
                        due,
                        description,
                        status,
                        priority,
                        category,
                        assignees,
                        items,
                        remind,
                    },
                    &globals,
                ),
                TaskCommands::List {
                    status,
                    priority,
                    category,
                    assignee,
                    from,
                    to,
                    text,
                    sort,
                    direction,
                } => task::run_list(
                    task::ListOptions {
                        status,
                        priority,
                        category,
                        assignee,
                        from,
                        to,
                        text,
                        sort,
                        direction,
                    },
                    &globals,
                ),
                TaskCommands::Show { id } => task::run_show(id, &globals),
                TaskCommands::Edit {
                    id,
                    title,
                    description,
                    priority,
                    category,
                    clear_category,
                    assignees,
                    clear_assignees,
                    due,
                    remind,
                    clear_remind,
                } => task::run_edit(
                    task::EditOptions {
                        id,
                        title,
                        description,
                        priority,
                        category,
                        clear_category,
                        assignees,
                        clear_assignees,
                        due,
                        remind,
                        clear_remind,
                    },
                    &globals,
                ),
                TaskCommands::Move { id, status } => task::run_move(id, status, &globals),
                TaskCommands::Delete { id } => task::run_delete(id, &globals),
                TaskCommands::Check { id, item } => task::run_check(id, item, &globals),
                TaskCommands::Item { id, text } => task::run_item(id, text, &globals),
            },
            Commands::Board(cmd) => match cmd {
                BoardCommands::Drop {
                    task,
                    column,
                    card,
                    target,
                } => board::run_drop(
                    board::DropOptions {
                        task,
                        column,
                        card,
                        target,
                    },
                    &globals,
                ),
            },
            Commands::Remind(cmd) => match cmd {
                RemindCommands::Add { task, at, channel } => remind::run_add(
                    remind::AddOptions { task, at, channel },
                    &globals,
                ),
                RemindCommands::List { task, pending } => {
                    remind::run_list(task, pending, &globals)
                }
                RemindCommands::Edit {
                    id,
                    task,
                    at,
                    channel,
                } => remind::run_edit(
                    remind::EditOptions {
                        id,
                        task,
                        at,
                        channel,
                    },
                    &globals,
                ),
                RemindCommands::Delete { id } => remind::run_delete(id, &globals),
                RemindCommands::Due => remind::run_due(&globals),
                RemindCommands::Compact { older_than } => {
                    remind::run_compact(older_than, &globals)
                }
            },
            Commands::Notify(cmd) => match cmd {
                NotifyCommands::Status => notify::run_status(&globals),
                NotifyCommands::Request { yes, no } => {
                    let answer = match (yes, no) {
                        (true, _) => Some(true),
                        (_, true) => Some(false),
                        _ => None,
                    };
                    notify::run_request(answer, &globals)
                }
                NotifyCommands::Test { title, body } => notify::run_test(title, body, &globals),
            },
            Commands::Watch { interval, once } => watch::run(interval, once, &globals),
        }
    }
}
