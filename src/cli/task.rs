//! rally task command implementations.

use std::collections::BTreeSet;

use serde::Serialize;

use crate::cli::{parse_opt_when, parse_when, Context, Events, Globals};
use crate::error::{Error, Result};
use crate::events::EventKind;
use crate::ids;
use crate::output::{emit_success, HumanOutput};
use crate::query::{SortDirection, SortField, TaskFilter, TaskSort};
use crate::reminder::{Channel, ReminderStore};
use crate::task::{NewTask, Priority, Task, TaskPatch, TaskStatus, TaskStore};

pub struct AddOptions {
    pub title: String,
    pub due: String,
    pub description: Option<String>,
    pub status: String,
    pub priority: String,
    pub category: Option<String>,
    pub assignees: Vec<String>,
    pub items: Vec<String>,
    pub remind: Option<String>,
}

pub struct ListOptions {
    pub status: Option<String>,
    pub priority: Option<String>,
    pub category: Option<String>,
    pub assignee: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub text: Option<String>,
    pub sort: Option<String>,
    pub direction: Option<String>,
}

pub struct EditOptions {
    pub id: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub priority: Option<String>,
    pub category: Option<String>,
    pub clear_category: bool,
    pub assignees: Vec<String>,
    pub clear_assignees: bool,
    pub due: Option<String>,
    pub remind: Option<String>,
    pub clear_remind: bool,
}

#[derive(Serialize)]
struct TaskCreatedOutput {
    id: String,
    status: TaskStatus,
    priority: Priority,
    #[serde(skip_serializing_if = "Option::is_none")]
    reminder_id: Option<String>,
}

#[derive(Serialize)]
struct TaskListOutput<'a> {
    total: usize,
    sort: TaskSort,
    tasks: Vec<&'a Task>,
}

#[derive(Serialize)]
struct TaskStatusOutput {
    id: String,
    from: TaskStatus,
    to: TaskStatus,
}

#[derive(Serialize)]
struct TaskDeletedOutput {
    id: String,
    deleted: bool,
    /// Reminders left pointing at the deleted task.
    orphaned_reminders: usize,
}

#[derive(Serialize)]
struct ChecklistOutput {
    task_id: String,
    item_id: String,
    completed: bool,
}

pub fn run_add(options: AddOptions, globals: &Globals) -> Result<()> {
    let mut ctx = Context::load(globals.dir.as_deref())?;
    let mut events = Events::open(globals.events.as_deref())?;

    let title = options.title.trim();
    if title.is_empty() {
        return Err(Error::InvalidArgument("title cannot be empty".to_string()));
    }
    let now = ctx.now();
    let status: TaskStatus = options.status.parse()?;
    let priority: Priority = options.priority.parse()?;
    let due_date = parse_when("due date", &options.due, now)?;
    let reminder_date = parse_opt_when("reminder", options.remind.as_deref(), now)?;

    let mut data = NewTask::new(title, status, priority, due_date);
    data.description = options.description.unwrap_or_default();
    data.category_id = non_empty(options.category);
    data.assignee_ids = collect_assignees(options.assignees);
    data.checklist = options
        .items
        .into_iter()
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty())
        .collect();
    data.reminder_date = reminder_date;

    let task_id = ctx.tasks.add(data);
    let reminder_id =
        reminder_date.map(|at| ctx.reminders.add(task_id.clone(), at, Channel::Browser));
    ctx.tasks.save(&ctx.storage)?;
    if reminder_id.is_some() {
        ctx.reminders.save(&ctx.storage)?;
    }

    let mut human = HumanOutput::new("Task created");
    if let Some(task) = ctx.tasks.get(&task_id) {
        if let Some(warning) = events.emit(EventKind::TaskCreated, task.created_at, task) {
            human.push_warning(warning);
        }
    }
    if let Some(reminder) = reminder_id.as_deref().and_then(|id| ctx.reminders.get(id)) {
        if let Some(warning) = events.emit(EventKind::ReminderCreated, reminder.created_at, reminder)
        {
            human.push_warning(warning);
        }
    }

    human.push_summary("ID", task_id.clone());
    human.push_summary("Status", status.to_string());
    human.push_summary("Priority", priority.to_string());
    human.push_summary("Due", due_date.to_rfc3339());
    if let Some(reminder_id) = reminder_id.as_ref() {
        human.push_summary("Reminder", reminder_id.clone());
    }

    let output = TaskCreatedOutput {
        id: task_id,
        status,
        priority,
        reminder_id,
    };
    emit_success(globals.output(events.to_stdout), "task add", &output, Some(&human))
}

pub fn run_list(options: ListOptions, globals: &Globals) -> Result<()> {
    let ctx = Context::load(globals.dir.as_deref())?;
    let now = ctx.now();

    let mut filter = TaskFilter::default();
    if let Some(status) = options.status.as_deref() {
        filter = filter.with_status(status.parse()?);
    }
    if let Some(priority) = options.priority.as_deref() {
        filter = filter.with_priority(priority.parse()?);
    }
    if let Some(category) = non_empty(options.category) {
        filter = filter.with_category(category);
    }
    if let Some(assignee) = non_empty(options.assignee) {
        filter = filter.with_assignee(assignee);
    }
    filter = filter.with_due_range(
        parse_opt_when("from", options.from.as_deref(), now)?,
        parse_opt_when("to", options.to.as_deref(), now)?,
    );
    if let Some(text) = non_empty(options.text) {
        filter = filter.with_text(text);
    }

    let field: SortField = match options.sort.as_deref() {
        Some(raw) => raw.parse()?,
        None => ctx.config.query.default_sort,
    };
    let direction: SortDirection = match options.direction.as_deref() {
        Some(raw) => raw.parse()?,
        None => ctx.config.query.default_direction,
    };
    let sort = TaskSort { field, direction };
    let tasks = ctx.tasks.query(&filter, Some(sort));

    let mut human = HumanOutput::new("Tasks");
    human.push_summary("Total", tasks.len().to_string());
    human.push_summary("Sort", format!("{field} {}", direction_label(direction)));
    for task in &tasks {
        human.push_detail(task_line(task));
    }

    let output = TaskListOutput {
        total: tasks.len(),
        sort,
        tasks,
    };
    emit_success(globals.output(false), "task list", &output, Some(&human))
}

pub fn run_show(id: String, globals: &Globals) -> Result<()> {
    let ctx = Context::load(globals.dir.as_deref())?;
    let resolved = ctx.tasks.resolve_id(&id)?;
    let task = ctx
        .tasks
        .get(&resolved)
        .ok_or_else(|| Error::TaskNotFound(resolved.clone()))?;

    let mut human = HumanOutput::new(format!("Task {}", task.id));
    push_task_summary(&mut human, task);
    for item in &task.checklist {
        let mark = if item.completed { "x" } else { " " };
        human.push_detail(format!("[{mark}] {} {}", item.id, item.text));
    }
    for reminder in ctx.reminders.for_task(&task.id) {
        let state = if reminder.sent { "sent" } else { "pending" };
        human.push_detail(format!(
            "reminder {} at {} via {} ({state})",
            reminder.id,
            reminder.fire_date.to_rfc3339(),
            reminder.channel
        ));
    }

    emit_success(globals.output(false), "task show", task, Some(&human))
}

pub fn run_edit(options: EditOptions, globals: &Globals) -> Result<()> {
    let mut ctx = Context::load(globals.dir.as_deref())?;
    let mut events = Events::open(globals.events.as_deref())?;
    let resolved = ctx.tasks.resolve_id(&options.id)?;
    let now = ctx.now();

    let mut patch = TaskPatch::default();
    if let Some(title) = options.title {
        let title = title.trim().to_string();
        if title.is_empty() {
            return Err(Error::InvalidArgument("title cannot be empty".to_string()));
        }
        patch.title = Some(title);
    }
    patch.description = options.description;
    patch.priority = options.priority.as_deref().map(str::parse).transpose()?;
    if options.clear_category {
        patch.category_id = Some(None);
    } else if let Some(category) = non_empty(options.category) {
        patch.category_id = Some(Some(category));
    }
    if options.clear_assignees {
        patch.assignee_ids = Some(BTreeSet::new());
    } else if !options.assignees.is_empty() {
        patch.assignee_ids = Some(collect_assignees(options.assignees));
    }
    patch.due_date = parse_opt_when("due date", options.due.as_deref(), now)?;
    if options.clear_remind {
        patch.reminder_date = Some(None);
    } else if let Some(at) = parse_opt_when("reminder", options.remind.as_deref(), now)? {
        patch.reminder_date = Some(Some(at));
    }

    ctx.tasks.update(&resolved, patch);
    ctx.tasks.save(&ctx.storage)?;

    let task = ctx
        .tasks
        .get(&resolved)
        .ok_or_else(|| Error::TaskNotFound(resolved.clone()))?;
    let mut human = HumanOutput::new("Task updated");
    if let Some(warning) = events.emit(EventKind::TaskUpdated, task.updated_at, task) {
        human.push_warning(warning);
    }
    push_task_summary(&mut human, task);

    emit_success(globals.output(events.to_stdout), "task edit", task, Some(&human))
}

pub fn run_move(id: String, status: String, globals: &Globals) -> Result<()> {
    let mut ctx = Context::load(globals.dir.as_deref())?;
    let mut events = Events::open(globals.events.as_deref())?;
    let resolved = ctx.tasks.resolve_id(&id)?;
    let to: TaskStatus = status.parse()?;
    let from = ctx
        .tasks
        .get(&resolved)
        .map(|task| task.status)
        .ok_or_else(|| Error::TaskNotFound(resolved.clone()))?;

    ctx.tasks.move_status(&resolved, to);
    ctx.tasks.save(&ctx.storage)?;

    let output = TaskStatusOutput {
        id: resolved.clone(),
        from,
        to,
    };
    let mut human = HumanOutput::new("Task status updated");
    if let Some(task) = ctx.tasks.get(&resolved) {
        if let Some(warning) = events.emit(EventKind::TaskStatusChanged, task.updated_at, &output) {
            human.push_warning(warning);
        }
    }
    human.push_summary("ID", resolved);
    human.push_summary("Status", format!("{from} -> {to}"));

    emit_success(globals.output(events.to_stdout), "task move", &output, Some(&human))
}

pub fn run_delete(id: String, globals: &Globals) -> Result<()> {
    let mut ctx = Context::load(globals.dir.as_deref())?;
    let mut events = Events::open(globals.events.as_deref())?;
    let resolved = ctx.tasks.resolve_id(&id)?;

    let deleted = ctx.tasks.delete(&resolved);
    ctx.tasks.save(&ctx.storage)?;
    let orphaned_reminders = pending_reminders(&ctx.reminders, &resolved);

    let mut human = HumanOutput::new("Task deleted");
    if deleted {
        if let Some(warning) = events.emit(
            EventKind::TaskDeleted,
            ctx.now(),
            serde_json::json!({ "id": resolved }),
        ) {
            human.push_warning(warning);
        }
    }
    human.push_summary("ID", resolved.clone());
    if orphaned_reminders > 0 {
        human.push_warning(format!(
            "{orphaned_reminders} pending reminder(s) still point at this task"
        ));
        human.push_next_step(format!("rally remind list --task {resolved}"));
    }

    let output = TaskDeletedOutput {
        id: resolved,
        deleted,
        orphaned_reminders,
    };
    emit_success(globals.output(events.to_stdout), "task delete", &output, Some(&human))
}

pub fn run_check(id: String, item: String, globals: &Globals) -> Result<()> {
    let mut ctx = Context::load(globals.dir.as_deref())?;
    let mut events = Events::open(globals.events.as_deref())?;
    let resolved = ctx.tasks.resolve_id(&id)?;
    let item_id = resolve_item(&ctx.tasks, &resolved, &item)?;

    ctx.tasks.toggle_checklist_item(&resolved, &item_id);
    ctx.tasks.save(&ctx.storage)?;

    let task = ctx
        .tasks
        .get(&resolved)
        .ok_or_else(|| Error::TaskNotFound(resolved.clone()))?;
    let completed = task
        .checklist
        .iter()
        .find(|entry| entry.id == item_id)
        .is_some_and(|entry| entry.completed);
    let output = ChecklistOutput {
        task_id: resolved.clone(),
        item_id: item_id.clone(),
        completed,
    };

    let mut human = HumanOutput::new(if completed {
        "Checklist item completed"
    } else {
        "Checklist item reopened"
    });
    if let Some(warning) = events.emit(EventKind::ChecklistToggled, task.updated_at, &output) {
        human.push_warning(warning);
    }
    let (done, total) = task.checklist_progress();
    human.push_summary("Task", resolved);
    human.push_summary("Item", item_id);
    human.push_summary("Progress", format!("{done}/{total}"));

    emit_success(globals.output(events.to_stdout), "task check", &output, Some(&human))
}

pub fn run_item(id: String, text: String, globals: &Globals) -> Result<()> {
    let mut ctx = Context::load(globals.dir.as_deref())?;
    let mut events = Events::open(globals.events.as_deref())?;
    let resolved = ctx.tasks.resolve_id(&id)?;
    let text = text.trim();
    if text.is_empty() {
        return Err(Error::InvalidArgument("item text cannot be empty".to_string()));
    }

    let item_id = ctx
        .tasks
        .add_checklist_item(&resolved, text)
        .ok_or_else(|| Error::TaskNotFound(resolved.clone()))?;
    ctx.tasks.save(&ctx.storage)?;

    let mut human = HumanOutput::new("Checklist item added");
    if let Some(task) = ctx.tasks.get(&resolved) {
        if let Some(warning) = events.emit(EventKind::TaskUpdated, task.updated_at, task) {
            human.push_warning(warning);
        }
    }
    human.push_summary("Task", resolved.clone());
    human.push_summary("Item", item_id.clone());

    let output = ChecklistOutput {
        task_id: resolved,
        item_id,
        completed: false,
    };
    emit_success(globals.output(events.to_stdout), "task item", &output, Some(&human))
}

fn resolve_item(tasks: &TaskStore, task_id: &str, input: &str) -> Result<String> {
    let task = tasks
        .get(task_id)
        .ok_or_else(|| Error::TaskNotFound(task_id.to_string()))?;
    ids::resolve_id(input, task.checklist.iter().map(|item| item.id.as_str())).map_err(|_| {
        Error::InvalidArgument(format!("checklist item not found on {task_id}: {input}"))
    })
}

fn pending_reminders(reminders: &ReminderStore, task_id: &str) -> usize {
    reminders
        .for_task(task_id)
        .into_iter()
        .filter(|reminder| !reminder.sent)
        .count()
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn collect_assignees(values: Vec<String>) -> BTreeSet<String> {
    values
        .into_iter()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .collect()
}

fn direction_label(direction: SortDirection) -> &'static str {
    match direction {
        SortDirection::Asc => "asc",
        SortDirection::Desc => "desc",
    }
}

fn task_line(task: &Task) -> String {
    let mut line = format!(
        "[{}][{}] {} {} (due {})",
        task.status,
        task.priority,
        task.id,
        task.title,
        task.due_date.format("%Y-%m-%d")
    );
    let (done, total) = task.checklist_progress();
    if total > 0 {
        line.push_str(&format!(" [{done}/{total}]"));
    }
    line
}

fn push_task_summary(human: &mut HumanOutput, task: &Task) {
    human.push_summary("Title", task.title.clone());
    human.push_summary("Status", task.status.to_string());
    human.push_summary("Priority", task.priority.to_string());
    human.push_summary("Due", task.due_date.to_rfc3339());
    if let Some(category) = task.category_id.as_ref() {
        human.push_summary("Category", category.clone());
    }
    if !task.assignee_ids.is_empty() {
        let assignees: Vec<&str> = task.assignee_ids.iter().map(String::as_str).collect();
        human.push_summary("Assignees", assignees.join(", "));
    }
    if let Some(reminder_date) = task.reminder_date {
        human.push_summary("Reminder", reminder_date.to_rfc3339());
    }
    let (done, total) = task.checklist_progress();
    if total > 0 {
        human.push_summary("Checklist", format!("{done}/{total}"));
    }
    human.push_summary("Created", task.created_at.to_rfc3339());
    human.push_summary("Updated", task.updated_at.to_rfc3339());
    if !task.description.is_empty() {
        human.push_detail(task.description.clone());
    }
}
