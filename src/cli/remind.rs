//! rally remind command implementations.

use serde::Serialize;

use crate::cli::{parse_opt_when, parse_when, Context, Events, Globals};
use crate::config::parse_duration;
use crate::error::{Error, Result};
use crate::events::EventKind;
use crate::output::{emit_success, HumanOutput};
use crate::reminder::{Channel, Reminder, ReminderCompactReport, ReminderPatch};
use crate::task::TaskStore;

pub struct AddOptions {
    pub task: String,
    pub at: String,
    pub channel: String,
}

pub struct EditOptions {
    pub id: String,
    pub task: Option<String>,
    pub at: Option<String>,
    pub channel: Option<String>,
}

#[derive(Serialize)]
struct ReminderListOutput<'a> {
    total: usize,
    reminders: Vec<&'a Reminder>,
}

#[derive(Serialize)]
struct ReminderDueOutput<'a> {
    due: Vec<&'a Reminder>,
    upcoming: Vec<&'a Reminder>,
}

#[derive(Serialize)]
struct ReminderDeletedOutput {
    id: String,
    deleted: bool,
}

pub fn run_add(options: AddOptions, globals: &Globals) -> Result<()> {
    let mut ctx = Context::load(globals.dir.as_deref())?;
    let mut events = Events::open(globals.events.as_deref())?;
    let task_id = ctx.tasks.resolve_id(&options.task)?;
    let fire_date = parse_when("fire time", &options.at, ctx.now())?;
    let channel: Channel = options.channel.parse()?;

    let reminder_id = ctx.reminders.add(task_id.clone(), fire_date, channel);
    ctx.reminders.save(&ctx.storage)?;

    let reminder = ctx
        .reminders
        .get(&reminder_id)
        .ok_or_else(|| Error::ReminderNotFound(reminder_id.clone()))?;
    let mut human = HumanOutput::new("Reminder scheduled");
    if let Some(warning) = events.emit(EventKind::ReminderCreated, reminder.created_at, reminder) {
        human.push_warning(warning);
    }
    human.push_summary("ID", reminder.id.clone());
    human.push_summary("Task", task_id);
    human.push_summary("At", fire_date.to_rfc3339());
    human.push_summary("Channel", channel.to_string());
    if channel == Channel::Email {
        human.push_warning("email reminders are recorded but never delivered");
    }

    emit_success(globals.output(events.to_stdout), "remind add", reminder, Some(&human))
}

pub fn run_list(task: Option<String>, pending: bool, globals: &Globals) -> Result<()> {
    let ctx = Context::load(globals.dir.as_deref())?;
    let task_id = task.map(|task| ctx.tasks.resolve_id(&task)).transpose()?;

    let reminders: Vec<&Reminder> = ctx
        .reminders
        .reminders()
        .iter()
        .filter(|reminder| task_id.as_deref().map_or(true, |id| reminder.task_id == id))
        .filter(|reminder| !pending || !reminder.sent)
        .collect();

    let label = ctx.config.scheduler.orphan_label.as_str();
    let mut human = HumanOutput::new("Reminders");
    human.push_summary("Total", reminders.len().to_string());
    for reminder in &reminders {
        human.push_detail(reminder_line(reminder, &ctx.tasks, label));
    }

    let output = ReminderListOutput {
        total: reminders.len(),
        reminders,
    };
    emit_success(globals.output(false), "remind list", &output, Some(&human))
}

pub fn run_edit(options: EditOptions, globals: &Globals) -> Result<()> {
    let mut ctx = Context::load(globals.dir.as_deref())?;
    let mut events = Events::open(globals.events.as_deref())?;
    let resolved = ctx.reminders.resolve_id(&options.id)?;

    let patch = ReminderPatch {
        task_id: options
            .task
            .map(|task| ctx.tasks.resolve_id(&task))
            .transpose()?,
        fire_date: parse_opt_when("fire time", options.at.as_deref(), ctx.now())?,
        channel: options.channel.as_deref().map(str::parse).transpose()?,
    };

    if !ctx.reminders.update(&resolved, patch) {
        return Err(Error::InvalidArgument(format!(
            "reminder {resolved} was already sent and can no longer be edited"
        )));
    }
    ctx.reminders.save(&ctx.storage)?;

    let reminder = ctx
        .reminders
        .get(&resolved)
        .ok_or_else(|| Error::ReminderNotFound(resolved.clone()))?;
    let mut human = HumanOutput::new("Reminder updated");
    if let Some(warning) = events.emit(EventKind::ReminderUpdated, ctx.now(), reminder) {
        human.push_warning(warning);
    }
    human.push_summary("ID", reminder.id.clone());
    human.push_summary("Task", reminder.task_id.clone());
    human.push_summary("At", reminder.fire_date.to_rfc3339());
    human.push_summary("Channel", reminder.channel.to_string());

    emit_success(globals.output(events.to_stdout), "remind edit", reminder, Some(&human))
}

pub fn run_delete(id: String, globals: &Globals) -> Result<()> {
    let mut ctx = Context::load(globals.dir.as_deref())?;
    let mut events = Events::open(globals.events.as_deref())?;
    let resolved = ctx.reminders.resolve_id(&id)?;

    let deleted = ctx.reminders.delete(&resolved);
    ctx.reminders.save(&ctx.storage)?;

    let mut human = HumanOutput::new("Reminder deleted");
    if deleted {
        if let Some(warning) = events.emit(
            EventKind::ReminderDeleted,
            ctx.now(),
            serde_json::json!({ "id": resolved }),
        ) {
            human.push_warning(warning);
        }
    }
    human.push_summary("ID", resolved.clone());

    let output = ReminderDeletedOutput {
        id: resolved,
        deleted,
    };
    emit_success(globals.output(events.to_stdout), "remind delete", &output, Some(&human))
}

pub fn run_due(globals: &Globals) -> Result<()> {
    let ctx = Context::load(globals.dir.as_deref())?;
    let now = ctx.now();
    let due = ctx.reminders.due_at(now);
    let upcoming = ctx.reminders.upcoming_at(now);

    let label = ctx.config.scheduler.orphan_label.as_str();
    let mut human = HumanOutput::new("Reminders");
    human.push_summary("Due", due.len().to_string());
    human.push_summary("Upcoming", upcoming.len().to_string());
    for reminder in &due {
        human.push_detail(format!("due: {}", reminder_line(reminder, &ctx.tasks, label)));
    }
    for reminder in &upcoming {
        human.push_detail(format!("upcoming: {}", reminder_line(reminder, &ctx.tasks, label)));
    }
    if !due.is_empty() {
        human.push_next_step("rally watch --once");
    }

    let output = ReminderDueOutput { due, upcoming };
    emit_success(globals.output(false), "remind due", &output, Some(&human))
}

pub fn run_compact(older_than: Option<String>, globals: &Globals) -> Result<()> {
    let mut ctx = Context::load(globals.dir.as_deref())?;
    let older_than = match older_than.as_deref() {
        Some(raw) => parse_duration(raw)?,
        None => ctx.config.reminders.retention()?.ok_or_else(|| {
            Error::InvalidArgument(
                "no cutoff given: pass --older-than or set reminders.retention".to_string(),
            )
        })?,
    };
    if older_than <= chrono::Duration::zero() {
        return Err(Error::InvalidArgument("--older-than must be > 0".to_string()));
    }

    let report: ReminderCompactReport = ctx.reminders.compact(older_than);
    if report.removed > 0 {
        ctx.reminders.save(&ctx.storage)?;
    }

    let mut human = HumanOutput::new("Reminders compacted");
    human.push_summary("Before", report.before.to_string());
    human.push_summary("After", report.after.to_string());
    human.push_summary("Removed", report.removed.to_string());

    emit_success(globals.output(false), "remind compact", &report, Some(&human))
}

fn reminder_line(reminder: &Reminder, tasks: &TaskStore, orphan_label: &str) -> String {
    let title = tasks
        .get(&reminder.task_id)
        .map_or(orphan_label, |task| task.title.as_str());
    let state = if reminder.sent { "sent" } else { "pending" };
    format!(
        "{} {} [{}] {} -> {} ({})",
        reminder.id,
        reminder.fire_date.to_rfc3339(),
        reminder.channel,
        state,
        reminder.task_id,
        title
    )
}
