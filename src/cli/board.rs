//! rally board command implementations.

use serde::Serialize;

use crate::cli::{Context, Events, Globals};
use crate::error::Result;
use crate::events::EventKind;
use crate::kanban::{apply_drop, DropEvent, DropTarget, StatusMove};
use crate::output::{emit_success, HumanOutput};

pub struct DropOptions {
    pub task: String,
    pub column: Option<String>,
    pub card: Option<String>,
    pub target: Option<String>,
}

#[derive(Serialize)]
struct DropOutput {
    event: DropEvent,
    moved: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    change: Option<StatusMove>,
}

pub fn run_drop(options: DropOptions, globals: &Globals) -> Result<()> {
    let mut ctx = Context::load(globals.dir.as_deref())?;
    let mut events = Events::open(globals.events.as_deref())?;
    let task_id = ctx.tasks.resolve_id(&options.task)?;

    // A card target that doesn't resolve stays as typed; the drop then
    // resolves to no move, same as releasing over an unknown card.
    let target = if let Some(column) = options.column.as_deref() {
        Some(DropTarget::Column(column.parse()?))
    } else if let Some(card) = options.card {
        let card = ctx.tasks.resolve_id(&card).unwrap_or(card);
        Some(DropTarget::Task(card))
    } else {
        options.target.map(DropTarget::Raw)
    };

    let event = DropEvent::new(task_id.clone(), target);
    let change = apply_drop(&mut ctx.tasks, &event);

    let mut human = HumanOutput::new(if change.is_some() {
        "Card moved"
    } else {
        "Card not moved"
    });
    human.push_summary("ID", task_id.clone());
    match change.as_ref() {
        Some(status_move) => {
            ctx.tasks.save(&ctx.storage)?;
            let timestamp = ctx
                .tasks
                .get(&task_id)
                .map(|task| task.updated_at)
                .unwrap_or_else(|| ctx.now());
            if let Some(warning) = events.emit(EventKind::TaskStatusChanged, timestamp, status_move)
            {
                human.push_warning(warning);
            }
            human.push_summary("Status", format!("{} -> {}", status_move.from, status_move.to));
        }
        None => {
            human.push_detail("drop target is missing, unknown, or the card's current status");
        }
    }

    let output = DropOutput {
        moved: change.is_some(),
        event,
        change,
    };
    emit_success(globals.output(events.to_stdout), "board drop", &output, Some(&human))
}
