//! rally watch: run the reminder scheduler in the foreground.

use std::sync::{Arc, Mutex};

use serde::Serialize;
use tracing::info;

use crate::cli::{runtime, Context, Events, Globals};
use crate::config::parse_duration;
use crate::error::{Error, Result};
use crate::notify::terminal::TerminalBackend;
use crate::notify::Notifier;
use crate::output::{emit_success, HumanOutput};
use crate::scheduler::{CycleReport, ReminderScheduler, SchedulerOptions};

#[derive(Serialize)]
struct WatchOutput {
    interval_secs: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    cycle: Option<CycleReport>,
}

pub fn run(interval: Option<String>, once: bool, globals: &Globals) -> Result<()> {
    let ctx = Context::load(globals.dir.as_deref())?;
    let events = Events::open(globals.events.as_deref())?;
    let events_to_stdout = events.to_stdout;

    let mut options = SchedulerOptions::from_config(&ctx.config)?;
    if let Some(raw) = interval.as_deref() {
        options.interval = parse_duration(raw)?
            .to_std()
            .ok()
            .filter(|interval| !interval.is_zero())
            .ok_or_else(|| Error::InvalidArgument("--interval must be > 0".to_string()))?;
    }
    let interval_secs = options.interval.as_secs();

    let notifier = Notifier::new(Arc::new(TerminalBackend::new(ctx.storage.clone())))
        .with_display_window(ctx.config.scheduler.display_window()?);
    let mut scheduler = ReminderScheduler::new(
        Arc::new(Mutex::new(ctx.tasks)),
        Arc::new(Mutex::new(ctx.reminders)),
        Arc::new(notifier),
        options,
    )
    .with_storage(ctx.storage.clone());
    if let Some(sink) = events.into_sink() {
        scheduler = scheduler.with_events(sink.shared());
    }
    let scheduler = Arc::new(scheduler);

    let mut human = HumanOutput::new(if once {
        "Scheduler cycle"
    } else {
        "Scheduler stopped"
    });
    let cycle = if once {
        let report = scheduler.run_cycle();
        push_cycle_summary(&mut human, &report);
        Some(report)
    } else {
        let rt = runtime()?;
        rt.block_on(async {
            let handle = scheduler.start()?;
            tokio::signal::ctrl_c().await?;
            info!("interrupt received; stopping scheduler");
            handle.stop().await;
            Ok::<_, Error>(())
        })?;
        None
    };
    human.push_summary("Interval", format!("{interval_secs}s"));

    let output = WatchOutput {
        interval_secs,
        cycle,
    };
    emit_success(globals.output(events_to_stdout), "watch", &output, Some(&human))
}

fn push_cycle_summary(human: &mut HumanOutput, report: &CycleReport) {
    if report.skipped_permission {
        human.push_warning("notification permission not granted; cycle skipped");
        human.push_next_step("rally notify request");
        return;
    }
    human.push_summary("Due", report.due.to_string());
    human.push_summary("Dispatched", report.dispatched.to_string());
    if report.skipped_channel > 0 {
        human.push_summary("Email (not delivered)", report.skipped_channel.to_string());
    }
    if report.orphaned > 0 {
        human.push_summary("Orphaned", report.orphaned.to_string());
    }
    if report.failed > 0 {
        human.push_warning(format!("{} reminder(s) failed; see RUST_LOG=rally=error", report.failed));
    }
    if let Some(removed) = report.compacted {
        human.push_summary("Compacted", removed.to_string());
    }
}
