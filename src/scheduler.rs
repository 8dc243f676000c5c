//! Reminder scheduler.
//!
//! A background task that wakes on a fixed interval (and once immediately on
//! start), collects due reminders and hands them to the [`Notifier`]. Every
//! processed reminder is marked sent whether or not anything was displayed,
//! so a reminder is dispatched at most once.
//!
//! The stores are shared with the CLI through `Arc<Mutex<_>>`. A cycle takes
//! each lock for one store call at a time and contains no await point.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::events::{Event, EventKind, SharedEventSink};
use crate::notify::Notifier;
use crate::reminder::{Channel, Reminder, ReminderStore};
use crate::storage::Storage;
use crate::task::TaskStore;

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(60);
pub const DEFAULT_ORPHAN_LABEL: &str = "(deleted task)";

#[derive(Debug, Clone)]
pub struct SchedulerOptions {
    pub interval: Duration,
    pub orphan_label: String,
    /// Sent reminders older than this are compacted after a cycle.
    pub retention: Option<chrono::Duration>,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            orphan_label: DEFAULT_ORPHAN_LABEL.to_string(),
            retention: None,
        }
    }
}

impl SchedulerOptions {
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            interval: config.scheduler.interval()?,
            orphan_label: config.scheduler.orphan_label.clone(),
            retention: config.reminders.retention()?,
        })
    }
}

/// What one cycle did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    /// Permission was not granted; nothing was touched.
    pub skipped_permission: bool,
    pub due: usize,
    /// Browser reminders handed to the notifier.
    pub dispatched: usize,
    /// Email reminders marked sent without delivery.
    pub skipped_channel: usize,
    /// Reminders whose task no longer exists.
    pub orphaned: usize,
    pub failed: usize,
    pub marked_sent: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compacted: Option<usize>,
}

enum Processed {
    Dispatched { orphaned: bool, marked: bool },
    ChannelSkipped { orphaned: bool, marked: bool },
}

pub struct ReminderScheduler {
    tasks: Arc<Mutex<TaskStore>>,
    reminders: Arc<Mutex<ReminderStore>>,
    notifier: Arc<Notifier>,
    options: SchedulerOptions,
    storage: Option<Storage>,
    events: Option<SharedEventSink>,
    running: Arc<AtomicBool>,
}

impl ReminderScheduler {
    pub fn new(
        tasks: Arc<Mutex<TaskStore>>,
        reminders: Arc<Mutex<ReminderStore>>,
        notifier: Arc<Notifier>,
        options: SchedulerOptions,
    ) -> Self {
        Self {
            tasks,
            reminders,
            notifier,
            options,
            storage: None,
            events: None,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Keep the stores in step with the snapshot files: both are reloaded
    /// before each cycle and reminders are saved after a cycle that marked
    /// anything sent.
    pub fn with_storage(mut self, storage: Storage) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn with_events(mut self, events: SharedEventSink) -> Self {
        self.events = Some(events);
        self
    }

    pub fn options(&self) -> &SchedulerOptions {
        &self.options
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Run one cycle now.
    pub fn run_cycle(&self) -> CycleReport {
        let mut report = CycleReport::default();

        let permission = self.notifier.check_permission();
        if !permission.is_granted() {
            debug!(%permission, "scheduler cycle skipped: notifications not granted");
            report.skipped_permission = true;
            return report;
        }

        if let Err(err) = self.reload() {
            error!(error = %err, "scheduler cycle aborted: could not reload snapshots");
            report.failed += 1;
            return report;
        }

        let due: Vec<Reminder> = match self.reminders.lock() {
            Ok(store) => store.due_now().into_iter().cloned().collect(),
            Err(_) => {
                error!("scheduler cycle aborted: reminder store poisoned");
                report.failed += 1;
                return report;
            }
        };
        report.due = due.len();

        for reminder in &due {
            let processed = panic::catch_unwind(AssertUnwindSafe(|| self.process(reminder)));
            match processed {
                Ok(Ok(Processed::Dispatched { orphaned, marked })) => {
                    report.dispatched += 1;
                    report.orphaned += usize::from(orphaned);
                    report.marked_sent += usize::from(marked);
                }
                Ok(Ok(Processed::ChannelSkipped { orphaned, marked })) => {
                    report.skipped_channel += 1;
                    report.orphaned += usize::from(orphaned);
                    report.marked_sent += usize::from(marked);
                }
                Ok(Err(err)) => {
                    error!(reminder_id = %reminder.id, error = %err, "failed to process reminder");
                    report.failed += 1;
                }
                Err(payload) => {
                    error!(
                        reminder_id = %reminder.id,
                        panic = panic_message(payload.as_ref()),
                        "reminder processing panicked"
                    );
                    report.failed += 1;
                    report.marked_sent += usize::from(self.mark_after_panic(reminder));
                }
            }
        }

        if report.marked_sent > 0 {
            report.compacted = self.after_cycle();
        }
        if report.due > 0 {
            info!(
                due = report.due,
                dispatched = report.dispatched,
                skipped_channel = report.skipped_channel,
                orphaned = report.orphaned,
                failed = report.failed,
                "scheduler cycle complete"
            );
        }
        report
    }

    fn reload(&self) -> Result<()> {
        let Some(storage) = &self.storage else {
            return Ok(());
        };
        self.tasks.lock()?.reload(storage)?;
        self.reminders.lock()?.reload(storage)?;
        Ok(())
    }

    /// A panicking reminder still counts as processed so it is not retried
    /// every cycle. Locks poisoned by the panic are cleared first.
    fn mark_after_panic(&self, reminder: &Reminder) -> bool {
        self.tasks.clear_poison();
        self.reminders.clear_poison();
        match self.reminders.lock() {
            Ok(mut store) => store.mark_sent(&reminder.id),
            Err(_) => false,
        }
    }

    fn process(&self, reminder: &Reminder) -> Result<Processed> {
        let title = self
            .tasks
            .lock()?
            .get(&reminder.task_id)
            .map(|task| task.title.clone());
        let orphaned = title.is_none();
        if orphaned {
            debug!(reminder_id = %reminder.id, task_id = %reminder.task_id, "reminder task was deleted");
        }
        let title = title.unwrap_or_else(|| self.options.orphan_label.clone());

        let dispatched = match reminder.channel {
            Channel::Browser => {
                let body = format!("Reminder due {}", reminder.fire_date.format("%Y-%m-%d %H:%M UTC"));
                let outcome = self.notifier.dispatch(&title, &body);
                debug!(reminder_id = %reminder.id, ?outcome, "reminder dispatched");
                true
            }
            Channel::Email => {
                warn!(reminder_id = %reminder.id, "email reminders are not delivered; marking sent");
                false
            }
        };

        let marked = self.reminders.lock()?.mark_sent(&reminder.id);
        if marked {
            self.emit_sent(reminder, orphaned);
        }

        Ok(if dispatched {
            Processed::Dispatched { orphaned, marked }
        } else {
            Processed::ChannelSkipped { orphaned, marked }
        })
    }

    fn emit_sent(&self, reminder: &Reminder, orphaned: bool) {
        let Some(events) = &self.events else {
            return;
        };
        let sent_at = self
            .reminders
            .lock()
            .ok()
            .and_then(|store| store.get(&reminder.id).and_then(|r| r.sent_at));
        let event = Event::new(EventKind::ReminderSent, sent_at.unwrap_or(reminder.fire_date))
            .with_data(serde_json::json!({
                "reminder_id": reminder.id,
                "task_id": reminder.task_id,
                "channel": reminder.channel,
                "orphaned": orphaned,
            }));
        let result = event.and_then(|event| match events.lock() {
            Ok(mut sink) => sink.emit(&event),
            Err(_) => Err(Error::StatePoisoned("event sink")),
        });
        if let Err(err) = result {
            warn!(reminder_id = %reminder.id, error = %err, "failed to emit reminder_sent event");
        }
    }

    /// Apply retention and persist. Returns how many reminders retention removed.
    fn after_cycle(&self) -> Option<usize> {
        let mut store = match self.reminders.lock() {
            Ok(store) => store,
            Err(_) => {
                error!("cannot persist reminders: store poisoned");
                return None;
            }
        };
        let compacted = self.options.retention.map(|older_than| {
            let report = store.compact(older_than);
            if report.removed > 0 {
                info!(removed = report.removed, "compacted sent reminders");
            }
            report.removed
        });
        if let Some(storage) = &self.storage {
            if let Err(err) = store.save(storage) {
                error!(error = %err, "failed to persist reminders after cycle");
            }
        }
        compacted
    }

    /// Spawn the polling loop on the current tokio runtime. The first cycle
    /// runs immediately.
    pub fn start(self: &Arc<Self>) -> Result<SchedulerHandle> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(Error::InvalidArgument(
                "scheduler is already running".to_string(),
            ));
        }
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(_) => {
                self.running.store(false, Ordering::SeqCst);
                return Err(Error::OperationFailed(
                    "scheduler needs a tokio runtime".to_string(),
                ));
            }
        };

        let (stop_tx, mut stop_rx) = watch::channel(false);
        let me = Arc::clone(self);
        let interval = self.options.interval;
        info!(interval_secs = interval.as_secs_f64(), "reminder scheduler started");

        let running = RunningFlag(Arc::clone(&self.running));

        let join = runtime.spawn(async move {
            let _running = running;
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    changed = stop_rx.changed() => {
                        if changed.is_err() || *stop_rx.borrow() {
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        let cycle = panic::catch_unwind(AssertUnwindSafe(|| me.run_cycle()));
                        if let Err(payload) = cycle {
                            error!(
                                panic = panic_message(payload.as_ref()),
                                "scheduler cycle panicked; waiting for next tick"
                            );
                            me.tasks.clear_poison();
                            me.reminders.clear_poison();
                        }
                    }
                }
            }
            info!("reminder scheduler stopped");
        });

        Ok(SchedulerHandle {
            stop_tx,
            join: Some(join),
        })
    }
}

/// Clears the running flag when the polling task ends, however it ends.
struct RunningFlag(Arc<AtomicBool>);

impl Drop for RunningFlag {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}

/// Running scheduler. Dropping the handle stops the loop at its next wakeup.
#[derive(Debug)]
pub struct SchedulerHandle {
    stop_tx: watch::Sender<bool>,
    join: Option<JoinHandle<()>>,
}

impl SchedulerHandle {
    /// Signal the loop and wait for it to exit. A cycle in progress finishes.
    pub async fn stop(mut self) {
        let _ = self.stop_tx.send(true);
        if let Some(join) = self.join.take() {
            if let Err(err) = join.await {
                error!(error = %err, "scheduler task ended abnormally");
            }
        }
    }
}

impl Drop for SchedulerHandle {
    fn drop(&mut self) {
        let _ = self.stop_tx.send(true);
    }
}
