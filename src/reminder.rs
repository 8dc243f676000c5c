//! Reminder store.
//!
//! Reminders reference tasks by id only; deleting a task leaves its reminders
//! in place and the scheduler copes with the orphan. `sent` only ever moves
//! from false to true.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::clock::SharedClock;
use crate::error::{Error, Result};
use crate::ids::{self, REMINDER_ID_PREFIX};
use crate::storage::Storage;

const REMINDERS_SCHEMA_VERSION: &str = "rally.reminders.v1";

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    #[default]
    Browser,
    /// Stored but never dispatched.
    Email,
}

impl Channel {
    pub fn as_str(self) -> &'static str {
        match self {
            Channel::Browser => "browser",
            Channel::Email => "email",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Channel {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "browser" => Ok(Channel::Browser),
            "email" => Ok(Channel::Email),
            other => Err(Error::InvalidArgument(format!(
                "unknown reminder channel '{other}' (expected browser|email)"
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Reminder {
    pub id: String,
    pub task_id: String,
    pub fire_date: DateTime<Utc>,
    #[serde(default)]
    pub sent: bool,
    #[serde(default)]
    pub channel: Channel,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sent_at: Option<DateTime<Utc>>,
}

impl Reminder {
    pub fn is_due_at(&self, instant: DateTime<Utc>) -> bool {
        !self.sent && self.fire_date <= instant
    }
}

/// Partial edit, honoured only while the reminder is unsent.
#[derive(Debug, Clone, Default)]
pub struct ReminderPatch {
    pub task_id: Option<String>,
    pub fire_date: Option<DateTime<Utc>>,
    pub channel: Option<Channel>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReminderSnapshot {
    pub schema_version: String,
    pub generated_at: DateTime<Utc>,
    pub reminders: Vec<Reminder>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ReminderCompactReport {
    pub before: usize,
    pub after: usize,
    pub removed: usize,
}

pub struct ReminderStore {
    reminders: Vec<Reminder>,
    clock: SharedClock,
}

impl fmt::Debug for ReminderStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReminderStore")
            .field("reminders", &self.reminders.len())
            .finish()
    }
}

impl ReminderStore {
    pub fn new(clock: SharedClock) -> Self {
        Self {
            reminders: Vec::new(),
            clock,
        }
    }

    pub fn from_snapshot(snapshot: ReminderSnapshot, clock: SharedClock) -> Result<Self> {
        if snapshot.schema_version != REMINDERS_SCHEMA_VERSION {
            return Err(Error::OperationFailed(format!(
                "unsupported reminder snapshot version '{}'",
                snapshot.schema_version
            )));
        }
        Ok(Self {
            reminders: snapshot.reminders,
            clock,
        })
    }

    /// Load `reminders.json`, or start empty when it does not exist.
    pub fn load(storage: &Storage, clock: SharedClock) -> Result<Self> {
        match storage.read_json_opt::<ReminderSnapshot>(&storage.reminders_file())? {
            Some(snapshot) => Self::from_snapshot(snapshot, clock),
            None => Ok(Self::new(clock)),
        }
    }

    /// Replace in-memory records with the snapshot on disk.
    pub fn reload(&mut self, storage: &Storage) -> Result<()> {
        let fresh = Self::load(storage, Arc::clone(&self.clock))?;
        self.reminders = fresh.reminders;
        Ok(())
    }

    pub fn save(&self, storage: &Storage) -> Result<()> {
        storage.write_json(&storage.reminders_file(), &self.snapshot())
    }

    pub fn snapshot(&self) -> ReminderSnapshot {
        ReminderSnapshot {
            schema_version: REMINDERS_SCHEMA_VERSION.to_string(),
            generated_at: self.clock.now(),
            reminders: self.reminders.clone(),
        }
    }

    pub fn reminders(&self) -> &[Reminder] {
        &self.reminders
    }

    pub fn len(&self) -> usize {
        self.reminders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reminders.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Reminder> {
        self.reminders.iter().find(|reminder| reminder.id == id)
    }

    /// Resolve a typed id or unique id prefix to a stored reminder id.
    pub fn resolve_id(&self, input: &str) -> Result<String> {
        ids::resolve_id(input, self.reminders.iter().map(|r| r.id.as_str()))
            .map_err(|_| Error::ReminderNotFound(input.trim().to_string()))
    }

    pub fn add(
        &mut self,
        task_id: impl Into<String>,
        fire_date: DateTime<Utc>,
        channel: Channel,
    ) -> String {
        let id = ids::generate_id(
            REMINDER_ID_PREFIX,
            self.reminders.iter().map(|r| r.id.as_str()),
        );
        self.reminders.push(Reminder {
            id: id.clone(),
            task_id: task_id.into(),
            fire_date,
            sent: false,
            channel,
            created_at: self.clock.now(),
            sent_at: None,
        });
        debug!(reminder_id = %id, %fire_date, "reminder added");
        id
    }

    /// Edit an unsent reminder. Returns `false` for unknown or already-sent
    /// reminders.
    pub fn update(&mut self, id: &str, patch: ReminderPatch) -> bool {
        let Some(reminder) = self.reminder_mut(id) else {
            debug!(reminder_id = id, "update ignored: unknown reminder");
            return false;
        };
        if reminder.sent {
            debug!(reminder_id = id, "update ignored: reminder already sent");
            return false;
        }
        if let Some(task_id) = patch.task_id {
            reminder.task_id = task_id;
        }
        if let Some(fire_date) = patch.fire_date {
            reminder.fire_date = fire_date;
        }
        if let Some(channel) = patch.channel {
            reminder.channel = channel;
        }
        true
    }

    /// Remove the reminder. Deleting a missing id is a no-op.
    pub fn delete(&mut self, id: &str) -> bool {
        let before = self.reminders.len();
        self.reminders.retain(|reminder| reminder.id != id);
        self.reminders.len() != before
    }

    /// Set `sent`. Idempotent; returns `true` only on the unsent -> sent flip.
    pub fn mark_sent(&mut self, id: &str) -> bool {
        let now = self.clock.now();
        let Some(reminder) = self.reminder_mut(id) else {
            debug!(reminder_id = id, "mark_sent ignored: unknown reminder");
            return false;
        };
        if reminder.sent {
            return false;
        }
        reminder.sent = true;
        reminder.sent_at = Some(now);
        true
    }

    /// Unsent reminders with `fire_date <= now`, oldest first.
    pub fn due_now(&self) -> Vec<&Reminder> {
        self.due_at(self.clock.now())
    }

    /// Unsent reminders with `fire_date > now`, soonest first.
    pub fn upcoming(&self) -> Vec<&Reminder> {
        self.upcoming_at(self.clock.now())
    }

    pub fn due_at(&self, instant: DateTime<Utc>) -> Vec<&Reminder> {
        self.unsent_sorted(|reminder| reminder.fire_date <= instant)
    }

    pub fn upcoming_at(&self, instant: DateTime<Utc>) -> Vec<&Reminder> {
        self.unsent_sorted(|reminder| reminder.fire_date > instant)
    }

    pub fn for_task(&self, task_id: &str) -> Vec<&Reminder> {
        self.reminders
            .iter()
            .filter(|reminder| reminder.task_id == task_id)
            .collect()
    }

    /// Drop sent reminders whose `sent_at` is older than `older_than`.
    /// Unsent reminders are always kept.
    pub fn compact(&mut self, older_than: Duration) -> ReminderCompactReport {
        let before = self.reminders.len();
        // A cutoff before the earliest representable instant keeps everything.
        let Some(cutoff) = self.clock.now().checked_sub_signed(older_than) else {
            return ReminderCompactReport {
                before,
                after: before,
                removed: 0,
            };
        };
        self.reminders.retain(|reminder| {
            if !reminder.sent {
                return true;
            }
            // Legacy records without `sent_at` fall back to their fire date.
            let sent_at = reminder.sent_at.unwrap_or(reminder.fire_date);
            sent_at >= cutoff
        });
        let after = self.reminders.len();
        ReminderCompactReport {
            before,
            after,
            removed: before - after,
        }
    }

    fn unsent_sorted<F>(&self, keep: F) -> Vec<&Reminder>
    where
        F: Fn(&Reminder) -> bool,
    {
        let mut selected: Vec<&Reminder> = self
            .reminders
            .iter()
            .filter(|reminder| !reminder.sent && keep(reminder))
            .collect();
        selected.sort_by(|a, b| a.fire_date.cmp(&b.fire_date));
        selected
    }

    fn reminder_mut(&mut self, id: &str) -> Option<&mut Reminder> {
        self.reminders.iter_mut().find(|reminder| reminder.id == id)
    }
}
