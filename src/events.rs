//! Change events for external observers.
//!
//! Store mutations are emitted as JSON lines to stdout or a file when
//! `--events` is given. The stores themselves know nothing about this; the
//! CLI and the scheduler emit after a mutation succeeds.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{Error, Result};

pub const EVENT_SCHEMA_VERSION: &str = "rally.event.v1";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventDestination {
    Stdout,
    File(PathBuf),
}

impl EventDestination {
    pub fn parse(raw: Option<&str>) -> Option<Self> {
        raw.and_then(|value| {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                return None;
            }
            if trimmed == "-" {
                return Some(EventDestination::Stdout);
            }
            Some(EventDestination::File(PathBuf::from(trimmed)))
        })
    }

    pub fn open(&self) -> Result<EventSink> {
        match self {
            EventDestination::Stdout => Ok(EventSink::stdout()),
            EventDestination::File(path) => EventSink::file(path),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    TaskCreated,
    TaskUpdated,
    TaskStatusChanged,
    TaskDeleted,
    ChecklistToggled,
    ReminderCreated,
    ReminderUpdated,
    ReminderDeleted,
    ReminderSent,
}

/// A structured event with optional payload.
#[derive(Debug, Clone, Serialize)]
pub struct Event {
    pub schema_version: &'static str,
    pub event: EventKind,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl Event {
    pub fn new(event: EventKind, timestamp: DateTime<Utc>) -> Self {
        Self {
            schema_version: EVENT_SCHEMA_VERSION,
            event,
            timestamp,
            data: None,
        }
    }

    /// Attach a serializable payload to the event.
    pub fn with_data<T: Serialize>(mut self, data: T) -> Result<Self> {
        self.data = Some(serde_json::to_value(data)?);
        Ok(self)
    }
}

/// Sink shared between the CLI and the scheduler task.
pub type SharedEventSink = Arc<Mutex<EventSink>>;

/// Event sink that writes JSONL output to a destination.
pub struct EventSink {
    writer: Box<dyn Write + Send>,
}

impl std::fmt::Debug for EventSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSink").finish_non_exhaustive()
    }
}

impl EventSink {
    pub fn stdout() -> Self {
        Self::from_writer(Box::new(std::io::stdout()))
    }

    /// Emit events to a file, appending, creating it if necessary.
    pub fn file(path: &Path) -> Result<Self> {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        Ok(Self::from_writer(Box::new(file)))
    }

    pub fn from_writer(writer: Box<dyn Write + Send>) -> Self {
        Self { writer }
    }

    pub fn shared(self) -> SharedEventSink {
        Arc::new(Mutex::new(self))
    }

    /// Write a single event as JSONL.
    pub fn emit(&mut self, event: &Event) -> Result<()> {
        let serialized = serde_json::to_vec(event)?;
        self.writer.write_all(&serialized)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush().map_err(Error::Io)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::tempdir;

    #[test]
    fn parse_destination() {
        assert_eq!(EventDestination::parse(None), None);
        assert_eq!(EventDestination::parse(Some("  ")), None);
        assert_eq!(EventDestination::parse(Some("-")), Some(EventDestination::Stdout));
        assert_eq!(
            EventDestination::parse(Some("events.jsonl")),
            Some(EventDestination::File(PathBuf::from("events.jsonl")))
        );
    }

    #[test]
    fn file_sink_appends_jsonl() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("events.jsonl");
        let at = Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap();

        for kind in [EventKind::TaskCreated, EventKind::ReminderSent] {
            let mut sink = EventDestination::File(path.clone()).open().unwrap();
            let event = Event::new(kind, at)
                .with_data(serde_json::json!({ "id": "task-abc" }))
                .unwrap();
            sink.emit(&event).unwrap();
        }

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<serde_json::Value> = content
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["event"], "task_created");
        assert_eq!(lines[1]["event"], "reminder_sent");
        assert_eq!(lines[1]["schema_version"], EVENT_SCHEMA_VERSION);
        assert_eq!(lines[1]["data"]["id"], "task-abc");
    }
}
