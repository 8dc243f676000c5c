//! Configuration loading and management
//!
//! Handles parsing of the `.rally.toml` file in the data directory.

use std::path::Path;

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::query::{SortDirection, SortField};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Reminder scheduler configuration
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Reminder history configuration
    #[serde(default)]
    pub reminders: RemindersConfig,

    /// Default query ordering for `rally task list`
    #[serde(default)]
    pub query: QueryConfig,
}

/// Scheduler-related configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Poll interval (e.g. "60s", "5m")
    #[serde(default = "default_interval")]
    pub interval: String,

    /// How long a notification stays up before it is retracted
    #[serde(default = "default_display")]
    pub display: String,

    /// Title used when a reminder's task has been deleted
    #[serde(default = "default_orphan_label")]
    pub orphan_label: String,
}

fn default_interval() -> String {
    "60s".to_string()
}

fn default_display() -> String {
    "10s".to_string()
}

fn default_orphan_label() -> String {
    "(deleted task)".to_string()
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval: default_interval(),
            display: default_display(),
            orphan_label: default_orphan_label(),
        }
    }
}

impl SchedulerConfig {
    pub fn interval(&self) -> Result<std::time::Duration> {
        positive_std_duration(&self.interval, "scheduler.interval")
    }

    pub fn display_window(&self) -> Result<std::time::Duration> {
        positive_std_duration(&self.display, "scheduler.display")
    }
}

/// Reminder history configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RemindersConfig {
    /// Drop sent reminders older than this (e.g. "30d"); unset keeps them all
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retention: Option<String>,
}

impl RemindersConfig {
    pub fn retention(&self) -> Result<Option<Duration>> {
        match self.retention.as_deref() {
            None => Ok(None),
            Some(raw) => {
                let duration = parse_duration(raw).map_err(|err| {
                    Error::InvalidConfig(format!("reminders.retention: {err}"))
                })?;
                if duration <= Duration::zero() {
                    return Err(Error::InvalidConfig(
                        "reminders.retention must be > 0".to_string(),
                    ));
                }
                Ok(Some(duration))
            }
        }
    }
}

/// Default ordering for task listings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryConfig {
    #[serde(default = "default_sort")]
    pub default_sort: SortField,

    #[serde(default)]
    pub default_direction: SortDirection,
}

fn default_sort() -> SortField {
    SortField::DueDate
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            default_sort: default_sort(),
            default_direction: SortDirection::default(),
        }
    }
}

impl Config {
    /// Load configuration from a `.rally.toml` file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a data directory, or return defaults
    pub fn load_from_dir(dir: &Path) -> Result<Self> {
        let config_path = dir.join(crate::storage::CONFIG_FILE);
        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        self.scheduler.interval()?;
        self.scheduler.display_window()?;
        if self.scheduler.orphan_label.trim().is_empty() {
            return Err(Error::InvalidConfig(
                "scheduler.orphan_label cannot be empty".to_string(),
            ));
        }
        self.reminders.retention()?;
        Ok(())
    }
}

/// Parse a duration string like "30s", "5m", "2h", "7d", "1w".
///
/// A bare number is read as minutes.
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim();

    if s.is_empty() {
        return Err(Error::InvalidArgument("Duration cannot be empty".to_string()));
    }

    let (num_str, unit) = match s.find(|c: char| !c.is_ascii_digit()) {
        Some(pos) => (&s[..pos], &s[pos..]),
        None => (s, "m"),
    };

    let num: i64 = num_str.parse().map_err(|_| {
        Error::InvalidArgument(format!("Invalid duration number: {num_str}"))
    })?;

    let duration = match unit.trim().to_lowercase().as_str() {
        "s" | "sec" | "second" | "seconds" => Duration::try_seconds(num),
        "m" | "min" | "minute" | "minutes" => Duration::try_minutes(num),
        "h" | "hr" | "hour" | "hours" => Duration::try_hours(num),
        "d" | "day" | "days" => Duration::try_days(num),
        "w" | "week" | "weeks" => Duration::try_weeks(num),
        _ => {
            return Err(Error::InvalidArgument(format!(
                "Invalid duration unit '{unit}'. Expected: s, m, h, d, w"
            )));
        }
    }
    .ok_or_else(|| Error::InvalidArgument(format!("Duration out of range: {s}")))?;

    Ok(duration)
}

fn positive_std_duration(raw: &str, field: &str) -> Result<std::time::Duration> {
    let duration =
        parse_duration(raw).map_err(|err| Error::InvalidConfig(format!("{field}: {err}")))?;
    match duration.to_std() {
        Ok(std) if !std.is_zero() => Ok(std),
        _ => Err(Error::InvalidConfig(format!("{field} must be > 0"))),
    }
}
