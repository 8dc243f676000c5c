//! Storage layer for rally
//!
//! Every store persists its records as one named JSON snapshot inside the data
//! directory:
//!
//! ```text
//! <data_dir>/
//!   .rally.toml          # Configuration (optional)
//!   tasks.json           # Task snapshot
//!   reminders.json       # Reminder snapshot
//!   notify-permission    # Terminal notification permission decision
//!   *.lock               # fs2 locks guarding snapshot writes
//! ```
//!
//! Timestamps are RFC 3339 strings on disk and `DateTime<Utc>` in memory;
//! serde decodes them when a snapshot is read, so no caller ever sees a
//! string-typed date.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{de::DeserializeOwned, Serialize};

use crate::error::{Error, Result};
use crate::lock::{lock_path_for, FileLock, DEFAULT_LOCK_TIMEOUT_MS};

/// Snapshot namespace for tasks
pub const TASKS_NAMESPACE: &str = "tasks";

/// Snapshot namespace for reminders
pub const REMINDERS_NAMESPACE: &str = "reminders";

/// Config file name inside the data directory
pub const CONFIG_FILE: &str = ".rally.toml";

const PERMISSION_FILE: &str = "notify-permission";

/// Storage manager for rally state
#[derive(Debug, Clone)]
pub struct Storage {
    root: PathBuf,
}

impl Storage {
    /// Create storage rooted at `root`.
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Storage in the platform data directory (e.g. `~/.local/share/rally`).
    pub fn default_location() -> Result<Self> {
        let dirs = ProjectDirs::from("org", "rally", "rally").ok_or_else(|| {
            Error::OperationFailed("could not determine a home directory".to_string())
        })?;
        Ok(Self::new(dirs.data_dir().to_path_buf()))
    }

    /// Use `dir` when given, the platform data directory otherwise.
    pub fn resolve(dir: Option<&Path>) -> Result<Self> {
        match dir {
            Some(dir) => Ok(Self::new(dir.to_path_buf())),
            None => Self::default_location(),
        }
    }

    // =========================================================================
    // Path accessors
    // =========================================================================

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Snapshot file for a namespace (`tasks` -> `<root>/tasks.json`)
    pub fn snapshot_file(&self, namespace: &str) -> PathBuf {
        self.root.join(format!("{namespace}.json"))
    }

    pub fn tasks_file(&self) -> PathBuf {
        self.snapshot_file(TASKS_NAMESPACE)
    }

    pub fn reminders_file(&self) -> PathBuf {
        self.snapshot_file(REMINDERS_NAMESPACE)
    }

    pub fn config_file(&self) -> PathBuf {
        self.root.join(CONFIG_FILE)
    }

    pub fn permission_file(&self) -> PathBuf {
        self.root.join(PERMISSION_FILE)
    }

    // =========================================================================
    // Directory initialization
    // =========================================================================

    /// Create the data directory if it is missing
    pub fn init(&self) -> Result<()> {
        fs::create_dir_all(&self.root)?;
        Ok(())
    }

    // =========================================================================
    // File I/O helpers
    // =========================================================================

    /// Write JSON under the path's lock, atomically (temp file + rename).
    pub fn write_json<T: Serialize>(&self, path: &Path, data: &T) -> Result<()> {
        let json = serde_json::to_string_pretty(data)?;
        let _lock = FileLock::acquire(lock_path_for(path), DEFAULT_LOCK_TIMEOUT_MS)?;
        self.write_atomic(path, json.as_bytes())
    }

    /// Read JSON data from a file
    pub fn read_json<T: DeserializeOwned>(&self, path: &Path) -> Result<T> {
        let content = fs::read_to_string(path)?;
        let data: T = serde_json::from_str(&content)?;
        Ok(data)
    }

    /// Read JSON data, or `None` when the file does not exist yet
    pub fn read_json_opt<T: DeserializeOwned>(&self, path: &Path) -> Result<Option<T>> {
        if !path.exists() {
            return Ok(None);
        }
        self.read_json(path).map(Some)
    }

    /// Write data atomically using temp file + rename
    ///
    /// Readers see either the old snapshot or the new one, never a partial
    /// write. The caller is responsible for holding the lock.
    pub fn write_atomic(&self, path: &Path, data: &[u8]) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let temp_path = path.with_extension("tmp");
        let mut file = File::create(&temp_path)?;
        file.write_all(data)?;
        file.sync_all()?;

        fs::rename(&temp_path, path)?;
        Ok(())
    }

    /// Read a small trimmed text file, `None` when missing or empty
    pub fn read_text(&self, path: &Path) -> Option<String> {
        let content = fs::read_to_string(path).ok()?;
        let trimmed = content.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    }

    /// Write a small text file atomically
    pub fn write_text(&self, path: &Path, value: &str) -> Result<()> {
        let _lock = FileLock::acquire(lock_path_for(path), DEFAULT_LOCK_TIMEOUT_MS)?;
        self.write_atomic(path, format!("{value}\n").as_bytes())
    }
}
