#![allow(dead_code)]

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use rally::clock::ManualClock;
use rally::notify::{Notification, NotificationBackend, NotificationHandle, Permission};
use rally::reminder::ReminderStore;
use rally::storage::Storage;
use rally::task::TaskStore;
use serde_json::Value;
use tempfile::TempDir;

/// Notification backend that records what it was asked to show.
pub struct RecordingBackend {
    supported: bool,
    permission: Mutex<Permission>,
    shown: Mutex<Vec<Notification>>,
    retracted: Mutex<Vec<NotificationHandle>>,
    focused: Mutex<usize>,
}

impl RecordingBackend {
    pub fn new(permission: Permission) -> Arc<Self> {
        Arc::new(Self {
            supported: true,
            permission: Mutex::new(permission),
            shown: Mutex::new(Vec::new()),
            retracted: Mutex::new(Vec::new()),
            focused: Mutex::new(0),
        })
    }

    pub fn unsupported() -> Arc<Self> {
        Arc::new(Self {
            supported: false,
            permission: Mutex::new(Permission::Default),
            shown: Mutex::new(Vec::new()),
            retracted: Mutex::new(Vec::new()),
            focused: Mutex::new(0),
        })
    }

    pub fn set_permission(&self, permission: Permission) {
        *self.permission.lock().unwrap() = permission;
    }

    pub fn shown(&self) -> Vec<Notification> {
        self.shown.lock().unwrap().clone()
    }

    pub fn titles(&self) -> Vec<String> {
        self.shown().into_iter().map(|n| n.title).collect()
    }

    pub fn retracted(&self) -> Vec<NotificationHandle> {
        self.retracted.lock().unwrap().clone()
    }

    pub fn focus_count(&self) -> usize {
        *self.focused.lock().unwrap()
    }
}

#[async_trait]
impl NotificationBackend for RecordingBackend {
    fn is_supported(&self) -> bool {
        self.supported
    }

    fn permission(&self) -> Permission {
        *self.permission.lock().unwrap()
    }

    async fn request_permission(&self) -> anyhow::Result<Permission> {
        let mut permission = self.permission.lock().unwrap();
        if *permission == Permission::Default {
            *permission = Permission::Granted;
        }
        Ok(*permission)
    }

    fn show(&self, _handle: NotificationHandle, notification: &Notification) -> anyhow::Result<()> {
        self.shown.lock().unwrap().push(notification.clone());
        Ok(())
    }

    fn retract(&self, handle: NotificationHandle) {
        self.retracted.lock().unwrap().push(handle);
    }

    fn focus_app(&self) {
        *self.focused.lock().unwrap() += 1;
    }
}

pub fn day(n: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap() + chrono::Duration::days(n)
}

/// In-memory stores sharing one manual clock.
pub struct Fixture {
    pub clock: ManualClock,
    pub tasks: Arc<Mutex<TaskStore>>,
    pub reminders: Arc<Mutex<ReminderStore>>,
}

impl Fixture {
    pub fn new() -> Self {
        let clock = ManualClock::new(day(0));
        Self {
            tasks: Arc::new(Mutex::new(TaskStore::new(clock.shared()))),
            reminders: Arc::new(Mutex::new(ReminderStore::new(clock.shared()))),
            clock,
        }
    }
}

/// Temporary data directory.
pub struct DataDir {
    dir: TempDir,
}

impl DataDir {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("failed to create tempdir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn storage(&self) -> Storage {
        Storage::new(self.dir.path().to_path_buf())
    }

    pub fn write_config(&self, contents: &str) {
        std::fs::write(self.dir.path().join(".rally.toml"), contents).expect("write config");
    }

    pub fn read_json(&self, name: &str) -> Value {
        let content =
            std::fs::read_to_string(self.dir.path().join(name)).expect("read snapshot");
        serde_json::from_str(&content).expect("parse snapshot")
    }
}

pub fn rally_cmd(data: &DataDir) -> assert_cmd::Command {
    let mut cmd = assert_cmd::Command::cargo_bin("rally").expect("rally binary");
    cmd.env("RALLY_DIR", data.path());
    cmd.env_remove("RUST_LOG");
    cmd
}

/// Run a `--json` command and return `data` from the envelope.
pub fn rally_json(data: &DataDir, args: &[&str]) -> Value {
    let output = rally_cmd(data)
        .arg("--json")
        .args(args)
        .output()
        .expect("run rally");
    assert!(
        output.status.success(),
        "rally {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    let envelope: Value = serde_json::from_slice(&output.stdout).expect("json envelope");
    assert_eq!(envelope["status"], "success");
    envelope["data"].clone()
}
