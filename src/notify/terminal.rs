//! Terminal notification backend.
//!
//! Notifications are printed as lines on a writer (stderr by default). The
//! permission decision lives in the data directory so it survives between
//! runs, the way a browser remembers a site's grant.

use std::collections::HashSet;
use std::io::{self, BufRead, Write};
use std::sync::Mutex;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::{Notification, NotificationBackend, NotificationHandle, Permission};
use crate::storage::Storage;

pub struct TerminalBackend {
    storage: Storage,
    out: Mutex<Box<dyn Write + Send>>,
    /// Fixed answer for the permission prompt; `None` reads stdin.
    answer: Option<bool>,
    active: Mutex<HashSet<NotificationHandle>>,
}

impl TerminalBackend {
    pub fn new(storage: Storage) -> Self {
        Self {
            storage,
            out: Mutex::new(Box::new(io::stderr())),
            answer: None,
            active: Mutex::new(HashSet::new()),
        }
    }

    /// Answer the permission prompt without reading stdin.
    pub fn with_answer(mut self, grant: bool) -> Self {
        self.answer = Some(grant);
        self
    }

    pub fn with_writer(mut self, out: Box<dyn Write + Send>) -> Self {
        self.out = Mutex::new(out);
        self
    }

    /// Overwrite the stored decision, bypassing the prompt.
    pub fn set_permission(&self, permission: Permission) -> crate::Result<()> {
        self.storage.init()?;
        self.storage
            .write_text(&self.storage.permission_file(), permission.as_str())
    }

    pub fn active_count(&self) -> usize {
        self.active.lock().map(|set| set.len()).unwrap_or(0)
    }
}

fn prompt_stdin() -> io::Result<bool> {
    let mut stderr = io::stderr();
    write!(stderr, "Allow rally to show reminder notifications? [y/N] ")?;
    stderr.flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(matches!(line.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}

#[async_trait]
impl NotificationBackend for TerminalBackend {
    fn is_supported(&self) -> bool {
        true
    }

    fn permission(&self) -> Permission {
        let Some(raw) = self.storage.read_text(&self.storage.permission_file()) else {
            return Permission::Default;
        };
        raw.parse().unwrap_or_else(|_| {
            warn!(value = %raw, "unrecognized stored notification permission; treating as default");
            Permission::Default
        })
    }

    async fn request_permission(&self) -> anyhow::Result<Permission> {
        let grant = match self.answer {
            Some(grant) => grant,
            None => tokio::task::spawn_blocking(prompt_stdin).await??,
        };
        let permission = if grant {
            Permission::Granted
        } else {
            Permission::Denied
        };
        self.set_permission(permission)?;
        Ok(permission)
    }

    fn show(&self, handle: NotificationHandle, notification: &Notification) -> anyhow::Result<()> {
        {
            let mut out = self
                .out
                .lock()
                .map_err(|_| anyhow::anyhow!("notification writer poisoned"))?;
            writeln!(out, "[reminder] {}: {}", notification.title, notification.body)?;
            out.flush()?;
        }
        if let Ok(mut active) = self.active.lock() {
            active.insert(handle);
        }
        Ok(())
    }

    fn retract(&self, handle: NotificationHandle) {
        let removed = self
            .active
            .lock()
            .map(|mut active| active.remove(&handle))
            .unwrap_or(false);
        if removed {
            debug!(%handle, "terminal notification retracted");
        }
    }

    fn focus_app(&self) {
        debug!("focus requested; terminal backend has nothing to raise");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::tempdir;

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn permission_defaults_until_stored() {
        let dir = tempdir().unwrap();
        let backend = TerminalBackend::new(Storage::new(dir.path().to_path_buf()));
        assert_eq!(backend.permission(), Permission::Default);

        backend.set_permission(Permission::Denied).unwrap();
        assert_eq!(backend.permission(), Permission::Denied);
    }

    #[test]
    fn garbage_permission_file_reads_as_default() {
        let dir = tempdir().unwrap();
        let storage = Storage::new(dir.path().to_path_buf());
        std::fs::write(storage.permission_file(), "maybe\n").unwrap();
        let backend = TerminalBackend::new(storage);
        assert_eq!(backend.permission(), Permission::Default);
    }

    #[tokio::test]
    async fn request_with_fixed_answer_persists() {
        let dir = tempdir().unwrap();
        let storage = Storage::new(dir.path().to_path_buf());
        let backend = TerminalBackend::new(storage.clone()).with_answer(true);

        assert_eq!(backend.request_permission().await.unwrap(), Permission::Granted);
        assert_eq!(TerminalBackend::new(storage).permission(), Permission::Granted);
    }

    #[test]
    fn show_writes_line_and_tracks_handle() {
        let dir = tempdir().unwrap();
        let buf = SharedBuf::default();
        let backend = TerminalBackend::new(Storage::new(dir.path().to_path_buf()))
            .with_writer(Box::new(buf.clone()));
        let handle = NotificationHandle::new();

        backend
            .show(
                handle,
                &Notification {
                    title: "Book venue".to_string(),
                    body: "Confirm the deposit".to_string(),
                },
            )
            .unwrap();
        let printed = String::from_utf8(buf.0.lock().unwrap().clone()).unwrap();
        assert_eq!(printed, "[reminder] Book venue: Confirm the deposit\n");
        assert_eq!(backend.active_count(), 1);

        backend.retract(handle);
        backend.retract(handle);
        assert_eq!(backend.active_count(), 0);
    }
}
