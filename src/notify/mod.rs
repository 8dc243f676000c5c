//! Notification capability.
//!
//! Wraps the platform's permission state machine (`default -> granted |
//! denied`) and the act of showing a notification. The platform itself sits
//! behind [`NotificationBackend`]; the CLI uses [`terminal::TerminalBackend`].
//!
//! Permission is re-read from the backend on every check, since a user can
//! revoke it outside this process. Dispatch never fails loudly: without the
//! capability or without a grant it logs and reports a suppressed outcome.

use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{Error, Result};

pub mod terminal;

/// How long a notification stays up unless clicked.
pub const DEFAULT_DISPLAY_WINDOW: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    #[default]
    Default,
    Granted,
    Denied,
}

impl Permission {
    pub fn as_str(self) -> &'static str {
        match self {
            Permission::Default => "default",
            Permission::Granted => "granted",
            Permission::Denied => "denied",
        }
    }

    pub fn is_granted(self) -> bool {
        self == Permission::Granted
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Permission {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "default" => Ok(Permission::Default),
            "granted" => Ok(Permission::Granted),
            "denied" => Ok(Permission::Denied),
            other => Err(Error::InvalidArgument(format!(
                "unknown permission '{other}' (expected default|granted|denied)"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub title: String,
    pub body: String,
}

/// Identifies one shown notification so it can be retracted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct NotificationHandle(Uuid);

impl NotificationHandle {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn id(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for NotificationHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Platform notification surface.
#[async_trait]
pub trait NotificationBackend: Send + Sync {
    /// Whether the platform can show notifications at all.
    fn is_supported(&self) -> bool;

    /// Current platform permission. Must be cheap; read on every check.
    fn permission(&self) -> Permission;

    /// Prompt the user. Resolves once the platform has an answer.
    async fn request_permission(&self) -> anyhow::Result<Permission>;

    fn show(&self, handle: NotificationHandle, notification: &Notification) -> anyhow::Result<()>;

    /// Remove a notification. Retracting twice, or after a click, is harmless.
    fn retract(&self, handle: NotificationHandle);

    /// Bring the application to the foreground.
    fn focus_app(&self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SuppressReason {
    Unsupported,
    NotGranted,
    BackendFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DispatchOutcome {
    Shown { handle: NotificationHandle },
    Suppressed { reason: SuppressReason },
}

impl DispatchOutcome {
    pub fn was_shown(&self) -> bool {
        matches!(self, DispatchOutcome::Shown { .. })
    }
}

pub struct Notifier {
    backend: Arc<dyn NotificationBackend>,
    cached: Mutex<Permission>,
    display_window: Duration,
}

impl fmt::Debug for Notifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Notifier")
            .field("cached", &self.cached_permission())
            .field("display_window", &self.display_window)
            .finish()
    }
}

impl Notifier {
    pub fn new(backend: Arc<dyn NotificationBackend>) -> Self {
        Self {
            backend,
            cached: Mutex::new(Permission::Default),
            display_window: DEFAULT_DISPLAY_WINDOW,
        }
    }

    pub fn with_display_window(mut self, window: Duration) -> Self {
        self.display_window = window;
        self
    }

    pub fn display_window(&self) -> Duration {
        self.display_window
    }

    /// Last value seen by [`Notifier::check_permission`]; may be stale.
    pub fn cached_permission(&self) -> Permission {
        *self.cached.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Re-read the platform permission and refresh the cache. Without the
    /// platform capability this is always `Denied`.
    pub fn check_permission(&self) -> Permission {
        let permission = if self.backend.is_supported() {
            self.backend.permission()
        } else {
            Permission::Denied
        };
        self.store_cached(permission);
        permission
    }

    /// Ask the user for permission. Already-decided states resolve without
    /// prompting. Callers must not run two requests at once.
    pub async fn request_permission(&self) -> Result<Permission> {
        let current = self.check_permission();
        if current != Permission::Default || !self.backend.is_supported() {
            return Ok(current);
        }
        let permission = self
            .backend
            .request_permission()
            .await
            .map_err(Error::Notification)?;
        info!(%permission, "notification permission resolved");
        self.store_cached(permission);
        Ok(permission)
    }

    /// Show a notification and schedule its retraction after the display
    /// window. Silently suppressed without capability or permission.
    pub fn dispatch(&self, title: &str, body: &str) -> DispatchOutcome {
        if !self.backend.is_supported() {
            warn!(title, "notification suppressed: platform has no notification support");
            return DispatchOutcome::Suppressed {
                reason: SuppressReason::Unsupported,
            };
        }
        let permission = self.check_permission();
        if !permission.is_granted() {
            warn!(title, %permission, "notification suppressed: permission not granted");
            return DispatchOutcome::Suppressed {
                reason: SuppressReason::NotGranted,
            };
        }

        let handle = NotificationHandle::new();
        let notification = Notification {
            title: title.to_string(),
            body: body.to_string(),
        };
        if let Err(err) = self.backend.show(handle, &notification) {
            warn!(title, error = %err, "notification suppressed: backend failed to show it");
            return DispatchOutcome::Suppressed {
                reason: SuppressReason::BackendFailed,
            };
        }
        info!(%handle, title, "notification shown");
        self.schedule_retract(handle);
        DispatchOutcome::Shown { handle }
    }

    /// User clicked the notification: focus the app and retract it now.
    pub fn handle_click(&self, handle: NotificationHandle) {
        self.backend.focus_app();
        self.backend.retract(handle);
        debug!(%handle, "notification clicked");
    }

    fn schedule_retract(&self, handle: NotificationHandle) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            debug!(%handle, "no async runtime; notification will not auto-retract");
            return;
        };
        let backend = Arc::clone(&self.backend);
        let window = self.display_window;
        runtime.spawn(async move {
            tokio::time::sleep(window).await;
            backend.retract(handle);
            debug!(%handle, "notification retracted after display window");
        });
    }

    fn store_cached(&self, permission: Permission) {
        *self.cached.lock().unwrap_or_else(|e| e.into_inner()) = permission;
    }
}
