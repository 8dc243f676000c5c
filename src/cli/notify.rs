//! rally notify command implementations.

use std::sync::Arc;

use serde::Serialize;

use crate::cli::{runtime, Globals};
use crate::config::Config;
use crate::error::Result;
use crate::notify::terminal::TerminalBackend;
use crate::notify::{DispatchOutcome, NotificationBackend, Notifier, Permission};
use crate::output::{emit_success, HumanOutput};
use crate::storage::Storage;

#[derive(Serialize)]
struct PermissionOutput {
    supported: bool,
    permission: Permission,
    display_window_secs: u64,
}

#[derive(Serialize)]
struct TestOutput {
    permission: Permission,
    #[serde(flatten)]
    outcome: DispatchOutcome,
}

fn notifier(storage: &Storage) -> Result<(Notifier, bool)> {
    let config = Config::load_from_dir(storage.root())?;
    let backend = TerminalBackend::new(storage.clone());
    let supported = backend.is_supported();
    let notifier =
        Notifier::new(Arc::new(backend)).with_display_window(config.scheduler.display_window()?);
    Ok((notifier, supported))
}

fn open_storage(globals: &Globals) -> Result<Storage> {
    let storage = Storage::resolve(globals.dir.as_deref())?;
    storage.init()?;
    Ok(storage)
}

pub fn run_status(globals: &Globals) -> Result<()> {
    let storage = open_storage(globals)?;
    let (notifier, supported) = notifier(&storage)?;
    let permission = notifier.check_permission();

    let mut human = HumanOutput::new("Notifications");
    human.push_summary("Supported", supported.to_string());
    human.push_summary("Permission", permission.to_string());
    if permission == Permission::Default {
        human.push_next_step("rally notify request");
    }

    let output = PermissionOutput {
        supported,
        permission,
        display_window_secs: notifier.display_window().as_secs(),
    };
    emit_success(globals.output(false), "notify status", &output, Some(&human))
}

pub fn run_request(answer: Option<bool>, globals: &Globals) -> Result<()> {
    let storage = open_storage(globals)?;
    let (notifier, supported) = notifier(&storage)?;

    // An explicit answer overrides an earlier decision; otherwise prompt
    // only while undecided.
    if let Some(grant) = answer {
        let permission = if grant {
            Permission::Granted
        } else {
            Permission::Denied
        };
        TerminalBackend::new(storage.clone()).set_permission(permission)?;
    }
    let permission = runtime()?.block_on(notifier.request_permission())?;

    let mut human = HumanOutput::new("Notification permission");
    human.push_summary("Permission", permission.to_string());
    if permission == Permission::Denied {
        human.push_next_step("rally notify request --yes");
    }

    let output = PermissionOutput {
        supported,
        permission,
        display_window_secs: notifier.display_window().as_secs(),
    };
    emit_success(globals.output(false), "notify request", &output, Some(&human))
}

pub fn run_test(title: String, body: String, globals: &Globals) -> Result<()> {
    let storage = open_storage(globals)?;
    let (notifier, _) = notifier(&storage)?;

    let outcome = notifier.dispatch(&title, &body);
    let permission = notifier.cached_permission();

    let mut human = HumanOutput::new(if outcome.was_shown() {
        "Test notification shown"
    } else {
        "Test notification suppressed"
    });
    human.push_summary("Permission", permission.to_string());
    if !outcome.was_shown() {
        human.push_next_step("rally notify request");
    }

    let output = TestOutput {
        permission,
        outcome,
    };
    emit_success(globals.output(false), "notify test", &output, Some(&human))
}
