mod support;

use predicates::str::contains;
use serde_json::Value;

use support::{rally_cmd, rally_json, DataDir};

fn task(data: &DataDir, title: &str) -> String {
    let out = rally_json(data, &["task", "add", title, "--due", "+1d"]);
    out["id"].as_str().unwrap().to_string()
}

fn remind(data: &DataDir, task: &str, at: &str) -> String {
    let out = rally_json(data, &["remind", "add", task, "--at", at]);
    out["id"].as_str().unwrap().to_string()
}

#[test]
fn watch_once_dispatches_due_reminders_exactly_once() {
    let data = DataDir::new();
    let id = task(&data, "Open doors");
    let due = remind(&data, &id, "-1m");
    let later = remind(&data, &id, "+1h");

    let granted = rally_json(&data, &["notify", "request", "--yes"]);
    assert_eq!(granted["permission"], "granted");

    let output = rally_cmd(&data)
        .args(["--json", "watch", "--once"])
        .output()
        .expect("run watch");
    assert!(output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("[reminder] Open doors"), "stderr: {stderr}");
    let envelope: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(envelope["data"]["cycle"]["due"], 1);
    assert_eq!(envelope["data"]["cycle"]["dispatched"], 1);

    let again = rally_json(&data, &["watch", "--once"]);
    assert_eq!(again["cycle"]["dispatched"], 0);

    let pending = rally_json(&data, &["remind", "list", "--pending"]);
    let pending_ids: Vec<&str> = pending["reminders"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["id"].as_str().unwrap())
        .collect();
    assert_eq!(pending_ids, vec![later.as_str()]);

    let snapshot = data.read_json("reminders.json");
    let sent = snapshot["reminders"]
        .as_array()
        .unwrap()
        .iter()
        .find(|r| r["id"] == due.as_str())
        .unwrap();
    assert_eq!(sent["sent"], true);
}

#[test]
fn watch_once_without_permission_sends_nothing() {
    let data = DataDir::new();
    let id = task(&data, "Doors");
    remind(&data, &id, "now");

    let denied = rally_json(&data, &["notify", "request", "--no"]);
    assert_eq!(denied["permission"], "denied");

    let out = rally_json(&data, &["watch", "--once"]);
    assert_eq!(out["cycle"]["skipped_permission"], true);
    assert_eq!(out["cycle"]["dispatched"], 0);

    let due = rally_json(&data, &["remind", "due"]);
    assert_eq!(due["due"].as_array().unwrap().len(), 1);
}

#[test]
fn orphaned_reminder_uses_configured_label() {
    let data = DataDir::new();
    data.write_config("[scheduler]\norphan_label = \"(removed)\"\n");
    let id = task(&data, "Gone soon");
    remind(&data, &id, "-5m");
    rally_json(&data, &["task", "delete", &id]);
    rally_json(&data, &["notify", "request", "--yes"]);

    rally_cmd(&data)
        .args(["watch", "--once"])
        .assert()
        .success()
        .stderr(contains("[reminder] (removed)"));
}

#[test]
fn due_and_upcoming_split() {
    let data = DataDir::new();
    let id = task(&data, "Raffle");
    let past = remind(&data, &id, "-10m");
    let future = remind(&data, &id, "+3h");

    let out = rally_json(&data, &["remind", "due"]);
    assert_eq!(out["due"][0]["id"], past.as_str());
    assert_eq!(out["upcoming"][0]["id"], future.as_str());
}

#[test]
fn sent_reminders_cannot_be_edited() {
    let data = DataDir::new();
    let id = task(&data, "Signage");
    let reminder = remind(&data, &id, "-1m");
    rally_json(&data, &["notify", "request", "--yes"]);
    rally_json(&data, &["watch", "--once"]);

    rally_cmd(&data)
        .args(["remind", "edit", &reminder, "--at", "+1h"])
        .assert()
        .code(2);
}

#[test]
fn edit_and_delete_pending_reminder() {
    let data = DataDir::new();
    let id = task(&data, "Stage");
    let reminder = remind(&data, &id, "+1h");

    let edited = rally_json(&data, &["remind", "edit", &reminder, "--channel", "email"]);
    assert_eq!(edited["channel"], "email");

    let deleted = rally_json(&data, &["remind", "delete", &reminder]);
    assert_eq!(deleted["deleted"], true);

    rally_cmd(&data)
        .args(["remind", "delete", &reminder])
        .assert()
        .code(2);
}

#[test]
fn compact_requires_a_cutoff() {
    let data = DataDir::new();
    rally_cmd(&data)
        .args(["remind", "compact"])
        .assert()
        .code(2)
        .stderr(contains("--older-than"));

    let out = rally_json(&data, &["remind", "compact", "--older-than", "30d"]);
    assert_eq!(out["removed"], 0);
}

#[test]
fn reminder_for_unknown_task_is_rejected() {
    let data = DataDir::new();
    rally_cmd(&data)
        .args(["remind", "add", "task-missing", "--at", "now"])
        .assert()
        .code(2);
}

#[test]
fn notify_test_reports_suppression_before_grant() {
    let data = DataDir::new();
    let status = rally_json(&data, &["notify", "status"]);
    assert_eq!(status["permission"], "default");
    assert_eq!(status["display_window_secs"], 10);

    let out = rally_json(&data, &["notify", "test"]);
    assert_eq!(out["outcome"], "suppressed");

    rally_json(&data, &["notify", "request", "--yes"]);
    let out = rally_json(&data, &["notify", "test", "--title", "Hello"]);
    assert_eq!(out["outcome"], "shown");
}
