mod support;

use predicates::str::contains;
use serde_json::Value;

use support::{rally_cmd, rally_json, DataDir};

fn add(data: &DataDir, title: &str, extra: &[&str]) -> String {
    let mut args = vec!["task", "add", title, "--due", "+1d"];
    args.extend_from_slice(extra);
    let out = rally_json(data, &args);
    out["id"].as_str().expect("task id").to_string()
}

fn listed_ids(out: &Value) -> Vec<String> {
    out["tasks"]
        .as_array()
        .expect("tasks array")
        .iter()
        .map(|task| task["id"].as_str().unwrap().to_string())
        .collect()
}

#[test]
fn add_list_and_show_round_trip_through_snapshot() {
    let data = DataDir::new();
    let id = add(
        &data,
        "Print badges",
        &[
            "--priority",
            "high",
            "--category",
            "ops",
            "--assignee",
            "sam",
            "--item",
            "Order lanyards",
            "--item",
            "Print names",
        ],
    );

    let snapshot = data.read_json("tasks.json");
    assert_eq!(snapshot["tasks"][0]["id"], id.as_str());

    let shown = rally_json(&data, &["task", "show", &id]);
    assert_eq!(shown["title"], "Print badges");
    assert_eq!(shown["status"], "todo");
    assert_eq!(shown["priority"], "high");
    assert_eq!(shown["category_id"], "ops");
    assert_eq!(shown["assignee_ids"][0], "sam");
    assert_eq!(shown["checklist"].as_array().unwrap().len(), 2);
    assert_eq!(shown["checklist"][0]["completed"], false);
}

#[test]
fn board_scenario_from_the_command_line() {
    let data = DataDir::new();
    let a = add(&data, "A", &["--priority", "urgent"]);
    let b = add(&data, "B", &["--priority", "low"]);
    let c = add(&data, "C", &["--priority", "high", "--status", "done"]);

    let todo = rally_json(
        &data,
        &["task", "list", "--status", "todo", "--sort", "priority"],
    );
    assert_eq!(listed_ids(&todo), vec![a.clone(), b.clone()]);

    let dropped = rally_json(&data, &["board", "drop", &a, "--card", &c]);
    assert_eq!(dropped["moved"], true);
    assert_eq!(dropped["change"]["from"], "todo");
    assert_eq!(dropped["change"]["to"], "done");

    let done = rally_json(&data, &["task", "list", "--status", "done"]);
    let done_ids = listed_ids(&done);
    assert_eq!(done_ids.len(), 2);
    assert!(done_ids.contains(&a));
    assert!(done_ids.contains(&c));
}

#[test]
fn drop_on_unknown_target_is_not_a_move() {
    let data = DataDir::new();
    let a = add(&data, "A", &[]);

    let out = rally_json(&data, &["board", "drop", &a, "--target", "trash"]);
    assert_eq!(out["moved"], false);
    assert!(out.get("change").is_none());

    let shown = rally_json(&data, &["task", "show", &a]);
    assert_eq!(shown["status"], "todo");
}

#[test]
fn move_and_delete_report_changes() {
    let data = DataDir::new();
    let id = add(&data, "Sweep hall", &[]);

    let moved = rally_json(&data, &["task", "move", &id, "in-progress"]);
    assert_eq!(moved["from"], "todo");
    assert_eq!(moved["to"], "in_progress");

    rally_json(&data, &["remind", "add", &id, "--at", "+2h"]);
    let deleted = rally_json(&data, &["task", "delete", &id]);
    assert_eq!(deleted["deleted"], true);
    assert_eq!(deleted["orphaned_reminders"], 1);

    let list = rally_json(&data, &["task", "list"]);
    assert_eq!(list["total"], 0);
}

#[test]
fn checklist_toggle_and_append() {
    let data = DataDir::new();
    let id = add(&data, "Setup", &["--item", "Chairs"]);

    let appended = rally_json(&data, &["task", "item", &id, "Tables"]);
    assert_eq!(appended["completed"], false);

    let shown = rally_json(&data, &["task", "show", &id]);
    let item_id = shown["checklist"][0]["id"].as_str().unwrap().to_string();

    let toggled = rally_json(&data, &["task", "check", &id, &item_id]);
    assert_eq!(toggled["completed"], true);
    let toggled = rally_json(&data, &["task", "check", &id, &item_id]);
    assert_eq!(toggled["completed"], false);
}

#[test]
fn filters_by_text_and_due_range() {
    let data = DataDir::new();
    let near = add(&data, "Flyer drop", &[]);
    rally_json(&data, &["task", "add", "Flyer reprint", "--due", "+10d"]);
    rally_json(&data, &["task", "add", "Catering", "--due", "+1d"]);

    let out = rally_json(
        &data,
        &["task", "list", "--text", "FLYER", "--from", "now", "--to", "+2d"],
    );
    assert_eq!(listed_ids(&out), vec![near]);
}

#[test]
fn unknown_task_is_a_user_error() {
    let data = DataDir::new();
    rally_cmd(&data)
        .args(["task", "show", "task-nope"])
        .assert()
        .code(2)
        .stderr(contains("error:"))
        .stderr(contains("rally task list"));
}

#[test]
fn unknown_task_json_error_envelope() {
    let data = DataDir::new();
    let output = rally_cmd(&data)
        .args(["--json", "task", "move", "task-nope", "done"])
        .output()
        .expect("run rally");
    assert_eq!(output.status.code(), Some(2));

    let envelope: Value = serde_json::from_slice(&output.stdout).expect("json");
    assert_eq!(envelope["status"], "error");
    assert_eq!(envelope["command"], "task move");
    assert_eq!(envelope["error"]["code"], 2);
    assert_eq!(envelope["error"]["details"]["task_id"], "task-nope");
}

#[test]
fn empty_title_is_rejected() {
    let data = DataDir::new();
    rally_cmd(&data)
        .args(["task", "add", "   ", "--due", "now"])
        .assert()
        .code(2);
}

#[test]
fn events_file_records_task_changes() {
    let data = DataDir::new();
    let events = data.path().join("events.jsonl");
    let events_arg = events.to_string_lossy().to_string();

    let id = add(&data, "Ticket desk", &["--events", &events_arg]);
    rally_json(&data, &["task", "move", &id, "done", "--events", &events_arg]);

    let content = std::fs::read_to_string(&events).expect("events file");
    let kinds: Vec<String> = content
        .lines()
        .map(|line| {
            let value: Value = serde_json::from_str(line).unwrap();
            assert_eq!(value["schema_version"], "rally.event.v1");
            value["event"].as_str().unwrap().to_string()
        })
        .collect();
    assert_eq!(kinds, vec!["task_created", "task_status_changed"]);
}

#[test]
fn out_of_range_due_offset_is_a_user_error() {
    let data = DataDir::new();
    rally_cmd(&data)
        .args(["task", "add", "Far future", "--due", "+9999999999999999w"])
        .assert()
        .code(2)
        .stderr(contains("out of range"));
}
