use std::fs;
use std::time::Duration as StdDuration;

use chrono::Duration;
use rally::config::{parse_duration, Config};
use rally::error::Error;
use rally::query::{SortDirection, SortField};

#[test]
fn missing_config_uses_defaults() {
    let dir = tempfile::tempdir().expect("tempdir");
    let cfg = Config::load_from_dir(dir.path()).expect("defaults");

    assert_eq!(cfg.scheduler.interval().unwrap(), StdDuration::from_secs(60));
    assert_eq!(cfg.scheduler.display_window().unwrap(), StdDuration::from_secs(10));
    assert_eq!(cfg.scheduler.orphan_label, "(deleted task)");
    assert_eq!(cfg.reminders.retention().unwrap(), None);
    assert_eq!(cfg.query.default_sort, SortField::DueDate);
    assert_eq!(cfg.query.default_direction, SortDirection::Asc);
}

#[test]
fn partial_config_fills_remaining_defaults() {
    let dir = tempfile::tempdir().expect("tempdir");
    let content = r#"
[scheduler]
interval = "5m"

[reminders]
retention = "30d"

[query]
default_sort = "priority"
default_direction = "desc"
"#;
    fs::write(dir.path().join(".rally.toml"), content.trim()).expect("write config");

    let cfg = Config::load_from_dir(dir.path()).expect("load");
    assert_eq!(cfg.scheduler.interval().unwrap(), StdDuration::from_secs(300));
    assert_eq!(cfg.scheduler.display_window().unwrap(), StdDuration::from_secs(10));
    assert_eq!(cfg.reminders.retention().unwrap(), Some(Duration::days(30)));
    assert_eq!(cfg.query.default_sort, SortField::Priority);
    assert_eq!(cfg.query.default_direction, SortDirection::Desc);
}

#[test]
fn invalid_interval_is_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    let content = r#"
[scheduler]
interval = "soon"
"#;
    fs::write(dir.path().join(".rally.toml"), content.trim()).expect("write config");

    let err = Config::load_from_dir(dir.path()).unwrap_err();
    assert!(matches!(err, Error::InvalidConfig(_)), "got {err:?}");
}

#[test]
fn malformed_toml_is_a_parse_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    fs::write(dir.path().join(".rally.toml"), "scheduler = 123").expect("write config");

    let err = Config::load_from_dir(dir.path()).unwrap_err();
    assert!(matches!(err, Error::TomlParse(_)), "got {err:?}");
}

#[test]
fn saved_config_loads_back() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join(".rally.toml");
    let mut cfg = Config::default();
    cfg.scheduler.orphan_label = "(removed)".to_string();
    cfg.reminders.retention = Some("2w".to_string());
    cfg.save(&path).expect("save");

    let loaded = Config::load(&path).expect("load");
    assert_eq!(loaded.scheduler.orphan_label, "(removed)");
    assert_eq!(loaded.reminders.retention().unwrap(), Some(Duration::weeks(2)));
}

#[test]
fn bare_duration_number_means_minutes() {
    assert_eq!(parse_duration("15").unwrap(), Duration::minutes(15));
    assert_eq!(parse_duration("2h").unwrap(), Duration::hours(2));
    assert!(parse_duration("3 fortnights").is_err());
}
