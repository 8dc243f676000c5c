use assert_cmd::Command;
use predicates::str::contains;

#[test]
fn rally_help_works() {
    Command::cargo_bin("rally")
        .expect("binary")
        .arg("--help")
        .assert()
        .success()
        .stdout(contains("task lifecycle and reminders"));
}

#[test]
fn subcommand_help_works() {
    let subcommands = [
        vec!["task"],
        vec!["task", "add"],
        vec!["task", "list"],
        vec!["board", "drop"],
        vec!["remind"],
        vec!["remind", "compact"],
        vec!["notify"],
        vec!["watch"],
    ];

    for cmd in subcommands {
        Command::cargo_bin("rally")
            .expect("binary")
            .args(&cmd)
            .arg("--help")
            .assert()
            .success();
    }
}
