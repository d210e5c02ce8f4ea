#![cfg(feature = "cli")]

use assert_cmd::Command;
use predicates::str::contains as str_contains;
use tempfile::NamedTempFile;

const SEED: &str = "resource r1 480 A Ana Silva\n\
                    resource r2 60 B\n\
                    visit 1 A 2025-04-01 09:00 10:00\n\
                    visit 2 A 2025-04-01 11:00 12:30\n\
                    visit 3 B 2025-04-01 09:00 10:00\n";

#[allow(deprecated)]
fn run_cli(script: &str) -> assert_cmd::assert::Assert {
    let mut cmd = Command::cargo_bin("cli").expect("cli binary");
    cmd.write_stdin(script.to_string()).assert()
}

#[test]
fn cli_schedules_a_day_and_lists_routes() {
    let script = format!("{SEED}schedule 2025-04-01\nroutes 2025-04-01\nquit\n");
    run_cli(&script)
        .success()
        .stdout(str_contains("Scheduled 3/3 visits on 2025-04-01 (optimal), 2 new route(s)."))
        .stdout(str_contains("| 2.50  |"))
        .stdout(str_contains("1,2"));
}

#[test]
fn cli_reports_double_bookings() {
    let script = format!(
        "{SEED}assign 1 r1\nvisit 4 A 2025-04-01 09:30 10:15 r1\nquit\n"
    );
    run_cli(&script)
        .success()
        .stdout(str_contains("Visit 1 booked on r1 (route 1, 1.00 h)."))
        .stdout(str_contains("Error: double booking: resource r1 already has task 1"));
}

#[test]
fn cli_empty_day_completes_with_notice() {
    run_cli("schedule 2025-04-02\nquit\n")
        .success()
        .stdout(str_contains("Scheduled 0/0 visits on 2025-04-02 (skipped), 0 new route(s)."))
        .stdout(str_contains("EmptyInput"));
}

#[test]
fn cli_rejects_unknown_strategy() {
    run_cli("schedule 2025-04-01 annealing\nquit\n")
        .success()
        .stdout(str_contains("Error: unknown strategy 'annealing'"));
}

#[test]
fn cli_cancel_and_progress() {
    let script = format!("{SEED}cancel 3\ncancel 9\nprogress 2025-04-01\nquit\n");
    run_cli(&script)
        .success()
        .stdout(str_contains("Visit 3 cancelled."))
        .stdout(str_contains("Visit 9 not found."))
        .stdout(str_contains("2025-04-01: 3 visits, 0 completed, 1 cancelled, 2 unassigned (0.0%)"));
}

#[test]
fn cli_route_status_changes() {
    let script = format!("{SEED}assign 3 r2\nroute 1 confirmed\nroute 5 confirmed\nquit\n");
    run_cli(&script)
        .success()
        .stdout(str_contains("Route 1 is now confirmed."))
        .stdout(str_contains("Error: route 5 not found"));
}

#[test]
fn cli_save_and_load_json_round_trip() {
    let tmp = NamedTempFile::new().expect("create temp file");
    let path = tmp.path().to_string_lossy().to_string();
    let script = format!(
        "{SEED}schedule 2025-04-01\nsave json {path}\nvisit 9 A 2025-04-01 15:00 16:00\nload json {path}\nvisits 2025-04-01\nquit\n"
    );
    let assert = run_cli(&script).success();
    let output = String::from_utf8_lossy(&assert.get_output().stdout);
    assert!(output.contains("Store loaded from"), "expected load confirmation");
    let after_reload = output
        .split("Store loaded from")
        .last()
        .unwrap_or_default();
    assert!(after_reload.contains("| r1 "), "expected committed caregiver to persist");
    assert!(
        !after_reload.contains("| 9 "),
        "visit added after saving should be dropped by the reload"
    );
}

#[test]
fn cli_exports_and_imports_csv() {
    let tasks = NamedTempFile::new().expect("create temp file");
    let resources = NamedTempFile::new().expect("create temp file");
    let tasks_path = tasks.path().to_string_lossy().to_string();
    let resources_path = resources.path().to_string_lossy().to_string();

    let export = format!(
        "{SEED}export tasks {tasks_path}\nexport resources {resources_path}\nquit\n"
    );
    run_cli(&export)
        .success()
        .stdout(str_contains("Exported 3 tasks."))
        .stdout(str_contains("Exported 2 resources."));

    let import = format!(
        "import resources {resources_path}\nimport tasks {tasks_path}\nschedule 2025-04-01\nquit\n"
    );
    run_cli(&import)
        .success()
        .stdout(str_contains("Imported 2 resources."))
        .stdout(str_contains("Imported 3 tasks."))
        .stdout(str_contains("Scheduled 3/3 visits"));
}

#[test]
fn cli_unknown_command_points_to_help() {
    run_cli("frobnicate\nquit\n")
        .success()
        .stdout(str_contains("Unknown command. Type 'help'."));
}

#[test]
fn cli_completes_and_deletes_visits() {
    let script = format!(
        "{SEED}schedule 2025-04-01\ncomplete 1\nstatus 2 not_done\nstatus 2 maybe\ndelete 3\ndelete 3\nprogress 2025-04-01\nquit\n"
    );
    run_cli(&script)
        .success()
        .stdout(str_contains("Visit 1 completed."))
        .stdout(str_contains("Visit 2 not_done."))
        .stdout(str_contains("Error: unknown visit status 'maybe'"))
        .stdout(str_contains("Visit 3 deleted."))
        .stdout(str_contains("Visit 3 not found."))
        .stdout(str_contains("2025-04-01: 2 visits, 1 completed, 0 cancelled, 0 unassigned (50.0%)"));
}
