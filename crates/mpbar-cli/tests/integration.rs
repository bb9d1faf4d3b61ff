use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;

fn mpbar() -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("mpbar");
    // Keep a stray ./mpbar.toml in the test's cwd from changing behavior.
    cmd.current_dir(std::env::temp_dir());
    cmd
}

fn mpbar_at(dir: &std::path::Path) -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("mpbar");
    cmd.current_dir(dir);
    cmd
}

#[test]
fn demo_threads_reports_all_bars() {
    mpbar()
        .args(["demo", "--iterations", "10", "--workers", "4", "--sleep-max-ms", "3"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Bars done: 2/2"))
        .stdout(predicate::str::contains("Sleep Iteration: 10/10"))
        .stdout(predicate::str::contains("Map Iteration: 10/10"));
}

#[test]
fn demo_processes_aggregates_child_updates() {
    mpbar()
        .args([
            "demo",
            "--mode",
            "processes",
            "--iterations",
            "6",
            "--workers",
            "3",
            "--sleep-max-ms",
            "5",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("Sleep Iteration: 6/6"))
        .stdout(predicate::str::contains("Bars done: 2/2"));
}

#[test]
fn demo_failure_exits_with_worker_code() {
    mpbar()
        .args(["demo", "--iterations", "5", "--sleep-max-ms", "0", "--fail-at", "2"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("worker 2 failed: injected failure"))
        .stdout(predicate::str::contains("Bars done").not());
}

#[test]
fn demo_zero_workers_is_rejected() {
    mpbar()
        .args(["demo", "--iterations", "1", "--workers", "0"])
        .assert()
        .code(4)
        .stderr(predicate::str::contains("worker count"));
}

#[test]
fn demo_reads_config_from_cwd() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("mpbar.toml"),
        "[watcher]\npoll_interval_ms = 5\nchannel_capacity = 2\n",
    )
    .unwrap();
    mpbar_at(dir.path())
        .args(["demo", "--iterations", "8", "--sleep-max-ms", "0"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Sleep Iteration: 8/8"));
}

#[test]
fn invalid_config_exits_with_config_code() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("mpbar.toml"), "[watcher]\npoll_interval_ms = 0\n").unwrap();
    mpbar_at(dir.path())
        .args(["demo", "--iterations", "1"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("poll_interval_ms"));
}

#[test]
fn explicit_config_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("custom.toml");
    std::fs::write(&path, "[display]\nrefresh_hz = 5\n").unwrap();
    mpbar()
        .args(["demo", "--iterations", "3", "--sleep-max-ms", "0", "--config"])
        .arg(&path)
        .assert()
        .success();
}

#[test]
fn worker_writes_a_frame_to_stdout() {
    let output = mpbar()
        .args(["worker", "--proxy", r#"{"channel":42,"description":"x"}"#])
        .output()
        .unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    let frame: serde_json::Value = serde_json::from_str(stdout.trim()).unwrap();
    assert_eq!(frame["channel"], 42);
    assert_eq!(frame["message"]["advance"], 1);
}

#[test]
fn worker_rejects_malformed_proxy() {
    mpbar()
        .args(["worker", "--proxy", "nope"])
        .assert()
        .code(4)
        .stderr(predicate::str::contains("invalid proxy"));
}

#[test]
fn worker_fail_flag() {
    mpbar()
        .args(["worker", "--proxy", r#"{"channel":1}"#, "--fail"])
        .assert()
        .code(3)
        .stdout(predicate::str::is_empty());
}

#[test]
fn worker_is_hidden_from_help() {
    mpbar()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("demo"))
        .stdout(predicate::str::contains("worker").not());
}
