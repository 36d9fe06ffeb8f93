//! Integration tests for the `runlevelctl` binary entry point.

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::str::contains;

#[test]
fn missing_command_exits_with_failure() {
    let mut command = cargo_bin_cmd!("runlevelctl");
    command.assert().failure().stderr(contains("Usage"));
}

#[test]
fn unreachable_socket_is_reported() {
    let dir = tempfile::tempdir().expect("temp dir");
    let socket = dir.path().join("absent.sock");
    let mut command = cargo_bin_cmd!("runlevelctl");
    command
        .arg("--socket")
        .arg(&socket)
        .arg("status")
        .assert()
        .failure()
        .stderr(contains("is the supervisor running?"));
}
