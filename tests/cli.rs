use assert_cmd::prelude::*;
use predicates::str::contains;
use std::process::Command;

fn binary() -> Command {
    Command::cargo_bin("compute-raytracer").expect("binary exists")
}

#[test]
fn help_prints_usage() {
    binary()
        .arg("--help")
        .assert()
        .success()
        .stdout(contains("Usage: compute-raytracer"));
}

#[test]
fn unknown_argument_is_rejected() {
    binary()
        .arg("--teleport")
        .assert()
        .failure()
        .stderr(contains("Unknown argument: --teleport"));
}

#[test]
fn zero_sized_viewport_is_rejected() {
    binary()
        .args(["--size", "0x720"])
        .assert()
        .failure()
        .stderr(contains("greater than zero"));
}

#[test]
fn missing_shader_files_are_reported_before_opening_a_window() {
    let dir = tempfile::tempdir().expect("temp dir");
    binary()
        .arg("--shader-dir")
        .arg(dir.path())
        .assert()
        .failure()
        .stderr(contains("raytracer.wgsl"));
}

#[test]
fn failure_is_reported_once() {
    let dir = tempfile::tempdir().expect("temp dir");
    let output = binary()
        .arg("--shader-dir")
        .arg(dir.path())
        .output()
        .expect("binary runs");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert_eq!(stderr.matches("failed to read shader").count(), 1, "{stderr}");
    assert_eq!(stderr.matches("Error:").count(), 1, "{stderr}");
}
