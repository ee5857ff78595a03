//! Integration tests for the command-line interface

mod common;

use assert_cmd::Command;
use common::*;
use predicates::prelude::*;

fn pipework() -> Command {
    let mut cmd = Command::cargo_bin("pipework").unwrap();
    cmd.env_remove("RUST_LOG")
        .env_remove("NODE_ENV")
        .env("NO_COLOR", "1");
    cmd
}

#[test]
fn test_list_shows_sequences_and_tasks() {
    let (temp_dir, _config_path) = create_test_config(
        "tasks:\n  lint:\n    usage: Lint the bundle\n    deps: [js]\n    run: echo lint\n",
    );

    pipework()
        .current_dir(temp_dir.path())
        .arg("--list")
        .assert()
        .success()
        .stdout(predicate::str::contains("Sequences:"))
        .stdout(predicate::str::contains("build"))
        .stdout(predicate::str::contains("Lint the bundle (after js)"))
        .stdout(predicate::str::contains("scss, lib-css"));
}

#[test]
fn test_build_sequence_succeeds() {
    let (temp_dir, _config_path) = create_site(SITE_CONFIG);

    pipework()
        .current_dir(temp_dir.path())
        .env("NODE_ENV", "production")
        .arg("build")
        .assert()
        .success()
        .stdout(predicate::str::contains("build start!"))
        .stdout(predicate::str::contains("environment: prod"));

    assert!(temp_dir.path().join("dist/js/index.min.js").exists());
    assert!(temp_dir.path().join("dist/index.html").exists());
}

#[test]
fn test_config_file_flag() {
    let (temp_dir, config_path) = create_site(SITE_CONFIG);

    pipework()
        .arg("--file")
        .arg(&config_path)
        .arg("-q")
        .arg("css")
        .env("NODE_ENV", "dev")
        .assert()
        .success();

    assert!(temp_dir.path().join("dist/css/main.css").exists());
    assert!(!temp_dir.path().join("dist/js").exists());
}

#[test]
fn test_tool_failure_exits_non_zero() {
    let config = SITE_CONFIG.replace("prefix: \"sed", "prefix: \"exit 1; sed");
    let (temp_dir, _config_path) = create_site(&config);

    pipework()
        .current_dir(temp_dir.path())
        .env("NODE_ENV", "dev")
        .arg("build")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("autoprefixer failed"));
}

#[test]
fn test_unknown_environment_rejected() {
    let (temp_dir, _config_path) = create_site(SITE_CONFIG);

    pipework()
        .current_dir(temp_dir.path())
        .env("NODE_ENV", "staging")
        .arg("build")
        .assert()
        .failure()
        .stderr(predicate::str::contains("staging"));

    assert!(!temp_dir.path().join("dist").exists());
}

#[test]
fn test_unknown_target_rejected() {
    let (temp_dir, _config_path) = create_test_config("");

    pipework()
        .current_dir(temp_dir.path())
        .arg("deploy")
        .assert()
        .failure();
}

#[cfg(unix)]
#[test]
fn test_interrupt_after_watch_mode_failure_exits_non_zero() {
    use std::process::{Command as StdCommand, Stdio};
    use std::thread;
    use std::time::{Duration, Instant};

    let (temp_dir, _config_path) = create_test_config(
        "sequences:\n  dev:\n    - [watch]\n    - [broken]\ntasks:\n  broken:\n    run: exit 3\n",
    );
    std::fs::create_dir_all(temp_dir.path().join("src/style")).unwrap();

    let mut child = StdCommand::new(assert_cmd::cargo::cargo_bin("pipework"))
        .current_dir(temp_dir.path())
        .arg("dev")
        .env_remove("RUST_LOG")
        .env_remove("NODE_ENV")
        .env("NO_COLOR", "1")
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap();

    // Let the watcher start and the failing phase report before interrupting
    thread::sleep(Duration::from_secs(3));
    let status = StdCommand::new("kill")
        .args(["-INT", &child.id().to_string()])
        .status()
        .unwrap();
    assert!(status.success());

    let deadline = Instant::now() + Duration::from_secs(10);
    while child.try_wait().unwrap().is_none() {
        if Instant::now() > deadline {
            child.kill().unwrap();
            panic!("pipework did not exit after SIGINT");
        }
        thread::sleep(Duration::from_millis(50));
    }

    let output = child.wait_with_output().unwrap();
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert_eq!(output.status.code(), Some(1), "stderr: {stderr}");
    assert!(stderr.contains("broken"), "stderr: {stderr}");
}
