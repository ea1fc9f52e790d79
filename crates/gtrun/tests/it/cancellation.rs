use std::process::Stdio;
use std::time::{Duration, Instant};

use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use pretty_assertions::assert_eq;

use crate::common::TestContext;

const SLOW_GTEST: &str = r#"#!/bin/sh
case "$1" in
  --gtest_list_tests) echo "Slow."; echo "  Test"; exit 0 ;;
esac
echo "[ RUN      ] Slow.Test"
touch started
exec sleep 10
"#;

#[test]
fn interrupted_run_is_reported_as_cancelled() {
    let context = TestContext::new();
    context.write_executable("slow_tests", SLOW_GTEST);

    let start = Instant::now();
    let child = context
        .test_command()
        .arg("slow_tests")
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap();

    let started = context.root().join("started");
    while !started.exists() {
        assert!(start.elapsed() < Duration::from_secs(5), "the test never started");
        std::thread::sleep(Duration::from_millis(10));
    }
    kill(Pid::from_raw(i32::try_from(child.id()).unwrap()), Signal::SIGINT).unwrap();

    let output = child.wait_with_output().unwrap();

    assert!(start.elapsed() < Duration::from_secs(8));
    assert_eq!(output.status.code(), Some(1));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(
        stdout.contains("test result: cancelled. 0 passed; 0 failed; 0 skipped"),
        "{stdout}"
    );
}
