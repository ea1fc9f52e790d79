use insta_cmd::assert_cmd_snapshot;
use pretty_assertions::assert_eq;

use crate::common::TestContext;

#[test]
fn list_prints_the_discovered_tests() {
    let context = TestContext::new();
    assert_cmd_snapshot!(context.command().args(["list", "math_tests"]), @r"
    success: true
    exit_code: 0
    ----- stdout -----
    Math.Adds
    Math.Divides
    Strings.Concat

    ----- stderr -----
    ");
}

#[test]
fn list_applies_the_filter() {
    let context = TestContext::new();
    assert_cmd_snapshot!(context.command().args(["list", "math_tests", "--filter", "*-Math.Divides"]), @r"
    success: true
    exit_code: 0
    ----- stdout -----
    Math.Adds
    Strings.Concat

    ----- stderr -----
    ");
}

#[test]
fn version_prints_the_crate_version() {
    let context = TestContext::new();
    let output = context.command().arg("version").output().unwrap();

    assert_eq!(
        String::from_utf8_lossy(&output.stdout),
        format!("gtrun {}\n", env!("CARGO_PKG_VERSION"))
    );
}
