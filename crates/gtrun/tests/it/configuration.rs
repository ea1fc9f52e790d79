use insta_cmd::assert_cmd_snapshot;
use pretty_assertions::assert_eq;

use crate::common::TestContext;

#[test]
fn configuration_file_is_discovered() {
    let context = TestContext::new();
    context.write_file("gtrun.toml", "[execution]\nfilter = \"Strings.*\"\n");

    assert_cmd_snapshot!(context.test_command().arg("math_tests"), @r"
    success: true
    exit_code: 0
    ----- stdout -----
    PASS Strings.Concat ([TIME])

    test result: ok. 1 passed; 0 failed; 0 skipped; finished in [TIME]

    ----- stderr -----
    ");
}

#[test]
fn command_line_overrides_the_configuration_file() {
    let context = TestContext::new();
    context.write_file("ci.toml", "[execution]\nfilter = \"Strings.*\"\n");

    assert_cmd_snapshot!(context.command().args(["list", "math_tests", "--config-file", "ci.toml", "--filter", "Math.Adds"]), @r"
    success: true
    exit_code: 0
    ----- stdout -----
    Math.Adds

    ----- stderr -----
    ");
}

#[test]
fn setup_script_receives_the_worker_placeholders() {
    let context = TestContext::new();
    context.write_file("setup.sh", "echo \"$1\" > \"$2/worker\"\ncp \"$2/worker\" ./setup_ran\n");
    context.write_file(
        "gtrun.toml",
        "[execution]\nsetup-batch = \"setup.sh $(ThreadId) $(TestDir)\"\nfilter = \"Math.Adds\"\n",
    );

    let output = context.test_command().arg("math_tests").output().unwrap();

    assert!(output.status.success());
    assert_eq!(
        std::fs::read_to_string(context.root().join("setup_ran")).unwrap(),
        "0\n"
    );
}

#[test]
fn invalid_configuration_is_an_error() {
    let context = TestContext::new();
    context.write_file("gtrun.toml", "[execution]\nunknown-key = 1\n");

    let output = context.test_command().arg("math_tests").output().unwrap();

    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("gtrun failed"));
    assert!(stderr.contains("unknown-key"));
}
