use insta_cmd::assert_cmd_snapshot;

use crate::common::TestContext;

#[test]
fn failing_test_fails_the_run() {
    let context = TestContext::new();
    assert_cmd_snapshot!(context.test_command().arg("math_tests"), @r"
    success: false
    exit_code: 1
    ----- stdout -----
    PASS Math.Adds ([TIME])
    FAIL Math.Divides ([TIME])
        Expected equality of these values
        at math.cpp:12 in math.cpp:line 12
    PASS Strings.Concat ([TIME])

    test result: FAILED. 2 passed; 1 failed; 0 skipped; finished in [TIME]

    ----- stderr -----
    ");
}

#[test]
fn passing_selection_succeeds() {
    let context = TestContext::new();
    assert_cmd_snapshot!(context.test_command().args(["math_tests", "--filter", "Math.Adds:Strings.*"]), @r"
    success: true
    exit_code: 0
    ----- stdout -----
    PASS Math.Adds ([TIME])
    PASS Strings.Concat ([TIME])

    test result: ok. 2 passed; 0 failed; 0 skipped; finished in [TIME]

    ----- stderr -----
    ");
}

#[test]
fn quiet_run_only_prints_failures() {
    let context = TestContext::new();
    assert_cmd_snapshot!(context.test_command().args(["math_tests", "-q"]), @r"
    success: false
    exit_code: 1
    ----- stdout -----
    FAIL Math.Divides ([TIME])
        Expected equality of these values
        at math.cpp:12 in math.cpp:line 12

    test result: FAILED. 2 passed; 1 failed; 0 skipped; finished in [TIME]

    ----- stderr -----
    ");
}

#[test]
fn exit_code_test_is_reported() {
    let context = TestContext::new();
    assert_cmd_snapshot!(context.test_command().args(["math_tests", "--exit-code-test-case", "ExitCode"]), @r"
    success: false
    exit_code: 1
    ----- stdout -----
    PASS Math.Adds ([TIME])
    FAIL Math.Divides ([TIME])
        Expected equality of these values
        at math.cpp:12 in math.cpp:line 12
    PASS Strings.Concat ([TIME])
    FAIL math_tests.ExitCode ([TIME])
        Exit code: 1

    test result: FAILED. 2 passed; 2 failed; 0 skipped; finished in [TIME]

    ----- stderr -----
    ");
}

#[test]
fn missing_executable_is_an_error() {
    let context = TestContext::new();
    assert_cmd_snapshot!(context.test_command().arg("does_not_exist"), @r"
    success: false
    exit_code: 2
    ----- stdout -----

    ----- stderr -----
    gtrun failed
      Cause: Failed to discover the tests of `<temp_dir>/does_not_exist`
      Cause: test executable `<temp_dir>/does_not_exist` does not exist
    ");
}
