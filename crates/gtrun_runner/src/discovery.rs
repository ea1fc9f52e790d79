use camino::{Utf8Path, Utf8PathBuf};

use gtrun_metadata::ProjectSettings;
use gtrun_process::{CANCELLED_EXIT_CODE, CommandExecutor};
use gtrun_results::TestCase;

pub const LIST_TESTS_OPTION: &str = "--gtest_list_tests";

const TYPE_PARAM_MARKER: &str = "  # TypeParam";
const GET_PARAM_MARKER: &str = "  # GetParam()";

#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("test executable `{0}` does not exist")]
    ExecutableNotFound(Utf8PathBuf),

    #[error("listing the tests of `{executable}` failed with exit code {exit_code}")]
    ListTestsFailed {
        executable: Utf8PathBuf,
        exit_code: i32,
        output: Vec<String>,
    },

    #[error("listing the tests of `{0}` was cancelled")]
    Cancelled(Utf8PathBuf),
}

/// Lists the tests of a Google Test executable by running it with
/// `--gtest_list_tests`.
pub fn discover_tests(
    executor: &dyn CommandExecutor,
    executable: &Utf8Path,
    settings: &ProjectSettings,
) -> Result<Vec<TestCase>, DiscoveryError> {
    if !executable.is_file() {
        return Err(DiscoveryError::ExecutableNotFound(executable.to_path_buf()));
    }

    let execution = settings.execution();
    let working_dir = execution.working_dir_for(executable);
    let path_extension = execution.path_extension_for(executable);

    let mut output = Vec::new();
    let exit_code = executor.execute_command_blocking(
        executable,
        &[LIST_TESTS_OPTION.to_string()],
        &working_dir,
        path_extension.as_deref(),
        &[],
        &mut |line| output.push(line.to_string()),
    );

    match exit_code {
        0 => {}
        CANCELLED_EXIT_CODE => return Err(DiscoveryError::Cancelled(executable.to_path_buf())),
        exit_code => {
            return Err(DiscoveryError::ListTestsFailed {
                executable: executable.to_path_buf(),
                exit_code,
                output,
            });
        }
    }

    let test_cases = parse_test_list(output.as_slice(), executable);
    tracing::info!("Found {} tests in `{executable}`", test_cases.len());
    Ok(test_cases)
}

/// Parses the output of `--gtest_list_tests`.
///
/// ```text
/// Suite.
///   Test
/// Prefix/TypedSuite/0.  # TypeParam = int
///   Test
/// Prefix/ParamSuite.
///   Test/0  # GetParam() = 1
/// ```
pub fn parse_test_list(lines: &[impl AsRef<str>], executable: &Utf8Path) -> Vec<TestCase> {
    let mut suite: Option<&str> = None;
    let mut test_cases = Vec::new();

    for line in lines {
        let line = line.as_ref().trim_end();
        if line.is_empty() {
            continue;
        }

        if let Some(test) = line.strip_prefix("  ") {
            let test = test.split(GET_PARAM_MARKER).next().unwrap_or(test).trim();
            match suite {
                Some(suite) if !test.is_empty() => {
                    test_cases.push(TestCase::new(format!("{suite}.{test}"), executable));
                }
                _ => tracing::debug!("Ignoring test line outside of a suite: `{line}`"),
            }
            continue;
        }

        let name = line.split(TYPE_PARAM_MARKER).next().unwrap_or(line).trim_end();
        suite = name.strip_suffix('.').filter(|suite| !suite.is_empty());
        if suite.is_none() {
            tracing::debug!("Ignoring unexpected line: `{line}`");
        }
    }

    test_cases
}
