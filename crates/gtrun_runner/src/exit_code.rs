use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};

use gtrun_results::{TestCase, TestFrameworkReporter, TestResult, TestResultStats};

/// The exit code of one executable, aggregated over all of its invocations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutableResult {
    pub executable: Utf8PathBuf,
    pub exit_code: i32,
}

/// Collects the exit codes of every test process, from any worker.
#[derive(Debug, Default)]
pub struct ExitCodeCollector {
    exit_codes: Mutex<BTreeMap<Utf8PathBuf, Vec<i32>>>,
}

impl ExitCodeCollector {
    pub fn record(&self, executable: &Utf8Path, exit_code: i32) {
        self.exit_codes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(executable.to_path_buf())
            .or_default()
            .push(exit_code);
    }

    /// One result per executable. Of several exit codes the one furthest from
    /// zero wins, the negative one on a tie.
    pub fn aggregate(&self) -> Vec<ExecutableResult> {
        self.exit_codes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(executable, exit_codes)| ExecutableResult {
                executable: executable.clone(),
                exit_code: exit_codes
                    .iter()
                    .copied()
                    .max_by_key(|code| (code.unsigned_abs(), std::cmp::Reverse(*code)))
                    .unwrap_or_default(),
            })
            .collect()
    }
}

/// The synthesized test standing for the exit code of `executable`, e.g.
/// `math_tests_exe.ExitCode`.
pub fn exit_code_test_case(executable: &Utf8Path, name: &str) -> TestCase {
    let file_name = executable.file_name().unwrap_or(executable.as_str());
    TestCase::new(format!("{}.{name}", file_name.replace('.', "_")), executable)
}

/// Reports a passed or failed exit code test for every executable.
pub fn report_exit_code_tests(
    name: &str,
    results: &[ExecutableResult],
    reporter: &dyn TestFrameworkReporter,
) -> TestResultStats {
    let mut stats = TestResultStats::default();

    for result in results {
        let test_case = exit_code_test_case(&result.executable, name);
        reporter.report_tests_started(std::slice::from_ref(&test_case));

        let test_result = if result.exit_code == 0 {
            TestResult::passed(test_case, Duration::ZERO)
        } else {
            TestResult::failed(
                test_case,
                Duration::ZERO,
                format!("Exit code: {}", result.exit_code),
                "",
            )
        };

        stats.add_result(&test_result);
        reporter.report_test_results(std::slice::from_ref(&test_result));
    }

    stats
}
