use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use tempfile::TempDir;

use gtrun_logging::time::format_duration;
use gtrun_metadata::{ProjectSettings, replace_worker_placeholders};
use gtrun_process::{CANCELLED_EXIT_CODE, CommandExecutor, CommandExecutorExt, ExecutorError};
use gtrun_results::{
    StreamingOutputParser, TestCase, TestFrameworkReporter, TestResult, TestResultStats,
    create_stack_trace_entry,
};
use gtrun_scheduling::TestDurationStore;

use crate::command_line::CommandLineGenerator;
use crate::exit_code::ExitCodeCollector;

/// Runs a set of test cases and can be cancelled from another thread.
pub trait TestRunner: Send + Sync {
    /// `all_test_cases` are all tests of the involved executables; they decide
    /// whether a filter is needed.
    fn run_tests(
        &self,
        all_test_cases: &[TestCase],
        test_cases_to_run: &[TestCase],
        reporter: &dyn TestFrameworkReporter,
    ) -> Result<TestResultStats>;

    /// Stops the run. Calling it again has no further effect.
    fn cancel(&self);

    /// Whether [`TestRunner::cancel`] was called.
    fn is_cancelled(&self) -> bool;
}

#[derive(Debug, Clone, Copy)]
enum WorkerScript {
    Setup,
    Teardown,
}

impl std::fmt::Display for WorkerScript {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Setup => f.write_str("setup"),
            Self::Teardown => f.write_str("teardown"),
        }
    }
}

/// Runs its tests one executable invocation after another on the calling
/// thread.
///
/// Each run gets a fresh scratch directory (`$(TestDir)`) that lives until the
/// teardown script finished. The configured setup and teardown scripts run
/// before and after the tests; their failures are logged and never stop the
/// run.
pub struct SequentialTestRunner {
    worker_id: usize,
    settings: Arc<ProjectSettings>,
    executor: Arc<dyn CommandExecutor>,
    durations: Arc<TestDurationStore>,
    exit_codes: Option<Arc<ExitCodeCollector>>,
    cancelled: AtomicBool,
}

impl SequentialTestRunner {
    pub fn new(
        worker_id: usize,
        settings: Arc<ProjectSettings>,
        executor: Arc<dyn CommandExecutor>,
        durations: Arc<TestDurationStore>,
    ) -> Self {
        Self {
            worker_id,
            settings,
            executor,
            durations,
            exit_codes: None,
            cancelled: AtomicBool::new(false),
        }
    }

    /// Records the exit code of every finished test process in `exit_codes`.
    #[must_use]
    pub fn with_exit_codes(mut self, exit_codes: Arc<ExitCodeCollector>) -> Self {
        self.exit_codes = Some(exit_codes);
        self
    }

    fn create_test_dir(&self) -> Result<(TempDir, Utf8PathBuf)> {
        let test_dir = tempfile::Builder::new()
            .prefix(&format!("gtrun-worker-{}-", self.worker_id))
            .tempdir()
            .context("Failed to create the test directory")?;
        let path = Utf8PathBuf::from_path_buf(test_dir.path().to_path_buf()).map_err(|path| {
            anyhow::anyhow!("Test directory `{}` is not valid UTF-8", path.display())
        })?;
        Ok((test_dir, path))
    }

    /// Runs the setup or teardown script, if one is configured.
    fn run_worker_script(&self, script: WorkerScript, test_dir: &Utf8Path) {
        let execution = self.settings.execution();
        let configured = match script {
            WorkerScript::Setup => execution.setup_batch.as_deref(),
            WorkerScript::Teardown => execution.teardown_batch.as_deref(),
        };
        let Some(configured) = configured else {
            return;
        };

        let command_line = replace_worker_placeholders(configured, self.worker_id, Some(test_dir));
        match self.execute_script(&command_line) {
            Ok(0) => tracing::debug!(
                "Worker {} ran the {script} script `{command_line}`",
                self.worker_id
            ),
            Ok(exit_code) => tracing::warn!(
                "Worker {}: {script} script `{command_line}` exited with code {exit_code}",
                self.worker_id
            ),
            Err(err) => tracing::error!(
                "Worker {}: could not run the {script} script `{command_line}`: {err}",
                self.worker_id
            ),
        }
    }

    fn execute_script(&self, command_line: &str) -> Result<i32, ExecutorError> {
        let words = shlex::split(command_line)
            .filter(|words| !words.is_empty())
            .ok_or_else(|| ExecutorError::InvalidCommandLine(command_line.to_string()))?;
        let (script, parameters) = words.split_at(1);
        let parameters = shlex::try_join(parameters.iter().map(String::as_str))
            .map_err(|_| ExecutorError::InvalidCommandLine(command_line.to_string()))?;

        let worker_id = self.worker_id;
        self.executor.execute_batch_file_blocking(
            Utf8Path::new(&script[0]),
            &parameters,
            Utf8Path::new("."),
            self.settings.execution().path_extension.as_deref(),
            &mut |line| tracing::debug!("Worker {worker_id} script: {line}"),
        )
    }

    fn run_executables(
        &self,
        all_test_cases: &[TestCase],
        test_cases_to_run: &[TestCase],
        reporter: &dyn TestFrameworkReporter,
        test_dir: &Utf8Path,
    ) -> Result<TestResultStats> {
        let mut stats = TestResultStats::default();

        let mut by_executable: BTreeMap<&Utf8Path, Vec<TestCase>> = BTreeMap::new();
        for test_case in test_cases_to_run {
            by_executable
                .entry(test_case.source())
                .or_default()
                .push(test_case.clone());
        }

        for (executable, test_cases) in by_executable {
            if self.is_cancelled() {
                break;
            }

            let all_of_executable: Vec<TestCase> = all_test_cases
                .iter()
                .filter(|test_case| test_case.source() == executable)
                .cloned()
                .collect();

            self.run_tests_from_executable(
                executable,
                &all_of_executable,
                &test_cases,
                reporter,
                test_dir,
                &mut stats,
            )?;
        }

        Ok(stats)
    }

    fn run_tests_from_executable(
        &self,
        executable: &Utf8Path,
        all_test_cases: &[TestCase],
        test_cases_to_run: &[TestCase],
        reporter: &dyn TestFrameworkReporter,
        test_dir: &Utf8Path,
        stats: &mut TestResultStats,
    ) -> Result<()> {
        let execution = self.settings.execution();
        let working_dir = execution.working_dir_for(executable);
        let path_extension = execution.path_extension_for(executable);
        let user_arguments: Vec<String> = execution
            .additional_args_for(executable)
            .iter()
            .map(|argument| replace_worker_placeholders(argument, self.worker_id, Some(test_dir)))
            .collect();

        let generator = CommandLineGenerator::new(
            all_test_cases,
            test_cases_to_run,
            executable.as_str().len(),
            &user_arguments,
            self.settings.gtest(),
        );
        let command_lines = generator
            .command_lines()
            .with_context(|| format!("Failed to build the command lines for `{executable}`"))?;

        for command_line in command_lines {
            if self.is_cancelled() {
                break;
            }

            tracing::info!(
                "Worker {} executing `{executable} {}`",
                self.worker_id,
                command_line.arguments.join(" ")
            );
            let start = std::time::Instant::now();

            let mut parser = StreamingOutputParser::new(&command_line.test_cases, reporter);
            let exit_code = self.executor.execute_command_blocking(
                executable,
                &command_line.arguments,
                &working_dir,
                path_extension.as_deref(),
                &[],
                &mut |line| parser.report_line(line),
            );

            if exit_code == CANCELLED_EXIT_CODE {
                // The running test was interrupted, not crashed.
                let (results, _) = parser.into_results();
                stats.merge(&record(&self.durations, &results));
                tracing::info!("Worker {} cancelled `{executable}`", self.worker_id);
                break;
            }

            if let Some(exit_codes) = &self.exit_codes {
                exit_codes.record(executable, exit_code);
            }

            parser.flush();
            let (mut results, crashed_test_case) = parser.into_results();
            tracing::debug!(
                "Worker {}: `{executable}` exited with code {exit_code} after {}",
                self.worker_id,
                format_duration(start.elapsed())
            );

            let missing = missing_results(&command_line.test_cases, &results, crashed_test_case.as_ref());
            if !missing.is_empty() {
                reporter.report_test_results(&missing);
                results.extend(missing);
            }

            stats.merge(&record(&self.durations, &results));
        }

        Ok(())
    }
}

impl TestRunner for SequentialTestRunner {
    fn run_tests(
        &self,
        all_test_cases: &[TestCase],
        test_cases_to_run: &[TestCase],
        reporter: &dyn TestFrameworkReporter,
    ) -> Result<TestResultStats> {
        let (test_dir, test_dir_path) = self.create_test_dir()?;

        if !self.is_cancelled() {
            self.run_worker_script(WorkerScript::Setup, &test_dir_path);
        }

        let stats = self.run_executables(all_test_cases, test_cases_to_run, reporter, &test_dir_path);

        self.run_worker_script(WorkerScript::Teardown, &test_dir_path);

        if let Err(err) = test_dir.close() {
            tracing::debug!("Failed to delete test directory `{test_dir_path}`: {err}");
        }

        stats
    }

    fn cancel(&self) {
        if self.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::debug!("Cancelling worker {}", self.worker_id);
        if self.settings.execution().kill_processes_on_cancel {
            self.executor.cancel();
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Results for the tests of a finished command line that produced none.
///
/// When a test crashed, the tests after it never ran and are skipped with a
/// pointer to the crash suspect. Otherwise they are only logged.
fn missing_results(
    test_cases: &[TestCase],
    results: &[TestResult],
    crashed_test_case: Option<&TestCase>,
) -> Vec<TestResult> {
    let missing = test_cases
        .iter()
        .filter(|test_case| !results.iter().any(|result| result.test_case() == *test_case));

    let Some(crashed) = crashed_test_case else {
        for test_case in missing {
            tracing::warn!("Test `{test_case}` was not run");
        }
        return Vec::new();
    };

    let message = format!("reason is probably a crash of test {crashed}");
    let stack_trace =
        create_stack_trace_entry(crashed.fully_qualified_name(), crashed.source().as_str(), "0");
    missing
        .map(|test_case| {
            TestResult::skipped(test_case.clone(), Duration::ZERO, &message, &stack_trace)
        })
        .collect()
}

/// Counts the results and stores their durations.
fn record(durations: &TestDurationStore, results: &[TestResult]) -> TestResultStats {
    if let Err(err) = durations.update_test_durations(results) {
        tracing::warn!("Failed to store test durations: {err}");
    }

    let mut stats = TestResultStats::default();
    for result in results {
        stats.add_result(result);
    }
    stats
}
