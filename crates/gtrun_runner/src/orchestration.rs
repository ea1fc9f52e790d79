use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use camino::Utf8PathBuf;

use gtrun_logging::time::format_duration;
use gtrun_metadata::ProjectSettings;
use gtrun_process::ProcessExecutor;
use gtrun_results::{TestCase, TestFrameworkReporter, TestResultStats};
use gtrun_scheduling::TestDurationStore;

use crate::discovery::discover_tests;
use crate::exit_code::{ExitCodeCollector, report_exit_code_tests};
use crate::factory::{ExecutorFactory, ProcessExecutorFactory};
use crate::parallel::ParallelTestRunner;
use crate::sequential::{SequentialTestRunner, TestRunner};
use crate::shutdown::{run_until_shutdown, shutdown_receiver};

#[derive(Debug, Clone, Copy)]
pub struct TestRunConfig {
    /// Whether Ctrl+C cancels the run.
    ///
    /// The handler is installed once per process; leave it off where the
    /// embedding application handles signals itself.
    pub create_ctrlc_handler: bool,
}

impl Default for TestRunConfig {
    fn default() -> Self {
        Self {
            create_ctrlc_handler: true,
        }
    }
}

/// The discovered tests of all executables and those selected to run.
#[derive(Debug, Clone, Default)]
pub struct DiscoveredTests {
    pub all_test_cases: Vec<TestCase>,
    pub test_cases_to_run: Vec<TestCase>,
}

/// Lists the tests of every executable and applies the configured filter.
pub fn discover(executables: &[Utf8PathBuf], settings: &ProjectSettings) -> Result<DiscoveredTests> {
    let start = Instant::now();
    let executor = ProcessExecutor::default();

    let mut all_test_cases = Vec::new();
    for executable in executables {
        let test_cases = discover_tests(&executor, executable, settings)
            .with_context(|| format!("Failed to discover the tests of `{executable}`"))?;
        all_test_cases.extend(test_cases);
    }

    let test_cases_to_run: Vec<TestCase> = match &settings.execution().filter {
        Some(filter) => all_test_cases
            .iter()
            .filter(|test_case| filter.matches(test_case.fully_qualified_name()))
            .cloned()
            .collect(),
        None => all_test_cases.clone(),
    };

    tracing::info!(
        "Discovered {} tests ({} selected) in {}",
        all_test_cases.len(),
        test_cases_to_run.len(),
        format_duration(start.elapsed())
    );

    Ok(DiscoveredTests {
        all_test_cases,
        test_cases_to_run,
    })
}

/// Runs the selected tests on as many workers as configured.
///
/// When the run was cancelled the returned stats are marked as such. With an
/// exit code test configured, one extra result per executable is reported
/// after the tests finished.
pub fn run_tests(
    settings: Arc<ProjectSettings>,
    tests: &DiscoveredTests,
    reporter: &dyn TestFrameworkReporter,
    config: &TestRunConfig,
) -> Result<TestResultStats> {
    reporter.report_tests_found(&tests.test_cases_to_run);
    if tests.test_cases_to_run.is_empty() {
        tracing::info!("No tests to run");
        return Ok(TestResultStats::default());
    }

    let worker_count = settings.worker_count();
    let factory = Arc::new(
        ProcessExecutorFactory::new(settings.execution(), worker_count)
            .context("Invalid debugger configuration")?,
    );
    let durations = Arc::new(TestDurationStore::new());
    let exit_code_test_case = settings.execution().exit_code_test_case.clone();
    let exit_codes = Arc::new(ExitCodeCollector::default());

    let runner: Box<dyn TestRunner> = if worker_count > 1 {
        let runner = ParallelTestRunner::new(settings, factory, durations);
        Box::new(match exit_code_test_case {
            Some(_) => runner.with_exit_codes(Arc::clone(&exit_codes)),
            None => runner,
        })
    } else {
        let executor = factory.create_executor(0);
        let runner = SequentialTestRunner::new(0, settings, executor, durations);
        Box::new(match exit_code_test_case {
            Some(_) => runner.with_exit_codes(Arc::clone(&exit_codes)),
            None => runner,
        })
    };

    let shutdown = if config.create_ctrlc_handler {
        shutdown_receiver()
    } else {
        None
    };

    let start = Instant::now();
    let mut stats = run_until_shutdown(runner.as_ref(), shutdown, || {
        runner.run_tests(
            &tests.all_test_cases,
            &tests.test_cases_to_run,
            reporter,
        )
    })?;

    if runner.is_cancelled() {
        stats.mark_cancelled();
    } else if let Some(name) = &exit_code_test_case {
        stats.merge(&report_exit_code_tests(name, &exit_codes.aggregate(), reporter));
    }

    tracing::info!(
        "Ran {} tests in {}",
        stats.total(),
        format_duration(start.elapsed())
    );

    Ok(stats)
}
