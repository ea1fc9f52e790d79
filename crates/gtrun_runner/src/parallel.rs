use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::{Context, Result, anyhow};

use gtrun_metadata::ProjectSettings;
use gtrun_results::{TestCase, TestFrameworkReporter, TestResultStats};
use gtrun_scheduling::{
    DurationBasedTestsSplitter, NumberBasedTestsSplitter, TestDurationStore, TestsSplitter,
};

use crate::exit_code::ExitCodeCollector;
use crate::factory::ExecutorFactory;
use crate::sequential::{SequentialTestRunner, TestRunner};

/// Splits the tests into one batch per worker and runs every batch on its own
/// thread with a [`SequentialTestRunner`].
pub struct ParallelTestRunner {
    settings: Arc<ProjectSettings>,
    factory: Arc<dyn ExecutorFactory>,
    durations: Arc<TestDurationStore>,
    exit_codes: Option<Arc<ExitCodeCollector>>,
    state: Mutex<RunnerState>,
}

#[derive(Default)]
struct RunnerState {
    cancelled: bool,
    runners: Vec<Arc<SequentialTestRunner>>,
}

impl ParallelTestRunner {
    pub fn new(
        settings: Arc<ProjectSettings>,
        factory: Arc<dyn ExecutorFactory>,
        durations: Arc<TestDurationStore>,
    ) -> Self {
        Self {
            settings,
            factory,
            durations,
            exit_codes: None,
            state: Mutex::default(),
        }
    }

    /// Every worker records its exit codes in `exit_codes`.
    #[must_use]
    pub fn with_exit_codes(mut self, exit_codes: Arc<ExitCodeCollector>) -> Self {
        self.exit_codes = Some(exit_codes);
        self
    }

    fn lock(&self) -> MutexGuard<'_, RunnerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn splitter(&self, test_cases_to_run: &[TestCase]) -> Box<dyn TestsSplitter> {
        let worker_count = self.settings.worker_count();
        let durations = self
            .durations
            .read_test_durations(test_cases_to_run)
            .unwrap_or_else(|err| {
                tracing::warn!("Ignoring stored test durations: {err}");
                HashMap::new()
            });

        if durations.len() < test_cases_to_run.len() {
            tracing::debug!("Splitting tests by number");
            Box::new(NumberBasedTestsSplitter::new(test_cases_to_run, worker_count))
        } else {
            tracing::debug!("Splitting tests by duration");
            Box::new(DurationBasedTestsSplitter::new(&durations, worker_count))
        }
    }

    fn create_runner(&self, worker_id: usize) -> Arc<SequentialTestRunner> {
        let mut runner = SequentialTestRunner::new(
            worker_id,
            Arc::clone(&self.settings),
            self.factory.create_executor(worker_id),
            Arc::clone(&self.durations),
        );
        if let Some(exit_codes) = &self.exit_codes {
            runner = runner.with_exit_codes(Arc::clone(exit_codes));
        }
        let runner = Arc::new(runner);

        let mut state = self.lock();
        if state.cancelled {
            runner.cancel();
        }
        state.runners.push(Arc::clone(&runner));
        runner
    }
}

impl TestRunner for ParallelTestRunner {
    fn run_tests(
        &self,
        all_test_cases: &[TestCase],
        test_cases_to_run: &[TestCase],
        reporter: &dyn TestFrameworkReporter,
    ) -> Result<TestResultStats> {
        let batches = self.splitter(test_cases_to_run).split_test_cases();
        tracing::info!("Executing tests on {} workers", batches.len());

        std::thread::scope(|scope| {
            let mut handles = Vec::new();

            for (worker_id, batch) in batches.into_iter().enumerate() {
                if batch.is_empty() {
                    tracing::debug!("Skipping worker {worker_id} with no tests");
                    continue;
                }

                let runner = self.create_runner(worker_id);
                tracing::info!("Worker {worker_id} runs {} tests", batch.len());

                let handle = std::thread::Builder::new()
                    .name(format!("gtrun-worker-{worker_id}"))
                    .spawn_scoped(scope, move || {
                        runner.run_tests(all_test_cases, &batch, reporter)
                    })
                    .with_context(|| format!("Failed to spawn worker {worker_id}"))?;
                handles.push((worker_id, handle));
            }

            let mut stats = TestResultStats::default();
            let mut first_error = None;
            for (worker_id, handle) in handles {
                let outcome = handle
                    .join()
                    .map_err(|_| anyhow!("Worker {worker_id} panicked"))
                    .and_then(|result| result.with_context(|| format!("Worker {worker_id} failed")));
                match outcome {
                    Ok(worker_stats) => stats.merge(&worker_stats),
                    Err(err) => {
                        tracing::error!("{err:#}");
                        first_error.get_or_insert(err);
                    }
                }
            }

            first_error.map_or(Ok(stats), Err)
        })
    }

    fn cancel(&self) {
        let mut state = self.lock();
        if state.cancelled {
            return;
        }
        state.cancelled = true;
        tracing::info!("Cancelling {} workers", state.runners.len());
        for runner in &state.runners {
            runner.cancel();
        }
    }

    fn is_cancelled(&self) -> bool {
        self.lock().cancelled
    }
}
