use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::{TestCase, TestResult, TestResultStats};

/// Receives discovery and execution events from the runners.
///
/// Implementations must tolerate being called from several worker threads.
/// None of the methods fail: malformed input is the implementor's problem to
/// log.
pub trait TestFrameworkReporter: Send + Sync {
    fn report_tests_found(&self, test_cases: &[TestCase]);

    fn report_tests_started(&self, test_cases: &[TestCase]);

    fn report_test_results(&self, test_results: &[TestResult]);
}

/// The host side of reporting: a console, a test explorer, a file.
pub trait ResultSink: Send {
    fn record_test_case(&mut self, test_case: &TestCase);

    fn record_start(&mut self, test_case: &TestCase);

    fn record_result(&mut self, result: &TestResult);
}

/// Everything a sink can observe, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportEvent {
    Found(TestCase),
    Started(TestCase),
    Finished(TestResult),
}

impl ResultSink for Vec<ReportEvent> {
    fn record_test_case(&mut self, test_case: &TestCase) {
        self.push(ReportEvent::Found(test_case.clone()));
    }

    fn record_start(&mut self, test_case: &TestCase) {
        self.push(ReportEvent::Started(test_case.clone()));
    }

    fn record_result(&mut self, result: &TestResult) {
        self.push(ReportEvent::Finished(result.clone()));
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThrottleSettings {
    /// Pause after this many reported results. `0` disables throttling.
    pub every: usize,

    /// How long each pause lasts.
    pub pause: Duration,

    /// Extra wait in [`ResultReporter::all_tests_finished`] so a slow host can
    /// drain what it already received.
    pub settle_time: Duration,
}

impl ThrottleSettings {
    pub const DISABLED: Self = Self {
        every: 0,
        pause: Duration::ZERO,
        settle_time: Duration::ZERO,
    };

    pub const fn is_enabled(&self) -> bool {
        self.every > 0 && !self.pause.is_zero()
    }
}

impl Default for ThrottleSettings {
    fn default() -> Self {
        Self {
            every: 99,
            pause: Duration::from_millis(500),
            settle_time: Duration::ZERO,
        }
    }
}

struct ReporterState<S> {
    sink: S,
    reported_results: usize,
    stats: TestResultStats,
}

/// Serializes reports from concurrent workers into a single [`ResultSink`].
///
/// Each call holds the lock for its whole slice, so one call's events are
/// never interleaved with another's. Every `throttle.every` results the
/// reporting thread sleeps for `throttle.pause` while still holding the lock.
pub struct ResultReporter<S> {
    state: Mutex<ReporterState<S>>,
    throttle: ThrottleSettings,
    pauses: AtomicUsize,
}

impl<S: ResultSink> ResultReporter<S> {
    pub fn new(sink: S, throttle: ThrottleSettings) -> Self {
        Self {
            state: Mutex::new(ReporterState {
                sink,
                reported_results: 0,
                stats: TestResultStats::default(),
            }),
            throttle,
            pauses: AtomicUsize::new(0),
        }
    }

    /// Number of throttling pauses taken so far.
    pub fn pause_count(&self) -> usize {
        self.pauses.load(Ordering::Relaxed)
    }

    pub fn reported_results(&self) -> usize {
        self.lock().reported_results
    }

    /// Outcome counts of every result that went through this reporter.
    pub fn stats(&self) -> TestResultStats {
        self.lock().stats.clone()
    }

    /// Gives a throttled host time to catch up before the run is declared over.
    pub fn all_tests_finished(&self) {
        if self.throttle.is_enabled() && !self.throttle.settle_time.is_zero() {
            tracing::debug!(
                settle_ms = self.throttle.settle_time.as_millis(),
                "Waiting for the host to process reported results"
            );
            std::thread::sleep(self.throttle.settle_time);
        }
    }

    pub fn into_sink(self) -> S {
        self.state
            .into_inner()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .sink
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ReporterState<S>> {
        // A panicking sink must not take the whole run down with it.
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl<S: ResultSink> TestFrameworkReporter for ResultReporter<S> {
    fn report_tests_found(&self, test_cases: &[TestCase]) {
        if test_cases.is_empty() {
            return;
        }
        let mut state = self.lock();
        for test_case in test_cases {
            state.sink.record_test_case(test_case);
        }
    }

    fn report_tests_started(&self, test_cases: &[TestCase]) {
        if test_cases.is_empty() {
            return;
        }
        let mut state = self.lock();
        for test_case in test_cases {
            state.sink.record_start(test_case);
        }
    }

    fn report_test_results(&self, test_results: &[TestResult]) {
        if test_results.is_empty() {
            return;
        }
        let mut state = self.lock();
        for result in test_results {
            state.sink.record_result(result);
            state.stats.add_result(result);
            state.reported_results += 1;

            if self.throttle.every > 0 && state.reported_results % self.throttle.every == 0 {
                tracing::trace!(
                    reported = state.reported_results,
                    pause_ms = self.throttle.pause.as_millis(),
                    "Throttling result reporting"
                );
                self.pauses.fetch_add(1, Ordering::Relaxed);
                std::thread::sleep(self.throttle.pause);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Instant;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::TestOutcome;

    fn case(name: &str) -> TestCase {
        TestCase::new(name, "bin/tests")
    }

    fn passed(name: &str) -> TestResult {
        TestResult::passed(case(name), Duration::from_millis(1))
    }

    fn throttle(every: usize, pause_ms: u64) -> ThrottleSettings {
        ThrottleSettings {
            every,
            pause: Duration::from_millis(pause_ms),
            settle_time: Duration::ZERO,
        }
    }

    #[test]
    fn throttles_after_every_nth_result() {
        let reporter = ResultReporter::new(Vec::new(), throttle(2, 5));
        let results: Vec<_> = ["A.a", "A.b", "A.c", "A.d", "A.e"]
            .into_iter()
            .map(passed)
            .collect();

        let start = Instant::now();
        reporter.report_test_results(&results);

        assert_eq!(reporter.pause_count(), 2);
        assert!(start.elapsed() >= Duration::from_millis(10));
        assert_eq!(reporter.reported_results(), 5);
    }

    #[test]
    fn throttle_count_spans_calls() {
        let reporter = ResultReporter::new(Vec::new(), throttle(3, 1));
        reporter.report_test_results(&[passed("A.a"), passed("A.b")]);
        assert_eq!(reporter.pause_count(), 0);
        reporter.report_test_results(&[passed("A.c")]);
        assert_eq!(reporter.pause_count(), 1);
    }

    #[test]
    fn zero_disables_throttling() {
        let reporter = ResultReporter::new(Vec::new(), throttle(0, 1000));
        let results: Vec<_> = (0..10).map(|i| passed(&format!("A.t{i}"))).collect();

        let start = Instant::now();
        reporter.report_test_results(&results);

        assert_eq!(reporter.pause_count(), 0);
        assert!(start.elapsed() < Duration::from_millis(1000));
    }

    #[test]
    fn empty_reports_are_noops() {
        let reporter = ResultReporter::new(Vec::new(), ThrottleSettings::DISABLED);
        reporter.report_tests_found(&[]);
        reporter.report_tests_started(&[]);
        reporter.report_test_results(&[]);
        assert!(reporter.into_sink().is_empty());
    }

    #[test]
    fn events_keep_call_order() {
        let reporter = ResultReporter::new(Vec::new(), ThrottleSettings::DISABLED);
        reporter.report_tests_found(&[case("A.a"), case("A.b")]);
        reporter.report_tests_started(&[case("A.a")]);
        reporter.report_test_results(&[passed("A.a")]);

        assert_eq!(
            reporter.into_sink(),
            vec![
                ReportEvent::Found(case("A.a")),
                ReportEvent::Found(case("A.b")),
                ReportEvent::Started(case("A.a")),
                ReportEvent::Finished(passed("A.a")),
            ]
        );
    }

    #[test]
    fn concurrent_calls_do_not_interleave() {
        let reporter = Arc::new(ResultReporter::new(Vec::new(), ThrottleSettings::DISABLED));

        let handles: Vec<_> = (0..4)
            .map(|worker| {
                let reporter = Arc::clone(&reporter);
                std::thread::spawn(move || {
                    let results: Vec<_> = (0..50)
                        .map(|i| passed(&format!("W{worker}.t{i}")))
                        .collect();
                    reporter.report_test_results(&results);
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let reporter = Arc::try_unwrap(reporter).ok().unwrap();
        assert_eq!(reporter.stats().total(), 200);
        let events = reporter.into_sink();

        // Each worker's 50 results form one contiguous, ordered run.
        for chunk in events.chunks(50) {
            let names: Vec<_> = chunk
                .iter()
                .map(|event| match event {
                    ReportEvent::Finished(result) => result.test_case().fully_qualified_name().to_string(),
                    other => panic!("unexpected event {other:?}"),
                })
                .collect();
            let worker = names[0].split('.').next().unwrap().to_string();
            let expected: Vec<_> = (0..50).map(|i| format!("{worker}.t{i}")).collect();
            assert_eq!(names, expected);
        }
    }

    #[test]
    fn stats_follow_outcomes() {
        let reporter = ResultReporter::new(Vec::new(), ThrottleSettings::DISABLED);
        reporter.report_test_results(&[
            passed("A.a"),
            TestResult::failed(case("A.b"), Duration::ZERO, "boom", ""),
            TestResult::skipped(case("A.c"), Duration::ZERO, "", ""),
        ]);
        let stats = reporter.stats();
        assert_eq!(stats.passed(), 1);
        assert_eq!(stats.failed(), 1);
        assert_eq!(stats.skipped(), 1);
        assert!(matches!(
            reporter.into_sink()[1],
            ReportEvent::Finished(ref r) if r.outcome() == TestOutcome::Failed
        ));
    }
}
