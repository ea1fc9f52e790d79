#![cfg(unix)]

mod common;

use std::sync::Arc;
use std::time::{Duration, Instant};

use pretty_assertions::assert_eq;

use gtrun_metadata::{Options, ProjectSettings};
use gtrun_results::{ReportEvent, ResultReporter, TestOutcome, TestResult, ThrottleSettings};
use gtrun_runner::{
    DiscoveredTests, ParallelTestRunner, ProcessExecutorFactory, TestRunConfig, TestRunner,
    discover, run_tests,
};
use gtrun_scheduling::TestDurationStore;

use common::FakeGtest;

const NO_CTRLC: TestRunConfig = TestRunConfig {
    create_ctrlc_handler: false,
};

fn settings(toml: &str) -> Arc<ProjectSettings> {
    Arc::new(Options::from_toml_str(toml).unwrap().to_settings().unwrap())
}

fn finished(reporter: ResultReporter<Vec<ReportEvent>>) -> Vec<TestResult> {
    let mut results: Vec<TestResult> = reporter
        .into_sink()
        .into_iter()
        .filter_map(|event| match event {
            ReportEvent::Finished(result) => Some(result),
            _ => None,
        })
        .collect();
    results.sort_by(|a, b| a.test_case().cmp(b.test_case()));
    results
}

fn outcomes(results: &[TestResult]) -> Vec<(&str, TestOutcome)> {
    results
        .iter()
        .map(|result| (result.test_case().fully_qualified_name(), result.outcome()))
        .collect()
}

#[test]
fn discovers_and_runs_tests_sequentially() {
    let fake = FakeGtest::new();
    let executable = fake.executable(
        "math_tests",
        &[
            ("Math", "Adds", "pass"),
            ("Math", "Divides", "fail"),
            ("Math", "Later", "skip"),
        ],
    );
    let settings = settings("[execution]\nparallel = false\n");

    let tests = discover(&[executable.clone()], &settings).unwrap();
    assert_eq!(tests.all_test_cases.len(), 3);

    let reporter = ResultReporter::new(Vec::new(), ThrottleSettings::DISABLED);
    let stats = run_tests(Arc::clone(&settings), &tests, &reporter, &NO_CTRLC).unwrap();

    assert_eq!((stats.passed(), stats.failed(), stats.skipped()), (1, 1, 1));
    let results = finished(reporter);
    assert_eq!(
        outcomes(&results),
        [
            ("Math.Adds", TestOutcome::Passed),
            ("Math.Divides", TestOutcome::Failed),
            ("Math.Later", TestOutcome::Skipped),
        ]
    );
    assert!(
        results[1]
            .error_message()
            .unwrap()
            .contains("Expected equality of these values")
    );
    assert!(TestDurationStore::durations_file(&executable).is_file());
}

#[test]
fn filter_selects_tests() {
    let fake = FakeGtest::new();
    let executable = fake.executable(
        "filtered",
        &[
            ("Fast", "One", "pass"),
            ("Fast", "Two", "pass"),
            ("Slow", "One", "sleep"),
        ],
    );
    let settings = settings("[execution]\nparallel = false\nfilter = \"Fast.*\"\n");

    let tests = discover(&[executable], &settings).unwrap();
    assert_eq!(tests.test_cases_to_run.len(), 2);

    let reporter = ResultReporter::new(Vec::new(), ThrottleSettings::DISABLED);
    let stats = run_tests(Arc::clone(&settings), &tests, &reporter, &NO_CTRLC).unwrap();

    assert_eq!(stats.passed(), 2);
    assert_eq!(stats.total(), 2);
}

#[test]
fn crash_skips_the_remaining_tests() {
    let fake = FakeGtest::new();
    let executable = fake.executable(
        "crashing",
        &[
            ("Crash", "Before", "pass"),
            ("Crash", "Boom", "crash"),
            ("Crash", "After", "pass"),
        ],
    );
    let settings = settings("[execution]\nparallel = false\n");

    let tests = discover(&[executable], &settings).unwrap();
    let reporter = ResultReporter::new(Vec::new(), ThrottleSettings::DISABLED);
    run_tests(Arc::clone(&settings), &tests, &reporter, &NO_CTRLC).unwrap();

    let results = finished(reporter);
    assert_eq!(
        outcomes(&results),
        [
            ("Crash.After", TestOutcome::Skipped),
            ("Crash.Before", TestOutcome::Passed),
            ("Crash.Boom", TestOutcome::Failed),
        ]
    );
    assert!(
        results[2]
            .error_message()
            .unwrap()
            .starts_with("!! This test has probably CRASHED !!")
    );
    assert_eq!(
        results[0].error_message(),
        Some("reason is probably a crash of test Crash.Boom")
    );
}

#[test]
fn parallel_run_over_several_executables() {
    let fake = FakeGtest::new();
    let first = fake.executable(
        "first",
        &[("A", "a", "pass"), ("A", "b", "pass"), ("B", "a", "fail")],
    );
    let second = fake.executable("second", &[("C", "a", "pass"), ("C", "b", "skip")]);
    let settings = settings("[execution]\nmax-threads = 3\n");

    let tests = discover(&[first, second], &settings).unwrap();
    let reporter = ResultReporter::new(Vec::new(), ThrottleSettings::DISABLED);
    let stats = run_tests(Arc::clone(&settings), &tests, &reporter, &NO_CTRLC).unwrap();

    assert_eq!((stats.passed(), stats.failed(), stats.skipped()), (3, 1, 1));
    assert_eq!(finished(reporter).len(), 5);
}

#[test]
fn second_run_splits_by_duration() {
    let fake = FakeGtest::new();
    let executable = fake.executable(
        "timed",
        &[("T", "a", "pass"), ("T", "b", "pass"), ("T", "c", "pass"), ("T", "d", "pass")],
    );
    let settings = settings("[execution]\nmax-threads = 2\n");
    let tests = discover(&[executable], &settings).unwrap();

    for _ in 0..2 {
        let reporter = ResultReporter::new(Vec::new(), ThrottleSettings::DISABLED);
        let stats = run_tests(Arc::clone(&settings), &tests, &reporter, &NO_CTRLC).unwrap();
        assert_eq!(stats.passed(), 4);
    }

    let durations = TestDurationStore::new()
        .read_test_durations(&tests.test_cases_to_run)
        .unwrap();
    assert_eq!(durations.len(), 4);
}

#[test]
fn cancel_stops_running_processes() {
    let fake = FakeGtest::new();
    let executable = fake.executable("sleepy", &[("Sleep", "Long", "sleep")]);
    let settings = settings("[execution]\nmax-threads = 2\n");
    let DiscoveredTests {
        all_test_cases,
        test_cases_to_run,
    } = discover(&[executable], &settings).unwrap();

    let factory = Arc::new(ProcessExecutorFactory::new(settings.execution(), 2).unwrap());
    let runner = ParallelTestRunner::new(
        Arc::clone(&settings),
        factory,
        Arc::new(TestDurationStore::new()),
    );
    let reporter = ResultReporter::new(Vec::new(), ThrottleSettings::DISABLED);

    let start = Instant::now();
    let stats = std::thread::scope(|scope| {
        scope.spawn(|| {
            std::thread::sleep(Duration::from_millis(300));
            runner.cancel();
            runner.cancel();
        });
        runner.run_tests(&all_test_cases, &test_cases_to_run, &reporter)
    })
    .unwrap();

    assert!(start.elapsed() < Duration::from_secs(5));
    assert_eq!(stats.total(), 0);
    assert!(runner.is_cancelled());
}

#[test]
fn exit_code_is_reported_as_a_test() {
    let fake = FakeGtest::new();
    let executable = fake.executable("exit_codes", &[("E", "a", "pass"), ("E", "b", "fail")]);
    let settings = settings(
        "[execution]\nparallel = false\nexit-code-test-case = \"ExitCode\"\n",
    );

    let tests = discover(&[executable], &settings).unwrap();
    let reporter = ResultReporter::new(Vec::new(), ThrottleSettings::DISABLED);
    let stats = run_tests(Arc::clone(&settings), &tests, &reporter, &NO_CTRLC).unwrap();

    assert_eq!((stats.passed(), stats.failed()), (1, 2));
    assert!(!stats.is_cancelled());
    let results = finished(reporter);
    assert_eq!(
        outcomes(&results),
        [
            ("E.a", TestOutcome::Passed),
            ("E.b", TestOutcome::Failed),
            ("exit_codes.ExitCode", TestOutcome::Failed),
        ]
    );
    assert_eq!(results[2].error_message(), Some("Exit code: 1"));
}

#[test]
fn worker_scripts_share_the_test_directory() {
    let fake = FakeGtest::new();
    let executable = fake.executable("scripted", &[("S", "a", "pass")]);
    std::fs::write(fake.root().join("setup.sh"), "echo prepared > \"$1/state\"\n").unwrap();
    std::fs::write(
        fake.root().join("teardown.sh"),
        format!("cp \"$1/state\" '{}/seen_'\"$2\"\n", fake.root()),
    )
    .unwrap();
    let settings = settings(&format!(
        "[execution]\nparallel = false\nsetup-batch = \"{root}/setup.sh $(TestDir)\"\nteardown-batch = \"{root}/teardown.sh $(TestDir) $(ThreadId)\"\n",
        root = fake.root()
    ));

    let tests = discover(&[executable], &settings).unwrap();
    let reporter = ResultReporter::new(Vec::new(), ThrottleSettings::DISABLED);
    let stats = run_tests(Arc::clone(&settings), &tests, &reporter, &NO_CTRLC).unwrap();

    assert_eq!(stats.passed(), 1);
    assert_eq!(
        std::fs::read_to_string(fake.root().join("seen_0")).unwrap(),
        "prepared\n"
    );
}

#[test]
fn missing_executable_fails_discovery() {
    let fake = FakeGtest::new();
    let settings = settings("");

    let err = discover(&[fake.root().join("missing")], &settings).unwrap_err();

    assert!(format!("{err:#}").contains("does not exist"));
}
