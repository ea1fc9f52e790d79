use std::collections::{HashMap, HashSet};

use itertools::Itertools;

use gtrun_metadata::GtestSettings;
use gtrun_results::TestCase;

/// Maximum length of a command line on Windows, used everywhere.
pub const MAX_COMMAND_LENGTH: usize = 8191;

const FILTER_OPTION: &str = "--gtest_filter=";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CommandLineError {
    #[error(
        "test `{test}` does not fit on a command line: {length} characters, {available} available"
    )]
    TestNameTooLong {
        test: String,
        length: usize,
        available: usize,
    },
}

/// The arguments of one test executable invocation and the tests it runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    pub test_cases: Vec<TestCase>,
    pub arguments: Vec<String>,
}

impl CommandLine {
    /// Length of the arguments joined by spaces.
    pub fn len(&self) -> usize {
        joined_length(&self.arguments)
    }

    pub fn is_empty(&self) -> bool {
        self.arguments.is_empty()
    }
}

/// Builds the command lines running `test_cases_to_run` out of all tests of
/// one executable.
///
/// No `--gtest_filter` is passed when every test of the executable runs.
/// Suites whose tests all run are selected by `Suite.*`; the remaining tests
/// are listed by name and spread over as many command lines as needed to stay
/// below [`MAX_COMMAND_LENGTH`].
#[derive(Debug)]
pub struct CommandLineGenerator<'a> {
    all_test_cases: &'a [TestCase],
    test_cases_to_run: &'a [TestCase],
    executable_length: usize,
    user_arguments: &'a [String],
    settings: &'a GtestSettings,
}

impl<'a> CommandLineGenerator<'a> {
    pub fn new(
        all_test_cases: &'a [TestCase],
        test_cases_to_run: &'a [TestCase],
        executable_length: usize,
        user_arguments: &'a [String],
        settings: &'a GtestSettings,
    ) -> Self {
        Self {
            all_test_cases,
            test_cases_to_run,
            executable_length,
            user_arguments,
            settings,
        }
    }

    pub fn command_lines(&self) -> Result<Vec<CommandLine>, CommandLineError> {
        if self.test_cases_to_run.is_empty() {
            return Ok(Vec::new());
        }

        let base_arguments = self.base_arguments();

        if self.all_test_cases_are_run() {
            return Ok(vec![CommandLine {
                test_cases: self.test_cases_to_run.to_vec(),
                arguments: self.finish(base_arguments, None),
            }]);
        }

        let suites_running_all_tests = self.suites_running_all_tests();
        let (run_by_suite, mut not_run_by_suite): (Vec<TestCase>, Vec<TestCase>) = self
            .test_cases_to_run
            .iter()
            .cloned()
            .partition(|test_case| suites_running_all_tests.contains(&test_case.suite()));

        let suite_patterns = suites_running_all_tests
            .iter()
            .map(|suite| format!("{suite}.*"))
            .collect_vec();

        let fixed_length = self.executable_length
            + 1
            + joined_length(&base_arguments)
            + usize::from(!base_arguments.is_empty())
            + FILTER_OPTION.len()
            + joined_length(self.user_arguments)
            + usize::from(!self.user_arguments.is_empty());

        let mut command_lines = Vec::new();

        // Suites only go on the first command line.
        let mut patterns = suite_patterns;
        let mut test_cases = run_by_suite;
        loop {
            let available = MAX_COMMAND_LENGTH.saturating_sub(fixed_length + joined_length(&patterns));
            let included = take_up_to_length(&mut not_run_by_suite, available, !patterns.is_empty())?;

            patterns.extend(
                included
                    .iter()
                    .map(|test_case| test_case.fully_qualified_name().to_string()),
            );
            test_cases.extend(included);

            command_lines.push(CommandLine {
                test_cases: std::mem::take(&mut test_cases),
                arguments: self.finish(
                    base_arguments.clone(),
                    Some(format!("{FILTER_OPTION}{}", patterns.join(":"))),
                ),
            });
            patterns.clear();

            if not_run_by_suite.is_empty() {
                break;
            }
        }

        Ok(command_lines)
    }

    fn base_arguments(&self) -> Vec<String> {
        let settings = self.settings;
        let mut arguments = vec![format!(
            "--gtest_catch_exceptions={}",
            u8::from(settings.catch_exceptions)
        )];

        if settings.break_on_failure {
            arguments.push("--gtest_break_on_failure".to_string());
        }
        if settings.run_disabled_tests {
            arguments.push("--gtest_also_run_disabled_tests".to_string());
        }
        if settings.shuffle_tests {
            arguments.push("--gtest_shuffle".to_string());
            if settings.shuffle_seed != 0 {
                arguments.push(format!("--gtest_random_seed={}", settings.shuffle_seed));
            }
        }
        if settings.repetitions != 1 {
            arguments.push(format!("--gtest_repeat={}", settings.repetitions));
        }

        arguments
    }

    fn finish(&self, mut arguments: Vec<String>, filter: Option<String>) -> Vec<String> {
        arguments.extend(filter);
        arguments.extend(self.user_arguments.iter().cloned());
        arguments
    }

    fn all_test_cases_are_run(&self) -> bool {
        let all: HashSet<&TestCase> = self.all_test_cases.iter().collect();
        let to_run: HashSet<&TestCase> = self.test_cases_to_run.iter().collect();
        all == to_run
    }

    /// Suites of the tests to run whose every test runs, in order of
    /// appearance.
    fn suites_running_all_tests(&self) -> Vec<&'a str> {
        let suite_sizes = self.all_test_cases.iter().counts_by(TestCase::suite);
        let to_run_sizes: HashMap<&str, usize> =
            self.test_cases_to_run.iter().counts_by(TestCase::suite);

        self.test_cases_to_run
            .iter()
            .map(TestCase::suite)
            .unique()
            .filter(|suite| suite_sizes.get(suite) == to_run_sizes.get(suite))
            .collect()
    }
}

/// Moves test cases from the front of `remaining` while their `:`-joined
/// names fit into `available` characters.
fn take_up_to_length(
    remaining: &mut Vec<TestCase>,
    available: usize,
    needs_separator: bool,
) -> Result<Vec<TestCase>, CommandLineError> {
    let mut length = 0;
    let mut count = 0;

    for test_case in remaining.iter() {
        let separator = usize::from(count > 0 || needs_separator);
        let next = separator + test_case.fully_qualified_name().len();
        if length + next > available {
            break;
        }
        length += next;
        count += 1;
    }

    if let (0, Some(first)) = (count, remaining.first()) {
        // Retried on a command line of its own.
        if needs_separator {
            return Ok(Vec::new());
        }
        let test = first.fully_qualified_name();
        return Err(CommandLineError::TestNameTooLong {
            test: test.to_string(),
            length: test.len(),
            available,
        });
    }

    Ok(remaining.drain(..count).collect())
}

fn joined_length(arguments: &[String]) -> usize {
    arguments.iter().map(String::len).sum::<usize>() + arguments.len().saturating_sub(1)
}
