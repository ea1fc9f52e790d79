use std::collections::HashMap;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;

use crate::{ErrorMessageParser, TestCase, TestFrameworkReporter, TestResult};

/// Line prefixes gtest writes to the console around every test.
pub mod markers {
    pub const RUN: &str = "[ RUN      ]";
    pub const PASSED: &str = "[       OK ]";
    pub const FAILED: &str = "[  FAILED  ]";
    pub const SKIPPED: &str = "[  SKIPPED ]";
}

/// Error message of a test whose process died before it finished.
pub const CRASH_TEXT: &str = "!! This test has probably CRASHED !!";

/// Reported for tests gtest claims took less than a millisecond.
const SHORT_TEST_DURATION: Duration = Duration::from_micros(100);

/// A marker glued to the end of output that lacked a trailing newline.
static PREFIXED_LINE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        "(.+)((?:{}|{}|{}).*)",
        regex::escape(markers::PASSED),
        regex::escape(markers::FAILED),
        regex::escape(markers::SKIPPED),
    ))
    .unwrap()
});

fn is_run_line(line: &str) -> bool {
    line.starts_with(markers::RUN)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TestEnd {
    Passed,
    Failed,
    Skipped,
}

fn test_end(line: &str) -> Option<TestEnd> {
    if line.starts_with(markers::PASSED) {
        Some(TestEnd::Passed)
    } else if line.starts_with(markers::FAILED) {
        Some(TestEnd::Failed)
    } else if line.starts_with(markers::SKIPPED) {
        Some(TestEnd::Skipped)
    } else {
        None
    }
}

fn test_name(line: &str) -> &str {
    line.get(markers::RUN.len()..).unwrap_or_default().trim()
}

/// Extracts the duration from a line like `[       OK ] Suite.Name (12 ms)`.
///
/// Falls back to one millisecond when the line carries no readable duration.
/// Anything below a millisecond is reported as 0.1 ms.
pub fn parse_duration(line: &str) -> Duration {
    let parsed = line
        .rfind('(')
        .and_then(|open| line.get(open + 1..))
        .map(|rest| rest.trim_end().trim_end_matches(')').replace("ms", ""))
        .and_then(|millis| millis.trim().replace(',', "").parse::<u64>().ok());

    let millis = parsed.unwrap_or_else(|| {
        tracing::warn!("Could not parse duration in line '{line}'");
        1
    });

    if millis == 0 {
        SHORT_TEST_DURATION
    } else {
        Duration::from_millis(millis)
    }
}

/// Turns gtest console output into [`TestResult`]s while the tests are still
/// running.
///
/// Every `[ RUN      ]` line is reported as a test start, every completed test
/// is reported as soon as its end marker shows up. A test that started but
/// never finished becomes the crashed test case.
pub struct StreamingOutputParser<'a> {
    test_cases: HashMap<&'a str, &'a TestCase>,
    reporter: &'a dyn TestFrameworkReporter,
    console_output: Vec<String>,
    results: Vec<TestResult>,
    crashed_test_case: Option<TestCase>,
}

impl<'a> StreamingOutputParser<'a> {
    pub fn new(test_cases: &'a [TestCase], reporter: &'a dyn TestFrameworkReporter) -> Self {
        Self {
            test_cases: test_cases
                .iter()
                .map(|test_case| (test_case.fully_qualified_name(), test_case))
                .collect(),
            reporter,
            console_output: Vec::new(),
            results: Vec::new(),
            crashed_test_case: None,
        }
    }

    pub fn report_line(&mut self, line: &str) {
        if let Some(captures) = PREFIXED_LINE_RE.captures(line) {
            let output = captures.get(1).map_or("", |m| m.as_str());
            let end = captures.get(2).map_or("", |m| m.as_str());
            if !output.is_empty() {
                self.push_line(output);
            }
            self.push_line(end);
        } else {
            self.push_line(line);
        }
    }

    fn push_line(&mut self, line: &str) {
        if is_run_line(line) {
            if !self.console_output.is_empty() {
                self.report_test_result();
                self.console_output.clear();
            }
            self.report_test_start(line);
        }
        self.console_output.push(line.to_string());
    }

    /// Finishes the test whose output is still buffered. Call once the process
    /// has exited.
    pub fn flush(&mut self) {
        if !self.console_output.is_empty() {
            self.report_test_result();
            self.console_output.clear();
        }
    }

    pub fn test_results(&self) -> &[TestResult] {
        &self.results
    }

    pub fn crashed_test_case(&self) -> Option<&TestCase> {
        self.crashed_test_case.as_ref()
    }

    pub fn into_results(self) -> (Vec<TestResult>, Option<TestCase>) {
        (self.results, self.crashed_test_case)
    }

    fn find_test_case(&self, name: &str) -> Option<&'a TestCase> {
        self.test_cases.get(name).copied()
    }

    fn report_test_start(&self, line: &str) {
        if let Some(test_case) = self.find_test_case(test_name(line)) {
            self.reporter
                .report_tests_started(std::slice::from_ref(test_case));
        }
    }

    fn report_test_result(&mut self) {
        if let Some(result) = self.create_test_result() {
            self.reporter
                .report_test_results(std::slice::from_ref(&result));
            self.results.push(result);
        }
    }

    fn create_test_result(&mut self) -> Option<TestResult> {
        let mut lines = self
            .console_output
            .iter()
            .skip_while(|line| !is_run_line(line));

        let run_line = lines.next()?;
        let Some(test_case) = self.find_test_case(test_name(run_line)) else {
            tracing::debug!("Ignoring output of unknown test: {run_line}");
            return None;
        };

        let mut output = String::new();
        let mut end = None;
        for line in lines {
            if let Some(kind) = test_end(line) {
                end = Some((kind, line));
                break;
            }
            output.push_str(line);
            output.push('\n');
        }

        let result = match end {
            Some((TestEnd::Passed, line)) => TestResult::passed(test_case.clone(), parse_duration(line)),
            Some((TestEnd::Failed, line)) => {
                let parsed = ErrorMessageParser::new(&output).parse();
                TestResult::failed(
                    test_case.clone(),
                    parse_duration(line),
                    parsed.message,
                    parsed.stack_trace,
                )
            }
            Some((TestEnd::Skipped, line)) => {
                TestResult::skipped(test_case.clone(), parse_duration(line), output.trim(), "")
            }
            None => {
                let mut message = CRASH_TEXT.to_string();
                if !output.is_empty() {
                    message.push_str("\nTest output:\n\n");
                    message.push_str(&output);
                }
                self.crashed_test_case = Some(test_case.clone());
                TestResult::failed(test_case.clone(), Duration::ZERO, message, "")
            }
        };

        Some(result)
    }
}
