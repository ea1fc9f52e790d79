use std::fmt;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

/// A single test discovered in a test executable.
///
/// Ordering is by fully qualified name first, then by executable, which is
/// what the schedulers rely on for deterministic tie-breaking.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TestCase {
    fully_qualified_name: String,
    source: Utf8PathBuf,
}

impl TestCase {
    pub fn new(fully_qualified_name: impl Into<String>, source: impl Into<Utf8PathBuf>) -> Self {
        Self {
            fully_qualified_name: fully_qualified_name.into(),
            source: source.into(),
        }
    }

    /// `Suite.Name`, `Prefix/Suite.Name/0` and so on, exactly as gtest prints it.
    pub fn fully_qualified_name(&self) -> &str {
        &self.fully_qualified_name
    }

    /// The executable this test lives in.
    pub fn source(&self) -> &Utf8Path {
        &self.source
    }

    /// The part of the name before the first `.`.
    pub fn suite(&self) -> &str {
        self.fully_qualified_name
            .split_once('.')
            .map_or(self.fully_qualified_name.as_str(), |(suite, _)| suite)
    }
}

impl fmt::Display for TestCase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.fully_qualified_name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TestOutcome {
    Passed,
    Failed,
    Skipped,
}

impl TestOutcome {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Passed => "passed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestResult {
    test_case: TestCase,
    outcome: TestOutcome,
    duration: Duration,
    error_message: Option<String>,
    error_stack_trace: Option<String>,
}

impl TestResult {
    pub fn passed(test_case: TestCase, duration: Duration) -> Self {
        Self {
            test_case,
            outcome: TestOutcome::Passed,
            duration,
            error_message: None,
            error_stack_trace: None,
        }
    }

    pub fn failed(
        test_case: TestCase,
        duration: Duration,
        error_message: impl Into<String>,
        error_stack_trace: impl Into<String>,
    ) -> Self {
        Self {
            test_case,
            outcome: TestOutcome::Failed,
            duration,
            error_message: non_empty(error_message.into()),
            error_stack_trace: non_empty(error_stack_trace.into()),
        }
    }

    pub fn skipped(
        test_case: TestCase,
        duration: Duration,
        error_message: impl Into<String>,
        error_stack_trace: impl Into<String>,
    ) -> Self {
        Self {
            test_case,
            outcome: TestOutcome::Skipped,
            duration,
            error_message: non_empty(error_message.into()),
            error_stack_trace: non_empty(error_stack_trace.into()),
        }
    }

    pub const fn test_case(&self) -> &TestCase {
        &self.test_case
    }

    pub const fn outcome(&self) -> TestOutcome {
        self.outcome
    }

    pub const fn duration(&self) -> Duration {
        self.duration
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    pub fn error_stack_trace(&self) -> Option<&str> {
        self.error_stack_trace.as_deref()
    }
}

fn non_empty(value: String) -> Option<String> {
    if value.is_empty() { None } else { Some(value) }
}
