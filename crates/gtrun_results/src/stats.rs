use std::collections::HashMap;
use std::time::Instant;

use colored::Colorize;

use crate::{TestOutcome, TestResult};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TestResultStats {
    inner: HashMap<TestOutcome, usize>,
    cancelled: bool,
}

impl TestResultStats {
    pub fn total(&self) -> usize {
        self.inner.values().sum()
    }

    /// A cancelled run is never a success, even when nothing failed.
    pub fn is_success(&self) -> bool {
        self.failed() == 0 && !self.cancelled
    }

    pub fn mark_cancelled(&mut self) {
        self.cancelled = true;
    }

    pub const fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    fn get(&self, outcome: TestOutcome) -> usize {
        self.inner.get(&outcome).copied().unwrap_or(0)
    }

    pub fn passed(&self) -> usize {
        self.get(TestOutcome::Passed)
    }

    pub fn failed(&self) -> usize {
        self.get(TestOutcome::Failed)
    }

    pub fn skipped(&self) -> usize {
        self.get(TestOutcome::Skipped)
    }

    pub fn add(&mut self, outcome: TestOutcome) {
        *self.inner.entry(outcome).or_default() += 1;
    }

    pub fn add_result(&mut self, result: &TestResult) {
        self.add(result.outcome());
    }

    /// Merge another stats object into this one
    pub fn merge(&mut self, other: &Self) {
        for (outcome, count) in &other.inner {
            *self.inner.entry(*outcome).or_default() += count;
        }
        self.cancelled |= other.cancelled;
    }

    pub const fn display(&self, start_time: Instant) -> DisplayTestResultStats<'_> {
        DisplayTestResultStats::new(self, start_time)
    }
}

pub struct DisplayTestResultStats<'a> {
    stats: &'a TestResultStats,
    start_time: Instant,
}

impl<'a> DisplayTestResultStats<'a> {
    const fn new(stats: &'a TestResultStats, start_time: Instant) -> Self {
        Self { stats, start_time }
    }
}

impl std::fmt::Display for DisplayTestResultStats<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "test result: ")?;

        if self.stats.is_cancelled() {
            write!(f, "{}", "cancelled".yellow())?;
        } else if self.stats.is_success() {
            write!(f, "{}", "ok".green())?;
        } else {
            write!(f, "{}", "FAILED".red())?;
        }

        let elapsed = self.start_time.elapsed();
        let time_display = if elapsed.as_secs() < 2 {
            format!("{}ms", elapsed.as_millis())
        } else {
            format!("{}s", elapsed.as_millis() / 1000)
        };

        writeln!(
            f,
            ". {} passed; {} failed; {} skipped; finished in {}",
            self.stats.passed(),
            self.stats.failed(),
            self.stats.skipped(),
            time_display
        )
    }
}
