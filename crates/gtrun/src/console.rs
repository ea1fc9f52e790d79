use std::io::Write;

use colored::Colorize;

use gtrun_logging::time::format_duration;
use gtrun_results::{ResultSink, TestCase, TestOutcome, TestResult};

/// Prints one line per finished test, followed by the failure output of
/// failed tests.
pub struct ConsoleSink<W> {
    writer: W,
    quiet: bool,
}

impl<W: Write + Send> ConsoleSink<W> {
    /// In quiet mode only failures are printed.
    pub const fn new(writer: W, quiet: bool) -> Self {
        Self { writer, quiet }
    }

    pub fn into_writer(self) -> W {
        self.writer
    }

    fn write_result(&mut self, result: &TestResult) -> std::io::Result<()> {
        let label = match result.outcome() {
            TestOutcome::Passed => "PASS".green(),
            TestOutcome::Failed => "FAIL".red().bold(),
            TestOutcome::Skipped => "SKIP".yellow(),
        };

        writeln!(
            self.writer,
            "{label} {} ({})",
            result.test_case(),
            format_duration(result.duration())
        )?;

        if result.outcome() == TestOutcome::Failed {
            for line in result
                .error_message()
                .into_iter()
                .chain(result.error_stack_trace())
                .flat_map(str::lines)
            {
                writeln!(self.writer, "    {line}")?;
            }
        }

        Ok(())
    }
}

impl<W: Write + Send> ResultSink for ConsoleSink<W> {
    fn record_test_case(&mut self, _test_case: &TestCase) {}

    fn record_start(&mut self, test_case: &TestCase) {
        tracing::debug!("Running {test_case}");
    }

    fn record_result(&mut self, result: &TestResult) {
        if self.quiet && result.outcome() != TestOutcome::Failed {
            return;
        }

        if let Err(err) = self.write_result(result) {
            tracing::debug!("Failed to write the result of {}: {err}", result.test_case());
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use gtrun_results::create_stack_trace_entry;

    use super::*;

    fn results() -> Vec<TestResult> {
        vec![
            TestResult::passed(
                TestCase::new("Math.Adds", "/bin/math"),
                Duration::from_millis(3),
            ),
            TestResult::failed(
                TestCase::new("Math.Divides", "/bin/math"),
                Duration::from_millis(1250),
                "Expected equality of these values:\n  a\n  b",
                create_stack_trace_entry("#1 - Failure", "math.cpp", "42"),
            ),
            TestResult::skipped(
                TestCase::new("Math.Later", "/bin/math"),
                Duration::ZERO,
                "not ready",
                "",
            ),
        ]
    }

    fn render(quiet: bool) -> String {
        colored::control::set_override(false);
        let mut sink = ConsoleSink::new(Vec::new(), quiet);
        for result in results() {
            sink.record_result(&result);
        }
        String::from_utf8(sink.into_writer()).unwrap()
    }

    #[test]
    fn prints_every_result() {
        insta::assert_snapshot!(render(false), @r"
        PASS Math.Adds (3ms)
        FAIL Math.Divides (1.25s)
            Expected equality of these values:
              a
              b
            at #1 - Failure in math.cpp:line 42
        SKIP Math.Later (0ms)
        ");
    }

    #[test]
    fn quiet_prints_only_failures() {
        insta::assert_snapshot!(render(true), @r"
        FAIL Math.Divides (1.25s)
            Expected equality of these values:
              a
              b
            at #1 - Failure in math.cpp:line 42
        ");
    }
}
