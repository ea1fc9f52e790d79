use std::time::Duration;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use gtrun_process::DebuggerKind;
use gtrun_results::ThrottleSettings;

use crate::filter::{TestFilter, TestFilterError};
use crate::settings::{ExecutionSettings, GtestSettings, ProjectSettings, ReportingSettings};

/// The contents of a `gtrun.toml`. Every value is optional; unset values fall
/// back to the defaults when resolved into [`ProjectSettings`].
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct Options {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution: Option<ExecutionOptions>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub gtest: Option<GtestOptions>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub reporting: Option<ReportingOptions>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct ExecutionOptions {
    /// Number of worker threads. `0` uses all available cores.
    pub max_threads: Option<usize>,

    /// Run batches in parallel.
    pub parallel: Option<bool>,

    /// Working directory of the test processes. Supports `$(ExecutableDir)`
    /// and `$(Executable)`.
    pub working_dir: Option<String>,

    /// Prepended to `PATH` for the test processes.
    pub path_extension: Option<String>,

    /// Extra arguments passed to every test executable.
    pub additional_args: Option<String>,

    /// Only run tests matching this gtest-style filter.
    pub filter: Option<String>,

    /// Echo the output of the test processes.
    pub print_test_output: Option<bool>,

    /// Kill running test processes when the run is cancelled.
    pub kill_processes_on_cancel: Option<bool>,

    pub debugger: Option<DebuggerKind>,

    /// Command used to debug the tests. For native debugging `{pid}` is
    /// replaced with the id of the test process.
    pub debugger_command: Option<String>,

    /// Script each worker runs before its tests, followed by its arguments.
    /// Supports `$(ThreadId)` and `$(TestDir)`.
    pub setup_batch: Option<String>,

    /// Script each worker runs after its tests. Same syntax as
    /// `setup-batch`.
    pub teardown_batch: Option<String>,

    /// When set, every executable gets an extra test `<executable>.<name>`
    /// that fails if the executable exited with a non-zero code.
    pub exit_code_test_case: Option<String>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct GtestOptions {
    pub catch_exceptions: Option<bool>,
    pub break_on_failure: Option<bool>,
    pub run_disabled_tests: Option<bool>,
    pub shuffle_tests: Option<bool>,
    /// `0` lets gtest pick a seed.
    pub shuffle_seed: Option<u32>,
    /// `-1` repeats forever.
    pub repetitions: Option<i32>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct ReportingOptions {
    /// Pause result reporting after this many results. `0` disables the pause.
    pub throttle_every: Option<usize>,
    pub throttle_pause_ms: Option<u64>,
    pub settle_time_ms: Option<u64>,
}

trait Combine {
    /// Fills the unset values of `self` from `other`.
    #[must_use]
    fn combine(self, other: Self) -> Self;
}

impl<T: Combine> Combine for Option<T> {
    fn combine(self, other: Self) -> Self {
        match (self, other) {
            (Some(this), Some(other)) => Some(this.combine(other)),
            (this, other) => this.or(other),
        }
    }
}

macro_rules! impl_combine {
    ($ty:ident { $($field:ident),* $(,)? }) => {
        impl Combine for $ty {
            fn combine(self, other: Self) -> Self {
                Self {
                    $($field: self.$field.or(other.$field),)*
                }
            }
        }
    };
}

impl_combine!(ExecutionOptions {
    max_threads,
    parallel,
    working_dir,
    path_extension,
    additional_args,
    filter,
    print_test_output,
    kill_processes_on_cancel,
    debugger,
    debugger_command,
    setup_batch,
    teardown_batch,
    exit_code_test_case,
});

impl_combine!(GtestOptions {
    catch_exceptions,
    break_on_failure,
    run_disabled_tests,
    shuffle_tests,
    shuffle_seed,
    repetitions,
});

impl_combine!(ReportingOptions {
    throttle_every,
    throttle_pause_ms,
    settle_time_ms,
});

impl Options {
    pub fn from_toml_str(content: &str) -> Result<Self, GtrunTomlError> {
        let options = toml::from_str(content)?;
        Ok(options)
    }

    /// Combines two option sets; values of `self` take precedence.
    #[must_use]
    pub fn combine(self, other: Self) -> Self {
        Self {
            execution: self.execution.combine(other.execution),
            gtest: self.gtest.combine(other.gtest),
            reporting: self.reporting.combine(other.reporting),
        }
    }

    pub fn to_settings(&self) -> Result<ProjectSettings, ToSettingsError> {
        let execution = self.execution.clone().unwrap_or_default();
        let gtest = self.gtest.clone().unwrap_or_default();
        let reporting = self.reporting.clone().unwrap_or_default();

        let additional_args = match execution.additional_args.as_deref() {
            None | Some("") => Vec::new(),
            Some(args) => shlex::split(args)
                .ok_or_else(|| ToSettingsError::InvalidAdditionalArgs(args.to_string()))?,
        };

        let filter = execution
            .filter
            .as_deref()
            .filter(|filter| !filter.is_empty())
            .map(TestFilter::new)
            .transpose()?;

        let max_threads = match execution.max_threads {
            None | Some(0) => gtrun_system::max_parallelism().get(),
            Some(threads) => threads,
        };

        let debugger = execution.debugger.unwrap_or_default();
        let debugger_command = execution
            .debugger_command
            .filter(|command| !command.trim().is_empty())
            .unwrap_or_else(|| default_debugger_command(debugger).to_string());

        let throttle = ThrottleSettings {
            every: reporting.throttle_every.unwrap_or(99),
            pause: Duration::from_millis(reporting.throttle_pause_ms.unwrap_or(500)),
            settle_time: Duration::from_millis(reporting.settle_time_ms.unwrap_or(0)),
        };

        Ok(ProjectSettings {
            execution: ExecutionSettings {
                max_threads,
                parallel: execution.parallel.unwrap_or(true),
                working_dir: execution
                    .working_dir
                    .unwrap_or_else(|| crate::EXECUTABLE_DIR_PLACEHOLDER.to_string()),
                path_extension: execution.path_extension.filter(|ext| !ext.is_empty()),
                additional_args,
                filter,
                print_test_output: execution.print_test_output.unwrap_or(false),
                kill_processes_on_cancel: execution.kill_processes_on_cancel.unwrap_or(true),
                debugger,
                debugger_command,
                setup_batch: non_blank(execution.setup_batch),
                teardown_batch: non_blank(execution.teardown_batch),
                exit_code_test_case: non_blank(execution.exit_code_test_case),
            },
            gtest: GtestSettings {
                catch_exceptions: gtest.catch_exceptions.unwrap_or(true),
                break_on_failure: gtest.break_on_failure.unwrap_or(false),
                run_disabled_tests: gtest.run_disabled_tests.unwrap_or(false),
                shuffle_tests: gtest.shuffle_tests.unwrap_or(false),
                shuffle_seed: gtest.shuffle_seed.unwrap_or(0),
                repetitions: gtest.repetitions.unwrap_or(1),
            },
            reporting: ReportingSettings { throttle },
        })
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}

const fn default_debugger_command(debugger: DebuggerKind) -> &'static str {
    match debugger {
        DebuggerKind::Framework => "gdbserver :2345",
        DebuggerKind::None | DebuggerKind::Native => "gdb -p {pid} -batch -ex continue",
    }
}

/// Options given on the command line, layered over the configuration file.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ProjectOptionsOverrides {
    pub config_file_override: Option<Utf8PathBuf>,
    pub options: Options,
}

impl ProjectOptionsOverrides {
    pub const fn new(config_file_override: Option<Utf8PathBuf>, options: Options) -> Self {
        Self {
            config_file_override,
            options,
        }
    }

    /// Applies the overrides; the command line takes precedence.
    pub fn apply_to(&self, options: Options) -> Options {
        self.options.clone().combine(options)
    }
}

#[derive(Debug, Error)]
#[error(transparent)]
pub struct GtrunTomlError(#[from] toml::de::Error);

#[derive(Debug, Error)]
pub enum ToSettingsError {
    #[error("invalid `additional-args`: `{0}`")]
    InvalidAdditionalArgs(String),

    #[error("invalid `filter`: {0}")]
    InvalidFilter(#[from] TestFilterError),
}
