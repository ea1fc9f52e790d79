use camino::Utf8PathBuf;
use clap::Parser;

use gtrun_logging::TerminalColor;
use gtrun_metadata::{ExecutionOptions, GtestOptions, Options};
use gtrun_process::DebuggerKind;
use gtrun_system::EnvVars;

pub use gtrun_logging::Verbosity;

#[derive(Debug, Parser)]
#[command(author, name = "gtrun", about = "A Google Test runner.")]
#[command(version)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, clap::Subcommand)]
pub enum Command {
    /// Run tests.
    Test(TestCommand),

    /// List the tests of the given executables without running them.
    List(ListCommand),

    /// Display gtrun's version
    Version,
}

/// How the test processes are debugged.
#[derive(Debug, Copy, Clone, PartialEq, Eq, clap::ValueEnum)]
pub enum DebuggerArg {
    /// Run the tests without a debugger.
    None,

    /// Launch the tests under the debugger command.
    Framework,

    /// Attach the debugger command to each running test process.
    Native,
}

impl From<DebuggerArg> for DebuggerKind {
    fn from(value: DebuggerArg) -> Self {
        match value {
            DebuggerArg::None => Self::None,
            DebuggerArg::Framework => Self::Framework,
            DebuggerArg::Native => Self::Native,
        }
    }
}

#[derive(Debug, Parser)]
pub struct TestCommand {
    #[clap(
        help = "Google Test executables to run",
        value_name = "EXECUTABLE",
        required = true
    )]
    pub executables: Vec<Utf8PathBuf>,

    #[clap(flatten)]
    pub verbosity: Verbosity,

    /// The path to a `gtrun.toml` file to use for configuration.
    ///
    /// This takes precedence over any discovered configuration file.
    #[arg(long, env = EnvVars::GTRUN_CONFIG_FILE)]
    pub config_file: Option<Utf8PathBuf>,

    /// Control when colored output is used.
    #[arg(long, value_name = "WHEN")]
    pub color: Option<TerminalColor>,

    /// Number of parallel workers. `0` uses all available cores.
    #[arg(long, short = 'n')]
    pub num_workers: Option<usize>,

    /// Run all tests on a single worker.
    #[arg(long)]
    pub no_parallel: bool,

    /// Only run tests matching this gtest filter, e.g. `Suite.*-Suite.Slow`.
    #[arg(long)]
    pub filter: Option<String>,

    /// Echo the output of the test processes.
    ///
    /// Only takes effect when running on a single worker.
    #[arg(long)]
    pub print_test_output: bool,

    /// Working directory of the test processes. Supports `$(ExecutableDir)`
    /// and `$(Executable)`.
    #[arg(long)]
    pub working_dir: Option<String>,

    /// Prepended to `PATH` for the test processes.
    #[arg(long)]
    pub path_extension: Option<String>,

    /// Extra arguments passed to every test executable.
    #[arg(long, allow_hyphen_values = true)]
    pub additional_args: Option<String>,

    /// Keep test processes alive when the run is cancelled.
    #[arg(long)]
    pub no_kill_on_cancel: bool,

    #[arg(long, value_name = "KIND")]
    pub debugger: Option<DebuggerArg>,

    /// Debugger command. `{pid}` is replaced with the test process id when
    /// attaching.
    #[arg(long, value_name = "COMMAND")]
    pub debugger_command: Option<String>,

    /// Script each worker runs before its tests, with its arguments.
    /// Supports `$(ThreadId)` and `$(TestDir)`.
    #[arg(long, value_name = "COMMAND")]
    pub setup_batch: Option<String>,

    /// Script each worker runs after its tests.
    #[arg(long, value_name = "COMMAND")]
    pub teardown_batch: Option<String>,

    /// Report the exit code of every executable as an extra test with this
    /// name.
    #[arg(long, value_name = "NAME")]
    pub exit_code_test_case: Option<String>,

    /// Let exceptions escape the tests instead of reporting them as failures.
    #[arg(long)]
    pub no_catch_exceptions: bool,

    /// Turn assertion failures into debugger breakpoints.
    #[arg(long)]
    pub break_on_failure: bool,

    /// Run tests whose name starts with `DISABLED_`.
    #[arg(long)]
    pub also_run_disabled_tests: bool,

    /// Randomize the test order.
    #[arg(long)]
    pub shuffle: bool,

    /// Seed used for shuffling. `0` lets gtest pick one.
    #[arg(long, requires = "shuffle")]
    pub random_seed: Option<u32>,

    /// Repeat every test this many times. `-1` repeats forever.
    #[arg(long, allow_negative_numbers = true)]
    pub repeat: Option<i32>,
}

impl TestCommand {
    pub fn into_options(self) -> Options {
        Options {
            execution: Some(ExecutionOptions {
                max_threads: self.num_workers,
                parallel: self.no_parallel.then_some(false),
                working_dir: self.working_dir,
                path_extension: self.path_extension,
                additional_args: self.additional_args,
                filter: self.filter,
                print_test_output: self.print_test_output.then_some(true),
                kill_processes_on_cancel: self.no_kill_on_cancel.then_some(false),
                debugger: self.debugger.map(DebuggerKind::from),
                debugger_command: self.debugger_command,
                setup_batch: self.setup_batch,
                teardown_batch: self.teardown_batch,
                exit_code_test_case: self.exit_code_test_case,
            }),
            gtest: Some(GtestOptions {
                catch_exceptions: self.no_catch_exceptions.then_some(false),
                break_on_failure: self.break_on_failure.then_some(true),
                run_disabled_tests: self.also_run_disabled_tests.then_some(true),
                shuffle_tests: self.shuffle.then_some(true),
                shuffle_seed: self.random_seed,
                repetitions: self.repeat,
            }),
            reporting: None,
        }
    }
}

#[derive(Debug, Parser)]
pub struct ListCommand {
    #[clap(
        help = "Google Test executables to list",
        value_name = "EXECUTABLE",
        required = true
    )]
    pub executables: Vec<Utf8PathBuf>,

    #[clap(flatten)]
    pub verbosity: Verbosity,

    /// The path to a `gtrun.toml` file to use for configuration.
    #[arg(long, env = EnvVars::GTRUN_CONFIG_FILE)]
    pub config_file: Option<Utf8PathBuf>,

    /// Control when colored output is used.
    #[arg(long, value_name = "WHEN")]
    pub color: Option<TerminalColor>,

    /// Only list tests matching this gtest filter.
    #[arg(long)]
    pub filter: Option<String>,
}

impl ListCommand {
    pub fn into_options(self) -> Options {
        Options {
            execution: Some(ExecutionOptions {
                filter: self.filter,
                ..ExecutionOptions::default()
            }),
            ..Options::default()
        }
    }
}
