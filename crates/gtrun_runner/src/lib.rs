mod command_line;
mod discovery;
mod exit_code;
mod factory;
mod orchestration;
mod parallel;
mod sequential;
mod shutdown;

pub use command_line::{CommandLine, CommandLineError, CommandLineGenerator, MAX_COMMAND_LENGTH};
pub use discovery::{DiscoveryError, LIST_TESTS_OPTION, discover_tests, parse_test_list};
pub use exit_code::{
    ExecutableResult, ExitCodeCollector, exit_code_test_case, report_exit_code_tests,
};
pub use factory::{ExecutorFactory, ProcessExecutorFactory};
pub use orchestration::{DiscoveredTests, TestRunConfig, discover, run_tests};
pub use parallel::ParallelTestRunner;
pub use sequential::{SequentialTestRunner, TestRunner};
pub use shutdown::{run_until_shutdown, shutdown_receiver};
