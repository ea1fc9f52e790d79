//! Spawning, watching and cancelling test processes.

mod batch;
mod debugger;
mod executor;
mod exit_waiter;
mod handle;
mod suspend;

pub use batch::CommandExecutorExt;
pub use debugger::{
    CommandDebuggerAttacher, DebugLaunchConfigurator, DebuggerAttacher, DebuggerKind, LaunchSpec,
    WrapperLaunchConfigurator,
};
pub use executor::{
    CANCELLED_EXIT_CODE, CommandExecutor, EXECUTION_FAILED_EXIT_CODE, ExecutorError,
    ExecutorState, LaunchStrategy, ProcessExecutor,
};
pub use exit_waiter::ExitWaiter;
pub use handle::{ProcessHandle, exit_code};
