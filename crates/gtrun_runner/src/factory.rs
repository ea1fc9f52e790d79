use std::sync::Arc;

use gtrun_metadata::ExecutionSettings;
use gtrun_process::{
    CommandDebuggerAttacher, CommandExecutor, DebuggerKind, ExecutorError, LaunchStrategy,
    ProcessExecutor, WrapperLaunchConfigurator,
};

/// Creates the executor of each worker.
pub trait ExecutorFactory: Send + Sync {
    fn create_executor(&self, worker_id: usize) -> Arc<dyn CommandExecutor>;
}

impl<F> ExecutorFactory for F
where
    F: Fn(usize) -> Arc<dyn CommandExecutor> + Send + Sync,
{
    fn create_executor(&self, worker_id: usize) -> Arc<dyn CommandExecutor> {
        self(worker_id)
    }
}

/// Hands out [`ProcessExecutor`]s launching their processes the way the
/// configured debugger needs.
#[derive(Debug, Clone)]
pub struct ProcessExecutorFactory {
    strategy: LaunchStrategy,
    print_test_output: bool,
}

impl ProcessExecutorFactory {
    /// Test output is only echoed when a single worker runs, since the lines
    /// of concurrent processes would interleave.
    pub fn new(settings: &ExecutionSettings, worker_count: usize) -> Result<Self, ExecutorError> {
        let strategy = match settings.debugger {
            DebuggerKind::None => LaunchStrategy::Plain,
            DebuggerKind::Framework => LaunchStrategy::FrameworkDebugged(Arc::new(
                WrapperLaunchConfigurator::new(&settings.debugger_command)?,
            )),
            DebuggerKind::Native => LaunchStrategy::NativeDebugged(Arc::new(
                CommandDebuggerAttacher::new(settings.debugger_command.clone())?,
            )),
        };
        tracing::debug!("Launching test processes with strategy {strategy:?}");

        Ok(Self {
            strategy,
            print_test_output: settings.print_test_output && worker_count <= 1,
        })
    }
}

impl ExecutorFactory for ProcessExecutorFactory {
    fn create_executor(&self, _worker_id: usize) -> Arc<dyn CommandExecutor> {
        Arc::new(
            ProcessExecutor::new(self.strategy.clone())
                .with_print_test_output(self.print_test_output),
        )
    }
}
