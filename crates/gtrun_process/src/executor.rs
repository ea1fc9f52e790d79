use std::io::{BufRead, BufReader, Read};
use std::process::{Command, Stdio};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use camino::{Utf8Path, Utf8PathBuf};
use crossbeam_channel::{RecvTimeoutError, Sender};

use gtrun_logging::time::format_duration;
use gtrun_system::EnvVars;

use crate::debugger::{DebugLaunchConfigurator, DebuggerAttacher, LaunchSpec};
use crate::{ExitWaiter, ProcessHandle, suspend};

/// Returned by [`CommandExecutor::execute_command_blocking`] when the run was
/// cancelled.
pub const CANCELLED_EXIT_CODE: i32 = -2;

/// Returned when the process could not be started or monitored.
pub const EXECUTION_FAILED_EXIT_CODE: i32 = -1;

const OUTPUT_POLL_INTERVAL: Duration = Duration::from_millis(50);

const STOP_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    #[error("file not found: {0}")]
    FileNotFound(Utf8PathBuf),

    #[error("invalid command line: `{0}`")]
    InvalidCommandLine(String),
}

/// Runs external commands to completion, one at a time.
pub trait CommandExecutor: Send + Sync {
    /// Runs `command` and blocks until it exits or [`CommandExecutor::cancel`]
    /// is called.
    ///
    /// Every line the process writes to stdout or stderr is handed to
    /// `on_output_line` on the calling thread. `path_extension` is prepended
    /// to `PATH`. Returns the exit code, [`CANCELLED_EXIT_CODE`] or
    /// [`EXECUTION_FAILED_EXIT_CODE`].
    fn execute_command_blocking(
        &self,
        command: &Utf8Path,
        arguments: &[String],
        working_dir: &Utf8Path,
        path_extension: Option<&str>,
        environment: &[(String, String)],
        on_output_line: &mut dyn FnMut(&str),
    ) -> i32;

    /// Stops the running command. Safe to call from any thread, any number of
    /// times.
    fn cancel(&self);
}

/// How the executor starts its process.
#[derive(Clone, Default)]
pub enum LaunchStrategy {
    #[default]
    Plain,
    FrameworkDebugged(Arc<dyn DebugLaunchConfigurator>),
    NativeDebugged(Arc<dyn DebuggerAttacher>),
}

impl std::fmt::Debug for LaunchStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Plain => f.write_str("Plain"),
            Self::FrameworkDebugged(_) => f.write_str("FrameworkDebugged"),
            Self::NativeDebugged(_) => f.write_str("NativeDebugged"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExecutorState {
    #[default]
    Idle,
    Running,
    Cancelling,
    Completed,
}

#[derive(Debug, Default)]
struct Inner {
    state: ExecutorState,
    process: Option<ProcessHandle>,
}

/// A [`CommandExecutor`] that spawns real processes.
#[derive(Debug, Default)]
pub struct ProcessExecutor {
    strategy: LaunchStrategy,
    print_test_output: bool,
    inner: Mutex<Inner>,
}

impl ProcessExecutor {
    pub fn new(strategy: LaunchStrategy) -> Self {
        Self {
            strategy,
            print_test_output: false,
            inner: Mutex::default(),
        }
    }

    /// Echo every output line at `info` level.
    #[must_use]
    pub fn with_print_test_output(mut self, print_test_output: bool) -> Self {
        self.print_test_output = print_test_output;
        self
    }

    pub fn state(&self) -> ExecutorState {
        self.lock().state
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_cancelling(&self) -> bool {
        self.state() == ExecutorState::Cancelling
    }

    fn finish(&self) {
        let mut inner = self.lock();
        inner.state = ExecutorState::Completed;
        inner.process = None;
    }

    fn launch_spec(
        &self,
        command: &Utf8Path,
        arguments: &[String],
        environment: &[(String, String)],
    ) -> LaunchSpec {
        let launch = LaunchSpec {
            program: command.to_string(),
            arguments: arguments.to_vec(),
            environment: environment.to_vec(),
        };

        match &self.strategy {
            LaunchStrategy::FrameworkDebugged(configurator) => {
                let launch = configurator.configure(launch);
                tracing::debug!(program = %launch.program, "Launching under debugger");
                launch
            }
            LaunchStrategy::NativeDebugged(_) => suspend::stopped_launch(launch),
            LaunchStrategy::Plain => launch,
        }
    }

    fn spawn(
        &self,
        launch: &LaunchSpec,
        working_dir: &Utf8Path,
        path_extension: Option<&str>,
        output: &Sender<String>,
    ) -> std::io::Result<ProcessHandle> {
        let mut command = Command::new(&launch.program);
        command
            .args(&launch.arguments)
            .current_dir(working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        if path_extension.is_some_and(|extension| !extension.is_empty()) {
            if let Some(path) = gtrun_system::extended_path(path_extension) {
                command.env(EnvVars::PATH, path);
            }
        }
        for (key, value) in &launch.environment {
            command.env(key, value);
        }

        let mut child = command.spawn()?;

        if let Some(stdout) = child.stdout.take() {
            forward_lines(stdout, output.clone(), "stdout")?;
        }
        if let Some(stderr) = child.stderr.take() {
            forward_lines(stderr, output.clone(), "stderr")?;
        }

        Ok(ProcessHandle::from_child(child))
    }
}

impl CommandExecutor for ProcessExecutor {
    fn execute_command_blocking(
        &self,
        command: &Utf8Path,
        arguments: &[String],
        working_dir: &Utf8Path,
        path_extension: Option<&str>,
        environment: &[(String, String)],
        on_output_line: &mut dyn FnMut(&str),
    ) -> i32 {
        {
            let mut inner = self.lock();
            if matches!(
                inner.state,
                ExecutorState::Running | ExecutorState::Cancelling
            ) {
                tracing::error!(
                    "Executor is already running a process, refusing to start {command}"
                );
                return EXECUTION_FAILED_EXIT_CODE;
            }
            inner.state = ExecutorState::Running;
        }

        let launch = self.launch_spec(command, arguments, environment);
        tracing::debug!(
            "Executing {} {} in {working_dir}",
            launch.program,
            launch.arguments.join(" ")
        );

        let start = Instant::now();
        let (sender, receiver) = crossbeam_channel::unbounded();

        let process = match self.spawn(&launch, working_dir, path_extension, &sender) {
            Ok(process) => process,
            Err(err) => {
                tracing::error!("Failed to start {}: {err}", launch.program);
                self.finish();
                return EXECUTION_FAILED_EXIT_CODE;
            }
        };
        // Only the reader threads may keep the channel open.
        drop(sender);

        let waiter = ExitWaiter::attach(&process);
        {
            let mut inner = self.lock();
            if inner.state == ExecutorState::Cancelling {
                process.kill();
            }
            inner.process = Some(process.clone());
        }

        if let LaunchStrategy::NativeDebugged(attacher) = &self.strategy {
            attach_before_start(attacher.as_ref(), &process);
        }

        if self.print_test_output {
            tracing::info!(">>>>>>>>>>>>>>> Output of command '{command}'");
        }

        let mut emit = |line: &str| {
            if self.print_test_output {
                tracing::info!("{line}");
            }
            on_output_line(line);
        };

        loop {
            match receiver.recv_timeout(OUTPUT_POLL_INTERVAL) {
                Ok(line) => emit(&line),
                Err(RecvTimeoutError::Disconnected) => break,
                Err(RecvTimeoutError::Timeout) => {
                    if self.is_cancelling() {
                        break;
                    }
                    // A grandchild may still hold the pipes open.
                    if waiter.has_exited() {
                        for line in receiver.try_iter() {
                            emit(&line);
                        }
                        break;
                    }
                }
            }
        }

        if self.print_test_output {
            tracing::info!("<<<<<<<<<<<<<<< End of output");
        }

        let exit_code = if self.is_cancelling() {
            None
        } else {
            Some(waiter.wait_for_exit())
        };

        // `cancel` can kill the process after it closed its output.
        let exit_code = match exit_code {
            Some(exit_code) if !self.is_cancelling() => exit_code,
            _ => {
                tracing::info!(
                    pid = process.pid(),
                    "Cancelled {command} after {}",
                    format_duration(start.elapsed())
                );
                self.finish();
                return CANCELLED_EXIT_CODE;
            }
        };
        tracing::debug!(
            pid = process.pid(),
            "{command} exited with code {exit_code} in {}",
            format_duration(start.elapsed())
        );
        self.finish();
        exit_code
    }

    fn cancel(&self) {
        let mut inner = self.lock();
        if inner.state != ExecutorState::Running {
            return;
        }
        inner.state = ExecutorState::Cancelling;
        if let Some(process) = &inner.process {
            tracing::debug!(pid = process.pid(), "Killing process");
            process.kill();
        }
    }
}

/// Attaches the debugger while the process is held before its first
/// instruction, then lets it run. The process runs even when the attach fails.
fn attach_before_start(attacher: &dyn DebuggerAttacher, process: &ProcessHandle) {
    let pid = process.pid();

    if !suspend::wait_until_stopped(pid, STOP_TIMEOUT) {
        tracing::warn!(pid, "Process did not stop before the debugger attached");
    }

    if !attacher.attach_debugger(pid) {
        tracing::warn!(pid, "Could not attach debugger, continuing without it");
    }

    if let Err(err) = suspend::resume(pid) {
        tracing::debug!(pid, "Failed to resume process: {err}");
    }
}

/// Sends every line of `stream` to `output` from a dedicated thread.
fn forward_lines(
    stream: impl Read + Send + 'static,
    output: Sender<String>,
    name: &str,
) -> std::io::Result<()> {
    std::thread::Builder::new()
        .name(format!("gtrun-{name}"))
        .spawn(move || {
            let mut reader = BufReader::new(stream);
            let mut buffer = Vec::new();
            loop {
                buffer.clear();
                match reader.read_until(b'\n', &mut buffer) {
                    Ok(0) => break,
                    Ok(_) => {
                        let line = String::from_utf8_lossy(&buffer);
                        let line = line.trim_end_matches(['\n', '\r']);
                        if output.send(line.to_string()).is_err() {
                            break;
                        }
                    }
                    Err(err) => {
                        tracing::debug!("Stopped reading process output: {err}");
                        break;
                    }
                }
            }
        })
        .map(drop)
}
