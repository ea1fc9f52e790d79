use std::fmt;
use std::process::{Child, Command, Stdio};
use std::str::FromStr;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use gtrun_logging::time::format_duration;

use crate::{ExecutorError, suspend};

/// How test processes are put under a debugger, if at all.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DebuggerKind {
    #[default]
    None,
    /// The launch itself is rewritten so the debugger owns the process from
    /// its first instruction.
    Framework,
    /// A debugger attaches to the already running process by id.
    Native,
}

impl DebuggerKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Framework => "framework",
            Self::Native => "native",
        }
    }
}

impl fmt::Display for DebuggerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DebuggerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "framework" => Ok(Self::Framework),
            "native" => Ok(Self::Native),
            other => Err(format!(
                "unknown debugger kind `{other}`, expected one of `none`, `framework`, `native`"
            )),
        }
    }
}

/// Attaches a debugger to a running process.
pub trait DebuggerAttacher: Send + Sync {
    /// Returns whether the debugger could be attached. Never panics.
    fn attach_debugger(&self, process_id: u32) -> bool;
}

/// Starts an external debugger command for the process, e.g.
/// `gdb -p {pid} -batch -ex continue`, and waits until it is attached.
///
/// On Linux the attach is confirmed through the tracer of the process. Where
/// that cannot be observed, a debugger still running after a short grace
/// period counts as attached.
#[derive(Debug, Clone)]
pub struct CommandDebuggerAttacher {
    template: String,
    attach_timeout: Duration,
}

impl CommandDebuggerAttacher {
    pub const PID_PLACEHOLDER: &'static str = "{pid}";

    const DEFAULT_ATTACH_TIMEOUT: Duration = Duration::from_secs(10);
    const UNCONFIRMED_GRACE: Duration = Duration::from_millis(500);
    const POLL_INTERVAL: Duration = Duration::from_millis(10);

    pub fn new(template: impl Into<String>) -> Result<Self, ExecutorError> {
        let template = template.into();
        if split_command_line(&template).is_none() {
            return Err(ExecutorError::InvalidCommandLine(template));
        }
        Ok(Self {
            template,
            attach_timeout: Self::DEFAULT_ATTACH_TIMEOUT,
        })
    }

    /// How long the debugger gets to attach before it is given up on.
    #[must_use]
    pub fn with_attach_timeout(mut self, attach_timeout: Duration) -> Self {
        self.attach_timeout = attach_timeout;
        self
    }

    pub fn command_line(&self, process_id: u32) -> Option<Vec<String>> {
        split_command_line(
            &self
                .template
                .replace(Self::PID_PLACEHOLDER, &process_id.to_string()),
        )
    }

    fn wait_for_attach(&self, process_id: u32, debugger: &mut Child) -> bool {
        let start = Instant::now();
        loop {
            match debugger.try_wait() {
                Ok(Some(status)) => {
                    tracing::warn!(pid = process_id, "Debugger exited with {status} before attaching");
                    return false;
                }
                Ok(None) => {}
                Err(err) => {
                    tracing::warn!(pid = process_id, "Failed to watch the debugger: {err}");
                    return false;
                }
            }

            match suspend::is_traced(process_id) {
                Some(true) => return true,
                Some(false) => {}
                // The process is gone.
                None if cfg!(target_os = "linux") => return false,
                None => {
                    if start.elapsed() >= Self::UNCONFIRMED_GRACE {
                        return true;
                    }
                }
            }

            if start.elapsed() >= self.attach_timeout {
                tracing::warn!(
                    pid = process_id,
                    "Debugger did not attach within {}",
                    format_duration(self.attach_timeout)
                );
                if let Err(err) = debugger.kill() {
                    tracing::debug!("Failed to stop the debugger: {err}");
                }
                debugger.wait().ok();
                return false;
            }

            std::thread::sleep(Self::POLL_INTERVAL);
        }
    }
}

impl DebuggerAttacher for CommandDebuggerAttacher {
    fn attach_debugger(&self, process_id: u32) -> bool {
        let Some(command_line) = self.command_line(process_id) else {
            return false;
        };
        let (program, arguments) = command_line.split_at(1);

        let spawned = Command::new(&program[0])
            .args(arguments)
            .stdin(Stdio::null())
            .spawn();

        let mut debugger = match spawned {
            Ok(debugger) => debugger,
            Err(err) => {
                tracing::warn!(pid = process_id, "Failed to start debugger `{}`: {err}", program[0]);
                return false;
            }
        };

        if !self.wait_for_attach(process_id, &mut debugger) {
            return false;
        }

        tracing::info!(
            pid = process_id,
            debugger_pid = debugger.id(),
            "Attached debugger"
        );
        std::thread::spawn(move || debugger.wait());
        true
    }
}

/// Program, arguments and environment of a process about to be launched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    pub program: String,
    pub arguments: Vec<String>,
    pub environment: Vec<(String, String)>,
}

/// Rewrites a launch so that a debugging framework is attached to the process
/// from the moment it starts.
pub trait DebugLaunchConfigurator: Send + Sync {
    fn configure(&self, launch: LaunchSpec) -> LaunchSpec;
}

/// Runs the test executable under a wrapper command such as
/// `gdbserver :2345`.
#[derive(Debug, Clone)]
pub struct WrapperLaunchConfigurator {
    wrapper: Vec<String>,
}

impl WrapperLaunchConfigurator {
    pub fn new(wrapper_command: &str) -> Result<Self, ExecutorError> {
        split_command_line(wrapper_command)
            .map(|wrapper| Self { wrapper })
            .ok_or_else(|| ExecutorError::InvalidCommandLine(wrapper_command.to_string()))
    }
}

impl DebugLaunchConfigurator for WrapperLaunchConfigurator {
    fn configure(&self, launch: LaunchSpec) -> LaunchSpec {
        let (program, wrapper_arguments) = self.wrapper.split_at(1);

        let mut arguments = wrapper_arguments.to_vec();
        arguments.push(launch.program);
        arguments.extend(launch.arguments);

        LaunchSpec {
            program: program[0].clone(),
            arguments,
            environment: launch.environment,
        }
    }
}

/// Splits a command line into non-empty words.
fn split_command_line(command_line: &str) -> Option<Vec<String>> {
    shlex::split(command_line).filter(|words| !words.is_empty())
}
