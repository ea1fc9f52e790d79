use std::io;
use std::process::{Child, Command, ExitStatus};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

const POLL_INTERVAL: Duration = Duration::from_millis(10);

type ExitCallback = Box<dyn FnOnce(i32) + Send>;

#[derive(Default)]
struct ExitState {
    exit_code: Option<i32>,
    callbacks: Vec<ExitCallback>,
}

/// A spawned child process that can be killed from any thread and that
/// announces its termination to subscribers.
///
/// A monitor thread polls the child until it exits, reaps it and then hands
/// the exit code to every callback registered through [`ProcessHandle::on_exit`].
#[derive(Clone)]
pub struct ProcessHandle {
    pid: u32,
    child: Arc<Mutex<Child>>,
    exit: Arc<Mutex<ExitState>>,
}

impl ProcessHandle {
    pub fn spawn(command: &mut Command) -> io::Result<Self> {
        let child = command.spawn()?;
        Ok(Self::from_child(child))
    }

    pub fn from_child(child: Child) -> Self {
        let handle = Self {
            pid: child.id(),
            child: Arc::new(Mutex::new(child)),
            exit: Arc::new(Mutex::new(ExitState::default())),
        };

        let monitor = handle.clone();
        let spawned = std::thread::Builder::new()
            .name(format!("gtrun-monitor-{}", handle.pid))
            .spawn(move || monitor.monitor());
        if let Err(err) = spawned {
            tracing::error!(pid = handle.pid, "Failed to start process monitor: {err}");
            handle.notify_exit(crate::EXECUTION_FAILED_EXIT_CODE);
        }

        handle
    }

    /// The operating system's id for the process.
    pub const fn pid(&self) -> u32 {
        self.pid
    }

    /// Registers `callback` to run once with the exit code.
    ///
    /// If the process has already exited, the callback runs immediately on
    /// the calling thread.
    pub fn on_exit(&self, callback: impl FnOnce(i32) + Send + 'static) {
        let mut exit = lock(&self.exit);
        if let Some(code) = exit.exit_code {
            drop(exit);
            callback(code);
        } else {
            exit.callbacks.push(Box::new(callback));
        }
    }

    pub fn exit_code(&self) -> Option<i32> {
        lock(&self.exit).exit_code
    }

    /// Kills the process. Does nothing if it already exited.
    pub fn kill(&self) {
        if self.exit_code().is_some() {
            return;
        }
        if let Err(err) = lock(&self.child).kill() {
            tracing::debug!(pid = self.pid, "Failed to kill process: {err}");
        }
    }

    fn monitor(&self) {
        let code = loop {
            let status = lock(&self.child).try_wait();
            match status {
                Ok(Some(status)) => break exit_code(status),
                Ok(None) => std::thread::sleep(POLL_INTERVAL),
                Err(err) => {
                    tracing::error!(pid = self.pid, "Error waiting on process: {err}");
                    break crate::EXECUTION_FAILED_EXIT_CODE;
                }
            }
        };
        tracing::trace!(pid = self.pid, code, "Process exited");
        self.notify_exit(code);
    }

    fn notify_exit(&self, code: i32) {
        let callbacks = {
            let mut exit = lock(&self.exit);
            if exit.exit_code.is_some() {
                return;
            }
            exit.exit_code = Some(code);
            std::mem::take(&mut exit.callbacks)
        };
        for callback in callbacks {
            callback(code);
        }
    }
}

impl std::fmt::Debug for ProcessHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessHandle")
            .field("pid", &self.pid)
            .field("exit_code", &self.exit_code())
            .finish_non_exhaustive()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// The exit code of a terminated process; `128 + signal` for processes killed
/// by a signal.
pub fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt as _;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }

    crate::EXECUTION_FAILED_EXIT_CODE
}
