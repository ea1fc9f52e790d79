use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::ProcessHandle;

#[derive(Debug, Default)]
struct ExitFlag {
    exited: bool,
    exit_code: i32,
}

#[derive(Debug, Default)]
struct Shared {
    flag: Mutex<ExitFlag>,
    exited: Condvar,
}

/// Turns a "process exited" notification into a blocking wait.
///
/// The first notification wins. Waiting after the process has exited returns
/// right away with the recorded code.
#[derive(Debug, Clone, Default)]
pub struct ExitWaiter {
    shared: Arc<Shared>,
}

impl ExitWaiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a waiter that is notified when `handle`'s process exits.
    pub fn attach(handle: &ProcessHandle) -> Self {
        let waiter = Self::new();
        let notifier = waiter.clone();
        handle.on_exit(move |code| notifier.on_exited(code));
        waiter
    }

    /// Records the exit and wakes up all waiters. Later calls are ignored.
    pub fn on_exited(&self, exit_code: i32) {
        let mut flag = self.lock();
        if flag.exited {
            return;
        }
        flag.exited = true;
        flag.exit_code = exit_code;
        drop(flag);
        self.shared.exited.notify_all();
    }

    pub fn has_exited(&self) -> bool {
        self.lock().exited
    }

    /// Blocks until the process has exited and returns its exit code.
    pub fn wait_for_exit(&self) -> i32 {
        let flag = self
            .shared
            .exited
            .wait_while(self.lock(), |flag| !flag.exited)
            .unwrap_or_else(PoisonError::into_inner);
        flag.exit_code
    }

    /// Like [`ExitWaiter::wait_for_exit`], but gives up after `timeout`.
    pub fn wait_for_exit_timeout(&self, timeout: Duration) -> Option<i32> {
        let (flag, _) = self
            .shared
            .exited
            .wait_timeout_while(self.lock(), timeout, |flag| !flag.exited)
            .unwrap_or_else(PoisonError::into_inner);
        flag.exited.then_some(flag.exit_code)
    }

    fn lock(&self) -> MutexGuard<'_, ExitFlag> {
        self.shared
            .flag
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
