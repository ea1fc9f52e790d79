//! Holding a freshly spawned process before it runs any test code, so that a
//! debugger can attach to it first.
//!
//! On Unix the launch goes through the platform shell, which stops itself
//! with `SIGSTOP` and, once continued, `exec`s the real program under the same
//! process id. Elsewhere processes start running immediately.

use std::time::Duration;
#[cfg(target_os = "linux")]
use std::time::Instant;

use crate::debugger::LaunchSpec;

#[cfg(unix)]
const STOP_THEN_EXEC: &str = r#"kill -STOP $$ && exec "$0" "$@""#;

#[cfg(target_os = "linux")]
const POLL_INTERVAL: Duration = Duration::from_millis(5);

#[cfg(all(unix, not(target_os = "linux")))]
const STOP_GRACE: Duration = Duration::from_millis(100);

/// Rewrites `launch` so the process stops itself before the program starts.
#[cfg(unix)]
pub(crate) fn stopped_launch(launch: LaunchSpec) -> LaunchSpec {
    let (shell, flag) = gtrun_system::platform_shell();

    let mut arguments = vec![flag.to_string(), STOP_THEN_EXEC.to_string(), launch.program];
    arguments.extend(launch.arguments);

    LaunchSpec {
        program: shell.into_string(),
        arguments,
        environment: launch.environment,
    }
}

#[cfg(not(unix))]
pub(crate) fn stopped_launch(launch: LaunchSpec) -> LaunchSpec {
    launch
}

/// Blocks until the process with `pid` is stopped. Returns `false` when it
/// exited or did not stop within `timeout`.
#[cfg(target_os = "linux")]
pub(crate) fn wait_until_stopped(pid: u32, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        match process_state(pid) {
            Some('T') => return true,
            Some('Z' | 'X') | None => return false,
            Some(_) => {}
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(POLL_INTERVAL);
    }
}

#[cfg(all(unix, not(target_os = "linux")))]
pub(crate) fn wait_until_stopped(_pid: u32, _timeout: Duration) -> bool {
    std::thread::sleep(STOP_GRACE);
    true
}

#[cfg(not(unix))]
pub(crate) fn wait_until_stopped(_pid: u32, _timeout: Duration) -> bool {
    false
}

/// Continues a process stopped by [`stopped_launch`].
#[cfg(unix)]
pub(crate) fn resume(pid: u32) -> std::io::Result<()> {
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;

    let pid = i32::try_from(pid).map_err(std::io::Error::other)?;
    kill(Pid::from_raw(pid), Signal::SIGCONT).map_err(std::io::Error::from)
}

#[cfg(not(unix))]
pub(crate) fn resume(_pid: u32) -> std::io::Result<()> {
    Ok(())
}

/// Whether a debugger is attached to the process with `pid`.
///
/// `None` when this cannot be observed, either because the process is gone
/// or because the platform does not expose it.
#[cfg(target_os = "linux")]
pub(crate) fn is_traced(pid: u32) -> Option<bool> {
    let status = std::fs::read_to_string(format!("/proc/{pid}/status")).ok()?;
    let tracer: u32 = status
        .lines()
        .find_map(|line| line.strip_prefix("TracerPid:"))?
        .trim()
        .parse()
        .ok()?;
    Some(tracer != 0)
}

#[cfg(not(target_os = "linux"))]
pub(crate) fn is_traced(_pid: u32) -> Option<bool> {
    None
}

/// The one letter scheduler state of a process, e.g. `R`, `S` or `T`.
#[cfg(target_os = "linux")]
fn process_state(pid: u32) -> Option<char> {
    let stat = std::fs::read_to_string(format!("/proc/{pid}/stat")).ok()?;
    // The command name is in parentheses and may itself contain them.
    let (_, rest) = stat.rsplit_once(')')?;
    rest.trim_start().chars().next()
}

#[cfg(all(test, unix))]
mod tests {
    use std::process::Command;

    use pretty_assertions::assert_eq;

    use super::*;

    fn spawn(launch: &LaunchSpec) -> std::process::Child {
        Command::new(&launch.program)
            .args(&launch.arguments)
            .spawn()
            .unwrap()
    }

    #[test]
    fn stopped_launch_execs_the_program_with_its_arguments() {
        let launch = stopped_launch(LaunchSpec {
            program: "bin/tests".to_string(),
            arguments: vec!["--gtest_filter=A.*".to_string()],
            environment: vec![("GTEST_COLOR".to_string(), "no".to_string())],
        });

        assert_eq!(launch.program, "/bin/sh");
        assert_eq!(
            launch.arguments,
            vec!["-c", STOP_THEN_EXEC, "bin/tests", "--gtest_filter=A.*"]
        );
        assert_eq!(
            launch.environment,
            vec![("GTEST_COLOR".to_string(), "no".to_string())]
        );
    }

    #[test]
    fn stopped_process_runs_after_resume() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("started");
        let launch = stopped_launch(LaunchSpec {
            program: "/bin/sh".to_string(),
            arguments: vec!["-c".to_string(), format!("touch '{}'", marker.display())],
            environment: Vec::new(),
        });

        let mut child = spawn(&launch);
        assert!(wait_until_stopped(child.id(), Duration::from_secs(5)));
        std::thread::sleep(Duration::from_millis(100));
        assert!(!marker.exists());

        resume(child.id()).unwrap();

        assert!(child.wait().unwrap().success());
        assert!(marker.exists());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn exited_process_never_counts_as_stopped() {
        let mut child = Command::new("/bin/sh").args(["-c", "exit 0"]).spawn().unwrap();
        let pid = child.id();
        child.wait().unwrap();

        assert!(!wait_until_stopped(pid, Duration::from_millis(200)));
        assert_eq!(is_traced(pid), None);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn untraced_process_has_no_tracer() {
        let mut child = Command::new("/bin/sh").args(["-c", "sleep 5"]).spawn().unwrap();

        assert_eq!(is_traced(child.id()), Some(false));

        child.kill().unwrap();
        child.wait().unwrap();
    }
}
