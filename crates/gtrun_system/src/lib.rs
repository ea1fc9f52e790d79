use std::ffi::OsString;
use std::num::NonZeroUsize;

use camino::{Utf8Path, Utf8PathBuf};

pub struct EnvVars;

impl EnvVars {
    /// Upper bound for the number of worker threads, overrides the detected parallelism.
    pub const GTRUN_MAX_PARALLELISM: &'static str = "GTRUN_MAX_PARALLELISM";

    /// Path to a `gtrun.toml` to use instead of discovering one.
    pub const GTRUN_CONFIG_FILE: &'static str = "GTRUN_CONFIG_FILE";

    /// The executable search path.
    pub const PATH: &'static str = "PATH";
}

/// Number of workers to use when the configuration does not pin one.
pub fn max_parallelism() -> NonZeroUsize {
    if let Ok(value) = std::env::var(EnvVars::GTRUN_MAX_PARALLELISM) {
        match value.parse() {
            Ok(parallelism) => return parallelism,
            Err(err) => tracing::warn!(
                "Ignoring invalid `{}` value `{value}`: {err}",
                EnvVars::GTRUN_MAX_PARALLELISM
            ),
        }
    }

    std::thread::available_parallelism().unwrap_or(NonZeroUsize::MIN)
}

/// Returns `PATH` with `path_extension` prepended.
///
/// An empty or missing extension yields the current `PATH` untouched. The
/// extension itself may already hold several separator-delimited entries;
/// it is passed through verbatim.
pub fn extended_path(path_extension: Option<&str>) -> Option<OsString> {
    let current = std::env::var_os(EnvVars::PATH);
    let Some(extension) = path_extension.filter(|ext| !ext.is_empty()) else {
        return current;
    };

    let mut extended = OsString::from(extension);
    if let Some(current) = current.filter(|path| !path.is_empty()) {
        extended.push(PATH_SEPARATOR);
        extended.push(current);
    }
    Some(extended)
}

#[cfg(windows)]
const PATH_SEPARATOR: &str = ";";
#[cfg(not(windows))]
const PATH_SEPARATOR: &str = ":";

/// The interpreter used to run batch files and shell snippets on this platform.
pub fn platform_shell() -> (Utf8PathBuf, &'static str) {
    if cfg!(windows) {
        let system_root = std::env::var("SystemRoot").unwrap_or_else(|_| r"C:\Windows".to_string());
        (
            Utf8PathBuf::from(system_root).join("System32").join("cmd.exe"),
            "/C",
        )
    } else {
        (Utf8PathBuf::from("/bin/sh"), "-c")
    }
}

/// Directory that holds per-user gtrun configuration, if the platform has one.
pub fn user_config_directory() -> Option<Utf8PathBuf> {
    use etcetera::BaseStrategy as _;

    let strategy = etcetera::base_strategy::choose_base_strategy().ok()?;
    let dir: Utf8PathBuf = strategy.config_dir().try_into().ok()?;
    Some(dir.join("gtrun"))
}

/// Makes `path` absolute relative to `cwd`, without touching the filesystem.
pub fn absolute(path: impl AsRef<Utf8Path>, cwd: impl AsRef<Utf8Path>) -> Utf8PathBuf {
    let path = path.as_ref();
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        cwd.as_ref().join(path)
    }
}
