use camino::{Utf8Path, Utf8PathBuf};

use gtrun_process::DebuggerKind;
use gtrun_results::ThrottleSettings;

use crate::filter::TestFilter;
use crate::{
    EXECUTABLE_DIR_PLACEHOLDER, EXECUTABLE_PLACEHOLDER, TEST_DIR_PLACEHOLDER,
    THREAD_ID_PLACEHOLDER,
};

#[derive(Debug, Clone)]
pub struct ProjectSettings {
    pub(crate) execution: ExecutionSettings,
    pub(crate) gtest: GtestSettings,
    pub(crate) reporting: ReportingSettings,
}

impl ProjectSettings {
    pub const fn execution(&self) -> &ExecutionSettings {
        &self.execution
    }

    pub const fn gtest(&self) -> &GtestSettings {
        &self.gtest
    }

    pub const fn reporting(&self) -> &ReportingSettings {
        &self.reporting
    }

    /// Number of workers the run will use.
    pub fn worker_count(&self) -> usize {
        if self.execution.parallel {
            self.execution.max_threads.max(1)
        } else {
            1
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExecutionSettings {
    pub max_threads: usize,
    pub parallel: bool,
    pub working_dir: String,
    pub path_extension: Option<String>,
    pub additional_args: Vec<String>,
    pub filter: Option<TestFilter>,
    pub print_test_output: bool,
    pub kill_processes_on_cancel: bool,
    pub debugger: DebuggerKind,
    pub debugger_command: String,
    pub setup_batch: Option<String>,
    pub teardown_batch: Option<String>,
    pub exit_code_test_case: Option<String>,
}

impl ExecutionSettings {
    pub fn working_dir_for(&self, executable: &Utf8Path) -> Utf8PathBuf {
        Utf8PathBuf::from(replace_placeholders(&self.working_dir, executable))
    }

    pub fn path_extension_for(&self, executable: &Utf8Path) -> Option<String> {
        self.path_extension
            .as_deref()
            .map(|extension| replace_placeholders(extension, executable))
    }

    pub fn additional_args_for(&self, executable: &Utf8Path) -> Vec<String> {
        self.additional_args
            .iter()
            .map(|arg| replace_placeholders(arg, executable))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GtestSettings {
    pub catch_exceptions: bool,
    pub break_on_failure: bool,
    pub run_disabled_tests: bool,
    pub shuffle_tests: bool,
    pub shuffle_seed: u32,
    pub repetitions: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportingSettings {
    pub throttle: ThrottleSettings,
}

/// Substitutes the values that differ between workers: `$(ThreadId)` and,
/// when the worker has one, `$(TestDir)`.
pub fn replace_worker_placeholders(
    value: &str,
    thread_id: usize,
    test_dir: Option<&Utf8Path>,
) -> String {
    let value = value.replace(THREAD_ID_PLACEHOLDER, &thread_id.to_string());
    match test_dir {
        Some(test_dir) => value.replace(TEST_DIR_PLACEHOLDER, test_dir.as_str()),
        None => value,
    }
}

fn replace_placeholders(value: &str, executable: &Utf8Path) -> String {
    let executable_dir = executable
        .parent()
        .filter(|dir| !dir.as_str().is_empty())
        .unwrap_or(Utf8Path::new("."));

    value
        .replace(EXECUTABLE_DIR_PLACEHOLDER, executable_dir.as_str())
        .replace(EXECUTABLE_PLACEHOLDER, executable.as_str())
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use crate::Options;

    use super::*;

    #[rstest]
    #[case("$(ExecutableDir)", "/build/bin/tests", "/build/bin")]
    #[case("$(ExecutableDir)/data", "tests", "./data")]
    #[case("/tmp/$(Executable).d", "/build/tests", "/tmp//build/tests.d")]
    #[case("/fixed", "/build/tests", "/fixed")]
    fn working_dir_placeholders(#[case] template: &str, #[case] executable: &str, #[case] expected: &str) {
        let mut settings = Options::default().to_settings().unwrap();
        settings.execution.working_dir = template.to_string();
        assert_eq!(
            settings.execution().working_dir_for(Utf8Path::new(executable)),
            Utf8PathBuf::from(expected)
        );
    }

    #[rstest]
    #[case("--port=90$(ThreadId)", Some("/tmp/w"), "--port=903")]
    #[case("$(TestDir)/out-$(ThreadId).xml", Some("/tmp/w"), "/tmp/w/out-3.xml")]
    #[case("$(TestDir)/out.xml", None, "$(TestDir)/out.xml")]
    fn worker_placeholders(#[case] template: &str, #[case] test_dir: Option<&str>, #[case] expected: &str) {
        assert_eq!(
            replace_worker_placeholders(template, 3, test_dir.map(Utf8Path::new)),
            expected
        );
    }

    #[test]
    fn no_parallel_means_one_worker() {
        let mut settings = Options::default().to_settings().unwrap();
        settings.execution.max_threads = 6;
        assert_eq!(settings.worker_count(), 6);
        settings.execution.parallel = false;
        assert_eq!(settings.worker_count(), 1);
    }
}
