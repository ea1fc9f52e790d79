use std::os::unix::fs::PermissionsExt;
use std::process::Command;

use camino::{Utf8Path, Utf8PathBuf};
use insta::Settings;
use insta::internals::SettingsBindDropGuard;
use tempfile::TempDir;

/// Speaks just enough of the Google Test command line for the CLI tests:
/// `--gtest_list_tests` and `--gtest_filter`.
const FAKE_GTEST: &str = r#"#!/bin/sh
set -f
filter=""
for arg in "$@"; do
  case "$arg" in
    --gtest_list_tests)
      echo "Math."
      echo "  Adds"
      echo "  Divides"
      echo "Strings."
      echo "  Concat"
      exit 0
      ;;
    --gtest_filter=*) filter="${arg#--gtest_filter=}" ;;
  esac
done

selected() {
  [ -z "$filter" ] && return 0
  old_ifs=$IFS
  IFS=:
  for pattern in $filter; do
    case "$1" in
      $pattern) IFS=$old_ifs; return 0 ;;
    esac
  done
  IFS=$old_ifs
  return 1
}

failed=0
if selected Math.Adds; then
  echo "[ RUN      ] Math.Adds"
  echo "[       OK ] Math.Adds (1 ms)"
fi
if selected Math.Divides; then
  echo "[ RUN      ] Math.Divides"
  echo "math.cpp:12: Failure"
  echo "Expected equality of these values"
  echo "[  FAILED  ] Math.Divides (1 ms)"
  failed=1
fi
if selected Strings.Concat; then
  echo "[ RUN      ] Strings.Concat"
  echo "[       OK ] Strings.Concat (1 ms)"
fi
exit $failed
"#;

pub struct TestContext {
    _temp_dir: TempDir,
    project_dir_path: Utf8PathBuf,
    _settings_scope: SettingsBindDropGuard,
}

impl TestContext {
    /// A project holding the `math_tests` executable.
    pub fn new() -> Self {
        let temp_dir = TempDir::new().unwrap();
        let project_path = Utf8PathBuf::from_path_buf(
            dunce::simplified(&temp_dir.path().canonicalize().unwrap()).to_path_buf(),
        )
        .unwrap();

        let mut settings = Settings::clone_current();
        settings.add_filter(&tempdir_filter(&project_path), "<temp_dir>/");
        settings.add_filter(r"\x1b\[[0-9;]*m", "");
        settings.add_filter(r"(\s|\()(\d+m )?(\d+\.)?\d+(ms|s)", "$1[TIME]");
        let settings_scope = settings.bind_to_scope();

        let context = Self {
            _temp_dir: temp_dir,
            project_dir_path: project_path,
            _settings_scope: settings_scope,
        };
        context.write_executable("math_tests", FAKE_GTEST);
        context
    }

    pub fn root(&self) -> &Utf8Path {
        &self.project_dir_path
    }

    pub fn write_file(&self, path: impl AsRef<Utf8Path>, content: &str) {
        std::fs::write(self.project_dir_path.join(path.as_ref()), content).unwrap();
    }

    pub fn write_executable(&self, path: impl AsRef<Utf8Path>, content: &str) {
        let path = self.project_dir_path.join(path.as_ref());
        std::fs::write(&path, content).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    }

    pub fn command(&self) -> Command {
        let mut command = Command::new(env!("CARGO_BIN_EXE_gtrun"));
        command
            .current_dir(self.root())
            .env_remove("GTRUN_CONFIG_FILE")
            .env_remove("GTRUN_LOG")
            .env("GTRUN_MAX_PARALLELISM", "2");
        command
    }

    /// `gtrun test` on a single worker, so results arrive in order.
    pub fn test_command(&self) -> Command {
        let mut command = self.command();
        command.args(["test", "--no-parallel", "--color", "never"]);
        command
    }
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}

pub fn tempdir_filter(path: &Utf8Path) -> String {
    format!(r"{}\\?/?", regex::escape(path.as_str()))
}
