use std::os::unix::fs::PermissionsExt;

use camino::{Utf8Path, Utf8PathBuf};
use tempfile::TempDir;

/// A shell script speaking just enough of the Google Test command line:
/// `--gtest_list_tests` and `--gtest_filter`.
///
/// Each test is given as `(suite, name, behavior)` where behavior is one of
/// `pass`, `fail`, `skip`, `crash` or `sleep`.
const FAKE_GTEST: &str = r#"#!/bin/sh
set -f
filter=""
for arg in "$@"; do
  case "$arg" in
    --gtest_list_tests) list_tests; exit 0 ;;
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
run_test() {
  selected "$1" || return 0
  echo "[ RUN      ] $1"
  case "$2" in
    pass) echo "[       OK ] $1 (1 ms)" ;;
    fail)
      echo "test.cpp:42: Failure"
      echo "Expected equality of these values"
      echo "[  FAILED  ] $1 (2 ms)"
      failed=1
      ;;
    skip) echo "[  SKIPPED ] $1 (0 ms)" ;;
    crash)
      echo "about to crash"
      kill -SEGV $$
      ;;
    sleep)
      sleep 10
      echo "[       OK ] $1 (10000 ms)"
      ;;
  esac
}
"#;

pub struct FakeGtest {
    _temp_dir: TempDir,
    root: Utf8PathBuf,
}

impl FakeGtest {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().unwrap();
        let root = Utf8PathBuf::from_path_buf(
            dunce::simplified(&temp_dir.path().canonicalize().unwrap()).to_path_buf(),
        )
        .unwrap();
        Self {
            _temp_dir: temp_dir,
            root,
        }
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    /// Writes an executable named `name` containing `tests`.
    pub fn executable(&self, name: &str, tests: &[(&str, &str, &str)]) -> Utf8PathBuf {
        let mut list = String::from("list_tests() {\n");
        let mut current_suite = None;
        for (suite, test, _) in tests {
            if current_suite != Some(*suite) {
                list.push_str(&format!("  echo '{suite}.'\n"));
                current_suite = Some(*suite);
            }
            list.push_str(&format!("  echo '  {test}'\n"));
        }
        list.push_str("}\n");

        let mut runs = String::new();
        for (suite, test, behavior) in tests {
            runs.push_str(&format!("run_test '{suite}.{test}' {behavior}\n"));
        }
        runs.push_str("exit $failed\n");

        let script = FAKE_GTEST.replacen("set -f\n", &format!("set -f\n{list}"), 1) + &runs;

        let path = self.root.join(name);
        std::fs::write(&path, script).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }
}
