use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::sync::{Mutex, PoisonError};

use camino::{Utf8Path, Utf8PathBuf};
use itertools::Itertools;
use serde::{Deserialize, Serialize};

use gtrun_results::{TestCase, TestOutcome, TestResult};

/// Appended to an executable's path to name its durations file.
pub const DURATIONS_FILE_EXTENSION: &str = "gtrun_durations.json";

#[derive(Debug, thiserror::Error)]
pub enum DurationsError {
    #[error("failed to access durations file {path}")]
    Io {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid durations file {path}: {source}")]
    Invalid {
        path: Utf8PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct TestDurations {
    executable: Utf8PathBuf,
    test_durations: Vec<TestDuration>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct TestDuration {
    test: String,
    duration: u64,
}

/// Remembers how long every test took, in a JSON file next to its executable.
///
/// Reads and writes through one store are serialized, so worker threads can
/// update the files of a shared executable concurrently.
#[derive(Debug, Default)]
pub struct TestDurationStore {
    lock: Mutex<()>,
}

impl TestDurationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn durations_file(executable: &Utf8Path) -> Utf8PathBuf {
        Utf8PathBuf::from(format!("{executable}.{DURATIONS_FILE_EXTENSION}"))
    }

    /// Durations in milliseconds of those `test_cases` that ran before.
    pub fn read_test_durations(
        &self,
        test_cases: &[TestCase],
    ) -> Result<HashMap<TestCase, u64>, DurationsError> {
        let mut durations = HashMap::new();

        let by_executable = test_cases
            .iter()
            .into_group_map_by(|test_case| test_case.source());

        for (executable, test_cases) in by_executable {
            let Some(stored) = self.load(&Self::durations_file(executable))? else {
                continue;
            };
            let stored: HashMap<_, _> = stored
                .test_durations
                .into_iter()
                .map(|entry| (entry.test, entry.duration))
                .collect();

            for test_case in test_cases {
                if let Some(duration) = stored.get(test_case.fully_qualified_name()) {
                    durations.insert(test_case.clone(), *duration);
                }
            }
        }

        Ok(durations)
    }

    /// Records the durations of passed and failed results, keeping entries of
    /// tests that did not run this time.
    pub fn update_test_durations(&self, test_results: &[TestResult]) -> Result<(), DurationsError> {
        let by_executable = test_results
            .iter()
            .filter(|result| matches!(result.outcome(), TestOutcome::Passed | TestOutcome::Failed))
            .into_group_map_by(|result| result.test_case().source());

        for (executable, results) in by_executable {
            let path = Self::durations_file(executable);
            let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);

            let stored = match Self::read_file(&path) {
                Ok(stored) => stored.unwrap_or_default(),
                Err(err) => {
                    tracing::warn!("Replacing unreadable durations file: {err}");
                    TestDurations::default()
                }
            };

            let mut durations: BTreeMap<String, u64> = stored
                .test_durations
                .into_iter()
                .map(|entry| (entry.test, entry.duration))
                .collect();
            for result in results {
                durations.insert(
                    result.test_case().fully_qualified_name().to_string(),
                    duration_millis(result),
                );
            }

            let container = TestDurations {
                executable: executable.to_path_buf(),
                test_durations: durations
                    .into_iter()
                    .map(|(test, duration)| TestDuration { test, duration })
                    .collect(),
            };

            let json = serde_json::to_string_pretty(&container).map_err(|source| {
                DurationsError::Invalid {
                    path: path.clone(),
                    source,
                }
            })?;
            fs::write(&path, json).map_err(|source| DurationsError::Io {
                path: path.clone(),
                source,
            })?;
            tracing::debug!(
                "Stored {} test durations in {path}",
                container.test_durations.len()
            );
        }

        Ok(())
    }

    fn load(&self, path: &Utf8Path) -> Result<Option<TestDurations>, DurationsError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        Self::read_file(path)
    }

    fn read_file(path: &Utf8Path) -> Result<Option<TestDurations>, DurationsError> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(DurationsError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };

        serde_json::from_str(&content)
            .map(Some)
            .map_err(|source| DurationsError::Invalid {
                path: path.to_path_buf(),
                source,
            })
    }
}

/// Whole milliseconds, rounded up.
fn duration_millis(result: &TestResult) -> u64 {
    let micros = result.duration().as_micros();
    u64::try_from(micros.div_ceil(1000)).unwrap_or(u64::MAX)
}
