use camino::{Utf8Path, Utf8PathBuf};
use thiserror::Error;

mod configuration_file;
mod filter;
mod options;
mod settings;

pub use configuration_file::{ConfigurationFile, ConfigurationFileError};
pub use filter::{TestFilter, TestFilterError};
pub use options::{
    ExecutionOptions, GtestOptions, GtrunTomlError, Options, ProjectOptionsOverrides,
    ReportingOptions, ToSettingsError,
};
pub use settings::{
    ExecutionSettings, GtestSettings, ProjectSettings, ReportingSettings,
    replace_worker_placeholders,
};

pub const GTRUN_CONFIG_FILE_NAME: &str = "gtrun.toml";

/// Replaced with the directory of the test executable.
pub const EXECUTABLE_DIR_PLACEHOLDER: &str = "$(ExecutableDir)";

/// Replaced with the path of the test executable.
pub const EXECUTABLE_PLACEHOLDER: &str = "$(Executable)";

/// Replaced with the id of the worker running the tests.
pub const THREAD_ID_PLACEHOLDER: &str = "$(ThreadId)";

/// Replaced with the scratch directory of the worker running the tests.
pub const TEST_DIR_PLACEHOLDER: &str = "$(TestDir)";

#[derive(Default, Debug, Clone)]
pub struct ProjectMetadata {
    root: Utf8PathBuf,

    /// Raw options
    options: Options,
}

impl ProjectMetadata {
    pub fn new(root: Utf8PathBuf) -> Self {
        Self {
            root,
            options: Options::default(),
        }
    }

    pub fn from_config_file(path: Utf8PathBuf, root: Utf8PathBuf) -> Result<Self, ProjectMetadataError> {
        tracing::debug!("Using overridden configuration file at '{path}'");

        let config_file = ConfigurationFile::from_path(path.clone()).map_err(|error| {
            ProjectMetadataError::ConfigurationFileError {
                source: Box::new(error),
                path,
            }
        })?;

        Ok(Self {
            root,
            options: config_file.into_options(),
        })
    }

    /// Discovers the closest `gtrun.toml` at or above `path`.
    ///
    /// Falls back to the user-level configuration, and then to the defaults
    /// with `path` as the root.
    pub fn discover(path: &Utf8Path) -> Result<Self, ProjectMetadataError> {
        tracing::debug!("Searching for a project in '{path}'");

        if !path.is_dir() {
            return Err(ProjectMetadataError::NotADirectory(path.to_path_buf()));
        }

        for project_root in path.ancestors() {
            let config_path = project_root.join(GTRUN_CONFIG_FILE_NAME);
            if !config_path.is_file() {
                continue;
            }

            let config_file = ConfigurationFile::from_path(config_path.clone()).map_err(|error| {
                ProjectMetadataError::ConfigurationFileError {
                    source: Box::new(error),
                    path: config_path,
                }
            })?;

            tracing::debug!("Found project at '{project_root}'");
            return Ok(Self {
                root: project_root.to_path_buf(),
                options: config_file.into_options(),
            });
        }

        let user = ConfigurationFile::user().map_err(|error| {
            ProjectMetadataError::UserConfigurationError {
                source: Box::new(error),
            }
        })?;

        if let Some(user) = user {
            tracing::debug!("Using user-level configuration at '{}'", user.path());
            return Ok(Self {
                root: path.to_path_buf(),
                options: user.into_options(),
            });
        }

        tracing::debug!("No `{GTRUN_CONFIG_FILE_NAME}` found, using the default settings");
        Ok(Self::new(path.to_path_buf()))
    }

    pub const fn root(&self) -> &Utf8PathBuf {
        &self.root
    }

    pub const fn options(&self) -> &Options {
        &self.options
    }

    pub fn apply_overrides(&mut self, overrides: &ProjectOptionsOverrides) {
        self.options = overrides.apply_to(std::mem::take(&mut self.options));
    }

    pub fn to_settings(&self) -> Result<ProjectSettings, ToSettingsError> {
        self.options.to_settings()
    }
}

#[derive(Debug, Error)]
pub enum ProjectMetadataError {
    #[error("project path '{0}' is not a directory")]
    NotADirectory(Utf8PathBuf),

    #[error("Error loading configuration file at {path}: {source}")]
    ConfigurationFileError {
        source: Box<ConfigurationFileError>,
        path: Utf8PathBuf,
    },

    #[error("Error loading the user-level configuration: {source}")]
    UserConfigurationError { source: Box<ConfigurationFileError> },
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn utf8(dir: &tempfile::TempDir) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap()
    }

    #[test]
    fn discovers_config_in_ancestor() {
        let dir = tempfile::tempdir().unwrap();
        let root = utf8(&dir);
        std::fs::write(root.join(GTRUN_CONFIG_FILE_NAME), "[execution]\nmax-threads = 3\n").unwrap();
        let nested = root.join("build").join("tests");
        std::fs::create_dir_all(&nested).unwrap();

        let metadata = ProjectMetadata::discover(&nested).unwrap();

        assert_eq!(metadata.root(), &root);
        assert_eq!(metadata.to_settings().unwrap().execution().max_threads, 3);
    }

    #[test]
    fn invalid_config_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let root = utf8(&dir);
        std::fs::write(root.join(GTRUN_CONFIG_FILE_NAME), "[execution\n").unwrap();

        let err = ProjectMetadata::discover(&root).unwrap_err();
        assert!(matches!(err, ProjectMetadataError::ConfigurationFileError { .. }));
    }

    #[test]
    fn explicit_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let root = utf8(&dir);
        let config = root.join("ci.toml");
        std::fs::write(&config, "[gtest]\nrepetitions = 3\n").unwrap();

        let metadata = ProjectMetadata::from_config_file(config, root).unwrap();
        assert_eq!(metadata.to_settings().unwrap().gtest().repetitions, 3);
    }

    #[test]
    fn missing_explicit_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let root = utf8(&dir);
        let err = ProjectMetadata::from_config_file(root.join("missing.toml"), root).unwrap_err();
        assert!(err.to_string().contains("missing.toml"));
    }

    #[test]
    fn not_a_directory() {
        let err = ProjectMetadata::discover(Utf8Path::new("/nonexistent/gtrun/dir")).unwrap_err();
        assert!(matches!(err, ProjectMetadataError::NotADirectory(_)));
    }
}
