use camino::{Utf8Path, Utf8PathBuf};
use thiserror::Error;

use crate::GTRUN_CONFIG_FILE_NAME;
use crate::options::{GtrunTomlError, Options};

/// A `gtrun.toml` configuration file with the options it contains.
#[derive(Debug)]
pub struct ConfigurationFile {
    path: Utf8PathBuf,
    options: Options,
}

impl ConfigurationFile {
    pub fn from_path(path: Utf8PathBuf) -> Result<Self, ConfigurationFileError> {
        let content = std::fs::read_to_string(&path).map_err(|source| {
            ConfigurationFileError::FileReadError {
                source,
                path: path.clone(),
            }
        })?;

        match Options::from_toml_str(&content) {
            Ok(options) => Ok(Self { path, options }),
            Err(error) => Err(ConfigurationFileError::InvalidGtrunToml {
                source: Box::new(error),
                path,
            }),
        }
    }

    /// Loads the user-level configuration file if it exists.
    pub fn user() -> Result<Option<Self>, ConfigurationFileError> {
        let Some(configuration_directory) = gtrun_system::user_config_directory() else {
            return Ok(None);
        };

        let path = configuration_directory.join(GTRUN_CONFIG_FILE_NAME);
        tracing::debug!("Searching for a user-level configuration at `{path}`");

        if !path.is_file() {
            return Ok(None);
        }
        Self::from_path(path).map(Some)
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    pub fn into_options(self) -> Options {
        self.options
    }
}

#[derive(Debug, Error)]
pub enum ConfigurationFileError {
    #[error("{path} is not a valid `gtrun.toml`: {source}")]
    InvalidGtrunToml {
        source: Box<GtrunTomlError>,
        path: Utf8PathBuf,
    },
    #[error("Failed to read `{path}`: {source}")]
    FileReadError {
        #[source]
        source: std::io::Error,
        path: Utf8PathBuf,
    },
}
