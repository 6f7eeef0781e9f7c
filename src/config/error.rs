//! Errors raised while locating, reading and validating `atlas-serial.toml`.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    /// `ROS_SONIA_WS` (or another required variable) is unset or empty.
    #[error("Environment variable '{0}' is not set")]
    MissingEnv(&'static str),

    /// `ATLAS_SERIAL_CONFIG` names a file that does not exist.
    #[error("{var} points to '{path}', which is not a file")]
    ExplicitFileMissing { var: &'static str, path: PathBuf },

    #[error("Cannot read '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid TOML in '{path}': {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Cannot serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Cannot write '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A value parsed fine but is out of range, e.g. `serial.baud = 0`.
    #[error("Invalid value for '{key}': {message}")]
    Invalid { key: &'static str, message: String },

    /// An `ATLAS_SERIAL_<SECTION>_<KEY>` override could not be parsed.
    #[error("Bad value in '{var}': {message}")]
    BadOverride { var: String, message: String },
}

impl ConfigError {
    pub fn invalid(key: &'static str, message: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            message: message.into(),
        }
    }

    pub fn bad_override(var: impl Into<String>, message: impl Into<String>) -> Self {
        Self::BadOverride {
            var: var.into(),
            message: message.into(),
        }
    }
}

pub type ConfigResult<T> = Result<T, ConfigError>;
