//! Workspace directories derived from `ROS_SONIA_WS`.

use super::error::{ConfigError, ConfigResult};
use std::path::{Path, PathBuf};

/// Environment variable naming the workspace root.
pub const WORKSPACE_ENV: &str = "ROS_SONIA_WS";

/// Where configuration and log files live.
///
/// Built once at startup and passed around; nothing here is global.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspacePaths {
    pub root: PathBuf,
    pub config_dir: PathBuf,
    pub log_dir: PathBuf,
}

impl WorkspacePaths {
    /// Resolve the workspace from [`WORKSPACE_ENV`].
    pub fn from_env() -> ConfigResult<Self> {
        match std::env::var_os(WORKSPACE_ENV) {
            Some(root) if !root.is_empty() => Ok(Self::from_root(root)),
            _ => Err(ConfigError::MissingEnv(WORKSPACE_ENV)),
        }
    }

    pub fn from_root(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            config_dir: root.join("config"),
            log_dir: root.join("log"),
            root,
        }
    }

    /// Resolve a possibly relative log file name against [`Self::log_dir`].
    pub fn log_file(&self, file: &Path) -> PathBuf {
        if file.is_absolute() {
            file.to_path_buf()
        } else {
            self.log_dir.join(file)
        }
    }
}
