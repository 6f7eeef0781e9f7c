//! Configuration for atlas-serial.
//!
//! This module provides TOML-based configuration with environment variable
//! overrides, plus the workspace directories derived from `ROS_SONIA_WS`.
//!
//! # Configuration Resolution
//!
//! Configuration is loaded from the following locations (in order of priority):
//!
//! 1. `ATLAS_SERIAL_CONFIG` environment variable (explicit path)
//! 2. `<ROS_SONIA_WS>/config/atlas-serial.toml`
//! 3. `./atlas-serial.toml` (current directory)
//! 4. Built-in defaults (no file required)
//!
//! # Environment Overrides
//!
//! The pattern is: `ATLAS_SERIAL_<SECTION>_<KEY>`, e.g.
//! `ATLAS_SERIAL_SERIAL_BAUD=57600` or `ATLAS_SERIAL_LOGGING_LEVEL=debug`.
//!
//! # Example
//!
//! ```rust,no_run
//! use atlas_serial::config::ConfigLoader;
//! use atlas_serial::port::SerialPort;
//!
//! let config = ConfigLoader::load()?.into_config();
//! let path = config.serial.port.clone().unwrap_or_default();
//! let port = SerialPort::new(config.serial.resolve_port(&path), config.serial.to_settings());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod error;
mod loader;
mod schema;
mod workspace;

pub use error::{ConfigError, ConfigResult};
pub use loader::{resolve_config_path, ConfigLoader, CONFIG_FILE_NAME, CONFIG_PATH_ENV};
pub use schema::{Config, LogFormat, LoggingConfig, SerialConfig};
pub use workspace::{WorkspacePaths, WORKSPACE_ENV};
