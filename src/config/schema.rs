//! Configuration schema definitions.
//!
//! Every section uses `#[serde(default)]`, so a file only needs the keys it
//! changes.

use crate::port::{DataBits, FlowControl, Parity, PortSettings, StopBits, Timeout};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

use super::error::{ConfigError, ConfigResult};

/// Root configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Serial port configuration
    pub serial: SerialConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

impl Config {
    /// Reject values no port could be opened with.
    pub fn validate(&self) -> ConfigResult<()> {
        self.serial.validate()?;
        if self.logging.level.trim().is_empty() {
            return Err(ConfigError::invalid("logging.level", "must not be empty"));
        }
        Ok(())
    }
}

/// Serial port configuration section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    /// Device path, or an alias from `port_aliases`
    pub port: Option<String>,
    pub baud: u32,
    pub data_bits: DataBits,
    pub parity: Parity,
    pub stop_bits: StopBits,
    pub flow_control: FlowControl,
    /// Constant read and write bound in milliseconds; 0 polls once
    pub timeout_ms: u32,
    /// Maximum gap between received bytes; unset means no limit
    pub inter_byte_timeout_ms: Option<u32>,
    /// Line delimiter used by the CLI
    pub eol: String,
    /// Longest line the CLI will read
    pub max_line: usize,
    /// Port aliases for convenience
    pub port_aliases: HashMap<String, String>,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: None,
            baud: 115_200,
            data_bits: DataBits::Eight,
            parity: Parity::None,
            stop_bits: StopBits::One,
            flow_control: FlowControl::None,
            timeout_ms: 1000,
            inter_byte_timeout_ms: None,
            eol: "\n".to_string(),
            max_line: 1024,
            port_aliases: HashMap::new(),
        }
    }
}

impl SerialConfig {
    /// Resolve a port name through aliases
    pub fn resolve_port(&self, name: &str) -> String {
        self.port_aliases
            .get(name)
            .cloned()
            .unwrap_or_else(|| name.to_string())
    }

    pub fn timeout(&self) -> Timeout {
        Timeout {
            inter_byte_timeout: self.inter_byte_timeout_ms.unwrap_or(Timeout::MAX),
            ..Timeout::simple(self.timeout_ms)
        }
    }

    /// Settings a port opened from this section should use.
    pub fn to_settings(&self) -> PortSettings {
        PortSettings {
            baud_rate: self.baud,
            data_bits: self.data_bits,
            parity: self.parity,
            stop_bits: self.stop_bits,
            flow_control: self.flow_control,
            timeout: self.timeout(),
        }
    }

    /// Commands that stream lines need reads that wait for data; a zero
    /// `timeout_ms` makes every read return at once.
    pub fn require_read_timeout(&self) -> ConfigResult<()> {
        if self.timeout_ms == 0 {
            return Err(ConfigError::invalid(
                "serial.timeout_ms",
                "must be greater than 0 to listen",
            ));
        }
        Ok(())
    }

    fn validate(&self) -> ConfigResult<()> {
        if self.baud == 0 {
            return Err(ConfigError::invalid("serial.baud", "must be greater than 0"));
        }
        if self.eol.is_empty() {
            return Err(ConfigError::invalid("serial.eol", "must not be empty"));
        }
        if self.max_line == 0 {
            return Err(ConfigError::invalid("serial.max_line", "must be greater than 0"));
        }
        Ok(())
    }
}

/// Logging configuration section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset
    pub level: String,
    pub format: LogFormat,
    /// Log file; relative paths land in the workspace log directory
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
            file: None,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// JSON format
    Json,
    /// Pretty format with colors
    #[default]
    Pretty,
    /// Compact format
    Compact,
}
