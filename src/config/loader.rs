//! Configuration loader with file resolution and environment override support.

use super::error::{ConfigError, ConfigResult};
use super::schema::{Config, LogFormat};
use super::workspace::WorkspacePaths;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Environment variable prefix for overrides
const ENV_PREFIX: &str = "ATLAS_SERIAL";

/// Config file name
pub const CONFIG_FILE_NAME: &str = "atlas-serial.toml";

/// Environment variable for explicit config path
pub const CONFIG_PATH_ENV: &str = "ATLAS_SERIAL_CONFIG";

/// Configuration loader with resolution and override logic.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    /// Resolved config file path (if any)
    pub config_path: Option<PathBuf>,
    /// The loaded configuration
    pub config: Config,
}

impl ConfigLoader {
    /// Load configuration using standard resolution order.
    ///
    /// Resolution priority (highest to lowest):
    /// 1. `ATLAS_SERIAL_CONFIG` environment variable (explicit path)
    /// 2. `<ROS_SONIA_WS>/config/atlas-serial.toml`
    /// 3. `./atlas-serial.toml` (current directory)
    /// 4. Built-in defaults (no file required)
    ///
    /// Environment variables can override any config file values.
    pub fn load() -> ConfigResult<Self> {
        let config_path = resolve_config_path()?;

        let mut config = match config_path {
            Some(ref path) => load_from_file(path)?,
            None => Config::default(),
        };

        apply_env_overrides(&mut config)?;
        config.validate()?;

        Ok(Self { config_path, config })
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref().to_path_buf();
        let mut config = load_from_file(&path)?;
        apply_env_overrides(&mut config)?;
        config.validate()?;

        Ok(Self {
            config_path: Some(path),
            config,
        })
    }

    /// Defaults plus environment overrides, no file.
    pub fn with_defaults() -> ConfigResult<Self> {
        let mut config = Config::default();
        apply_env_overrides(&mut config)?;
        config.validate()?;

        Ok(Self {
            config_path: None,
            config,
        })
    }

    /// Get the loaded configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Consume the loader and return the configuration.
    pub fn into_config(self) -> Config {
        self.config
    }

    /// Save the current configuration to a specific file.
    pub fn save_to(&self, path: impl AsRef<Path>) -> ConfigResult<()> {
        save_to_file(&self.config, path.as_ref())
    }
}

/// Resolve the configuration file path using standard locations.
///
/// An explicit `ATLAS_SERIAL_CONFIG` that points nowhere is an error rather
/// than a silent fallback to defaults.
pub fn resolve_config_path() -> ConfigResult<Option<PathBuf>> {
    if let Some(path) = std::env::var_os(CONFIG_PATH_ENV).filter(|p| !p.is_empty()) {
        let path = PathBuf::from(path);
        if !path.is_file() {
            return Err(ConfigError::ExplicitFileMissing {
                var: CONFIG_PATH_ENV,
                path,
            });
        }
        return Ok(Some(path));
    }

    if let Ok(workspace) = WorkspacePaths::from_env() {
        let ws_config = workspace.config_dir.join(CONFIG_FILE_NAME);
        if ws_config.is_file() {
            return Ok(Some(ws_config));
        }
    }

    let cwd_config = PathBuf::from(CONFIG_FILE_NAME);
    if cwd_config.is_file() {
        return Ok(Some(cwd_config));
    }

    Ok(None)
}

/// Load configuration from a file.
fn load_from_file(path: &Path) -> ConfigResult<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
        path: path.to_path_buf(),
        source: e,
    })?;

    toml::from_str(&content).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Save configuration to a file.
fn save_to_file(config: &Config, path: &Path) -> ConfigResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| ConfigError::Write {
            path: path.to_path_buf(),
            source: e,
        })?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|e| ConfigError::Write {
        path: path.to_path_buf(),
        source: e,
    })
}

fn env_var(section: &str, key: &str) -> (String, Option<String>) {
    let name = format!("{}_{}_{}", ENV_PREFIX, section, key);
    let value = std::env::var(&name).ok();
    (name, value)
}

fn parse_env<T: FromStr>(name: &str, value: &str, what: &str) -> ConfigResult<T> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::bad_override(name, format!("Invalid {}", what)))
}

/// Parse a snake_case enum value the same way the TOML file spells it.
fn parse_env_enum<T: serde::de::DeserializeOwned>(name: &str, value: &str) -> ConfigResult<T> {
    <T as serde::Deserialize>::deserialize(serde::de::value::StrDeserializer::<
        serde::de::value::Error,
    >::new(value.trim()))
    .map_err(|e| ConfigError::bad_override(name, e.to_string()))
}

/// Apply environment variable overrides to the configuration.
///
/// Environment variables follow the pattern: `ATLAS_SERIAL_<SECTION>_<KEY>`
/// For example:
/// - `ATLAS_SERIAL_SERIAL_PORT=/dev/ttyUSB0`
/// - `ATLAS_SERIAL_SERIAL_BAUD=57600`
/// - `ATLAS_SERIAL_LOGGING_LEVEL=debug`
fn apply_env_overrides(config: &mut Config) -> ConfigResult<()> {
    // Serial overrides
    if let (_, Some(val)) = env_var("SERIAL", "PORT") {
        config.serial.port = Some(val);
    }
    if let (name, Some(val)) = env_var("SERIAL", "BAUD") {
        config.serial.baud = parse_env(&name, &val, "baud rate")?;
    }
    if let (name, Some(val)) = env_var("SERIAL", "DATA_BITS") {
        config.serial.data_bits = parse_env_enum(&name, &val)?;
    }
    if let (name, Some(val)) = env_var("SERIAL", "PARITY") {
        config.serial.parity = parse_env_enum(&name, &val)?;
    }
    if let (name, Some(val)) = env_var("SERIAL", "STOP_BITS") {
        config.serial.stop_bits = parse_env_enum(&name, &val)?;
    }
    if let (name, Some(val)) = env_var("SERIAL", "FLOW_CONTROL") {
        config.serial.flow_control = parse_env_enum(&name, &val)?;
    }
    if let (name, Some(val)) = env_var("SERIAL", "TIMEOUT_MS") {
        config.serial.timeout_ms = parse_env(&name, &val, "timeout")?;
    }
    if let (name, Some(val)) = env_var("SERIAL", "INTER_BYTE_TIMEOUT_MS") {
        config.serial.inter_byte_timeout_ms = Some(parse_env(&name, &val, "timeout")?);
    }
    if let (_, Some(val)) = env_var("SERIAL", "EOL") {
        config.serial.eol = val;
    }
    if let (name, Some(val)) = env_var("SERIAL", "MAX_LINE") {
        config.serial.max_line = parse_env(&name, &val, "line length")?;
    }

    // Logging overrides
    if let (_, Some(val)) = env_var("LOGGING", "LEVEL") {
        config.logging.level = val;
    }
    if let (name, Some(val)) = env_var("LOGGING", "FORMAT") {
        config.logging.format = parse_env_enum::<LogFormat>(&name, &val)?;
    }
    if let (_, Some(val)) = env_var("LOGGING", "FILE") {
        config.logging.file = Some(PathBuf::from(val));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WORKSPACE_ENV;
    use crate::port::Parity;
    use serial_test::serial;
    use std::env;
    use tempfile::TempDir;

    const OVERRIDES: &[&str] = &[
        "ATLAS_SERIAL_SERIAL_PORT",
        "ATLAS_SERIAL_SERIAL_BAUD",
        "ATLAS_SERIAL_SERIAL_PARITY",
        "ATLAS_SERIAL_LOGGING_FORMAT",
        CONFIG_PATH_ENV,
        WORKSPACE_ENV,
    ];

    fn clear_env() {
        for var in OVERRIDES {
            env::remove_var(var);
        }
    }

    #[test]
    #[serial]
    fn test_default_loader() {
        clear_env();
        let loader = ConfigLoader::with_defaults().unwrap();
        assert_eq!(loader.config().serial.baud, 115_200);
        assert!(loader.config_path.is_none());
    }

    #[test]
    #[serial]
    fn test_env_override() {
        clear_env();
        env::set_var("ATLAS_SERIAL_SERIAL_BAUD", "57600");
        env::set_var("ATLAS_SERIAL_SERIAL_PORT", "/dev/ttyUSB7");
        env::set_var("ATLAS_SERIAL_SERIAL_PARITY", "even");
        env::set_var("ATLAS_SERIAL_LOGGING_FORMAT", "json");

        let loader = ConfigLoader::with_defaults().unwrap();
        assert_eq!(loader.config().serial.baud, 57_600);
        assert_eq!(loader.config().serial.port.as_deref(), Some("/dev/ttyUSB7"));
        assert_eq!(loader.config().serial.parity, Parity::Even);
        assert_eq!(loader.config().logging.format, LogFormat::Json);

        clear_env();
    }

    #[test]
    #[serial]
    fn test_invalid_env_override() {
        clear_env();
        env::set_var("ATLAS_SERIAL_SERIAL_BAUD", "fast");
        let err = ConfigLoader::with_defaults().unwrap_err();
        assert!(matches!(err, ConfigError::BadOverride { ref var, .. } if var == "ATLAS_SERIAL_SERIAL_BAUD"));

        env::set_var("ATLAS_SERIAL_SERIAL_BAUD", "9600");
        env::set_var("ATLAS_SERIAL_SERIAL_PARITY", "sometimes");
        assert!(ConfigLoader::with_defaults().is_err());
        clear_env();
    }

    #[test]
    #[serial]
    fn test_load_from_file_and_save() {
        clear_env();
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(&path, "[serial]\nport = \"/dev/ttyS4\"\nbaud = 19200\n").unwrap();

        let loader = ConfigLoader::load_from(&path).unwrap();
        assert_eq!(loader.config().serial.baud, 19_200);
        assert_eq!(loader.config_path.as_deref(), Some(path.as_path()));

        let copy = dir.path().join("nested").join("copy.toml");
        loader.save_to(&copy).unwrap();
        let reloaded = ConfigLoader::load_from(&copy).unwrap();
        assert_eq!(reloaded.config(), loader.config());
    }

    #[test]
    #[serial]
    fn test_workspace_config_is_found() {
        clear_env();
        let dir = TempDir::new().unwrap();
        let config_dir = dir.path().join("config");
        std::fs::create_dir_all(&config_dir).unwrap();
        std::fs::write(config_dir.join(CONFIG_FILE_NAME), "[serial]\nbaud = 4800\n").unwrap();
        env::set_var(WORKSPACE_ENV, dir.path());

        let loader = ConfigLoader::load().unwrap();
        assert_eq!(loader.config().serial.baud, 4800);
        assert_eq!(
            loader.config_path,
            Some(config_dir.join(CONFIG_FILE_NAME))
        );
        clear_env();
    }

    #[test]
    #[serial]
    fn test_explicit_missing_config_is_an_error() {
        clear_env();
        env::set_var(CONFIG_PATH_ENV, "/nonexistent/atlas-serial.toml");
        assert!(matches!(
            ConfigLoader::load(),
            Err(ConfigError::ExplicitFileMissing { .. })
        ));
        clear_env();
    }

    #[test]
    #[serial]
    fn test_parse_error() {
        clear_env();
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.toml");
        std::fs::write(&path, "[serial\nbaud = ").unwrap();
        assert!(matches!(
            ConfigLoader::load_from(&path),
            Err(ConfigError::Parse { ref path, .. }) if path.ends_with("broken.toml")
        ));
    }
}
