// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Configuration loading for gridlink.
//!
//! # Loading Pipeline
//!
//! 1. Read the file and pick the format from its extension
//! 2. Resolve `${VAR}` / `${VAR:default}` placeholders in the raw text
//! 3. Deserialize (YAML through the `config` crate, TOML, JSON)
//! 4. Apply `GRIDLINK_*` environment overrides
//! 5. Validate
//!
//! # Environment Variable Override
//!
//! ```text
//! GRIDLINK_SITE_ID=garage
//! GRIDLINK_LOG_LEVEL=debug
//! GRIDLINK_LOG_FORMAT=json
//! GRIDLINK_POLL_INTERVAL=30s
//! ```

use crate::error::{ConfigError, ConfigResult};
use crate::schema::{GridlinkConfig, LogFormat, LogLevel};
use serde::de::DeserializeOwned;
use std::env;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

/// Default environment variable prefix.
pub const DEFAULT_ENV_PREFIX: &str = "GRIDLINK";

// =============================================================================
// ConfigLoader
// =============================================================================

/// Configuration loader for gridlink.
///
/// # Examples
///
/// ```no_run
/// use gridlink_config::loader::ConfigLoader;
///
/// let config = ConfigLoader::new().load("gridlink.yaml").unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    /// Environment variable prefix.
    env_prefix: String,

    /// Whether to resolve placeholders and apply overrides.
    resolve_env_vars: bool,
}

impl ConfigLoader {
    /// Creates a loader with the `GRIDLINK` prefix and environment resolution on.
    pub fn new() -> Self {
        Self {
            env_prefix: DEFAULT_ENV_PREFIX.to_string(),
            resolve_env_vars: true,
        }
    }

    /// Sets the environment variable prefix.
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// Enables or disables environment resolution.
    pub fn with_env_vars(mut self, enabled: bool) -> Self {
        self.resolve_env_vars = enabled;
        self
    }

    /// Loads and validates the configuration at `path`.
    pub fn load(&self, path: impl AsRef<Path>) -> ConfigResult<GridlinkConfig> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading configuration");

        let format = ConfigFormat::from_path(path)?;
        let content = self.read_file(path)?;

        let mut config = self
            .parse_content(&content, format)
            .map_err(|e| match e {
                ConfigError::Serialization { message } => ConfigError::parse(path, message),
                other => other,
            })?;

        self.finish(&mut config)?;

        info!(
            site = %config.site.id,
            devices = config.devices.len(),
            "Configuration loaded"
        );
        Ok(config)
    }

    /// Loads and validates configuration from a string.
    pub fn load_from_str(&self, content: &str, format: ConfigFormat) -> ConfigResult<GridlinkConfig> {
        let mut config = self.parse_content(content, format)?;
        self.finish(&mut config)?;
        Ok(config)
    }

    fn finish(&self, config: &mut GridlinkConfig) -> ConfigResult<()> {
        if self.resolve_env_vars {
            self.apply_env_overrides(config)?;
        }
        config.validate()?;
        debug!(
            interval = ?config.polling.interval,
            resolution = %config.polling.resolution,
            "Configuration validated"
        );
        Ok(())
    }

    fn read_file(&self, path: &Path) -> ConfigResult<String> {
        if !path.exists() {
            return Err(ConfigError::file_not_found(path));
        }

        fs::read_to_string(path).map_err(|e| ConfigError::io(path, e))
    }

    fn parse_content(&self, content: &str, format: ConfigFormat) -> ConfigResult<GridlinkConfig> {
        let content = if self.resolve_env_vars {
            resolve_env_placeholders(content)?
        } else {
            content.to_string()
        };

        parse_str(&content, format)
    }

    fn apply_env_overrides(&self, config: &mut GridlinkConfig) -> ConfigResult<()> {
        if let Some(value) = self.env("SITE_ID") {
            config.site.id = value;
        }
        if let Some(value) = self.env("SITE_NAME") {
            config.site.name = Some(value);
        }

        if let Some(value) = self.env("LOG_LEVEL") {
            config.logging.level = LogLevel::parse(&value).ok_or_else(|| {
                ConfigError::invalid_env_var(self.var("LOG_LEVEL"), "expected trace, debug, info, warn or error")
            })?;
        }
        if let Some(value) = self.env("LOG_FORMAT") {
            config.logging.format = match value.trim().to_lowercase().as_str() {
                "text" | "pretty" => LogFormat::Text,
                "json" => LogFormat::Json,
                "compact" => LogFormat::Compact,
                _ => {
                    return Err(ConfigError::invalid_env_var(
                        self.var("LOG_FORMAT"),
                        "expected text, json or compact",
                    ))
                }
            };
        }

        if let Some(value) = self.env("POLL_INTERVAL") {
            config.polling.interval = humantime::parse_duration(value.trim())
                .map_err(|e| ConfigError::invalid_env_var(self.var("POLL_INTERVAL"), e.to_string()))?;
        }

        Ok(())
    }

    fn var(&self, suffix: &str) -> String {
        format!("{}_{}", self.env_prefix, suffix)
    }

    fn env(&self, suffix: &str) -> Option<String> {
        env::var(self.var(suffix)).ok()
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// ConfigFormat
// =============================================================================

/// Supported configuration file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// YAML format.
    Yaml,
    /// TOML format.
    Toml,
    /// JSON format.
    Json,
}

impl ConfigFormat {
    /// Determines the format from a file path.
    pub fn from_path(path: &Path) -> ConfigResult<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase());

        match ext.as_deref() {
            Some("yaml") | Some("yml") => Ok(ConfigFormat::Yaml),
            Some("toml") => Ok(ConfigFormat::Toml),
            Some("json") => Ok(ConfigFormat::Json),
            Some(other) => Err(ConfigError::unsupported_format(other)),
            None => Err(ConfigError::unsupported_format("(no extension)")),
        }
    }

    /// Returns the file extension for this format.
    pub fn extension(&self) -> &'static str {
        match self {
            ConfigFormat::Yaml => "yaml",
            ConfigFormat::Toml => "toml",
            ConfigFormat::Json => "json",
        }
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Replaces `${VAR}` and `${VAR:default}` with environment values.
///
/// An unset variable without a default is an error. An unterminated
/// placeholder is kept as-is.
pub fn resolve_env_placeholders(content: &str) -> ConfigResult<String> {
    let mut result = String::with_capacity(content.len());
    let mut rest = content;

    while let Some(start) = rest.find("${") {
        result.push_str(&rest[..start]);
        let after = &rest[start + 2..];

        let Some(end) = after.find('}') else {
            result.push_str(&rest[start..]);
            return Ok(result);
        };

        let placeholder = &after[..end];
        let (name, default) = match placeholder.split_once(':') {
            Some((name, default)) => (name.trim(), Some(default)),
            None => (placeholder.trim(), None),
        };

        match (env::var(name), default) {
            (Ok(value), _) => result.push_str(&value),
            (Err(_), Some(default)) => result.push_str(default),
            (Err(_), None) => return Err(ConfigError::env_var_not_found(name)),
        }

        rest = &after[end + 1..];
    }

    result.push_str(rest);
    Ok(result)
}

fn parse_str(content: &str, format: ConfigFormat) -> ConfigResult<GridlinkConfig> {
    match format {
        ConfigFormat::Yaml => yaml_parse(content),
        ConfigFormat::Toml => toml::from_str(content).map_err(|e| ConfigError::serialization(e.to_string())),
        ConfigFormat::Json => {
            serde_json::from_str(content).map_err(|e| ConfigError::serialization(e.to_string()))
        }
    }
}

/// YAML goes through the `config` crate's YAML source.
fn yaml_parse<T: DeserializeOwned>(content: &str) -> ConfigResult<T> {
    let config = config::Config::builder()
        .add_source(config::File::from_str(content, config::FileFormat::Yaml))
        .build()
        .map_err(|e| ConfigError::serialization(e.to_string()))?;

    config
        .try_deserialize()
        .map_err(|e| ConfigError::serialization(e.to_string()))
}

// =============================================================================
// Convenience Functions
// =============================================================================

/// Loads configuration from a file with default settings.
pub fn load_config(path: impl AsRef<Path>) -> ConfigResult<GridlinkConfig> {
    ConfigLoader::new().load(path)
}

/// Loads configuration from a string with the specified format.
pub fn load_config_str(content: &str, format: ConfigFormat) -> ConfigResult<GridlinkConfig> {
    ConfigLoader::new().load_from_str(content, format)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{DeviceConfig, DeviceKind};
    use std::io::Write;
    use std::time::Duration;
    use tempfile::NamedTempFile;

    const YAML: &str = r#"
site:
  id: home
polling:
  interval: 15s
devices:
  - kind: inverter
    id: inv-1
    network_device_id: "aa:bb:cc"
    connection:
      host: "${GRIDLINK_TEST_INVERTER_HOST:192.168.1.50}"
      unit_id: 3
      timeout: 2s
    registers:
      power: { address: 30775, data_type: int32, required: true }
      state:
        address: 30201
        data_type: uint32
        value_mapping:
          - { raw_value: 307, mapped_state: mppt }
  - kind: battery
    id: bat-1
    inverter: inv-1
    network_device_id: "aa:bb:cc"
    registers:
      soc: { address: 30845, data_type: uint32, required: true }
      drain_percentage: { address: 30851, data_type: int16, scale: 1 }
"#;

    fn temp_file(suffix: &str, content: &str) -> NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_yaml() {
        let file = temp_file(".yaml", YAML);
        let config = ConfigLoader::new().with_env_prefix("GRIDLINK_TEST_YAML").load(file.path()).unwrap();

        assert_eq!(config.site.id, "home");
        assert_eq!(config.polling.interval, Duration::from_secs(15));
        assert_eq!(config.count(DeviceKind::Inverter), 1);
        assert_eq!(config.count(DeviceKind::Battery), 1);

        match config.get_device("inv-1").unwrap() {
            DeviceConfig::Inverter(inverter) => {
                assert_eq!(inverter.connection.host, "192.168.1.50");
                assert_eq!(inverter.connection.port, 502);
                assert_eq!(inverter.connection.unit_id, 3);
                assert_eq!(inverter.connection.operation_timeout, Duration::from_secs(2));
                let state = inverter.registers.state.as_ref().unwrap();
                assert_eq!(state.map_value(307), Some("mppt"));
                assert!(inverter.registers.power.as_ref().unwrap().required);
            }
            other => panic!("unexpected device: {other:?}"),
        }
    }

    #[test]
    fn test_load_toml_and_json() {
        let toml = r#"
[site]
id = "cabin"

[[devices]]
kind = "meter"
id = "meter-1"
network_device_id = "11:22"
connection = { host = "10.0.0.9" }
registers = { grid_power = { address = 30865, data_type = "int32" } }
"#;
        let file = temp_file(".toml", toml);
        let config = ConfigLoader::new().with_env_prefix("GRIDLINK_TEST_TOML").load(file.path()).unwrap();
        assert_eq!(config.site.id, "cabin");
        assert_eq!(config.count(DeviceKind::Meter), 1);

        let json = r#"{ "site": { "id": "flat" }, "devices": [] }"#;
        let config = ConfigLoader::new()
            .with_env_prefix("GRIDLINK_TEST_JSON")
            .load_from_str(json, ConfigFormat::Json)
            .unwrap();
        assert_eq!(config.site.id, "flat");
        assert!(config.devices.is_empty());
    }

    #[test]
    fn test_config_format_from_path() {
        assert_eq!(ConfigFormat::from_path(Path::new("a.yml")).unwrap(), ConfigFormat::Yaml);
        assert_eq!(ConfigFormat::from_path(Path::new("a.TOML")).unwrap(), ConfigFormat::Toml);
        assert!(matches!(
            ConfigFormat::from_path(Path::new("a.ini")),
            Err(ConfigError::UnsupportedFormat { .. })
        ));
        assert!(ConfigFormat::from_path(Path::new("gridlink")).is_err());
    }

    #[test]
    fn test_env_placeholder_resolution() {
        env::set_var("GRIDLINK_TEST_PLACEHOLDER", "10.1.1.1");
        let resolved = resolve_env_placeholders("host: ${GRIDLINK_TEST_PLACEHOLDER}").unwrap();
        assert_eq!(resolved, "host: 10.1.1.1");
    }

    #[test]
    fn test_env_placeholder_with_default() {
        let resolved = resolve_env_placeholders("port: ${GRIDLINK_TEST_UNSET_PORT:1502}").unwrap();
        assert_eq!(resolved, "port: 1502");
    }

    #[test]
    fn test_missing_env_var_without_default() {
        let err = resolve_env_placeholders("host: ${GRIDLINK_TEST_SURELY_UNSET}").unwrap_err();
        assert!(matches!(err, ConfigError::EnvVarNotFound { ref name } if name == "GRIDLINK_TEST_SURELY_UNSET"));
    }

    #[test]
    fn test_unterminated_placeholder_kept() {
        assert_eq!(resolve_env_placeholders("a ${B").unwrap(), "a ${B");
    }

    #[test]
    fn test_env_overrides() {
        env::set_var("GRIDLINK_TEST_OVR_SITE_ID", "garage");
        env::set_var("GRIDLINK_TEST_OVR_LOG_LEVEL", "debug");
        env::set_var("GRIDLINK_TEST_OVR_POLL_INTERVAL", "1m");

        let config = ConfigLoader::new()
            .with_env_prefix("GRIDLINK_TEST_OVR")
            .load_from_str("{}", ConfigFormat::Json)
            .unwrap();

        assert_eq!(config.site.id, "garage");
        assert_eq!(config.logging.level, LogLevel::Debug);
        assert_eq!(config.polling.interval, Duration::from_secs(60));
    }

    #[test]
    fn test_invalid_override_rejected() {
        env::set_var("GRIDLINK_TEST_BAD_POLL_INTERVAL", "often");
        let err = ConfigLoader::new()
            .with_env_prefix("GRIDLINK_TEST_BAD")
            .load_from_str("{}", ConfigFormat::Json)
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnvVar { .. }));
    }

    #[test]
    fn test_missing_file() {
        let err = ConfigLoader::new().load("/definitely/not/here.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound { .. }));
    }

    #[test]
    fn test_parse_error_carries_path() {
        let file = temp_file(".json", "{ not json");
        let err = ConfigLoader::new().load(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_unknown_register_field_rejected() {
        let json = r#"{ "devices": [ { "kind": "meter", "id": "m", "network_device_id": "x",
            "connection": { "host": "10.0.0.9" },
            "registers": { "grid_powr": { "address": 1, "data_type": "int32" } } } ] }"#;
        assert!(load_config_str(json, ConfigFormat::Json).is_err());
    }
}
