// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Errors raised while loading and validating a site file.

use std::path::PathBuf;
use thiserror::Error;

/// Why a site file could not be turned into a [`GridlinkConfig`](crate::GridlinkConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file was read but is not valid YAML, TOML or JSON for the schema.
    #[error("Cannot parse site file '{path}': {message}")]
    Parse {
        /// Site file.
        path: PathBuf,
        /// Deserializer message.
        message: String,
    },

    /// In-memory content does not match the schema.
    #[error("Site configuration does not match the schema: {message}")]
    Serialization {
        /// Deserializer message.
        message: String,
    },

    /// A field holds a value outside its permitted domain.
    #[error("Invalid value for '{field}': {message}")]
    Validation {
        /// Dotted path of the field, e.g. `devices.inv-1.registers`.
        field: String,
        /// What is wrong with it.
        message: String,
    },

    /// The file exists but could not be read.
    #[error("Cannot read site file '{path}': {source}")]
    Io {
        /// Site file.
        path: PathBuf,
        /// Read error.
        #[source]
        source: std::io::Error,
    },

    /// Two devices share an id.
    #[error("Device id '{device_id}' is used more than once")]
    DuplicateDeviceId {
        /// Repeated id.
        device_id: String,
    },

    /// A battery names an inverter that does not exist, or a non-inverter.
    #[error("Device '{device_id}' references unknown {expected} '{reference}'")]
    UnknownReference {
        /// Referring device.
        device_id: String,
        /// Referenced id.
        reference: String,
        /// Kind the referenced device must have.
        expected: &'static str,
    },

    /// A `${VAR}` placeholder without a default names an unset variable.
    #[error("Environment variable '{name}' is not set")]
    EnvVarNotFound {
        /// Variable name.
        name: String,
    },

    /// An override variable holds an unusable value.
    #[error("Environment variable '{name}' is invalid: {message}")]
    InvalidEnvVar {
        /// Variable name.
        name: String,
        /// What is wrong with it.
        message: String,
    },

    /// No file at the given path.
    #[error("Site file not found: {path}")]
    FileNotFound {
        /// Missing path.
        path: PathBuf,
    },

    /// The extension is not `.yaml`, `.yml`, `.toml` or `.json`.
    #[error("Unsupported site file format: {format}")]
    UnsupportedFormat {
        /// Offending extension.
        format: String,
    },
}

impl ConfigError {
    /// Undecodable file content.
    pub fn parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Parse {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Undecodable in-memory content.
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Out-of-domain field.
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Unreadable file.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Repeated device id.
    pub fn duplicate_device_id(device_id: impl Into<String>) -> Self {
        Self::DuplicateDeviceId {
            device_id: device_id.into(),
        }
    }

    /// Dangling cross-device reference.
    pub fn unknown_reference(
        device_id: impl Into<String>,
        reference: impl Into<String>,
        expected: &'static str,
    ) -> Self {
        Self::UnknownReference {
            device_id: device_id.into(),
            reference: reference.into(),
            expected,
        }
    }

    /// Unset placeholder variable.
    pub fn env_var_not_found(name: impl Into<String>) -> Self {
        Self::EnvVarNotFound { name: name.into() }
    }

    /// Unusable override variable.
    pub fn invalid_env_var(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidEnvVar {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Missing file.
    pub fn file_not_found(path: impl Into<PathBuf>) -> Self {
        Self::FileNotFound { path: path.into() }
    }

    /// Unknown extension.
    pub fn unsupported_format(format: impl Into<String>) -> Self {
        Self::UnsupportedFormat {
            format: format.into(),
        }
    }
}

/// Result of a configuration operation.
pub type ConfigResult<T> = Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_reference_message() {
        let err = ConfigError::unknown_reference("bat-1", "inv-9", "inverter");
        assert_eq!(err.to_string(), "Device 'bat-1' references unknown inverter 'inv-9'");
    }

    #[test]
    fn test_validation_message_names_the_field() {
        let err = ConfigError::validation("devices.inv-1.registers", "power: address must be >= 1");
        assert_eq!(
            err.to_string(),
            "Invalid value for 'devices.inv-1.registers': power: address must be >= 1"
        );
        assert!(ConfigError::duplicate_device_id("inv-1").to_string().contains("inv-1"));
    }
}
