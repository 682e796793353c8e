// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Reads whole register maps with per-field required/optional policy.
//!
//! # Read Pipeline
//!
//! ```text
//! descriptor ─▶ resolve quantity ─▶ read bytes ─▶ decode ─▶ is_valid? ─▶ scale ─▶ value
//!                     │                 │           │           │
//!                     ▼                 ▼           ▼           ▼
//!               Configuration       Transport   Conversion  InvalidValue   (ReadError)
//! ```
//!
//! [`RegisterMapper::read_multiple_registers`] reads every descriptor of a map
//! one after the other. A failing optional field is dropped with a warning; failing
//! required fields are collected and reported in a single warning at the
//! end. The call itself never fails.

use std::collections::HashMap;

use crate::client::{DataConverter, FaultTolerantReader, RegisterValue};
use crate::error::{ConfigurationError, ReadError, ReadResult};
use crate::types::{DataType, RegisterDescriptor, RegisterMap};

/// Largest register count a single Modbus read request may ask for.
pub const MAX_REGISTERS_PER_READ: u16 = 125;

// =============================================================================
// RegisterMapper
// =============================================================================

/// Stateless reader of descriptors and register maps.
#[derive(Debug, Clone, Copy, Default)]
pub struct RegisterMapper;

impl RegisterMapper {
    /// Reads and decodes one descriptor.
    ///
    /// The validity check runs on the unscaled value so that device sentinel
    /// codes are recognised before scaling changes them.
    pub async fn read_register(
        reader: &FaultTolerantReader,
        descriptor: &RegisterDescriptor,
    ) -> ReadResult<RegisterValue> {
        let address = descriptor.address;
        let quantity = descriptor
            .resolved_quantity()
            .map_err(|source| ReadError::Configuration { address, source })?;

        let bytes = reader.read_holding_registers(address, quantity).await?;

        let raw = DataConverter::decode(&bytes, descriptor.data_type, Some(quantity))
            .map_err(|source| ReadError::Conversion { address, source })?;

        if !DataConverter::is_valid(&raw, descriptor.data_type) {
            return Err(ReadError::InvalidValue {
                address,
                raw: raw.to_string(),
            });
        }

        Ok(DataConverter::apply_scale(raw, descriptor.scale))
    }

    /// Reads every descriptor of `map`, strictly in order.
    pub async fn read_multiple_registers(
        reader: &FaultTolerantReader,
        map: &RegisterMap,
    ) -> RegisterReadings {
        let mut readings = RegisterReadings::default();
        let mut required_errors = Vec::new();

        for (name, descriptor) in map.iter() {
            match Self::read_register(reader, descriptor).await {
                Ok(value) => readings.insert(name, value),
                Err(error) if descriptor.required => {
                    required_errors.push(format!("{name}: {error}"));
                    readings.failed_required.push(name.to_string());
                }
                Err(error) => {
                    tracing::warn!(
                        device = %reader.label(),
                        field = name,
                        address = descriptor.address,
                        error = %error,
                        "Optional register unavailable"
                    );
                    readings.failed_optional.push(name.to_string());
                }
            }
        }

        if !required_errors.is_empty() {
            tracing::warn!(
                device = %reader.label(),
                failed = required_errors.len(),
                fields = ?readings.failed_required,
                "Required registers unavailable: {}",
                required_errors.join("; ")
            );
        }

        readings
    }
}

// =============================================================================
// RegisterReadings
// =============================================================================

/// Outcome of reading a register map: values by name plus the names that failed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RegisterReadings {
    values: HashMap<String, RegisterValue>,
    failed_required: Vec<String>,
    failed_optional: Vec<String>,
}

impl RegisterReadings {
    /// Creates an empty set of readings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a value.
    pub fn insert(&mut self, name: impl Into<String>, value: RegisterValue) {
        self.values.insert(name.into(), value);
    }

    /// Returns the value read for `name`.
    pub fn get(&self, name: &str) -> Option<&RegisterValue> {
        self.values.get(name)
    }

    /// Returns the numeric value read for `name`.
    pub fn number(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(RegisterValue::as_f64)
    }

    /// Returns the text value read for `name`.
    pub fn text(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(RegisterValue::as_str)
    }

    /// Returns `true` if a value was read for `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Number of values read.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` if nothing was read.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterates the values read, in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &RegisterValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Required fields that could not be read.
    pub fn failed_required(&self) -> &[String] {
        &self.failed_required
    }

    /// Optional fields that could not be read.
    pub fn failed_optional(&self) -> &[String] {
        &self.failed_optional
    }

    /// Returns `true` if every required field was read.
    pub fn is_complete(&self) -> bool {
        self.failed_required.is_empty()
    }
}

// =============================================================================
// Validation
// =============================================================================

/// Result of validating a register map.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    /// `true` if no problems were found.
    pub valid: bool,
    /// One message per problem, prefixed with the field name.
    pub errors: Vec<String>,
}

impl ValidationReport {
    /// Converts the report into a configuration error if it has problems.
    pub fn into_result(self) -> Result<(), ConfigurationError> {
        if self.valid {
            Ok(())
        } else {
            Err(ConfigurationError::InvalidRegisterMap {
                errors: self.errors,
            })
        }
    }
}

/// Checks every descriptor of `map` and reports all problems at once.
pub fn validate_register_map(map: &RegisterMap) -> ValidationReport {
    let mut errors = Vec::new();

    for (name, descriptor) in map.iter() {
        validate_descriptor(name, descriptor, &mut errors);
    }

    ValidationReport {
        valid: errors.is_empty(),
        errors,
    }
}

fn validate_descriptor(name: &str, descriptor: &RegisterDescriptor, errors: &mut Vec<String>) {
    if descriptor.address == 0 {
        errors.push(format!("{name}: address must be >= 1"));
    }

    match (descriptor.data_type, descriptor.quantity) {
        (DataType::String, None) => {
            errors.push(format!("{name}: data type string requires a quantity"));
        }
        (_, Some(0)) => {
            errors.push(format!("{name}: quantity must be >= 1"));
        }
        (data_type, Some(quantity)) => {
            if let Some(width) = data_type.register_count() {
                if quantity < width {
                    errors.push(format!(
                        "{name}: quantity {quantity} is smaller than the {data_type} width of {width}"
                    ));
                }
            }
            if quantity > MAX_REGISTERS_PER_READ {
                errors.push(format!(
                    "{name}: quantity {quantity} exceeds {MAX_REGISTERS_PER_READ} registers per read"
                ));
            }
        }
        (_, None) => {}
    }
}

// =============================================================================
// Tests
// =============================================================================
