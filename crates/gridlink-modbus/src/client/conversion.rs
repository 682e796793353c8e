// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Data conversion between raw register bytes and typed values.
//!
//! # Decode Table
//!
//! ```text
//! data type   bytes consumed     interpretation (big-endian)
//! ─────────   ────────────────   ─────────────────────────────────────
//! uint16      2                  unsigned 16-bit
//! int16       2                  two's complement 16-bit
//! uint32      4                  unsigned 32-bit, high word first
//! int32       4                  two's complement 32-bit, high word first
//! float32     4                  IEEE 754 single precision
//! string      quantity × 2       UTF-8, trailing NUL / space padding trimmed
//! ```
//!
//! Scaling divides the decoded number by `10^scale` and is applied after the
//! validity check, so sentinel detection sees the raw device code.
//!
//! # Examples
//!
//! ```rust,ignore
//! use gridlink_modbus::client::{DataConverter, RegisterValue};
//! use gridlink_modbus::DataType;
//!
//! let bytes = [0x00, 0x00, 0x04, 0xD2];
//! let value = DataConverter::convert(&bytes, DataType::UInt32, Some(1), None)?;
//! assert_eq!(value, RegisterValue::Number(123.4));
//! ```

use std::fmt;

use serde::Serialize;

use crate::error::{ConfigurationError, ConversionError};
use crate::types::DataType;

/// Raw codes devices use for "value not available".
const UNSIGNED_SENTINELS: [f64; 4] = [
    0x8000 as f64,
    0xFFFF as f64,
    0x8000_0000_u32 as f64,
    0xFFFF_FFFF_u32 as f64,
];

/// Signed reinterpretations of the 16/32-bit "not available" codes.
const SIGNED_SENTINELS: [f64; 2] = [i16::MIN as f64, i32::MIN as f64];

// =============================================================================
// RegisterValue
// =============================================================================

/// A decoded register value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RegisterValue {
    /// Any numeric type, after optional scaling.
    Number(f64),
    /// Decoded text.
    Text(String),
}

impl RegisterValue {
    /// Returns the number, if this is a numeric value.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(v) => Some(*v),
            Self::Text(_) => None,
        }
    }

    /// Returns the number rounded to an integer, if numeric and finite.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Number(v) if v.is_finite() => Some(v.round() as i64),
            _ => None,
        }
    }

    /// Returns the text, if this is a text value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            Self::Number(_) => None,
        }
    }

    /// Returns the variant name.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Number(_) => "number",
            Self::Text(_) => "text",
        }
    }
}

impl fmt::Display for RegisterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(v) => write!(f, "{v}"),
            Self::Text(s) => write!(f, "{s:?}"),
        }
    }
}

impl From<f64> for RegisterValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<String> for RegisterValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

// =============================================================================
// DataConverter
// =============================================================================

/// Stateless converter for register data.
#[derive(Debug, Clone, Copy, Default)]
pub struct DataConverter;

impl DataConverter {
    /// Returns the natural register count of a data type.
    ///
    /// `String` has no natural width; asking for one is a configuration error.
    pub fn register_quantity(data_type: DataType) -> Result<u16, ConfigurationError> {
        data_type
            .register_count()
            .ok_or_else(|| ConfigurationError::quantity_required(data_type))
    }

    /// Decodes and scales raw bytes.
    pub fn convert(
        bytes: &[u8],
        data_type: DataType,
        scale: Option<u8>,
        quantity: Option<u16>,
    ) -> Result<RegisterValue, ConversionError> {
        let raw = Self::decode(bytes, data_type, quantity)?;
        Ok(Self::apply_scale(raw, scale))
    }

    // =========================================================================
    // Decoding
    // =========================================================================

    /// Decodes raw bytes without scaling.
    pub fn decode(
        bytes: &[u8],
        data_type: DataType,
        quantity: Option<u16>,
    ) -> Result<RegisterValue, ConversionError> {
        let value = match data_type {
            DataType::UInt16 => {
                let b = Self::take::<2>(bytes)?;
                RegisterValue::Number(u16::from_be_bytes(b) as f64)
            }
            DataType::Int16 => {
                let b = Self::take::<2>(bytes)?;
                RegisterValue::Number(i16::from_be_bytes(b) as f64)
            }
            DataType::UInt32 => {
                let b = Self::take::<4>(bytes)?;
                RegisterValue::Number(u32::from_be_bytes(b) as f64)
            }
            DataType::Int32 => {
                let b = Self::take::<4>(bytes)?;
                RegisterValue::Number(i32::from_be_bytes(b) as f64)
            }
            DataType::Float32 => {
                let b = Self::take::<4>(bytes)?;
                RegisterValue::Number(f32::from_be_bytes(b) as f64)
            }
            DataType::String => RegisterValue::Text(Self::decode_text(bytes, quantity)?),
        };

        Ok(value)
    }

    /// Copies the first `N` bytes, or fails with `InsufficientData`.
    fn take<const N: usize>(bytes: &[u8]) -> Result<[u8; N], ConversionError> {
        bytes
            .get(..N)
            .and_then(|slice| <[u8; N]>::try_from(slice).ok())
            .ok_or_else(|| ConversionError::insufficient_data(N, bytes.len()))
    }

    fn decode_text(bytes: &[u8], quantity: Option<u16>) -> Result<String, ConversionError> {
        let len = quantity.map_or(bytes.len(), |q| q as usize * 2);
        let slice = bytes
            .get(..len)
            .ok_or_else(|| ConversionError::insufficient_data(len, bytes.len()))?;

        let text = std::str::from_utf8(slice)
            .map_err(|e| ConversionError::invalid_encoding(e.to_string()))?;

        Ok(text.trim_end_matches(['\0', ' ']).to_string())
    }

    // =========================================================================
    // Scaling & Validity
    // =========================================================================

    /// Divides a number by `10^scale`. Text and zero scale pass through.
    pub fn apply_scale(value: RegisterValue, scale: Option<u8>) -> RegisterValue {
        match (value, scale) {
            (RegisterValue::Number(v), Some(s)) if s > 0 => {
                RegisterValue::Number(v / 10f64.powi(i32::from(s)))
            }
            (value, _) => value,
        }
    }

    /// Returns `false` for NaN and for the device "not available" codes.
    pub fn is_valid(value: &RegisterValue, data_type: DataType) -> bool {
        let v = match value {
            RegisterValue::Text(_) => return true,
            RegisterValue::Number(v) => *v,
        };

        if v.is_nan() || UNSIGNED_SENTINELS.contains(&v) {
            return false;
        }

        !(data_type.is_signed() && SIGNED_SENTINELS.contains(&v))
    }

    // =========================================================================
    // Encoding
    // =========================================================================

    /// Encodes an unscaled number into registers.
    ///
    /// Integer types round to the nearest integer and reject out-of-range values.
    pub fn encode_number(value: f64, data_type: DataType) -> Result<Vec<u16>, ConversionError> {
        let overflow = || ConversionError::overflow(value.to_string(), data_type.as_str());
        let rounded = value.round();

        match data_type {
            DataType::UInt16 => {
                if !(0.0..=u16::MAX as f64).contains(&rounded) {
                    return Err(overflow());
                }
                Ok(vec![rounded as u16])
            }
            DataType::Int16 => {
                if !(i16::MIN as f64..=i16::MAX as f64).contains(&rounded) {
                    return Err(overflow());
                }
                Ok(bytes_to_registers(&(rounded as i16).to_be_bytes()))
            }
            DataType::UInt32 => {
                if !(0.0..=u32::MAX as f64).contains(&rounded) {
                    return Err(overflow());
                }
                Ok(bytes_to_registers(&(rounded as u32).to_be_bytes()))
            }
            DataType::Int32 => {
                if !(i32::MIN as f64..=i32::MAX as f64).contains(&rounded) {
                    return Err(overflow());
                }
                Ok(bytes_to_registers(&(rounded as i32).to_be_bytes()))
            }
            DataType::Float32 => Ok(bytes_to_registers(&(value as f32).to_be_bytes())),
            DataType::String => Err(ConversionError::type_mismatch("text", "number")),
        }
    }

    /// Encodes text into exactly `quantity` registers, NUL-padded or truncated.
    pub fn encode_text(text: &str, quantity: u16) -> Vec<u16> {
        let max_bytes = quantity as usize * 2;
        let mut bytes: Vec<u8> = text.bytes().take(max_bytes).collect();
        bytes.resize(max_bytes, 0);
        bytes_to_registers(&bytes)
    }
}

// =============================================================================
// Register / Byte Helpers
// =============================================================================

/// Flattens registers into bytes, high byte first.
pub fn registers_to_bytes(registers: &[u16]) -> Vec<u8> {
    registers.iter().flat_map(|r| r.to_be_bytes()).collect()
}

/// Packs bytes into registers, high byte first. An odd trailing byte is zero-padded.
pub fn bytes_to_registers(bytes: &[u8]) -> Vec<u16> {
    bytes
        .chunks(2)
        .map(|chunk| {
            let hi = chunk.first().copied().unwrap_or(0);
            let lo = chunk.get(1).copied().unwrap_or(0);
            u16::from_be_bytes([hi, lo])
        })
        .collect()
}

// =============================================================================
// Tests
// =============================================================================
