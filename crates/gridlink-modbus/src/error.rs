// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Error types for register transport, decoding and register map validation.
//!
//! # Error Categories
//!
//! ```text
//! ModbusError                 (raised by a transport or connector)
//! ├── Connection    - TCP connect / link loss
//! ├── Protocol      - exception responses, malformed replies
//! ├── Conversion    - raw bytes that cannot be decoded
//! ├── Configuration - invalid connection or register settings
//! └── Timeout       - connect or response deadline exceeded
//!
//! ReadError                   (returned by the fault-tolerant reader, never raised)
//! ├── Transport     - wraps the ModbusError of a failed read
//! ├── NotSupported  - operation not offered by the transport
//! ├── Conversion    - bytes read but not decodable
//! ├── InvalidValue  - decoded value is a "not available" sentinel
//! └── Configuration - descriptor cannot be read as configured
//! ```
//!
//! `ConfigurationError` is fatal and surfaces at construction time.
//! `ConnectionError` is fatal to one connect attempt. `ReadError` is always
//! recovered by the caller.

use std::fmt;
use std::io;
use std::time::Duration;

use thiserror::Error;

// =============================================================================
// ModbusError
// =============================================================================

/// Failure reported by a register transport or a connector.
#[derive(Debug, Error)]
pub enum ModbusError {
    /// The TCP link could not be opened or was lost.
    #[error("{0}")]
    Connection(#[from] ConnectionError),

    /// The device answered with an exception or an unreadable frame.
    #[error("{0}")]
    Protocol(#[from] ProtocolError),

    /// Register bytes could not be turned into a value.
    #[error("{0}")]
    Conversion(#[from] ConversionError),

    /// Connection or register settings are unusable.
    #[error("{0}")]
    Configuration(#[from] ConfigurationError),

    /// A connect or response deadline passed.
    #[error("{0}")]
    Timeout(#[from] TimeoutError),
}

impl ModbusError {
    /// Wraps a connection failure.
    #[inline]
    pub fn connection(error: ConnectionError) -> Self {
        Self::Connection(error)
    }

    /// Wraps a protocol failure.
    #[inline]
    pub fn protocol(error: ProtocolError) -> Self {
        Self::Protocol(error)
    }

    /// Wraps a configuration failure.
    #[inline]
    pub fn configuration(error: ConfigurationError) -> Self {
        Self::Configuration(error)
    }

    /// Wraps a timeout.
    #[inline]
    pub fn timeout(error: TimeoutError) -> Self {
        Self::Timeout(error)
    }

    /// The transport handle is closed.
    pub fn not_connected() -> Self {
        Self::Connection(ConnectionError::NotConnected)
    }

    /// A register read got no answer within `duration`.
    pub fn read_timeout(duration: Duration) -> Self {
        Self::Timeout(TimeoutError::read(duration))
    }

    /// The device answered `function_code` with `exception_code`.
    pub fn exception(function_code: u8, exception_code: u8) -> Self {
        Self::Protocol(ProtocolError::exception(function_code, exception_code))
    }

    /// Returns `true` if a later attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Connection(e) => e.is_retryable(),
            Self::Protocol(e) => e.is_retryable(),
            Self::Timeout(_) => true,
            Self::Conversion(_) | Self::Configuration(_) => false,
        }
    }

    /// Short category label used as a log field.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Connection(_) => "connection",
            Self::Protocol(_) => "protocol",
            Self::Timeout(_) => "timeout",
            Self::Conversion(_) => "conversion",
            Self::Configuration(_) => "configuration",
        }
    }
}

// =============================================================================
// ConnectionError
// =============================================================================

/// Failure to reach or keep a device endpoint.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// The endpoint refused or reset the TCP handshake.
    #[error("Device at {host}:{port} refused the connection")]
    Refused {
        /// Device host.
        host: String,
        /// Device port.
        port: u16,
        /// Socket error, when one was reported.
        #[source]
        source: Option<io::Error>,
    },

    /// The TCP handshake did not finish in time.
    #[error("No answer from {host}:{port} within {duration:?}")]
    TimedOut {
        /// Device host.
        host: String,
        /// Device port.
        port: u16,
        /// Connect timeout that expired.
        duration: Duration,
    },

    /// The host name did not resolve to any address.
    #[error("Cannot resolve device host '{hostname}'")]
    DnsResolutionFailed {
        /// Unresolved host name.
        hostname: String,
        /// Resolver error, when one was reported.
        #[source]
        source: Option<io::Error>,
    },

    /// The peer closed an open link.
    #[error("Link closed by peer{}", reason.as_ref().map(|r| format!(": {r}")).unwrap_or_default())]
    Closed {
        /// Reported reason.
        reason: Option<String>,
    },

    /// No transport handle is open.
    #[error("Device link is not connected")]
    NotConnected,

    /// Any other socket failure.
    #[error("{message}")]
    Io {
        /// What was being attempted.
        message: String,
        /// Socket error.
        #[source]
        source: io::Error,
    },
}

impl ConnectionError {
    /// Refused connection without a socket error.
    pub fn refused(host: impl Into<String>, port: u16) -> Self {
        Self::Refused {
            host: host.into(),
            port,
            source: None,
        }
    }

    /// Refused connection carrying the socket error.
    pub fn refused_with(host: impl Into<String>, port: u16, source: io::Error) -> Self {
        Self::Refused {
            host: host.into(),
            port,
            source: Some(source),
        }
    }

    /// Handshake timeout.
    pub fn timed_out(host: impl Into<String>, port: u16, duration: Duration) -> Self {
        Self::TimedOut {
            host: host.into(),
            port,
            duration,
        }
    }

    /// Host name resolved to nothing.
    pub fn dns_failed(hostname: impl Into<String>) -> Self {
        Self::DnsResolutionFailed {
            hostname: hostname.into(),
            source: None,
        }
    }

    /// Link closed by the peer.
    pub fn closed(reason: Option<String>) -> Self {
        Self::Closed { reason }
    }

    /// Other socket failure.
    pub fn io(message: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            message: message.into(),
            source,
        }
    }

    /// Returns `true` if reconnecting may help.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Io { source, .. } => matches!(
                source.kind(),
                io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::TimedOut
                    | io::ErrorKind::Interrupted
            ),
            _ => true,
        }
    }
}

// =============================================================================
// ProtocolError
// =============================================================================

/// The device answered, but not with register data.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Modbus exception response.
    #[error("Device rejected function {function_code:#04x}: {} (code {exception_code})", exception_name(*exception_code))]
    Exception {
        /// Function code of the request.
        function_code: u8,
        /// Exception code from the reply.
        exception_code: u8,
    },

    /// The reply could not be interpreted.
    #[error("Malformed reply: {message}")]
    InvalidResponse {
        /// Decoder message.
        message: String,
    },
}

impl ProtocolError {
    /// Exception response.
    pub fn exception(function_code: u8, exception_code: u8) -> Self {
        Self::Exception {
            function_code,
            exception_code,
        }
    }

    /// Malformed reply.
    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::InvalidResponse {
            message: message.into(),
        }
    }

    /// Busy, acknowledge and gateway exceptions clear up on their own.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Exception { exception_code, .. } => {
                matches!(exception_code, 0x05 | 0x06 | 0x0A | 0x0B)
            }
            Self::InvalidResponse { .. } => true,
        }
    }
}

/// Standard name of a Modbus exception code.
pub fn exception_name(code: u8) -> &'static str {
    match code {
        0x01 => "illegal function",
        0x02 => "illegal data address",
        0x03 => "illegal data value",
        0x04 => "server device failure",
        0x05 => "acknowledge",
        0x06 => "server device busy",
        0x08 => "memory parity error",
        0x0A => "gateway path unavailable",
        0x0B => "gateway target failed to respond",
        _ => "unknown exception",
    }
}

// =============================================================================
// ConversionError
// =============================================================================

/// Register bytes and a data type that do not fit together.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConversionError {
    /// Fewer bytes than the data type needs.
    #[error("Need {expected} bytes, got {actual}")]
    InsufficientData {
        /// Bytes required.
        expected: usize,
        /// Bytes supplied.
        actual: usize,
    },

    /// A number outside the range of the data type.
    #[error("{value} does not fit in {target_type}")]
    Overflow {
        /// Offending value.
        value: String,
        /// Data type name.
        target_type: String,
    },

    /// Text registers that are not valid UTF-8.
    #[error("Text registers are not valid UTF-8: {message}")]
    InvalidEncoding {
        /// Decoder message.
        message: String,
    },

    /// Number given for a text type, or the reverse.
    #[error("Expected {expected}, got {actual}")]
    TypeMismatch {
        /// Expected value kind.
        expected: String,
        /// Supplied value kind.
        actual: String,
    },
}

impl ConversionError {
    /// Short input.
    pub fn insufficient_data(expected: usize, actual: usize) -> Self {
        Self::InsufficientData { expected, actual }
    }

    /// Out of range number.
    pub fn overflow(value: impl Into<String>, target_type: impl Into<String>) -> Self {
        Self::Overflow {
            value: value.into(),
            target_type: target_type.into(),
        }
    }

    /// Bad UTF-8.
    pub fn invalid_encoding(message: impl Into<String>) -> Self {
        Self::InvalidEncoding {
            message: message.into(),
        }
    }

    /// Wrong value kind.
    pub fn type_mismatch(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::TypeMismatch {
            expected: expected.into(),
            actual: actual.into(),
        }
    }
}

// =============================================================================
// ConfigurationError
// =============================================================================

/// Unusable connection or register settings. Never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    /// Host that cannot be used as an endpoint.
    #[error("Invalid host '{address}': {reason}")]
    InvalidHost {
        /// Configured host.
        address: String,
        /// What is wrong with it.
        reason: String,
    },

    /// Port that cannot be used as an endpoint.
    #[error("Invalid port {port}: {reason}")]
    InvalidPort {
        /// Configured port.
        port: u16,
        /// What is wrong with it.
        reason: String,
    },

    /// A setting that must be present is empty.
    #[error("Missing required field: {field}")]
    MissingField {
        /// Setting name.
        field: String,
    },

    /// Data type name outside the supported set.
    #[error("Unknown data type '{data_type}' (expected uint16, int16, uint32, int32, float32 or string)")]
    UnknownDataType {
        /// Rejected name.
        data_type: String,
    },

    /// Text registers declared without a register count.
    #[error("Data type '{data_type}' requires an explicit register quantity")]
    QuantityRequired {
        /// Data type name.
        data_type: String,
    },

    /// One or more register descriptors are malformed.
    #[error("Invalid register map: {}", errors.join("; "))]
    InvalidRegisterMap {
        /// One entry per violation.
        errors: Vec<String>,
    },
}

impl ConfigurationError {
    /// Unusable host.
    pub fn invalid_host(address: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidHost {
            address: address.into(),
            reason: reason.into(),
        }
    }

    /// Unusable port.
    pub fn invalid_port(port: u16, reason: impl Into<String>) -> Self {
        Self::InvalidPort {
            port,
            reason: reason.into(),
        }
    }

    /// Empty required setting.
    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::MissingField {
            field: field.into(),
        }
    }

    /// Unsupported data type name.
    pub fn unknown_data_type(data_type: impl Into<String>) -> Self {
        Self::UnknownDataType {
            data_type: data_type.into(),
        }
    }

    /// Text type without a quantity.
    pub fn quantity_required(data_type: impl fmt::Display) -> Self {
        Self::QuantityRequired {
            data_type: data_type.to_string(),
        }
    }
}

// =============================================================================
// TimeoutError
// =============================================================================

/// A deadline that expired.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimeoutError {
    /// Opening the link took too long.
    #[error("Connect timed out after {duration:?}")]
    Connection {
        /// Configured connect timeout.
        duration: Duration,
    },

    /// A register read took too long.
    #[error("Register read timed out after {duration:?}")]
    Read {
        /// Configured operation timeout.
        duration: Duration,
    },
}

impl TimeoutError {
    /// Connect deadline.
    pub fn connection(duration: Duration) -> Self {
        Self::Connection { duration }
    }

    /// Read deadline.
    pub fn read(duration: Duration) -> Self {
        Self::Read { duration }
    }

    /// The deadline that expired.
    pub fn duration(&self) -> Duration {
        match self {
            Self::Connection { duration } | Self::Read { duration } => *duration,
        }
    }
}

// =============================================================================
// ReadError
// =============================================================================

/// Failure of a single register read, as returned by the fault-tolerant reader
/// and the register mapper.
///
/// A `ReadError` is a value, not an exception: callers decide whether to
/// omit the field, aggregate it into a warning, or fall back to another
/// source.
#[derive(Debug, Error)]
pub enum ReadError {
    /// The transport call failed.
    #[error("Failed to read {quantity} register(s) at {address} (consecutive failures: {consecutive_failures}): {source}")]
    Transport {
        /// Start address.
        address: u16,
        /// Number of registers requested.
        quantity: u16,
        /// Failure count of the link after recording this failure.
        consecutive_failures: u32,
        /// Underlying transport error.
        #[source]
        source: ModbusError,
    },

    /// The operation is not offered by the transport contract.
    #[error("{operation} is not supported (address {address})")]
    NotSupported {
        /// Operation name.
        operation: &'static str,
        /// Requested start address.
        address: u16,
    },

    /// The bytes could not be decoded as the configured data type.
    #[error("Failed to decode register {address}: {source}")]
    Conversion {
        /// Register address.
        address: u16,
        /// Underlying conversion error.
        #[source]
        source: ConversionError,
    },

    /// The decoded value is a "not available" sentinel.
    #[error("Register {address} returned an invalid value: {raw}")]
    InvalidValue {
        /// Register address.
        address: u16,
        /// The raw decoded value, before scaling.
        raw: String,
    },

    /// The descriptor cannot be read as configured.
    #[error("Register {address} is misconfigured: {source}")]
    Configuration {
        /// Register address.
        address: u16,
        /// Underlying configuration error.
        #[source]
        source: ConfigurationError,
    },
}

impl ReadError {
    /// Operation the transport does not offer.
    pub fn not_supported(operation: &'static str, address: u16) -> Self {
        Self::NotSupported { operation, address }
    }

    /// Register address involved.
    pub fn address(&self) -> u16 {
        match self {
            Self::Transport { address, .. }
            | Self::NotSupported { address, .. }
            | Self::Conversion { address, .. }
            | Self::InvalidValue { address, .. }
            | Self::Configuration { address, .. } => *address,
        }
    }

    /// Returns `true` if re-reading the register may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport { source, .. } => source.is_retryable(),
            Self::InvalidValue { .. } => true,
            Self::NotSupported { .. } | Self::Conversion { .. } | Self::Configuration { .. } => {
                false
            }
        }
    }
}

/// Result of a transport or connector call.
pub type ModbusResult<T> = Result<T, ModbusError>;

/// Outcome of a single fault-tolerant register read.
pub type ReadResult<T> = Result<T, ReadError>;

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_failures_are_retryable_except_fatal_io() {
        assert!(ConnectionError::refused("10.0.0.7", 502).is_retryable());
        assert!(ConnectionError::timed_out("10.0.0.7", 502, Duration::from_secs(5)).is_retryable());
        assert!(ConnectionError::NotConnected.is_retryable());

        let fatal_io = io::Error::new(io::ErrorKind::PermissionDenied, "denied");
        assert!(!ConnectionError::io("open socket", fatal_io).is_retryable());
    }

    #[test]
    fn test_exception_message_names_the_code() {
        let message = ModbusError::exception(0x03, 0x02).to_string();
        assert!(message.contains("0x03"), "{message}");
        assert!(message.contains("illegal data address"), "{message}");
        assert_eq!(exception_name(0x7F), "unknown exception");
    }

    #[test]
    fn test_only_transient_exceptions_retry() {
        assert!(ProtocolError::exception(0x03, 0x06).is_retryable());
        assert!(!ProtocolError::exception(0x03, 0x02).is_retryable());
    }

    #[test]
    fn test_category_labels() {
        assert_eq!(ModbusError::not_connected().category(), "connection");
        assert_eq!(ModbusError::exception(0x03, 0x02).category(), "protocol");
        assert_eq!(ModbusError::read_timeout(Duration::from_secs(1)).category(), "timeout");
        let config = ModbusError::configuration(ConfigurationError::missing_field("host"));
        assert_eq!(config.category(), "configuration");
        assert!(!config.is_retryable());
    }

    #[test]
    fn test_register_map_error_lists_every_problem() {
        let error = ConfigurationError::InvalidRegisterMap {
            errors: vec!["power: address must be >= 1".into(), "name: quantity required".into()],
        };
        let message = error.to_string();
        assert!(message.contains("power: address must be >= 1"));
        assert!(message.contains("name: quantity required"));
    }

    #[test]
    fn test_read_error_keeps_address_and_source() {
        let error = ReadError::Transport {
            address: 30775,
            quantity: 2,
            consecutive_failures: 3,
            source: ModbusError::read_timeout(Duration::from_secs(2)),
        };
        assert_eq!(error.address(), 30775);
        assert!(error.is_retryable());
        assert!(error.to_string().contains("consecutive failures: 3"));
        assert!(std::error::Error::source(&error).is_some());

        let unsupported = ReadError::not_supported("read_input_registers", 10);
        assert!(!unsupported.is_retryable());
        assert_eq!(unsupported.address(), 10);
    }
}
