// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Modbus TCP transport backed by `tokio-modbus`.
//!
//! Framing, transaction ids and exception parsing are handled by
//! `tokio-modbus`; this module only opens the socket, applies timeouts and
//! maps errors into [`ModbusError`].

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tokio_modbus::client::Context as ModbusContext;
use tokio_modbus::prelude::*;
use tokio_modbus::{Error as TokioModbusError, Exception as ExceptionCode};

use crate::error::{ConnectionError, ModbusError, ModbusResult, ProtocolError, TimeoutError};
use crate::types::ModbusTcpConfig;

use super::transport::{RegisterTransport, TransportConnector};

/// Function code of "read holding registers".
const READ_HOLDING_REGISTERS: u8 = 0x03;

// =============================================================================
// ModbusTcpTransport
// =============================================================================

/// An open Modbus TCP link.
///
/// # Example
///
/// ```rust,ignore
/// use gridlink_modbus::client::ModbusTcpTransport;
/// use gridlink_modbus::ModbusTcpConfig;
///
/// let config = ModbusTcpConfig::builder().host("192.168.1.50").unit_id(3).build()?;
/// let transport = ModbusTcpTransport::connect(config).await?;
/// let words = transport.read_holding_registers(30775, 2).await?;
/// ```
pub struct ModbusTcpTransport {
    config: ModbusTcpConfig,
    /// `None` once disconnected.
    context: Mutex<Option<ModbusContext>>,
}

impl ModbusTcpTransport {
    /// Resolves the host, opens the socket and attaches the unit id.
    pub async fn connect(config: ModbusTcpConfig) -> ModbusResult<Self> {
        config.validate()?;
        let socket_addr = resolve_address(&config).await?;

        let connect_future = async {
            let stream = TcpStream::connect(socket_addr)
                .await
                .map_err(|e| map_connect_error(&config, e))?;

            if let Err(e) = stream.set_nodelay(config.tcp_nodelay) {
                tracing::debug!(error = %e, "Failed to set TCP_NODELAY");
            }

            Ok::<_, ModbusError>(tcp::attach_slave(stream, Slave(config.unit_id)))
        };

        let ctx = timeout(config.connect_timeout, connect_future)
            .await
            .map_err(|_| {
                ModbusError::connection(ConnectionError::timed_out(
                    &config.host,
                    config.port,
                    config.connect_timeout,
                ))
            })??;

        tracing::info!(
            host = %config.host,
            port = config.port,
            unit_id = config.unit_id,
            "Connected to Modbus TCP device"
        );

        Ok(Self {
            config,
            context: Mutex::new(Some(ctx)),
        })
    }

    /// Returns the connection parameters.
    pub fn config(&self) -> &ModbusTcpConfig {
        &self.config
    }

    fn map_modbus_error(&self, error: TokioModbusError) -> ModbusError {
        match error {
            TokioModbusError::Transport(io_error) => map_io_error(&self.config, io_error),
            TokioModbusError::Protocol(protocol_error) => ModbusError::protocol(
                ProtocolError::invalid_response(format!("{protocol_error:?}")),
            ),
        }
    }
}

#[async_trait]
impl RegisterTransport for ModbusTcpTransport {
    async fn read_holding_registers(&self, address: u16, count: u16) -> ModbusResult<Vec<u16>> {
        let mut guard = self.context.lock().await;
        let ctx = guard.as_mut().ok_or_else(ModbusError::not_connected)?;

        timeout(
            self.config.operation_timeout,
            ctx.read_holding_registers(address, count),
        )
        .await
        .map_err(|_| ModbusError::timeout(TimeoutError::read(self.config.operation_timeout)))?
        .map_err(|e| self.map_modbus_error(e))?
        .map_err(|code| {
            ModbusError::exception(READ_HOLDING_REGISTERS, exception_code_to_u8(&code))
        })
    }

    async fn disconnect(&self) -> ModbusResult<()> {
        let mut guard = self.context.lock().await;

        if let Some(mut ctx) = guard.take() {
            if let Err(e) = ctx.disconnect().await {
                tracing::warn!(error = %e, "Error disconnecting from Modbus device");
            }
        }

        tracing::debug!(
            host = %self.config.host,
            port = self.config.port,
            "Disconnected from Modbus TCP device"
        );

        Ok(())
    }

    fn display_name(&self) -> String {
        format!(
            "Modbus TCP {}:{} (unit {})",
            self.config.host, self.config.port, self.config.unit_id
        )
    }
}

impl std::fmt::Debug for ModbusTcpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModbusTcpTransport")
            .field("host", &self.config.host)
            .field("port", &self.config.port)
            .field("unit_id", &self.config.unit_id)
            .finish()
    }
}

// =============================================================================
// TcpConnector
// =============================================================================

/// Opens [`ModbusTcpTransport`] links.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnector;

#[async_trait]
impl TransportConnector for TcpConnector {
    async fn connect(&self, config: &ModbusTcpConfig) -> ModbusResult<Arc<dyn RegisterTransport>> {
        let transport = ModbusTcpTransport::connect(config.clone()).await?;
        Ok(Arc::new(transport))
    }
}

// =============================================================================
// Helpers
// =============================================================================

async fn resolve_address(config: &ModbusTcpConfig) -> ModbusResult<SocketAddr> {
    let addr_str = config.socket_addr();

    if let Ok(addr) = addr_str.parse::<SocketAddr>() {
        return Ok(addr);
    }

    let mut addrs = tokio::net::lookup_host(&addr_str).await.map_err(|e| {
        ModbusError::connection(ConnectionError::DnsResolutionFailed {
            hostname: config.host.clone(),
            source: Some(e),
        })
    })?;

    addrs
        .next()
        .ok_or_else(|| ModbusError::connection(ConnectionError::dns_failed(&config.host)))
}

fn map_connect_error(config: &ModbusTcpConfig, error: io::Error) -> ModbusError {
    match error.kind() {
        io::ErrorKind::TimedOut => ModbusError::connection(ConnectionError::timed_out(
            &config.host,
            config.port,
            config.connect_timeout,
        )),
        _ => ModbusError::connection(ConnectionError::refused_with(
            &config.host,
            config.port,
            error,
        )),
    }
}

fn map_io_error(config: &ModbusTcpConfig, error: io::Error) -> ModbusError {
    match error.kind() {
        io::ErrorKind::ConnectionRefused => {
            ModbusError::connection(ConnectionError::refused_with(&config.host, config.port, error))
        }
        io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::BrokenPipe
        | io::ErrorKind::UnexpectedEof => {
            ModbusError::connection(ConnectionError::closed(Some(error.to_string())))
        }
        io::ErrorKind::TimedOut => ModbusError::read_timeout(config.operation_timeout),
        io::ErrorKind::NotConnected => ModbusError::not_connected(),
        _ => ModbusError::connection(ConnectionError::io("Modbus transport error", error)),
    }
}

fn exception_code_to_u8(code: &ExceptionCode) -> u8 {
    match code {
        ExceptionCode::IllegalFunction => 0x01,
        ExceptionCode::IllegalDataAddress => 0x02,
        ExceptionCode::IllegalDataValue => 0x03,
        ExceptionCode::ServerDeviceFailure => 0x04,
        ExceptionCode::Acknowledge => 0x05,
        ExceptionCode::ServerDeviceBusy => 0x06,
        ExceptionCode::MemoryParityError => 0x08,
        ExceptionCode::GatewayPathUnavailable => 0x0A,
        ExceptionCode::GatewayTargetDevice => 0x0B,
        _ => 0xFF,
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn config() -> ModbusTcpConfig {
        ModbusTcpConfig::builder()
            .host("inverter.local")
            .port(1502)
            .unit_id(3)
            .build()
            .unwrap()
    }

    #[test]
    fn test_map_io_error_kinds() {
        let cfg = config();

        let refused = map_io_error(&cfg, io::Error::from(io::ErrorKind::ConnectionRefused));
        assert!(matches!(
            refused,
            ModbusError::Connection(ConnectionError::Refused { port: 1502, .. })
        ));

        let reset = map_io_error(&cfg, io::Error::from(io::ErrorKind::ConnectionReset));
        assert!(matches!(reset, ModbusError::Connection(ConnectionError::Closed { .. })));

        let timed_out = map_io_error(&cfg, io::Error::from(io::ErrorKind::TimedOut));
        assert!(matches!(timed_out, ModbusError::Timeout(TimeoutError::Read { .. })));

        let other = map_io_error(&cfg, io::Error::from(io::ErrorKind::PermissionDenied));
        assert!(!other.is_retryable());
    }

    #[test]
    fn test_exception_code_mapping() {
        assert_eq!(exception_code_to_u8(&ExceptionCode::IllegalDataAddress), 0x02);
        assert_eq!(exception_code_to_u8(&ExceptionCode::ServerDeviceBusy), 0x06);
        assert_eq!(exception_code_to_u8(&ExceptionCode::GatewayTargetDevice), 0x0B);
    }

    #[tokio::test]
    async fn test_connect_rejects_invalid_config() {
        let result = ModbusTcpTransport::connect(ModbusTcpConfig::new("")).await;
        assert!(matches!(result, Err(ModbusError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_connect_to_closed_port_fails() {
        let cfg = ModbusTcpConfig::builder()
            .host("127.0.0.1")
            .port(1)
            .connect_timeout(Duration::from_millis(500))
            .build()
            .unwrap();

        let result = TcpConnector.connect(&cfg).await;
        assert!(matches!(result, Err(ModbusError::Connection(_))));
    }

    #[tokio::test]
    async fn test_resolve_ip_literal() {
        let cfg = ModbusTcpConfig::new("10.0.0.7");
        let addr = resolve_address(&cfg).await.unwrap();
        assert_eq!(addr.port(), 502);
    }
}
