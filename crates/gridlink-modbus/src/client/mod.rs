// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Register client layer.
//!
//! - **Transport**: raw `read_holding_registers` contract plus the TCP implementation
//! - **Health**: consecutive failures and recency of last success per link
//! - **Reader**: fault-tolerant reads that record every outcome
//! - **Conversion**: bytes to typed values, scaling, sentinel detection
//! - **Retry**: reconnect backoff used by the poll loop
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      RegisterMapper                             │
//! │                (named register maps, policy)                    │
//! └─────────────────────────────────────────────────────────────────┘
//!                 │                                   │
//!                 ▼                                   ▼
//! ┌───────────────────────────────┐   ┌───────────────────────────┐
//! │     FaultTolerantReader       │──▶│     ConnectionHealth      │
//! │ (ReadResult, never raises)    │   │  (shared per link)        │
//! └───────────────────────────────┘   └───────────────────────────┘
//!                 │
//!                 ▼
//! ┌───────────────────────────────┐   ┌───────────────────────────┐
//! │  dyn RegisterTransport        │   │      DataConverter        │
//! │  (ModbusTcpTransport, mocks)  │   │ (decode / scale / valid)  │
//! └───────────────────────────────┘   └───────────────────────────┘
//! ```

mod conversion;
mod health;
mod reader;
mod retry;
mod tcp;
mod transport;

pub use conversion::{bytes_to_registers, registers_to_bytes, DataConverter, RegisterValue};
pub use health::{
    ConnectionHealth, HealthSnapshot, HealthThresholds, SharedHealth,
    DEFAULT_MAX_CONSECUTIVE_FAILURES, DEFAULT_STALE_AFTER,
};
pub use reader::FaultTolerantReader;
pub use retry::{ExponentialBackoff, RetryConfig, RetryDecision, RetryStrategy};
pub use tcp::{ModbusTcpTransport, TcpConnector};
pub use transport::{RegisterTransport, TransportConnector};
