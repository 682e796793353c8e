// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Mock Implementations
//!
//! Scripted collaborators for exercising drivers without a device:
//!
//! - [`MockTransport`]: a register table with per-address failure injection
//! - [`MockConnector`]: hands out mock transports by host, counts connects
//! - [`FailingApplianceStore`]: a store that is always unavailable
//! - [`GatedApplianceStore`]: an in-memory store whose listing waits for a release
//! - [`RecordingSink`]: keeps every published record

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{Notify, Semaphore};

use gridlink_devices::{
    Appliance, ApplianceDraft, ApplianceId, ApplianceStore, InMemoryApplianceStore, SinkError,
    StoreError, TelemetryMessage, TelemetrySink,
};
use gridlink_modbus::{
    ConnectionError, DataConverter, DataType, ModbusError, ModbusResult, ModbusTcpConfig,
    RegisterTransport, TransportConnector,
};

// =============================================================================
// MockTransport
// =============================================================================

/// Holding register table with failure injection and call counters.
#[derive(Debug, Default)]
pub struct MockTransport {
    registers: Mutex<HashMap<u16, u16>>,
    failing: Mutex<HashSet<u16>>,
    fail_all: AtomicBool,
    open: AtomicBool,
    read_count: AtomicU64,
    disconnect_count: AtomicU64,
}

impl MockTransport {
    /// Creates an empty, open transport.
    pub fn new() -> Self {
        let transport = Self::default();
        transport.open.store(true, Ordering::SeqCst);
        transport
    }

    /// Creates a shareable transport.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Writes raw registers starting at `address`.
    pub fn set_registers(&self, address: u16, values: &[u16]) {
        let mut registers = self.registers.lock();
        for (offset, value) in values.iter().enumerate() {
            registers.insert(address + offset as u16, *value);
        }
    }

    /// Encodes an unscaled number at `address`.
    pub fn set_number(&self, address: u16, value: f64, data_type: DataType) {
        let encoded = DataConverter::encode_number(value, data_type)
            .expect("fixture value must fit its data type");
        self.set_registers(address, &encoded);
    }

    /// Encodes text into `quantity` registers at `address`.
    pub fn set_text(&self, address: u16, text: &str, quantity: u16) {
        self.set_registers(address, &DataConverter::encode_text(text, quantity));
    }

    /// Makes every read touching `address` fail.
    pub fn fail_address(&self, address: u16) {
        self.failing.lock().insert(address);
    }

    /// Removes all per-address failures.
    pub fn clear_failures(&self) {
        self.failing.lock().clear();
    }

    /// Makes every read fail (or succeed again).
    pub fn fail_all(&self, fail: bool) {
        self.fail_all.store(fail, Ordering::SeqCst);
    }

    /// Reopens the transport after a disconnect.
    pub fn reopen(&self) {
        self.open.store(true, Ordering::SeqCst);
    }

    /// Whether the transport is open.
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    /// Number of read calls that reached the transport.
    pub fn read_count(&self) -> u64 {
        self.read_count.load(Ordering::SeqCst)
    }

    /// Number of disconnect calls.
    pub fn disconnect_count(&self) -> u64 {
        self.disconnect_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RegisterTransport for MockTransport {
    async fn read_holding_registers(&self, address: u16, count: u16) -> ModbusResult<Vec<u16>> {
        self.read_count.fetch_add(1, Ordering::SeqCst);

        if !self.is_open() {
            return Err(ModbusError::not_connected());
        }
        if self.fail_all.load(Ordering::SeqCst) {
            return Err(ModbusError::read_timeout(Duration::from_millis(100)));
        }

        let failing = self.failing.lock();
        let registers = self.registers.lock();
        (address..address.saturating_add(count))
            .map(|a| match registers.get(&a) {
                Some(value) if !failing.contains(&a) => Ok(*value),
                // Illegal data address
                _ => Err(ModbusError::exception(0x03, 0x02)),
            })
            .collect()
    }

    async fn disconnect(&self) -> ModbusResult<()> {
        self.disconnect_count.fetch_add(1, Ordering::SeqCst);
        self.open.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn display_name(&self) -> String {
        "mock".to_string()
    }
}

// =============================================================================
// MockConnector
// =============================================================================

/// Connector that returns a [`MockTransport`] chosen by host.
pub struct MockConnector {
    default: Arc<MockTransport>,
    hosts: HashMap<String, Arc<MockTransport>>,
    refuse: AtomicBool,
    connect_count: AtomicU64,
}

impl MockConnector {
    /// Every host gets `transport`.
    pub fn new(transport: Arc<MockTransport>) -> Self {
        Self {
            default: transport,
            hosts: HashMap::new(),
            refuse: AtomicBool::new(false),
            connect_count: AtomicU64::new(0),
        }
    }

    /// Routes `host` to its own transport.
    pub fn with_host(mut self, host: impl Into<String>, transport: Arc<MockTransport>) -> Self {
        self.hosts.insert(host.into(), transport);
        self
    }

    /// Refuses (or accepts again) every connection.
    pub fn refuse(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }

    /// Number of connect attempts.
    pub fn connect_count(&self) -> u64 {
        self.connect_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TransportConnector for MockConnector {
    async fn connect(&self, config: &ModbusTcpConfig) -> ModbusResult<Arc<dyn RegisterTransport>> {
        self.connect_count.fetch_add(1, Ordering::SeqCst);

        if self.refuse.load(Ordering::SeqCst) {
            return Err(ModbusError::connection(ConnectionError::refused(
                config.host.clone(),
                config.port,
            )));
        }

        let transport = self.hosts.get(&config.host).unwrap_or(&self.default);
        transport.reopen();
        Ok(Arc::clone(transport) as Arc<dyn RegisterTransport>)
    }
}

// =============================================================================
// Stores and sinks
// =============================================================================

/// Appliance store that is always unavailable.
#[derive(Debug, Default)]
pub struct FailingApplianceStore;

#[async_trait]
impl ApplianceStore for FailingApplianceStore {
    async fn list(&self) -> Result<Vec<Appliance>, StoreError> {
        Err(StoreError::Unavailable("store offline".to_string()))
    }

    async fn save(
        &self,
        _draft: ApplianceDraft,
        _id: Option<&ApplianceId>,
    ) -> Result<Appliance, StoreError> {
        Err(StoreError::Unavailable("store offline".to_string()))
    }
}

/// In-memory store whose `list` blocks until [`release`](Self::release).
///
/// Holds a driver inside its connect sequence for as long as a test needs.
#[derive(Debug)]
pub struct GatedApplianceStore {
    inner: InMemoryApplianceStore,
    entered: Notify,
    gate: Semaphore,
}

impl GatedApplianceStore {
    /// Creates a closed gate over an empty store.
    pub fn new() -> Self {
        Self {
            inner: InMemoryApplianceStore::new(),
            entered: Notify::new(),
            gate: Semaphore::new(0),
        }
    }

    /// Waits until a caller is blocked in `list`.
    pub async fn wait_entered(&self) {
        self.entered.notified().await;
    }

    /// Lets every pending and future `list` call through.
    pub fn release(&self) {
        self.gate.close();
    }
}

impl Default for GatedApplianceStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ApplianceStore for GatedApplianceStore {
    async fn list(&self) -> Result<Vec<Appliance>, StoreError> {
        self.entered.notify_one();
        // A closed semaphore fails every acquire, which is the open gate.
        let _ = self.gate.acquire().await;
        self.inner.list().await
    }

    async fn save(
        &self,
        draft: ApplianceDraft,
        id: Option<&ApplianceId>,
    ) -> Result<Appliance, StoreError> {
        self.inner.save(draft, id).await
    }
}

/// Sink that keeps every record it receives.
#[derive(Debug, Default)]
pub struct RecordingSink {
    records: Mutex<Vec<TelemetryMessage>>,
}

impl RecordingSink {
    /// Creates an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Copies of every record published so far.
    pub fn records(&self) -> Vec<TelemetryMessage> {
        self.records.lock().clone()
    }
}

#[async_trait]
impl TelemetrySink for RecordingSink {
    async fn publish(&self, records: Vec<TelemetryMessage>) -> Result<usize, SinkError> {
        let count = records.len();
        self.records.lock().extend(records);
        Ok(count)
    }
}
