// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Polling runtime.
//!
//! Builds one driver per configured device and runs each in its own task:
//!
//! ```text
//!   ┌──────────────┐  tick   ┌──────────────┐  records  ┌───────────────┐
//!   │ poll_device  │ ──────▶ │ DeviceDriver │ ────────▶ │ TelemetrySink │
//!   │ (per device) │ ◀────── │ update_data  │           └───────────────┘
//!   └──────┬───────┘ backoff └──────────────┘
//!          │ cancelled()
//!   ┌──────┴──────────────┐
//!   │ ShutdownCoordinator │ ◀── SIGTERM / SIGINT
//!   └─────────────────────┘
//! ```
//!
//! A battery shares its inverter's link, so inverters are built first.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, info_span, warn, Instrument};

use gridlink_config::{load_config, DeviceConfig, GridlinkConfig, SinkKind, TelemetryConfig};
use gridlink_devices::{
    ApplianceStore, BatteryDriver, BroadcastSink, DeviceDriver, DeviceIdentity, DeviceLink,
    DeviceState, DriverContext, InMemoryApplianceStore, InverterDriver, LoggingSink, MeterDriver,
    TelemetryMessage, TelemetrySink,
};
use gridlink_modbus::client::{RetryConfig, RetryDecision, TcpConnector};
use gridlink_modbus::TransportConnector;

use crate::error::{BinError, BinResult};
use crate::shutdown::{ShutdownCoordinator, ShutdownToken};

// =============================================================================
// Driver Construction
// =============================================================================

/// Builds a disconnected driver for every configured device.
///
/// Inverters come first so each battery can take its inverter's link.
///
/// # Errors
///
/// Fails on an invalid register map or a battery whose inverter is missing.
pub fn build_drivers(
    config: &GridlinkConfig,
    context: &DriverContext,
) -> BinResult<Vec<Box<dyn DeviceDriver>>> {
    let mut drivers: Vec<Box<dyn DeviceDriver>> = Vec::with_capacity(config.devices.len());
    let mut inverter_links: HashMap<&str, Arc<DeviceLink>> = HashMap::new();

    for device in &config.devices {
        if let DeviceConfig::Inverter(inverter) = device {
            let driver = InverterDriver::new(
                identity_of(device),
                inverter.connection.clone(),
                inverter.registers.clone(),
                context,
            )?;
            inverter_links.insert(inverter.id.as_str(), driver.link());
            drivers.push(Box::new(driver));
        }
    }

    for device in &config.devices {
        if let DeviceConfig::Meter(meter) = device {
            let driver = MeterDriver::new(
                identity_of(device),
                meter.connection.clone(),
                meter.registers.clone(),
                context,
            )?;
            drivers.push(Box::new(driver));
        }
    }

    for device in &config.devices {
        if let DeviceConfig::Battery(battery) = device {
            let link = inverter_links
                .get(battery.inverter.as_str())
                .cloned()
                .ok_or_else(|| {
                    BinError::config(format!(
                        "battery '{}' references unknown inverter '{}'",
                        battery.id, battery.inverter
                    ))
                })?;
            let driver =
                BatteryDriver::new(identity_of(device), link, battery.registers.clone(), context)?;
            drivers.push(Box::new(driver));
        }
    }

    Ok(drivers)
}

fn identity_of(device: &DeviceConfig) -> DeviceIdentity {
    DeviceIdentity::new(device.display_name(), device.network_device_id())
}

/// Creates the configured telemetry sink.
pub fn make_sink(config: &TelemetryConfig) -> Arc<dyn TelemetrySink> {
    match config.sink {
        SinkKind::Log => Arc::new(LoggingSink),
        SinkKind::Broadcast => Arc::new(BroadcastSink::new(config.channel_capacity)),
    }
}

// =============================================================================
// Polling
// =============================================================================

/// Polls one device every `interval` until shutdown.
///
/// Reconnects under `retry` whenever the device is not connected. A failed
/// poll is logged and the next tick tries again. The driver is disconnected
/// before returning.
pub async fn poll_device(
    mut driver: Box<dyn DeviceDriver>,
    sink: Arc<dyn TelemetrySink>,
    interval: Duration,
    retry: RetryConfig,
    mut token: ShutdownToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = ticker.tick() => {}
        }

        if !ensure_connected(driver.as_mut(), &retry, &mut token).await {
            break;
        }

        if let Some(record) = collect(driver.as_ref()).await {
            publish(sink.as_ref(), vec![record]).await;
        }
    }

    driver.disconnect().await;
    info!(device = %driver.name(), "Poller stopped");
}

/// Connects the driver if needed. Returns false when polling should stop.
async fn ensure_connected(
    driver: &mut dyn DeviceDriver,
    retry: &RetryConfig,
    token: &mut ShutdownToken,
) -> bool {
    let mut attempt = 0u32;

    while driver.state() != DeviceState::Connected || !driver.is_connected() {
        if token.is_shutdown_requested() {
            return false;
        }

        let error = match driver.connect().await {
            Ok(()) => {
                info!(device = %driver.name(), kind = %driver.kind(), "Device connected");
                return true;
            }
            Err(error) => error,
        };

        attempt += 1;
        match retry.decide(error.is_retryable(), attempt) {
            RetryDecision::Retry(delay) => {
                warn!(
                    device = %driver.name(),
                    attempt,
                    delay = ?delay,
                    category = error.category(),
                    error = %error,
                    "Connect failed, retrying"
                );
                tokio::select! {
                    _ = token.cancelled() => return false,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            RetryDecision::DoNotRetry => {
                error!(
                    device = %driver.name(),
                    attempt,
                    category = error.category(),
                    error = %error,
                    "Connect failed permanently, giving up on device"
                );
                return false;
            }
        }
    }

    true
}

/// Runs one telemetry cycle, logging failures.
async fn collect(driver: &dyn DeviceDriver) -> Option<TelemetryMessage> {
    match driver.update_data().await {
        Ok(record) => {
            debug!(device = %driver.name(), kind = %record.kind(), "Telemetry collected");
            Some(record)
        }
        Err(error) => {
            warn!(
                device = %driver.name(),
                category = error.category(),
                error = %error,
                "Telemetry cycle failed"
            );
            None
        }
    }
}

async fn publish(sink: &dyn TelemetrySink, records: Vec<TelemetryMessage>) {
    let count = records.len();
    match sink.publish(records).await {
        Ok(delivered) => debug!(records = count, delivered, "Telemetry published"),
        Err(error) => warn!(records = count, error = %error, "Failed to publish telemetry"),
    }
}

/// Connects every driver once, collects one record each and disconnects.
///
/// Devices that fail to connect are logged and skipped.
pub async fn run_once(
    mut drivers: Vec<Box<dyn DeviceDriver>>,
    sink: &dyn TelemetrySink,
) -> Vec<TelemetryMessage> {
    for driver in drivers.iter_mut() {
        if let Err(error) = driver.connect().await {
            warn!(
                device = %driver.name(),
                category = error.category(),
                error = %error,
                "Skipping device that failed to connect"
            );
        }
    }

    let mut records = Vec::with_capacity(drivers.len());
    for driver in &drivers {
        if driver.state() == DeviceState::Connected {
            if let Some(record) = collect(driver.as_ref()).await {
                records.push(record);
            }
        }
    }

    if !records.is_empty() {
        publish(sink, records.clone()).await;
    }

    // Batteries were built last and go first, before the inverter link they share.
    for driver in drivers.iter_mut().rev() {
        driver.disconnect().await;
    }

    records
}

// =============================================================================
// GridlinkRuntime
// =============================================================================

/// Owns the configuration and collaborators for one polling session.
pub struct GridlinkRuntime {
    config: Arc<GridlinkConfig>,
    context: DriverContext,
    sink: Arc<dyn TelemetrySink>,
    shutdown: ShutdownCoordinator,
}

impl GridlinkRuntime {
    /// Creates a runtime.
    pub fn new(config: GridlinkConfig, context: DriverContext, sink: Arc<dyn TelemetrySink>) -> Self {
        Self {
            config: Arc::new(config),
            context,
            sink,
            shutdown: ShutdownCoordinator::new(),
        }
    }

    /// The loaded configuration.
    pub fn config(&self) -> &GridlinkConfig {
        &self.config
    }

    /// Handle that stops [`run`](Self::run) when shutdown is initiated.
    pub fn shutdown_handle(&self) -> ShutdownCoordinator {
        self.shutdown.clone()
    }

    /// Polls every device until a shutdown signal arrives or all pollers stop.
    pub async fn run(self) -> BinResult<()> {
        info!(
            version = crate::VERSION,
            site = %self.config.site.id,
            devices = self.config.devices.len(),
            "Starting gridlink"
        );

        let drivers = build_drivers(&self.config, &self.context)?;
        if drivers.is_empty() {
            warn!("No devices configured, nothing to poll");
            return Ok(());
        }

        let interval = self.config.polling.interval;
        let retry = RetryConfig::unlimited(self.config.reconnect.clone().into());

        let mut pollers = JoinSet::new();
        for driver in drivers {
            let span = info_span!("poller", device = %driver.name(), kind = %driver.kind());
            pollers.spawn(
                poll_device(
                    driver,
                    Arc::clone(&self.sink),
                    interval,
                    retry.clone(),
                    self.shutdown.token(),
                )
                .instrument(span),
            );
        }
        info!(pollers = pollers.len(), interval = ?interval, "gridlink is running");

        let signal = self.shutdown.clone();
        let outcome = tokio::select! {
            result = signal.wait_for_signal() => result,
            _ = join_all(&mut pollers) => {
                warn!("All pollers stopped");
                Ok(())
            }
        };

        self.shutdown.initiate_shutdown();
        join_all(&mut pollers).await;
        info!("gridlink shutdown complete");

        outcome
    }

    /// Polls every device once and returns the records.
    pub async fn run_once(self) -> BinResult<Vec<TelemetryMessage>> {
        let drivers = build_drivers(&self.config, &self.context)?;
        let device_count = drivers.len();
        let records = run_once(drivers, self.sink.as_ref()).await;

        if device_count > 0 && records.is_empty() {
            return Err(BinError::runtime("no device produced telemetry"));
        }
        Ok(records)
    }
}

async fn join_all(pollers: &mut JoinSet<()>) {
    while let Some(result) = pollers.join_next().await {
        if let Err(e) = result {
            error!(error = %e, "Poller task failed");
        }
    }
}

// =============================================================================
// RuntimeBuilder
// =============================================================================

/// Builder for [`GridlinkRuntime`].
///
/// Defaults: TCP connector, in-memory appliance store, sink from the config.
pub struct RuntimeBuilder {
    config_path: Option<PathBuf>,
    config: Option<GridlinkConfig>,
    connector: Option<Arc<dyn TransportConnector>>,
    store: Option<Arc<dyn ApplianceStore>>,
    sink: Option<Arc<dyn TelemetrySink>>,
    sink_kind: Option<SinkKind>,
}

impl RuntimeBuilder {
    /// Creates a new runtime builder.
    pub fn new() -> Self {
        Self {
            config_path: None,
            config: None,
            connector: None,
            store: None,
            sink: None,
            sink_kind: None,
        }
    }

    /// Sets the configuration file path.
    pub fn config_path(mut self, path: impl AsRef<Path>) -> Self {
        self.config_path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Sets the configuration directly.
    pub fn config(mut self, config: GridlinkConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Replaces the TCP connector.
    pub fn connector(mut self, connector: Arc<dyn TransportConnector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Replaces the in-memory appliance store.
    pub fn store(mut self, store: Arc<dyn ApplianceStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Uses `sink` instead of building one from the config.
    pub fn sink(mut self, sink: Arc<dyn TelemetrySink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Overrides the configured sink kind.
    pub fn sink_kind(mut self, kind: SinkKind) -> Self {
        self.sink_kind = Some(kind);
        self
    }

    /// Builds the runtime.
    pub fn build(self) -> BinResult<GridlinkRuntime> {
        let mut config = match self.config {
            Some(cfg) => cfg,
            None => {
                let path = self
                    .config_path
                    .ok_or_else(|| BinError::config("No configuration provided"))?;

                load_config(&path).map_err(|e| {
                    BinError::from(e).with_context(format!("failed to load {}", path.display()))
                })?
            }
        };

        if let Some(kind) = self.sink_kind {
            config.telemetry.sink = kind;
        }

        let sink = self.sink.unwrap_or_else(|| make_sink(&config.telemetry));
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(InMemoryApplianceStore::new()));
        let connector = self.connector.unwrap_or_else(|| Arc::new(TcpConnector));

        let context = DriverContext::new(store, connector)
            .with_health(config.health)
            .with_resolution(config.polling.resolution.clone());

        Ok(GridlinkRuntime::new(config, context, sink))
    }
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use gridlink_config::{ConfigFormat, ConfigLoader};
    use gridlink_modbus::client::ExponentialBackoff;
    use gridlink_modbus::{ConnectionError, ModbusError, ModbusResult, ModbusTcpConfig, RegisterTransport};

    const SITE: &str = r#"
devices:
  - kind: battery
    id: bat-1
    inverter: inv-1
    network_device_id: "aa:bb:cc"
    registers:
      soc: { address: 30845, data_type: uint32, required: true }
  - kind: meter
    id: meter-1
    network_device_id: "dd:ee:ff"
    connection: { host: "127.0.0.1", port: 1502 }
    registers:
      grid_power: { address: 30865, data_type: int32 }
  - kind: inverter
    id: inv-1
    network_device_id: "aa:bb:cc"
    connection: { host: "127.0.0.1", port: 1502 }
    registers:
      power: { address: 30775, data_type: int32 }
"#;

    struct RefusingConnector;

    #[async_trait]
    impl TransportConnector for RefusingConnector {
        async fn connect(&self, config: &ModbusTcpConfig) -> ModbusResult<Arc<dyn RegisterTransport>> {
            Err(ModbusError::connection(ConnectionError::refused(
                config.host.clone(),
                config.port,
            )))
        }
    }

    fn site_config() -> GridlinkConfig {
        ConfigLoader::new()
            .with_env_vars(false)
            .load_from_str(SITE, ConfigFormat::Yaml)
            .unwrap()
    }

    fn context() -> DriverContext {
        DriverContext::new(
            Arc::new(InMemoryApplianceStore::new()),
            Arc::new(RefusingConnector),
        )
    }

    #[test]
    fn test_build_drivers_orders_inverters_first() {
        let drivers = build_drivers(&site_config(), &context()).unwrap();
        let names: Vec<&str> = drivers.iter().map(|d| d.name()).collect();
        assert_eq!(names, ["inv-1", "meter-1", "bat-1"]);
        assert!(drivers.iter().all(|d| d.state() == DeviceState::Disconnected));
    }

    #[test]
    fn test_build_drivers_rejects_unknown_inverter() {
        let mut config = site_config();
        config.devices.retain(|d| !matches!(d, DeviceConfig::Inverter(_)));
        assert!(build_drivers(&config, &context()).is_err());
    }

    #[tokio::test]
    async fn test_run_once_skips_unreachable_devices() {
        let drivers = build_drivers(&site_config(), &context()).unwrap();
        let records = run_once(drivers, &LoggingSink).await;
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn test_runtime_run_once_fails_without_telemetry() {
        let runtime = RuntimeBuilder::new()
            .config(site_config())
            .connector(Arc::new(RefusingConnector))
            .build()
            .unwrap();
        assert!(matches!(runtime.run_once().await, Err(BinError::Runtime(_))));
    }

    #[tokio::test]
    async fn test_poll_device_stops_on_shutdown() {
        let mut drivers = build_drivers(&site_config(), &context()).unwrap();
        let driver = drivers.remove(0);
        let coordinator = ShutdownCoordinator::new();
        let retry = RetryConfig::unlimited(
            ExponentialBackoff::new(Duration::from_millis(5), Duration::from_millis(20)).into(),
        );

        let poller = tokio::spawn(poll_device(
            driver,
            Arc::new(LoggingSink),
            Duration::from_millis(10),
            retry,
            coordinator.token(),
        ));

        tokio::time::sleep(Duration::from_millis(50)).await;
        coordinator.initiate_shutdown();

        tokio::time::timeout(Duration::from_secs(1), poller)
            .await
            .expect("poller should stop after shutdown")
            .unwrap();
    }

    #[tokio::test]
    async fn test_run_without_devices_returns() {
        let runtime = RuntimeBuilder::new()
            .config(GridlinkConfig::default())
            .build()
            .unwrap();
        assert!(runtime.run().await.is_ok());
    }

    #[test]
    fn test_runtime_builder_requires_config() {
        assert!(RuntimeBuilder::new().build().is_err());
    }

    #[test]
    fn test_runtime_builder_sink_override() {
        let runtime = RuntimeBuilder::new()
            .config(GridlinkConfig::default())
            .sink_kind(SinkKind::Broadcast)
            .build()
            .unwrap();
        assert_eq!(runtime.config().telemetry.sink, SinkKind::Broadcast);
    }
}
