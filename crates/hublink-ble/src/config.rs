//! BLE transport configuration

use std::collections::BTreeMap;
use std::time::Duration;

use btleplug::api::WriteType;
use hublink_core::{Handle, DEFAULT_CHARACTERISTIC_UUID};
use uuid::Uuid;

use crate::protocol::{HUB_NOTIFY_HANDLE, HUB_SERVICE_UUID};

// ----------------------------------------------------------------------------
// Write Mode
// ----------------------------------------------------------------------------

/// GATT write flavour used for every characteristic write
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum WriteMode {
    WithResponse,
    WithoutResponse,
}

impl From<WriteMode> for WriteType {
    fn from(mode: WriteMode) -> Self {
        match mode {
            WriteMode::WithResponse => WriteType::WithResponse,
            WriteMode::WithoutResponse => WriteType::WithoutResponse,
        }
    }
}

// ----------------------------------------------------------------------------
// Configuration
// ----------------------------------------------------------------------------

/// Configuration for the btleplug transport
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct BleTransportConfig {
    /// Index into the adapters reported by the platform manager
    pub adapter_index: usize,
    /// Restrict scans to devices advertising these services; empty scans all
    pub service_filter: Vec<Uuid>,
    /// Part of each scan window kept back for stopping the scan and reading
    /// peripheral properties
    pub scan_margin: Duration,
    /// Maximum time to wait for a connection
    pub connection_timeout: Duration,
    /// Characteristic registered for each application handle
    pub characteristics: BTreeMap<Handle, Uuid>,
    /// Handle reported for notifications from unregistered characteristics
    pub notify_handle: Handle,
    pub write_mode: WriteMode,
}

impl Default for BleTransportConfig {
    fn default() -> Self {
        Self {
            adapter_index: 0,
            service_filter: Vec::new(),
            scan_margin: Duration::from_millis(250),
            connection_timeout: Duration::from_secs(10),
            characteristics: BTreeMap::new(),
            notify_handle: HUB_NOTIFY_HANDLE,
            write_mode: WriteMode::WithoutResponse,
        }
    }
}

impl BleTransportConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_adapter_index(mut self, index: usize) -> Self {
        self.adapter_index = index;
        self
    }

    pub fn with_service_filter(mut self, services: Vec<Uuid>) -> Self {
        self.service_filter = services;
        self
    }

    /// Only report devices advertising the LEGO hub service
    pub fn with_hub_service_filter(mut self) -> Self {
        self.service_filter = vec![HUB_SERVICE_UUID];
        self
    }

    pub fn with_scan_margin(mut self, margin: Duration) -> Self {
        self.scan_margin = margin;
        self
    }

    /// How long to listen for advertisements within a scan bounded by `limit`
    pub fn listen_window(&self, limit: Duration) -> Duration {
        limit.saturating_sub(self.scan_margin)
    }

    pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    /// Route writes on `handle` to `characteristic`
    pub fn with_characteristic(mut self, handle: Handle, characteristic: Uuid) -> Self {
        self.characteristics.insert(handle, characteristic);
        self
    }

    pub fn with_notify_handle(mut self, handle: Handle) -> Self {
        self.notify_handle = handle;
        self
    }

    pub fn with_write_mode(mut self, mode: WriteMode) -> Self {
        self.write_mode = mode;
        self
    }

    /// Characteristic registered for `handle`
    pub fn characteristic_for(&self, handle: Handle) -> Option<Uuid> {
        self.characteristics.get(&handle).copied()
    }

    /// Handle to report for a notification from `characteristic`
    ///
    /// The hub characteristic and anything unregistered map to
    /// `notify_handle`.
    pub fn handle_for(&self, characteristic: Uuid) -> Handle {
        if characteristic == DEFAULT_CHARACTERISTIC_UUID {
            return self.notify_handle;
        }
        self.characteristics
            .iter()
            .find(|(_, uuid)| **uuid == characteristic)
            .map(|(handle, _)| *handle)
            .unwrap_or(self.notify_handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BATTERY_LEVEL: Uuid = Uuid::from_u128(0x00002a19_0000_1000_8000_00805f9b34fb);

    #[test]
    fn test_defaults() {
        let config = BleTransportConfig::default();
        assert_eq!(config.notify_handle, 0x0e);
        assert_eq!(config.write_mode, WriteMode::WithoutResponse);
        assert!(config.characteristics.is_empty());
        assert!(config.service_filter.is_empty());
    }

    #[test]
    fn test_hub_service_filter() {
        let config = BleTransportConfig::new().with_hub_service_filter();
        assert_eq!(config.service_filter, vec![HUB_SERVICE_UUID]);
    }

    #[test]
    fn test_listen_window_leaves_margin() {
        let config = BleTransportConfig::new().with_scan_margin(Duration::from_millis(200));
        assert_eq!(
            config.listen_window(Duration::from_secs(1)),
            Duration::from_millis(800)
        );
        assert_eq!(config.listen_window(Duration::from_millis(100)), Duration::ZERO);
    }

    #[test]
    fn test_characteristic_lookup() {
        let config = BleTransportConfig::new().with_characteristic(0x20, BATTERY_LEVEL);
        assert_eq!(config.characteristic_for(0x20), Some(BATTERY_LEVEL));
        assert_eq!(config.characteristic_for(0x0e), None);
    }

    #[test]
    fn test_notification_handle_lookup() {
        let config = BleTransportConfig::new()
            .with_characteristic(0x20, BATTERY_LEVEL)
            .with_notify_handle(0x11);

        assert_eq!(config.handle_for(BATTERY_LEVEL), 0x20);
        assert_eq!(config.handle_for(DEFAULT_CHARACTERISTIC_UUID), 0x11);
        assert_eq!(config.handle_for(Uuid::nil()), 0x11);
    }

    #[test]
    fn test_write_mode_conversion() {
        assert!(matches!(
            WriteType::from(WriteMode::WithResponse),
            WriteType::WithResponse
        ));
        assert!(matches!(
            WriteType::from(WriteMode::WithoutResponse),
            WriteType::WithoutResponse
        ));
    }
}
