//! btleplug implementation of the hublink `Transport`

use std::collections::HashMap;

use async_trait::async_trait;
use btleplug::api::{Central, Characteristic, Manager as _, Peripheral as _, ScanFilter};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::stream::StreamExt;
use hublink_core::{
    DiscoveredDevice, Handle, NotificationCallback, Transport, TransportError, TransportResult,
};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::BleTransportConfig;

// ----------------------------------------------------------------------------
// Scan Cache
// ----------------------------------------------------------------------------

/// Peripherals reported by the most recent scan, keyed by address
#[derive(Debug)]
struct ScanCache<P> {
    entries: HashMap<String, P>,
}

impl<P: Clone> ScanCache<P> {
    fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    fn clear(&mut self) {
        self.entries.clear();
    }

    fn insert(&mut self, address: &str, peripheral: P) {
        self.entries.insert(address.to_uppercase(), peripheral);
    }

    fn get(&self, address: &str) -> Option<P> {
        self.entries.get(&address.to_uppercase()).cloned()
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

// ----------------------------------------------------------------------------
// Transport
// ----------------------------------------------------------------------------

/// Central-mode BLE client for a single hub
pub struct BtleplugTransport {
    config: BleTransportConfig,
    adapter: Option<Adapter>,
    discovered: ScanCache<Peripheral>,
    peripheral: Option<Peripheral>,
    notification_task: Option<JoinHandle<()>>,
}

impl BtleplugTransport {
    pub fn new(config: BleTransportConfig) -> Self {
        Self {
            config,
            adapter: None,
            discovered: ScanCache::new(),
            peripheral: None,
            notification_task: None,
        }
    }

    pub fn config(&self) -> &BleTransportConfig {
        &self.config
    }

    /// Lazily pick the configured adapter
    async fn adapter(&mut self) -> TransportResult<Adapter> {
        if let Some(adapter) = &self.adapter {
            return Ok(adapter.clone());
        }

        let manager = Manager::new()
            .await
            .map_err(|e| TransportError::Adapter(format!("Failed to create BLE manager: {}", e)))?;
        let adapters = manager
            .adapters()
            .await
            .map_err(|e| TransportError::Adapter(format!("Failed to get BLE adapters: {}", e)))?;
        let adapter = adapters
            .into_iter()
            .nth(self.config.adapter_index)
            .ok_or_else(|| {
                TransportError::Adapter(format!(
                    "No BLE adapter at index {}",
                    self.config.adapter_index
                ))
            })?;

        info!("BLE adapter initialized");
        self.adapter = Some(adapter.clone());
        Ok(adapter)
    }

    fn connected_peripheral(&self) -> TransportResult<&Peripheral> {
        self.peripheral.as_ref().ok_or(TransportError::NotConnected)
    }

    fn find_characteristic(&self, characteristic: Uuid) -> TransportResult<Characteristic> {
        self.connected_peripheral()?
            .characteristics()
            .into_iter()
            .find(|c| c.uuid == characteristic)
            .ok_or(TransportError::CharacteristicNotFound(characteristic))
    }

    fn stop_notifications(&mut self) {
        if let Some(task) = self.notification_task.take() {
            task.abort();
        }
    }
}

#[async_trait]
impl Transport for BtleplugTransport {
    async fn discover(&mut self, scan_timeout: Duration) -> TransportResult<Vec<DiscoveredDevice>> {
        let adapter = self.adapter().await?;
        self.discovered.clear();
        let filter = ScanFilter {
            services: self.config.service_filter.clone(),
        };

        adapter
            .start_scan(filter)
            .await
            .map_err(|e| TransportError::Scan(format!("Failed to start BLE scan: {}", e)))?;
        sleep(self.config.listen_window(scan_timeout)).await;
        if let Err(e) = adapter.stop_scan().await {
            warn!("Failed to stop BLE scan: {}", e);
        }

        let peripherals = adapter
            .peripherals()
            .await
            .map_err(|e| TransportError::Scan(format!("Failed to list peripherals: {}", e)))?;

        let mut devices = Vec::with_capacity(peripherals.len());
        for peripheral in peripherals {
            let properties = match peripheral.properties().await {
                Ok(Some(properties)) => properties,
                Ok(None) => continue,
                Err(e) => {
                    debug!("Skipping peripheral without properties: {}", e);
                    continue;
                }
            };
            let address = properties.address.to_string();
            devices.push(DiscoveredDevice::new(address.clone(), properties.local_name));
            self.discovered.insert(&address, peripheral);
        }

        debug!("Scan reported {} peripherals", self.discovered.len());
        Ok(devices)
    }

    async fn connect(&mut self, address: &str) -> TransportResult<()> {
        let peripheral = self
            .discovered
            .get(address)
            .ok_or_else(|| TransportError::Connect(format!("{} was not discovered", address)))?;

        match timeout(self.config.connection_timeout, peripheral.connect()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(TransportError::Connect(e.to_string())),
            Err(_) => {
                return Err(TransportError::Connect(format!(
                    "Timed out after {:?}",
                    self.config.connection_timeout
                )))
            }
        }

        peripheral.discover_services().await.map_err(|e| {
            TransportError::Connect(format!("Failed to discover services: {}", e))
        })?;

        info!("Connected to {}", address);
        self.peripheral = Some(peripheral);
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        match &self.peripheral {
            Some(peripheral) => peripheral.is_connected().await.unwrap_or(false),
            None => false,
        }
    }

    async fn write_characteristic(
        &mut self,
        characteristic: Uuid,
        data: &[u8],
    ) -> TransportResult<()> {
        let target = self.find_characteristic(characteristic)?;
        self.connected_peripheral()?
            .write(&target, data, self.config.write_mode.into())
            .await
            .map_err(|e| TransportError::Write {
                characteristic,
                reason: e.to_string(),
            })?;

        debug!("Wrote {} to {}", hex::encode(data), characteristic);
        Ok(())
    }

    fn get_descriptor(&self, handle: Handle) -> Option<Uuid> {
        self.config.characteristic_for(handle)
    }

    async fn subscribe(
        &mut self,
        characteristic: Uuid,
        callback: NotificationCallback,
    ) -> TransportResult<()> {
        let target = self.find_characteristic(characteristic)?;
        let peripheral = self.connected_peripheral()?;

        peripheral
            .subscribe(&target)
            .await
            .map_err(|e| TransportError::Subscribe(e.to_string()))?;
        let mut notifications = peripheral.notifications().await.map_err(|e| {
            TransportError::Subscribe(format!("Failed to get notifications stream: {}", e))
        })?;

        self.stop_notifications();
        let config = self.config.clone();
        self.notification_task = Some(tokio::spawn(async move {
            while let Some(notification) = notifications.next().await {
                let handle = config.handle_for(notification.uuid);
                callback(handle, notification.value);
            }
            debug!("Notification stream ended");
        }));
        Ok(())
    }

    async fn disconnect(&mut self) -> TransportResult<()> {
        self.stop_notifications();
        let Some(peripheral) = self.peripheral.take() else {
            return Ok(());
        };
        peripheral
            .disconnect()
            .await
            .map_err(|e| TransportError::Disconnect(e.to_string()))?;
        info!("Disconnected from peripheral");
        Ok(())
    }
}

impl Drop for BtleplugTransport {
    fn drop(&mut self) {
        self.stop_notifications();
    }
}
