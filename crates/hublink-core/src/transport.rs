//! Transport contract implemented by BLE backends
//!
//! The bridge is the only caller of these methods. Implementations run on the
//! bridge's execution unit and may spawn tasks onto its runtime, but must not
//! invoke notification callbacks from more than one task at a time.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use crate::errors::TransportError;
use crate::types::{DiscoveredDevice, Handle};

// ----------------------------------------------------------------------------
// Hub Characteristic
// ----------------------------------------------------------------------------

/// Hub characteristic used for notifications and as the write fallback
pub const DEFAULT_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0x00001624_1212_EFDE_1623_785FEABCD123);

/// Callback invoked by a transport for every inbound notification
pub type NotificationCallback = Arc<dyn Fn(Handle, Vec<u8>) + Send + Sync>;

pub type TransportResult<T> = std::result::Result<T, TransportError>;

// ----------------------------------------------------------------------------
// Transport Trait
// ----------------------------------------------------------------------------

/// Opaque BLE client driven by a single bridge
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Scan for nearby devices for at most `timeout`
    async fn discover(&mut self, timeout: Duration) -> TransportResult<Vec<DiscoveredDevice>>;

    /// Connect to a device previously reported by `discover`
    async fn connect(&mut self, address: &str) -> TransportResult<()>;

    async fn is_connected(&self) -> bool;

    async fn write_characteristic(
        &mut self,
        characteristic: Uuid,
        data: &[u8],
    ) -> TransportResult<()>;

    /// Characteristic registered for `handle`, if the transport knows one
    fn get_descriptor(&self, handle: Handle) -> Option<Uuid>;

    /// Start delivering notifications from `characteristic` to `callback`
    async fn subscribe(
        &mut self,
        characteristic: Uuid,
        callback: NotificationCallback,
    ) -> TransportResult<()>;

    async fn disconnect(&mut self) -> TransportResult<()>;
}
