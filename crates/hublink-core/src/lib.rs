//! Synchronous driver for BLE hubs behind an asynchronous transport
//!
//! Client code issues blocking-style writes and registers one notification
//! handler. Underneath, a connection bridge owns the transport on its own
//! execution unit, and a dispatch unit delivers notifications in order.
//!
//! ## Architecture
//!
//! - [`matcher`] - Picks the target device out of a discovery scan
//! - [`transport`] - Contract a BLE backend must satisfy
//! - [`channel`] - Request and response queues between the units
//! - [`bridge`] - Connection lifecycle state machine and write drain loop
//! - [`dispatch`] - Notification dispatch loop
//! - [`driver`] - Public synchronous façade
//!
//! ## Usage
//!
//! ```rust,no_run
//! use hublink_core::{Driver, DriverConfig, MatchTarget, Transport};
//!
//! fn run<T: Transport>(transport: T) -> hublink_core::Result<()> {
//!     let config = DriverConfig::new().with_target(MatchTarget::by_name("Move Hub"));
//!     let mut driver = Driver::new(transport, config);
//!
//!     driver.set_notify_handler(|handle, payload| {
//!         println!("{:#04x}: {:02x?}", handle, payload);
//!     });
//!     driver.enable_notifications()?;
//!
//!     driver.write(0x0e, vec![0x05, 0x00, 0x01, 0x01, 0x05])?;
//!     driver.disconnect();
//!     Ok(())
//! }
//! ```

pub mod bridge;
pub mod channel;
pub mod config;
pub mod dispatch;
pub mod driver;
pub mod errors;
pub mod matcher;
pub mod transport;
pub mod types;

// ----------------------------------------------------------------------------
// Public API
// ----------------------------------------------------------------------------

pub use bridge::{BridgeStatus, ConnectionBridge};
pub use channel::{
    request_channel, response_channel, RequestReceiver, RequestSender, ResponseReceiver,
    ResponseSender,
};
pub use config::{DriverConfig, DEFAULT_KEEPALIVE};
pub use dispatch::{run_dispatch, DispatchExit, NotifyHandler};
pub use driver::Driver;
pub use errors::{HublinkError, Result, TransportError};
pub use matcher::{find_first_match, matches};
pub use transport::{
    NotificationCallback, Transport, TransportResult, DEFAULT_CHARACTERISTIC_UUID,
};
pub use types::{
    ConnectionState, DiscoveredDevice, Handle, MatchTarget, NotificationEvent, PendingWrite,
};
