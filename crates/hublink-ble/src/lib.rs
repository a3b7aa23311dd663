//! Bluetooth Low Energy transport for the hublink driver
//!
//! This crate implements the `Transport` trait from `hublink-core` on top of
//! btleplug's central mode. It only moves bytes: scanning, connecting,
//! characteristic writes, notification subscription and disconnect.
//!
//! - [`config`] - Adapter selection, handle registrations and write mode
//! - [`protocol`] - Hub GATT constants
//! - [`transport`] - The btleplug-backed transport
//!
//! ## Usage
//!
//! ```rust,no_run
//! use hublink_ble::{BleTransportConfig, BtleplugTransport};
//! use hublink_core::{Driver, DriverConfig, MatchTarget};
//!
//! # fn example() -> hublink_core::Result<()> {
//! let transport = BtleplugTransport::new(BleTransportConfig::default());
//! let config = DriverConfig::new().with_target(MatchTarget::by_name("LEGO Move Hub"));
//!
//! let mut driver = Driver::new(transport, config);
//! driver.set_notify_handler(|handle, payload| {
//!     println!("{:#04x}: {}", handle, hex::encode(payload));
//! });
//! driver.enable_notifications()?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod protocol;
pub mod transport;

pub use config::{BleTransportConfig, WriteMode};
pub use protocol::{HUB_NOTIFY_HANDLE, HUB_SERVICE_UUID};
pub use transport::BtleplugTransport;

// Re-export Transport trait for convenience
pub use hublink_core::Transport;
