//! Error types for the hub driver
//!
//! `HublinkError` is what callers of the synchronous API see. `TransportError`
//! is produced by `Transport` implementations and is mostly logged by the
//! bridge rather than returned.

use thiserror::Error;
use uuid::Uuid;

use crate::types::ConnectionState;

// ----------------------------------------------------------------------------
// Transport Errors
// ----------------------------------------------------------------------------

/// Failures reported by a BLE transport
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("BLE adapter unavailable: {0}")]
    Adapter(String),

    #[error("Discovery scan failed: {0}")]
    Scan(String),

    #[error("Failed to connect: {0}")]
    Connect(String),

    #[error("Failed to write to characteristic {characteristic}: {reason}")]
    Write { characteristic: Uuid, reason: String },

    #[error("Failed to subscribe to notifications: {0}")]
    Subscribe(String),

    #[error("Failed to disconnect: {0}")]
    Disconnect(String),

    #[error("Transport is not connected")]
    NotConnected,

    #[error("Characteristic not found: {0}")]
    CharacteristicNotFound(Uuid),
}

// ----------------------------------------------------------------------------
// Driver Errors
// ----------------------------------------------------------------------------

/// Errors surfaced synchronously by the bridge and driver
#[derive(Debug, Error)]
pub enum HublinkError {
    #[error("Device not found after {attempts} discovery attempts")]
    DeviceNotFound { attempts: u32 },

    #[error("Connection to {address} failed: {reason}")]
    ConnectionFailed { address: String, reason: String },

    #[error("Communication units are not running")]
    NotRunning,

    #[error("Notification handler must be set before enabling notifications")]
    HandlerNotSet,

    #[error("Driver is already running")]
    AlreadyRunning,

    #[error("Cannot {operation} while {state}")]
    InvalidState {
        operation: &'static str,
        state: ConnectionState,
    },

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Runtime error: {0}")]
    Runtime(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type for driver operations
pub type Result<T> = std::result::Result<T, HublinkError>;
