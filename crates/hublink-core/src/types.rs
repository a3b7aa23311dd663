//! Core data types shared by the matcher, bridge and driver

use std::fmt;

use serde::{Deserialize, Serialize};

// ----------------------------------------------------------------------------
// Handles and Payloads
// ----------------------------------------------------------------------------

/// Application-level characteristic handle
pub type Handle = u16;

/// Outbound write travelling from a caller thread to the bridge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingWrite {
    pub handle: Handle,
    pub payload: Vec<u8>,
}

impl PendingWrite {
    pub fn new(handle: Handle, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            handle,
            payload: payload.into(),
        }
    }
}

/// Inbound notification travelling from the bridge to the dispatch unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationEvent {
    pub handle: Handle,
    pub payload: Vec<u8>,
}

impl NotificationEvent {
    pub fn new(handle: Handle, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            handle,
            payload: payload.into(),
        }
    }
}

// ----------------------------------------------------------------------------
// Discovery
// ----------------------------------------------------------------------------

/// A device reported by a single discovery scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredDevice {
    /// Hardware address, usually `AA:BB:CC:DD:EE:FF`
    pub address: String,
    /// Advertised local name, if any
    pub name: Option<String>,
}

impl DiscoveredDevice {
    pub fn new(address: impl Into<String>, name: Option<String>) -> Self {
        Self {
            address: address.into(),
            name,
        }
    }
}

impl fmt::Display for DiscoveredDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{} ({})", self.address, name),
            None => write!(f, "{}", self.address),
        }
    }
}

/// Caller-supplied criteria used to pick a device out of a scan
///
/// When `mac` is set the name is never consulted. A target with neither
/// field set accepts the first device seen.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchTarget {
    pub mac: Option<String>,
    pub name: Option<String>,
}

impl MatchTarget {
    /// Accept any discovered device
    pub fn any() -> Self {
        Self::default()
    }

    pub fn by_mac(mac: impl Into<String>) -> Self {
        Self {
            mac: Some(mac.into()),
            name: None,
        }
    }

    pub fn by_name(name: impl Into<String>) -> Self {
        Self {
            mac: None,
            name: Some(name.into()),
        }
    }

    /// True when no constraint is given and any nearby device would match
    pub fn is_unconstrained(&self) -> bool {
        self.mac.is_none() && self.name.is_none()
    }
}

impl fmt::Display for MatchTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.mac, &self.name) {
            (Some(mac), _) => write!(f, "mac={}", mac),
            (None, Some(name)) => write!(f, "name~{}", name),
            (None, None) => write!(f, "any device"),
        }
    }
}

// ----------------------------------------------------------------------------
// Connection State
// ----------------------------------------------------------------------------

/// Lifecycle of the link owned by a bridge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ConnectionState {
    Idle = 0,
    Discovering = 1,
    Connecting = 2,
    Connected = 3,
    Disconnecting = 4,
    Closed = 5,
}

impl ConnectionState {
    /// Whether the state machine allows moving from `self` to `next`
    pub fn can_transition_to(self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        matches!(
            (self, next),
            (Idle, Discovering)
                | (Discovering, Connecting)
                | (Discovering, Idle)
                | (Connecting, Connected)
                | (Connecting, Idle)
                | (Connecting, Disconnecting)
                | (Connected, Disconnecting)
                | (Disconnecting, Closed)
        )
    }

    pub fn is_terminal(self) -> bool {
        self == ConnectionState::Closed
    }

    pub(crate) fn as_u8(self) -> u8 {
        self as u8
    }

    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            0 => ConnectionState::Idle,
            1 => ConnectionState::Discovering,
            2 => ConnectionState::Connecting,
            3 => ConnectionState::Connected,
            4 => ConnectionState::Disconnecting,
            _ => ConnectionState::Closed,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Idle => "idle",
            ConnectionState::Discovering => "discovering",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Disconnecting => "disconnecting",
            ConnectionState::Closed => "closed",
        };
        f.write_str(name)
    }
}
