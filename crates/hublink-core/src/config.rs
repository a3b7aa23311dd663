//! Driver configuration
//!
//! Configuration can be built in code with the `with_*` setters or loaded
//! from a TOML document. Durations serialize as `{ secs, nanos }` tables.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::{HublinkError, Result};
use crate::transport::DEFAULT_CHARACTERISTIC_UUID;
use crate::types::MatchTarget;

/// Payload written right after subscribing; the hub drops silent links
pub const DEFAULT_KEEPALIVE: [u8; 5] = [0x05, 0x00, 0x01, 0x01, 0x05];

// ----------------------------------------------------------------------------
// Driver Configuration
// ----------------------------------------------------------------------------

/// Configuration for a driver and its bridge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Device selection criteria
    pub target: MatchTarget,
    /// Upper bound for a single discovery scan
    pub scan_timeout: Duration,
    /// Number of discovery scans before giving up
    pub max_attempts: u32,
    /// Polling granularity while waiting for the execution units to stop
    pub poll_interval: Duration,
    /// How often the bridge asks the transport whether the link is up
    pub link_check_interval: Duration,
    /// Upper bound for the best-effort transport disconnect
    pub disconnect_timeout: Duration,
    /// Consecutive failed writes after which the bridge gives up
    pub max_consecutive_write_failures: u32,
    /// Characteristic used for notifications and unregistered handles
    pub default_characteristic: Uuid,
    /// Written once after subscribing, `None` to skip
    pub keepalive: Option<Vec<u8>>,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            target: MatchTarget::any(),
            scan_timeout: Duration::from_secs(1),
            max_attempts: 30,
            poll_interval: Duration::from_millis(100),
            link_check_interval: Duration::from_secs(1),
            disconnect_timeout: Duration::from_secs(5),
            max_consecutive_write_failures: 5,
            default_characteristic: DEFAULT_CHARACTERISTIC_UUID,
            keepalive: Some(DEFAULT_KEEPALIVE.to_vec()),
        }
    }
}

impl DriverConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Short timeouts for tests against fake transports
    pub fn testing() -> Self {
        Self {
            scan_timeout: Duration::from_millis(10),
            max_attempts: 3,
            poll_interval: Duration::from_millis(5),
            link_check_interval: Duration::from_millis(20),
            disconnect_timeout: Duration::from_millis(200),
            ..Self::default()
        }
    }

    pub fn with_target(mut self, target: MatchTarget) -> Self {
        self.target = target;
        self
    }

    pub fn with_scan_timeout(mut self, timeout: Duration) -> Self {
        self.scan_timeout = timeout;
        self
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_link_check_interval(mut self, interval: Duration) -> Self {
        self.link_check_interval = interval;
        self
    }

    pub fn with_disconnect_timeout(mut self, timeout: Duration) -> Self {
        self.disconnect_timeout = timeout;
        self
    }

    pub fn with_max_consecutive_write_failures(mut self, failures: u32) -> Self {
        self.max_consecutive_write_failures = failures;
        self
    }

    pub fn with_default_characteristic(mut self, characteristic: Uuid) -> Self {
        self.default_characteristic = characteristic;
        self
    }

    pub fn with_keepalive(mut self, keepalive: Option<Vec<u8>>) -> Self {
        self.keepalive = keepalive;
        self
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: DriverConfig =
            toml::from_str(source).map_err(|e| HublinkError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|e| {
            HublinkError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&source)
    }

    /// Reject values that would make the bridge spin or never connect
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(HublinkError::Config("max_attempts must be at least 1".into()));
        }
        if self.scan_timeout.is_zero() {
            return Err(HublinkError::Config("scan_timeout must be non-zero".into()));
        }
        if self.poll_interval.is_zero() || self.link_check_interval.is_zero() {
            return Err(HublinkError::Config("intervals must be non-zero".into()));
        }
        if self.max_consecutive_write_failures == 0 {
            return Err(HublinkError::Config(
                "max_consecutive_write_failures must be at least 1".into(),
            ));
        }
        Ok(())
    }
}
