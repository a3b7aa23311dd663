//! Connection bridge owning the transport
//!
//! The bridge runs on a single execution unit and is the only code that talks
//! to the `Transport`. It walks the connection state machine
//! (`Idle → Discovering → Connecting → Connected → Disconnecting → Closed`),
//! routes notifications into the response queue, and drains the request
//! queue one write at a time. Other threads observe it through a
//! [`BridgeStatus`] handle.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{interval, timeout, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::channel::{RequestReceiver, ResponseSender};
use crate::config::DriverConfig;
use crate::errors::{HublinkError, Result};
use crate::matcher::find_first_match;
use crate::transport::{NotificationCallback, Transport};
use crate::types::{ConnectionState, DiscoveredDevice, Handle, MatchTarget, PendingWrite};

// ----------------------------------------------------------------------------
// Shared Status
// ----------------------------------------------------------------------------

#[derive(Debug)]
struct StatusInner {
    state: AtomicU8,
    link_up: AtomicBool,
}

/// Lock-free view of a bridge, cloneable across threads
///
/// Only the owning bridge writes to it; every other holder reads.
#[derive(Debug, Clone)]
pub struct BridgeStatus {
    inner: Arc<StatusInner>,
}

impl BridgeStatus {
    fn new() -> Self {
        Self {
            inner: Arc::new(StatusInner {
                state: AtomicU8::new(ConnectionState::Idle.as_u8()),
                link_up: AtomicBool::new(false),
            }),
        }
    }

    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.inner.state.load(Ordering::SeqCst))
    }

    /// Connected and the transport last reported the link as up
    pub fn is_alive(&self) -> bool {
        self.state() == ConnectionState::Connected && self.inner.link_up.load(Ordering::SeqCst)
    }

    fn set_link(&self, up: bool) {
        self.inner.link_up.store(up, Ordering::SeqCst);
    }

    fn transition(&self, next: ConnectionState, operation: &'static str) -> Result<()> {
        let current = self.state();
        if !current.can_transition_to(next) {
            return Err(HublinkError::InvalidState {
                operation,
                state: current,
            });
        }
        self.inner.state.store(next.as_u8(), Ordering::SeqCst);
        debug!("Connection state {} -> {}", current, next);
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Connection Bridge
// ----------------------------------------------------------------------------

/// Owns one transport and exposes the connection lifecycle on top of it
pub struct ConnectionBridge<T: Transport> {
    transport: T,
    config: DriverConfig,
    responses: ResponseSender,
    status: BridgeStatus,
    device: Option<DiscoveredDevice>,
    consecutive_failures: u32,
}

impl<T: Transport> ConnectionBridge<T> {
    /// Create a bridge whose notifications are pushed into `responses`
    pub fn new(transport: T, config: DriverConfig, responses: ResponseSender) -> Self {
        Self {
            transport,
            config,
            responses,
            status: BridgeStatus::new(),
            device: None,
            consecutive_failures: 0,
        }
    }

    pub fn status(&self) -> BridgeStatus {
        self.status.clone()
    }

    pub fn state(&self) -> ConnectionState {
        self.status.state()
    }

    pub fn is_alive(&self) -> bool {
        self.status.is_alive()
    }

    /// Device selected by the last successful `connect`
    pub fn device(&self) -> Option<&DiscoveredDevice> {
        self.device.as_ref()
    }

    /// Discover a matching device, connect to it and subscribe
    ///
    /// Each of the `max_attempts` scans is cut off after `scan_timeout`; a
    /// failed or timed out scan still counts as an attempt. The first
    /// matching device in scan order wins. On any failure the bridge returns
    /// to `Idle`.
    pub async fn connect(
        &mut self,
        target: &MatchTarget,
        scan_timeout: Duration,
        max_attempts: u32,
    ) -> Result<DiscoveredDevice> {
        self.status.transition(ConnectionState::Discovering, "connect")?;

        if target.is_unconstrained() {
            warn!("No MAC or name given; the first device discovered will be used");
        }

        info!("Discovering devices for {}... press the button on the hub", target);
        let device = match self.discover(target, scan_timeout, max_attempts).await {
            Some(device) => device,
            None => {
                self.status.transition(ConnectionState::Idle, "connect")?;
                return Err(HublinkError::DeviceNotFound {
                    attempts: max_attempts,
                });
            }
        };

        self.status.transition(ConnectionState::Connecting, "connect")?;
        if let Err(e) = self.transport.connect(&device.address).await {
            error!("Failed to connect to {}: {}", device, e);
            self.status.transition(ConnectionState::Idle, "connect")?;
            return Err(HublinkError::ConnectionFailed {
                address: device.address.clone(),
                reason: e.to_string(),
            });
        }

        self.status.transition(ConnectionState::Connected, "connect")?;
        self.status.set_link(true);
        self.consecutive_failures = 0;
        self.device = Some(device.clone());
        info!("Connected to {}", device);

        self.subscribe().await;
        self.send_keepalive().await;

        Ok(device)
    }

    async fn discover(
        &mut self,
        target: &MatchTarget,
        scan_timeout: Duration,
        max_attempts: u32,
    ) -> Option<DiscoveredDevice> {
        for attempt in 1..=max_attempts {
            let devices = match timeout(scan_timeout, self.transport.discover(scan_timeout)).await
            {
                Ok(Ok(devices)) => devices,
                Ok(Err(e)) => {
                    warn!("Discovery attempt {}/{} failed: {}", attempt, max_attempts, e);
                    continue;
                }
                Err(_) => {
                    warn!(
                        "Discovery attempt {}/{} timed out after {:?}",
                        attempt, max_attempts, scan_timeout
                    );
                    continue;
                }
            };
            debug!(
                "Discovery attempt {}/{} found {} devices",
                attempt,
                max_attempts,
                devices.len()
            );

            if let Some(device) = find_first_match(&devices, target) {
                info!("Device matched: {}", device);
                return Some(device.clone());
            }
        }
        None
    }

    async fn subscribe(&mut self) {
        let responses = self.responses.clone();
        let callback: NotificationCallback = Arc::new(move |handle, payload| {
            if responses.send(handle, payload).is_err() {
                debug!("Dropping notification for {:#04x}, dispatch has stopped", handle);
            }
        });

        let characteristic = self.config.default_characteristic;
        match self.transport.subscribe(characteristic, callback).await {
            Ok(()) => debug!("Subscribed to notifications on {}", characteristic),
            Err(e) => warn!("Notification subscription failed: {}", e),
        }
    }

    async fn send_keepalive(&mut self) {
        let Some(payload) = self.config.keepalive.clone() else {
            return;
        };
        let characteristic = self.config.default_characteristic;
        if let Err(e) = self
            .transport
            .write_characteristic(characteristic, &payload)
            .await
        {
            warn!("Keep-alive write failed: {}", e);
        }
    }

    /// Characteristic a write on `handle` goes to
    pub fn resolve_characteristic(&self, handle: Handle) -> Uuid {
        self.transport
            .get_descriptor(handle)
            .unwrap_or(self.config.default_characteristic)
    }

    /// Write `payload` to the characteristic behind `handle`
    ///
    /// Handles without a registered descriptor fall back to the default
    /// characteristic. `&mut self` keeps a single write in flight.
    pub async fn write(&mut self, handle: Handle, payload: &[u8]) -> Result<()> {
        let state = self.state();
        if state != ConnectionState::Connected {
            return Err(HublinkError::InvalidState {
                operation: "write",
                state,
            });
        }

        let characteristic = self.resolve_characteristic(handle);
        debug!(
            "Request: {:#04x} via {} {}",
            handle,
            characteristic,
            hex::encode(payload)
        );
        self.transport
            .write_characteristic(characteristic, payload)
            .await?;
        Ok(())
    }

    /// Tear the link down; always ends in `Closed` once started
    ///
    /// Transport failures and timeouts are logged and swallowed. Calling it
    /// on an already closed bridge is a no-op.
    pub async fn disconnect(&mut self) -> Result<()> {
        let state = self.state();
        if state == ConnectionState::Closed {
            return Ok(());
        }
        self.status.transition(ConnectionState::Disconnecting, "disconnect")?;
        self.status.set_link(false);

        info!("Disconnecting");
        match timeout(self.config.disconnect_timeout, self.transport.disconnect()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Transport disconnect failed: {}", e),
            Err(_) => warn!(
                "Transport disconnect timed out after {:?}",
                self.config.disconnect_timeout
            ),
        }

        self.status.transition(ConnectionState::Closed, "disconnect")?;
        info!("Connection closed");
        Ok(())
    }

    /// Ask the transport whether the link is still up
    ///
    /// A transport that does not answer within `link_check_interval` counts
    /// as down.
    pub async fn refresh_link(&mut self) -> bool {
        let limit = self.config.link_check_interval;
        let up = match timeout(limit, self.transport.is_connected()).await {
            Ok(up) => up,
            Err(_) => {
                warn!("Link check timed out after {:?}", limit);
                false
            }
        };
        self.status.set_link(up);
        up
    }

    /// Drain the request queue until shutdown, link loss or persistent failure
    ///
    /// The bridge is disconnected before this returns.
    pub async fn serve(&mut self, mut requests: RequestReceiver, shutdown: CancellationToken) {
        let mut link_check = interval(self.config.link_check_interval);
        link_check.set_missed_tick_behavior(MissedTickBehavior::Delay);
        link_check.tick().await;

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    info!("Shutdown requested");
                    break;
                }

                request = requests.recv() => match request {
                    Some(request) => {
                        if !self.handle_request(request).await {
                            break;
                        }
                    }
                    None => {
                        info!("Request queue closed");
                        break;
                    }
                },

                _ = link_check.tick() => {
                    if !self.refresh_link().await {
                        warn!("Transport reports the link is down");
                        break;
                    }
                }
            }
        }

        if let Err(e) = self.disconnect().await {
            debug!("Skipping disconnect: {}", e);
        }
    }

    async fn handle_request(&mut self, request: PendingWrite) -> bool {
        match self.write(request.handle, &request.payload).await {
            Ok(()) => {
                self.consecutive_failures = 0;
                true
            }
            Err(e) => {
                self.consecutive_failures += 1;
                warn!(
                    "Write to {:#04x} failed ({}/{}): {}",
                    request.handle,
                    self.consecutive_failures,
                    self.config.max_consecutive_write_failures,
                    e
                );
                if self.consecutive_failures >= self.config.max_consecutive_write_failures {
                    error!("Too many consecutive write failures, giving up on the link");
                    self.status.set_link(false);
                    return false;
                }
                true
            }
        }
    }
}
