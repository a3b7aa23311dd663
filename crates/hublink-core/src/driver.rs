//! Synchronous driver façade
//!
//! The driver owns two execution units, each a named OS thread running its
//! own current-thread tokio runtime:
//!
//! - the bridge unit: discover → connect → subscribe → drain writes
//! - the dispatch unit: drain notifications into the registered handler
//!
//! Callers on any thread use `write`, `is_alive` and `disconnect`. Writes
//! return as soon as they are queued; transport failures only show up
//! through `is_alive()` and the log.

use std::sync::Mutex;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tokio::runtime::Builder;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::bridge::{BridgeStatus, ConnectionBridge};
use crate::channel::{request_channel, response_channel, RequestSender};
use crate::config::DriverConfig;
use crate::dispatch::{run_dispatch, NotifyHandler};
use crate::errors::{HublinkError, Result};
use crate::transport::Transport;
use crate::types::{ConnectionState, DiscoveredDevice, Handle, MatchTarget};

// ----------------------------------------------------------------------------
// Execution Units
// ----------------------------------------------------------------------------

struct Units {
    bridge: JoinHandle<()>,
    dispatch: JoinHandle<()>,
    requests: RequestSender,
    status: BridgeStatus,
}

impl Units {
    fn is_alive(&self) -> bool {
        !self.bridge.is_finished() && !self.dispatch.is_finished()
    }

    fn is_finished(&self) -> bool {
        self.bridge.is_finished() && self.dispatch.is_finished()
    }
}

// ----------------------------------------------------------------------------
// Driver
// ----------------------------------------------------------------------------

/// Blocking API over a transport driven on background execution units
pub struct Driver<T: Transport> {
    config: DriverConfig,
    transport: Option<T>,
    handler: Mutex<Option<NotifyHandler>>,
    shutdown: CancellationToken,
    units: Option<Units>,
    device: Option<DiscoveredDevice>,
}

impl<T: Transport> Driver<T> {
    pub fn new(transport: T, config: DriverConfig) -> Self {
        Self {
            config,
            transport: Some(transport),
            handler: Mutex::new(None),
            shutdown: CancellationToken::new(),
            units: None,
            device: None,
        }
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// Choose the device to connect to when notifications are enabled
    pub fn connect(&mut self, target: MatchTarget) -> Result<()> {
        if self.units.is_some() {
            return Err(HublinkError::AlreadyRunning);
        }
        debug!("Match target set to {}", target);
        self.config.target = target;
        Ok(())
    }

    /// Register the single notification handler
    pub fn set_notify_handler<F>(&mut self, handler: F)
    where
        F: FnMut(Handle, Vec<u8>) + Send + 'static,
    {
        let slot = self
            .handler
            .get_mut()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *slot = Some(Box::new(handler));
    }

    /// Start both execution units and wait for the connect outcome
    ///
    /// Fails with `HandlerNotSet` if no handler was registered, and with
    /// `DeviceNotFound` / `ConnectionFailed` if the bridge cannot connect.
    /// Calling it again while running does nothing. Must not be called from
    /// inside an async runtime.
    pub fn enable_notifications(&mut self) -> Result<()> {
        if let Some(units) = &self.units {
            if units.is_alive() && !self.shutdown.is_cancelled() {
                debug!("Notifications already enabled");
                return Ok(());
            }
            return Err(HublinkError::NotRunning);
        }

        self.config.validate()?;
        let handler = self
            .handler
            .get_mut()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
            .ok_or(HublinkError::HandlerNotSet)?;
        let transport = self.transport.take().ok_or(HublinkError::NotRunning)?;

        let (request_tx, request_rx) = request_channel();
        let (response_tx, response_rx) = response_channel();
        let mut bridge = ConnectionBridge::new(transport, self.config.clone(), response_tx);
        let status = bridge.status();

        let shutdown = self.shutdown.clone();
        let dispatch = thread::Builder::new()
            .name("hublink-dispatch".into())
            .spawn(move || {
                let runtime = match Builder::new_current_thread().enable_all().build() {
                    Ok(runtime) => runtime,
                    Err(e) => {
                        error!("Failed to start dispatch runtime: {}", e);
                        return;
                    }
                };
                runtime.block_on(run_dispatch(response_rx, handler, shutdown));
            })?;

        let (ready_tx, ready_rx) = oneshot::channel::<Result<DiscoveredDevice>>();
        let shutdown = self.shutdown.clone();
        let config = self.config.clone();
        let spawned = thread::Builder::new()
            .name("hublink-bridge".into())
            .spawn(move || {
                let runtime = match Builder::new_current_thread().enable_all().build() {
                    Ok(runtime) => runtime,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e.into()));
                        return;
                    }
                };
                runtime.block_on(async move {
                    let outcome = bridge
                        .connect(&config.target, config.scan_timeout, config.max_attempts)
                        .await;
                    match outcome {
                        Ok(device) => {
                            let _ = ready_tx.send(Ok(device));
                            bridge.serve(request_rx, shutdown).await;
                        }
                        Err(e) => {
                            error!("Bridge failed to connect: {}", e);
                            let _ = ready_tx.send(Err(e));
                        }
                    }
                });
                info!("Communications unit has exited");
            });

        let bridge = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                self.shutdown.cancel();
                let _ = dispatch.join();
                return Err(e.into());
            }
        };

        let outcome = ready_rx
            .blocking_recv()
            .unwrap_or(Err(HublinkError::NotRunning));
        match outcome {
            Ok(device) => {
                info!("Driver running, connected to {}", device);
                self.device = Some(device);
                self.units = Some(Units {
                    bridge,
                    dispatch,
                    requests: request_tx,
                    status,
                });
                Ok(())
            }
            Err(e) => {
                self.shutdown.cancel();
                let _ = bridge.join();
                let _ = dispatch.join();
                Err(e)
            }
        }
    }

    /// Queue a write; returns once the request is enqueued
    pub fn write(&self, handle: Handle, data: impl Into<Vec<u8>>) -> Result<()> {
        let units = self.units.as_ref().ok_or(HublinkError::NotRunning)?;
        if self.shutdown.is_cancelled() || !units.is_alive() {
            return Err(HublinkError::NotRunning);
        }
        units.requests.send(handle, data.into())
    }

    /// Signal both units to stop without waiting for them
    pub fn disconnect(&self) {
        info!("Driver shutdown requested");
        self.shutdown.cancel();
    }

    /// Both execution units are running and shutdown was not requested
    pub fn is_alive(&self) -> bool {
        match &self.units {
            Some(units) => !self.shutdown.is_cancelled() && units.is_alive(),
            None => false,
        }
    }

    /// Block until both units have exited or `limit` elapses
    pub fn wait_stopped(&self, limit: Duration) -> bool {
        let Some(units) = &self.units else {
            return true;
        };
        let deadline = Instant::now() + limit;
        while !units.is_finished() {
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(self.config.poll_interval);
        }
        true
    }

    /// Current bridge state, `Idle` before the units start
    pub fn state(&self) -> ConnectionState {
        self.units
            .as_ref()
            .map(|units| units.status.state())
            .unwrap_or(ConnectionState::Idle)
    }

    /// Whether the bridge itself reports a live link
    pub fn link_alive(&self) -> bool {
        self.units
            .as_ref()
            .map(|units| units.status.is_alive())
            .unwrap_or(false)
    }

    /// Device the bridge connected to
    pub fn device(&self) -> Option<&DiscoveredDevice> {
        self.device.as_ref()
    }
}

impl<T: Transport> Drop for Driver<T> {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
