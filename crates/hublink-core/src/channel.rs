//! Request and response queues crossing the sync/async boundary
//!
//! Both queues are unbounded FIFO channels owned by one driver instance.
//! Sending never blocks, so plain caller threads and transport callbacks can
//! push without a runtime. The channel itself is the serialization point for
//! writes issued from several threads.

use tokio::sync::mpsc;
use tracing::debug;

use crate::errors::{HublinkError, Result};
use crate::types::{Handle, NotificationEvent, PendingWrite};

// ----------------------------------------------------------------------------
// Request Queue: caller threads → bridge
// ----------------------------------------------------------------------------

/// Producer half of the request queue
#[derive(Debug, Clone)]
pub struct RequestSender {
    inner: mpsc::UnboundedSender<PendingWrite>,
}

/// Consumer half of the request queue, owned by the bridge
#[derive(Debug)]
pub struct RequestReceiver {
    inner: mpsc::UnboundedReceiver<PendingWrite>,
}

/// Create a fresh request queue
pub fn request_channel() -> (RequestSender, RequestReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (RequestSender { inner: tx }, RequestReceiver { inner: rx })
}

impl RequestSender {
    pub fn send(&self, handle: Handle, payload: Vec<u8>) -> Result<()> {
        debug!("Request queued: {:#04x} {}", handle, hex::encode(&payload));
        self.inner
            .send(PendingWrite { handle, payload })
            .map_err(|_| HublinkError::NotRunning)
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }
}

impl RequestReceiver {
    /// Wait for the next write; `None` once every sender is gone
    pub async fn recv(&mut self) -> Option<PendingWrite> {
        self.inner.recv().await
    }

    /// Take a write if one is already queued
    pub fn try_recv(&mut self) -> Option<PendingWrite> {
        self.inner.try_recv().ok()
    }
}

// ----------------------------------------------------------------------------
// Response Queue: bridge → dispatch unit
// ----------------------------------------------------------------------------

/// Producer half of the response queue, held by the transport callback
#[derive(Debug, Clone)]
pub struct ResponseSender {
    inner: mpsc::UnboundedSender<NotificationEvent>,
}

/// Consumer half of the response queue, owned by the dispatch unit
#[derive(Debug)]
pub struct ResponseReceiver {
    inner: mpsc::UnboundedReceiver<NotificationEvent>,
}

/// Create a fresh response queue
pub fn response_channel() -> (ResponseSender, ResponseReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ResponseSender { inner: tx }, ResponseReceiver { inner: rx })
}

impl ResponseSender {
    pub fn send(&self, handle: Handle, payload: Vec<u8>) -> Result<()> {
        debug!("Response queued: {:#04x} {}", handle, hex::encode(&payload));
        self.inner
            .send(NotificationEvent { handle, payload })
            .map_err(|_| HublinkError::NotRunning)
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }
}

impl ResponseReceiver {
    /// Wait for the next notification; `None` once every sender is gone
    pub async fn recv(&mut self) -> Option<NotificationEvent> {
        self.inner.recv().await
    }

    pub fn try_recv(&mut self) -> Option<NotificationEvent> {
        self.inner.try_recv().ok()
    }
}
