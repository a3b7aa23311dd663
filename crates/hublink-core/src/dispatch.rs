//! Notification dispatch loop

use std::panic::{catch_unwind, AssertUnwindSafe};

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::channel::ResponseReceiver;
use crate::types::Handle;

/// Callback receiving every notification, in arrival order
pub type NotifyHandler = Box<dyn FnMut(Handle, Vec<u8>) + Send + 'static>;

/// Why the dispatch loop returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchExit {
    Shutdown,
    QueueClosed,
    HandlerPanicked,
}

/// Feed queued notifications to `handler` until shutdown
///
/// The handler runs on the caller's execution unit, one event at a time.
/// A panicking handler stops the loop instead of unwinding through it.
pub async fn run_dispatch(
    mut responses: ResponseReceiver,
    mut handler: NotifyHandler,
    shutdown: CancellationToken,
) -> DispatchExit {
    let exit = loop {
        tokio::select! {
            biased;

            _ = shutdown.cancelled() => break DispatchExit::Shutdown,

            event = responses.recv() => {
                let Some(event) = event else {
                    break DispatchExit::QueueClosed;
                };
                debug!("Response: {:#04x} {}", event.handle, hex::encode(&event.payload));

                let outcome = catch_unwind(AssertUnwindSafe(|| {
                    handler(event.handle, event.payload)
                }));
                if outcome.is_err() {
                    error!("Notification handler panicked, stopping dispatch");
                    break DispatchExit::HandlerPanicked;
                }
            }
        }
    };

    info!("Processing unit has exited ({:?})", exit);
    exit
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::response_channel;
    use std::sync::{Arc, Mutex};

    #[tokio::test]
    async fn test_dispatch_in_order_until_closed() {
        let (tx, rx) = response_channel();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();

        for i in 0..5u8 {
            tx.send(0x0e, vec![i]).unwrap();
        }
        drop(tx);

        let exit = run_dispatch(
            rx,
            Box::new(move |handle, payload| sink.lock().unwrap().push((handle, payload))),
            CancellationToken::new(),
        )
        .await;

        assert_eq!(exit, DispatchExit::QueueClosed);
        let seen = seen.lock().unwrap();
        let expected: Vec<_> = (0..5u8).map(|i| (0x0e, vec![i])).collect();
        assert_eq!(*seen, expected);
    }

    #[tokio::test]
    async fn test_dispatch_stops_on_shutdown() {
        let (_tx, rx) = response_channel();
        let shutdown = CancellationToken::new();
        shutdown.cancel();
        let exit = run_dispatch(rx, Box::new(|_, _| {}), shutdown).await;
        assert_eq!(exit, DispatchExit::Shutdown);
    }

    #[tokio::test]
    async fn test_handler_panic_stops_dispatch() {
        let (tx, rx) = response_channel();
        tx.send(0x0e, vec![1]).unwrap();
        let exit = run_dispatch(
            rx,
            Box::new(|_, _| panic!("handler failure")),
            CancellationToken::new(),
        )
        .await;
        assert_eq!(exit, DispatchExit::HandlerPanicked);
    }
}
