// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Receive queue and response dispatcher.
//!
//! All subsystems produce [`ResponseMessage`]s; a single consumer task drains
//! them in FIFO order and invokes the matching [`AdapterEvents`] callback:
//!
//! - `GeneralResponse` → [`AdapterEvents::on_response`]
//! - `BrowseResponse`  → [`AdapterEvents::on_browse`]
//! - `Report`          → [`AdapterEvents::on_report`]
//! - `Error`           → [`AdapterEvents::on_error`]
//!
//! # Ordering
//!
//! Messages enqueued by one producer are delivered in the order they were
//! enqueued; no order is guaranteed between producers. The dispatcher takes
//! ownership of each message and drops it after the callback returns, so a
//! callback copies whatever it wants to keep.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;

use crate::message::{ResponseKind, ResponseMessage};
use crate::transport::ServerDevice;
use crate::types::StatusEvent;

// =============================================================================
// AdapterEvents
// =============================================================================

/// Application callbacks invoked by the dispatcher.
///
/// All methods default to no-ops so an application only implements the
/// channels it cares about.
pub trait AdapterEvents: Send + Sync {
    /// Called for each aggregated read/write/method response.
    fn on_response(&self, msg: ResponseMessage) {
        let _ = msg;
    }

    /// Called for each browse response.
    fn on_browse(&self, msg: ResponseMessage) {
        let _ = msg;
    }

    /// Called for each data-change report.
    fn on_report(&self, msg: ResponseMessage) {
        let _ = msg;
    }

    /// Called for each error message.
    fn on_error(&self, msg: ResponseMessage) {
        let _ = msg;
    }

    /// Called for lifecycle status changes of clients and servers.
    fn on_status(&self, endpoint: &str, status: StatusEvent) {
        let _ = (endpoint, status);
    }

    /// Called for each device discovered by `get_endpoint_info`.
    fn on_device_found(&self, device: ServerDevice) {
        let _ = device;
    }
}

// =============================================================================
// ChannelEvents
// =============================================================================

/// Everything the dispatcher can deliver, as a single channel item.
#[derive(Debug, Clone)]
pub enum QueuedEvent {
    /// A dispatched response message.
    Message(ResponseMessage),
    /// A status change.
    Status {
        /// The endpoint the status concerns.
        endpoint: String,
        /// The status event.
        status: StatusEvent,
    },
    /// A discovered device.
    Device(ServerDevice),
}

/// Channel-backed [`AdapterEvents`] implementation.
///
/// Forwards every callback into an unbounded channel, which keeps the
/// dispatcher non-blocking and makes tests straightforward:
///
/// ```rust,ignore
/// let (events, mut rx) = ChannelEvents::with_channel();
/// let adapter = OpcUaAdapter::new(config, stack, Arc::new(events));
/// while let Some(event) = rx.recv().await { /* ... */ }
/// ```
pub struct ChannelEvents {
    sender: mpsc::UnboundedSender<QueuedEvent>,
}

impl ChannelEvents {
    /// Creates the events sink together with its receiver.
    pub fn with_channel() -> (Self, mpsc::UnboundedReceiver<QueuedEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { sender: tx }, rx)
    }
}

impl AdapterEvents for ChannelEvents {
    fn on_response(&self, msg: ResponseMessage) {
        let _ = self.sender.send(QueuedEvent::Message(msg));
    }

    fn on_browse(&self, msg: ResponseMessage) {
        let _ = self.sender.send(QueuedEvent::Message(msg));
    }

    fn on_report(&self, msg: ResponseMessage) {
        let _ = self.sender.send(QueuedEvent::Message(msg));
    }

    fn on_error(&self, msg: ResponseMessage) {
        let _ = self.sender.send(QueuedEvent::Message(msg));
    }

    fn on_status(&self, endpoint: &str, status: StatusEvent) {
        let _ = self.sender.send(QueuedEvent::Status {
            endpoint: endpoint.to_string(),
            status,
        });
    }

    fn on_device_found(&self, device: ServerDevice) {
        let _ = self.sender.send(QueuedEvent::Device(device));
    }
}

// =============================================================================
// QueueSender
// =============================================================================

/// Cheap cloneable producer handle onto the receive queue.
///
/// Enqueueing never blocks, so producers may hold locks while enqueueing
/// without risking a deadlock against the dispatcher.
#[derive(Clone)]
pub struct QueueSender {
    tx: mpsc::UnboundedSender<ResponseMessage>,
}

impl QueueSender {
    /// Enqueues a response message. Returns `false` when the queue has been
    /// torn down, in which case the message is dropped.
    pub fn enqueue(&self, msg: ResponseMessage) -> bool {
        if self.tx.send(msg).is_err() {
            tracing::warn!("receive queue is down, response dropped");
            return false;
        }
        true
    }
}

// =============================================================================
// ReceiveQueue
// =============================================================================

struct QueueWorker {
    tx: mpsc::UnboundedSender<ResponseMessage>,
    stop: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

/// The receive queue: producers on one side, the dispatcher task on the
/// other.
///
/// Created together with the adapter and started lazily with the first
/// client session; torn down when the last session disconnects.
pub struct ReceiveQueue {
    events: Arc<dyn AdapterEvents>,
    worker: Mutex<Option<QueueWorker>>,
}

impl ReceiveQueue {
    /// Creates a stopped queue bound to the application callbacks.
    pub fn new(events: Arc<dyn AdapterEvents>) -> Self {
        Self {
            events,
            worker: Mutex::new(None),
        }
    }

    /// Returns the application callbacks.
    pub fn events(&self) -> &Arc<dyn AdapterEvents> {
        &self.events
    }

    /// Starts the dispatcher task if it is not running and returns a
    /// producer handle.
    pub async fn ensure_started(&self) -> QueueSender {
        let mut worker = self.worker.lock().await;
        let tx = match worker.as_ref() {
            Some(w) => w.tx.clone(),
            None => {
                let (tx, rx) = mpsc::unbounded_channel();
                let (stop, stop_rx) = oneshot::channel();
                let handle = tokio::spawn(dispatch_loop(rx, stop_rx, Arc::clone(&self.events)));
                tracing::debug!("receive queue dispatcher started");
                *worker = Some(QueueWorker {
                    tx: tx.clone(),
                    stop,
                    handle,
                });
                tx
            }
        };
        QueueSender { tx }
    }

    /// Returns a producer handle when the dispatcher is running.
    pub async fn sender(&self) -> Option<QueueSender> {
        let worker = self.worker.lock().await;
        worker.as_ref().map(|w| QueueSender { tx: w.tx.clone() })
    }

    /// Drains and stops the dispatcher task.
    ///
    /// Pending messages are still dispatched before the task exits.
    pub async fn shutdown(&self) {
        let taken = {
            let mut worker = self.worker.lock().await;
            worker.take()
        };
        if let Some(QueueWorker { tx, stop, handle }) = taken {
            drop(tx);
            // Producers embedded in the stack (data-change handlers) may
            // still hold senders, so the dispatcher is told to stop rather
            // than waiting for every sender to drop.
            let _ = stop.send(());
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "receive queue dispatcher did not stop cleanly");
            }
            tracing::debug!("receive queue dispatcher stopped");
        }
    }

    /// Returns `true` while the dispatcher task is running.
    pub async fn is_running(&self) -> bool {
        self.worker.lock().await.is_some()
    }
}

async fn dispatch_loop(
    mut rx: mpsc::UnboundedReceiver<ResponseMessage>,
    mut stop_rx: oneshot::Receiver<()>,
    events: Arc<dyn AdapterEvents>,
) {
    loop {
        tokio::select! {
            biased;
            msg = rx.recv() => match msg {
                Some(msg) => dispatch(&events, msg),
                None => break,
            },
            _ = &mut stop_rx => {
                // Deliver what was enqueued before the shutdown, then exit.
                while let Ok(msg) = rx.try_recv() {
                    dispatch(&events, msg);
                }
                break;
            }
        }
    }
}

fn dispatch(events: &Arc<dyn AdapterEvents>, msg: ResponseMessage) {
    tracing::trace!(
        message_id = msg.message_id,
        kind = ?msg.kind,
        responses = msg.response_length(),
        "dispatching response"
    );
    match msg.kind {
        ResponseKind::GeneralResponse => events.on_response(msg),
        ResponseKind::BrowseResponse => events.on_browse(msg),
        ResponseKind::Report => events.on_report(msg),
        ResponseKind::Error => events.on_error(msg),
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::AdapterStatus;

    fn message(id: u32, kind: ResponseKind) -> ResponseMessage {
        ResponseMessage::new(id, "opc.tcp://localhost:4840", kind)
    }

    #[tokio::test]
    async fn test_dispatch_by_kind() {
        let (events, mut rx) = ChannelEvents::with_channel();
        let queue = ReceiveQueue::new(Arc::new(events));
        let sender = queue.ensure_started().await;

        sender.enqueue(message(1, ResponseKind::GeneralResponse));
        sender.enqueue(message(2, ResponseKind::BrowseResponse));
        sender.enqueue(message(3, ResponseKind::Report));
        sender.enqueue(ResponseMessage::error(
            4,
            "opc.tcp://localhost:4840",
            AdapterStatus::Error,
            "boom",
        ));

        for expected in 1..=4u32 {
            match rx.recv().await {
                Some(QueuedEvent::Message(msg)) => assert_eq!(msg.message_id, expected),
                other => panic!("unexpected event: {:?}", other),
            }
        }

        queue.shutdown().await;
    }

    #[tokio::test]
    async fn test_single_producer_fifo_order() {
        let (events, mut rx) = ChannelEvents::with_channel();
        let queue = ReceiveQueue::new(Arc::new(events));
        let sender = queue.ensure_started().await;

        for id in 0..100u32 {
            sender.enqueue(message(id, ResponseKind::GeneralResponse));
        }

        for expected in 0..100u32 {
            match rx.recv().await {
                Some(QueuedEvent::Message(msg)) => assert_eq!(msg.message_id, expected),
                other => panic!("unexpected event: {:?}", other),
            }
        }

        queue.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_drains_pending() {
        let (events, mut rx) = ChannelEvents::with_channel();
        let queue = ReceiveQueue::new(Arc::new(events));
        let sender = queue.ensure_started().await;

        for id in 0..10u32 {
            sender.enqueue(message(id, ResponseKind::Report));
        }
        queue.shutdown().await;
        assert!(!queue.is_running().await);

        let mut seen = 0;
        while let Ok(event) = rx.try_recv() {
            if matches!(event, QueuedEvent::Message(_)) {
                seen += 1;
            }
        }
        assert_eq!(seen, 10);
    }

    #[tokio::test]
    async fn test_enqueue_after_shutdown() {
        let (events, _rx) = ChannelEvents::with_channel();
        let queue = ReceiveQueue::new(Arc::new(events));
        let sender = queue.ensure_started().await;
        queue.shutdown().await;

        assert!(!sender.enqueue(message(1, ResponseKind::GeneralResponse)));
    }

    #[tokio::test]
    async fn test_restart_after_shutdown() {
        let (events, mut rx) = ChannelEvents::with_channel();
        let queue = ReceiveQueue::new(Arc::new(events));

        let sender = queue.ensure_started().await;
        sender.enqueue(message(1, ResponseKind::GeneralResponse));
        queue.shutdown().await;

        let sender = queue.ensure_started().await;
        assert!(sender.enqueue(message(2, ResponseKind::GeneralResponse)));
        queue.shutdown().await;

        let mut ids = Vec::new();
        while let Ok(QueuedEvent::Message(msg)) = rx.try_recv() {
            ids.push(msg.message_id);
        }
        assert_eq!(ids, vec![1, 2]);
    }
}
