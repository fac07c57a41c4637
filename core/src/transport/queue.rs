//! Event ingestion: bounded queue between the radio's notification
//! context and the protocol task
//!
//! The notification side only copies the event into the queue and returns.
//! It never blocks: when the queue is full the event is dropped with a
//! warning. All decoding and protocol work happens on the consumer side.

use super::abstraction::{LinkEvent, SendStatus};
use super::TransportError;
use crate::address::NodeAddress;
use crate::frame::{self, Frame};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{trace, warn};

/// Create a bounded event queue holding at most `capacity` events
pub fn event_queue(capacity: usize) -> (EventSink, EventQueue) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (EventSink { tx }, EventQueue { rx })
}

/// Producer handle given to the datagram service's callbacks
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::Sender<LinkEvent>,
}

impl EventSink {
    /// Queue a copy of a received datagram
    pub fn notify_received(&self, source: NodeAddress, data: &[u8]) -> Result<(), TransportError> {
        if data.is_empty() {
            warn!("Receive notification from {} without data", source);
            return Err(TransportError::InvalidEvent("empty datagram"));
        }
        self.enqueue(LinkEvent::Received {
            source,
            data: data.to_vec(),
        })
    }

    /// Queue a send-completion notification
    pub fn notify_sent(
        &self,
        destination: NodeAddress,
        status: SendStatus,
    ) -> Result<(), TransportError> {
        self.enqueue(LinkEvent::SendCompleted {
            destination,
            status,
        })
    }

    fn enqueue(&self, event: LinkEvent) -> Result<(), TransportError> {
        match self.tx.try_send(event) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(event)) => {
                warn!("Event queue full, dropping {}", event);
                Err(TransportError::QueueFull)
            }
            Err(TrySendError::Closed(_)) => Err(TransportError::Closed),
        }
    }
}

/// Consumer side, drained by the protocol task
#[derive(Debug)]
pub struct EventQueue {
    rx: mpsc::Receiver<LinkEvent>,
}

impl EventQueue {
    /// Wait for the next event; `None` once every sink is dropped
    pub async fn recv(&mut self) -> Option<LinkEvent> {
        self.rx.recv().await
    }
}

/// Protocol-side receiver of decoded link events
pub trait FrameHandler {
    /// A frame passed integrity checks
    fn on_frame(&mut self, source: NodeAddress, frame: Frame);

    /// A datagram handed to the radio completed
    fn on_send_complete(&mut self, destination: NodeAddress, status: SendStatus) {
        trace!("Send to {} completed: {:?}", destination, status);
    }
}

/// Decode one queued event and hand it to `handler`
///
/// Corrupt or truncated frames are logged and dropped here; they never
/// reach the protocol.
pub fn dispatch<H: FrameHandler + ?Sized>(event: LinkEvent, handler: &mut H) {
    match event {
        LinkEvent::Received { source, data } => match frame::decode(&data) {
            Ok(frame) => handler.on_frame(source, frame),
            Err(err) => warn!("Dropping frame from {}: {}", source, err),
        },
        LinkEvent::SendCompleted {
            destination,
            status,
        } => handler.on_send_complete(destination, status),
    }
}
