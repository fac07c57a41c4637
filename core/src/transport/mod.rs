// Transport bridge: single-slot transmit path and the bounded event
// pipeline between the radio driver and the protocol task

pub mod abstraction;
pub mod manager;
pub mod queue;

pub use abstraction::{DatagramService, LinkError, LinkEvent, SendStatus};
pub use manager::Transport;
pub use queue::{dispatch, event_queue, EventQueue, EventSink, FrameHandler};

use crate::frame::FrameError;
use thiserror::Error;

/// Transport bridge errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Frame encoding failed: {0}")]
    Encode(#[from] FrameError),

    #[error("Link error: {0}")]
    Link(#[from] LinkError),

    #[error("Event queue full, event dropped")]
    QueueFull,

    #[error("Event queue closed")]
    Closed,

    #[error("Invalid event: {0}")]
    InvalidEvent(&'static str),
}
