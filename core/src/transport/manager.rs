//! Transport Bridge: serializes every outgoing frame through one
//! exclusively-locked transmit slot
//!
//! Periodic broadcasts, incremental updates, forwarded traffic and the
//! application send API all funnel through [`Transport::send`]. Only one
//! frame is in preparation or in the radio's hands at a time.

use super::abstraction::DatagramService;
use super::TransportError;
use crate::address::NodeAddress;
use crate::frame::{self, FrameKind};
use parking_lot::Mutex;
use tracing::{debug, trace, warn};

/// Outbound side of the transport bridge
pub struct Transport<L> {
    link: L,
    /// The single transmit buffer, reused for every frame
    tx_slot: Mutex<Vec<u8>>,
    max_datagram: usize,
}

impl<L: DatagramService> Transport<L> {
    pub fn new(link: L, max_datagram: usize) -> Self {
        Self {
            link,
            tx_slot: Mutex::new(Vec::with_capacity(max_datagram)),
            max_datagram,
        }
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    pub fn max_datagram(&self) -> usize {
        self.max_datagram
    }

    /// Largest frame payload accepted by [`Transport::send`]
    pub fn max_payload(&self) -> usize {
        frame::max_payload_len(self.max_datagram)
    }

    /// Frame `payload` as `kind` and hand it to the radio for `destination`
    ///
    /// Blocks while another frame holds the transmit slot. The destination
    /// is registered with the datagram service on first use, with
    /// encryption per `encrypt`. Failures are returned, never retried.
    pub fn send(
        &self,
        destination: NodeAddress,
        payload: &[u8],
        encrypt: bool,
        kind: FrameKind,
    ) -> Result<(), TransportError> {
        let mut buffer = self.tx_slot.lock();

        if !self.link.is_peer_registered(&destination) {
            self.link.register_peer(destination, encrypt)?;
            debug!(
                "Registered peer {} (encrypted: {})",
                destination, encrypt
            );
        }

        frame::encode_into(&mut buffer, kind, payload, self.max_datagram)?;

        if let Err(err) = self.link.send(destination, &buffer) {
            warn!("Send of {} frame to {} failed: {}", kind, destination, err);
            return Err(err.into());
        }

        trace!("Sent {} frame ({} bytes) to {}", kind, buffer.len(), destination);
        Ok(())
    }
}
