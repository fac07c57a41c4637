// User message codec: [6 destination][N payload]

use super::types::UserMessage;
use crate::address::{NodeAddress, ADDRESS_LEN};
use crate::frame::{self, FrameError, FrameKind};

/// Largest application payload that fits one datagram of `max_datagram` bytes
pub fn max_user_payload(max_datagram: usize) -> usize {
    frame::max_payload_len(max_datagram).saturating_sub(ADDRESS_LEN)
}

/// Serialize a UserMessage into a user-data frame payload
pub fn encode_user_message(msg: &UserMessage) -> Vec<u8> {
    let mut buf = Vec::with_capacity(ADDRESS_LEN + msg.payload.len());
    buf.extend_from_slice(msg.destination.as_bytes());
    buf.extend_from_slice(&msg.payload);
    buf
}

/// Deserialize a user-data frame payload
pub fn decode_user_message(bytes: &[u8]) -> Result<UserMessage, FrameError> {
    let destination = NodeAddress::from_slice(bytes).ok_or(FrameError::MalformedPayload {
        kind: FrameKind::UserData,
        len: bytes.len(),
    })?;

    Ok(UserMessage {
        destination,
        payload: bytes[ADDRESS_LEN..].to_vec(),
    })
}
