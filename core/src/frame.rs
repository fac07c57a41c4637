//! Frame Codec: one-hop datagram framing with kind flag and CRC-16

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Frame codec errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("Frame too short: need {need} bytes, got {got}")]
    TooShort { need: usize, got: usize },

    #[error("Checksum mismatch: frame carries {received:#06x}, computed {computed:#06x}")]
    ChecksumMismatch { received: u16, computed: u16 },

    #[error("Unknown frame kind: {0:#04x}")]
    UnknownKind(u8),

    #[error("Payload too large: {len} bytes (max {max})")]
    PayloadTooLarge { len: usize, max: usize },

    #[error("Malformed {kind} payload of {len} bytes")]
    MalformedPayload { kind: FrameKind, len: usize },
}

/// Frame kind discriminator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum FrameKind {
    /// A single routing entry advertisement (0x00)
    Advertisement = 0x00,
    /// An application message addressed to some node (0x01)
    UserData = 0x01,
}

impl FrameKind {
    pub fn from_u8(value: u8) -> Result<Self, FrameError> {
        match value {
            0x00 => Ok(FrameKind::Advertisement),
            0x01 => Ok(FrameKind::UserData),
            other => Err(FrameError::UnknownKind(other)),
        }
    }

    pub fn as_u8(&self) -> u8 {
        *self as u8
    }
}

impl std::fmt::Display for FrameKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FrameKind::Advertisement => write!(f, "advertisement"),
            FrameKind::UserData => write!(f, "user-data"),
        }
    }
}

/// Decoded frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub kind: FrameKind,
    pub payload: Vec<u8>,
}

/// Kind discriminator size
pub const HEADER_LEN: usize = 1;

/// Trailing checksum size
pub const CHECKSUM_LEN: usize = 2;

/// Header + checksum
pub const FRAME_OVERHEAD: usize = HEADER_LEN + CHECKSUM_LEN;

/// Largest payload that fits a datagram of `max_datagram` bytes
pub fn max_payload_len(max_datagram: usize) -> usize {
    max_datagram.saturating_sub(FRAME_OVERHEAD)
}

/// Encode a frame into a fresh buffer
pub fn encode(kind: FrameKind, payload: &[u8], max_datagram: usize) -> Result<Vec<u8>, FrameError> {
    let mut buf = Vec::with_capacity(FRAME_OVERHEAD + payload.len());
    encode_into(&mut buf, kind, payload, max_datagram)?;
    Ok(buf)
}

/// Encode a frame into `buf`, replacing its contents
///
/// Format: [1 kind][N payload][2 LE CRC-16]
/// The checksum covers the whole frame with the checksum field zeroed.
pub fn encode_into(
    buf: &mut Vec<u8>,
    kind: FrameKind,
    payload: &[u8],
    max_datagram: usize,
) -> Result<(), FrameError> {
    let max = max_payload_len(max_datagram);
    if payload.len() > max {
        return Err(FrameError::PayloadTooLarge {
            len: payload.len(),
            max,
        });
    }

    buf.clear();
    buf.push(kind.as_u8());
    buf.extend_from_slice(payload);
    buf.extend_from_slice(&[0, 0]);

    let crc = crc16_ccitt(buf);
    let crc_offset = buf.len() - CHECKSUM_LEN;
    buf[crc_offset..].copy_from_slice(&crc.to_le_bytes());

    Ok(())
}

/// Decode and verify a received frame
///
/// Returns error if:
/// - Frame shorter than header + checksum
/// - Checksum mismatch
/// - Unknown kind byte
pub fn decode(data: &[u8]) -> Result<Frame, FrameError> {
    if data.len() < FRAME_OVERHEAD {
        return Err(FrameError::TooShort {
            need: FRAME_OVERHEAD,
            got: data.len(),
        });
    }

    let crc_offset = data.len() - CHECKSUM_LEN;
    let received = u16::from_le_bytes([data[crc_offset], data[crc_offset + 1]]);

    let computed = crc16_ccitt_update(crc16_ccitt(&data[..crc_offset]), &[0, 0]);
    if computed != received {
        return Err(FrameError::ChecksumMismatch { received, computed });
    }

    let kind = FrameKind::from_u8(data[0])?;

    Ok(Frame {
        kind,
        payload: data[HEADER_LEN..crc_offset].to_vec(),
    })
}

/// CRC-16-CCITT (poly 0x1021, init 0xFFFF)
pub fn crc16_ccitt(data: &[u8]) -> u16 {
    crc16_ccitt_update(0xFFFF, data)
}

fn crc16_ccitt_update(mut crc: u16, data: &[u8]) -> u16 {
    for byte in data {
        crc ^= (*byte as u16) << 8;
        for _ in 0..8 {
            if (crc & 0x8000) != 0 {
                crc = (crc << 1) ^ 0x1021;
            } else {
                crc <<= 1;
            }
        }
    }
    crc
}
