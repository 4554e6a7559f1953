//! Demonstration packet type
//!
//! A small addressed message showing how to implement [`Serialized`] on top
//! of the checksum engine. Wire layout:
//! - 1 byte: source address
//! - 1 byte: destination address
//! - 1 byte: payload length
//! - N bytes: payload
//! - 2 bytes: CRC-16/CCITT-FALSE of everything above (little-endian)
//!
//! Applications with their own message format implement [`Serialized`]
//! directly; nothing in the transport depends on this particular layout.

use byteorder::{ByteOrder, LittleEndian};
use std::sync::OnceLock;

use super::Serialized;
use crate::checksum::CrcModel;

/// Bytes before the payload
const HEADER_LEN: usize = 3;

/// Bytes of trailing checksum
const CRC_LEN: usize = 2;

/// Shortest possible serialized packet (empty payload)
const MIN_LEN: usize = HEADER_LEN + CRC_LEN;

fn checksum_model() -> &'static CrcModel {
    static MODEL: OnceLock<CrcModel> = OnceLock::new();
    MODEL.get_or_init(CrcModel::crc16_ccitt_false)
}

/// An addressed message with a CRC-validated payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// Source address
    pub source: u8,
    /// Destination address
    pub destination: u8,
    /// Payload bytes
    pub payload: Vec<u8>,
}

impl Packet {
    /// Largest payload the length byte can describe
    pub const MAX_PAYLOAD: usize = u8::MAX as usize;

    /// Create a packet.
    ///
    /// # Panics
    ///
    /// Panics if `payload` exceeds [`Packet::MAX_PAYLOAD`] bytes.
    pub fn new(source: u8, destination: u8, payload: Vec<u8>) -> Self {
        assert!(
            payload.len() <= Self::MAX_PAYLOAD,
            "payload of {} bytes does not fit the length byte",
            payload.len()
        );
        Self {
            source,
            destination,
            payload,
        }
    }

    /// Total serialized size of this packet
    pub fn encoded_size(&self) -> usize {
        MIN_LEN + self.payload.len()
    }
}

impl Serialized for Packet {
    fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_size());
        out.push(self.source);
        out.push(self.destination);
        out.push(self.payload.len() as u8);
        out.extend_from_slice(&self.payload);

        let crc = checksum_model().compute(&out) as u16;
        let mut crc_bytes = [0u8; 2];
        LittleEndian::write_u16(&mut crc_bytes, crc);
        out.extend_from_slice(&crc_bytes);
        out
    }

    fn deserialize(data: &[u8]) -> Option<Self> {
        if data.len() < MIN_LEN {
            return None;
        }

        // The length byte must describe the buffer exactly.
        let length = data[2] as usize;
        if data.len() != HEADER_LEN + length + CRC_LEN {
            return None;
        }

        let body = &data[..data.len() - CRC_LEN];
        let received = LittleEndian::read_u16(&data[data.len() - CRC_LEN..]);
        let computed = checksum_model().compute(body) as u16;
        if received != computed {
            return None;
        }

        Some(Self {
            source: data[0],
            destination: data[1],
            payload: data[HEADER_LEN..HEADER_LEN + length].to_vec(),
        })
    }
}
