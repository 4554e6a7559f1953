//! Item serialization and frame codec
//!
//! [`Serialized`] is the contract message types implement; [`StreamCodec`]
//! turns items into delimited wire frames and reassembles them from a
//! [`Device`]. The provided [`CobsCodec`] stuffs serialized items with COBS
//! and terminates each frame with a literal `0x00`.

use std::fmt;
use std::marker::PhantomData;

use tracing::debug;

use super::{Device, ProtocolError, FRAME_DELIMITER, MAX_FRAME_SIZE};
use crate::framing;

/// A message that can cross the transport.
///
/// `deserialize` owns integrity validation (lengths, checksums) and returns
/// `None` for anything corrupt; the transport drops such frames without
/// disturbing the connection. Implementations should derive equality from
/// the serialized form, i.e. two items comparing equal must serialize to the
/// same bytes.
pub trait Serialized: Clone + Send + 'static {
    /// Encode the item to its raw byte representation
    fn serialize(&self) -> Vec<u8>;

    /// Decode and validate an item from raw bytes
    fn deserialize(data: &[u8]) -> Option<Self>;
}

/// Frames items onto the wire and reassembles them from a device.
pub trait StreamCodec: Send + Sync {
    /// Message type carried by this codec
    type Item: Serialized;

    /// Produce the complete wire frame for an item, delimiter included.
    fn encode(&self, item: &Self::Item) -> Vec<u8>;

    /// Decode a frame body (without its delimiter) back into an item.
    fn decode(&self, data: &[u8]) -> Option<Self::Item>;

    /// Pull the next frame out of `device`.
    ///
    /// Returns `Ok(None)` when no complete valid frame is available yet
    /// (nothing arrived, delimiter noise, or a corrupt frame that was
    /// dropped) and `Err` when the device reports disconnection.
    fn decode_stream(&self, device: &mut dyn Device) -> Result<Option<Self::Item>, ProtocolError>;
}

/// [`StreamCodec`] implementation using COBS with a `0x00` frame terminator
pub struct CobsCodec<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> CobsCodec<T> {
    /// Create the codec
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for CobsCodec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for CobsCodec<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for CobsCodec<T> {}

impl<T> fmt::Debug for CobsCodec<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CobsCodec")
    }
}

impl<T: Serialized> StreamCodec for CobsCodec<T> {
    type Item = T;

    fn encode(&self, item: &T) -> Vec<u8> {
        let mut frame = framing::encode(&item.serialize());
        frame.push(FRAME_DELIMITER);
        frame
    }

    fn decode(&self, data: &[u8]) -> Option<T> {
        match framing::decode(data) {
            Ok(payload) => T::deserialize(&payload),
            Err(e) => {
                debug!(error = %e, "dropping undecodable frame");
                None
            }
        }
    }

    fn decode_stream(&self, device: &mut dyn Device) -> Result<Option<T>, ProtocolError> {
        let disconnected = || ProtocolError::Disconnected("device read failed".to_string());

        let head = device.read(1).ok_or_else(disconnected)?;
        let Some(&first) = head.first() else {
            // Nothing arrived within the device timeout.
            return Ok(None);
        };
        if first == FRAME_DELIMITER {
            // Bare separator between frames, nothing to decode.
            return Ok(None);
        }

        let mut data = vec![first];
        let rest = device.read_until(FRAME_DELIMITER).ok_or_else(disconnected)?;
        data.extend_from_slice(&rest);
        if data.last() == Some(&FRAME_DELIMITER) {
            data.pop();
        }

        if data.len() > MAX_FRAME_SIZE {
            debug!(len = data.len(), "dropping oversized frame");
            return Ok(None);
        }

        Ok(self.decode(&data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{LoopDevice, Packet};

    fn codec() -> CobsCodec<Packet> {
        CobsCodec::new()
    }

    #[test]
    fn test_encode_terminates_frame() {
        let packet = Packet::new(0x01, 0x02, vec![0xAA, 0x00, 0xBB]);
        let frame = codec().encode(&packet);

        assert_eq!(frame.last(), Some(&0x00));
        // COBS keeps the body zero-free; only the terminator is a zero.
        assert_eq!(frame.iter().filter(|&&b| b == 0x00).count(), 1);
    }

    #[test]
    fn test_decode_body_roundtrip() {
        let packet = Packet::new(0x05, 0x06, vec![1, 2, 3]);
        let mut frame = codec().encode(&packet);
        frame.pop();

        assert_eq!(codec().decode(&frame), Some(packet));
    }

    #[test]
    fn test_decode_stream_reads_one_frame() {
        let mut device = LoopDevice::new();
        device.open();

        let packet = Packet::new(0x11, 0x22, vec![0x00, 0xFF]);
        let mut tap = device.clone();
        tap.open();
        tap.write(&codec().encode(&packet));

        let received = codec()
            .decode_stream(&mut device)
            .expect("device is connected");
        assert_eq!(received, Some(packet));
    }

    #[test]
    fn test_decode_stream_skips_leading_delimiter() {
        let mut device = LoopDevice::new();
        device.open();

        let packet = Packet::new(0x01, 0x02, vec![0x42]);
        let mut tap = device.clone();
        tap.open();
        tap.write(&[FRAME_DELIMITER]);
        tap.write(&codec().encode(&packet));

        // First call consumes the bare separator.
        assert_eq!(codec().decode_stream(&mut device).unwrap(), None);
        assert_eq!(codec().decode_stream(&mut device).unwrap(), Some(packet));
    }

    #[test]
    fn test_decode_stream_handles_back_to_back_frames() {
        let mut device = LoopDevice::new();
        device.open();

        let one = Packet::new(0x01, 0x02, vec![0x10]);
        let two = Packet::new(0x03, 0x04, vec![0x20, 0x00]);
        let mut wire = codec().encode(&one);
        wire.extend_from_slice(&codec().encode(&two));

        let mut tap = device.clone();
        tap.open();
        tap.write(&wire);

        assert_eq!(codec().decode_stream(&mut device).unwrap(), Some(one));
        assert_eq!(codec().decode_stream(&mut device).unwrap(), Some(two));
    }

    #[test]
    fn test_decode_stream_drops_corrupt_frame() {
        let mut device = LoopDevice::new();
        device.open();

        let mut tap = device.clone();
        tap.open();
        // Valid COBS structure, payload fails packet validation.
        tap.write(&[0x04, 0x01, 0x02, 0x03, FRAME_DELIMITER]);

        assert_eq!(codec().decode_stream(&mut device).unwrap(), None);
    }

    #[test]
    fn test_decode_stream_drops_oversized_frame() {
        let mut device = LoopDevice::new();
        device.open();

        let mut tap = device.clone();
        tap.open();
        // A run of nonzero bytes longer than any legal frame.
        let mut wire = vec![0x01; MAX_FRAME_SIZE + 1];
        wire.push(FRAME_DELIMITER);
        let packet = Packet::new(0x01, 0x02, vec![0x42]);
        wire.extend_from_slice(&codec().encode(&packet));
        tap.write(&wire);

        assert_eq!(codec().decode_stream(&mut device).unwrap(), None);
        assert_eq!(codec().decode_stream(&mut device).unwrap(), Some(packet));
    }

    #[test]
    fn test_decode_stream_reports_disconnection() {
        let mut device = LoopDevice::new();
        // Never opened: reads fail as if unplugged.
        let result = codec().decode_stream(&mut device);
        assert!(matches!(result, Err(ProtocolError::Disconnected(_))));
    }

    #[test]
    fn test_decode_stream_empty_when_idle() {
        let mut device = LoopDevice::with_timeout(std::time::Duration::from_millis(5));
        device.open();
        assert_eq!(codec().decode_stream(&mut device).unwrap(), None);
    }
}
