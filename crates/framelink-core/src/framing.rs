//! COBS frame encoding/decoding
//!
//! Consistent Overhead Byte Stuffing maps arbitrary payloads onto byte
//! sequences that are guaranteed zero-free, so a literal `0x00` can be used
//! on the wire as an unambiguous frame delimiter. These functions deal with
//! the stuffed body only; the delimiter itself is appended and stripped by
//! the stream codec.

use thiserror::Error;

/// Errors raised while unstuffing a COBS frame
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    /// A zero byte appeared inside an encoded block
    #[error("Zero byte inside encoded frame at offset {offset}")]
    ZeroInBody {
        /// Offset of the offending byte within the encoded input
        offset: usize,
    },

    /// A block header promised more bytes than the input contains
    #[error("Truncated frame: block requires {required} bytes but only {available} remain")]
    Truncated {
        /// Bytes the last block header asked for
        required: usize,
        /// Bytes actually left in the input
        available: usize,
    },
}

/// Encode `data` with COBS.
///
/// The output never contains a zero byte. Empty input encodes to `[0x01]`.
pub fn encode(data: &[u8]) -> Vec<u8> {
    if data.is_empty() {
        return vec![0x01];
    }

    // Worst case adds one overhead byte per 254 input bytes.
    let mut frame = Vec::with_capacity(data.len() + 2 + data.len() / 254);
    let mut add_zero = false;
    let mut idx_start = 0usize;

    for (idx_end, &byte) in data.iter().enumerate() {
        let code = (idx_end - idx_start + 1) as u8;

        if byte == 0x00 {
            // Zero terminates the open block; the zero itself is implied
            // by any code below 0xFF.
            add_zero = true;
            frame.push(code);
            frame.extend_from_slice(&data[idx_start..idx_end]);
            idx_start = idx_end + 1;
        } else if code == 0xFE {
            // Full block of 254 non-zero bytes, header 0xFF, no implied zero.
            add_zero = false;
            frame.push(0xFF);
            frame.extend_from_slice(&data[idx_start..=idx_end]);
            idx_start = idx_end + 1;
        }
    }

    // Flush the trailing block. A frame ending in a full 0xFF block adds
    // nothing here; a frame ending in a zero still needs its empty block.
    let idx_end = data.len();
    if idx_end != idx_start || add_zero {
        let code = (idx_end - idx_start + 1) as u8;
        frame.push(code);
        frame.extend_from_slice(&data[idx_start..idx_end]);
    }

    frame
}

/// Decode a COBS-encoded body back into the original payload.
///
/// Expects the stuffed bytes only, without any trailing delimiter. Empty
/// input decodes to an empty payload.
pub fn decode(data: &[u8]) -> Result<Vec<u8>, DecodeError> {
    if data.is_empty() {
        return Ok(Vec::new());
    }

    let mut msg = Vec::with_capacity(data.len());
    let mut idx = 0usize;

    while idx < data.len() {
        let code = data[idx] as usize;
        if code == 0x00 {
            return Err(DecodeError::ZeroInBody { offset: idx });
        }
        idx += 1;

        let required = code - 1;
        let available = data.len() - idx;
        let block = &data[idx..idx + required.min(available)];
        if let Some(pos) = block.iter().position(|&b| b == 0x00) {
            return Err(DecodeError::ZeroInBody { offset: idx + pos });
        }
        msg.extend_from_slice(block);
        idx += block.len();

        if required > available {
            return Err(DecodeError::Truncated {
                required,
                available,
            });
        }

        if idx < data.len() {
            // Another block follows; short codes imply a literal zero here.
            if code < 0xFF {
                msg.push(0x00);
            }
        } else {
            break;
        }
    }

    Ok(msg)
}
