//! Framed Serial Transport
//!
//! Ties the codec layers to real hardware: a [`Device`] abstraction over
//! serial ports, a [`Stream`] that keeps frames flowing across unplugs and
//! replugs, and an [`Interface`] for blocking request/response exchanges.

mod codec;
mod device;
mod error;
mod interface;
mod packet;
pub mod serial;
mod stream;

pub use codec::{CobsCodec, Serialized, StreamCodec};
pub use device::{Device, LoopDevice};
pub use error::ProtocolError;
pub use interface::{Interface, ResponseCheck};
pub use packet::Packet;
pub use serial::{list_ports, open_port, PortInfo, SerialDevice, SerialSettings};
pub use stream::{Stream, StreamConfig, StreamState};

/// Default baud rate for serial devices
pub const DEFAULT_BAUD_RATE: u32 = 115200;

/// Default serial read timeout in milliseconds
pub const DEFAULT_TIMEOUT_MS: u64 = 100;

/// Default delay between reconnection attempts in milliseconds
pub const DEFAULT_RECONNECT_PERIOD_MS: u64 = 500;

/// Default worker sleep after an empty poll in milliseconds
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1;

/// Default time to wait for a transmit response in milliseconds
pub const DEFAULT_RESPONSE_TIMEOUT_MS: u64 = 500;

/// Byte that terminates every frame on the wire
pub const FRAME_DELIMITER: u8 = 0x00;

/// Largest frame body accepted off the wire, delimiter excluded
pub const MAX_FRAME_SIZE: usize = 4096;
