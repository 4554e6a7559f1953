//! # FrameLink Core Library
//!
//! Framed, reconnect-resilient transport for serial links.

#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

//!
//! This library provides:
//! - Table-driven CRC computation for any model from 1 to 64 bits
//! - COBS byte stuffing with zero-delimited framing
//! - A background stream engine that survives device disconnections
//! - A blocking request/response interface with match predicates
//! - Serial port and in-memory loopback device backends
//!
//! ## Example
//!
//! ```rust,ignore
//! use framelink_core::protocol::{CobsCodec, Interface, Packet, SerialDevice, SerialSettings};
//!
//! // Open a port and wrap it in a framed transport
//! let device = SerialDevice::new("/dev/ttyUSB0", SerialSettings::default())?;
//! let link = Interface::new(Box::new(device), CobsCodec::<Packet>::new());
//!
//! // Fire and forget
//! link.send(&Packet::new(0x01, 0x10, vec![0xAA]));
//!
//! // Request/response with a match predicate
//! let ping = Packet::new(0x01, 0x10, vec![0x01]);
//! let reply = link.transmit(&ping, Some(Box::new(|p: &Packet| p.source == 0x10)), None);
//! ```

pub mod checksum;
pub mod events;
pub mod framing;
pub mod protocol;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::checksum::CrcModel;
    pub use crate::events::{EventHook, Subscription};
    pub use crate::protocol::{
        CobsCodec, Device, Interface, LoopDevice, Packet, ProtocolError, ResponseCheck,
        SerialDevice, SerialSettings, Serialized, Stream, StreamCodec, StreamConfig, StreamState,
    };
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
