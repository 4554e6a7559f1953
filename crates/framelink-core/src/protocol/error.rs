//! Protocol errors

use thiserror::Error;

/// Errors that can occur in the transport layer
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Serial port error: {0}")]
    SerialError(String),

    #[error("Device disconnected: {0}")]
    Disconnected(String),

    #[error("Port not found: {0}")]
    PortNotFound(String),

    #[error("Invalid port name: {0:?}")]
    InvalidPort(String),

    #[error("Response timeout must be greater than zero")]
    InvalidTimeout,
}
