//! Error types for insteon-plm.

use thiserror::Error;

use crate::protocol::Address;

/// Main error type for all hub and device operations.
#[derive(Debug, Error)]
pub enum InsteonError {
    /// I/O error on the underlying transport.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serial port error (open/configure).
    #[error("serial port error: {0}")]
    Serial(#[from] tokio_serial::Error),

    /// HTTP error talking to a Hub2.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The modem answered a command with a NAK.
    #[error("device not ready")]
    NotReady,

    /// No acknowledgement arrived within the deadline.
    #[error("ack timeout")]
    AckTimeout,

    /// The command echo was terminated by something other than ACK or NAK.
    #[error("unexpected acknowledgement byte: {0:#04x}")]
    UnexpectedAckByte(u8),

    /// Raw database I/O requires 8-byte aligned memory addresses.
    #[error("database address {0:#06x} is not aligned to an 8 byte boundary")]
    AddressMisaligned(u16),

    /// No all-link database entry matched the given key.
    #[error("no database entry for address {address}, group {group}, controller {controller}")]
    DbEntryNotFound {
        address: Address,
        group: u8,
        controller: bool,
    },

    /// An all-link database entry with the given key already exists.
    #[error("database entry for address {address}, group {group}, controller {controller} already exists")]
    DbEntryAlreadyExists {
        address: Address,
        group: u8,
        controller: bool,
    },

    /// The Hub2 buffer status response could not be decoded.
    #[error("malformed buffer status: {0}")]
    BufferStatus(String),

    /// The receive pump has exited and the hub is no longer usable.
    #[error("hub connection closed")]
    Closed,
}

/// Result type alias using InsteonError.
pub type Result<T> = std::result::Result<T, InsteonError>;
