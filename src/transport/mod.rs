//! Transport module - the duplex byte streams a hub can speak over.
//!
//! The streaming core only needs one thing from a physical channel: a
//! duplex byte stream. All three channels reduce to the [`Transport`]
//! contract:
//!
//! - a local PLM on a serial port ([`serial`])
//! - a first-generation network hub exposing a raw TCP socket ([`tcp`])
//! - a second-generation hub whose only interface is HTTP polling
//!   ([`http`]); its ticker is a detail hidden behind the trait

pub mod http;
pub mod serial;
pub mod tcp;

use tokio::io::{AsyncRead, AsyncWrite};

pub use http::HttpTransport;

/// Duplex byte stream contract consumed by the hub.
///
/// The hub takes the transport by value, splits it, and gives the read half
/// to the receive pump and the write half to the request engine. Closing is
/// dropping the hub.
pub trait Transport: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> Transport for T {}
