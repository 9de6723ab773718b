//! # insteon-plm
//!
//! Host-side driver for Insteon power line modems (PLMs). The crate speaks
//! the modem's binary serial protocol, mediates between host-initiated
//! commands and asynchronous network events, and exposes a typed API over
//! three transports: a local serial port, a raw TCP socket to a
//! first-generation network hub, and the HTTP polling interface of a
//! second-generation hub.
//!
//! ## Architecture
//!
//! - **Transport** ([`transport`]): one duplex byte stream contract for all
//!   three channels.
//! - **Protocol** ([`protocol`]): outbound command builders, the inbound
//!   frame registry, and the rolling-buffer parser that correlates command
//!   echoes with pending acknowledgements.
//! - **Hub** ([`Hub`]): the streaming engine - a receive pump, a serialized
//!   request engine, and fan-out to event listeners.
//! - **Device** ([`Device`]): per-device conveniences and remote link
//!   database maintenance on top of the hub primitives.
//!
//! ## Example
//!
//! ```ignore
//! use insteon_plm::{Address, Hub};
//!
//! #[tokio::main]
//! async fn main() -> insteon_plm::Result<()> {
//!     let hub = Hub::open_serial("/dev/ttyUSB0")?;
//!     let info = hub.get_info().await?;
//!     println!("modem {} ({})", info.address, info.category);
//!
//!     hub.device(Address::new(0x0A, 0x0B, 0x0C)).turn_on().await
//! }
//! ```

pub mod categories;
pub mod device;
pub mod error;
pub mod hub;
pub mod protocol;
pub mod transport;
pub mod x10;

pub use categories::{Category, Product, SubCategory};
pub use device::{Device, DeviceOpFlags, DeviceStatus, Group};
pub use error::{InsteonError, Result};
pub use hub::{CommDirection, CommLogger, Hub, ListenerId, ModemInfo, Notification};
pub use protocol::{
    Address, AllLinkCompleted, AllLinkRecord, AllLinkRecordFlags, Event, LinkCode,
    ManageAllLinkCommand, ModemConfiguration,
};
