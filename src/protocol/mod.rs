//! Protocol module - wire codec, frame registry and stream parsing.
//!
//! This module implements both directions of the PLM serial protocol:
//! - outbound command builders and the application-payload CRC
//! - the inbound frame registry and single decode function
//! - the rolling-buffer parser that correlates command echoes with
//!   pending acknowledgements and extracts event frames

mod address;
pub mod command;
pub mod constants;
mod event;
mod flags;
mod parser;

pub use address::Address;
pub use command::{
    build_ext_plm_command, build_group_plm_command, build_plm_command, calculate_crc,
};
pub use event::{
    decode_frame, frame_length, Ack, AllLinkCleanup, AllLinkCleanupFailure, AllLinkCompleted,
    AllLinkRecord, ButtonEvent, DatabaseRecord, Event, ExtResponse, StdResponse, X10Response,
};
pub use flags::{
    AllLinkCleanupStatus, AllLinkRecordFlags, ButtonEventType, CommandResponseFlags, LinkCode,
    ManageAllLinkCommand, ModemConfiguration,
};

pub(crate) use parser::ParseBuffer;
