//! Wire protocol constants.
//!
//! Every frame in either direction starts with [`START`]. Host commands are
//! closed by the modem echoing the command followed by a single [`ACK`] or
//! [`NAK`] terminator byte.

/// Start-of-frame byte for both directions.
pub const START: u8 = 0x02;

/// Positive acknowledgement terminator.
pub const ACK: u8 = 0x06;

/// Negative acknowledgement terminator ("not ready").
pub const NAK: u8 = 0x15;

/// Modem-to-host (IM) frame opcodes.
pub mod im {
    /// Standard-length message received (11 bytes).
    pub const STD_RESPONSE: u8 = 0x50;
    /// Extended-length message received (25 bytes).
    pub const EXT_RESPONSE: u8 = 0x51;
    /// X10 message received (4 bytes).
    pub const X10_RESPONSE: u8 = 0x52;
    /// All-linking completed (10 bytes).
    pub const ALL_LINK_COMPLETED: u8 = 0x53;
    /// Modem button event (3 bytes).
    pub const BUTTON_EVENT: u8 = 0x54;
    /// User reset detected (2 bytes).
    pub const USER_RESET: u8 = 0x55;
    /// All-link cleanup failure report (7 bytes).
    pub const ALL_LINK_CLEANUP_FAILURE: u8 = 0x56;
    /// All-link record response (10 bytes).
    pub const ALL_LINK_RECORD: u8 = 0x57;
    /// All-link cleanup status report (3 bytes).
    pub const ALL_LINK_CLEANUP: u8 = 0x58;
    /// Database record response (12 bytes).
    pub const DATABASE_RECORD: u8 = 0x59;
}

/// Host-to-modem command opcodes.
pub mod host {
    pub const GET_INFO: u8 = 0x60;
    pub const SEND_ALL_LINK: u8 = 0x61;
    pub const SEND_MSG: u8 = 0x62;
    pub const SEND_X10: u8 = 0x63;
    pub const START_ALL_LINK: u8 = 0x64;
    pub const CANCEL_ALL_LINK: u8 = 0x65;
    pub const SET_DEVICE_CATEGORY: u8 = 0x66;
    pub const RESET: u8 = 0x67;
    pub const FIRST_ALL_LINK_RECORD: u8 = 0x69;
    pub const NEXT_ALL_LINK_RECORD: u8 = 0x6A;
    pub const SET_CONFIG: u8 = 0x6B;
    pub const LAST_SENDER_RECORD: u8 = 0x6C;
    pub const LED_ON: u8 = 0x6D;
    pub const LED_OFF: u8 = 0x6E;
    pub const MANAGE_ALL_LINK_RECORD: u8 = 0x6F;
    pub const RF_SLEEP: u8 = 0x72;
    pub const GET_CONFIG: u8 = 0x73;
    pub const READ_DB: u8 = 0x75;
    pub const WRITE_DB: u8 = 0x76;
    pub const BEEP: u8 = 0x77;
}

/// Device-level command numbers carried in `cmd1` of a PLM send.
pub mod control {
    pub const PRODUCT_DATA: u8 = 0x03;
    pub const ENTER_LINKING: u8 = 0x09;
    pub const ID_REQUEST: u8 = 0x10;
    pub const ON: u8 = 0x11;
    pub const FAST_ON: u8 = 0x12;
    pub const OFF: u8 = 0x13;
    pub const FAST_OFF: u8 = 0x14;
    pub const BRIGHT: u8 = 0x15;
    pub const DIM: u8 = 0x16;
    pub const START_DIM: u8 = 0x17;
    pub const STOP_DIM: u8 = 0x18;
    pub const STATUS_REQUEST: u8 = 0x19;
    pub const GET_OPERATING_FLAGS: u8 = 0x1F;
    pub const READ_WRITE_ALL_LINK: u8 = 0x2F;
    pub const PING: u8 = 0x0F;
}
