//! Inbound frame decoding.
//!
//! Every modem-to-host frame is `START`, a registered opcode and a fixed
//! number of remaining bytes. The registry ([`frame_length`]) and single
//! decode function ([`decode_frame`]) replace any per-frame dispatch
//! machinery: the parser looks up the total length, slices the frame out of
//! the rolling buffer and hands the slice here.

use bytes::Bytes;

use super::constants::{im, ACK, NAK};
use super::flags::{
    AllLinkCleanupStatus, AllLinkRecordFlags, ButtonEventType, CommandResponseFlags, LinkCode,
};
use super::Address;
use crate::categories::{Category, SubCategory};
use crate::x10::{X10Flags, X10Raw};

/// Total frame length (start byte included) for a registered IM opcode.
///
/// Returns `None` for opcodes the modem never produces; the parser uses
/// that to resynchronize after line noise.
pub fn frame_length(opcode: u8) -> Option<usize> {
    match opcode {
        im::STD_RESPONSE => Some(11),
        im::EXT_RESPONSE => Some(25),
        im::X10_RESPONSE => Some(4),
        im::ALL_LINK_COMPLETED => Some(10),
        im::BUTTON_EVENT => Some(3),
        im::USER_RESET => Some(2),
        im::ALL_LINK_CLEANUP_FAILURE => Some(7),
        im::ALL_LINK_RECORD => Some(10),
        im::ALL_LINK_CLEANUP => Some(3),
        im::DATABASE_RECORD => Some(12),
        _ => None,
    }
}

/// A decoded modem-to-host frame, or a command acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Echo of a host command plus its ACK/NAK terminator.
    Ack(Ack),
    /// Standard-length Insteon message (opcode 0x50).
    StdResponse(StdResponse),
    /// Extended-length Insteon message (opcode 0x51).
    ExtResponse(ExtResponse),
    /// X10 traffic (opcode 0x52).
    X10Response(X10Response),
    /// All-linking finished (opcode 0x53).
    AllLinkCompleted(AllLinkCompleted),
    /// SET button activity (opcode 0x54).
    ButtonEvent(ButtonEvent),
    /// The user reset the modem (opcode 0x55).
    UserReset,
    /// An all-link cleanup could not reach a device (opcode 0x56).
    AllLinkCleanupFailure(AllLinkCleanupFailure),
    /// One record of the modem's all-link database (opcode 0x57).
    AllLinkRecord(AllLinkRecord),
    /// All-link cleanup sequence status (opcode 0x58).
    AllLinkCleanup(AllLinkCleanup),
    /// Raw database record (opcode 0x59).
    DatabaseRecord(DatabaseRecord),
}

/// Decode a complete frame slice for a registered opcode.
///
/// `buf` must hold exactly `frame_length(opcode)` bytes starting at the
/// start byte. The parser guarantees both; out-of-registry opcodes never
/// reach this function.
pub fn decode_frame(opcode: u8, buf: &[u8]) -> Event {
    debug_assert_eq!(frame_length(opcode), Some(buf.len()));
    match opcode {
        im::STD_RESPONSE => Event::StdResponse(StdResponse::from_bytes(buf)),
        im::EXT_RESPONSE => Event::ExtResponse(ExtResponse::from_bytes(buf)),
        im::X10_RESPONSE => Event::X10Response(X10Response {
            raw: X10Raw(buf[2]),
            flags: X10Flags(buf[3]),
        }),
        im::ALL_LINK_COMPLETED => Event::AllLinkCompleted(AllLinkCompleted {
            link_code: LinkCode::from_byte(buf[2]),
            group: buf[3],
            address: Address::from_bytes(&buf[4..7]),
            category: Category::from_byte(buf[7]),
            sub_category: SubCategory(buf[8]),
            firmware: buf[9],
        }),
        im::BUTTON_EVENT => Event::ButtonEvent(ButtonEvent {
            event: ButtonEventType(buf[2]),
        }),
        im::USER_RESET => Event::UserReset,
        im::ALL_LINK_CLEANUP_FAILURE => Event::AllLinkCleanupFailure(AllLinkCleanupFailure {
            group: buf[3],
            address: Address::from_bytes(&buf[4..7]),
        }),
        im::ALL_LINK_RECORD => Event::AllLinkRecord(AllLinkRecord::from_record_bytes(&buf[2..10])),
        im::ALL_LINK_CLEANUP => Event::AllLinkCleanup(AllLinkCleanup {
            status: AllLinkCleanupStatus::from_byte(buf[2]),
        }),
        im::DATABASE_RECORD => Event::DatabaseRecord(DatabaseRecord {
            memory_address: u16::from_be_bytes([buf[2], buf[3]]),
            record: AllLinkRecord::from_record_bytes(&buf[4..12]),
        }),
        _ => unreachable!("opcode {opcode:#04x} is not registered"),
    }
}

/// Echo of a sent command plus the trailing ACK/NAK byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ack {
    /// The full echoed slice, terminator included. A bare NAK carries just
    /// the single 0x15 byte.
    pub response: Bytes,
    /// The terminator byte.
    pub kind: u8,
}

impl Ack {
    pub(crate) fn from_bytes(response: Bytes) -> Self {
        let kind = *response.last().expect("ack frame is never empty");
        Self { response, kind }
    }

    pub(crate) fn bare_nak() -> Self {
        Self {
            response: Bytes::from_static(&[NAK]),
            kind: NAK,
        }
    }

    /// Whether the terminator was a positive acknowledgement.
    #[inline]
    pub fn is_ack(&self) -> bool {
        self.kind == ACK
    }
}

/// Standard-length message from a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StdResponse {
    pub from: Address,
    pub to: Address,
    pub flags: CommandResponseFlags,
    pub cmd1: u8,
    pub cmd2: u8,
}

impl StdResponse {
    fn from_bytes(buf: &[u8]) -> Self {
        Self {
            from: Address::from_bytes(&buf[2..5]),
            to: Address::from_bytes(&buf[5..8]),
            flags: CommandResponseFlags(buf[8]),
            cmd1: buf[9],
            cmd2: buf[10],
        }
    }
}

/// Extended-length message from a device: a standard message plus a 14-byte
/// user-data block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtResponse {
    pub from: Address,
    pub to: Address,
    pub flags: CommandResponseFlags,
    pub cmd1: u8,
    pub cmd2: u8,
    pub data: [u8; 14],
}

impl ExtResponse {
    fn from_bytes(buf: &[u8]) -> Self {
        let mut data = [0u8; 14];
        data.copy_from_slice(&buf[11..25]);
        Self {
            from: Address::from_bytes(&buf[2..5]),
            to: Address::from_bytes(&buf[5..8]),
            flags: CommandResponseFlags(buf[8]),
            cmd1: buf[9],
            cmd2: buf[10],
            data,
        }
    }
}

/// X10 traffic observed on the powerline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct X10Response {
    pub raw: X10Raw,
    pub flags: X10Flags,
}

/// Result of a completed all-linking session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllLinkCompleted {
    /// `None` when the modem reports a code outside the known set.
    pub link_code: Option<LinkCode>,
    pub group: u8,
    pub address: Address,
    pub category: Category,
    pub sub_category: SubCategory,
    pub firmware: u8,
}

/// SET button activity on the modem itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ButtonEvent {
    pub event: ButtonEventType,
}

/// A device that failed to respond during all-link cleanup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllLinkCleanupFailure {
    pub group: u8,
    pub address: Address,
}

/// One entry of an all-link database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AllLinkRecord {
    pub flags: AllLinkRecordFlags,
    pub group: u8,
    pub address: Address,
    pub data: [u8; 3],
}

impl AllLinkRecord {
    /// Decode from the 8-byte record layout: flags, group, address, data.
    pub fn from_record_bytes(buf: &[u8]) -> Self {
        Self {
            flags: AllLinkRecordFlags(buf[0]),
            group: buf[1],
            address: Address::from_bytes(&buf[2..5]),
            data: [buf[5], buf[6], buf[7]],
        }
    }

    /// Encode into the 8-byte record layout used by raw database writes.
    pub fn to_bytes(&self) -> [u8; 8] {
        [
            self.flags.0,
            self.group,
            self.address.0[0],
            self.address.0[1],
            self.address.0[2],
            self.data[0],
            self.data[1],
            self.data[2],
        ]
    }
}

/// All-link cleanup sequence outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllLinkCleanup {
    pub status: AllLinkCleanupStatus,
}

/// Raw database record with its memory address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DatabaseRecord {
    pub memory_address: u16,
    pub record: AllLinkRecord,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_covers_exactly_ten_opcodes() {
        let registered: Vec<u8> = (0..=0xFF).filter(|&op| frame_length(op).is_some()).collect();
        assert_eq!(
            registered,
            vec![0x50, 0x51, 0x52, 0x53, 0x54, 0x55, 0x56, 0x57, 0x58, 0x59]
        );
    }

    #[test]
    fn decode_std_response() {
        let buf = [
            0x02, 0x50, 0x01, 0x02, 0x03, 0x0A, 0x0B, 0x0C, 0x2B, 0x19, 0xFF,
        ];
        let Event::StdResponse(rsp) = decode_frame(0x50, &buf) else {
            panic!("wrong variant");
        };
        assert_eq!(rsp.from, Address::new(0x01, 0x02, 0x03));
        assert_eq!(rsp.to, Address::new(0x0A, 0x0B, 0x0C));
        assert!(rsp.flags.acknowledgement());
        assert_eq!(rsp.cmd1, 0x19);
        assert_eq!(rsp.cmd2, 0xFF);
    }

    #[test]
    fn decode_ext_response_carries_full_user_data() {
        let mut buf = vec![
            0x02, 0x51, 0x01, 0x02, 0x03, 0x0A, 0x0B, 0x0C, 0x1B, 0x2F, 0x00,
        ];
        buf.extend((1..=14).collect::<Vec<u8>>());
        let Event::ExtResponse(rsp) = decode_frame(0x51, &buf) else {
            panic!("wrong variant");
        };
        assert!(rsp.flags.extended());
        assert_eq!(rsp.data, [1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14]);
    }

    #[test]
    fn decode_all_link_completed() {
        let buf = [0x02, 0x53, 0x00, 0x01, 0x01, 0x02, 0x03, 0x01, 0x02, 0x12];
        let Event::AllLinkCompleted(done) = decode_frame(0x53, &buf) else {
            panic!("wrong variant");
        };
        assert_eq!(done.link_code, Some(LinkCode::Responder));
        assert_eq!(done.group, 1);
        assert_eq!(done.address, Address::new(0x01, 0x02, 0x03));
        assert_eq!(done.category, Category::DimmableLighting);
        assert_eq!(done.sub_category, SubCategory(0x02));
        assert_eq!(done.firmware, 0x12);
    }

    #[test]
    fn decode_all_link_record() {
        let buf = [0x02, 0x57, 0xC0, 0x01, 0x01, 0x02, 0x03, 0x02, 0x08, 0x42];
        let Event::AllLinkRecord(record) = decode_frame(0x57, &buf) else {
            panic!("wrong variant");
        };
        assert!(record.flags.in_use());
        assert!(record.flags.controller());
        assert_eq!(record.group, 1);
        assert_eq!(record.address, Address::new(0x01, 0x02, 0x03));
        assert_eq!(record.data, [0x02, 0x08, 0x42]);
    }

    #[test]
    fn all_link_record_bytes_roundtrip() {
        let record = AllLinkRecord {
            flags: AllLinkRecordFlags::IN_USE | AllLinkRecordFlags::LAST,
            group: 7,
            address: Address::new(0xAA, 0xBB, 0xCC),
            data: [1, 2, 3],
        };
        assert_eq!(
            AllLinkRecord::from_record_bytes(&record.to_bytes()),
            record
        );
    }

    #[test]
    fn decode_database_record_embeds_record() {
        let buf = [
            0x02, 0x59, 0x0F, 0xF8, 0xE2, 0x05, 0x01, 0x02, 0x03, 0x0A, 0x0B, 0x0C,
        ];
        let Event::DatabaseRecord(db) = decode_frame(0x59, &buf) else {
            panic!("wrong variant");
        };
        assert_eq!(db.memory_address, 0x0FF8);
        assert_eq!(db.record.group, 0x05);
        assert_eq!(db.record.address, Address::new(0x01, 0x02, 0x03));
        assert_eq!(db.record.data, [0x0A, 0x0B, 0x0C]);
    }

    #[test]
    fn decode_button_and_reset_and_cleanup() {
        let Event::ButtonEvent(button) = decode_frame(0x54, &[0x02, 0x54, 0x03]) else {
            panic!("wrong variant");
        };
        assert_eq!(button.event, ButtonEventType::HELD);

        assert_eq!(decode_frame(0x55, &[0x02, 0x55]), Event::UserReset);

        let Event::AllLinkCleanup(cleanup) = decode_frame(0x58, &[0x02, 0x58, 0x06]) else {
            panic!("wrong variant");
        };
        assert_eq!(cleanup.status, AllLinkCleanupStatus::Succeeded);
    }

    #[test]
    fn decode_cleanup_failure() {
        let buf = [0x02, 0x56, 0x01, 0x09, 0x01, 0x02, 0x03];
        let Event::AllLinkCleanupFailure(failure) = decode_frame(0x56, &buf) else {
            panic!("wrong variant");
        };
        assert_eq!(failure.group, 0x09);
        assert_eq!(failure.address, Address::new(0x01, 0x02, 0x03));
    }

    #[test]
    fn ack_terminator_classification() {
        let ack = Ack::from_bytes(Bytes::from_static(&[0x02, 0x77, 0x06]));
        assert!(ack.is_ack());
        assert_eq!(ack.kind, 0x06);

        let nak = Ack::bare_nak();
        assert!(!nak.is_ack());
        assert_eq!(nak.response.as_ref(), &[0x15]);
    }
}
