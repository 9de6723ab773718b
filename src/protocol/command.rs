//! Outbound command framing.
//!
//! Every host-to-modem frame is `START`, an opcode, and an opcode-specific
//! payload. The builders here cover the 0x62 send variants; the simpler
//! fixed commands are assembled inline by the hub operations.

use super::constants::{host, START};
use super::Address;

/// Flags byte for a standard PLM send: hops-left 3, max retransmit 3.
pub const STD_SEND_FLAGS: u8 = 0x0F;

/// Flags byte for a group send: broadcast and group bits on top of the
/// standard hop settings.
pub const GROUP_SEND_FLAGS: u8 = 0x80 | 0x40 | STD_SEND_FLAGS;

/// Flags byte for an extended PLM send: extended + ack + hop settings.
pub const EXT_SEND_FLAGS: u8 = 0x10 | 0x20 | STD_SEND_FLAGS;

/// Build a standard PLM send (opcode 0x62) addressed to a single device.
pub fn build_plm_command(addr: Address, cmd1: u8, cmd2: u8) -> Vec<u8> {
    vec![
        START,
        host::SEND_MSG,
        addr.0[0],
        addr.0[1],
        addr.0[2],
        STD_SEND_FLAGS,
        cmd1,
        cmd2,
    ]
}

/// Build a group PLM send: the address bytes carry the group number and the
/// flags request an all-link broadcast.
pub fn build_group_plm_command(group: u8, cmd1: u8, cmd2: u8) -> Vec<u8> {
    vec![
        START,
        host::SEND_MSG,
        0x00,
        0x00,
        group,
        GROUP_SEND_FLAGS,
        cmd1,
        cmd2,
    ]
}

/// Build an extended PLM send carrying a 14-byte user-data block.
pub fn build_ext_plm_command(addr: Address, cmd1: u8, cmd2: u8, user_data: [u8; 14]) -> Vec<u8> {
    let mut cmd = Vec::with_capacity(22);
    cmd.extend_from_slice(&[
        START,
        host::SEND_MSG,
        addr.0[0],
        addr.0[1],
        addr.0[2],
        EXT_SEND_FLAGS,
        cmd1,
        cmd2,
    ]);
    cmd.extend_from_slice(&user_data);
    cmd
}

/// Payload checksum for device-level database commands.
///
/// Low byte of the bitwise NOT of `1 + sum(buf)`, where `buf` is the 16
/// bytes cmd1, cmd2 and the first 14 user-data bytes. This is a property of
/// the Insteon application payload, not of the PLM transport framing.
pub fn calculate_crc(buf: &[u8]) -> u8 {
    let mut sum: u32 = 1;
    for &byte in buf {
        sum += u32::from(byte);
    }
    !(sum as u8)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn std_command_layout() {
        let cmd = build_plm_command(Address::new(0x01, 0x02, 0x03), 0x11, 0xFF);
        assert_eq!(cmd, vec![0x02, 0x62, 0x01, 0x02, 0x03, 0x0F, 0x11, 0xFF]);
    }

    #[test]
    fn group_command_layout() {
        let cmd = build_group_plm_command(0x07, 0x13, 0x00);
        assert_eq!(cmd, vec![0x02, 0x62, 0x00, 0x00, 0x07, 0xCF, 0x13, 0x00]);
    }

    #[test]
    fn extended_command_layout() {
        let mut data = [0u8; 14];
        data[0] = 0xAA;
        data[13] = 0xBB;
        let cmd = build_ext_plm_command(Address::new(0x0A, 0x0B, 0x0C), 0x2F, 0x00, data);

        assert_eq!(cmd.len(), 22);
        assert_eq!(&cmd[..8], &[0x02, 0x62, 0x0A, 0x0B, 0x0C, 0x3F, 0x2F, 0x00]);
        assert_eq!(cmd[8], 0xAA);
        assert_eq!(cmd[21], 0xBB);
    }

    #[test]
    fn crc_known_vector() {
        let buf = [
            0x2F, 0x00, 0x00, 0x02, 0x0F, 0xE7, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            0x00, 0x00,
        ];
        assert_eq!(calculate_crc(&buf), 0xD7);
    }

    #[test]
    fn crc_wraps_to_low_byte() {
        // 0xFF * 16 + 1 = 0xFF1; low byte 0xF1, inverted 0x0E.
        assert_eq!(calculate_crc(&[0xFF; 16]), 0x0E);
    }
}
