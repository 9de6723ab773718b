//! Bit-field wrappers and small enumerations used across frames.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

/// Message flags byte on standard and extended responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CommandResponseFlags(pub u8);

impl CommandResponseFlags {
    /// Broadcast / NAK bit.
    #[inline]
    pub fn broadcast_nak(&self) -> bool {
        self.0 & 0x80 != 0
    }

    /// Message is part of an all-link transaction.
    #[inline]
    pub fn all_link(&self) -> bool {
        self.0 & 0x40 != 0
    }

    /// Message is an acknowledgement from the device.
    #[inline]
    pub fn acknowledgement(&self) -> bool {
        self.0 & 0x20 != 0
    }

    /// Message carries a 14-byte extended payload.
    #[inline]
    pub fn extended(&self) -> bool {
        self.0 & 0x10 != 0
    }

    /// Remaining powerline/RF hops.
    #[inline]
    pub fn hops_left(&self) -> u8 {
        (self.0 & 0x0C) >> 2
    }

    /// Maximum retransmit hops.
    #[inline]
    pub fn max_hops(&self) -> u8 {
        self.0 & 0x03
    }
}

impl fmt::Display for CommandResponseFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "broadcast_nak={} all_link={} acknowledgement={} extended={} hops_left={} max_hops={}",
            self.broadcast_nak(),
            self.all_link(),
            self.acknowledgement(),
            self.extended(),
            self.hops_left(),
            self.max_hops()
        )
    }
}

/// Flags byte on all-link database records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AllLinkRecordFlags(pub u8);

impl AllLinkRecordFlags {
    /// Record slot is occupied.
    pub const IN_USE: Self = Self(0x80);
    /// Record describes a controller link (responder when clear).
    pub const CONTROLLER: Self = Self(0x40);
    /// Record is the last entry in the database.
    pub const LAST: Self = Self(0x02);

    #[inline]
    pub fn in_use(&self) -> bool {
        self.0 & Self::IN_USE.0 != 0
    }

    #[inline]
    pub fn controller(&self) -> bool {
        self.0 & Self::CONTROLLER.0 != 0
    }

    #[inline]
    pub fn responder(&self) -> bool {
        !self.controller()
    }

    #[inline]
    pub fn last(&self) -> bool {
        self.0 & Self::LAST.0 != 0
    }

    /// Copy of these flags with the last-entry bit set or cleared.
    #[inline]
    pub fn with_last(self, last: bool) -> Self {
        if last {
            Self(self.0 | Self::LAST.0)
        } else {
            Self(self.0 & !Self::LAST.0)
        }
    }
}

impl BitOr for AllLinkRecordFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for AllLinkRecordFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// Modem configuration byte.
///
/// The auto-link, auto-LED and dead-man bits have inverted sense on the
/// wire: the bit being set in the configuration byte means the feature is
/// *disabled*. The monitor bit has normal sense. The accessors below report
/// whether the feature is enabled; the builders take "enabled" and handle
/// the inversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ModemConfiguration(pub u8);

impl ModemConfiguration {
    const AUTO_LINK_DISABLE: u8 = 0x80;
    const MONITOR: u8 = 0x40;
    const AUTO_LED_DISABLE: u8 = 0x20;
    const DEAD_MAN_DISABLE: u8 = 0x10;

    /// Automatic linking on SET-button press is enabled.
    #[inline]
    pub fn auto_link(&self) -> bool {
        self.0 & Self::AUTO_LINK_DISABLE == 0
    }

    /// Monitor mode is enabled.
    #[inline]
    pub fn monitor(&self) -> bool {
        self.0 & Self::MONITOR != 0
    }

    /// Automatic LED control is enabled.
    #[inline]
    pub fn auto_led(&self) -> bool {
        self.0 & Self::AUTO_LED_DISABLE == 0
    }

    /// The RS-232 dead-man timer is enabled.
    #[inline]
    pub fn dead_man(&self) -> bool {
        self.0 & Self::DEAD_MAN_DISABLE == 0
    }

    #[inline]
    pub fn with_auto_link(self, enabled: bool) -> Self {
        self.with_inverted(Self::AUTO_LINK_DISABLE, enabled)
    }

    #[inline]
    pub fn with_monitor(self, enabled: bool) -> Self {
        if enabled {
            Self(self.0 | Self::MONITOR)
        } else {
            Self(self.0 & !Self::MONITOR)
        }
    }

    #[inline]
    pub fn with_auto_led(self, enabled: bool) -> Self {
        self.with_inverted(Self::AUTO_LED_DISABLE, enabled)
    }

    #[inline]
    pub fn with_dead_man(self, enabled: bool) -> Self {
        self.with_inverted(Self::DEAD_MAN_DISABLE, enabled)
    }

    fn with_inverted(self, bit: u8, enabled: bool) -> Self {
        if enabled {
            Self(self.0 & !bit)
        } else {
            Self(self.0 | bit)
        }
    }
}

impl fmt::Display for ModemConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "auto_link={} monitor={} auto_led={} dead_man={}",
            self.auto_link(),
            self.monitor(),
            self.auto_led(),
            self.dead_man()
        )
    }
}

/// Link code sent with a start-all-link command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LinkCode {
    /// Enroll the modem as a responder.
    Responder = 0x00,
    /// Enroll the modem as a controller.
    Controller = 0x01,
    /// Let the devices negotiate the direction.
    Auto = 0x03,
    /// Delete the link instead of creating it.
    Delete = 0xFF,
}

impl LinkCode {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(Self::Responder),
            0x01 => Some(Self::Controller),
            0x03 => Some(Self::Auto),
            0xFF => Some(Self::Delete),
            _ => None,
        }
    }
}

/// Sub-command for managing the modem's own all-link database (opcode 0x6F).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ManageAllLinkCommand {
    FindFirst = 0x00,
    FindNext = 0x01,
    Modify = 0x20,
    AddController = 0x40,
    AddResponder = 0x41,
    Delete = 0x80,
}

/// Raw SET-button event code reported by the modem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ButtonEventType(pub u8);

impl ButtonEventType {
    pub const TAPPED: Self = Self(0x02);
    pub const HELD: Self = Self(0x03);
    pub const RELEASED: Self = Self(0x04);
}

/// Outcome of an all-link cleanup sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllLinkCleanupStatus {
    Succeeded,
    Aborted,
    Unknown(u8),
}

impl AllLinkCleanupStatus {
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            super::constants::ACK => Self::Succeeded,
            super::constants::NAK => Self::Aborted,
            other => Self::Unknown(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_response_flags_fields() {
        // ack from device: acknowledgement + 2 hops left + max 3 hops
        let flags = CommandResponseFlags(0x2B);
        assert!(!flags.broadcast_nak());
        assert!(!flags.all_link());
        assert!(flags.acknowledgement());
        assert!(!flags.extended());
        assert_eq!(flags.hops_left(), 2);
        assert_eq!(flags.max_hops(), 3);
    }

    #[test]
    fn all_link_record_flags_bits() {
        let flags = AllLinkRecordFlags::IN_USE | AllLinkRecordFlags::CONTROLLER;
        assert!(flags.in_use());
        assert!(flags.controller());
        assert!(!flags.responder());
        assert!(!flags.last());

        let flags = flags.with_last(true);
        assert!(flags.last());
        assert!(!flags.with_last(false).last());
    }

    #[test]
    fn modem_configuration_inverted_sense() {
        // 0x48 = monitor set, auto-link/auto-LED/dead-man disable bits clear:
        // every feature reads as enabled.
        let cfg = ModemConfiguration(0x48);
        assert!(cfg.auto_link());
        assert!(cfg.monitor());
        assert!(cfg.auto_led());
        assert!(cfg.dead_man());
    }

    #[test]
    fn modem_configuration_builders_roundtrip() {
        let cfg = ModemConfiguration::default()
            .with_auto_link(false)
            .with_monitor(true)
            .with_auto_led(true)
            .with_dead_man(false);

        assert!(!cfg.auto_link());
        assert!(cfg.monitor());
        assert!(cfg.auto_led());
        assert!(!cfg.dead_man());
        assert_eq!(cfg.0, 0x80 | 0x40 | 0x10);
    }

    #[test]
    fn link_code_from_byte() {
        assert_eq!(LinkCode::from_byte(0x03), Some(LinkCode::Auto));
        assert_eq!(LinkCode::from_byte(0x42), None);
    }

    #[test]
    fn cleanup_status_from_byte() {
        assert_eq!(
            AllLinkCleanupStatus::from_byte(0x06),
            AllLinkCleanupStatus::Succeeded
        );
        assert_eq!(
            AllLinkCleanupStatus::from_byte(0x15),
            AllLinkCleanupStatus::Aborted
        );
        assert_eq!(
            AllLinkCleanupStatus::from_byte(0x7F),
            AllLinkCleanupStatus::Unknown(0x7F)
        );
    }
}
