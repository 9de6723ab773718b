//! Per-device conveniences and remote link-database maintenance.
//!
//! A [`Device`] is a thin handle over a [`Hub`] and an address: every
//! method composes the hub's send/receive primitives. The link-database
//! maintenance at the bottom is the involved part; devices store their
//! all-link records at 8-byte strides growing downward in memory, with the
//! tail (lowest address) flagged as the last entry.

use std::collections::BTreeMap;
use std::time::Duration;

use tracing::debug;

use crate::categories::{Category, Product, SubCategory};
use crate::error::{InsteonError, Result};
use crate::hub::Hub;
use crate::protocol::constants::control;
use crate::protocol::{calculate_crc, Address, AllLinkRecord, AllLinkRecordFlags};

/// Settle time between consecutive writes to a device's link database.
pub const DB_SETTLE: Duration = Duration::from_millis(500);

/// Memory address of the first (highest) link record slot.
const DB_TOP: u16 = 0x0FF8;

/// Record stride in device memory.
const DB_STRIDE: u16 = 0x8;

/// Handle to one device on the network.
pub struct Device<'a> {
    hub: &'a Hub,
    address: Address,
}

/// Handle to an all-link group.
pub struct Group<'a> {
    hub: &'a Hub,
    group: u8,
}

impl Hub {
    /// Handle to the device at `address`.
    pub fn device(&self, address: Address) -> Device<'_> {
        Device { hub: self, address }
    }

    /// Handle to group `group`.
    pub fn group(&self, group: u8) -> Group<'_> {
        Group { hub: self, group }
    }
}

/// Power state reported by a status query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceStatus {
    /// The queried device.
    pub device_addr: Address,
    /// The modem the response was addressed to.
    pub modem_addr: Address,
    /// Raw hop information from the response flags.
    pub hop_count: u8,
    /// Database change counter.
    pub delta: u8,
    /// Current power level (0x00 off to 0xFF fully on).
    pub level: u8,
}

/// Device operating flags. The LED and load-sense bits have inverted
/// sense: set means disabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceOpFlags(pub u8);

impl DeviceOpFlags {
    #[inline]
    pub fn program_lock(&self) -> bool {
        self.0 & 0x01 != 0
    }

    #[inline]
    pub fn led_transmit(&self) -> bool {
        self.0 & 0x02 != 0
    }

    #[inline]
    pub fn resume_dim(&self) -> bool {
        self.0 & 0x04 != 0
    }

    #[inline]
    pub fn led(&self) -> bool {
        self.0 & 0x10 == 0
    }

    #[inline]
    pub fn load_sense(&self) -> bool {
        self.0 & 0x20 == 0
    }
}

impl<'a> Device<'a> {
    pub fn address(&self) -> Address {
        self.address
    }

    /// Turn the device on at full level.
    pub async fn turn_on(&self) -> Result<()> {
        self.turn_on_ramp(false).await
    }

    /// Turn the device on, optionally ramping (dimmable devices only).
    pub async fn turn_on_ramp(&self, ramp: bool) -> Result<()> {
        self.turn_on_level(ramp, 0xFF).await
    }

    /// Turn a dimmable device on at a specific level.
    pub async fn turn_on_level(&self, ramp: bool, level: u8) -> Result<()> {
        let cmd = if ramp { control::ON } else { control::FAST_ON };
        self.hub.send_message(self.address, cmd, level).await?;
        Ok(())
    }

    /// Turn the device off.
    pub async fn turn_off(&self) -> Result<()> {
        self.turn_off_ramp(false).await
    }

    /// Turn the device off, optionally ramping.
    pub async fn turn_off_ramp(&self, ramp: bool) -> Result<()> {
        let cmd = if ramp { control::OFF } else { control::FAST_OFF };
        self.hub.send_message(self.address, cmd, 0).await?;
        Ok(())
    }

    /// Set the speed of a fan device.
    pub async fn set_fan_level(&self, level: u8) -> Result<()> {
        let mut data = [0u8; 14];
        data[0] = 2;
        self.hub
            .send_extended_message(self.address, control::ON, level, data)
            .await?;
        Ok(())
    }

    /// Round-trip a ping through the device.
    pub async fn ping(&self) -> Result<()> {
        self.hub.send_message(self.address, control::PING, 0).await?;
        Ok(())
    }

    /// Query product identification.
    pub async fn get_product_data(&self) -> Result<Product> {
        self.hub
            .send_message(self.address, control::PRODUCT_DATA, 0)
            .await?;
        let rsp = self.hub.expect_extended_response().await?;

        let data = rsp.data;
        let category = Category::from_byte(data[4]);
        Ok(Product {
            product_key: u32::from(data[1]) << 16 | u32::from(data[2]) << 8 | u32::from(data[3]),
            category,
            sub_category: SubCategory(data[5]),
            description: category.description(),
        })
    }

    /// Read the device's user-assigned name.
    pub async fn get_name(&self) -> Result<String> {
        self.hub
            .send_message(self.address, control::PRODUCT_DATA, 2)
            .await?;
        let rsp = self.hub.expect_extended_response().await?;
        Ok(String::from_utf8_lossy(&rsp.data)
            .trim_matches('\0')
            .to_string())
    }

    /// Write the device's user-assigned name (truncated to 14 bytes).
    pub async fn set_name(&self, name: &str) -> Result<()> {
        let mut data = [0u8; 14];
        let bytes = name.as_bytes();
        let len = bytes.len().min(data.len());
        data[..len].copy_from_slice(&bytes[..len]);

        self.hub
            .send_extended_message(self.address, control::PRODUCT_DATA, 2, data)
            .await?;
        Ok(())
    }

    /// Current power status of the device.
    pub async fn get_status(&self) -> Result<DeviceStatus> {
        self.get_status_channel(0).await
    }

    /// Current power status of one channel of a multi-channel device.
    pub async fn get_status_channel(&self, channel: u8) -> Result<DeviceStatus> {
        let rsp = self
            .hub
            .send_message(self.address, control::STATUS_REQUEST, channel)
            .await?;
        Ok(DeviceStatus {
            device_addr: rsp.from,
            modem_addr: rsp.to,
            hop_count: rsp.flags.0,
            delta: rsp.cmd1,
            level: rsp.cmd2,
        })
    }

    /// Read the device's operating flags.
    pub async fn get_operating_flags(&self) -> Result<DeviceOpFlags> {
        let rsp = self
            .hub
            .send_message(self.address, control::GET_OPERATING_FLAGS, 0)
            .await?;
        Ok(DeviceOpFlags(rsp.cmd2))
    }

    /// Tell the device to enter linking mode for `group`.
    pub async fn start_all_link(&self, group: u8) -> Result<()> {
        self.hub
            .send_message(self.address, control::ENTER_LINKING, group)
            .await?;
        Ok(())
    }

    /// Read the device's entire all-link database, keyed by memory address.
    ///
    /// The device streams its records as extended responses; the entry
    /// carrying the last-entry flag terminates the enumeration and is
    /// included in the result.
    pub async fn get_database(&self) -> Result<BTreeMap<u16, AllLinkRecord>> {
        self.hub
            .send_extended_message(self.address, control::READ_WRITE_ALL_LINK, 0, [0u8; 14])
            .await?;

        let mut db = BTreeMap::new();
        loop {
            let rsp = self.hub.expect_extended_response().await?;
            let mem = u16::from_be_bytes([rsp.data[2], rsp.data[3]]);
            let record = AllLinkRecord::from_record_bytes(&rsp.data[5..13]);

            db.insert(mem, record);
            if record.flags.last() {
                return Ok(db);
            }
        }
    }

    /// Add a link record for `(addr, group, controller)`.
    ///
    /// The new record becomes the tail; the previous tail's last-entry flag
    /// is cleared.
    pub async fn add_all_link(
        &self,
        addr: Address,
        group: u8,
        data: [u8; 3],
        controller: bool,
    ) -> Result<()> {
        let db = self.get_database().await?;
        let (found, last) = find_db_entry(&db, addr, group, controller);
        if found.is_some() {
            return Err(InsteonError::DbEntryAlreadyExists {
                address: addr,
                group,
                controller,
            });
        }

        // The database grows downward: the new tail sits one stride below
        // the current one.
        let mem = match last {
            Some(last) => last - DB_STRIDE,
            None => DB_TOP,
        };

        let mut flags = AllLinkRecordFlags::IN_USE | AllLinkRecordFlags::LAST;
        if controller {
            flags |= AllLinkRecordFlags::CONTROLLER;
        }

        debug!("adding link record for {addr} group {group} at {mem:#06x}");
        self.write_record(mem, flags, group, addr, data).await?;

        if let Some(last_addr) = last {
            let old_last = db[&last_addr];
            if old_last.flags.last() {
                tokio::time::sleep(DB_SETTLE).await;
                self.write_record(
                    last_addr,
                    old_last.flags.with_last(false),
                    old_last.group,
                    old_last.address,
                    old_last.data,
                )
                .await?;
            }
        }

        Ok(())
    }

    /// Rewrite the data bytes of an existing link record.
    pub async fn update_all_link(
        &self,
        addr: Address,
        group: u8,
        data: [u8; 3],
        controller: bool,
    ) -> Result<()> {
        let db = self.get_database().await?;
        let (found, last) = find_db_entry(&db, addr, group, controller);
        let mem = found.ok_or(InsteonError::DbEntryNotFound {
            address: addr,
            group,
            controller,
        })?;

        let mut flags = AllLinkRecordFlags::IN_USE;
        if Some(mem) == last {
            flags |= AllLinkRecordFlags::LAST;
        }
        if controller {
            flags |= AllLinkRecordFlags::CONTROLLER;
        }

        self.write_record(mem, flags, group, addr, data).await
    }

    /// Delete the link record for `(addr, group, controller)`.
    ///
    /// The victim is swapped with the current tail (when they differ), the
    /// tail slot is zeroed, and whichever slot became the new tail gets the
    /// last-entry flag.
    pub async fn delete_all_link(&self, addr: Address, group: u8, controller: bool) -> Result<()> {
        let db = self.get_database().await?;
        let (found, last) = find_db_entry(&db, addr, group, controller);
        let mem = found.ok_or(InsteonError::DbEntryNotFound {
            address: addr,
            group,
            controller,
        })?;
        let last = last.expect("database cannot be empty when an entry was found");
        let second_last = db.keys().copied().filter(|&a| a != last).min();

        debug!("deleting link record at {mem:#06x}, tail at {last:#06x}");

        if mem != last {
            // Move the tail record into the victim's slot. It becomes the
            // new tail when the victim held the second-lowest address.
            let keep = db[&last];
            let keep_flags = keep.flags.with_last(second_last == Some(mem));
            debug!("swapping tail {last:#06x} into victim slot {mem:#06x}");
            self.write_record(mem, keep_flags, keep.group, keep.address, keep.data)
                .await?;
            tokio::time::sleep(DB_SETTLE).await;
        }

        // Zero the old tail slot.
        self.write_record(last, AllLinkRecordFlags::default(), 0, Address::default(), [0; 3])
            .await?;

        // Flag the new tail, unless the swap above already handled it.
        if let Some(second) = second_last {
            if second != mem {
                tokio::time::sleep(DB_SETTLE).await;
                let new_last = db[&second];
                self.write_record(
                    second,
                    new_last.flags.with_last(true),
                    new_last.group,
                    new_last.address,
                    new_last.data,
                )
                .await?;
            }
        }

        Ok(())
    }

    async fn write_record(
        &self,
        mem: u16,
        flags: AllLinkRecordFlags,
        group: u8,
        addr: Address,
        data: [u8; 3],
    ) -> Result<()> {
        self.hub
            .send_extended_message(
                self.address,
                control::READ_WRITE_ALL_LINK,
                0,
                modify_db_command(mem, flags, group, addr, data),
            )
            .await?;
        Ok(())
    }
}

impl<'a> Group<'a> {
    /// Turn on every responder in the group.
    pub async fn turn_on(&self) -> Result<()> {
        self.hub.send_group_command(control::ON, self.group).await
    }

    /// Turn off every responder in the group.
    pub async fn turn_off(&self) -> Result<()> {
        self.hub.send_group_command(control::OFF, self.group).await
    }
}

/// Locate an entry by `(address, group, controller)` and report the tail.
///
/// The data bytes deliberately do not participate in the match. Returns the
/// matching memory address (if any) and the lowest memory address present
/// (the tail of a downward-growing database).
fn find_db_entry(
    db: &BTreeMap<u16, AllLinkRecord>,
    addr: Address,
    group: u8,
    controller: bool,
) -> (Option<u16>, Option<u16>) {
    let found = db
        .iter()
        .find(|(_, rec)| {
            rec.address == addr && rec.group == group && rec.flags.controller() == controller
        })
        .map(|(&mem, _)| mem);
    let last = db.keys().copied().min();
    (found, last)
}

/// User-data block for a link-database modification, CRC included.
fn modify_db_command(
    mem: u16,
    flags: AllLinkRecordFlags,
    group: u8,
    addr: Address,
    data: [u8; 3],
) -> [u8; 14] {
    let mut cmd = [0u8; 14];
    cmd[1] = 0x02; // modify
    cmd[2] = ((mem >> 8) as u8) & 0x0F;
    cmd[3] = mem as u8;
    cmd[5] = flags.0;
    cmd[6] = group;
    cmd[7..10].copy_from_slice(&addr.0);
    cmd[10..13].copy_from_slice(&data);

    let mut crc_input = [0u8; 16];
    crc_input[0] = control::READ_WRITE_ALL_LINK;
    crc_input[2..].copy_from_slice(&cmd);
    cmd[13] = calculate_crc(&crc_input);

    cmd
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(addr: Address, group: u8, flags: AllLinkRecordFlags) -> AllLinkRecord {
        AllLinkRecord {
            flags,
            group,
            address: addr,
            data: [0, 0, 0],
        }
    }

    #[test]
    fn op_flags_inverted_bits() {
        let flags = DeviceOpFlags(0x07);
        assert!(flags.program_lock());
        assert!(flags.led_transmit());
        assert!(flags.resume_dim());
        assert!(flags.led());
        assert!(flags.load_sense());

        let flags = DeviceOpFlags(0x30);
        assert!(!flags.led());
        assert!(!flags.load_sense());
    }

    #[test]
    fn find_db_entry_matches_triple_only() {
        let a = Address::new(1, 2, 3);
        let mut db = BTreeMap::new();
        db.insert(
            0x0FF8,
            record(a, 1, AllLinkRecordFlags::IN_USE | AllLinkRecordFlags::CONTROLLER),
        );
        db.insert(0x0FF0, record(a, 1, AllLinkRecordFlags::IN_USE));
        db.insert(
            0x0FE8,
            record(a, 2, AllLinkRecordFlags::IN_USE | AllLinkRecordFlags::LAST),
        );

        // Same address and group, distinguished by the controller flag.
        let (found, last) = find_db_entry(&db, a, 1, true);
        assert_eq!(found, Some(0x0FF8));
        assert_eq!(last, Some(0x0FE8));

        let (found, _) = find_db_entry(&db, a, 1, false);
        assert_eq!(found, Some(0x0FF0));

        let (found, _) = find_db_entry(&db, a, 9, true);
        assert_eq!(found, None);
    }

    #[test]
    fn find_db_entry_tail_is_lowest_address() {
        let mut db = BTreeMap::new();
        db.insert(0x0FF8, record(Address::new(1, 1, 1), 0, AllLinkRecordFlags::IN_USE));
        db.insert(0x0FD0, record(Address::new(2, 2, 2), 0, AllLinkRecordFlags::IN_USE));
        let (_, last) = find_db_entry(&db, Address::new(9, 9, 9), 0, false);
        assert_eq!(last, Some(0x0FD0));
    }

    #[test]
    fn modify_db_command_layout_and_crc() {
        let cmd = modify_db_command(
            0x0FE7,
            AllLinkRecordFlags::default(),
            0,
            Address::default(),
            [0; 3],
        );
        assert_eq!(cmd[0], 0);
        assert_eq!(cmd[1], 0x02);
        assert_eq!(cmd[2], 0x0F);
        assert_eq!(cmd[3], 0xE7);
        // CRC over cmd1/cmd2 and the 14 data bytes: the 0xd7 test vector.
        assert_eq!(cmd[13], 0xD7);
    }

    #[test]
    fn modify_db_command_masks_address_to_nibble() {
        let cmd = modify_db_command(
            0xABCD,
            AllLinkRecordFlags::IN_USE,
            5,
            Address::new(1, 2, 3),
            [4, 5, 6],
        );
        assert_eq!(cmd[2], 0x0B);
        assert_eq!(cmd[3], 0xCD);
        assert_eq!(cmd[5], 0x80);
        assert_eq!(cmd[6], 5);
        assert_eq!(&cmd[7..10], &[1, 2, 3]);
        assert_eq!(&cmd[10..13], &[4, 5, 6]);
    }
}
