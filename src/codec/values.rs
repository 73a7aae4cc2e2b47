//! READ SMART DATA and READ SMART THRESHOLDS pages.

use super::{expect_len, le16, put16, seal, SECTOR_SIZE};
use crate::error::Result;

pub const NUM_ATTRIBUTES: usize = 30;
const ATTR_BASE: usize = 2;
const ATTR_SIZE: usize = 12;

/// One vendor attribute slot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Attribute {
    pub id:       u8,
    pub flags:    u16,
    pub current:  u8,
    pub worst:    u8,
    pub raw:      [u8; 6],
    pub reserved: u8,
}

impl Attribute {
    fn from_slot(b: &[u8]) -> Self {
        let mut raw = [0u8; 6];
        raw.copy_from_slice(&b[5..11]);
        Self {
            id:       b[0],
            flags:    le16(b, 1),
            current:  b[3],
            worst:    b[4],
            raw,
            reserved: b[11],
        }
    }

    fn write_slot(&self, b: &mut [u8]) {
        b[0] = self.id;
        put16(b, 1, self.flags);
        b[3] = self.current;
        b[4] = self.worst;
        b[5..11].copy_from_slice(&self.raw);
        b[11] = self.reserved;
    }

    pub fn is_empty(&self) -> bool {
        self.id == 0
    }

    /// Bit 0: pre-failure (set) vs usage (clear).
    pub fn prefailure(&self) -> bool {
        self.flags & 0x0001 != 0
    }

    /// Bit 1: updated during normal operation.
    pub fn online(&self) -> bool {
        self.flags & 0x0002 != 0
    }

    /// Six raw bytes as an unsigned little-endian integer.
    pub fn raw48(&self) -> u64 {
        self.raw.iter().rev().fold(0u64, |v, b| (v << 8) | *b as u64)
    }
}

/// Offline data collection capability bits (byte 367).
pub mod cap {
    pub const EXEC_OFFLINE_IMMEDIATE: u8 = 0x01;
    pub const ABORT_ON_COMMAND:       u8 = 0x04;
    pub const SURFACE_SCAN:           u8 = 0x08;
    pub const SELF_TEST:              u8 = 0x10;
    pub const CONVEYANCE:             u8 = 0x20;
    pub const SELECTIVE:              u8 = 0x40;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmartValues {
    pub revision:                u16,
    pub attributes:              [Attribute; NUM_ATTRIBUTES],
    pub offline_status:          u8,
    pub self_test_exec_status:   u8,
    pub total_offline_seconds:   u16,
    pub offline_capability:      u8,
    pub smart_capability:        u16,
    pub errorlog_capability:     u8,
    pub short_test_minutes:      u8,
    pub extended_test_minutes:   u8,
    pub conveyance_test_minutes: u8,
    pub extended_test_minutes_w: u16,
}

impl Default for SmartValues {
    fn default() -> Self {
        Self {
            revision:                0x0010,
            attributes:              [Attribute::default(); NUM_ATTRIBUTES],
            offline_status:          0,
            self_test_exec_status:   0,
            total_offline_seconds:   0,
            offline_capability:      0,
            smart_capability:        0,
            errorlog_capability:     0,
            short_test_minutes:      0,
            extended_test_minutes:   0,
            conveyance_test_minutes: 0,
            extended_test_minutes_w: 0,
        }
    }
}

impl SmartValues {
    pub fn from_page(buf: &[u8]) -> Result<Self> {
        expect_len(buf, "SMART data", SECTOR_SIZE)?;
        let mut attributes = [Attribute::default(); NUM_ATTRIBUTES];
        for (i, a) in attributes.iter_mut().enumerate() {
            let off = ATTR_BASE + i * ATTR_SIZE;
            *a = Attribute::from_slot(&buf[off..off + ATTR_SIZE]);
        }
        Ok(Self {
            revision: le16(buf, 0),
            attributes,
            offline_status:          buf[362],
            self_test_exec_status:   buf[363],
            total_offline_seconds:   le16(buf, 364),
            offline_capability:      buf[367],
            smart_capability:        le16(buf, 368),
            errorlog_capability:     buf[370],
            short_test_minutes:      buf[372],
            extended_test_minutes:   buf[373],
            conveyance_test_minutes: buf[374],
            extended_test_minutes_w: le16(buf, 375),
        })
    }

    /// Encode into a sealed 512-byte page.
    pub fn to_page(&self) -> Vec<u8> {
        let mut page = vec![0u8; SECTOR_SIZE];
        put16(&mut page, 0, self.revision);
        for (i, a) in self.attributes.iter().enumerate() {
            let off = ATTR_BASE + i * ATTR_SIZE;
            a.write_slot(&mut page[off..off + ATTR_SIZE]);
        }
        page[362] = self.offline_status;
        page[363] = self.self_test_exec_status;
        put16(&mut page, 364, self.total_offline_seconds);
        page[367] = self.offline_capability;
        put16(&mut page, 368, self.smart_capability);
        page[370] = self.errorlog_capability;
        page[372] = self.short_test_minutes;
        page[373] = self.extended_test_minutes;
        page[374] = self.conveyance_test_minutes;
        put16(&mut page, 375, self.extended_test_minutes_w);
        seal(&mut page);
        page
    }

    /// Index and record of the first slot carrying `id`.
    pub fn find_attribute(&self, id: u8) -> Option<(usize, &Attribute)> {
        if id == 0 {
            return None;
        }
        self.attributes.iter().enumerate().find(|(_, a)| a.id == id)
    }

    pub fn has_capability(&self, bit: u8) -> bool {
        self.offline_capability & bit != 0
    }

    pub fn offline_immediate_supported(&self) -> bool {
        self.has_capability(cap::EXEC_OFFLINE_IMMEDIATE)
    }

    pub fn self_test_supported(&self) -> bool {
        self.has_capability(cap::SELF_TEST)
    }

    pub fn conveyance_supported(&self) -> bool {
        self.has_capability(cap::CONVEYANCE)
    }

    pub fn selective_supported(&self) -> bool {
        self.has_capability(cap::SELECTIVE)
    }

    pub fn error_logging_supported(&self) -> bool {
        self.errorlog_capability & 0x01 != 0
    }

    /// Status nibble of the self-test execution byte.
    pub fn self_test_status(&self) -> u8 {
        self.self_test_exec_status >> 4
    }

    pub fn self_test_remaining_percent(&self) -> u8 {
        (self.self_test_exec_status & 0x0f) * 10
    }

    pub fn self_test_in_progress(&self) -> bool {
        self.self_test_status() == 0x0f
    }

    /// Polling time in minutes for a self-test subcommand (1 short, 2 extended, 3 conveyance).
    pub fn test_minutes(&self, subcommand: u8) -> u16 {
        match subcommand {
            1 => self.short_test_minutes as u16,
            2 if self.extended_test_minutes == 0xff => self.extended_test_minutes_w,
            2 => self.extended_test_minutes as u16,
            3 => self.conveyance_test_minutes as u16,
            _ => 0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Threshold {
    pub id:        u8,
    pub threshold: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Thresholds {
    pub revision: u16,
    pub entries:  [Threshold; NUM_ATTRIBUTES],
}

impl Default for Thresholds {
    fn default() -> Self {
        Self { revision: 0x0010, entries: [Threshold::default(); NUM_ATTRIBUTES] }
    }
}

impl Thresholds {
    pub fn from_page(buf: &[u8]) -> Result<Self> {
        expect_len(buf, "SMART thresholds", SECTOR_SIZE)?;
        let mut entries = [Threshold::default(); NUM_ATTRIBUTES];
        for (i, t) in entries.iter_mut().enumerate() {
            let off = ATTR_BASE + i * ATTR_SIZE;
            *t = Threshold { id: buf[off], threshold: buf[off + 1] };
        }
        Ok(Self { revision: le16(buf, 0), entries })
    }

    pub fn to_page(&self) -> Vec<u8> {
        let mut page = vec![0u8; SECTOR_SIZE];
        put16(&mut page, 0, self.revision);
        for (i, t) in self.entries.iter().enumerate() {
            let off = ATTR_BASE + i * ATTR_SIZE;
            page[off] = t.id;
            page[off + 1] = t.threshold;
        }
        seal(&mut page);
        page
    }

    /// Threshold for `id`, matched by id rather than slot.
    pub fn lookup(&self, id: u8) -> Option<u8> {
        if id == 0 {
            return None;
        }
        self.entries.iter().find(|t| t.id == id).map(|t| t.threshold)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::codec::checksum;

    pub(crate) fn attr(id: u8, flags: u16, current: u8, worst: u8, raw: u64) -> Attribute {
        let mut bytes = [0u8; 6];
        bytes.copy_from_slice(&raw.to_le_bytes()[..6]);
        Attribute { id, flags, current, worst, raw: bytes, reserved: 0 }
    }

    #[test]
    fn page_layout_offsets() {
        let mut v = SmartValues::default();
        v.attributes[0] = attr(5, 0x0033, 100, 100, 0x0102);
        v.attributes[29] = attr(194, 0x0022, 36, 20, 36);
        v.self_test_exec_status = 0xf3;
        v.offline_capability = 0x5b;
        v.extended_test_minutes = 0xff;
        v.extended_test_minutes_w = 514;
        let page = v.to_page();

        assert_eq!(checksum(&page), 0);
        assert_eq!(page[2], 5);
        assert_eq!(page[3], 0x33);
        assert_eq!(page[7], 0x02);
        assert_eq!(page[8], 0x01);
        assert_eq!(page[2 + 29 * 12], 194);
        assert_eq!(page[363], 0xf3);

        let back = SmartValues::from_page(&page).unwrap();
        assert_eq!(back, v);
        assert!(back.self_test_in_progress());
        assert_eq!(back.self_test_remaining_percent(), 30);
        assert_eq!(back.test_minutes(2), 514);
        assert!(back.selective_supported());
        assert!(!back.conveyance_supported());
    }

    #[test]
    fn attribute_accessors() {
        let a = attr(9, 0x0032, 97, 97, 0x0000_0102_0304);
        assert!(!a.prefailure());
        assert!(a.online());
        assert_eq!(a.raw48(), 0x0102_0304);
    }

    #[test]
    fn thresholds_matched_by_id_not_slot() {
        let mut t = Thresholds::default();
        t.entries[3] = Threshold { id: 5, threshold: 10 };
        t.entries[0] = Threshold { id: 1, threshold: 51 };
        let back = Thresholds::from_page(&t.to_page()).unwrap();
        assert_eq!(back.lookup(5), Some(10));
        assert_eq!(back.lookup(1), Some(51));
        assert_eq!(back.lookup(7), None);
        assert_eq!(back.lookup(0), None);
    }

    #[test]
    fn find_attribute_ignores_empty_slots() {
        let mut v = SmartValues::default();
        v.attributes[4] = attr(197, 0x0032, 100, 100, 3);
        assert_eq!(v.find_attribute(197).map(|(i, _)| i), Some(4));
        assert!(v.find_attribute(0).is_none());
    }
}
