//! Self-test logs: legacy (log 0x06), extended (GP log 0x07) and the
//! selective self-test log (log 0x09).

use super::{expect_len, le16, le32, le48, le64, put16, put32, put64, seal, FirmwareBug, FirmwareBugs, SECTOR_SIZE};
use crate::error::Result;

pub const SELFTEST_ENTRIES: usize = 21;
pub const EXT_SELFTEST_ENTRIES_PER_SECTOR: usize = 19;
pub const SELECTIVE_SPANS: usize = 5;

/// LBA value meaning "no failing LBA recorded".
pub const LBA_NOT_APPLICABLE: u64 = 0xffff_ffff_ffff;

const ENTRY_SIZE: usize = 24;
const EXT_ENTRY_SIZE: usize = 26;

/// One self-test descriptor, common to both log generations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelfTestEntry {
    /// Subcommand the test was started with (bit 7 set = captive).
    pub test_type:   u8,
    /// Status nibble in bits 7:4, remaining tenths in bits 3:0.
    pub status:      u8,
    pub timestamp:   u16,
    pub checkpoint:  u8,
    pub failing_lba: u64,
    pub vendor:      [u8; 15],
}

impl Default for SelfTestEntry {
    fn default() -> Self {
        Self {
            test_type:   0,
            status:      0,
            timestamp:   0,
            checkpoint:  0,
            failing_lba: 0,
            vendor:      [0; 15],
        }
    }
}

impl SelfTestEntry {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn status_code(&self) -> u8 {
        self.status >> 4
    }

    pub fn remaining_percent(&self) -> u8 {
        (self.status & 0x0f) * 10
    }

    /// Completed with one of the failure codes 3..=8.
    pub fn failed(&self) -> bool {
        (3..=8).contains(&self.status_code())
    }

    /// Extended test completed without error.
    pub fn extended_ok(&self) -> bool {
        self.status_code() == 0 && self.test_type & 0x7f == 0x02
    }
}

// ── Legacy log ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelfTestLog {
    pub revision:    u16,
    pub entries:     [SelfTestEntry; SELFTEST_ENTRIES],
    /// 1-based slot of the newest entry, 0 if nothing logged.
    pub most_recent: u8,
}

impl Default for SelfTestLog {
    fn default() -> Self {
        Self {
            revision:    1,
            entries:     [SelfTestEntry::default(); SELFTEST_ENTRIES],
            most_recent: 0,
        }
    }
}

impl SelfTestLog {
    pub fn from_page(buf: &[u8], bugs: FirmwareBugs) -> Result<Self> {
        expect_len(buf, "SMART self-test log", SECTOR_SIZE)?;
        let samsung = bugs.is_set(FirmwareBug::Samsung);
        let mut entries = [SelfTestEntry::default(); SELFTEST_ENTRIES];
        for (i, e) in entries.iter_mut().enumerate() {
            let b = &buf[2 + i * ENTRY_SIZE..2 + (i + 1) * ENTRY_SIZE];
            let (test_type, status) = if samsung { (b[1], b[0]) } else { (b[0], b[1]) };
            let lba = le32(b, 5);
            let mut vendor = [0u8; 15];
            vendor.copy_from_slice(&b[9..24]);
            *e = SelfTestEntry {
                test_type,
                status,
                timestamp:   le16(b, 2),
                checkpoint:  b[4],
                failing_lba: if lba < 0xffff_ffff { lba as u64 } else { LBA_NOT_APPLICABLE },
                vendor,
            };
        }
        // Samsung firmware stores the index in byte 509 instead of 508.
        let most_recent = if samsung { buf[509] } else { buf[508] };
        Ok(Self { revision: le16(buf, 0), entries, most_recent })
    }

    pub fn to_page(&self) -> Vec<u8> {
        let mut page = vec![0u8; SECTOR_SIZE];
        put16(&mut page, 0, self.revision);
        for (i, e) in self.entries.iter().enumerate() {
            let b = &mut page[2 + i * ENTRY_SIZE..2 + (i + 1) * ENTRY_SIZE];
            b[0] = e.test_type;
            b[1] = e.status;
            put16(b, 2, e.timestamp);
            b[4] = e.checkpoint;
            let lba = if e.failing_lba >= 0xffff_ffff { 0xffff_ffff } else { e.failing_lba as u32 };
            put32(b, 5, lba);
            b[9..24].copy_from_slice(&e.vendor);
        }
        page[508] = self.most_recent;
        seal(&mut page);
        page
    }
}

// ── Extended log ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtSelfTestLog {
    pub version:   u8,
    pub reserved1: u8,
    /// 1-based device-wide index of the newest descriptor.
    pub index:     u16,
    pub entries:   Vec<SelfTestEntry>,
}

impl ExtSelfTestLog {
    pub fn from_sectors(buf: &[u8]) -> Result<Self> {
        expect_len(buf, "extended self-test log", SECTOR_SIZE)?;
        let sectors = buf.len() / SECTOR_SIZE;
        let mut entries = Vec::with_capacity(sectors * EXT_SELFTEST_ENTRIES_PER_SECTOR);
        for s in buf.chunks_exact(SECTOR_SIZE) {
            for i in 0..EXT_SELFTEST_ENTRIES_PER_SECTOR {
                let b = &s[4 + i * EXT_ENTRY_SIZE..4 + (i + 1) * EXT_ENTRY_SIZE];
                let mut vendor = [0u8; 15];
                vendor.copy_from_slice(&b[11..26]);
                entries.push(SelfTestEntry {
                    test_type:   b[0],
                    status:      b[1],
                    timestamp:   le16(b, 2),
                    checkpoint:  b[4],
                    failing_lba: le48(b, 5),
                    vendor,
                });
            }
        }
        Ok(Self { version: buf[0], reserved1: buf[1], index: le16(buf, 2), entries })
    }

    pub fn to_sectors(&self) -> Vec<u8> {
        let sectors = self.entries.len().div_ceil(EXT_SELFTEST_ENTRIES_PER_SECTOR).max(1);
        let mut out = vec![0u8; sectors * SECTOR_SIZE];
        for (s, page) in out.chunks_exact_mut(SECTOR_SIZE).enumerate() {
            page[0] = self.version;
            page[1] = self.reserved1;
            put16(page, 2, self.index);
            for i in 0..EXT_SELFTEST_ENTRIES_PER_SECTOR {
                let Some(e) = self.entries.get(s * EXT_SELFTEST_ENTRIES_PER_SECTOR + i) else { break };
                let b = &mut page[4 + i * EXT_ENTRY_SIZE..4 + (i + 1) * EXT_ENTRY_SIZE];
                b[0] = e.test_type;
                b[1] = e.status;
                put16(b, 2, e.timestamp);
                b[4] = e.checkpoint;
                b[5..11].copy_from_slice(&e.failing_lba.to_le_bytes()[..6]);
                b[11..26].copy_from_slice(&e.vendor);
            }
            seal(page);
        }
        out
    }

    pub fn sectors(&self) -> usize {
        self.entries.len() / EXT_SELFTEST_ENTRIES_PER_SECTOR
    }
}

// ── Selective self-test log ──────────────────────────────────────────

pub mod selective_flags {
    pub const DO_SCAN: u16 = 0x0002;
    pub const PENDING: u16 = 0x0008;
    pub const ACTIVE:  u16 = 0x0010;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TestSpan {
    pub start: u64,
    pub end:   u64,
}

impl TestSpan {
    pub fn is_empty(&self) -> bool {
        self.start == 0 && self.end == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectiveLog {
    pub version:      u16,
    pub spans:        [TestSpan; SELECTIVE_SPANS],
    pub reserved:     Vec<u8>,
    pub vendor:       Vec<u8>,
    pub current_lba:  u64,
    pub current_span: u16,
    pub flags:        u16,
    pub vendor2:      [u8; 4],
    pub pending_time: u16,
}

impl Default for SelectiveLog {
    fn default() -> Self {
        Self {
            version:      1,
            spans:        [TestSpan::default(); SELECTIVE_SPANS],
            reserved:     vec![0; 256],
            vendor:       vec![0; 154],
            current_lba:  0,
            current_span: 0,
            flags:        0,
            vendor2:      [0; 4],
            pending_time: 0,
        }
    }
}

impl SelectiveLog {
    pub fn from_page(buf: &[u8]) -> Result<Self> {
        expect_len(buf, "selective self-test log", SECTOR_SIZE)?;
        let mut spans = [TestSpan::default(); SELECTIVE_SPANS];
        for (i, s) in spans.iter_mut().enumerate() {
            let off = 2 + i * 16;
            *s = TestSpan { start: le64(buf, off), end: le64(buf, off + 8) };
        }
        let mut vendor2 = [0u8; 4];
        vendor2.copy_from_slice(&buf[504..508]);
        Ok(Self {
            version:      le16(buf, 0),
            spans,
            reserved:     buf[82..338].to_vec(),
            vendor:       buf[338..492].to_vec(),
            current_lba:  le64(buf, 492),
            current_span: le16(buf, 500),
            flags:        le16(buf, 502),
            vendor2,
            pending_time: le16(buf, 508),
        })
    }

    /// Encode into a page whose checksum byte is the two's complement of the sum.
    pub fn to_page(&self) -> Vec<u8> {
        let mut page = vec![0u8; SECTOR_SIZE];
        put16(&mut page, 0, self.version);
        for (i, s) in self.spans.iter().enumerate() {
            let off = 2 + i * 16;
            put64(&mut page, off, s.start);
            put64(&mut page, off + 8, s.end);
        }
        let n = self.reserved.len().min(256);
        page[82..82 + n].copy_from_slice(&self.reserved[..n]);
        let n = self.vendor.len().min(154);
        page[338..338 + n].copy_from_slice(&self.vendor[..n]);
        put64(&mut page, 492, self.current_lba);
        put16(&mut page, 500, self.current_span);
        put16(&mut page, 502, self.flags);
        page[504..508].copy_from_slice(&self.vendor2);
        put16(&mut page, 508, self.pending_time);
        seal(&mut page);
        page
    }

    pub fn scan_after_spans(&self) -> bool {
        self.flags & selective_flags::DO_SCAN != 0
    }

    pub fn active(&self) -> bool {
        self.flags & selective_flags::ACTIVE != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::checksum;

    #[test]
    fn legacy_log_layout() {
        let mut log = SelfTestLog { most_recent: 3, ..Default::default() };
        log.entries[2] = SelfTestEntry {
            test_type:   0x02,
            status:      0x73,
            timestamp:   4321,
            failing_lba: 0x0012_3456,
            ..Default::default()
        };
        let page = log.to_page();
        assert_eq!(checksum(&page), 0);
        assert_eq!(page[2 + 2 * 24], 0x02);
        assert_eq!(page[2 + 2 * 24 + 1], 0x73);
        assert_eq!(page[508], 3);

        let back = SelfTestLog::from_page(&page, FirmwareBugs::default()).unwrap();
        assert_eq!(back, log);
        assert!(back.entries[2].failed());
        assert_eq!(back.entries[2].remaining_percent(), 30);
    }

    #[test]
    fn legacy_unknown_lba_widens() {
        let mut log = SelfTestLog::default();
        log.entries[0] = SelfTestEntry { test_type: 1, failing_lba: LBA_NOT_APPLICABLE, ..Default::default() };
        let back = SelfTestLog::from_page(&log.to_page(), FirmwareBugs::default()).unwrap();
        assert_eq!(back.entries[0].failing_lba, LBA_NOT_APPLICABLE);
    }

    #[test]
    fn samsung_swaps_type_status_and_index() {
        let mut page = vec![0u8; SECTOR_SIZE];
        page[2] = 0x00;
        page[3] = 0x02;
        page[509] = 1;
        seal(&mut page);
        let bugs = FirmwareBugs::parse_all(&["samsung"]).unwrap();
        let log = SelfTestLog::from_page(&page, bugs).unwrap();
        assert_eq!(log.most_recent, 1);
        assert_eq!(log.entries[0].test_type, 0x02);
        assert_eq!(log.entries[0].status, 0x00);
        assert!(log.entries[0].extended_ok());
    }

    #[test]
    fn extended_log_spans_sectors() {
        let mut entries = vec![SelfTestEntry::default(); 38];
        entries[20] = SelfTestEntry { test_type: 1, status: 0x00, timestamp: 99, failing_lba: 0x0102_0304_0506, ..Default::default() };
        let log = ExtSelfTestLog { version: 1, reserved1: 0, index: 21, entries };
        let bytes = log.to_sectors();
        assert_eq!(bytes.len(), 2 * SECTOR_SIZE);
        let back = ExtSelfTestLog::from_sectors(&bytes).unwrap();
        assert_eq!(back.sectors(), 2);
        assert_eq!(back.entries[20].failing_lba, 0x0102_0304_0506);
        assert_eq!(back, log);
    }

    #[test]
    fn selective_log_offsets() {
        let mut log = SelectiveLog::default();
        log.spans[0] = TestSpan { start: 100, end: 199 };
        log.current_lba = 150;
        log.current_span = 1;
        log.flags = selective_flags::ACTIVE | selective_flags::DO_SCAN;
        log.pending_time = 60;
        let page = log.to_page();
        assert_eq!(checksum(&page), 0);
        assert_eq!(le64(&page, 2), 100);
        assert_eq!(le64(&page, 10), 199);
        assert_eq!(le16(&page, 502), 0x12);
        let back = SelectiveLog::from_page(&page).unwrap();
        assert_eq!(back, log);
        assert!(back.active());
        assert!(back.scan_after_spans());
    }
}
