//! Summary error log (log 0x01) and extended comprehensive error log (GP log 0x03).

use super::{expect_len, le16, le32, put16, put32, seal, FirmwareBug, FirmwareBugs, SECTOR_SIZE};
use crate::error::Result;

pub const ERRORLOG_ENTRIES: usize = 5;
pub const EXT_ENTRIES_PER_SECTOR: usize = 4;

const ENTRY_SIZE: usize = 90;
const CMD_SIZE: usize = 12;
const EXT_ENTRY_SIZE: usize = 124;
const EXT_CMD_SIZE: usize = 18;

// ── Summary error log ────────────────────────────────────────────────

/// One command preceding an error (28-bit register set).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommandRegs {
    pub device_control: u8,
    pub features:       u8,
    pub sector_count:   u8,
    pub sector_number:  u8,
    pub cylinder_low:   u8,
    pub cylinder_high:  u8,
    pub drive_head:     u8,
    pub command:        u8,
    /// Milliseconds since power-on; wraps after ~49.7 days.
    pub timestamp_ms:   u32,
}

impl CommandRegs {
    fn parse(b: &[u8]) -> Self {
        Self {
            device_control: b[0],
            features:       b[1],
            sector_count:   b[2],
            sector_number:  b[3],
            cylinder_low:   b[4],
            cylinder_high:  b[5],
            drive_head:     b[6],
            command:        b[7],
            timestamp_ms:   le32(b, 8),
        }
    }

    fn write(&self, b: &mut [u8]) {
        b[..8].copy_from_slice(&[
            self.device_control,
            self.features,
            self.sector_count,
            self.sector_number,
            self.cylinder_low,
            self.cylinder_high,
            self.drive_head,
            self.command,
        ]);
        put32(b, 8, self.timestamp_ms);
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Register state after the failing command completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorRegs {
    pub error:          u8,
    pub sector_count:   u8,
    pub sector_number:  u8,
    pub cylinder_low:   u8,
    pub cylinder_high:  u8,
    pub drive_head:     u8,
    pub status:         u8,
    pub extended_error: [u8; 19],
    pub state:          u8,
    /// Lifetime power-on hours.
    pub timestamp:      u16,
}

impl Default for ErrorRegs {
    fn default() -> Self {
        Self {
            error:          0,
            sector_count:   0,
            sector_number:  0,
            cylinder_low:   0,
            cylinder_high:  0,
            drive_head:     0,
            status:         0,
            extended_error: [0; 19],
            state:          0,
            timestamp:      0,
        }
    }
}

impl ErrorRegs {
    fn parse(b: &[u8]) -> Self {
        let mut extended_error = [0u8; 19];
        extended_error.copy_from_slice(&b[8..27]);
        Self {
            error:         b[1],
            sector_count:  b[2],
            sector_number: b[3],
            cylinder_low:  b[4],
            cylinder_high: b[5],
            drive_head:    b[6],
            status:        b[7],
            extended_error,
            state:         b[27],
            timestamp:     le16(b, 28),
        }
    }

    fn write(&self, b: &mut [u8]) {
        b[1] = self.error;
        b[2] = self.sector_count;
        b[3] = self.sector_number;
        b[4] = self.cylinder_low;
        b[5] = self.cylinder_high;
        b[6] = self.drive_head;
        b[7] = self.status;
        b[8..27].copy_from_slice(&self.extended_error);
        b[27] = self.state;
        put16(b, 28, self.timestamp);
    }

    /// 28-bit LBA from device/head, cylinder high/low and sector number.
    pub fn lba28(&self) -> u32 {
        (self.drive_head as u32 & 0x0f) << 24
            | (self.cylinder_high as u32) << 16
            | (self.cylinder_low as u32) << 8
            | self.sector_number as u32
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ErrorLogEntry {
    /// Oldest first; `commands[4]` is the command that failed.
    pub commands: [CommandRegs; 5],
    pub error:    ErrorRegs,
}

impl ErrorLogEntry {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorLog {
    pub revision: u8,
    /// 1-based slot of the newest entry, 0 if nothing logged.
    pub pointer:  u8,
    pub entries:  [ErrorLogEntry; ERRORLOG_ENTRIES],
    pub count:    u16,
}

impl Default for ErrorLog {
    fn default() -> Self {
        Self {
            revision: 1,
            pointer:  0,
            entries:  [ErrorLogEntry::default(); ERRORLOG_ENTRIES],
            count:    0,
        }
    }
}

impl ErrorLog {
    /// Decode the page, undoing the byte swaps of buggy Samsung firmware.
    pub fn from_page(buf: &[u8], bugs: FirmwareBugs) -> Result<Self> {
        expect_len(buf, "SMART error log", SECTOR_SIZE)?;
        let samsung = bugs.is_set(FirmwareBug::Samsung);
        let mut entries = [ErrorLogEntry::default(); ERRORLOG_ENTRIES];
        for (i, e) in entries.iter_mut().enumerate() {
            let base = 2 + i * ENTRY_SIZE;
            for (j, c) in e.commands.iter_mut().enumerate() {
                let off = base + j * CMD_SIZE;
                *c = CommandRegs::parse(&buf[off..off + CMD_SIZE]);
                if samsung {
                    c.timestamp_ms = c.timestamp_ms.swap_bytes();
                }
            }
            let off = base + 5 * CMD_SIZE;
            e.error = ErrorRegs::parse(&buf[off..off + 30]);
            if samsung {
                e.error.timestamp = e.error.timestamp.swap_bytes();
            }
        }
        let mut count = le16(buf, 452);
        if samsung || bugs.is_set(FirmwareBug::Samsung2) {
            count = count.swap_bytes();
        }
        Ok(Self { revision: buf[0], pointer: buf[1], entries, count })
    }

    pub fn to_page(&self) -> Vec<u8> {
        let mut page = vec![0u8; SECTOR_SIZE];
        page[0] = self.revision;
        page[1] = self.pointer;
        for (i, e) in self.entries.iter().enumerate() {
            let base = 2 + i * ENTRY_SIZE;
            for (j, c) in e.commands.iter().enumerate() {
                let off = base + j * CMD_SIZE;
                c.write(&mut page[off..off + CMD_SIZE]);
            }
            let off = base + 5 * CMD_SIZE;
            e.error.write(&mut page[off..off + 30]);
        }
        put16(&mut page, 452, self.count);
        seal(&mut page);
        page
    }
}

// ── Extended comprehensive error log ─────────────────────────────────

/// The six LBA register halves of a 48-bit command.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LbaRegs {
    pub low:     u8,
    pub low_hi:  u8,
    pub mid:     u8,
    pub mid_hi:  u8,
    pub high:    u8,
    pub high_hi: u8,
}

impl LbaRegs {
    fn parse(b: &[u8]) -> Self {
        Self { low: b[0], low_hi: b[1], mid: b[2], mid_hi: b[3], high: b[4], high_hi: b[5] }
    }

    fn write(&self, b: &mut [u8]) {
        b[..6].copy_from_slice(&[self.low, self.low_hi, self.mid, self.mid_hi, self.high, self.high_hi]);
    }

    /// Concatenate the register halves; bits 24-27 of a 28-bit command
    /// live in the device register, so it is folded in as well.
    pub fn lba48(&self, device: u8) -> u64 {
        (self.high_hi as u64) << 40
            | (self.mid_hi as u64) << 32
            | ((self.low_hi | (device & 0x0f)) as u64) << 24
            | (self.high as u64) << 16
            | (self.mid as u64) << 8
            | self.low as u64
    }

    /// Undo the register shift of firmware with the `xerrorlba` quirk.
    fn unshift(&mut self) {
        let c = *self;
        self.mid_hi = c.high;
        self.low_hi = c.mid_hi;
        self.high = c.mid;
        self.mid = c.low_hi;
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtCommandRegs {
    pub device_control: u8,
    pub features:       u8,
    pub features_hi:    u8,
    pub count:          u8,
    pub count_hi:       u8,
    pub lba:            LbaRegs,
    pub device:         u8,
    pub command:        u8,
    pub reserved:       u8,
    pub timestamp_ms:   u32,
}

impl ExtCommandRegs {
    fn parse(b: &[u8]) -> Self {
        Self {
            device_control: b[0],
            features:       b[1],
            features_hi:    b[2],
            count:          b[3],
            count_hi:       b[4],
            lba:            LbaRegs::parse(&b[5..11]),
            device:         b[11],
            command:        b[12],
            reserved:       b[13],
            timestamp_ms:   le32(b, 14),
        }
    }

    fn write(&self, b: &mut [u8]) {
        b[0] = self.device_control;
        b[1] = self.features;
        b[2] = self.features_hi;
        b[3] = self.count;
        b[4] = self.count_hi;
        self.lba.write(&mut b[5..11]);
        b[11] = self.device;
        b[12] = self.command;
        b[13] = self.reserved;
        put32(b, 14, self.timestamp_ms);
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtErrorRegs {
    pub device_control: u8,
    pub error:          u8,
    pub count:          u8,
    pub count_hi:       u8,
    pub lba:            LbaRegs,
    pub device:         u8,
    pub status:         u8,
    pub extended_error: [u8; 19],
    pub state:          u8,
    pub timestamp:      u16,
}

impl Default for ExtErrorRegs {
    fn default() -> Self {
        Self {
            device_control: 0,
            error:          0,
            count:          0,
            count_hi:       0,
            lba:            LbaRegs::default(),
            device:         0,
            status:         0,
            extended_error: [0; 19],
            state:          0,
            timestamp:      0,
        }
    }
}

impl ExtErrorRegs {
    fn parse(b: &[u8]) -> Self {
        let mut extended_error = [0u8; 19];
        extended_error.copy_from_slice(&b[12..31]);
        Self {
            device_control: b[0],
            error:          b[1],
            count:          b[2],
            count_hi:       b[3],
            lba:            LbaRegs::parse(&b[4..10]),
            device:         b[10],
            status:         b[11],
            extended_error,
            state:          b[31],
            timestamp:      le16(b, 32),
        }
    }

    fn write(&self, b: &mut [u8]) {
        b[0] = self.device_control;
        b[1] = self.error;
        b[2] = self.count;
        b[3] = self.count_hi;
        self.lba.write(&mut b[4..10]);
        b[10] = self.device;
        b[11] = self.status;
        b[12..31].copy_from_slice(&self.extended_error);
        b[31] = self.state;
        put16(b, 32, self.timestamp);
    }

    pub fn lba48(&self) -> u64 {
        self.lba.lba48(self.device)
    }

    pub fn count16(&self) -> u16 {
        (self.count_hi as u16) << 8 | self.count as u16
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtErrorEntry {
    pub commands: [ExtCommandRegs; 5],
    pub error:    ExtErrorRegs,
}

impl ExtErrorEntry {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// All sectors of GP log 0x03, flattened to one entry array.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtErrorLog {
    pub version:            u8,
    /// Former summary log pointer; some Samsung firmware still uses it.
    pub reserved1:          u8,
    /// 1-based device-wide index of the newest entry.
    pub index:              u16,
    pub entries:            Vec<ExtErrorEntry>,
    pub device_error_count: u16,
}

impl ExtErrorLog {
    /// Decode `n` sectors. Header fields come from the first sector.
    pub fn from_sectors(buf: &[u8], bugs: FirmwareBugs) -> Result<Self> {
        expect_len(buf, "extended error log", SECTOR_SIZE)?;
        let sectors = buf.len() / SECTOR_SIZE;
        let shifted = bugs.is_set(FirmwareBug::XErrorLba);
        let mut entries = Vec::with_capacity(sectors * EXT_ENTRIES_PER_SECTOR);
        for s in buf.chunks_exact(SECTOR_SIZE) {
            for i in 0..EXT_ENTRIES_PER_SECTOR {
                let base = 4 + i * EXT_ENTRY_SIZE;
                let mut e = ExtErrorEntry::default();
                for (j, c) in e.commands.iter_mut().enumerate() {
                    let off = base + j * EXT_CMD_SIZE;
                    *c = ExtCommandRegs::parse(&s[off..off + EXT_CMD_SIZE]);
                    if shifted {
                        c.lba.unshift();
                    }
                }
                let off = base + 5 * EXT_CMD_SIZE;
                e.error = ExtErrorRegs::parse(&s[off..off + 34]);
                if shifted {
                    e.error.lba.unshift();
                }
                entries.push(e);
            }
        }
        Ok(Self {
            version:            buf[0],
            reserved1:          buf[1],
            index:              le16(buf, 2),
            entries,
            device_error_count: le16(buf, 500),
        })
    }

    /// Encode into sealed sectors, repeating the header in each.
    pub fn to_sectors(&self) -> Vec<u8> {
        let sectors = self.entries.len().div_ceil(EXT_ENTRIES_PER_SECTOR).max(1);
        let mut out = vec![0u8; sectors * SECTOR_SIZE];
        for (s, page) in out.chunks_exact_mut(SECTOR_SIZE).enumerate() {
            page[0] = self.version;
            page[1] = self.reserved1;
            put16(page, 2, self.index);
            for i in 0..EXT_ENTRIES_PER_SECTOR {
                let Some(e) = self.entries.get(s * EXT_ENTRIES_PER_SECTOR + i) else { break };
                let base = 4 + i * EXT_ENTRY_SIZE;
                for (j, c) in e.commands.iter().enumerate() {
                    let off = base + j * EXT_CMD_SIZE;
                    c.write(&mut page[off..off + EXT_CMD_SIZE]);
                }
                let off = base + 5 * EXT_CMD_SIZE;
                e.error.write(&mut page[off..off + 34]);
            }
            put16(page, 500, self.device_error_count);
            seal(page);
        }
        out
    }

    pub fn sectors(&self) -> usize {
        self.entries.len() / EXT_ENTRIES_PER_SECTOR
    }
}
