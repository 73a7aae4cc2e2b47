//! IDENTIFY DEVICE page (256 little-endian words).

use super::{expect_len, le16, SECTOR_SIZE};
use crate::error::Result;

/// Text fields of the identify page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentifyStrings {
    pub model:    String,
    pub serial:   String,
    pub firmware: String,
}

/// Logical and physical sector sizes in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectorSizes {
    pub logical:  u32,
    pub physical: u32,
}

/// Nominal media rotation rate (word 217).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationRate {
    Unknown,
    SolidState,
    Rpm(u16),
    Reserved(u16),
}

#[derive(Debug, Clone)]
pub struct Identify {
    words: [u16; 256],
}

impl Identify {
    pub fn from_bytes(buf: &[u8]) -> Result<Self> {
        expect_len(buf, "identify", SECTOR_SIZE)?;
        let mut words = [0u16; 256];
        for (i, w) in words.iter_mut().enumerate() {
            *w = le16(buf, i * 2);
        }
        Ok(Self { words })
    }

    pub fn from_words(words: [u16; 256]) -> Self {
        Self { words }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.words.iter().flat_map(|w| w.to_le_bytes()).collect()
    }

    pub fn word(&self, n: usize) -> u16 {
        self.words[n]
    }

    /// ATA strings keep the first character in the high byte of each word.
    /// `fix_swap = false` is for firmware that already reports them in order.
    fn text(&self, first: usize, count: usize, fix_swap: bool) -> String {
        let mut bytes = Vec::with_capacity(count * 2);
        for w in &self.words[first..first + count] {
            let [lo, hi] = w.to_le_bytes();
            if fix_swap {
                bytes.push(hi);
                bytes.push(lo);
            } else {
                bytes.push(lo);
                bytes.push(hi);
            }
        }
        let s: String = bytes
            .iter()
            .map(|&b| if (0x20..0x7f).contains(&b) { b as char } else { ' ' })
            .collect();
        s.trim().to_string()
    }

    pub fn strings(&self, fix_swap: bool) -> IdentifyStrings {
        IdentifyStrings {
            model:    self.text(27, 20, fix_swap),
            serial:   self.text(10, 10, fix_swap),
            firmware: self.text(23, 4, fix_swap),
        }
    }

    /// Highest ATA major version bit set in word 80, or 0.
    pub fn major_version(&self) -> u8 {
        let w = self.words[80];
        if w == 0 || w == 0xffff {
            return 0;
        }
        (1..15u8).rev().find(|bit| w & (1 << bit) != 0).unwrap_or(0)
    }

    /// Words 82-87 are only meaningful when bits 15:14 read 01.
    fn valid(&self, n: usize) -> bool {
        self.words[n] & 0xc000 == 0x4000
    }

    /// `None` if the device does not say.
    pub fn smart_supported(&self) -> Option<bool> {
        if self.valid(83) || self.valid(87) {
            if self.valid(82) {
                return Some(self.words[82] & 0x0001 != 0);
            }
        }
        None
    }

    pub fn smart_enabled(&self) -> Option<bool> {
        if self.valid(87) {
            return Some(self.words[85] & 0x0001 != 0);
        }
        None
    }

    pub fn gp_logging_supported(&self) -> bool {
        (self.valid(84) && self.words[84] & 0x0020 != 0)
            || (self.valid(87) && self.words[87] & 0x0020 != 0)
    }

    pub fn sct_supported(&self) -> bool {
        self.words[206] & 0x0001 != 0
    }

    pub fn sct_data_table_supported(&self) -> bool {
        self.words[206] & 0x0020 != 0
    }

    pub fn sector_sizes(&self) -> SectorSizes {
        let mut logical = 512u32;
        let mut physical = 512u32;
        let w106 = self.words[106];
        if w106 & 0xc000 == 0x4000 {
            if w106 & 0x1000 != 0 {
                let words = (self.words[118] as u32) << 16 | self.words[117] as u32;
                logical = words << 1;
            }
            physical = logical;
            if w106 & 0x2000 != 0 {
                physical = logical << (w106 & 0x000f);
            }
        }
        SectorSizes { logical, physical }
    }

    /// User-addressable sector count, 0 if LBA is unsupported.
    pub fn sector_count(&self) -> u64 {
        if self.words[49] & 0x0200 == 0 {
            return 0;
        }
        let lba28 = (self.words[61] as u64) << 16 | self.words[60] as u64;
        let mut lba48 = 0u64;
        if self.words[83] & 0xc400 == 0x4400 {
            for n in (100..104).rev() {
                lba48 = (lba48 << 16) | self.words[n] as u64;
            }
        }
        let logical = self.sector_sizes().logical;
        if lba48 >= lba28 || (lba48 > 0 && logical > 512) {
            lba48
        } else {
            lba28
        }
    }

    pub fn capacity_bytes(&self) -> u64 {
        self.sector_count() * self.sector_sizes().logical as u64
    }

    pub fn rotation_rate(&self) -> RotationRate {
        match self.words[217] {
            0 | 0xffff => RotationRate::Unknown,
            1 => RotationRate::SolidState,
            r if r > 0x400 => RotationRate::Rpm(r),
            r => RotationRate::Reserved(r),
        }
    }

    pub fn is_ssd(&self) -> Option<bool> {
        match self.rotation_rate() {
            RotationRate::SolidState => Some(true),
            RotationRate::Rpm(_)     => Some(false),
            _ => None,
        }
    }

    /// World wide name, when word 87 says words 108-111 are valid.
    pub fn wwn(&self) -> Option<u64> {
        if !self.valid(87) || self.words[87] & 0x0100 == 0 {
            return None;
        }
        let v = (self.words[108] as u64) << 48
            | (self.words[109] as u64) << 32
            | (self.words[110] as u64) << 16
            | self.words[111] as u64;
        if v == 0 { None } else { Some(v) }
    }
}
