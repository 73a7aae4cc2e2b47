//! Typed views over the fixed-layout pages returned by SMART commands.
//!
//! Every multi-byte field is decoded little-endian field by field, so
//! nothing here depends on host byte order or struct packing.

pub mod errorlog;
pub mod identify;
pub mod logdir;
pub mod sct;
pub mod selftest;
pub mod values;

use crate::error::{Result, SmartError};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

pub const SECTOR_SIZE: usize = 512;

// ── Little-endian field access ───────────────────────────────────────

pub(crate) fn le16(b: &[u8], off: usize) -> u16 {
    u16::from_le_bytes([b[off], b[off + 1]])
}

pub(crate) fn le32(b: &[u8], off: usize) -> u32 {
    u32::from_le_bytes([b[off], b[off + 1], b[off + 2], b[off + 3]])
}

pub(crate) fn le48(b: &[u8], off: usize) -> u64 {
    let mut v = 0u64;
    for i in (0..6).rev() {
        v = (v << 8) | b[off + i] as u64;
    }
    v
}

pub(crate) fn le64(b: &[u8], off: usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&b[off..off + 8]);
    u64::from_le_bytes(bytes)
}

pub(crate) fn put16(b: &mut [u8], off: usize, v: u16) {
    b[off..off + 2].copy_from_slice(&v.to_le_bytes());
}

pub(crate) fn put32(b: &mut [u8], off: usize, v: u32) {
    b[off..off + 4].copy_from_slice(&v.to_le_bytes());
}

pub(crate) fn put64(b: &mut [u8], off: usize, v: u64) {
    b[off..off + 8].copy_from_slice(&v.to_le_bytes());
}

pub(crate) fn expect_len(buf: &[u8], what: &'static str, expected: usize) -> Result<()> {
    if buf.len() < expected {
        return Err(SmartError::ShortBuffer { what, len: buf.len(), expected });
    }
    Ok(())
}

pub(crate) fn is_zero(bytes: &[u8]) -> bool {
    bytes.iter().all(|b| *b == 0)
}

// ── Checksums ────────────────────────────────────────────────────────

/// Unsigned byte sum of one sector. Zero for an intact page.
pub fn checksum(sector: &[u8]) -> u8 {
    sector.iter().fold(0u8, |sum, b| sum.wrapping_add(*b))
}

/// Set the trailing checksum byte so the page sums to zero.
pub fn seal(page: &mut [u8]) {
    if let Some(last) = page.len().checked_sub(1) {
        page[last] = 0;
        let sum = checksum(page);
        page[last] = sum.wrapping_neg();
    }
}

/// What to do with a page whose byte sum is not zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChecksumPolicy {
    Ignore,
    #[default]
    Warn,
    Fatal,
}

/// Verify every 512-byte sector of `data`; returns the number of bad sectors.
pub fn check_sectors(data: &[u8], what: &'static str, policy: ChecksumPolicy) -> Result<usize> {
    let sectors = data.len() / SECTOR_SIZE;
    let bad = data
        .chunks_exact(SECTOR_SIZE)
        .filter(|s| checksum(s) != 0)
        .count();
    if bad == 0 {
        return Ok(0);
    }
    match policy {
        ChecksumPolicy::Ignore => Ok(bad),
        ChecksumPolicy::Warn => {
            if sectors == 1 {
                warn!("{}: checksum error", what);
            } else {
                warn!("{}: checksum error in {} of {} sectors", what, bad, sectors);
            }
            Ok(bad)
        }
        ChecksumPolicy::Fatal => Err(SmartError::Checksum { what, bad, sectors }),
    }
}

// ── Firmware quirks ──────────────────────────────────────────────────

/// A decoding assumption known to be violated by some firmware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FirmwareBug {
    /// Set by "none": ignore quirks coming from the vendor database.
    None,
    NoLogDir,
    Samsung,
    Samsung2,
    Samsung3,
    XErrorLba,
    /// Identify strings already arrive in byte order.
    NoSwap,
}

impl FirmwareBug {
    pub const ALL: [FirmwareBug; 7] = [
        FirmwareBug::None,
        FirmwareBug::NoLogDir,
        FirmwareBug::Samsung,
        FirmwareBug::Samsung2,
        FirmwareBug::Samsung3,
        FirmwareBug::XErrorLba,
        FirmwareBug::NoSwap,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            FirmwareBug::None      => "none",
            FirmwareBug::NoLogDir  => "nologdir",
            FirmwareBug::Samsung   => "samsung",
            FirmwareBug::Samsung2  => "samsung2",
            FirmwareBug::Samsung3  => "samsung3",
            FirmwareBug::XErrorLba => "xerrorlba",
            FirmwareBug::NoSwap    => "noswap",
        }
    }

    fn bit(&self) -> u8 {
        1 << (*self as u8)
    }
}

/// Set of firmware quirks for one device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FirmwareBugs(u8);

impl FirmwareBugs {
    pub fn is_set(&self, bug: FirmwareBug) -> bool {
        self.0 & bug.bit() != 0
    }

    pub fn set(&mut self, bug: FirmwareBug) {
        self.0 |= bug.bit();
    }

    /// Parse one quirk word ("samsung", "xerrorlba", ...) and add it.
    pub fn add_named(&mut self, word: &str) -> Result<()> {
        let bug = FirmwareBug::ALL
            .iter()
            .find(|b| b.name() == word.trim())
            .ok_or_else(|| SmartError::FirmwareBug(word.to_string()))?;
        self.set(*bug);
        Ok(())
    }

    /// Parse a list of quirk words.
    pub fn parse_all<S: AsRef<str>>(words: &[S]) -> Result<Self> {
        let mut bugs = FirmwareBugs::default();
        for w in words {
            bugs.add_named(w.as_ref())?;
        }
        Ok(bugs)
    }

    /// Add quirks from the vendor database unless the user said "none".
    pub fn merge_preset(&mut self, preset: FirmwareBugs) {
        if !self.is_set(FirmwareBug::None) {
            self.0 |= preset.0 & !FirmwareBug::None.bit();
        }
    }
}

impl fmt::Display for FirmwareBugs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = FirmwareBug::ALL
            .iter()
            .filter(|b| self.is_set(**b))
            .map(|b| b.name())
            .collect();
        if names.is_empty() {
            write!(f, "-")
        } else {
            write!(f, "{}", names.join(","))
        }
    }
}
