//! Summary and extended comprehensive error log decoding.

use std::fmt;

use tracing::warn;

use super::circular::{CircularView, IndexBase};
use super::commands::{command_name, describe_error, error_state_name, format_milliseconds, ErrorContext, FailingLba};
use super::lifetime;
use crate::codec::errorlog::{CommandRegs, ErrorLog, ExtCommandRegs, ExtErrorLog, ERRORLOG_ENTRIES};
use crate::codec::{FirmwareBug, FirmwareBugs};
use crate::error::{Result, SmartError};

/// One command that preceded (or caused) an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedCommand {
    pub command:        u8,
    pub features:       u16,
    pub count:          u16,
    pub lba:            u64,
    pub device:         u8,
    pub device_control: u8,
    pub timestamp_ms:   u32,
}

impl DecodedCommand {
    fn from_regs(c: &CommandRegs) -> Self {
        Self {
            command:        c.command,
            features:       c.features as u16,
            count:          c.sector_count as u16,
            lba:            (c.cylinder_high as u64) << 16 | (c.cylinder_low as u64) << 8 | c.sector_number as u64,
            device:         c.drive_head,
            device_control: c.device_control,
            timestamp_ms:   c.timestamp_ms,
        }
    }

    fn from_ext(c: &ExtCommandRegs) -> Self {
        Self {
            command:        c.command,
            features:       (c.features_hi as u16) << 8 | c.features as u16,
            count:          (c.count_hi as u16) << 8 | c.count as u16,
            lba:            c.lba.lba48(0),
            device:         c.device,
            device_control: c.device_control,
            timestamp_ms:   c.timestamp_ms,
        }
    }

    pub fn name(&self) -> &'static str {
        command_name(self.command, self.features as u8)
    }
}

/// One logged error with its synthetic error number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedError {
    pub number:         u32,
    pub lifetime_hours: u16,
    pub state:          u8,
    pub status:         u8,
    pub error:          u8,
    pub lba:            FailingLba,
    pub description:    String,
    /// Failing command first, then the ones before it.
    pub commands:       Vec<DecodedCommand>,
}

impl DecodedError {
    pub fn state_name(&self) -> &'static str {
        error_state_name(self.state)
    }
}

impl fmt::Display for DecodedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Error {} occurred at disk power-on lifetime: {}", self.number, lifetime(self.lifetime_hours))?;
        writeln!(f, "  When the command that caused the error occurred, the device was {}.", self.state_name())?;
        writeln!(f, "  Status 0x{:02x}, Error 0x{:02x}", self.status, self.error)?;
        if !self.description.is_empty() {
            writeln!(f, "  {}", self.description)?;
        }
        for c in &self.commands {
            writeln!(
                f,
                "  {:02x} {:04x} {:04x} {:012x} {:02x} {:>16}  {}",
                c.command,
                c.features,
                c.count,
                c.lba,
                c.device,
                format_milliseconds(c.timestamp_ms),
                c.name()
            )?;
        }
        Ok(())
    }
}

/// Decoded error log, newest error first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorLogReport {
    /// Lifetime error count reported by the device.
    pub count:    u32,
    pub entries:  Vec<DecodedError>,
    pub warnings: Vec<String>,
}

/// Walk the five-entry summary error log.
pub fn decode_error_log(log: &ErrorLog, bugs: FirmwareBugs, base: IndexBase) -> Result<ErrorLogReport> {
    let mut report = ErrorLogReport { count: log.count as u32, ..Default::default() };
    if log.pointer == 0 {
        return Ok(report);
    }
    if log.pointer as usize > ERRORLOG_ENTRIES {
        return Err(SmartError::decode("SMART error log", format!("invalid error log index {}", log.pointer)));
    }
    let (count, pointer) = (log.count as i32, log.pointer as i32);
    if (count - pointer).rem_euclid(ERRORLOG_ENTRIES as i32) != 0 && !bugs.is_set(FirmwareBug::Samsung2) {
        let w = format!("ATA error count {} inconsistent with error log pointer {}", count, pointer);
        warn!("{}", w);
        report.warnings.push(w);
    }

    let steps = (log.count as usize).min(ERRORLOG_ENTRIES);
    let view = CircularView::new("SMART error log", ERRORLOG_ENTRIES, log.pointer as usize, base, steps)?;
    for (k, slot) in view.enumerate() {
        let entry = &log.entries[slot];
        if entry.is_empty() {
            continue;
        }
        let failed = &entry.commands[4];
        let lba = FailingLba::Lba28(entry.error.lba28());
        let description = describe_error(&ErrorContext {
            command:      failed.command,
            features:     failed.features,
            status:       entry.error.status,
            error:        entry.error.error,
            sector_count: entry.error.sector_count as u16,
            lba,
        });
        report.entries.push(DecodedError {
            number: report.count.saturating_sub(k as u32),
            lifetime_hours: entry.error.timestamp,
            state: entry.error.state,
            status: entry.error.status,
            error: entry.error.error,
            lba,
            description,
            commands: entry.commands.iter().rev().filter(|c| !c.is_empty()).map(DecodedCommand::from_regs).collect(),
        });
    }
    Ok(report)
}

/// Walk the multi-sector extended comprehensive error log.
pub fn decode_ext_error_log(log: &ExtErrorLog, base: IndexBase) -> Result<ErrorLogReport> {
    let mut report = ErrorLogReport { count: log.device_error_count as u32, ..Default::default() };
    if log.device_error_count == 0 {
        return Ok(report);
    }
    let nentries = log.entries.len();
    let in_range = |i: usize| (1..=nentries).contains(&i);

    let mut index = log.index as usize;
    if base == IndexBase::One && !in_range(index) {
        if index == 0 && in_range(log.reserved1 as usize) {
            let w = format!("log index is 0, using reserved byte instead ({})", log.reserved1);
            warn!("extended error log: {}", w);
            report.warnings.push(w);
            index = log.reserved1 as usize;
        } else {
            return Err(SmartError::decode("extended error log", format!("invalid error log index {}", index)));
        }
    }

    let steps = (log.device_error_count as usize).min(nentries);
    let view = CircularView::new("extended error log", nentries, index, base, steps)?;
    for (k, slot) in view.enumerate() {
        let entry = &log.entries[slot];
        if entry.is_empty() {
            continue;
        }
        let failed = &entry.commands[4];
        let lba = FailingLba::Lba48(entry.error.lba48());
        let description = describe_error(&ErrorContext {
            command:      failed.command,
            features:     failed.features,
            status:       entry.error.status,
            error:        entry.error.error,
            sector_count: entry.error.count16(),
            lba,
        });
        report.entries.push(DecodedError {
            number: report.count.saturating_sub(k as u32),
            lifetime_hours: entry.error.timestamp,
            state: entry.error.state,
            status: entry.error.status,
            error: entry.error.error,
            lba,
            description,
            commands: entry.commands.iter().rev().filter(|c| !c.is_empty()).map(DecodedCommand::from_ext).collect(),
        });
    }
    Ok(report)
}

/// Lifetime error count from whichever logs are available; the larger
/// wins. Either count is only trusted when its log has an index.
pub fn ata_error_count(summary: Option<&ErrorLog>, extended: Option<&ExtErrorLog>) -> u32 {
    let legacy = summary.filter(|l| l.pointer != 0).map(|l| l.count as u32).unwrap_or(0);
    let ext = extended
        .filter(|l| l.index != 0 || l.reserved1 != 0)
        .map(|l| l.device_error_count as u32)
        .unwrap_or(0);
    legacy.max(ext)
}
