//! Self-test log decoding (summary and extended generations).

use std::fmt;

use super::circular::{CircularView, IndexBase};
use crate::codec::selftest::{ExtSelfTestLog, SelfTestEntry, SelfTestLog, LBA_NOT_APPLICABLE, SELFTEST_ENTRIES};
use crate::error::{Result, SmartError};

pub fn test_type_name(test_type: u8) -> String {
    match test_type {
        0x00 => "Offline".into(),
        0x01 => "Short offline".into(),
        0x02 => "Extended offline".into(),
        0x03 => "Conveyance offline".into(),
        0x04 => "Selective offline".into(),
        0x7f => "Abort offline test".into(),
        0x81 => "Short captive".into(),
        0x82 => "Extended captive".into(),
        0x83 => "Conveyance captive".into(),
        0x84 => "Selective captive".into(),
        t if (0x40..=0x7e).contains(&t) || t >= 0x90 => format!("Vendor (0x{:02x})", t),
        t => format!("Reserved (0x{:02x})", t),
    }
}

pub fn status_text(status: u8) -> String {
    match status >> 4 {
        0x0 => "Completed without error".into(),
        0x1 => "Aborted by host".into(),
        0x2 => "Interrupted (host reset)".into(),
        0x3 => "Fatal or unknown error".into(),
        0x4 => "Completed: unknown failure".into(),
        0x5 => "Completed: electrical failure".into(),
        0x6 => "Completed: servo/seek failure".into(),
        0x7 => "Completed: read failure".into(),
        0x8 => "Completed: handling damage??".into(),
        0xf => "Self-test routine in progress".into(),
        s => format!("Unknown status (0x{:x})", s),
    }
}

/// One self-test, numbered from the newest (#1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedSelfTest {
    pub number:            u32,
    pub test_type:         u8,
    pub status:            u8,
    pub remaining_percent: u8,
    pub lifetime_hours:    u16,
    /// Set only for failed tests that name an address.
    pub failing_lba:       Option<u64>,
    /// Failed, but a newer extended test completed without error.
    pub outdated:          bool,
}

impl DecodedSelfTest {
    pub fn failed(&self) -> bool {
        (3..=8).contains(&(self.status >> 4))
    }
}

impl fmt::Display for DecodedSelfTest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let lba = match self.failing_lba {
            Some(lba) => lba.to_string(),
            None => "-".into(),
        };
        write!(
            f,
            "#{:>2}  {:<19} {:<29} {:>3}%  {:>8}  {}",
            self.number,
            test_type_name(self.test_type),
            status_text(self.status),
            self.remaining_percent,
            self.lifetime_hours,
            lba
        )?;
        if self.outdated {
            write!(f, " (outdated)")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelfTestReport {
    /// Newest first.
    pub entries:         Vec<DecodedSelfTest>,
    /// Failures not superseded by a newer successful extended test.
    pub errors:          u32,
    pub outdated:        u32,
    /// Number of the newest extended test that completed without error.
    pub ext_ok_number:   Option<u32>,
    /// Power-on hour of the newest active failure.
    pub last_error_hour: Option<u16>,
}

impl SelfTestReport {
    fn push(&mut self, e: &SelfTestEntry) {
        let number = self.entries.len() as u32 + 1;
        let failed = e.failed();
        let outdated = failed && self.ext_ok_number.is_some();
        if failed {
            if outdated {
                self.outdated += 1;
            } else {
                self.errors += 1;
                self.last_error_hour.get_or_insert(e.timestamp);
            }
        }
        if e.extended_ok() && self.ext_ok_number.is_none() {
            self.ext_ok_number = Some(number);
        }
        self.entries.push(DecodedSelfTest {
            number,
            test_type: e.test_type,
            status: e.status,
            remaining_percent: e.remaining_percent(),
            lifetime_hours: e.timestamp,
            failing_lba: (failed && e.failing_lba < LBA_NOT_APPLICABLE).then_some(e.failing_lba),
            outdated,
        });
    }

    /// Total failures, outdated or not.
    pub fn failures(&self) -> u32 {
        self.errors + self.outdated
    }
}

/// Walk the 21-entry summary self-test log.
pub fn decode_self_test_log(log: &SelfTestLog, base: IndexBase) -> Result<SelfTestReport> {
    let mut report = SelfTestReport::default();
    if log.most_recent == 0 {
        return Ok(report);
    }
    let view = CircularView::new(
        "SMART self-test log",
        SELFTEST_ENTRIES,
        log.most_recent as usize,
        base,
        SELFTEST_ENTRIES,
    )?;
    for slot in view {
        let e = &log.entries[slot];
        if !e.is_empty() {
            report.push(e);
        }
    }
    Ok(report)
}

/// Walk the multi-sector extended self-test log.
pub fn decode_ext_self_test_log(log: &ExtSelfTestLog, base: IndexBase) -> Result<SelfTestReport> {
    let mut report = SelfTestReport::default();
    if log.index == 0 {
        return Ok(report);
    }
    let nentries = log.entries.len();
    if log.index as usize > nentries {
        return Err(SmartError::decode(
            "extended self-test log",
            format!("invalid self-test log index {}", log.index),
        ));
    }
    let view = CircularView::new("extended self-test log", nentries, log.index as usize, base, nentries)?;
    for slot in view {
        let e = &log.entries[slot];
        if !e.is_empty() {
            report.push(e);
        }
    }
    Ok(report)
}
