//! Attribute health states and the overall SMART verdict.

use tracing::warn;

use crate::attrdefs::{AttrDefs, AttrFlags};
use crate::codec::values::{Attribute, SmartValues, Thresholds};

/// Health of one attribute, ordered by severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AttrState {
    NonExisting,
    NoNormval,
    NoThreshold,
    Ok,
    FailedPast,
    FailedNow,
}

impl AttrState {
    pub fn label(&self) -> &'static str {
        match self {
            AttrState::NonExisting => "-",
            AttrState::NoNormval   => "---",
            AttrState::NoThreshold => "---",
            AttrState::Ok          => "-",
            AttrState::FailedPast  => "In_the_past",
            AttrState::FailedNow   => "FAILING_NOW",
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, AttrState::FailedPast | AttrState::FailedNow)
    }
}

/// Classify one attribute. The slot index is a hint: the threshold in the
/// same slot is used when its id matches, otherwise the table is scanned
/// by id. Returns the threshold byte when one exists.
pub fn attr_state(attr: &Attribute, index: usize, thresholds: &Thresholds, defs: &AttrDefs) -> (AttrState, Option<u8>) {
    if attr.is_empty() {
        return (AttrState::NonExisting, None);
    }
    let flags = defs.flags(attr.id);
    if flags.contains(AttrFlags::NO_NORMVAL) {
        return (AttrState::NoNormval, None);
    }

    let threshold = match thresholds.entries.get(index) {
        Some(t) if t.id == attr.id => Some(t.threshold),
        _ => thresholds.lookup(attr.id),
    };
    let Some(threshold) = threshold else {
        return (AttrState::NoThreshold, None);
    };
    // 0x00 never fails; 0xff means "always passing" on many drives.
    if threshold == 0x00 || threshold == 0xff {
        return (AttrState::NoThreshold, Some(threshold));
    }

    let state = if attr.current <= threshold {
        AttrState::FailedNow
    } else if !flags.contains(AttrFlags::NO_WORSTVAL) && attr.worst <= threshold {
        AttrState::FailedPast
    } else {
        AttrState::Ok
    };
    (state, Some(threshold))
}

/// Classify every non-empty slot.
pub fn attr_states<'a>(
    values: &'a SmartValues,
    thresholds: &'a Thresholds,
    defs: &'a AttrDefs,
) -> impl Iterator<Item = (&'a Attribute, AttrState, Option<u8>)> + 'a {
    values
        .attributes
        .iter()
        .enumerate()
        .filter(|(_, a)| !a.is_empty())
        .map(move |(i, a)| {
            let (state, thr) = attr_state(a, i, thresholds, defs);
            (a, state, thr)
        })
}

// ── Overall verdict ──────────────────────────────────────────────────

const STATUS_MID_OK:        u8 = 0x4f;
const STATUS_HIGH_OK:       u8 = 0xc2;
const STATUS_MID_EXCEEDED:  u8 = 0xf4;
const STATUS_HIGH_EXCEEDED: u8 = 0x2c;

/// What the drive answered to SMART RETURN STATUS.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnStatus {
    Passed,
    Failed,
    Inconclusive,
}

/// Decode the (LBA mid, LBA high) output registers. Some SAT layers only
/// pass LBA mid through, so a mid-only match is still accepted.
pub fn return_status(mid: u8, high: u8) -> ReturnStatus {
    match (mid, high) {
        (STATUS_MID_OK, STATUS_HIGH_OK) => ReturnStatus::Passed,
        (STATUS_MID_EXCEEDED, STATUS_HIGH_EXCEEDED) => ReturnStatus::Failed,
        (STATUS_MID_OK, _) => {
            warn!("SMART RETURN STATUS: incomplete register response, assuming passed");
            ReturnStatus::Passed
        }
        (STATUS_MID_EXCEEDED, _) => {
            warn!("SMART RETURN STATUS: incomplete register response, assuming failed");
            ReturnStatus::Failed
        }
        _ => ReturnStatus::Inconclusive,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerdictSource {
    Firmware,
    Attributes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthVerdict {
    pub passed: bool,
    pub source: VerdictSource,
}

impl HealthVerdict {
    pub fn label(&self) -> &'static str {
        match (self.passed, self.source) {
            (true,  VerdictSource::Firmware)   => "PASSED",
            (false, VerdictSource::Firmware)   => "FAILED!",
            (true,  VerdictSource::Attributes) => "PASSED (from attributes)",
            (false, VerdictSource::Attributes) => "FAILED! (from attributes)",
        }
    }
}

/// Combine the firmware's answer with attribute inference. An
/// inconclusive or missing answer falls back to "failed if any pre-failure
/// attribute is at or below its threshold now".
pub fn health_verdict(
    status: Option<ReturnStatus>,
    values: Option<&SmartValues>,
    thresholds: Option<&Thresholds>,
    defs: &AttrDefs,
) -> Option<HealthVerdict> {
    match status {
        Some(ReturnStatus::Passed) => return Some(HealthVerdict { passed: true, source: VerdictSource::Firmware }),
        Some(ReturnStatus::Failed) => return Some(HealthVerdict { passed: false, source: VerdictSource::Firmware }),
        _ => {}
    }
    let (values, thresholds) = (values?, thresholds?);
    let failing = attr_states(values, thresholds, defs)
        .any(|(a, state, _)| a.prefailure() && state == AttrState::FailedNow);
    Some(HealthVerdict { passed: !failing, source: VerdictSource::Attributes })
}
