//! Warning mail categories and the per-category throttle policy.

use serde::{Deserialize, Serialize};

use super::state::MailRecord;

const DAY: i64 = 24 * 3600;

/// Warning categories. The discriminant is the index of the throttle
/// record in the state file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MailType {
    EmailTest,
    Health,
    Usage,
    SelfTest,
    ErrorCount,
    FailedHealthCheck,
    FailedReadSmartData,
    FailedReadSmartErrorLog,
    FailedReadSmartSelfTestLog,
    FailedOpenDevice,
    CurrentPendingSector,
    OfflineUncorrectableSector,
    Temperature,
}

impl MailType {
    pub const ALL: [MailType; 13] = [
        MailType::EmailTest,
        MailType::Health,
        MailType::Usage,
        MailType::SelfTest,
        MailType::ErrorCount,
        MailType::FailedHealthCheck,
        MailType::FailedReadSmartData,
        MailType::FailedReadSmartErrorLog,
        MailType::FailedReadSmartSelfTestLog,
        MailType::FailedOpenDevice,
        MailType::CurrentPendingSector,
        MailType::OfflineUncorrectableSector,
        MailType::Temperature,
    ];

    pub fn index(&self) -> usize {
        *self as usize
    }

    pub fn name(&self) -> &'static str {
        match self {
            MailType::EmailTest                  => "EmailTest",
            MailType::Health                     => "Health",
            MailType::Usage                      => "Usage",
            MailType::SelfTest                   => "SelfTest",
            MailType::ErrorCount                 => "ErrorCount",
            MailType::FailedHealthCheck          => "FailedHealthCheck",
            MailType::FailedReadSmartData        => "FailedReadSmartData",
            MailType::FailedReadSmartErrorLog    => "FailedReadSmartErrorLog",
            MailType::FailedReadSmartSelfTestLog => "FailedReadSmartSelfTestLog",
            MailType::FailedOpenDevice           => "FailedOpenDevice",
            MailType::CurrentPendingSector       => "CurrentPendingSector",
            MailType::OfflineUncorrectableSector => "OfflineUncorrectableSector",
            MailType::Temperature                => "Temperature",
        }
    }
}

/// How often a category may repeat while its condition persists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MailFrequency {
    Once,
    Daily,
    /// Next mail after 1, 2, 4, 8, ... days.
    Diminishing,
}

/// A mail that passed the throttle, with the context sinks expose.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailNotice {
    pub kind:       MailType,
    pub message:    String,
    /// Mails already sent for this condition before this one.
    pub prev_count: u32,
    /// Epoch seconds of the first mail for this condition.
    pub first_sent: i64,
    /// Days until the next reminder, if any will be sent.
    pub next_days:  Option<u64>,
}

/// Apply the throttle to `rec` at `now`. Returns the notice to deliver
/// and updates the record as sent, or `None` if the mail is suppressed.
pub fn throttle(
    rec: &mut MailRecord,
    kind: MailType,
    freq: MailFrequency,
    message: &str,
    now: i64,
) -> Option<MailNotice> {
    if rec.logged > 0 {
        if kind == MailType::EmailTest {
            return None;
        }
        let wait_days = match freq {
            MailFrequency::Once => return None,
            MailFrequency::Daily => 1,
            MailFrequency::Diminishing => 1i64 << (rec.logged - 1).min(32),
        };
        if now < rec.last_sent + wait_days * DAY {
            return None;
        }
    }

    if rec.logged == 0 {
        rec.first_sent = now;
    }
    rec.last_sent = now;

    let next_days = match (kind, freq) {
        (MailType::EmailTest, _) | (_, MailFrequency::Once) => None,
        (_, MailFrequency::Daily) => Some(1),
        (_, MailFrequency::Diminishing) => Some(1u64 << rec.logged.min(32)),
    };
    let notice = MailNotice {
        kind,
        message: message.to_string(),
        prev_count: rec.logged,
        first_sent: rec.first_sent,
        next_days,
    };
    rec.logged += 1;
    Some(notice)
}

/// Clear a category after its condition went away. Returns the reset
/// message when mails had been sent.
pub fn reset(rec: &mut MailRecord, device: &str, reason: &str) -> Option<String> {
    if rec.logged == 0 {
        return None;
    }
    let msg = format!(
        "Device: {}, {}, warning condition reset after {} email{}",
        device,
        reason,
        rec.logged,
        if rec.logged == 1 { "" } else { "s" }
    );
    *rec = MailRecord::default();
    Some(msg)
}
