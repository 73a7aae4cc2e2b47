//! SCT status report and temperature history reconstruction.

use chrono::{DateTime, TimeZone};

use super::circular::{CircularView, IndexBase};
use crate::codec::sct::{SctStatus, SctTempHistory, TEMP_UNKNOWN};
use crate::error::{Result, SmartError};

pub fn device_state_name(state: u8) -> &'static str {
    match state {
        0 => "Active",
        1 => "Stand-by",
        2 => "Sleep",
        3 => "DST executing in background",
        4 => "SMART Off-line Data Collection executing in background",
        5 => "SCT command executing in background",
        _ => "Unknown",
    }
}

/// Two-column temperature, " ?" when the drive has no reading.
pub fn format_temp(t: i8) -> String {
    if t == TEMP_UNKNOWN {
        " ?".into()
    } else {
        format!("{:2}", t)
    }
}

/// One star per degree above 19, capped at 40 (the last one then `+`).
pub fn temp_bar(t: i8) -> String {
    let x = (t as i32 - 19).max(0);
    if x == 0 {
        return "-".into();
    }
    if x > 40 {
        return format!("{}+", "*".repeat(39));
    }
    "*".repeat(x as usize)
}

/// SMART status word of ACS-4 drives: `Some(true)` passed, `Some(false)` failed.
pub fn smart_status_verdict(word: u16) -> Option<bool> {
    match word {
        0xc24f => Some(true),
        0x2cf4 => Some(false),
        _ => None,
    }
}

/// Human-readable SCT status lines.
pub fn status_report(sts: &SctStatus) -> Vec<String> {
    let mut out = vec![
        format!("SCT Status Version:                  {}", sts.format_version),
        format!("SCT Version (vendor specific):       {} (0x{:04x})", sts.sct_version, sts.sct_version),
    ];
    if sts.sct_spec > 1 {
        out.push(format!("SCT Support Level:                   {}", sts.sct_spec));
    }
    out.push(format!(
        "Device State:                        {} ({})",
        device_state_name(sts.device_state),
        sts.device_state
    ));

    let old = sts.is_old_format_2();
    let min_or_dash = |t: i8| if old { "--".to_string() } else { format_temp(t) };
    out.push(format!("Current Temperature:                    {} Celsius", format_temp(sts.hda_temp)));
    out.push(format!(
        "Power Cycle Min/Max Temperature:     {}/{} Celsius",
        min_or_dash(sts.min_temp),
        format_temp(sts.max_temp)
    ));
    out.push(format!(
        "Lifetime    Min/Max Temperature:     {}/{} Celsius",
        min_or_dash(sts.life_min_temp),
        format_temp(sts.life_max_temp)
    ));
    if old {
        return out;
    }

    if sts.max_op_limit > 0 {
        out.push(format!("Specified Max Operating Temperature:   {:3} Celsius", sts.max_op_limit));
    }
    out.push(format!(
        "Under/Over Temperature Limit Count:  {:2}/{}",
        sts.under_limit_count, sts.over_limit_count
    ));
    if sts.smart_status != 0 {
        let verdict = match smart_status_verdict(sts.smart_status) {
            Some(true) => "PASSED",
            Some(false) => "FAILED",
            None => "Reserved",
        };
        out.push(format!("SMART Status:                        0x{:04x} ({})", sts.smart_status, verdict));
    }
    if sts.min_erc_time != 0 {
        out.push(format!(
            "Minimum supported ERC Time Limit:    {} ({:.1} seconds)",
            sts.min_erc_time,
            sts.min_erc_time as f64 / 10.0
        ));
    }
    out
}

/// One history slot with its estimated wall-clock time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TempSample {
    pub slot:    usize,
    /// Epoch seconds.
    pub time:    i64,
    pub celsius: Option<i8>,
}

/// Per-sample history, oldest first. The newest sample is placed at the
/// logging interval boundary at or before `now`.
pub fn history_samples(h: &SctTempHistory, now: i64, base: IndexBase) -> Result<Vec<TempSample>> {
    if h.size == 0 {
        return Ok(Vec::new());
    }
    if !h.is_valid() {
        return Err(SmartError::decode(
            "SCT temperature history",
            format!("invalid size or index ({} ({}))", h.size, h.index),
        ));
    }
    let size = h.size as usize;
    let step = h.interval.max(1) as i64 * 60;
    let mut t = now - (size as i64 - 1) * step;
    t -= t.rem_euclid(step);

    let view = CircularView::new("SCT temperature history", size, h.index as usize, base, size)?;
    Ok(view
        .rev()
        .enumerate()
        .map(|(n, slot)| {
            let raw = h.samples.get(slot).copied().unwrap_or(TEMP_UNKNOWN);
            TempSample {
                slot,
                time: t + n as i64 * step,
                celsius: (raw != TEMP_UNKNOWN).then_some(raw),
            }
        })
        .collect())
}

/// Table lines for display. Runs of more than three equal readings are
/// shown as first, `..(N skipped)..`, last.
pub fn history_lines<Tz: TimeZone>(samples: &[TempSample], tz: &Tz) -> Vec<String>
where
    Tz::Offset: std::fmt::Display,
{
    let temp = |s: &TempSample| s.celsius.unwrap_or(TEMP_UNKNOWN);
    let mut out = Vec::new();
    let mut n = 0;
    while n < samples.len() {
        let n1 = n;
        let mut n2 = n + 1;
        while n2 < samples.len() && temp(&samples[n2]) == temp(&samples[n1]) {
            n2 += 1;
        }
        while n < n2 {
            let s = &samples[n];
            if n == n1 || n == n2 - 1 || n2 <= n1 + 3 {
                let date = DateTime::from_timestamp(s.time, 0)
                    .map(|d| d.with_timezone(tz).format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_default();
                out.push(format!(" {:3}    {}    {}  {}", s.slot, date, format_temp(temp(s)), temp_bar(temp(s))));
            } else if n == n1 + 1 {
                out.push(format!(" ...    ..({:3} skipped).    ..  {}", n2 - n1 - 2, temp_bar(temp(s))));
            }
            n += 1;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::sct::MAX_HISTORY;
    use chrono::Utc;

    fn history(size: u16, index: u16, temps: &[i8]) -> SctTempHistory {
        let mut samples = vec![0i8; MAX_HISTORY];
        samples[..temps.len()].copy_from_slice(temps);
        SctTempHistory {
            format_version:  2,
            sampling_period: 1,
            interval:        10,
            max_op_limit:    60,
            over_limit:      70,
            min_op_limit:    0,
            under_limit:     -5,
            size,
            index,
            samples,
        }
    }

    #[test]
    fn samples_are_oldest_first_with_times() {
        let h = history(4, 1, &[31, 32, 29, 30]);
        let now = 1_700_000_123;
        let s = history_samples(&h, now, IndexBase::Zero).unwrap();
        let temps: Vec<Option<i8>> = s.iter().map(|x| x.celsius).collect();
        assert_eq!(temps, vec![Some(29), Some(30), Some(31), Some(32)]);
        assert_eq!(s[0].slot, 2);
        assert_eq!(s[1].time - s[0].time, 600);
        assert_eq!(s[0].time % 600, 0);
        assert!(s[3].time <= now && now - s[3].time < 600);
    }

    #[test]
    fn unknown_readings_are_none() {
        let h = history(2, 0, &[TEMP_UNKNOWN, 40]);
        let s = history_samples(&h, 0, IndexBase::Zero).unwrap();
        assert_eq!(s[0].celsius, Some(40));
        assert_eq!(s[1].celsius, None);
    }

    #[test]
    fn invalid_and_empty_history() {
        assert!(history_samples(&history(0, 0, &[]), 0, IndexBase::Zero).unwrap().is_empty());
        assert!(history_samples(&history(4, 4, &[]), 0, IndexBase::Zero).is_err());
        assert!(history_samples(&history(600, 0, &[]), 0, IndexBase::Zero).is_err());
    }

    #[test]
    fn runs_are_compressed_for_display() {
        let h = history(8, 7, &[30, 30, 30, 30, 30, 30, 35, 36]);
        let s = history_samples(&h, 86_400, IndexBase::Zero).unwrap();
        let lines = history_lines(&s, &Utc);
        assert_eq!(lines.len(), 5);
        assert!(lines[1].contains("..(  4 skipped).."));
        assert!(lines[4].ends_with("36  *****************"));
        assert_eq!(s.len(), 8);
    }

    #[test]
    fn status_lines() {
        let mut sts = SctStatus::default();
        sts.hda_temp = 38;
        sts.min_temp = 20;
        sts.max_temp = 41;
        sts.life_min_temp = 15;
        sts.life_max_temp = 55;
        sts.smart_status = 0x2cf4;
        let lines = status_report(&sts);
        assert!(lines.iter().any(|l| l.ends_with("38 Celsius")));
        assert!(lines.iter().any(|l| l.contains("0x2cf4 (FAILED)")));

        let old = SctStatus { min_temp: 0, life_min_temp: 0, ..sts };
        let lines = status_report(&old);
        assert!(lines.iter().any(|l| l.contains("--/41")));
        assert!(!lines.iter().any(|l| l.contains("SMART Status")));
    }

    #[test]
    fn bars_and_temps() {
        assert_eq!(temp_bar(19), "-");
        assert_eq!(temp_bar(22), "***");
        assert_eq!(temp_bar(80).len(), 40);
        assert!(temp_bar(80).ends_with('+'));
        assert_eq!(format_temp(-128), " ?");
        assert_eq!(format_temp(5), " 5");
    }
}
