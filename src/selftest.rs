//! Launching scheduled self-tests, including selective span planning.

use crate::alerts::Severity;
use crate::codec::selftest::{selective_flags, TestSpan, SELECTIVE_SPANS};
use crate::codec::values::SmartValues;
use crate::codec::{ChecksumPolicy, FirmwareBug, FirmwareBugs};
use crate::error::{Result, SmartError};
use crate::scheduler::{SelectiveMode, TestCaps, TestType};
use crate::transport::{
    Transport, CONVEYANCE_SELF_TEST, EXTEND_SELF_TEST, OFFLINE_FULL_SCAN, SELECTIVE_SELF_TEST, SHORT_SELF_TEST,
};

/// Resolve `Cont` against the last test's status nibble: redo after an
/// abort or interruption by the host, otherwise move on.
pub fn effective_mode(mode: SelectiveMode, exec_status: u8) -> SelectiveMode {
    match mode {
        SelectiveMode::Cont => match exec_status >> 4 {
            1 | 2 => SelectiveMode::Redo,
            _ => SelectiveMode::Next,
        },
        m => m,
    }
}

/// Compute the span for the next selective test.
///
/// `drive` is span 0 as read from the drive; when the drive has cleared it,
/// `prev` (the persisted span) is used instead. A `Next` span that runs off
/// the end of the disk is resized so the disk splits into equal spans.
pub fn plan_span(mode: SelectiveMode, drive: TestSpan, prev: TestSpan, num_sectors: u64) -> Result<TestSpan> {
    if num_sectors == 0 {
        return Err(SmartError::decode("selective self-test", "disk size is unknown"));
    }
    let old = if drive.is_empty() { prev } else { drive };
    let (start, mut end) = match mode {
        SelectiveMode::Redo => (old.start, old.end),
        SelectiveMode::Next | SelectiveMode::Cont => {
            if old.end == 0 {
                (0, 0)
            } else {
                let start = old.end.checked_add(1).filter(|s| *s < num_sectors).unwrap_or(0);
                let oldsize = old.end.saturating_sub(old.start).saturating_add(1);
                let end = start.saturating_add(oldsize - 1);
                if end >= num_sectors {
                    let spans = num_sectors.div_ceil(oldsize);
                    let newsize = num_sectors.div_ceil(spans);
                    (num_sectors - newsize, num_sectors - 1)
                } else {
                    (start, end)
                }
            }
        }
    };
    if start < num_sectors && num_sectors <= end {
        end = num_sectors - 1;
    }
    if !(start <= end && end < num_sectors) {
        return Err(SmartError::decode(
            "selective self-test",
            format!("invalid span {}-{} ({} sectors)", start, end, num_sectors),
        ));
    }
    Ok(TestSpan { start, end })
}

/// Read the selective log, plan the span and write the log back.
/// Returns the mode actually used and the span written.
pub fn prepare_selective(
    dev: &mut dyn Transport,
    mode: SelectiveMode,
    values: &SmartValues,
    prev: TestSpan,
    num_sectors: u64,
    policy: ChecksumPolicy,
) -> Result<(SelectiveMode, TestSpan)> {
    if num_sectors == 0 {
        return Err(SmartError::decode("selective self-test", "disk size is unknown"));
    }
    let mut log = dev.selective_log(policy)?;
    log.version = 1;
    if (1..6).contains(&log.current_span) && values.self_test_in_progress() {
        return Err(SmartError::decode("selective self-test", "self-test in progress"));
    }
    let mode = effective_mode(mode, values.self_test_exec_status);
    let span = plan_span(mode, log.spans[0], prev, num_sectors)?;

    log.spans = [TestSpan::default(); SELECTIVE_SPANS];
    log.spans[0] = span;
    log.current_lba = 0;
    log.current_span = 0;
    log.flags &= !(selective_flags::ACTIVE | selective_flags::PENDING);
    dev.write_selective_log(&log)?;
    Ok((mode, span))
}

/// What a launch attempt did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Launch {
    pub started:  bool,
    /// Span written for a selective test.
    pub span:     Option<TestSpan>,
    pub reports:  Vec<(Severity, String)>,
}

impl Launch {
    fn report(&mut self, severity: Severity, msg: String) {
        self.reports.push((severity, msg));
    }
}

fn percent(lba: u64, num_sectors: u64) -> u64 {
    (100 * lba as u128 + num_sectors as u128 / 2).checked_div(num_sectors as u128).unwrap_or(0) as u64
}

/// Start `test` on the device. A refused test type is remembered in `caps`.
#[allow(clippy::too_many_arguments)]
pub fn launch_test(
    dev: &mut dyn Transport,
    name: &str,
    test: TestType,
    caps: &mut TestCaps,
    bugs: FirmwareBugs,
    prev_span: TestSpan,
    num_sectors: u64,
    policy: ChecksumPolicy,
) -> Launch {
    let mut out = Launch::default();
    let values = match dev.smart_values(policy) {
        Ok(v) if v.offline_capability != 0 => v,
        _ => {
            out.report(Severity::Critical, format!("Device: {}, not capable of Offline or Self-Testing.", name));
            return out;
        }
    };

    let label = test.label();
    let subcommand = match test {
        TestType::Offline if values.offline_immediate_supported() => Some(OFFLINE_FULL_SCAN),
        TestType::Conveyance if values.conveyance_supported() => Some(CONVEYANCE_SELF_TEST),
        TestType::Short if values.self_test_supported() => Some(SHORT_SELF_TEST),
        TestType::Long if values.self_test_supported() => Some(EXTEND_SELF_TEST),
        TestType::SelectiveNext | TestType::SelectiveCont | TestType::SelectiveRedo
            if values.selective_supported() =>
        {
            Some(SELECTIVE_SELF_TEST)
        }
        _ => None,
    };
    let Some(subcommand) = subcommand else {
        caps.refuse(test);
        out.report(Severity::Critical, format!("Device: {}, not capable of {}Test", name, label));
        return out;
    };

    if values.self_test_in_progress() {
        if bugs.is_set(FirmwareBug::Samsung3) && values.self_test_exec_status == 0xf0 {
            out.report(
                Severity::Info,
                format!(
                    "Device: {}, will not skip scheduled {}Test despite unclear Self-Test byte (SAMSUNG Firmware bug).",
                    name, label
                ),
            );
        } else {
            out.report(
                Severity::Info,
                format!(
                    "Device: {}, skip scheduled {}Test; {}0% remaining of current Self-Test.",
                    name,
                    label,
                    values.self_test_exec_status & 0x0f
                ),
            );
            return out;
        }
    }

    if let Some(mode) = test.selective_mode() {
        match prepare_selective(dev, mode, &values, prev_span, num_sectors, policy) {
            Ok((used, span)) => {
                out.report(
                    Severity::Info,
                    format!(
                        "Device: {}, {} test span at LBA {} - {} ({} sectors, {}% - {}% of disk).",
                        name,
                        if used == SelectiveMode::Next { "next" } else { "redo" },
                        span.start,
                        span.end,
                        span.end - span.start + 1,
                        percent(span.start, num_sectors),
                        percent(span.end, num_sectors)
                    ),
                );
                out.span = Some(span);
            }
            Err(e) => {
                tracing::debug!("{}: {}", name, e);
                out.report(Severity::Critical, format!("Device: {}, prepare {}Test failed", name, label));
                return out;
            }
        }
    }

    if let Err(e) = dev.start_test(subcommand) {
        tracing::debug!("{}: {}", name, e);
        out.report(Severity::Critical, format!("Device: {}, execute {}Test failed.", name, label));
        return out;
    }
    out.started = true;
    let minutes = values.test_minutes(subcommand);
    let mut msg = format!("Device: {}, starting scheduled {}Test.", name, label);
    if minutes > 0 {
        msg = format!("{} Expected duration {} minutes.", msg, minutes);
    }
    out.report(Severity::Info, msg);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::selftest::SelectiveLog;
    use crate::codec::values::cap;
    use crate::transport::{ImageTransport, Page, LOG_SELECTIVE};

    const N: u64 = 1000;

    fn span(start: u64, end: u64) -> TestSpan {
        TestSpan { start, end }
    }

    fn device(capability: u8, exec_status: u8) -> ImageTransport {
        let mut dev = ImageTransport::new("sda");
        let values = SmartValues {
            offline_capability: capability,
            self_test_exec_status: exec_status,
            short_test_minutes: 2,
            ..Default::default()
        };
        dev.set_values(&values);
        dev.set_page(Page::Log { gp: false, address: LOG_SELECTIVE }, SelectiveLog::default().to_page());
        dev
    }

    #[test]
    fn next_span_advances_and_wraps() {
        assert_eq!(plan_span(SelectiveMode::Next, span(0, 99), span(0, 0), N).unwrap(), span(100, 199));
        assert_eq!(plan_span(SelectiveMode::Next, span(0, 0), span(100, 199), N).unwrap(), span(200, 299));
        assert_eq!(plan_span(SelectiveMode::Next, span(900, 999), span(0, 0), N).unwrap(), span(0, 99));
        assert_eq!(plan_span(SelectiveMode::Next, span(0, 0), span(0, 0), N).unwrap(), span(0, 0));
    }

    #[test]
    fn next_span_resizes_at_the_end() {
        // 300-sector spans do not divide 1000: four spans of 250.
        assert_eq!(plan_span(SelectiveMode::Next, span(600, 899), span(0, 0), N).unwrap(), span(750, 999));
    }

    #[test]
    fn huge_span_end_from_drive_wraps_to_start() {
        assert_eq!(plan_span(SelectiveMode::Next, span(5, u64::MAX), span(0, 0), N).unwrap(), span(0, 999));
        assert_eq!(plan_span(SelectiveMode::Next, span(0, 0), span(0, u64::MAX), N).unwrap(), span(0, 999));
        assert_eq!(plan_span(SelectiveMode::Redo, span(5, u64::MAX), span(0, 0), N).unwrap(), span(5, 999));
    }

    #[test]
    fn redo_repeats_and_is_clamped() {
        assert_eq!(plan_span(SelectiveMode::Redo, span(10, 20), span(0, 0), N).unwrap(), span(10, 20));
        assert_eq!(plan_span(SelectiveMode::Redo, span(900, 5000), span(0, 0), N).unwrap(), span(900, 999));
        assert!(plan_span(SelectiveMode::Redo, span(2000, 3000), span(0, 0), N).is_err());
        assert!(plan_span(SelectiveMode::Redo, span(1, 2), span(0, 0), 0).is_err());
    }

    #[test]
    fn cont_follows_last_status() {
        assert_eq!(effective_mode(SelectiveMode::Cont, 0x10), SelectiveMode::Redo);
        assert_eq!(effective_mode(SelectiveMode::Cont, 0x20), SelectiveMode::Redo);
        assert_eq!(effective_mode(SelectiveMode::Cont, 0x00), SelectiveMode::Next);
        assert_eq!(effective_mode(SelectiveMode::Redo, 0x00), SelectiveMode::Redo);
    }

    #[test]
    fn short_test_starts() {
        let mut dev = device(cap::EXEC_OFFLINE_IMMEDIATE | cap::SELF_TEST, 0);
        let mut caps = TestCaps::default();
        let l = launch_test(&mut dev, "sda", TestType::Short, &mut caps, FirmwareBugs::default(), span(0, 0), N, ChecksumPolicy::Warn);
        assert!(l.started);
        assert_eq!(dev.started_tests(), &[SHORT_SELF_TEST]);
        assert_eq!(
            l.reports.last().map(|r| r.1.as_str()),
            Some("Device: sda, starting scheduled Short Self-Test. Expected duration 2 minutes.")
        );
    }

    #[test]
    fn refused_type_is_remembered() {
        let mut dev = device(cap::EXEC_OFFLINE_IMMEDIATE | cap::SELF_TEST, 0);
        let mut caps = TestCaps::default();
        let l = launch_test(&mut dev, "sda", TestType::Conveyance, &mut caps, FirmwareBugs::default(), span(0, 0), N, ChecksumPolicy::Warn);
        assert!(!l.started);
        assert!(caps.conveyance);
        assert_eq!(l.reports[0], (Severity::Critical, "Device: sda, not capable of Conveyance Self-Test".into()));
    }

    #[test]
    fn running_test_blocks_unless_samsung3() {
        let mut dev = device(cap::SELF_TEST | 1, 0xf3);
        let mut caps = TestCaps::default();
        let l = launch_test(&mut dev, "sda", TestType::Long, &mut caps, FirmwareBugs::default(), span(0, 0), N, ChecksumPolicy::Warn);
        assert!(!l.started);
        assert!(l.reports[0].1.contains("30% remaining"));

        let mut dev = device(cap::SELF_TEST | 1, 0xf0);
        let bugs = FirmwareBugs::parse_all(&["samsung3"]).unwrap();
        let l = launch_test(&mut dev, "sda", TestType::Long, &mut caps, bugs, span(0, 0), N, ChecksumPolicy::Warn);
        assert!(l.started);
    }

    #[test]
    fn selective_writes_span() {
        let mut dev = device(cap::SELECTIVE | 1, 0);
        let mut caps = TestCaps::default();
        let l = launch_test(&mut dev, "sda", TestType::SelectiveNext, &mut caps, FirmwareBugs::default(), span(0, 249), N, ChecksumPolicy::Warn);
        assert!(l.started);
        assert_eq!(l.span, Some(span(250, 499)));
        assert_eq!(l.reports[0].1, "Device: sda, next test span at LBA 250 - 499 (250 sectors, 25% - 50% of disk).");
        let written = dev.selective_log(ChecksumPolicy::Fatal).unwrap();
        assert_eq!(written.spans[0], span(250, 499));
        assert_eq!(dev.started_tests(), &[SELECTIVE_SELF_TEST]);
    }

    #[test]
    fn unreadable_values_refuse_everything() {
        let mut dev = ImageTransport::new("sda");
        let mut caps = TestCaps::default();
        let l = launch_test(&mut dev, "sda", TestType::Short, &mut caps, FirmwareBugs::default(), span(0, 0), N, ChecksumPolicy::Warn);
        assert!(!l.started);
        assert!(l.reports[0].1.ends_with("not capable of Offline or Self-Testing."));
    }
}
