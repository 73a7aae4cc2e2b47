//! Self-test schedule: which test is due, and which ones are coming up.
//!
//! A schedule is a regular expression matched in full against strings of
//! the form `T/MM/DD/d/HH` (test letter, month, day of month, weekday with
//! 1 = Monday .. 7 = Sunday, hour), evaluated in local time.

use std::fmt;

use chrono::{DateTime, Datelike, TimeZone, Timelike};
use regex::Regex;

use crate::error::{Result, SmartError};

const HOUR: i64 = 3600;
/// Longest interval scanned for missed tests.
pub const MAX_LOOKBACK: i64 = 90 * 24 * HOUR;

/// Selective self-test span policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectiveMode {
    /// Advance past the last span.
    Next,
    /// Redo after an aborted or interrupted test, otherwise advance.
    Cont,
    /// Repeat the last span.
    Redo,
}

/// Test kinds, declared in scheduling priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TestType {
    Long,
    SelectiveNext,
    SelectiveCont,
    SelectiveRedo,
    Short,
    Conveyance,
    Offline,
}

impl TestType {
    pub const PRIORITY: [TestType; 7] = [
        TestType::Long,
        TestType::SelectiveNext,
        TestType::SelectiveCont,
        TestType::SelectiveRedo,
        TestType::Short,
        TestType::Conveyance,
        TestType::Offline,
    ];

    pub fn letter(&self) -> char {
        match self {
            TestType::Long          => 'L',
            TestType::SelectiveNext => 'n',
            TestType::SelectiveCont => 'c',
            TestType::SelectiveRedo => 'r',
            TestType::Short         => 'S',
            TestType::Conveyance    => 'C',
            TestType::Offline       => 'O',
        }
    }

    pub fn from_letter(c: char) -> Option<Self> {
        TestType::PRIORITY.iter().copied().find(|t| t.letter() == c)
    }

    /// Prefix used in launch messages ("Short Self-" + "Test").
    pub fn label(&self) -> &'static str {
        match self {
            TestType::Long => "Long Self-",
            TestType::Short => "Short Self-",
            TestType::Conveyance => "Conveyance Self-",
            TestType::Offline => "Offline Immediate ",
            TestType::SelectiveNext | TestType::SelectiveCont | TestType::SelectiveRedo => "Selective Self-",
        }
    }

    pub fn selective_mode(&self) -> Option<SelectiveMode> {
        match self {
            TestType::SelectiveNext => Some(SelectiveMode::Next),
            TestType::SelectiveCont => Some(SelectiveMode::Cont),
            TestType::SelectiveRedo => Some(SelectiveMode::Redo),
            _ => None,
        }
    }

    fn index(&self) -> usize {
        *self as usize
    }
}

impl fmt::Display for TestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.letter())
    }
}

/// Test kinds a device has refused, plus the device family.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TestCaps {
    pub scsi:       bool,
    pub long:       bool,
    pub short:      bool,
    pub conveyance: bool,
    pub offline:    bool,
    pub selective:  bool,
}

impl TestCaps {
    pub fn scsi() -> Self {
        Self { scsi: true, ..Default::default() }
    }

    /// Remember that `t` is not supported.
    pub fn refuse(&mut self, t: TestType) {
        match t {
            TestType::Long => self.long = true,
            TestType::Short => self.short = true,
            TestType::Conveyance => self.conveyance = true,
            TestType::Offline => self.offline = true,
            TestType::SelectiveNext | TestType::SelectiveCont | TestType::SelectiveRedo => self.selective = true,
        }
    }

    pub fn allows(&self, t: TestType) -> bool {
        match t {
            TestType::Long => !self.long,
            TestType::Short => !self.short,
            TestType::Conveyance => !self.scsi && !self.conveyance,
            TestType::Offline => !self.scsi && !self.offline,
            TestType::SelectiveNext | TestType::SelectiveCont | TestType::SelectiveRedo => {
                !self.scsi && !self.selective
            }
        }
    }

    /// False once every non-selective test kind has been refused.
    pub fn any(&self) -> bool {
        !(self.long && self.short && (self.scsi || (self.conveyance && self.offline)))
    }
}

/// A compiled schedule.
#[derive(Debug, Clone)]
pub struct Schedule {
    pattern: String,
    re:      Regex,
}

impl Schedule {
    pub fn new(pattern: &str) -> Result<Self> {
        let re = Regex::new(&format!("^(?:{})$", pattern)).map_err(|source| SmartError::Schedule {
            pattern: pattern.to_string(),
            source,
        })?;
        Ok(Self { pattern: pattern.to_string(), re })
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn matches(&self, subject: &str) -> bool {
        self.re.is_match(subject)
    }
}

/// `T/MM/DD/d/HH` for test `t` at `when`.
pub fn schedule_key<Tz: TimeZone>(t: TestType, when: &DateTime<Tz>) -> String {
    format!(
        "{}/{:02}/{:02}/{}/{:02}",
        t.letter(),
        when.month(),
        when.day(),
        when.weekday().number_from_monday(),
        when.hour()
    )
}

/// A test found due by [`next_scheduled_test`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DueTest {
    pub test:     TestType,
    /// Epoch seconds of the matching hour slot.
    pub time:     i64,
    /// The slot is not the current hour: a missed test being caught up.
    pub catch_up: bool,
}

fn local<Tz: TimeZone>(tz: &Tz, t: i64) -> Option<DateTime<Tz>> {
    DateTime::from_timestamp(t, 0).map(|d| d.with_timezone(tz))
}

/// Scan hour slots from `*next_check` up to `now` and return the highest
/// priority test due in that interval. The scan starts no earlier than
/// 90 days before `now`. `*next_check` is moved to the top of the next hour.
pub fn next_scheduled_test<Tz: TimeZone>(
    schedule: &Schedule,
    caps: &TestCaps,
    next_check: &mut i64,
    now: i64,
    tz: &Tz,
) -> Option<DueTest> {
    if !caps.any() || now < *next_check {
        return None;
    }
    if *next_check + MAX_LOOKBACK < now {
        *next_check = now - MAX_LOOKBACK;
    }

    let mut found: Option<(TestType, i64, u32)> = None;
    // Only tests ranked above the current find remain eligible.
    let mut limit = TestType::PRIORITY.len();
    let mut t = *next_check;
    loop {
        let when = local(tz, t)?;
        for test in TestType::PRIORITY.iter().take(limit) {
            if !caps.allows(*test) {
                continue;
            }
            if schedule.matches(&schedule_key(*test, &when)) {
                found = Some((*test, t, when.hour()));
                limit = test.index();
                break;
            }
        }
        if limit == 0 || t >= now {
            break;
        }
        t = (t + HOUR).min(now);
    }

    let now_local = local(tz, now)?;
    *next_check = now + HOUR - (now_local.minute() as i64 * 60 + now_local.second() as i64);

    found.map(|(test, time, hour)| DueTest {
        test,
        time,
        catch_up: !(hour == now_local.hour() && time + HOUR > now),
    })
}

/// One upcoming test found by [`look_ahead`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlannedTest {
    pub test:   TestType,
    /// Running number of this test type.
    pub number: u32,
    pub time:   i64,
}

/// Upcoming tests over the next 90 days, sampled every `step` seconds.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LookAhead {
    /// At most five per test type.
    pub planned: Vec<PlannedTest>,
    pub totals:  [u32; 7],
    pub until:   i64,
}

/// Run the matcher forward from `now`. `next_check` is the device's
/// persisted value; it is copied, never written back.
pub fn look_ahead<Tz: TimeZone>(
    schedule: &Schedule,
    caps: &TestCaps,
    next_check: i64,
    now: i64,
    step: i64,
    tz: &Tz,
) -> LookAhead {
    let step = step.max(1);
    let mut out = LookAhead::default();
    let mut check = next_check;
    let mut seconds = step;
    while seconds < MAX_LOOKBACK {
        let at = now + seconds;
        if let Some(due) = next_scheduled_test(schedule, caps, &mut check, at, tz) {
            let n = &mut out.totals[due.test.index()];
            *n += 1;
            if *n <= 5 {
                out.planned.push(PlannedTest { test: due.test, number: *n, time: at });
            }
        }
        seconds += step;
    }
    out.until = now + seconds;
    out
}

/// Date as shown in schedule and catch-up messages.
pub fn format_time<Tz: TimeZone>(t: i64, tz: &Tz) -> String
where
    Tz::Offset: fmt::Display,
{
    local(tz, t)
        .map(|d| d.format("%a %b %e %H:%M:%S %Y %Z").to_string())
        .unwrap_or_else(|| t.to_string())
}

impl LookAhead {
    /// Report lines for device `name`.
    pub fn lines<Tz: TimeZone>(&self, name: &str, scsi: bool, tz: &Tz) -> Vec<String>
    where
        Tz::Offset: fmt::Display,
    {
        let mut out: Vec<String> = self
            .planned
            .iter()
            .map(|p| {
                format!(
                    "Device: {}, will do test {} of type {} at {}",
                    name,
                    p.number,
                    p.test,
                    format_time(p.time, tz)
                )
            })
            .collect();
        let always = if scsi { "LS" } else { "LSCO" };
        for t in TestType::PRIORITY {
            let cnt = self.totals[t.index()];
            if cnt == 0 && !always.contains(t.letter()) {
                continue;
            }
            out.push(format!(
                "Device: {}, will do {:3} test{} of type {}",
                name,
                cnt,
                if cnt == 1 { "" } else { "s" },
                t
            ));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    // 2023-11-14 22:13:20 UTC, a Tuesday.
    const T0: i64 = 1_700_000_000;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> i64 {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).single().map(|d| d.timestamp()).unwrap()
    }

    #[test]
    fn key_format() {
        let when = local(&Utc, T0).unwrap();
        assert_eq!(schedule_key(TestType::Short, &when), "S/11/14/2/22");
        let sunday = local(&Utc, at(2023, 11, 19, 3, 0)).unwrap();
        assert_eq!(schedule_key(TestType::Long, &sunday), "L/11/19/7/03");
    }

    #[test]
    fn bad_pattern_is_rejected() {
        assert!(matches!(Schedule::new("S/(.*"), Err(SmartError::Schedule { .. })));
    }

    #[test]
    fn full_match_only() {
        let s = Schedule::new("S/../../././03").unwrap();
        assert!(s.matches("S/01/02/3/03"));
        assert!(!s.matches("xS/01/02/3/03"));
        assert!(!s.matches("S/01/02/3/030"));
    }

    #[test]
    fn one_hour_three_in_window() {
        let s = Schedule::new(r"S/.*/.*/.*/03").unwrap();
        let caps = TestCaps::default();
        let mut next = at(2023, 11, 14, 0, 0);
        let due = next_scheduled_test(&s, &caps, &mut next, at(2023, 11, 14, 5, 30), &Utc).unwrap();
        assert_eq!(due.test, TestType::Short);
        assert_eq!(due.time, at(2023, 11, 14, 3, 0));
        assert!(due.catch_up);
        assert_eq!(next, at(2023, 11, 14, 6, 0));

        let mut next = at(2023, 11, 14, 4, 0);
        assert!(next_scheduled_test(&s, &caps, &mut next, at(2023, 11, 14, 9, 0), &Utc).is_none());
    }

    #[test]
    fn on_time_test_is_not_catch_up() {
        let s = Schedule::new(r"S/.*/.*/.*/03").unwrap();
        let mut next = at(2023, 11, 14, 3, 0);
        let due = next_scheduled_test(&s, &TestCaps::default(), &mut next, at(2023, 11, 14, 3, 20), &Utc).unwrap();
        assert!(!due.catch_up);
    }

    #[test]
    fn not_due_before_next_check() {
        let s = Schedule::new("S/.*").unwrap();
        let mut next = T0 + 10;
        assert!(next_scheduled_test(&s, &TestCaps::default(), &mut next, T0, &Utc).is_none());
        assert_eq!(next, T0 + 10);
    }

    #[test]
    fn higher_priority_wins_across_the_window() {
        // Short at 01, long at 04: the later long test outranks the short one.
        let s = Schedule::new(r"(S/.*/01|L/.*/04)").unwrap();
        let mut next = at(2023, 11, 14, 0, 0);
        let due = next_scheduled_test(&s, &TestCaps::default(), &mut next, at(2023, 11, 14, 6, 0), &Utc).unwrap();
        assert_eq!(due.test, TestType::Long);

        let mut caps = TestCaps::default();
        caps.refuse(TestType::Long);
        let mut next = at(2023, 11, 14, 0, 0);
        let due = next_scheduled_test(&s, &caps, &mut next, at(2023, 11, 14, 6, 0), &Utc).unwrap();
        assert_eq!(due.test, TestType::Short);
    }

    #[test]
    fn lookback_is_clamped_to_ninety_days() {
        // Only matches on 2023-06-01, more than 90 days before `now`.
        let s = Schedule::new(r"L/06/01/./.*").unwrap();
        let now = at(2023, 11, 14, 12, 0);
        let mut next = at(2023, 5, 1, 0, 0);
        assert!(next_scheduled_test(&s, &TestCaps::default(), &mut next, now, &Utc).is_none());

        let s = Schedule::new(r"L/08/20/./10").unwrap();
        let mut next = at(2023, 5, 1, 0, 0);
        assert!(next_scheduled_test(&s, &TestCaps::default(), &mut next, now, &Utc).is_some());
    }

    #[test]
    fn scsi_and_refused_types_are_skipped() {
        let s = Schedule::new("C/.*").unwrap();
        let mut next = T0 - HOUR;
        assert!(next_scheduled_test(&s, &TestCaps::scsi(), &mut next, T0, &Utc).is_none());

        let mut caps = TestCaps::default();
        for t in [TestType::Long, TestType::Short, TestType::Conveyance, TestType::Offline] {
            caps.refuse(t);
        }
        assert!(!caps.any());
        let mut next = T0 - HOUR;
        assert!(next_scheduled_test(&Schedule::new("n/.*").unwrap(), &caps, &mut next, T0, &Utc).is_none());
    }

    #[test]
    fn look_ahead_daily_short() {
        let s = Schedule::new(r"S/.*/.*/.*/02").unwrap();
        let now = at(2023, 11, 14, 12, 0);
        let la = look_ahead(&s, &TestCaps::default(), now, now, 1800, &Utc);
        assert_eq!(la.totals[TestType::Short.index()], 90);
        assert_eq!(la.planned.len(), 5);
        assert_eq!(la.planned[0].time, at(2023, 11, 15, 2, 0));
        assert_eq!(la.planned[4].number, 5);

        let lines = la.lines("sda", false, &Utc);
        assert_eq!(lines[0], "Device: sda, will do test 1 of type S at Wed Nov 15 02:00:00 2023 UTC");
        assert!(lines.contains(&"Device: sda, will do  90 tests of type S".to_string()));
        assert!(lines.contains(&"Device: sda, will do   0 tests of type O".to_string()));
        assert!(!lines.iter().any(|l| l.ends_with("type n")));
    }

    #[test]
    fn letters_round_trip() {
        for t in TestType::PRIORITY {
            assert_eq!(TestType::from_letter(t.letter()), Some(t));
        }
        assert_eq!(TestType::from_letter('x'), None);
        assert_eq!(TestType::SelectiveCont.selective_mode(), Some(SelectiveMode::Cont));
    }
}
