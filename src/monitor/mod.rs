//! Per-device monitoring: registration, one check pass, persisted state.

pub mod attributes;
pub mod mail;
pub mod state;
pub mod temperature;

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::TimeZone;
use tracing::{debug, warn};

use crate::alerts::{Event, Severity};
use crate::attrdefs::{temperature as attr_temperature, AttrDefs};
use crate::classifier::{attr_state, health_verdict, ReturnStatus};
use crate::codec::selftest::TestSpan;
use crate::codec::values::{SmartValues, Thresholds, NUM_ATTRIBUTES};
use crate::codec::{ChecksumPolicy, FirmwareBug, FirmwareBugs};
use crate::error::{Result, SmartError};
use crate::logs::errors::ata_error_count;
use crate::logs::selftest::decode_self_test_log;
use crate::logs::{IndexBase, LogIndexing};
use crate::scheduler::{format_time, look_ahead, next_scheduled_test, LookAhead, Schedule, TestCaps, TestType};
use crate::selftest::launch_test;
use crate::transport::{Transport, LOG_EXT_ERROR, LOG_SELF_TEST, LOG_SUMMARY_ERROR};
use crate::util::human::fmt_capacity;
use crate::vendordb::VendorDb;

use attributes::{check_attribute, check_pending, AttrMonitor, AttrReport, AttrWatch, PendingReport, PendingSetting};
use mail::{MailFrequency, MailType};
use state::{device_file_name, PersistentState};
use temperature::{TempLimits, TempReport, TempTracker};

/// What to monitor on one device. Registration switches off whatever the
/// device cannot deliver.
#[derive(Debug, Clone)]
pub struct Directives {
    pub name:             String,
    /// SMART RETURN STATUS.
    pub smart_check:      bool,
    /// Usage attributes failing now.
    pub usage_failed:     bool,
    /// Normalized changes of pre-failure attributes.
    pub prefail:          bool,
    /// Normalized changes of usage attributes.
    pub usage:            bool,
    pub error_log:        bool,
    pub xerror_log:       bool,
    pub self_test_log:    bool,
    pub offline_status:   bool,
    pub self_test_status: bool,
    pub pending:          PendingSetting,
    pub offline_pending:  PendingSetting,
    pub temp:             TempLimits,
    pub attrs:            AttrMonitor,
    /// User-tier definitions; presets merge below them.
    pub attribute_defs:   AttrDefs,
    pub firmware_bugs:    FirmwareBugs,
    /// Skip the preset lookup.
    pub ignore_presets:   bool,
    pub checksum:         ChecksumPolicy,
    pub schedule:         Option<Schedule>,
    /// A notification sink is configured.
    pub mail:             bool,
    /// `None` picks once/daily depending on whether state is persisted.
    pub mail_frequency:   Option<MailFrequency>,
    pub mail_test:        bool,
    /// Seconds between check passes.
    pub check_interval:   i64,
    pub indexing:         LogIndexing,
    pub attrlog:          bool,
}

impl Directives {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name:             name.into(),
            smart_check:      true,
            usage_failed:     true,
            prefail:          true,
            usage:            true,
            error_log:        true,
            xerror_log:       false,
            self_test_log:    true,
            offline_status:   false,
            self_test_status: false,
            pending:          PendingSetting::Auto,
            offline_pending:  PendingSetting::Auto,
            temp:             TempLimits::default(),
            attrs:            AttrMonitor::default(),
            attribute_defs:   AttrDefs::default(),
            firmware_bugs:    FirmwareBugs::default(),
            ignore_presets:   false,
            checksum:         ChecksumPolicy::Warn,
            schedule:         None,
            mail:             false,
            mail_frequency:   None,
            mail_test:        false,
            check_interval:   1800,
            indexing:         LogIndexing::default(),
            attrlog:          false,
        }
    }

    fn watches_attributes(&self) -> bool {
        self.usage_failed || self.prefail || self.usage
    }
}

/// Identity facts gathered at registration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceInfo {
    pub model:       String,
    pub serial:      String,
    pub firmware:    String,
    pub family:      Option<String>,
    pub num_sectors: u64,
    pub capacity:    u64,
    pub is_ssd:      Option<bool>,
}

/// One monitored device between passes.
#[derive(Debug)]
pub struct DeviceMonitor {
    d:               Directives,
    info:            DeviceInfo,
    defs:            AttrDefs,
    bugs:            FirmwareBugs,
    pending:         Option<(u8, bool)>,
    offline_pending: Option<(u8, bool)>,
    thresholds:      Thresholds,
    prev_values:     SmartValues,
    xerror_sectors:  u16,
    caps:            TestCaps,
    temp:            TempTracker,
    mail_frequency:  MailFrequency,
    state:           PersistentState,
    saved:           Option<PersistentState>,
    state_path:      Option<PathBuf>,
    attrlog_path:    Option<PathBuf>,
    first_pass:      bool,
    offline_started: bool,
    selftest_started: bool,
}

fn note(out: &mut Vec<Event>, severity: Severity, device: &str, message: String) {
    let ev = Event::new(severity, device, message);
    ev.trace();
    out.push(ev);
}

fn wwn_text(w: u64) -> String {
    format!("WWN:{:x}-{:06x}-{:09x}, ", w >> 60, (w >> 36) & 0xff_ffff, w & 0xf_ffff_ffff)
}

/// (error count, hour of the newest error) from the self-test log.
fn read_self_test_errors(dev: &mut dyn Transport, bugs: FirmwareBugs, policy: ChecksumPolicy, base: IndexBase) -> Result<(u8, u16)> {
    let log = dev.self_test_log(bugs, policy)?;
    let report = decode_self_test_log(&log, base)?;
    Ok((report.errors.min(u8::MAX as u32) as u8, report.last_error_hour.unwrap_or(0)))
}

fn read_error_count(dev: &mut dyn Transport, ext_sectors: Option<u16>, bugs: FirmwareBugs, policy: ChecksumPolicy) -> Result<u32> {
    match ext_sectors {
        None => Ok(ata_error_count(Some(&dev.error_log(bugs, policy)?), None)),
        Some(n) => Ok(ata_error_count(None, Some(&dev.ext_error_log(n, bugs, policy)?))),
    }
}

/// `new` is a later power-on hour than `old`, allowing for the 16-bit
/// counter wrapping.
fn hour_is_newer(old: u16, new: u16) -> bool {
    new != old && new.wrapping_sub(old) < 0x8000
}

/// Log line for the offline data collection status byte.
pub fn offline_status_message(device: &str, status: u8) -> (Severity, String) {
    let (severity, text) = match status & 0x7f {
        0x00 => (Severity::Info, "was never started"),
        0x02 => (Severity::Info, "was completed without error"),
        0x03 => (Severity::Info, "is in progress"),
        0x04 => (Severity::Info, "was suspended by an interrupting command from host"),
        0x05 => (Severity::Info, "was aborted by an interrupting command from host"),
        0x06 => (Severity::Critical, "was aborted by the device with a fatal error"),
        _ => {
            return (Severity::Info, format!("Device: {}, unknown offline data collection status 0x{:02x}", device, status));
        }
    };
    let auto = if status & 0x80 != 0 { " (auto:on)" } else { "" };
    (severity, format!("Device: {}, offline data collection {}{}", device, text, auto))
}

/// Log line for the self-test execution status byte.
pub fn self_test_status_message(device: &str, status: u8) -> (Severity, String) {
    let text = match status >> 4 {
        0x0 => "completed without error",
        0x1 => "was aborted by the host",
        0x2 => "was interrupted by the host with a reset",
        0x3 => "could not complete due to a fatal or unknown error",
        0x4 => "completed with error (unknown test element)",
        0x5 => "completed with error (electrical test element)",
        0x6 => "completed with error (servo/seek test element)",
        0x7 => "completed with error (read test element)",
        0x8 => "completed with error (handling damage?)",
        0xf => {
            return (
                Severity::Info,
                format!("Device: {}, self-test in progress, {}0% remaining", device, status & 0x0f),
            );
        }
        _ => {
            return (Severity::Info, format!("Device: {}, unknown self-test status 0x{:02x}", device, status));
        }
    };
    let severity = if status >> 4 >= 0x3 { Severity::Critical } else { Severity::Info };
    (severity, format!("Device: {}, previous self-test {}", device, text))
}

impl DeviceMonitor {
    /// Probe the device, drop directives it cannot support and load its
    /// persisted state. Fails when the device cannot be identified or
    /// lacks SMART.
    pub fn register(
        mut d: Directives,
        dev: &mut dyn Transport,
        db: &VendorDb,
        state_dir: Option<&Path>,
        now: i64,
    ) -> Result<(Self, Vec<Event>)> {
        let name = d.name.clone();
        let mut out = Vec::new();
        let policy = d.checksum;

        let id = dev.identify()?;
        let mut strings = id.strings(!d.firmware_bugs.is_set(FirmwareBug::NoSwap));

        let mut defs = d.attribute_defs.clone();
        let mut bugs = d.firmware_bugs;
        let preset = if d.ignore_presets { None } else { db.lookup(&strings.model, &strings.firmware) };
        if let Some(p) = preset {
            p.apply(&mut defs, &mut bugs)?;
            if bugs.is_set(FirmwareBug::NoSwap) && !d.firmware_bugs.is_set(FirmwareBug::NoSwap) {
                strings = id.strings(false);
            }
        }

        let info = DeviceInfo {
            model:       strings.model,
            serial:      strings.serial,
            firmware:    strings.firmware,
            family:      preset.map(|p| p.family.clone()),
            num_sectors: id.sector_count(),
            capacity:    id.capacity_bytes(),
            is_ssd:      id.is_ssd(),
        };
        note(&mut out, Severity::Info, &name, format!(
            "Device: {}, {}, S/N:{}, {}FW:{}, {}",
            name,
            info.model,
            info.serial,
            id.wwn().map(wwn_text).unwrap_or_default(),
            info.firmware,
            fmt_capacity(info.capacity),
        ));

        match preset {
            _ if d.ignore_presets => {
                note(&mut out, Severity::Info, &name, format!("Device: {}, smartd database not searched (Directive: -P ignore).", name))
            }
            None => note(&mut out, Severity::Info, &name, format!("Device: {}, not found in smartd database.", name)),
            Some(p) => {
                note(&mut out, Severity::Info, &name, format!("Device: {}, found in smartd database: {}", name, p.family));
                if let Some(w) = &p.warning {
                    note(&mut out, Severity::Critical, &name, format!("Device: {}, WARNING: {}", name, w));
                }
            }
        }

        let pending = d.pending.resolve(false, &defs);
        let offline_pending = d.offline_pending.resolve(true, &defs);

        match id.smart_supported() {
            Some(true) => {}
            Some(false) => return Err(SmartError::NotSupported(format!("{}: SMART", name))),
            None => note(&mut out, Severity::Info, &name, format!(
                "Device: {}, IDENTIFY DEVICE words 82-83 don't specify if SMART capable.", name
            )),
        }

        if d.smart_check && dev.return_status().is_err() {
            note(&mut out, Severity::Info, &name, format!("Device: {}, not capable of SMART Health Status check", name));
            d.smart_check = false;
        }

        let mut thresholds = Thresholds::default();
        let values = match dev.smart_values(policy) {
            Ok(v) => Some(v),
            Err(e) => {
                debug!("{}: {}", name, e);
                note(&mut out, Severity::Info, &name, format!("Device: {}, Read SMART Values failed", name));
                d.usage_failed = false;
                d.prefail = false;
                d.usage = false;
                d.temp = TempLimits::default();
                None
            }
        };
        if values.is_some() {
            match dev.thresholds(policy) {
                Ok(t) => thresholds = t,
                Err(_) => {
                    let hint = if d.usage_failed { ", ignoring -f Directive" } else { "" };
                    note(&mut out, Severity::Info, &name, format!("Device: {}, Read SMART Thresholds failed{}", name, hint));
                    d.usage_failed = false;
                }
            }
        }

        let check_pending_id = |setting: Option<(u8, bool)>, label: &str, out: &mut Vec<Event>| -> Option<(u8, bool)> {
            let (pid, inc) = setting?;
            let Some(v) = values.as_ref() else { return None };
            let Some((_, a)) = v.find_attribute(pid) else {
                note(out, Severity::Info, &name, format!("Device: {}, can't monitor {} count - no Attribute {}", name, label, pid));
                return None;
            };
            let raw = crate::attrdefs::raw_value(a, &defs);
            let limit = if info.num_sectors > 0 { info.num_sectors } else { 0xffff_ffff };
            if raw >= limit {
                note(out, Severity::Info, &name, format!(
                    "Device: {}, ignoring {} count - bogus Attribute {} value {} (0x{:x})",
                    name, label, pid, raw, raw
                ));
                return None;
            }
            Some((pid, inc))
        };
        let pending = check_pending_id(pending, "Current_Pending_Sector", &mut out);
        let offline_pending = check_pending_id(offline_pending, "Offline_Uncorrectable", &mut out);

        if d.temp.enabled() && values.as_ref().and_then(|v| attr_temperature(v, &defs)).is_none() {
            note(&mut out, Severity::Info, &name, format!(
                "Device: {}, can't monitor Temperature, ignoring -W {},{},{}",
                name, d.temp.diff, d.temp.info, d.temp.crit
            ));
            d.temp = TempLimits::default();
        }

        let nologdir = bugs.is_set(FirmwareBug::NoLogDir);
        let smart_logdir = if !nologdir && (d.self_test_log || d.error_log) {
            dev.log_directory(false).ok()
        } else {
            None
        };
        let gp_logdir = if !nologdir && d.xerror_log && id.gp_logging_supported() {
            dev.log_directory(true).ok()
        } else {
            None
        };

        let mut state = PersistentState::default();

        if d.self_test_log {
            let capable = smart_logdir.as_ref().map_or(false, |l| l.sectors(LOG_SELF_TEST) > 0)
                || values.as_ref().map_or(false, |v| v.self_test_supported());
            let read = if capable {
                read_self_test_errors(dev, bugs, policy, d.indexing.self_test_log).ok()
            } else {
                None
            };
            match read {
                Some((errors, hour)) => {
                    state.self_test_errors = errors;
                    state.self_test_last_err_hour = hour;
                }
                None => {
                    note(&mut out, Severity::Info, &name, format!("Device: {}, no SMART Self-test Log, ignoring -l selftest", name));
                    d.self_test_log = false;
                }
            }
        }

        let mut legacy_count = None;
        if d.error_log {
            let capable = smart_logdir.as_ref().map_or(false, |l| l.sectors(LOG_SUMMARY_ERROR) > 0)
                || values.as_ref().map_or(false, |v| v.error_logging_supported());
            legacy_count = if capable { read_error_count(dev, None, bugs, policy).ok() } else { None };
            if legacy_count.is_none() {
                note(&mut out, Severity::Info, &name, format!("Device: {}, no SMART Error Log, ignoring -l error", name));
                d.error_log = false;
            }
        }

        let mut xerror_sectors = 0;
        let mut ext_count = None;
        if d.xerror_log {
            xerror_sectors = match &gp_logdir {
                Some(l) => l.sectors(LOG_EXT_ERROR),
                None if nologdir => 1,
                None => 0,
            };
            ext_count = if xerror_sectors > 0 {
                read_error_count(dev, Some(xerror_sectors), bugs, policy).ok()
            } else {
                None
            };
            if ext_count.is_none() {
                note(&mut out, Severity::Info, &name, format!(
                    "Device: {}, no Extended Comprehensive SMART Error Log, ignoring -l xerror", name
                ));
                d.xerror_log = false;
            }
        }
        if let (Some(a), Some(b)) = (legacy_count, ext_count) {
            if a != b {
                note(&mut out, Severity::Info, &name, format!(
                    "Device: {}, SMART Error Logs report different error counts: {} != {}", name, a, b
                ));
            }
        }
        if let Some(n) = legacy_count.max(ext_count) {
            state.ata_error_count = n;
        }

        let offline_capable = values.as_ref().map_or(false, |v| v.offline_capability != 0);
        if d.offline_status && !offline_capable {
            note(&mut out, Severity::Info, &name, format!(
                "Device: {}, no SMART Offline Data Collection capability, ignoring -l offlinests", name
            ));
            d.offline_status = false;
        }
        if d.self_test_status && !offline_capable {
            note(&mut out, Severity::Info, &name, format!(
                "Device: {}, no SMART Self-test capability, ignoring -l selfteststs", name
            ));
            d.self_test_status = false;
        }

        let mut prev_values = values.clone().unwrap_or_default();
        let mut state_path = None;
        let mut attrlog_path = None;
        let mut saved = None;
        if let Some(dir) = state_dir {
            let path = dir.join(device_file_name(&info.model, &info.serial, "state"));
            match PersistentState::load(&path) {
                Ok(Some(persisted)) => {
                    note(&mut out, Severity::Info, &name, format!("Device: {}, state read from {}", name, path.display()));
                    state = persisted;
                    state.restore_attributes(&mut prev_values);
                    saved = Some(state.clone());
                }
                Ok(None) => {}
                Err(e) => note(&mut out, Severity::Warning, &name, format!("Device: {}, {}", name, e)),
            }
            state_path = Some(path);
            if d.attrlog {
                attrlog_path = Some(dir.join(device_file_name(&info.model, &info.serial, "csv")));
            }
        }

        let mail_frequency = d.mail_frequency.unwrap_or(if state_path.is_some() {
            MailFrequency::Daily
        } else {
            MailFrequency::Once
        });
        if d.schedule.is_some() && state.scheduled_next_check == 0 {
            state.scheduled_next_check = now;
        }

        let mail_test = d.mail_test;
        let mut m = Self {
            d,
            info,
            defs,
            bugs,
            pending,
            offline_pending,
            thresholds,
            prev_values,
            xerror_sectors,
            caps: TestCaps::default(),
            temp: TempTracker::default(),
            mail_frequency,
            state,
            saved,
            state_path,
            attrlog_path,
            first_pass: true,
            offline_started: false,
            selftest_started: false,
        };
        if mail_test {
            let msg = format!("TEST EMAIL from smartd for device: {}", name);
            m.emit(&mut out, Severity::Info, msg, Some(MailType::EmailTest), now);
        }
        Ok((m, out))
    }

    pub fn name(&self) -> &str {
        &self.d.name
    }

    pub fn info(&self) -> &DeviceInfo {
        &self.info
    }

    /// Directives as narrowed by registration.
    pub fn directives(&self) -> &Directives {
        &self.d
    }

    pub fn state(&self) -> &PersistentState {
        &self.state
    }

    pub fn state_path(&self) -> Option<&Path> {
        self.state_path.as_deref()
    }

    pub fn mail_frequency(&self) -> MailFrequency {
        self.mail_frequency
    }

    /// The state differs from what was last written.
    pub fn dirty(&self) -> bool {
        self.state_path.is_some() && self.saved.as_ref() != Some(&self.state)
    }

    fn emit(&mut self, out: &mut Vec<Event>, severity: Severity, message: String, mail: Option<MailType>, now: i64) {
        let mut ev = Event::new(severity, &self.d.name, message);
        ev.trace();
        if let (Some(kind), true) = (mail, self.d.mail) {
            ev.mail = mail::throttle(&mut self.state.mail[kind.index()], kind, self.mail_frequency, &ev.message, now);
        }
        out.push(ev);
    }

    fn reset_mail(&mut self, out: &mut Vec<Event>, kind: MailType, reason: &str) {
        if let Some(msg) = mail::reset(&mut self.state.mail[kind.index()], &self.d.name, reason) {
            note(out, Severity::Info, &self.d.name, msg);
        }
    }

    /// The device could not be opened for this pass.
    pub fn open_failed(&mut self, reason: &str, now: i64) -> Vec<Event> {
        let mut out = Vec::new();
        let msg = format!("Device: {}, open() failed: {}", self.d.name, reason);
        self.emit(&mut out, Severity::Critical, msg, Some(MailType::FailedOpenDevice), now);
        self.persist(&mut out);
        out
    }

    fn needs_values(&self) -> bool {
        self.d.watches_attributes()
            || self.pending.is_some()
            || self.offline_pending.is_some()
            || self.d.temp.enabled()
            || self.d.offline_status
            || self.d.self_test_status
    }

    /// Run one monitoring pass. Scheduled tests are only started when
    /// `allow_selftests` is set.
    pub fn check<Tz: TimeZone>(&mut self, dev: &mut dyn Transport, now: i64, tz: &Tz, allow_selftests: bool) -> Vec<Event>
    where
        Tz::Offset: fmt::Display,
    {
        let mut out = Vec::new();
        let name = self.d.name.clone();
        let policy = self.d.checksum;
        self.reset_mail(&mut out, MailType::FailedOpenDevice, "open device worked again");

        let values = if self.needs_values() { Some(dev.smart_values(policy)) } else { None };

        if self.d.smart_check {
            match dev.return_status() {
                Ok(ReturnStatus::Passed) => {}
                Ok(ReturnStatus::Failed) => {
                    let msg = format!("Device: {}, FAILED SMART self-check. BACK UP DATA NOW!", name);
                    self.emit(&mut out, Severity::Critical, msg, Some(MailType::Health), now);
                }
                Ok(ReturnStatus::Inconclusive) => {
                    let fallback = match &values {
                        Some(Ok(v)) => Some(v.clone()),
                        _ => dev.smart_values(policy).ok(),
                    };
                    match health_verdict(Some(ReturnStatus::Inconclusive), fallback.as_ref(), Some(&self.thresholds), &self.defs) {
                        Some(v) if !v.passed => {
                            let msg = format!("Device: {}, FAILED SMART self-check (from attributes). BACK UP DATA NOW!", name);
                            self.emit(&mut out, Severity::Critical, msg, Some(MailType::Health), now);
                        }
                        Some(_) => debug!("{}: health status inconclusive, attributes pass", name),
                        None => {
                            let msg = format!("Device: {}, not capable of SMART self-check", name);
                            self.emit(&mut out, Severity::Info, msg, Some(MailType::FailedHealthCheck), now);
                        }
                    }
                }
                Err(e) => {
                    debug!("{}: {}", name, e);
                    let msg = format!("Device: {}, not capable of SMART self-check", name);
                    self.emit(&mut out, Severity::Info, msg, Some(MailType::FailedHealthCheck), now);
                }
            }
        }

        match values {
            None => {}
            Some(Err(e)) => {
                debug!("{}: {}", name, e);
                let msg = format!("Device: {}, failed to read SMART Attribute Data", name);
                self.emit(&mut out, Severity::Critical, msg, Some(MailType::FailedReadSmartData), now);
            }
            Some(Ok(cur)) => {
                self.reset_mail(&mut out, MailType::FailedReadSmartData, "read SMART Attribute Data worked again");
                self.check_values(&cur, &mut out, now);
                self.prev_values = cur;
            }
        }
        self.offline_started = false;
        self.selftest_started = false;

        if self.d.self_test_log {
            let read = read_self_test_errors(dev, self.bugs, policy, self.d.indexing.self_test_log);
            self.check_self_test_log(read, &mut out, now);
        }

        if self.d.error_log || self.d.xerror_log {
            let legacy = if self.d.error_log { read_error_count(dev, None, self.bugs, policy).ok() } else { None };
            let ext = if self.d.xerror_log {
                read_error_count(dev, Some(self.xerror_sectors), self.bugs, policy).ok()
            } else {
                None
            };
            match legacy.max(ext) {
                None => {
                    let msg = format!("Device: {}, Read SMART Error Log Failed", name);
                    self.emit(&mut out, Severity::Warning, msg, Some(MailType::FailedReadSmartErrorLog), now);
                }
                Some(count) => {
                    self.reset_mail(&mut out, MailType::FailedReadSmartErrorLog, "Read SMART Error Log worked again");
                    let old = self.state.ata_error_count;
                    if count > old {
                        let msg = format!("Device: {}, ATA error count increased from {} to {}", name, old, count);
                        self.emit(&mut out, Severity::Critical, msg, Some(MailType::ErrorCount), now);
                    }
                    self.state.ata_error_count = count;
                }
            }
        }

        if allow_selftests {
            self.run_schedule(dev, now, tz, &mut out);
        }

        self.state.snapshot_attributes(&self.prev_values);
        if let Some(path) = &self.attrlog_path {
            if let Err(e) = self.state.append_attrlog(path, now) {
                warn!("{}: {}", name, e);
            }
        }
        self.persist(&mut out);
        self.first_pass = false;
        out
    }

    fn check_values(&mut self, cur: &SmartValues, out: &mut Vec<Event>, now: i64) {
        let name = self.d.name.clone();

        for (setting, offline, kind) in [
            (self.pending, false, MailType::CurrentPendingSector),
            (self.offline_pending, true, MailType::OfflineUncorrectableSector),
        ] {
            let Some((id, increase_only)) = setting else { continue };
            let report = check_pending(&name, cur, &self.prev_values, id, increase_only, offline, self.info.num_sectors, &self.defs);
            match report {
                None => {}
                Some(PendingReport::Cleared(reason)) => self.reset_mail(out, kind, &reason),
                Some(PendingReport::Alert(text)) => self.emit(out, Severity::Critical, text, Some(kind), now),
                Some(PendingReport::Bogus(text)) => note(out, Severity::Info, &name, text),
            }
        }

        if self.d.temp.enabled() {
            let current = attr_temperature(cur, &self.defs);
            if current.map_or(true, |t| t == 0 || t == 255) {
                note(out, Severity::Info, &name, format!("Device: {}, failed to read Temperature", name));
            }
            let limits = self.d.temp;
            let (reports, _) = self.temp.update(&name, current, &limits, &mut self.state, now);
            for r in reports {
                match r {
                    TempReport::Initial { text } | TempReport::Changed { text } | TempReport::Info { text } => {
                        note(out, Severity::Info, &name, text)
                    }
                    TempReport::Critical { text } => self.emit(out, Severity::Critical, text, Some(MailType::Temperature), now),
                    TempReport::Cleared { limit } => {
                        let reason = format!("Temperature {} Celsius dropped below {} Celsius", current.unwrap_or(0), limit);
                        self.reset_mail(out, MailType::Temperature, &reason);
                    }
                }
            }
        }

        if self.d.watches_attributes() {
            let watch = AttrWatch { usage_failed: self.d.usage_failed, prefail: self.d.prefail, usage: self.d.usage };
            let reports: Vec<AttrReport> = (0..NUM_ATTRIBUTES)
                .flat_map(|i| {
                    let a = &cur.attributes[i];
                    let (st, _) = attr_state(a, i, &self.thresholds, &self.defs);
                    check_attribute(&name, a, &self.prev_values.attributes[i], st, watch, &self.d.attrs, &self.defs, self.info.is_ssd)
                })
                .collect();
            for r in reports {
                match r {
                    AttrReport::FailedUsage(text) => self.emit(out, Severity::Critical, text, Some(MailType::Usage), now),
                    AttrReport::Changed { text, critical: true } => self.emit(out, Severity::Critical, text, Some(MailType::Usage), now),
                    AttrReport::Changed { text, critical: false } => note(out, Severity::Info, &name, text),
                    AttrReport::IdMismatch(text) => note(out, Severity::Info, &name, text),
                }
            }
        }

        let prev = &self.prev_values;
        if self.d.offline_status
            && (cur.offline_status != prev.offline_status
                || self.offline_started
                || (self.first_pass && cur.offline_status & 0x7d != 0))
        {
            let (severity, text) = offline_status_message(&name, cur.offline_status);
            note(out, severity, &name, text);
        }
        let prev = &self.prev_values;
        if self.d.self_test_status
            && (cur.self_test_exec_status != prev.self_test_exec_status
                || self.selftest_started
                || (self.first_pass && cur.self_test_exec_status & 0xf0 != 0))
        {
            let (severity, text) = self_test_status_message(&name, cur.self_test_exec_status);
            note(out, severity, &name, text);
        }
    }

    fn check_self_test_log(&mut self, read: Result<(u8, u16)>, out: &mut Vec<Event>, now: i64) {
        let name = self.d.name.clone();
        let (errors, hour) = match read {
            Ok(r) => r,
            Err(e) => {
                debug!("{}: {}", name, e);
                let msg = format!("Device: {}, Read SMART Self-Test Log Failed", name);
                self.emit(out, Severity::Warning, msg, Some(MailType::FailedReadSmartSelfTestLog), now);
                return;
            }
        };
        self.reset_mail(out, MailType::FailedReadSmartSelfTestLog, "Read SMART Self-Test Log worked again");

        let (old, old_hour) = (self.state.self_test_errors, self.state.self_test_last_err_hour);
        if old < errors {
            let msg = format!("Device: {}, Self-Test Log error count increased from {} to {}", name, old, errors);
            self.emit(out, Severity::Critical, msg, Some(MailType::SelfTest), now);
        } else if errors > 0 && hour_is_newer(old_hour, hour) {
            let msg = format!("Device: {}, new Self-Test Log error at hour timestamp {}", name, hour);
            self.emit(out, Severity::Critical, msg, Some(MailType::SelfTest), now);
        } else if old > errors {
            note(out, Severity::Info, &name, format!(
                "Device: {}, Self-Test Log error count decreased from {} to {}", name, old, errors
            ));
            if errors == 0 {
                self.reset_mail(out, MailType::SelfTest, "Self-Test Log does no longer report errors");
            }
        }
        self.state.self_test_errors = errors;
        self.state.self_test_last_err_hour = hour;
    }

    fn run_schedule<Tz: TimeZone>(&mut self, dev: &mut dyn Transport, now: i64, tz: &Tz, out: &mut Vec<Event>)
    where
        Tz::Offset: fmt::Display,
    {
        let Some(schedule) = self.d.schedule.as_ref() else { return };
        let due = next_scheduled_test(schedule, &self.caps, &mut self.state.scheduled_next_check, now, tz);
        let Some(due) = due else { return };
        let name = self.d.name.clone();
        if due.catch_up {
            note(out, Severity::Info, &name, format!(
                "Device: {}, old test of type {} not run at {}, starting now.",
                name,
                due.test.letter(),
                format_time(due.time, tz)
            ));
        }
        let prev_span = TestSpan { start: self.state.selective_last_start, end: self.state.selective_last_end };
        let launch = launch_test(
            dev,
            &name,
            due.test,
            &mut self.caps,
            self.bugs,
            prev_span,
            self.info.num_sectors,
            self.d.checksum,
        );
        for (severity, text) in launch.reports {
            note(out, severity, &name, text);
        }
        if let Some(span) = launch.span {
            self.state.selective_last_start = span.start;
            self.state.selective_last_end = span.end;
        }
        if launch.started {
            if due.test == TestType::Offline {
                self.offline_started = true;
            } else {
                self.selftest_started = true;
            }
        }
    }

    /// Upcoming scheduled tests, sampled every check interval.
    pub fn look_ahead<Tz: TimeZone>(&self, now: i64, tz: &Tz) -> Option<LookAhead> {
        let schedule = self.d.schedule.as_ref()?;
        let next = if self.state.scheduled_next_check == 0 { now } else { self.state.scheduled_next_check };
        Some(look_ahead(schedule, &self.caps, next, now, self.d.check_interval, tz))
    }

    fn persist(&mut self, out: &mut Vec<Event>) {
        if self.dirty() {
            if let Err(e) = self.flush() {
                note(out, Severity::Warning, &self.d.name, format!("Device: {}, {}", self.d.name, e));
            }
        }
    }

    /// Write the state file now, whether or not it changed.
    pub fn flush(&mut self) -> Result<()> {
        let Some(path) = &self.state_path else { return Ok(()) };
        self.state.save(path)?;
        self.saved = Some(self.state.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::identify::tests::sample_words;
    use crate::codec::identify::Identify;
    use crate::codec::selftest::{SelfTestEntry, SelfTestLog};
    use crate::codec::errorlog::ErrorLog;
    use crate::codec::values::tests::attr;
    use crate::codec::values::Threshold;
    use crate::transport::{ImageTransport, Page};
    use chrono::Utc;

    const T0: i64 = 1_700_000_000;
    const PASSED: [u8; 2] = [0x4f, 0xc2];
    const FAILED: [u8; 2] = [0xf4, 0x2c];

    fn values() -> SmartValues {
        let mut v = SmartValues::default();
        v.attributes[0] = attr(1, 0x000f, 200, 200, 0);
        v.attributes[1] = attr(5, 0x0033, 200, 200, 0);
        v.attributes[2] = attr(9, 0x0032, 90, 90, 8000);
        v.attributes[3] = attr(194, 0x0022, 115, 100, 35);
        v.attributes[4] = attr(197, 0x0032, 200, 200, 0);
        v.attributes[5] = attr(198, 0x0030, 200, 200, 0);
        v.offline_capability = 0x5b;
        v.errorlog_capability = 0x01;
        v.short_test_minutes = 2;
        v
    }

    fn thresholds() -> Thresholds {
        let mut t = Thresholds::default();
        t.entries[0] = Threshold { id: 1, threshold: 51 };
        t.entries[1] = Threshold { id: 5, threshold: 140 };
        t
    }

    fn self_test_log(failures: &[u16]) -> SelfTestLog {
        let mut log = SelfTestLog::default();
        for (i, hour) in failures.iter().enumerate() {
            log.entries[i] = SelfTestEntry { test_type: 1, status: 0x70, timestamp: *hour, ..Default::default() };
        }
        log.most_recent = failures.len() as u8;
        log
    }

    fn error_log(count: u16) -> ErrorLog {
        ErrorLog { pointer: if count > 0 { 1 } else { 0 }, count, ..Default::default() }
    }

    fn device() -> ImageTransport {
        let mut t = ImageTransport::new("sda")
            .with_page(Page::Identify, Identify::from_words(sample_words()).to_bytes())
            .with_page(Page::ReturnStatus, PASSED.to_vec())
            .with_page(Page::Log { gp: false, address: LOG_SELF_TEST }, self_test_log(&[]).to_page())
            .with_page(Page::Log { gp: false, address: LOG_SUMMARY_ERROR }, error_log(0).to_page());
        t.set_values(&values());
        t.set_thresholds(&thresholds());
        t
    }

    fn register(dev: &mut ImageTransport, d: Directives) -> (DeviceMonitor, Vec<Event>) {
        DeviceMonitor::register(d, dev, &VendorDb::default(), None, T0).unwrap()
    }

    fn messages(evs: &[Event]) -> Vec<&str> {
        evs.iter().map(|e| e.message.as_str()).collect()
    }

    fn has(evs: &[Event], needle: &str) -> bool {
        evs.iter().any(|e| e.message.contains(needle))
    }

    #[test]
    fn registration_reports_identity() {
        let mut dev = device();
        let (m, evs) = register(&mut dev, Directives::new("sda"));
        assert_eq!(
            evs[0].message,
            "Device: sda, WDC WD10EFRX-68FYTN0, S/N:WD-WCC4N1234567, WWN:5-0014ee-65af21234, FW:82.00A82, 1.00 TB"
        );
        assert!(has(&evs, "not found in smartd database."));
        assert_eq!(m.info().num_sectors, 1_953_525_168);
        assert!(m.directives().self_test_log);
        assert!(m.directives().error_log);
        assert_eq!(m.mail_frequency(), MailFrequency::Once);
    }

    #[test]
    fn noswap_quirk_keeps_identify_byte_order() {
        let mut dev = device();
        let mut d = Directives::new("sda");
        d.firmware_bugs = FirmwareBugs::parse_all(&["noswap"]).unwrap();
        let (m, _) = register(&mut dev, d);
        assert_eq!(m.info().firmware, "280.A028");
        assert_eq!(m.info().model, "DW CDW01FEXR6-F8TY0N");

        let preset = crate::config::PresetConfig {
            model: "WDC WD10EFRX-68FYTN0".into(),
            family: "Unswapped strings".into(),
            firmware_bugs: vec!["noswap".into()],
            ..Default::default()
        };
        let db = VendorDb::from_config(&[preset]).unwrap();
        let (m, evs) = DeviceMonitor::register(Directives::new("sda"), &mut dev, &db, None, T0).unwrap();
        assert!(has(&evs, "found in smartd database: Unswapped strings"));
        assert_eq!(m.info().firmware, "280.A028");
        assert_eq!(m.info().family.as_deref(), Some("Unswapped strings"));
    }

    #[test]
    fn registration_drops_unsupported_directives() {
        let mut dev = device();
        let mut v = values();
        v.offline_capability = 0;
        v.errorlog_capability = 0;
        v.attributes[3] = attr(0, 0, 0, 0, 0);
        dev.set_values(&v);
        let mut d = Directives::new("sda");
        d.offline_status = true;
        d.temp = TempLimits { diff: 2, info: 0, crit: 0 };
        let (m, evs) = register(&mut dev, d);
        assert!(has(&evs, "no SMART Self-test Log, ignoring -l selftest"));
        assert!(has(&evs, "no SMART Error Log, ignoring -l error"));
        assert!(has(&evs, "ignoring -l offlinests"));
        assert!(has(&evs, "can't monitor Temperature, ignoring -W 2,0,0"));
        assert!(!m.directives().self_test_log);
        assert!(!m.directives().temp.enabled());
    }

    #[test]
    fn missing_pending_attribute_is_dropped() {
        let mut dev = device();
        let mut v = values();
        v.attributes[4] = attr(0, 0, 0, 0, 0);
        dev.set_values(&v);
        let (_, evs) = register(&mut dev, Directives::new("sda"));
        assert!(has(&evs, "can't monitor Current_Pending_Sector count - no Attribute 197"));
    }

    #[test]
    fn health_failure_is_critical_and_mailed_once() {
        let mut dev = device();
        let mut d = Directives::new("sda");
        d.mail = true;
        let (mut m, _) = register(&mut dev, d);
        dev.set_page(Page::ReturnStatus, FAILED.to_vec());
        let evs = m.check(&mut dev, T0 + 1800, &Utc, true);
        let ev = evs.iter().find(|e| e.message.contains("FAILED SMART self-check")).unwrap();
        assert_eq!(ev.severity, Severity::Critical);
        assert_eq!(ev.mail.as_ref().map(|n| n.kind), Some(MailType::Health));
        let evs = m.check(&mut dev, T0 + 3600, &Utc, true);
        let ev = evs.iter().find(|e| e.message.contains("FAILED SMART self-check")).unwrap();
        assert!(ev.mail.is_none());
    }

    #[test]
    fn inconclusive_status_falls_back_to_attributes() {
        let mut dev = device();
        let (mut m, _) = register(&mut dev, Directives::new("sda"));
        dev.set_page(Page::ReturnStatus, vec![0, 0]);
        let evs = m.check(&mut dev, T0 + 1800, &Utc, true);
        assert!(!has(&evs, "FAILED SMART self-check"));

        let mut v = values();
        v.attributes[1] = attr(5, 0x0033, 100, 100, 900);
        dev.set_values(&v);
        let evs = m.check(&mut dev, T0 + 3600, &Utc, true);
        assert!(has(&evs, "Device: sda, FAILED SMART self-check (from attributes). BACK UP DATA NOW!"));
    }

    #[test]
    fn attribute_changes_are_reported() {
        let mut dev = device();
        let (mut m, _) = register(&mut dev, Directives::new("sda"));
        let mut v = values();
        v.attributes[0] = attr(1, 0x000f, 199, 199, 0);
        dev.set_values(&v);
        let evs = m.check(&mut dev, T0 + 1800, &Utc, true);
        assert!(has(&evs, "Device: sda, SMART Prefailure Attribute: 1 Raw_Read_Error_Rate changed from 200 to 199"));
        let evs = m.check(&mut dev, T0 + 3600, &Utc, true);
        assert!(!has(&evs, "changed from"));
    }

    #[test]
    fn pending_sectors_alert_and_clear() {
        let mut dev = device();
        let mut d = Directives::new("sda");
        d.mail = true;
        let (mut m, _) = register(&mut dev, d);
        let mut v = values();
        v.attributes[4] = attr(197, 0x0032, 200, 200, 8);
        dev.set_values(&v);
        let evs = m.check(&mut dev, T0 + 1800, &Utc, true);
        let ev = evs.iter().find(|e| e.message.contains("Currently unreadable")).unwrap();
        assert_eq!(ev.message, "Device: sda, 8 Currently unreadable (pending) sectors");
        assert_eq!(ev.mail.as_ref().map(|n| n.kind), Some(MailType::CurrentPendingSector));

        dev.set_values(&values());
        let evs = m.check(&mut dev, T0 + 3600, &Utc, true);
        assert!(has(
            &evs,
            "Device: sda, No more Currently unreadable (pending) sectors, warning condition reset after 1 email"
        ));
    }

    #[test]
    fn self_test_log_error_count_increase() {
        let mut dev = device();
        let (mut m, _) = register(&mut dev, Directives::new("sda"));
        dev.set_page(Page::Log { gp: false, address: LOG_SELF_TEST }, self_test_log(&[7000]).to_page());
        let evs = m.check(&mut dev, T0 + 1800, &Utc, true);
        assert!(has(&evs, "Device: sda, Self-Test Log error count increased from 0 to 1"));
        assert_eq!(m.state().self_test_last_err_hour, 7000);

        let evs = m.check(&mut dev, T0 + 3600, &Utc, true);
        assert!(!has(&evs, "Self-Test Log"));

        dev.set_page(Page::Log { gp: false, address: LOG_SELF_TEST }, self_test_log(&[7100]).to_page());
        let evs = m.check(&mut dev, T0 + 5400, &Utc, true);
        assert!(has(&evs, "new Self-Test Log error at hour timestamp 7100"));

        dev.set_page(Page::Log { gp: false, address: LOG_SELF_TEST }, self_test_log(&[]).to_page());
        let evs = m.check(&mut dev, T0 + 7200, &Utc, true);
        assert!(has(&evs, "Self-Test Log error count decreased from 1 to 0"));
    }

    #[test]
    fn self_test_log_read_failure_mails() {
        let mut dev = device();
        let mut d = Directives::new("sda");
        d.mail = true;
        let (mut m, _) = register(&mut dev, d);
        dev.fail("SMART READ LOG");
        let evs = m.check(&mut dev, T0 + 1800, &Utc, true);
        let ev = evs.iter().find(|e| e.message.contains("Read SMART Self-Test Log Failed")).unwrap();
        assert_eq!(ev.mail.as_ref().map(|n| n.kind), Some(MailType::FailedReadSmartSelfTestLog));
        assert!(has(&evs, "Read SMART Error Log Failed"));

        dev.recover("SMART READ LOG");
        let evs = m.check(&mut dev, T0 + 3600, &Utc, true);
        assert!(has(&evs, "Read SMART Self-Test Log worked again, warning condition reset after 1 email"));
        assert!(has(&evs, "Read SMART Error Log worked again, warning condition reset after 1 email"));

        // A fresh failure after the reset is mailed again.
        dev.fail("SMART READ LOG");
        let evs = m.check(&mut dev, T0 + 5400, &Utc, true);
        let ev = evs.iter().find(|e| e.message.contains("Read SMART Error Log Failed")).unwrap();
        assert_eq!(ev.mail.as_ref().map(|n| n.kind), Some(MailType::FailedReadSmartErrorLog));
    }

    #[test]
    fn error_count_increase() {
        let mut dev = device();
        let (mut m, _) = register(&mut dev, Directives::new("sda"));
        dev.set_page(Page::Log { gp: false, address: LOG_SUMMARY_ERROR }, error_log(3).to_page());
        let evs = m.check(&mut dev, T0 + 1800, &Utc, true);
        assert!(has(&evs, "Device: sda, ATA error count increased from 0 to 3"));
        assert_eq!(m.state().ata_error_count, 3);
        let evs = m.check(&mut dev, T0 + 3600, &Utc, true);
        assert!(!has(&evs, "ATA error count"));
    }

    #[test]
    fn read_failure_of_values() {
        let mut dev = device();
        let (mut m, _) = register(&mut dev, Directives::new("sda"));
        dev.fail("SMART READ DATA");
        let evs = m.check(&mut dev, T0 + 1800, &Utc, true);
        let ev = evs.iter().find(|e| e.message.contains("failed to read SMART Attribute Data")).unwrap();
        assert_eq!(ev.severity, Severity::Critical);
    }

    #[test]
    fn scheduled_test_is_started() {
        let mut dev = device();
        let mut d = Directives::new("sda");
        d.schedule = Some(Schedule::new("S/../.././..").unwrap());
        let (mut m, _) = register(&mut dev, d);
        assert_eq!(m.state().scheduled_next_check, T0);

        // First pass of a daemon does not start tests.
        let evs = m.check(&mut dev, T0, &Utc, false);
        assert!(dev.started_tests().is_empty());
        assert!(!has(&evs, "Self-Test"));

        let evs = m.check(&mut dev, T0 + 1800, &Utc, true);
        assert_eq!(dev.started_tests(), &[crate::transport::SHORT_SELF_TEST]);
        assert!(has(&evs, "starting scheduled Short Self-Test"));
        assert!(m.state().scheduled_next_check > T0 + 1800);
    }

    #[test]
    fn status_messages() {
        assert_eq!(
            offline_status_message("sda", 0x82),
            (Severity::Info, "Device: sda, offline data collection was completed without error (auto:on)".into())
        );
        assert_eq!(offline_status_message("sda", 0x06).0, Severity::Critical);
        assert!(offline_status_message("sda", 0x41).1.contains("unknown offline data collection status 0x41"));
        assert_eq!(
            self_test_status_message("sda", 0xf3).1,
            "Device: sda, self-test in progress, 30% remaining"
        );
        assert_eq!(self_test_status_message("sda", 0x70).0, Severity::Critical);
        assert_eq!(self_test_status_message("sda", 0x10).0, Severity::Info);
    }

    #[test]
    fn self_test_status_reported_on_change() {
        let mut dev = device();
        let mut d = Directives::new("sda");
        d.self_test_status = true;
        let (mut m, _) = register(&mut dev, d);
        let evs = m.check(&mut dev, T0 + 1800, &Utc, true);
        assert!(!has(&evs, "previous self-test"));
        let mut v = values();
        v.self_test_exec_status = 0x70;
        dev.set_values(&v);
        let evs = m.check(&mut dev, T0 + 3600, &Utc, true);
        let ev = evs.iter().find(|e| e.message.contains("previous self-test")).unwrap();
        assert_eq!(ev.message, "Device: sda, previous self-test completed with error (read test element)");
    }

    #[test]
    fn state_is_persisted_and_restored() {
        let dir = tempfile::tempdir().unwrap();
        let mut dev = device();
        dev.set_page(Page::Log { gp: false, address: LOG_SUMMARY_ERROR }, error_log(2).to_page());
        let mut d = Directives::new("sda");
        d.mail = true;
        let (mut m, _) = DeviceMonitor::register(d.clone(), &mut dev, &VendorDb::default(), Some(dir.path()), T0).unwrap();
        assert_eq!(m.mail_frequency(), MailFrequency::Daily);
        assert!(m.dirty());
        m.check(&mut dev, T0 + 1800, &Utc, true);
        assert!(!m.dirty());
        let path = m.state_path().unwrap().to_path_buf();
        assert!(path.ends_with("WDC_WD10EFRX_68FYTN0-WD_WCC4N1234567.ata.state"));

        let (m2, evs) = DeviceMonitor::register(d, &mut dev, &VendorDb::default(), Some(dir.path()), T0 + 3600).unwrap();
        assert!(has(&evs, "state read from"));
        assert_eq!(m2.state().ata_error_count, 2);
        assert_eq!(m2.state().attributes[0].id, 1);
    }

    #[test]
    fn open_failure_and_recovery() {
        let mut dev = device();
        let mut d = Directives::new("sda");
        d.mail = true;
        let (mut m, _) = register(&mut dev, d);
        let evs = m.open_failed("No such device", T0 + 1800);
        assert_eq!(messages(&evs), vec!["Device: sda, open() failed: No such device"]);
        assert!(evs[0].mail.is_some());
        let evs = m.check(&mut dev, T0 + 3600, &Utc, true);
        assert!(has(&evs, "open device worked again, warning condition reset after 1 email"));
    }

    #[test]
    fn mail_test_is_sent_at_registration() {
        let mut dev = device();
        let mut d = Directives::new("sda");
        d.mail = true;
        d.mail_test = true;
        let (_, evs) = register(&mut dev, d);
        let ev = evs.iter().find(|e| e.message.contains("TEST EMAIL")).unwrap();
        assert_eq!(ev.mail.as_ref().map(|n| n.kind), Some(MailType::EmailTest));
    }

    #[test]
    fn wrapped_hours_count_as_newer() {
        assert!(hour_is_newer(100, 101));
        assert!(hour_is_newer(65530, 5));
        assert!(!hour_is_newer(101, 100));
        assert!(!hour_is_newer(7, 7));
    }
}
