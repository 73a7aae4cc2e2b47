//! Persistent per-device state: `key = value` lines under the state directory.

use std::fmt::Write as _;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use tracing::{info, warn};

use crate::codec::values::{SmartValues, NUM_ATTRIBUTES};
use crate::error::{Result, SmartError};

/// Number of mail categories, test mail included.
pub const NUM_MAIL_TYPES: usize = 13;

const HEADER: &str = "# smartd state file";

/// Throttle record for one mail category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MailRecord {
    /// Mails sent since the condition last cleared.
    pub logged:     u32,
    /// Epoch seconds.
    pub first_sent: i64,
    pub last_sent:  i64,
}

/// Attribute values as of the last pass. `raw` holds the 48-bit raw field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AttrSnapshot {
    pub id:    u8,
    pub val:   u8,
    pub worst: u8,
    pub raw:   u64,
    pub resvd: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistentState {
    pub temp_min:                u8,
    pub temp_max:                u8,
    pub self_test_errors:        u8,
    pub self_test_last_err_hour: u16,
    pub scheduled_next_check:    i64,
    pub selective_last_start:    u64,
    pub selective_last_end:      u64,
    pub ata_error_count:         u32,
    pub mail:                    [MailRecord; NUM_MAIL_TYPES],
    pub attributes:              [AttrSnapshot; NUM_ATTRIBUTES],
    pub nvme_err_log_entries:    u64,
}

impl Default for PersistentState {
    fn default() -> Self {
        Self {
            temp_min:                0,
            temp_max:                0,
            self_test_errors:        0,
            self_test_last_err_hour: 0,
            scheduled_next_check:    0,
            selective_last_start:    0,
            selective_last_end:      0,
            ata_error_count:         0,
            mail:                    [MailRecord::default(); NUM_MAIL_TYPES],
            attributes:              [AttrSnapshot::default(); NUM_ATTRIBUTES],
            nvme_err_log_entries:    0,
        }
    }
}

/// Result of parsing a state file's text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parsed {
    pub state: PersistentState,
    pub good:  usize,
    pub bad:   usize,
}

fn line_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(concat!(
            r"^ *(?:",
            r"(?P<key>temperature-min|temperature-max|self-test-errors|self-test-last-err-hour",
            r"|scheduled-test-next-check|selective-test-last-start|selective-test-last-end",
            r"|ata-error-count|nvme-err-log-entries)",
            r"|mail\.(?P<mail>[0-9]+)\.(?P<mfield>count|first-sent-time|last-sent-time)",
            r"|ata-smart-attribute\.(?P<attr>[0-9]+)\.(?P<afield>id|val|worst|raw|resvd)",
            r") *= *(?P<val>[0-9]+)[ \r\n]*$",
        ))
        .ok()
    })
    .as_ref()
}

fn fit<T: TryFrom<u64>>(v: u64) -> Option<T> {
    T::try_from(v).ok()
}

impl PersistentState {
    /// Parse state text. Blank and `#` lines are skipped; anything else
    /// that is not a known `key = number` line counts as bad.
    pub fn parse(text: &str) -> Parsed {
        let mut state = PersistentState::default();
        let (mut good, mut bad) = (0, 0);
        for line in text.lines() {
            let t = line.trim();
            if t.is_empty() || t.starts_with('#') {
                continue;
            }
            if state.apply_line(line).is_some() {
                good += 1;
            } else {
                bad += 1;
            }
        }
        Parsed { state, good, bad }
    }

    fn apply_line(&mut self, line: &str) -> Option<()> {
        let caps = line_regex()?.captures(line)?;
        let val: u64 = caps["val"].parse().ok()?;

        if let Some(key) = caps.name("key") {
            match key.as_str() {
                "temperature-min"           => self.temp_min = fit(val)?,
                "temperature-max"           => self.temp_max = fit(val)?,
                "self-test-errors"          => self.self_test_errors = fit(val)?,
                "self-test-last-err-hour"   => self.self_test_last_err_hour = fit(val)?,
                "scheduled-test-next-check" => self.scheduled_next_check = fit(val)?,
                "selective-test-last-start" => self.selective_last_start = val,
                "selective-test-last-end"   => self.selective_last_end = val,
                "ata-error-count"           => self.ata_error_count = fit(val)?,
                "nvme-err-log-entries"      => self.nvme_err_log_entries = val,
                _ => return None,
            }
        } else if let Some(i) = caps.name("mail") {
            let i: usize = i.as_str().parse().ok()?;
            let rec = self.mail.get_mut(i)?;
            match &caps["mfield"] {
                "count"           => rec.logged = fit(val)?,
                "first-sent-time" => rec.first_sent = fit(val)?,
                _                 => rec.last_sent = fit(val)?,
            }
        } else {
            let i: usize = caps["attr"].parse().ok()?;
            let a = self.attributes.get_mut(i)?;
            match &caps["afield"] {
                "id"    => a.id = fit(val)?,
                "val"   => a.val = fit(val)?,
                "worst" => a.worst = fit(val)?,
                "raw"   => a.raw = val & 0xffff_ffff_ffff,
                _       => a.resvd = fit(val)?,
            }
        }
        Some(())
    }

    /// Read a state file. `Ok(None)` when it does not exist; a file with
    /// bad lines only is a format error.
    pub fn load(path: &Path) -> Result<Option<Self>> {
        let text = match fs::read_to_string(path) {
            Ok(t) => t,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(SmartError::File { path: path.to_path_buf(), source: e }),
        };
        let parsed = Self::parse(&text);
        if parsed.bad > 0 {
            if parsed.good == 0 {
                return Err(SmartError::StateFormat { path: path.to_path_buf() });
            }
            warn!("{}: {} invalid line(s) ignored", path.display(), parsed.bad);
        }
        Ok(Some(parsed.state))
    }

    /// Render nonzero values in file order. The test mail is never written.
    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str(HEADER);
        out.push('\n');
        let mut line = |name: &str, v: u64| {
            if v != 0 {
                let _ = writeln!(out, "{} = {}", name, v);
            }
        };
        line("temperature-min", self.temp_min as u64);
        line("temperature-max", self.temp_max as u64);
        line("self-test-errors", self.self_test_errors as u64);
        line("self-test-last-err-hour", self.self_test_last_err_hour as u64);
        line("scheduled-test-next-check", self.scheduled_next_check.max(0) as u64);
        line("selective-test-last-start", self.selective_last_start);
        line("selective-test-last-end", self.selective_last_end);

        for (i, m) in self.mail.iter().enumerate().skip(1) {
            if m.logged == 0 {
                continue;
            }
            line(&format!("mail.{}.count", i), m.logged as u64);
            line(&format!("mail.{}.first-sent-time", i), m.first_sent.max(0) as u64);
            line(&format!("mail.{}.last-sent-time", i), m.last_sent.max(0) as u64);
        }

        line("ata-error-count", self.ata_error_count as u64);

        for (i, a) in self.attributes.iter().enumerate() {
            if a.id == 0 {
                continue;
            }
            line(&format!("ata-smart-attribute.{}.id", i), a.id as u64);
            line(&format!("ata-smart-attribute.{}.val", i), a.val as u64);
            line(&format!("ata-smart-attribute.{}.worst", i), a.worst as u64);
            line(&format!("ata-smart-attribute.{}.raw", i), a.raw);
            line(&format!("ata-smart-attribute.{}.resvd", i), a.resvd as u64);
        }

        line("nvme-err-log-entries", self.nvme_err_log_entries);
        out
    }

    /// Write the file, keeping the previous version as `<path>~`.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| SmartError::File { path: parent.to_path_buf(), source: e })?;
        }
        let backup = backup_path(path);
        let _ = fs::remove_file(&backup);
        let _ = fs::rename(path, &backup);
        fs::write(path, self.render()).map_err(|e| SmartError::File { path: path.to_path_buf(), source: e })?;
        info!("state written to {}", path.display());
        Ok(())
    }

    /// Copy the attribute table of `values` into the snapshot.
    pub fn snapshot_attributes(&mut self, values: &SmartValues) {
        for (snap, a) in self.attributes.iter_mut().zip(values.attributes.iter()) {
            *snap = AttrSnapshot {
                id:    a.id,
                val:   a.current,
                worst: a.worst,
                raw:   a.raw48(),
                resvd: a.reserved,
            };
        }
    }

    /// Rebuild an attribute table from the snapshot. Empty slots are zeroed.
    pub fn restore_attributes(&self, values: &mut SmartValues) {
        for (a, snap) in values.attributes.iter_mut().zip(self.attributes.iter()) {
            a.id = snap.id;
            if snap.id == 0 {
                a.current = 0;
                a.worst = 0;
                a.raw = [0; 6];
                continue;
            }
            a.current = snap.val;
            a.worst = snap.worst;
            a.raw.copy_from_slice(&snap.raw.to_le_bytes()[..6]);
            a.reserved = snap.resvd;
        }
    }

    /// Append one attribute-log line (UTC timestamp) to `path`.
    pub fn append_attrlog(&self, path: &Path, now: i64) -> Result<()> {
        use std::io::Write;
        let stamp = chrono::DateTime::from_timestamp(now, 0)
            .map(|d| d.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_default();
        let mut line = format!("{};", stamp);
        for a in self.attributes.iter().filter(|a| a.id != 0) {
            let _ = write!(line, "\t{};{};{};", a.id, a.val, a.raw);
        }
        line.push('\n');
        let mut f = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| SmartError::File { path: path.to_path_buf(), source: e })?;
        f.write_all(line.as_bytes())
            .map_err(|e| SmartError::File { path: path.to_path_buf(), source: e })
    }
}

fn backup_path(path: &Path) -> PathBuf {
    let mut s = path.as_os_str().to_os_string();
    s.push("~");
    PathBuf::from(s)
}

/// `<model>-<serial>.ata.<ext>`, every character outside `[0-9A-Za-z]`
/// replaced by `_`.
pub fn device_file_name(model: &str, serial: &str, ext: &str) -> String {
    let clean = |s: &str| -> String {
        s.chars().map(|c| if c.is_ascii_alphanumeric() { c } else { '_' }).collect()
    };
    format!("{}-{}.ata.{}", clean(model), clean(serial), ext)
}
