//! Per-attribute change detection and pending-sector reports.

use std::fmt;

use crate::attrdefs::{attribute_name, format_raw_value, raw_value, unc_attr_id, AttrDefs};
use crate::classifier::AttrState;
use crate::codec::values::{Attribute, SmartValues};
use crate::error::{Result, SmartError};

/// Monitoring switches for one attribute id.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MonitorFlags(u8);

impl MonitorFlags {
    pub const IGNORE:        MonitorFlags = MonitorFlags(0x01);
    pub const IGNORE_FAILED: MonitorFlags = MonitorFlags(0x02);
    /// Report raw value changes.
    pub const RAW:           MonitorFlags = MonitorFlags(0x04);
    /// Show the raw value next to the normalized one.
    pub const RAW_PRINT:     MonitorFlags = MonitorFlags(0x08);
    /// Normalized value changes are critical.
    pub const AS_CRIT:       MonitorFlags = MonitorFlags(0x10);
    /// Raw value changes are critical.
    pub const RAW_AS_CRIT:   MonitorFlags = MonitorFlags(0x20);

    pub fn contains(&self, other: MonitorFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: MonitorFlags) {
        self.0 |= other.0;
    }
}

/// Switches for all 256 ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttrMonitor {
    flags: [MonitorFlags; 256],
}

impl Default for AttrMonitor {
    fn default() -> Self {
        Self { flags: [MonitorFlags::default(); 256] }
    }
}

fn parse_id(word: &str) -> Result<(u8, bool)> {
    let w = word.trim();
    let (num, crit) = match w.strip_suffix('!') {
        Some(n) => (n, true),
        None => (w, false),
    };
    match num.parse::<u8>() {
        Ok(id) if id > 0 => Ok((id, crit)),
        _ => Err(SmartError::Config(format!("invalid attribute id '{}'", word))),
    }
}

impl AttrMonitor {
    /// Build from id lists. `raw_print` and `track_raw` entries may carry a
    /// `!` suffix to make the change critical; tracking raw implies printing it.
    pub fn from_lists<S: AsRef<str>>(ignore: &[S], ignore_failed_usage: &[S], raw_print: &[S], track_raw: &[S]) -> Result<Self> {
        let mut m = AttrMonitor::default();
        for w in ignore {
            let (id, _) = parse_id(w.as_ref())?;
            m.set(id, MonitorFlags::IGNORE);
        }
        for w in ignore_failed_usage {
            let (id, _) = parse_id(w.as_ref())?;
            m.set(id, MonitorFlags::IGNORE_FAILED);
        }
        for w in raw_print {
            let (id, crit) = parse_id(w.as_ref())?;
            m.set(id, MonitorFlags::RAW_PRINT);
            if crit {
                m.set(id, MonitorFlags::AS_CRIT);
            }
        }
        for w in track_raw {
            let (id, crit) = parse_id(w.as_ref())?;
            m.set(id, MonitorFlags::RAW);
            m.set(id, MonitorFlags::RAW_PRINT);
            if crit {
                m.set(id, MonitorFlags::RAW_AS_CRIT);
            }
        }
        Ok(m)
    }

    pub fn set(&mut self, id: u8, f: MonitorFlags) {
        self.flags[id as usize].insert(f);
    }

    pub fn is_set(&self, id: u8, f: MonitorFlags) -> bool {
        self.flags[id as usize].contains(f)
    }
}

/// Which attribute id to watch for pending sectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PendingSetting {
    #[default]
    Auto,
    Off,
    Id { id: u8, increase_only: bool },
}

impl PendingSetting {
    /// `auto`, `off` (or `0`), `ID` or `ID+`.
    pub fn parse(s: &str) -> Result<Self> {
        let t = s.trim();
        match t {
            "auto" | "" => return Ok(PendingSetting::Auto),
            "off" | "0" => return Ok(PendingSetting::Off),
            _ => {}
        }
        let (num, inc) = match t.strip_suffix('+') {
            Some(n) => (n, true),
            None => (t, false),
        };
        match num.parse::<u8>() {
            Ok(0) => Ok(PendingSetting::Off),
            Ok(id) => Ok(PendingSetting::Id { id, increase_only: inc }),
            Err(_) => Err(SmartError::Config(format!("invalid pending sector id '{}'", s))),
        }
    }

    /// Resolve to `(id, increase_only)`; `None` when disabled.
    pub fn resolve(&self, offline: bool, defs: &AttrDefs) -> Option<(u8, bool)> {
        match *self {
            PendingSetting::Off => None,
            PendingSetting::Id { id, increase_only } => Some((id, increase_only)),
            PendingSetting::Auto => match unc_attr_id(offline, defs) {
                (0, _) => None,
                pair => Some(pair),
            },
        }
    }
}

impl fmt::Display for PendingSetting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PendingSetting::Auto => write!(f, "auto"),
            PendingSetting::Off => write!(f, "off"),
            PendingSetting::Id { id, increase_only } => write!(f, "{}{}", id, if *increase_only { "+" } else { "" }),
        }
    }
}

/// Result of comparing one attribute slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttrReport {
    /// Usage attribute failing now.
    FailedUsage(String),
    Changed { text: String, critical: bool },
    /// Slot changed its id between passes.
    IdMismatch(String),
}

/// Which attribute types to watch for normalized changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttrWatch {
    pub usage_failed: bool,
    pub prefail:      bool,
    pub usage:        bool,
}

fn value_text(attr: &Attribute, state: AttrState, print_raw: bool, defs: &AttrDefs) -> String {
    if state == AttrState::NoNormval {
        format!("{} (Raw)", format_raw_value(attr, defs))
    } else if print_raw {
        format!("{} [Raw {}]", attr.current, format_raw_value(attr, defs))
    } else {
        attr.current.to_string()
    }
}

/// Compare slot `cur` against the same slot from the last pass.
/// `state` is the classifier verdict for `cur`.
#[allow(clippy::too_many_arguments)]
pub fn check_attribute(
    device: &str,
    cur: &Attribute,
    prev: &Attribute,
    state: AttrState,
    watch: AttrWatch,
    mon: &AttrMonitor,
    defs: &AttrDefs,
    is_ssd: Option<bool>,
) -> Vec<AttrReport> {
    let mut out = Vec::new();
    if state == AttrState::NonExisting {
        return out;
    }
    let name = attribute_name(cur.id, defs, is_ssd);
    let prefail = cur.prefailure();

    if watch.usage_failed
        && !prefail
        && state == AttrState::FailedNow
        && !mon.is_set(cur.id, MonitorFlags::IGNORE_FAILED)
    {
        out.push(AttrReport::FailedUsage(format!(
            "Device: {}, Failed SMART usage Attribute: {} {}.",
            device, cur.id, name
        )));
    }

    if !(if prefail { watch.prefail } else { watch.usage }) || mon.is_set(cur.id, MonitorFlags::IGNORE) {
        return out;
    }
    if cur.id != prev.id {
        out.push(AttrReport::IdMismatch(format!(
            "Device: {}, same Attribute has different ID numbers: {} = {}",
            device, cur.id, prev.id
        )));
        return out;
    }

    let valchanged = state > AttrState::NoNormval && cur.current != prev.current;
    let rawchanged = mon.is_set(cur.id, MonitorFlags::RAW) && cur.raw != prev.raw;
    if !valchanged && !rawchanged {
        return out;
    }

    let print_raw = mon.is_set(cur.id, MonitorFlags::RAW_PRINT);
    let text = format!(
        "Device: {}, SMART {} Attribute: {} {} changed from {} to {}",
        device,
        if prefail { "Prefailure" } else { "Usage" },
        cur.id,
        name,
        value_text(prev, state, print_raw, defs),
        value_text(cur, state, print_raw, defs),
    );
    let critical = (valchanged && mon.is_set(cur.id, MonitorFlags::AS_CRIT))
        || (rawchanged && mon.is_set(cur.id, MonitorFlags::RAW_AS_CRIT));
    out.push(AttrReport::Changed { text, critical });
    out
}

/// Outcome of the pending-sector check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingReport {
    /// Count dropped to zero.
    Cleared(String),
    Alert(String),
    /// Raw value at or above the sector count.
    Bogus(String),
}

fn pending_label(offline: bool, increase_only: bool) -> &'static str {
    match (offline, increase_only) {
        (false, false) => "Currently unreadable (pending) sectors",
        (false, true) => "Total unreadable (pending) sectors",
        (true, false) => "Offline uncorrectable sectors",
        (true, true) => "Total offline uncorrectable sectors",
    }
}

/// Check a pending-sector attribute. The slot must hold `id` in both
/// tables. `num_sectors` 0 disables the plausibility check.
#[allow(clippy::too_many_arguments)]
pub fn check_pending(
    device: &str,
    cur: &SmartValues,
    prev: &SmartValues,
    id: u8,
    increase_only: bool,
    offline: bool,
    num_sectors: u64,
    defs: &AttrDefs,
) -> Option<PendingReport> {
    let (i, attr) = cur.find_attribute(id)?;
    let prev_attr = prev.attributes.get(i).filter(|a| a.id == id)?;
    let raw = raw_value(attr, defs);
    let prev_raw = raw_value(prev_attr, defs);
    let label = pending_label(offline, increase_only);

    if num_sectors > 0 && raw >= num_sectors {
        return Some(PendingReport::Bogus(format!(
            "Device: {}, {} raw value {} not below sector count {}, ignored",
            device, label, raw, num_sectors
        )));
    }
    if raw == 0 {
        return Some(PendingReport::Cleared(format!("No more {}", label)));
    }
    if increase_only && prev_raw >= raw {
        return None;
    }
    let mut text = format!("Device: {}, {} {}", device, raw, label);
    if prev_raw > 0 && raw != prev_raw {
        text.push_str(&format!(" (changed {:+})", raw as i64 - prev_raw as i64));
    }
    Some(PendingReport::Alert(text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attrdefs::Priority;
    use crate::codec::values::tests::attr;

    const WATCH: AttrWatch = AttrWatch { usage_failed: true, prefail: true, usage: true };

    fn values(attrs: &[Attribute]) -> SmartValues {
        let mut v = SmartValues::default();
        v.attributes[..attrs.len()].copy_from_slice(attrs);
        v
    }

    #[test]
    fn id_lists_and_crit_suffix() {
        let m = AttrMonitor::from_lists(&["194"], &["9"], &["1!"], &["5!", "197"]).unwrap();
        assert!(m.is_set(194, MonitorFlags::IGNORE));
        assert!(m.is_set(9, MonitorFlags::IGNORE_FAILED));
        assert!(m.is_set(1, MonitorFlags::AS_CRIT));
        assert!(!m.is_set(1, MonitorFlags::RAW));
        assert!(m.is_set(5, MonitorFlags::RAW_AS_CRIT));
        assert!(m.is_set(197, MonitorFlags::RAW_PRINT));
        assert!(AttrMonitor::from_lists(&["0"], &[] as &[&str], &[], &[]).is_err());
        assert!(AttrMonitor::from_lists(&["abc"], &[] as &[&str], &[], &[]).is_err());
    }

    #[test]
    fn pending_settings() {
        assert_eq!(PendingSetting::parse("auto").unwrap(), PendingSetting::Auto);
        assert_eq!(PendingSetting::parse("0").unwrap(), PendingSetting::Off);
        assert_eq!(
            PendingSetting::parse("200+").unwrap(),
            PendingSetting::Id { id: 200, increase_only: true }
        );
        assert!(PendingSetting::parse("x").is_err());
        let defs = AttrDefs::default();
        assert_eq!(PendingSetting::Auto.resolve(false, &defs), Some((197, false)));
        assert_eq!(PendingSetting::Auto.resolve(true, &defs), Some((198, false)));

        let mut inc = AttrDefs::default();
        inc.parse("197,raw48+", Priority::User).unwrap();
        assert_eq!(PendingSetting::Auto.resolve(false, &inc), Some((197, true)));
        assert_eq!(PendingSetting::Id { id: 200, increase_only: true }.to_string(), "200+");
    }

    #[test]
    fn raw_change_needs_tracking() {
        let defs = AttrDefs::default();
        let prev = attr(5, 0x33, 100, 100, 0);
        let cur = attr(5, 0x33, 100, 100, 1);

        let none = AttrMonitor::default();
        assert!(check_attribute("sda", &cur, &prev, AttrState::Ok, WATCH, &none, &defs, None).is_empty());

        let tracked = AttrMonitor::from_lists(&[] as &[&str], &[], &[], &["5"]).unwrap();
        let r = check_attribute("sda", &cur, &prev, AttrState::Ok, WATCH, &tracked, &defs, None);
        assert_eq!(
            r,
            vec![AttrReport::Changed {
                text: "Device: sda, SMART Prefailure Attribute: 5 Reallocated_Sector_Ct changed from 100 [Raw 0] to 100 [Raw 1]".into(),
                critical: false,
            }]
        );
    }

    #[test]
    fn normalized_change_and_severity() {
        let defs = AttrDefs::default();
        let prev = attr(1, 0x0f, 100, 100, 0);
        let cur = attr(1, 0x0f, 99, 99, 0);
        let m = AttrMonitor::from_lists(&[] as &[&str], &[], &["1!"], &[]).unwrap();
        let r = check_attribute("sda", &cur, &prev, AttrState::Ok, WATCH, &m, &defs, None);
        assert!(matches!(&r[0], AttrReport::Changed { critical: true, .. }));

        let ignored = AttrMonitor::from_lists(&["1"], &[] as &[&str], &[], &[]).unwrap();
        assert!(check_attribute("sda", &cur, &prev, AttrState::Ok, WATCH, &ignored, &defs, None).is_empty());

        let no_prefail = AttrWatch { prefail: false, ..WATCH };
        assert!(check_attribute("sda", &cur, &prev, AttrState::Ok, no_prefail, &m, &defs, None).is_empty());
    }

    #[test]
    fn failed_usage_and_id_mismatch() {
        let defs = AttrDefs::default();
        let cur = attr(190, 0x22, 5, 5, 0);
        let r = check_attribute("sda", &cur, &attr(194, 0x22, 5, 5, 0), AttrState::FailedNow, WATCH, &AttrMonitor::default(), &defs, None);
        assert!(matches!(&r[0], AttrReport::FailedUsage(t) if t.starts_with("Device: sda, Failed SMART usage Attribute: 190")));
        assert!(matches!(&r[1], AttrReport::IdMismatch(_)));

        let m = AttrMonitor::from_lists(&[] as &[&str], &["190"], &[], &[]).unwrap();
        let r = check_attribute("sda", &cur, &cur, AttrState::FailedNow, WATCH, &m, &defs, None);
        assert!(r.is_empty());
    }

    #[test]
    fn pending_increase_only() {
        let defs = AttrDefs::default();
        let prev = values(&[attr(197, 0x32, 100, 100, 0)]);
        let cur = values(&[attr(197, 0x32, 100, 100, 5)]);
        let r = check_pending("sda", &cur, &prev, 197, true, false, 0, &defs);
        assert_eq!(r, Some(PendingReport::Alert("Device: sda, 5 Total unreadable (pending) sectors".into())));

        let lower = values(&[attr(197, 0x32, 100, 100, 3)]);
        assert_eq!(check_pending("sda", &lower, &cur, 197, true, false, 0, &defs), None);
        let r = check_pending("sda", &lower, &cur, 197, false, false, 0, &defs);
        assert_eq!(
            r,
            Some(PendingReport::Alert("Device: sda, 3 Currently unreadable (pending) sectors (changed -2)".into()))
        );
    }

    #[test]
    fn pending_cleared_and_bogus() {
        let defs = AttrDefs::default();
        let prev = values(&[attr(198, 0x30, 100, 100, 7)]);
        let zero = values(&[attr(198, 0x30, 100, 100, 0)]);
        assert_eq!(
            check_pending("sda", &zero, &prev, 198, false, true, 0, &defs),
            Some(PendingReport::Cleared("No more Offline uncorrectable sectors".into()))
        );
        let huge = values(&[attr(198, 0x30, 100, 100, 5000)]);
        assert!(matches!(
            check_pending("sda", &huge, &prev, 198, false, true, 1000, &defs),
            Some(PendingReport::Bogus(_))
        ));
        assert_eq!(check_pending("sda", &huge, &values(&[]), 198, false, true, 0, &defs), None);
    }
}
