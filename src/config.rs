use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::attrdefs::Priority;
use crate::codec::{ChecksumPolicy, FirmwareBugs};
use crate::monitor::attributes::{AttrMonitor, PendingSetting};
use crate::monitor::mail::MailFrequency;
use crate::monitor::temperature::TempLimits;
use crate::monitor::Directives;
use crate::scheduler::Schedule;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,

    #[serde(default)]
    pub devices: Vec<DeviceConfig>,

    /// Drive database, searched in order.
    #[serde(default = "PresetConfig::defaults")]
    pub presets: Vec<PresetConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Seconds between monitoring passes
    pub check_interval_sec: u64,
    /// Where state files and attribute logs live. Unset = per-user data dir.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_dir: Option<PathBuf>,
    /// Append one attribute line per pass to `<model>-<serial>.ata.csv`
    pub attrlog: bool,
    /// "ignore", "warn" or "fatal"
    pub checksum: ChecksumPolicy,
}

/// One monitored device.
///
/// Example in smartwatch.toml:
/// ```toml
/// [[devices]]
/// name     = "sda"
/// image    = "/var/lib/smartwatch/images/sda"
/// schedule = "(S/../.././02|L/../../6/03)"
/// tempcrit = 55
/// track_raw = ["5!", "197"]
///
/// [devices.mail]
/// frequency   = "daily"
/// webhook_url = "https://hooks.example.com/T000/B000"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    pub name:                String,
    /// Directory of captured pages served by the image transport
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image:               Option<PathBuf>,
    /// Self-test schedule regex; empty = no scheduled tests
    pub schedule:            String,
    pub smart_check:         bool,
    pub usage_failed:        bool,
    pub prefail:             bool,
    pub usage:               bool,
    pub error_log:           bool,
    pub xerror_log:          bool,
    pub self_test_log:       bool,
    pub offline_status:      bool,
    pub self_test_status:    bool,
    /// "auto", "off" or an attribute id, "+" suffix = report increases only
    pub pending_id:          String,
    pub offline_pending_id:  String,
    pub tempdiff:            u8,
    pub tempinfo:            u8,
    pub tempcrit:            u8,
    /// Attribute id lists; "!" suffix reports the change as critical
    pub ignore:              Vec<String>,
    pub ignore_failed_usage: Vec<String>,
    pub raw_print:           Vec<String>,
    pub track_raw:           Vec<String>,
    /// Vendor definitions, e.g. "9,minutes" or "194,temp10x,Temperature_Celsius"
    pub attribute_defs:      Vec<String>,
    /// none, nologdir, samsung, samsung2, samsung3, xerrorlba, noswap
    pub firmware_bugs:       Vec<String>,
    /// Do not search the drive database
    pub ignore_presets:      bool,
    pub mail:                MailConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MailConfig {
    /// "once", "daily" or "diminishing". Unset = once without a state
    /// directory, daily with one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency:   Option<MailFrequency>,
    /// Command run for each warning, with SMARTD_* variables set. Empty = disabled.
    pub exec:        String,
    /// Slack / Discord / generic webhook URL. Empty = disabled.
    pub webhook_url: String,
    /// Send a test warning when the device is registered
    pub test:        bool,
}

impl MailConfig {
    pub fn enabled(&self) -> bool {
        !self.exec.is_empty() || !self.webhook_url.is_empty()
    }
}

/// A drive database entry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PresetConfig {
    /// Regex matched against the whole model string
    pub model:          String,
    /// Regex matched against the whole firmware string; unset = any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub firmware:       Option<String>,
    pub family:         String,
    pub attribute_defs: Vec<String>,
    pub firmware_bugs:  Vec<String>,
    /// Logged at critical level when the drive is registered
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning:        Option<String>,
}

// ── Defaults ─────────────────────────────────────────────────────────

impl Default for Config {
    fn default() -> Self {
        Self {
            general: GeneralConfig::default(),
            devices: Vec::new(),
            presets: PresetConfig::defaults(),
        }
    }
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            check_interval_sec: 1800,
            state_dir:          None,
            attrlog:            false,
            checksum:           ChecksumPolicy::Warn,
        }
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            name:                String::new(),
            image:               None,
            schedule:            String::new(),
            smart_check:         true,
            usage_failed:        true,
            prefail:             true,
            usage:               true,
            error_log:           true,
            xerror_log:          false,
            self_test_log:       true,
            offline_status:      false,
            self_test_status:    false,
            pending_id:          "auto".into(),
            offline_pending_id:  "auto".into(),
            tempdiff:            0,
            tempinfo:            0,
            tempcrit:            0,
            ignore:              Vec::new(),
            ignore_failed_usage: Vec::new(),
            raw_print:           Vec::new(),
            track_raw:           Vec::new(),
            attribute_defs:      Vec::new(),
            firmware_bugs:       Vec::new(),
            ignore_presets:      false,
            mail:                MailConfig::default(),
        }
    }
}

impl PresetConfig {
    fn entry(family: &str, model: &str, firmware: Option<&str>, defs: &[&str], bugs: &[&str], warning: Option<&str>) -> Self {
        Self {
            model:          model.into(),
            firmware:       firmware.map(String::from),
            family:         family.into(),
            attribute_defs: defs.iter().map(|s| s.to_string()).collect(),
            firmware_bugs:  bugs.iter().map(|s| s.to_string()).collect(),
            warning:        warning.map(String::from),
        }
    }

    pub fn defaults() -> Vec<Self> {
        vec![
            Self::entry(
                "Seagate Barracuda 7200.11",
                "ST3(160813|320613|500[368]20|640[35]30|750[36]30|1000[34]40|1500341)AS?",
                Some("(AD14|SD1[5-9]|SD81)"),
                &[],
                &[],
                Some("There are known problems with these drives, a firmware update is available from the vendor"),
            ),
            Self::entry(
                "Samsung SpinPoint V80",
                "SAMSUNG SV0[48]0[0-9]H",
                None,
                &["9,halfmin2hour"],
                &["samsung2"],
                None,
            ),
            Self::entry(
                "Samsung SpinPoint F1 DT",
                "SAMSUNG HD(083G|16[12]G|25[12]H|32[12]H|50[12]I|642J|75[23]L|10[23]U)J",
                None,
                &[],
                &["samsung3"],
                None,
            ),
            Self::entry(
                "Maxtor DiamondMax Plus 9",
                "Maxtor 6Y((060|080|120|160)L0|(060|080|120|160|200|250)P0|(060|080|120|160|200|250)M0)",
                None,
                &["9,min2hour"],
                &[],
                None,
            ),
            Self::entry(
                "Western Digital Red",
                "WDC WD[1-8]0EF[AR]X-68[0-9A-Z]{4}0",
                None,
                &[],
                &[],
                None,
            ),
        ]
    }
}

// ── Device directives ────────────────────────────────────────────────

impl DeviceConfig {
    /// Translate into monitoring directives, validating every field.
    pub fn directives(&self, general: &GeneralConfig) -> crate::error::Result<Directives> {
        let mut d = Directives::new(self.name.clone());
        d.smart_check = self.smart_check;
        d.usage_failed = self.usage_failed;
        d.prefail = self.prefail;
        d.usage = self.usage;
        d.error_log = self.error_log;
        d.xerror_log = self.xerror_log;
        d.self_test_log = self.self_test_log;
        d.offline_status = self.offline_status;
        d.self_test_status = self.self_test_status;
        d.pending = PendingSetting::parse(&self.pending_id)?;
        d.offline_pending = PendingSetting::parse(&self.offline_pending_id)?;
        d.temp = TempLimits { diff: self.tempdiff, info: self.tempinfo, crit: self.tempcrit };
        d.attrs = AttrMonitor::from_lists(&self.ignore, &self.ignore_failed_usage, &self.raw_print, &self.track_raw)?;
        d.attribute_defs.parse_all(&self.attribute_defs, Priority::User)?;
        d.firmware_bugs = FirmwareBugs::parse_all(&self.firmware_bugs)?;
        d.ignore_presets = self.ignore_presets;
        d.checksum = general.checksum;
        if !self.schedule.is_empty() {
            d.schedule = Some(Schedule::new(&self.schedule)?);
        }
        d.mail = self.mail.enabled();
        d.mail_frequency = self.mail.frequency;
        d.mail_test = self.mail.test;
        d.check_interval = general.check_interval_sec.max(10) as i64;
        d.attrlog = general.attrlog;
        Ok(d)
    }
}

// ── Load / Save ───────────────────────────────────────────────────────

impl Config {
    /// Load `path`, or the default location when `None`. A missing default
    /// file is written with defaults on first run (best effort).
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(p) = path {
            return try_load(p);
        }
        let Some(p) = Config::config_path() else {
            return Ok(Config::default());
        };
        if !p.exists() {
            let _ = try_write_defaults(&p);
            return Ok(Config::default());
        }
        try_load(&p)
    }

    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("smartwatch").join("smartwatch.toml"))
    }

    pub fn parse(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

impl GeneralConfig {
    /// Configured state directory, else `<data_local_dir>/smartwatch`.
    pub fn resolved_state_dir(&self) -> Option<PathBuf> {
        self.state_dir
            .clone()
            .or_else(|| dirs::data_local_dir().map(|p| p.join("smartwatch")))
    }
}

fn try_load(path: &Path) -> Result<Config> {
    let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    Config::parse(&text).with_context(|| format!("parsing {}", path.display()))
}

fn try_write_defaults(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let text = Config::default().to_toml()?;
    fs::write(path, format!("# smartwatch configuration\n# Generated on first run, edit freely\n\n{}", text))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::attributes::MonitorFlags;
    use crate::vendordb::VendorDb;

    #[test]
    fn empty_file_gives_defaults() {
        let cfg = Config::parse("").unwrap();
        assert_eq!(cfg.general.check_interval_sec, 1800);
        assert_eq!(cfg.general.checksum, ChecksumPolicy::Warn);
        assert!(cfg.devices.is_empty());
        assert_eq!(cfg.presets.len(), PresetConfig::defaults().len());
    }

    #[test]
    fn device_section_to_directives() {
        let cfg = Config::parse(
            r#"
            [general]
            check_interval_sec = 600
            checksum = "fatal"

            [[devices]]
            name = "sdb"
            schedule = "S/../.././02"
            pending_id = "197+"
            offline_pending_id = "off"
            tempdiff = 4
            tempcrit = 55
            track_raw = ["5!"]
            attribute_defs = ["9,minutes"]
            firmware_bugs = ["samsung3"]

            [devices.mail]
            frequency = "diminishing"
            exec = "/usr/local/bin/notify"
            "#,
        )
        .unwrap();
        let d = cfg.devices[0].directives(&cfg.general).unwrap();
        assert_eq!(d.name, "sdb");
        assert_eq!(d.check_interval, 600);
        assert_eq!(d.checksum, ChecksumPolicy::Fatal);
        assert_eq!(d.pending, PendingSetting::Id { id: 197, increase_only: true });
        assert_eq!(d.offline_pending, PendingSetting::Off);
        assert_eq!(d.temp, TempLimits { diff: 4, info: 0, crit: 55 });
        assert!(d.attrs.is_set(5, MonitorFlags::RAW_AS_CRIT));
        assert!(d.schedule.as_ref().unwrap().matches("S/01/01/1/02"));
        assert!(d.mail);
        assert_eq!(d.mail_frequency, Some(MailFrequency::Diminishing));
    }

    #[test]
    fn invalid_fields_are_rejected() {
        let general = GeneralConfig::default();
        let bad = |f: fn(&mut DeviceConfig)| {
            let mut c = DeviceConfig { name: "sda".into(), ..Default::default() };
            f(&mut c);
            c.directives(&general).is_err()
        };
        assert!(bad(|c| c.schedule = "(".into()));
        assert!(bad(|c| c.pending_id = "x".into()));
        assert!(bad(|c| c.firmware_bugs = vec!["nope".into()]));
        assert!(bad(|c| c.attribute_defs = vec!["9,bogus".into()]));
        assert!(bad(|c| c.track_raw = vec!["300".into()]));
    }

    #[test]
    fn defaults_round_trip_through_toml() {
        let text = Config::default().to_toml().unwrap();
        let back = Config::parse(&text).unwrap();
        assert_eq!(back.presets.len(), Config::default().presets.len());
        VendorDb::from_config(&back.presets).unwrap();
    }

    #[test]
    fn explicit_path_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Config::load(Some(&dir.path().join("missing.toml"))).is_err());
        let path = dir.path().join("c.toml");
        fs::write(&path, "[general]\nattrlog = true\n").unwrap();
        assert!(Config::load(Some(&path)).unwrap().general.attrlog);
    }

    #[test]
    fn builtin_presets_match_known_models() {
        let db = VendorDb::from_config(&PresetConfig::defaults()).unwrap();
        assert_eq!(db.lookup("WDC WD10EFRX-68FYTN0", "82.00A82").map(|p| p.family.as_str()), Some("Western Digital Red"));
        assert!(db.lookup("ST3500320AS", "SD15").and_then(|p| p.warning.as_ref()).is_some());
        assert!(db.lookup("ST3500320AS", "SD1A").is_none());
    }
}
