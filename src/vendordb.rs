//! Drive presets: model/firmware patterns mapped to attribute definitions,
//! firmware quirks and warnings.

use regex::Regex;

use crate::attrdefs::{AttrDefs, Priority};
use crate::codec::FirmwareBugs;
use crate::config::PresetConfig;
use crate::error::{Result, SmartError};

#[derive(Debug, Clone)]
pub struct Preset {
    pub family:         String,
    model:              Regex,
    firmware:           Option<Regex>,
    pub attribute_defs: Vec<String>,
    pub firmware_bugs:  FirmwareBugs,
    pub warning:        Option<String>,
}

fn anchored(pattern: &str) -> Result<Regex> {
    Regex::new(&format!("^(?:{})$", pattern))
        .map_err(|e| SmartError::Config(format!("invalid preset pattern '{}': {}", pattern, e)))
}

impl Preset {
    pub fn from_config(c: &PresetConfig) -> Result<Self> {
        let firmware = match c.firmware.as_deref() {
            Some(f) if !f.is_empty() => Some(anchored(f)?),
            _ => None,
        };
        // Validate definitions now so a bad preset fails at startup.
        AttrDefs::default().parse_all(&c.attribute_defs, Priority::Database)?;
        Ok(Self {
            family: c.family.clone(),
            model: anchored(&c.model)?,
            firmware,
            attribute_defs: c.attribute_defs.clone(),
            firmware_bugs: FirmwareBugs::parse_all(&c.firmware_bugs)?,
            warning: c.warning.clone().filter(|w| !w.is_empty()),
        })
    }

    pub fn matches(&self, model: &str, firmware: &str) -> bool {
        self.model.is_match(model) && self.firmware.as_ref().map_or(true, |f| f.is_match(firmware))
    }

    /// Merge this preset's definitions at database priority and its quirks.
    pub fn apply(&self, defs: &mut AttrDefs, bugs: &mut FirmwareBugs) -> Result<()> {
        defs.parse_all(&self.attribute_defs, Priority::Database)?;
        bugs.merge_preset(self.firmware_bugs);
        Ok(())
    }
}

/// Ordered preset list; the first match wins.
#[derive(Debug, Clone, Default)]
pub struct VendorDb {
    presets: Vec<Preset>,
}

impl VendorDb {
    pub fn from_config(presets: &[PresetConfig]) -> Result<Self> {
        Ok(Self { presets: presets.iter().map(Preset::from_config).collect::<Result<_>>()? })
    }

    pub fn lookup(&self, model: &str, firmware: &str) -> Option<&Preset> {
        self.presets.iter().find(|p| p.matches(model, firmware))
    }

    pub fn len(&self) -> usize {
        self.presets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.presets.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::FirmwareBug;

    fn preset(model: &str, firmware: Option<&str>) -> PresetConfig {
        PresetConfig {
            model: model.into(),
            firmware: firmware.map(String::from),
            family: "Test family".into(),
            attribute_defs: vec!["9,minutes".into()],
            firmware_bugs: vec!["samsung3".into()],
            warning: Some("firmware has a known bug".into()),
        }
    }

    #[test]
    fn model_and_firmware_must_match_fully() {
        let db = VendorDb::from_config(&[preset("SAMSUNG HD[0-9]+", Some("1AA01.*")), preset("ST.*", None)]).unwrap();
        assert!(db.lookup("SAMSUNG HD502HJ", "1AA01113").is_some());
        assert!(db.lookup("SAMSUNG HD502HJ", "2AB").is_none());
        assert!(db.lookup("XSAMSUNG HD502HJ", "1AA01113").is_none());
        assert_eq!(db.lookup("ST3500418AS", "CC38").map(|p| p.family.as_str()), Some("Test family"));
    }

    #[test]
    fn apply_merges_below_user_definitions() {
        let db = VendorDb::from_config(&[preset("X", None)]).unwrap();
        let p = db.lookup("X", "").unwrap();
        let mut defs = AttrDefs::default();
        defs.parse("9,raw48,User_Hours", Priority::User).unwrap();
        let mut bugs = FirmwareBugs::default();
        p.apply(&mut defs, &mut bugs).unwrap();
        assert_eq!(defs[9].name, "User_Hours");
        assert!(bugs.is_set(FirmwareBug::Samsung3));

        let mut none = FirmwareBugs::parse_all(&["none"]).unwrap();
        p.apply(&mut AttrDefs::default(), &mut none).unwrap();
        assert!(!none.is_set(FirmwareBug::Samsung3));
    }

    #[test]
    fn bad_presets_are_rejected() {
        assert!(VendorDb::from_config(&[preset("(", None)]).is_err());
        let mut bad = preset("X", None);
        bad.firmware_bugs = vec!["bogus".into()];
        assert!(VendorDb::from_config(&[bad]).is_err());
        let mut bad = preset("X", None);
        bad.attribute_defs = vec!["5,nonsense".into()];
        assert!(VendorDb::from_config(&[bad]).is_err());
    }
}
