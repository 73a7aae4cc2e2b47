//! Vendor attribute definitions: names, raw value formats and display flags.
//!
//! Definitions come in three priority tiers. The built-in default table is
//! kept apart from the per-device overrides (database presets and user
//! settings), so a device that overrides only the format of an id still
//! falls back to the default name.

use std::sync::OnceLock;

use tracing::debug;

use crate::codec::values::{Attribute, SmartValues};
use crate::error::{Result, SmartError};

pub const MAX_ATTRIBUTE_ID: usize = 256;

/// Raw value interpretation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawFormat {
    /// Not set at this tier.
    Default,
    Raw8,
    Raw16,
    Raw48,
    Hex48,
    Raw56,
    Hex56,
    Raw64,
    Hex64,
    Raw16OptRaw16,
    Raw16OptAvg16,
    Raw24OptRaw8,
    Raw24DivRaw24,
    Raw24DivRaw32,
    Sec2Hour,
    Min2Hour,
    HalfMin2Hour,
    Msec24Hour32,
    TempMinMax,
    Temp10x,
}

const FORMAT_NAMES: &[(&str, RawFormat)] = &[
    ("raw8",         RawFormat::Raw8),
    ("raw16",        RawFormat::Raw16),
    ("raw48",        RawFormat::Raw48),
    ("hex48",        RawFormat::Hex48),
    ("raw56",        RawFormat::Raw56),
    ("hex56",        RawFormat::Hex56),
    ("raw64",        RawFormat::Raw64),
    ("hex64",        RawFormat::Hex64),
    ("raw16(raw16)", RawFormat::Raw16OptRaw16),
    ("raw16(avg16)", RawFormat::Raw16OptAvg16),
    ("raw24(raw8)",  RawFormat::Raw24OptRaw8),
    ("raw24/raw24",  RawFormat::Raw24DivRaw24),
    ("raw24/raw32",  RawFormat::Raw24DivRaw32),
    ("sec2hour",     RawFormat::Sec2Hour),
    ("min2hour",     RawFormat::Min2Hour),
    ("halfmin2hour", RawFormat::HalfMin2Hour),
    ("msec24hour32", RawFormat::Msec24Hour32),
    ("tempminmax",   RawFormat::TempMinMax),
    ("temp10x",      RawFormat::Temp10x),
];

/// Old single-word vendor options and what they mean today.
const LEGACY_ALIASES: &[(&str, &str)] = &[
    ("9,halfminutes",               "9,halfmin2hour,Power_On_Half_Minutes"),
    ("9,minutes",                   "9,min2hour,Power_On_Minutes"),
    ("9,seconds",                   "9,sec2hour,Power_On_Seconds"),
    ("9,temp",                      "9,tempminmax,Temperature_Celsius"),
    ("192,emergencyretractcyclect", "192,raw48,Emerg_Retract_Cycle_Ct"),
    ("193,loadunload",              "193,raw24/raw24"),
    ("194,10xCelsius",              "194,temp10x,Temperature_Celsius_x10"),
    ("194,unknown",                 "194,raw48,Unknown_Attribute"),
    ("197,increasing",              "197,raw48+,Total_Pending_Sectors"),
    ("198,offlinescanuncsectorct",  "198,raw48,Offline_Scan_UNC_SectCt"),
    ("198,increasing",              "198,raw48+,Total_Offl_Uncorrectabl"),
    ("200,writeerrorcount",         "200,raw48,Write_Error_Count"),
    ("201,detectedtacount",         "201,raw48,Detected_TA_Count"),
    ("220,temp",                    "220,tempminmax,Temperature_Celsius"),
];

/// Built-in names and formats for the well-known ids.
const DEFAULT_TABLE: &[&str] = &[
    "1,raw48,Raw_Read_Error_Rate",
    "2,raw48,Throughput_Performance",
    "3,raw16(avg16),Spin_Up_Time",
    "4,raw48,Start_Stop_Count",
    "5,raw16(raw16),Reallocated_Sector_Ct",
    "6,raw48,Read_Channel_Margin,HDD",
    "7,raw48,Seek_Error_Rate,HDD",
    "8,raw48,Seek_Time_Performance,HDD",
    "9,raw24(raw8),Power_On_Hours",
    "10,raw48,Spin_Retry_Count,HDD",
    "11,raw48,Calibration_Retry_Count,HDD",
    "12,raw48,Power_Cycle_Count",
    "13,raw48,Read_Soft_Error_Rate",
    "175,raw48,Program_Fail_Count_Chip,SSD",
    "176,raw48,Erase_Fail_Count_Chip,SSD",
    "177,raw48,Wear_Leveling_Count,SSD",
    "178,raw48,Used_Rsvd_Blk_Cnt_Chip,SSD",
    "179,raw48,Used_Rsvd_Blk_Cnt_Tot,SSD",
    "180,raw48,Unused_Rsvd_Blk_Cnt_Tot,SSD",
    "181,raw48,Program_Fail_Cnt_Total",
    "182,raw48,Erase_Fail_Count_Total,SSD",
    "183,raw48,Runtime_Bad_Block",
    "184,raw48,End-to-End_Error",
    "187,raw48,Reported_Uncorrect",
    "188,raw48,Command_Timeout",
    "189,raw48,High_Fly_Writes,HDD",
    "190,tempminmax,Airflow_Temperature_Cel",
    "191,raw48,G-Sense_Error_Rate,HDD",
    "192,raw48,Power-Off_Retract_Count",
    "193,raw48,Load_Cycle_Count,HDD",
    "194,tempminmax,Temperature_Celsius",
    "195,raw48,Hardware_ECC_Recovered",
    "196,raw16(raw16),Reallocated_Event_Count",
    "197,raw48,Current_Pending_Sector",
    "198,raw48,Offline_Uncorrectable",
    "199,raw48,UDMA_CRC_Error_Count",
    "200,raw48,Multi_Zone_Error_Rate,HDD",
    "201,raw48,Soft_Read_Error_Rate,HDD",
    "202,raw48,Data_Address_Mark_Errs,HDD",
    "203,raw48,Run_Out_Cancel",
    "204,raw48,Soft_ECC_Correction",
    "205,raw48,Thermal_Asperity_Rate",
    "206,raw48,Flying_Height,HDD",
    "207,raw48,Spin_High_Current,HDD",
    "208,raw48,Spin_Buzz,HDD",
    "209,raw48,Offline_Seek_Performnce,HDD",
    "220,raw48,Disk_Shift,HDD",
    "221,raw48,G-Sense_Error_Rate,HDD",
    "222,raw48,Loaded_Hours,HDD",
    "223,raw48,Load_Retry_Count,HDD",
    "224,raw48,Load_Friction,HDD",
    "225,raw48,Load_Cycle_Count,HDD",
    "226,raw48,Load-in_Time,HDD",
    "227,raw48,Torq-amp_Count,HDD",
    "228,raw48,Power-off_Retract_Count",
    "230,raw48,Head_Amplitude,HDD",
    "231,raw48,Temperature_Celsius,HDD",
    "232,raw48,Available_Reservd_Space",
    "233,raw48,Media_Wearout_Indicator,SSD",
    "240,raw24(raw8),Head_Flying_Hours,HDD",
    "241,raw48,Total_LBAs_Written",
    "242,raw48,Total_LBAs_Read",
    "250,raw48,Read_Error_Retry_Rate",
    "254,raw48,Free_Fall_Sensor,HDD",
];

impl RawFormat {
    pub fn parse(name: &str) -> Option<Self> {
        FORMAT_NAMES.iter().find(|(n, _)| *n == name).map(|(_, f)| *f)
    }

    pub fn name(&self) -> &'static str {
        FORMAT_NAMES
            .iter()
            .find(|(_, f)| f == self)
            .map(|(n, _)| *n)
            .unwrap_or("default")
    }

    /// Byte order used when a definition does not give one.
    fn default_byteorder(&self) -> &'static str {
        match self {
            RawFormat::Raw64 | RawFormat::Hex64 => "543210wv",
            RawFormat::Raw56 | RawFormat::Hex56 | RawFormat::Raw24DivRaw32 | RawFormat::Msec24Hour32 => "r543210",
            _ => "543210",
        }
    }
}

/// Display flags of one definition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AttrFlags(u8);

impl AttrFlags {
    /// Raw value never decreases (reallocated/pending counts).
    pub const INCREASING:  AttrFlags = AttrFlags(0x01);
    /// Normalized value is meaningless.
    pub const NO_NORMVAL:  AttrFlags = AttrFlags(0x02);
    /// Worst value is meaningless.
    pub const NO_WORSTVAL: AttrFlags = AttrFlags(0x04);
    pub const HDD_ONLY:    AttrFlags = AttrFlags(0x08);
    pub const SSD_ONLY:    AttrFlags = AttrFlags(0x10);

    pub fn contains(&self, other: AttrFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: AttrFlags) {
        self.0 |= other.0;
    }
}

/// Tier a definition was set at.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum Priority {
    #[default]
    Default,
    Database,
    User,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttrDef {
    pub name:       String,
    pub raw_format: RawFormat,
    pub flags:      AttrFlags,
    pub byteorder:  String,
    pub priority:   Priority,
}

impl Default for AttrDef {
    fn default() -> Self {
        Self {
            name:       String::new(),
            raw_format: RawFormat::Default,
            flags:      AttrFlags::default(),
            byteorder:  String::new(),
            priority:   Priority::Default,
        }
    }
}

/// One definition slot per attribute id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttrDefs {
    entries: Vec<AttrDef>,
}

impl Default for AttrDefs {
    fn default() -> Self {
        Self { entries: vec![AttrDef::default(); MAX_ATTRIBUTE_ID] }
    }
}

impl std::ops::Index<u8> for AttrDefs {
    type Output = AttrDef;

    fn index(&self, id: u8) -> &AttrDef {
        &self.entries[id as usize]
    }
}

fn field_ok(s: &str) -> bool {
    !s.is_empty() && s.len() <= 32
}

impl AttrDefs {
    /// The read-only built-in table, parsed once.
    pub fn builtin() -> &'static AttrDefs {
        static TABLE: OnceLock<AttrDefs> = OnceLock::new();
        TABLE.get_or_init(|| {
            let mut defs = AttrDefs::default();
            for line in DEFAULT_TABLE {
                if let Err(e) = defs.parse(line, Priority::Default) {
                    debug!("built-in attribute table: {}", e);
                }
            }
            defs
        })
    }

    /// Parse `ID,FORMAT[+][:BYTEORDER][,NAME[,HDD|SSD]]` or `N,FORMAT[:BYTEORDER][,NAME]`
    /// and merge it at `priority`.
    pub fn parse(&mut self, spec: &str, priority: Priority) -> Result<()> {
        let bad = || SmartError::AttrDef(spec.to_string());
        let opt = LEGACY_ALIASES
            .iter()
            .find(|(old, _)| *old == spec)
            .map(|(_, new)| *new)
            .unwrap_or(spec);

        let parts: Vec<&str> = opt.split(',').collect();
        let all_ids = parts[0] == "N";
        let (id, fmt, name, hddssd) = if all_ids {
            if !(2..=3).contains(&parts.len()) {
                return Err(bad());
            }
            (0usize, parts[1], parts.get(2).copied(), None)
        } else {
            if !(2..=4).contains(&parts.len()) {
                return Err(bad());
            }
            let id: usize = parts[0].trim().parse().map_err(|_| bad())?;
            if !(1..=255).contains(&id) {
                return Err(bad());
            }
            if parts.len() == 4 && priority != Priority::Default {
                return Err(bad());
            }
            (id, parts[1], parts.get(2).copied(), parts.get(3).copied())
        };
        if !field_ok(fmt) || name.is_some_and(|n| !field_ok(n)) {
            return Err(bad());
        }

        let mut flags = AttrFlags::default();
        let fmt = match fmt.strip_suffix('+') {
            Some(f) => {
                flags.insert(AttrFlags::INCREASING);
                f
            }
            None => fmt,
        };

        let (fmt, byteorder) = match fmt.split_once(':') {
            Some((f, order)) => {
                if priority == Priority::Default {
                    return Err(bad());
                }
                let valid = order.chars().all(|c| "012345rvwz".contains(c));
                if f.is_empty() || order.is_empty() || order.len() > 8 || !valid {
                    return Err(bad());
                }
                if order.contains('v') {
                    flags.insert(AttrFlags::NO_NORMVAL);
                    flags.insert(AttrFlags::NO_WORSTVAL);
                }
                if order.contains('w') {
                    flags.insert(AttrFlags::NO_WORSTVAL);
                }
                (f, order)
            }
            None => (fmt, ""),
        };

        let format = RawFormat::parse(fmt).ok_or_else(bad)?;
        if byteorder.is_empty() && matches!(format, RawFormat::Raw64 | RawFormat::Hex64) {
            flags.insert(AttrFlags::NO_NORMVAL);
            flags.insert(AttrFlags::NO_WORSTVAL);
        }

        match hddssd {
            Some("HDD") => flags.insert(AttrFlags::HDD_ONLY),
            Some("SSD") => flags.insert(AttrFlags::SSD_ONLY),
            Some(_) => return Err(bad()),
            None => {}
        }

        let apply = |def: &mut AttrDef| {
            if let Some(n) = name {
                def.name = n.to_string();
            }
            def.raw_format = format;
            def.priority = priority;
            def.flags = flags;
            def.byteorder = byteorder.to_string();
        };

        if all_ids {
            for def in self.entries.iter_mut().filter(|d| d.priority < priority) {
                apply(def);
            }
        } else if self.entries[id].priority <= priority {
            apply(&mut self.entries[id]);
        }
        Ok(())
    }

    /// Parse a list of definitions at one tier.
    pub fn parse_all<S: AsRef<str>>(&mut self, specs: &[S], priority: Priority) -> Result<()> {
        for s in specs {
            self.parse(s.as_ref(), priority)?;
        }
        Ok(())
    }

    pub fn flags(&self, id: u8) -> AttrFlags {
        self[id].flags
    }

    /// Format after falling back to the built-in table, then raw48.
    pub fn effective_format(&self, id: u8) -> RawFormat {
        match self[id].raw_format {
            RawFormat::Default => match AttrDefs::builtin()[id].raw_format {
                RawFormat::Default => RawFormat::Raw48,
                f => f,
            },
            f => f,
        }
    }
}

// ── Raw values ───────────────────────────────────────────────────────

/// Assemble the raw value from the bytes named by the byte order.
pub fn raw_value(attr: &Attribute, defs: &AttrDefs) -> u64 {
    let def = &defs[attr.id];
    let order = if def.byteorder.is_empty() { def.raw_format.default_byteorder() } else { def.byteorder.as_str() };
    order.chars().fold(0u64, |v, c| {
        let b = match c {
            '0'..='5' => attr.raw[c as usize - '0' as usize],
            'r' => attr.reserved,
            'v' => attr.current,
            'w' => attr.worst,
            _ => 0,
        };
        (v << 8) | b as u64
    })
}

fn check_temp_word(word: u32) -> u8 {
    if word <= 0x7f {
        0x11
    } else if word <= 0xff {
        0x01
    } else if 0xff80 <= word {
        0x10
    } else {
        0x00
    }
}

/// Min/max candidates must bracket the current value within -60..=120.
fn check_temp_range(t: i32, b1: u8, b2: u8) -> Option<(i32, i32)> {
    let (mut t1, mut t2) = (b1 as i8 as i32, b2 as i8 as i32);
    if t1 > t2 {
        std::mem::swap(&mut t1, &mut t2);
    }
    if -60 <= t1 && t1 <= t && t <= t2 && t2 <= 120 && !(t1 == -1 && t2 <= 0) {
        Some((t1, t2))
    } else {
        None
    }
}

fn format_temp_minmax(raw: &[u8; 6], word: &[u32; 3]) -> String {
    let t = raw[0] as i8 as i32;
    let ctw0 = check_temp_word(word[0]);
    let found = if word[2] == 0 {
        if word[1] == 0 && ctw0 != 0 {
            Some((None, None))
        } else if let Some(r) = check_temp_range(t, raw[2], raw[3]).filter(|_| ctw0 != 0) {
            Some((Some(r), None))
        } else if let Some(r) = check_temp_range(t, raw[1], raw[2]).filter(|_| raw[3] == 0) {
            Some((Some(r), None))
        } else {
            None
        }
    } else if ctw0 != 0 {
        let all_words = ctw0 & check_temp_word(word[1]) & check_temp_word(word[2]) != 0;
        let spread = check_temp_range(t, raw[2], raw[4]).filter(|_| all_words);
        spread.map(|r| (Some(r), None)).or_else(|| {
            check_temp_range(t, raw[2], raw[3])
                .filter(|(_, hi)| word[2] < 0x7fff && *hi >= 40)
                .map(|r| (Some(r), Some(word[2])))
        })
    } else {
        None
    };

    match found {
        Some((None, _)) => format!("{}", t),
        Some((Some((lo, hi)), None)) => format!("{} (Min/Max {}/{})", t, lo, hi),
        Some((Some((lo, hi)), Some(count))) => format!("{} (Min/Max {}/{} #{})", t, lo, hi, count),
        None => format!("{} ({} {} {} {} {})", raw[0], raw[5], raw[4], raw[3], raw[2], raw[1]),
    }
}

/// Render the raw value the way the attribute's format asks for.
pub fn format_raw_value(attr: &Attribute, defs: &AttrDefs) -> String {
    let v = raw_value(attr, defs);
    let mut raw = [0u8; 6];
    for (i, b) in raw.iter_mut().enumerate() {
        *b = (v >> (8 * i)) as u8;
    }
    let word = [
        raw[0] as u32 | (raw[1] as u32) << 8,
        raw[2] as u32 | (raw[3] as u32) << 8,
        raw[4] as u32 | (raw[5] as u32) << 8,
    ];

    match defs.effective_format(attr.id) {
        RawFormat::Raw8 => format!("{} {} {} {} {} {}", raw[5], raw[4], raw[3], raw[2], raw[1], raw[0]),
        RawFormat::Raw16 => format!("{} {} {}", word[2], word[1], word[0]),
        RawFormat::Raw48 | RawFormat::Raw56 | RawFormat::Raw64 | RawFormat::Default => v.to_string(),
        RawFormat::Hex48 => format!("0x{:012x}", v),
        RawFormat::Hex56 => format!("0x{:014x}", v),
        RawFormat::Hex64 => format!("0x{:016x}", v),
        RawFormat::Raw16OptRaw16 => {
            let mut s = word[0].to_string();
            if word[1] != 0 || word[2] != 0 {
                s += &format!(" ({} {})", word[2], word[1]);
            }
            s
        }
        RawFormat::Raw16OptAvg16 => {
            let mut s = word[0].to_string();
            if word[1] != 0 {
                s += &format!(" (Average {})", word[1]);
            }
            s
        }
        RawFormat::Raw24OptRaw8 => {
            let mut s = (v & 0x00ff_ffff).to_string();
            if raw[3] != 0 || raw[4] != 0 || raw[5] != 0 {
                s += &format!(" ({} {} {})", raw[5], raw[4], raw[3]);
            }
            s
        }
        RawFormat::Raw24DivRaw24 => format!("{}/{}", (v >> 24) as u32, v & 0x00ff_ffff),
        RawFormat::Raw24DivRaw32 => format!("{}/{}", (v >> 32) as u32, v & 0xffff_ffff),
        RawFormat::Min2Hour => {
            let minutes = word[0] as u64 + ((word[1] as u64) << 16);
            let mut s = format!("{}h+{:02}m", minutes / 60, minutes % 60);
            if word[2] != 0 {
                s += &format!(" ({})", word[2]);
            }
            s
        }
        RawFormat::Sec2Hour => {
            let hours = v / 3600;
            let minutes = (v - 3600 * hours) / 60;
            format!("{}h+{:02}m+{:02}s", hours, minutes, v % 60)
        }
        RawFormat::HalfMin2Hour => {
            let hours = v / 120;
            format!("{}h+{:02}m", hours, (v - 120 * hours) / 2)
        }
        RawFormat::Msec24Hour32 => {
            let hours = (v & 0xffff_ffff) as u32;
            let ms = (v >> 32) as u32;
            let secs = ms / 1000;
            format!("{}h+{:02}m+{:02}.{:03}s", hours, secs / 60, secs % 60, ms % 1000)
        }
        RawFormat::TempMinMax => format_temp_minmax(&raw, &word),
        RawFormat::Temp10x => format!("{}.{}", word[0] / 10, word[0] % 10),
    }
}

/// Display name for an id: override, then built-in, then an
/// "unknown" name that respects the HDD/SSD markers.
pub fn attribute_name(id: u8, defs: &AttrDefs, is_ssd: Option<bool>) -> String {
    if !defs[id].name.is_empty() {
        return defs[id].name.clone();
    }
    let def = &AttrDefs::builtin()[id];
    if def.name.is_empty() {
        "Unknown_Attribute".to_string()
    } else if def.flags.contains(AttrFlags::HDD_ONLY) && is_ssd == Some(true) {
        "Unknown_SSD_Attribute".to_string()
    } else if def.flags.contains(AttrFlags::SSD_ONLY) && is_ssd == Some(false) {
        "Unknown_HDD_Attribute".to_string()
    } else {
        def.name.clone()
    }
}

/// Current temperature in Celsius from ids 194, 190, 9, 220, in that order.
pub fn temperature(values: &SmartValues, defs: &AttrDefs) -> Option<u8> {
    for id in [194u8, 190, 9, 220] {
        let format = defs[id].raw_format;
        let usable = ((id == 194 || id == 190) && format == RawFormat::Default)
            || matches!(format, RawFormat::TempMinMax | RawFormat::Temp10x);
        if !usable {
            continue;
        }
        let Some((_, attr)) = values.find_attribute(id) else { continue };
        let raw = raw_value(attr, defs);
        let temp = if format == RawFormat::Temp10x {
            ((raw as u16 as u32 + 5) / 10) as u32
        } else {
            raw as u8 as u32
        };
        if 0 < temp && temp < 128 {
            return Some(temp as u8);
        }
    }
    None
}

/// Pending-sector id for current (197) or offline (198) sectors, and
/// whether only increases should be reported. Id 0 when a vendor
/// definition has renamed the attribute to something else.
pub fn unc_attr_id(offline: bool, defs: &AttrDefs) -> (u8, bool) {
    let id = if offline { 198 } else { 197 };
    let def = &defs[id];
    if def.flags.contains(AttrFlags::INCREASING) {
        (id, true)
    } else if def.name.is_empty() || (offline && def.name == "Offline_Scan_UNC_SectCt") {
        (id, false)
    } else {
        (0, false)
    }
}
