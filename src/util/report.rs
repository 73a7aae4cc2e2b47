use std::fmt;

use chrono::TimeZone;

use crate::attrdefs::{attribute_name, format_raw_value, AttrDefs};
use crate::classifier::{attr_states, health_verdict, AttrState};
use crate::codec::identify::RotationRate;
use crate::codec::{ChecksumPolicy, FirmwareBug, FirmwareBugs};
use crate::error::Result;
use crate::logs::errors::{decode_error_log, decode_ext_error_log};
use crate::logs::sct::{history_lines, history_samples, status_report};
use crate::logs::selftest::{decode_ext_self_test_log, decode_self_test_log, SelfTestReport};
use crate::logs::LogIndexing;
use crate::transport::{Transport, LOG_EXT_ERROR, LOG_EXT_SELF_TEST};
use crate::util::human::{fmt_capacity, fmt_thousands};
use crate::vendordb::VendorDb;

/// Decoding settings for [`inspect`].
#[derive(Debug, Clone, Default)]
pub struct InspectOptions {
    /// User-tier definitions; a matching preset merges below them.
    pub attribute_defs: AttrDefs,
    pub firmware_bugs:  FirmwareBugs,
    pub checksum:       ChecksumPolicy,
    pub indexing:       LogIndexing,
    /// Skip word-swapping of the identify strings.
    pub raw_strings:    bool,
}

fn section(out: &mut String, title: &str) {
    out.push_str(&format!("\n=== {} ===\n", title));
}

fn self_test_section(out: &mut String, report: &SelfTestReport) {
    if report.entries.is_empty() {
        out.push_str("No self-tests have been logged.\n");
        return;
    }
    out.push_str("Num  Test_Description    Status                  Remaining  LifeTime(hours)  LBA_of_first_error\n");
    for e in &report.entries {
        out.push_str(&format!("{}\n", e));
    }
    if report.outdated > 0 {
        out.push_str(&format!(
            "{} of {} failed self-tests are outdated by newer successful extended offline self-test #{}\n",
            report.outdated,
            report.failures(),
            report.ext_ok_number.unwrap_or(0)
        ));
    }
}

/// Read and decode everything the device offers into a text report.
/// Only a failing IDENTIFY is an error; other reads are noted inline.
pub fn inspect<Tz: TimeZone>(
    dev: &mut dyn Transport,
    db: &VendorDb,
    opts: &InspectOptions,
    now: i64,
    tz: &Tz,
) -> Result<String>
where
    Tz::Offset: fmt::Display,
{
    let mut out = String::new();
    let id = dev.identify()?;
    let swap = |bugs: FirmwareBugs| !opts.raw_strings && !bugs.is_set(FirmwareBug::NoSwap);
    let mut strings = id.strings(swap(opts.firmware_bugs));
    let mut defs = opts.attribute_defs.clone();
    let mut bugs = opts.firmware_bugs;

    section(&mut out, "START OF INFORMATION SECTION");
    if let Some(p) = db.lookup(&strings.model, &strings.firmware) {
        p.apply(&mut defs, &mut bugs)?;
        if !swap(bugs) {
            strings = id.strings(false);
        }
        out.push_str(&format!("Model Family:     {}\n", p.family));
        if let Some(w) = &p.warning {
            out.push_str(&format!("WARNING: {}\n", w));
        }
    }
    out.push_str(&format!("Device Model:     {}\n", strings.model));
    out.push_str(&format!("Serial Number:    {}\n", strings.serial));
    if let Some(w) = id.wwn() {
        out.push_str(&format!("LU WWN Device Id: {:x} {:06x} {:09x}\n", w >> 60, (w >> 36) & 0xff_ffff, w & 0xf_ffff_ffff));
    }
    out.push_str(&format!("Firmware Version: {}\n", strings.firmware));
    let cap = id.capacity_bytes();
    out.push_str(&format!("User Capacity:    {} bytes [{}]\n", fmt_thousands(cap), fmt_capacity(cap)));
    let sizes = id.sector_sizes();
    if sizes.logical == sizes.physical {
        out.push_str(&format!("Sector Size:      {} bytes logical/physical\n", sizes.logical));
    } else {
        out.push_str(&format!("Sector Sizes:     {} bytes logical, {} bytes physical\n", sizes.logical, sizes.physical));
    }
    match id.rotation_rate() {
        RotationRate::SolidState => out.push_str("Rotation Rate:    Solid State Device\n"),
        RotationRate::Rpm(r) => out.push_str(&format!("Rotation Rate:    {} rpm\n", r)),
        RotationRate::Reserved(r) => out.push_str(&format!("Rotation Rate:    Unknown (0x{:04x})\n", r)),
        RotationRate::Unknown => {}
    }
    if id.major_version() > 0 {
        out.push_str(&format!("ATA Version is:   ATA{}\n", id.major_version()));
    }
    let support = match (id.smart_supported(), id.smart_enabled()) {
        (Some(false), _) => "Unavailable - device lacks SMART capability.",
        (_, Some(true)) => "Available - device has SMART capability. Enabled",
        (_, Some(false)) => "Available - device has SMART capability. Disabled",
        (_, None) => "Ambiguous - ATA IDENTIFY DEVICE words 82-83 don't show if SMART supported.",
    };
    out.push_str(&format!("SMART support is: {}\n", support));

    section(&mut out, "START OF READ SMART DATA SECTION");
    let values = dev.smart_values(opts.checksum);
    let thresholds = dev.thresholds(opts.checksum).ok();
    let status = dev.return_status().ok();
    let verdict = health_verdict(status, values.as_ref().ok(), thresholds.as_ref(), &defs);
    out.push_str(&format!(
        "SMART overall-health self-assessment test result: {}\n",
        verdict.map(|v| v.label()).unwrap_or("UNKNOWN")
    ));

    match (&values, &thresholds) {
        (Ok(v), thr) => {
            let empty = Default::default();
            let thr = thr.as_ref().unwrap_or(&empty);
            out.push_str("\nID# ATTRIBUTE_NAME          FLAG     VALUE WORST THRESH TYPE     UPDATED  WHEN_FAILED RAW_VALUE\n");
            for (a, state, t) in attr_states(v, thr, &defs) {
                let (value, worst) = if state == AttrState::NoNormval {
                    ("---".to_string(), "---".to_string())
                } else {
                    (format!("{:03}", a.current), format!("{:03}", a.worst))
                };
                let thresh = match t {
                    Some(t) if state != AttrState::NoNormval => format!("{:03}", t),
                    _ => "---".into(),
                };
                out.push_str(&format!(
                    "{:3} {:<24}0x{:04x}   {:<5} {:<5} {:<6} {:<8} {:<8} {:<11} {}\n",
                    a.id,
                    attribute_name(a.id, &defs, id.is_ssd()),
                    a.flags,
                    value,
                    worst,
                    thresh,
                    if a.prefailure() { "Pre-fail" } else { "Old_age" },
                    if a.online() { "Always" } else { "Offline" },
                    state.label(),
                    format_raw_value(a, &defs),
                ));
            }
        }
        (Err(e), _) => out.push_str(&format!("Read SMART Data failed: {}\n", e)),
    }

    let gp_dir = if id.gp_logging_supported() { dev.log_directory(true).ok() } else { None };

    section(&mut out, "SMART Error Log");
    let xsectors = gp_dir.as_ref().map_or(0, |d| d.sectors(LOG_EXT_ERROR));
    let decoded = if xsectors > 0 {
        dev.ext_error_log(xsectors, bugs, opts.checksum)
            .and_then(|l| decode_ext_error_log(&l, opts.indexing.ext_error_log))
    } else {
        dev.error_log(bugs, opts.checksum)
            .and_then(|l| decode_error_log(&l, bugs, opts.indexing.error_log))
    };
    match decoded {
        Ok(r) => {
            for w in &r.warnings {
                out.push_str(&format!("Warning: {}\n", w));
            }
            if r.count == 0 {
                out.push_str("No Errors Logged\n");
            } else {
                out.push_str(&format!("ATA Error Count: {}\n", r.count));
                for e in &r.entries {
                    out.push_str(&format!("{}\n", e));
                }
            }
        }
        Err(e) => out.push_str(&format!("Read SMART Error Log failed: {}\n", e)),
    }

    section(&mut out, "SMART Self-test Log");
    let xsectors = gp_dir.as_ref().map_or(0, |d| d.sectors(LOG_EXT_SELF_TEST));
    let decoded = if xsectors > 0 {
        dev.ext_self_test_log(xsectors, opts.checksum)
            .and_then(|l| decode_ext_self_test_log(&l, opts.indexing.ext_self_test_log))
    } else {
        dev.self_test_log(bugs, opts.checksum)
            .and_then(|l| decode_self_test_log(&l, opts.indexing.self_test_log))
    };
    match decoded {
        Ok(r) => self_test_section(&mut out, &r),
        Err(e) => out.push_str(&format!("Read SMART Self-test Log failed: {}\n", e)),
    }

    if let Ok(sel) = dev.selective_log(opts.checksum) {
        section(&mut out, "SMART Selective self-test log");
        out.push_str(" SPAN  MIN_LBA  MAX_LBA\n");
        for (i, s) in sel.spans.iter().enumerate() {
            out.push_str(&format!("    {}  {:>7}  {:>7}\n", i + 1, s.start, s.end));
        }
        out.push_str(&format!(
            "After scanning selected spans, {} scan remainder of disk.\n",
            if sel.scan_after_spans() { "" } else { "do NOT" }
        ));
    }

    if id.sct_supported() {
        if let Ok(sts) = dev.sct_status() {
            section(&mut out, "SCT Status");
            for l in status_report(&sts) {
                out.push_str(&format!("{}\n", l));
            }
        }
        if id.sct_data_table_supported() {
            if let Ok(h) = dev.sct_temp_history() {
                section(&mut out, "SCT Temperature History");
                match history_samples(&h, now, opts.indexing.sct_history) {
                    Ok(samples) => {
                        out.push_str(&format!("Logging Interval: {} minutes\n", h.interval));
                        out.push_str("Index    Estimated Time   Temperature Celsius\n");
                        for l in history_lines(&samples, tz) {
                            out.push_str(&format!("{}\n", l));
                        }
                    }
                    Err(e) => out.push_str(&format!("{}\n", e)),
                }
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::identify::tests::sample_words;
    use crate::codec::identify::Identify;
    use crate::codec::values::tests::attr;
    use crate::codec::values::SmartValues;
    use crate::transport::{ImageTransport, Page};
    use chrono::Utc;

    #[test]
    fn report_covers_identity_health_and_attributes() {
        let mut v = SmartValues::default();
        v.attributes[0] = attr(5, 0x0033, 100, 100, 0);
        v.attributes[1] = attr(194, 0x0022, 36, 20, 36);
        let mut dev = ImageTransport::new("img")
            .with_page(Page::Identify, Identify::from_words(sample_words()).to_bytes())
            .with_page(Page::ReturnStatus, vec![0x4f, 0xc2]);
        dev.set_values(&v);

        let text = inspect(&mut dev, &VendorDb::default(), &InspectOptions::default(), 0, &Utc).unwrap();
        assert!(text.contains("Device Model:     WDC WD10EFRX-68FYTN0"));
        assert!(text.contains("User Capacity:    1,000,204,886,016 bytes [1.00 TB]"));
        assert!(text.contains("Sector Sizes:     512 bytes logical, 4096 bytes physical"));
        assert!(text.contains("Rotation Rate:    5400 rpm"));
        assert!(text.contains("SMART overall-health self-assessment test result: PASSED"));
        assert!(text.contains("Reallocated_Sector_Ct"));
        assert!(text.contains("Read SMART Error Log failed"));
    }

    #[test]
    fn missing_identify_is_an_error() {
        let mut dev = ImageTransport::new("empty");
        assert!(inspect(&mut dev, &VendorDb::default(), &InspectOptions::default(), 0, &Utc).is_err());
    }
}
