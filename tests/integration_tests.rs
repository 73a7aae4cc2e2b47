/*
 * Integration tests for smartwatch
 *
 * These drive the public API the way the binary does: captured device
 * images on disk, a TOML configuration, registration and monitoring
 * passes with state kept in a temporary directory.
 */

use std::path::Path;

use chrono::Utc;
use smartwatch::alerts::{worst, Event, Severity};
use smartwatch::codec::identify::Identify;
use smartwatch::codec::values::{Attribute, SmartValues, Threshold, Thresholds};
use smartwatch::config::{Config, PresetConfig};
use smartwatch::monitor::DeviceMonitor;
use smartwatch::transport::{ImageTransport, Page};
use smartwatch::util::report::{inspect, InspectOptions};
use smartwatch::vendordb::VendorDb;

const T0: i64 = 1_700_000_000;

// Test utilities
fn put_text(words: &mut [u16; 256], first: usize, count: usize, text: &str) {
    let mut bytes = text.as_bytes().to_vec();
    bytes.resize(count * 2, b' ');
    for i in 0..count {
        words[first + i] = (bytes[2 * i] as u16) << 8 | bytes[2 * i + 1] as u16;
    }
}

fn identify_words() -> [u16; 256] {
    let mut w = [0u16; 256];
    put_text(&mut w, 10, 10, "  WD-WCC4N1234567");
    put_text(&mut w, 23, 4, "82.00A82");
    put_text(&mut w, 27, 20, "WDC WD10EFRX-68FYTN0");
    w[49] = 0x0200;
    w[80] = 0x01f0;
    w[82] = 0x4001;
    w[83] = 0x4400;
    w[84] = 0x4000;
    w[85] = 0x0001;
    w[87] = 0x4000;
    let sectors: u64 = 1_953_525_168;
    w[100] = sectors as u16;
    w[101] = (sectors >> 16) as u16;
    w[102] = (sectors >> 32) as u16;
    w[217] = 5400;
    w
}

fn attr(id: u8, flags: u16, current: u8, raw: u64) -> Attribute {
    let mut bytes = [0u8; 6];
    bytes.copy_from_slice(&raw.to_le_bytes()[..6]);
    Attribute { id, flags, current, worst: current, raw: bytes, reserved: 0 }
}

fn values(pending: u64) -> SmartValues {
    let mut v = SmartValues::default();
    v.attributes[0] = attr(1, 0x000f, 200, 0);
    v.attributes[1] = attr(5, 0x0033, 200, 0);
    v.attributes[2] = attr(9, 0x0032, 90, 8000);
    v.attributes[3] = attr(194, 0x0022, 115, 35);
    v.attributes[4] = attr(197, 0x0032, 200, pending);
    v.attributes[5] = attr(198, 0x0030, 200, 0);
    v
}

fn image(pending: u64) -> ImageTransport {
    let mut thr = Thresholds::default();
    thr.entries[0] = Threshold { id: 1, threshold: 51 };
    thr.entries[1] = Threshold { id: 5, threshold: 140 };
    let mut t = ImageTransport::new("sda")
        .with_page(Page::Identify, Identify::from_words(identify_words()).to_bytes())
        .with_page(Page::ReturnStatus, vec![0x4f, 0xc2]);
    t.set_values(&values(pending));
    t.set_thresholds(&thr);
    t
}

fn has(events: &[Event], needle: &str) -> bool {
    events.iter().any(|e| e.message.contains(needle))
}

fn config_for(image_dir: &Path, state_dir: &Path) -> Config {
    let text = format!(
        r#"
[general]
check_interval_sec = 600
state_dir = '{}'

[[devices]]
name = "sda"
image = '{}'
tempcrit = 60
"#,
        state_dir.display(),
        image_dir.display()
    );
    Config::parse(&text).unwrap()
}

#[test]
fn saved_image_registers_against_builtin_presets() {
    let dir = tempfile::tempdir().unwrap();
    image(0).save(dir.path()).unwrap();
    assert!(dir.path().join("identify.bin").exists());

    let mut dev = ImageTransport::open("sda", dir.path()).unwrap();
    let db = VendorDb::from_config(&PresetConfig::defaults()).unwrap();
    let cfg = Config::parse("[[devices]]\nname = \"sda\"\n").unwrap();
    let d = cfg.devices[0].directives(&cfg.general).unwrap();
    let (m, events) = DeviceMonitor::register(d, &mut dev, &db, None, T0).unwrap();

    assert!(has(&events, "found in smartd database: Western Digital Red"));
    assert_eq!(m.info().model, "WDC WD10EFRX-68FYTN0");
    assert_eq!(m.info().serial, "WD-WCC4N1234567");
    assert_eq!(m.info().is_ssd, Some(false));
}

#[test]
fn configured_device_is_monitored_and_state_persisted() {
    let images = tempfile::tempdir().unwrap();
    let state = tempfile::tempdir().unwrap();
    image(0).save(images.path()).unwrap();

    let cfg = config_for(images.path(), state.path());
    assert_eq!(cfg.general.resolved_state_dir().as_deref(), Some(state.path()));
    let db = VendorDb::from_config(&cfg.presets).unwrap();
    let d = cfg.devices[0].directives(&cfg.general).unwrap();
    assert_eq!(d.check_interval, 600);

    let mut dev = ImageTransport::open("sda", images.path()).unwrap();
    let (mut m, _) = DeviceMonitor::register(d.clone(), &mut dev, &db, Some(state.path()), T0).unwrap();
    let events = m.check(&mut dev, T0 + 600, &Utc, true);
    assert_ne!(worst(&events), Some(Severity::Critical));

    // The disk grows pending sectors between passes.
    image(8).save(images.path()).unwrap();
    let mut dev = ImageTransport::open("sda", images.path()).unwrap();
    let events = m.check(&mut dev, T0 + 1200, &Utc, true);
    assert!(has(&events, "Device: sda, 8 Currently unreadable (pending) sectors"));
    assert_eq!(worst(&events), Some(Severity::Critical));

    m.flush().unwrap();
    let path = m.state_path().unwrap().to_path_buf();
    assert!(path.starts_with(state.path()));
    let saved = std::fs::read_to_string(&path).unwrap();
    assert!(saved.contains("ata-smart-attribute.4.raw = 8"));

    let (again, events) = DeviceMonitor::register(d, &mut dev, &db, Some(state.path()), T0 + 1800).unwrap();
    assert!(has(&events, "state read from"));
    assert_eq!(again.state().attributes[4].id, 197);
}

#[test]
fn vanished_image_reports_open_failure() {
    let images = tempfile::tempdir().unwrap();
    image(0).save(images.path()).unwrap();
    let cfg = config_for(images.path(), images.path());
    let d = cfg.devices[0].directives(&cfg.general).unwrap();
    let mut dev = ImageTransport::open("sda", images.path()).unwrap();
    let (mut m, _) = DeviceMonitor::register(d, &mut dev, &VendorDb::default(), None, T0).unwrap();

    let missing = images.path().join("gone");
    let err = ImageTransport::open("sda", &missing).unwrap_err();
    let events = m.open_failed(&err.to_string(), T0 + 600);
    assert_eq!(events.len(), 1);
    assert!(events[0].message.starts_with("Device: sda, open() failed: "));
    assert_eq!(events[0].severity, Severity::Critical);
}

#[test]
fn inspect_reads_a_saved_image() {
    let dir = tempfile::tempdir().unwrap();
    image(0).save(dir.path()).unwrap();
    let mut dev = ImageTransport::open("sda", dir.path()).unwrap();
    let db = VendorDb::from_config(&PresetConfig::defaults()).unwrap();
    let text = inspect(&mut dev, &db, &InspectOptions::default(), T0, &Utc).unwrap();
    assert!(text.contains("Model Family:     Western Digital Red"));
    assert!(text.contains("Serial Number:    WD-WCC4N1234567"));
    assert!(text.contains("SMART overall-health self-assessment test result: PASSED"));
    assert!(text.contains("Current_Pending_Sector"));
}
