use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use signal_hook::consts::{SIGHUP, SIGINT, SIGTERM, SIGUSR1};
use signal_hook::flag;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use smartwatch::alerts::{worst, Event, Severity};
use smartwatch::attrdefs::Priority;
use smartwatch::codec::FirmwareBugs;
use smartwatch::config::{Config, DeviceConfig};
use smartwatch::monitor::DeviceMonitor;
use smartwatch::transport::ImageTransport;
use smartwatch::util::human::fmt_capacity;
use smartwatch::util::report::{inspect, InspectOptions};
use smartwatch::util::{alert_log, notify, webhook};
use smartwatch::vendordb::VendorDb;

#[derive(Parser, Debug)]
#[command(name = "smartwatch", about = "SMART disk health monitor", version)]
struct Cli {
    /// Configuration file (default: <config dir>/smartwatch/smartwatch.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log filter, e.g. "debug" (default: RUST_LOG or "info")
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Print config file path and effective values, then exit
    #[arg(long)]
    print_config: bool,

    /// Print the last N event log entries and exit
    #[arg(long, value_name = "N")]
    events: Option<usize>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Decode and print everything a captured device image holds
    Inspect {
        /// Directory of captured pages
        image: PathBuf,
        /// Vendor attribute definition, e.g. "9,minutes" (repeatable)
        #[arg(short = 'v', long = "attribute")]
        attribute_defs: Vec<String>,
        /// Firmware quirk, e.g. "samsung" (repeatable)
        #[arg(short = 'F', long = "firmware-bug")]
        firmware_bugs: Vec<String>,
        /// Do not word-swap the identify strings
        #[arg(long)]
        raw_strings: bool,
    },
    /// One monitoring pass over the configured devices: exit 0=OK, 1=WARNING, 2=CRITICAL
    Check,
    /// Monitor the configured devices until SIGINT/SIGTERM
    Daemon,
    /// List the self-tests scheduled for the next 90 days
    Schedule,
    /// Print shell completions
    Completions {
        shell: clap_complete::Shell,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_level.as_deref());

    if let Some(n) = cli.events {
        return run_events(n);
    }
    if cli.print_config {
        return run_print_config(cli.config.as_deref());
    }
    match cli.command {
        Some(Command::Inspect { image, attribute_defs, firmware_bugs, raw_strings }) => {
            run_inspect(cli.config.as_deref(), &image, &attribute_defs, &firmware_bugs, raw_strings)
        }
        Some(Command::Check) => run_check(cli.config.as_deref()),
        Some(Command::Daemon) => run_daemon(cli.config.as_deref()),
        Some(Command::Schedule) => run_schedule(cli.config.as_deref()),
        Some(Command::Completions { shell }) => {
            clap_complete::generate(shell, &mut Cli::command(), "smartwatch", &mut std::io::stdout());
            Ok(())
        }
        None => {
            Cli::command().print_help()?;
            Ok(())
        }
    }
}

fn init_tracing(level: Option<&str>) {
    let filter = match level {
        Some(l) => EnvFilter::new(l),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

fn run_events(n: usize) -> Result<()> {
    let lines = alert_log::load_recent(n);
    if lines.is_empty() {
        println!("No events in log.");
    }
    for l in lines {
        println!("{}", l);
    }
    Ok(())
}

fn run_print_config(path: Option<&Path>) -> Result<()> {
    let cfg = Config::load(path)?;
    let shown = path
        .map(Path::to_path_buf)
        .or_else(Config::config_path)
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "(unknown)".to_string());
    println!("# Config: {}", shown);
    let state_dir = cfg
        .general
        .resolved_state_dir()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "(none)".into());
    println!("# State directory: {}", state_dir);
    println!();
    print!("{}", cfg.to_toml()?);
    Ok(())
}

fn run_inspect(
    config: Option<&Path>,
    image: &Path,
    attribute_defs: &[String],
    firmware_bugs: &[String],
    raw_strings: bool,
) -> Result<()> {
    let cfg = Config::load(config)?;
    let db = VendorDb::from_config(&cfg.presets).context("drive database")?;
    let mut opts = InspectOptions {
        firmware_bugs: FirmwareBugs::parse_all(firmware_bugs)?,
        checksum: cfg.general.checksum,
        raw_strings,
        ..Default::default()
    };
    opts.attribute_defs.parse_all(attribute_defs, Priority::User)?;
    let name = image.display().to_string();
    let mut dev = ImageTransport::open(name, image).with_context(|| format!("opening image {}", image.display()))?;
    print!("{}", inspect(&mut dev, &db, &opts, now(), &chrono::Local)?);
    Ok(())
}

// ── Fleet ────────────────────────────────────────────────────────────

/// A registered device and the configuration it came from.
struct Tracked {
    monitor: DeviceMonitor,
    cfg:     DeviceConfig,
    /// One-line identity handed to notification sinks.
    summary: String,
}

fn open_device(dc: &DeviceConfig) -> smartwatch::Result<ImageTransport> {
    match &dc.image {
        Some(dir) => ImageTransport::open(dc.name.clone(), dir),
        None => Err(smartwatch::SmartError::Config(format!("device {}: no image directory configured", dc.name))),
    }
}

fn state_dir(cfg: &Config) -> Option<PathBuf> {
    let dir = cfg.general.resolved_state_dir()?;
    match std::fs::create_dir_all(&dir) {
        Ok(()) => Some(dir),
        Err(e) => {
            warn!("{}: {}, state will not be saved", dir.display(), e);
            None
        }
    }
}

/// Register every configured device. Unusable devices are reported as
/// critical events and skipped; a bad configuration is an error.
fn register_all(cfg: &Config, now: i64) -> Result<(Vec<Tracked>, Vec<Event>)> {
    let db = VendorDb::from_config(&cfg.presets).context("drive database")?;
    let dir = state_dir(cfg);
    let mut fleet = Vec::new();
    let mut events = Vec::new();
    for dc in &cfg.devices {
        let directives = dc.directives(&cfg.general).with_context(|| format!("device {}", dc.name))?;
        let registered = open_device(dc)
            .and_then(|mut dev| DeviceMonitor::register(directives, &mut dev, &db, dir.as_deref(), now));
        match registered {
            Ok((monitor, evs)) => {
                let i = monitor.info();
                let summary = format!("{}, S/N:{}, FW:{}, {}", i.model, i.serial, i.firmware, fmt_capacity(i.capacity));
                let t = Tracked { monitor, cfg: dc.clone(), summary };
                deliver(&t, &evs);
                events.extend(evs);
                fleet.push(t);
            }
            Err(e) => {
                let ev = Event::critical(&dc.name, format!("Device: {}, not monitored: {}", dc.name, e));
                ev.trace();
                events.push(ev);
            }
        }
    }
    info!("monitoring {} of {} device(s)", fleet.len(), cfg.devices.len());
    Ok((fleet, events))
}

fn deliver(t: &Tracked, events: &[Event]) {
    let mailed: Vec<&Event> = events.iter().filter(|e| e.mail.is_some()).collect();
    if mailed.is_empty() {
        return;
    }
    notify::exec(&t.cfg.mail.exec, &mailed, &t.summary);
    webhook::notify(&mailed, &t.cfg.mail.webhook_url);
}

fn check_pass(fleet: &mut [Tracked], now: i64, allow_selftests: bool) -> Vec<Event> {
    let mut all = Vec::new();
    for t in fleet.iter_mut() {
        let events = match open_device(&t.cfg) {
            Ok(mut dev) => t.monitor.check(&mut dev, now, &chrono::Local, allow_selftests),
            Err(e) => t.monitor.open_failed(&e.to_string(), now),
        };
        deliver(t, &events);
        all.extend(events);
    }
    all
}

fn flush_all(fleet: &mut [Tracked]) {
    for t in fleet.iter_mut() {
        if let Err(e) = t.monitor.flush() {
            warn!("{}: {}", t.monitor.name(), e);
        }
    }
}

fn run_check(config: Option<&Path>) -> Result<()> {
    let cfg = Config::load(config)?;
    let now = now();
    let (mut fleet, mut events) = register_all(&cfg, now)?;
    events.extend(check_pass(&mut fleet, now, true));
    flush_all(&mut fleet);

    let shown: Vec<&Event> = events.iter().filter(|e| e.severity > Severity::Info).collect();
    if shown.is_empty() {
        println!("OK: {} device(s) checked, no warnings", fleet.len());
    }
    for e in &shown {
        println!("{}", e.line());
    }
    match worst(&events) {
        Some(Severity::Critical) => std::process::exit(2),
        Some(Severity::Warning) => std::process::exit(1),
        _ => Ok(()),
    }
}

fn run_schedule(config: Option<&Path>) -> Result<()> {
    let cfg = Config::load(config)?;
    let now = now();
    let (fleet, _) = register_all(&cfg, now)?;
    for t in &fleet {
        match t.monitor.look_ahead(now, &chrono::Local) {
            Some(plan) => {
                for l in plan.lines(t.monitor.name(), false, &chrono::Local) {
                    println!("{}", l);
                }
            }
            None => println!("Device: {}, no self-tests scheduled", t.monitor.name()),
        }
    }
    Ok(())
}

// ── Daemon ───────────────────────────────────────────────────────────

/// Flags set by the signal handlers and polled by the daemon loop.
#[derive(Default)]
struct SignalFlags {
    check_now: Arc<AtomicBool>,
    reload:    Arc<AtomicBool>,
    terminate: Arc<AtomicBool>,
}

impl SignalFlags {
    fn install() -> Result<Self> {
        let flags = SignalFlags::default();
        flag::register(SIGUSR1, Arc::clone(&flags.check_now)).context("installing SIGUSR1 handler")?;
        flag::register(SIGHUP, Arc::clone(&flags.reload)).context("installing SIGHUP handler")?;
        for sig in [SIGINT, SIGTERM] {
            flag::register(sig, Arc::clone(&flags.terminate)).context("installing termination handler")?;
        }
        Ok(flags)
    }
}

fn run_daemon(config: Option<&Path>) -> Result<()> {
    let signals = SignalFlags::install()?;
    let mut cfg = Config::load(config)?;
    let (mut fleet, events) = register_all(&cfg, now())?;
    alert_log::append(&events);
    info!("smartwatch daemon starting (interval {}s)", cfg.general.check_interval_sec);

    let mut first_pass = true;
    loop {
        let events = check_pass(&mut fleet, now(), !first_pass);
        alert_log::append(&events);
        first_pass = false;

        let deadline = now() + cfg.general.check_interval_sec.max(10) as i64;
        while now() < deadline {
            if signals.terminate.load(Ordering::SeqCst) {
                flush_all(&mut fleet);
                info!("smartwatch is exiting");
                return Ok(());
            }
            if signals.reload.swap(false, Ordering::SeqCst) {
                info!("reloading configuration");
                match Config::load(config) {
                    Ok(new_cfg) => {
                        flush_all(&mut fleet);
                        match register_all(&new_cfg, now()) {
                            Ok((new_fleet, events)) => {
                                alert_log::append(&events);
                                fleet = new_fleet;
                                cfg = new_cfg;
                                first_pass = true;
                            }
                            Err(e) => error!("reload failed, keeping previous configuration: {:#}", e),
                        }
                    }
                    Err(e) => error!("reload failed, keeping previous configuration: {:#}", e),
                }
                break;
            }
            if signals.check_now.swap(false, Ordering::SeqCst) {
                info!("check requested by signal");
                break;
            }
            std::thread::sleep(Duration::from_secs(1));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signals_only_set_flags() {
        let flags = SignalFlags::install().unwrap();
        signal_hook::low_level::raise(SIGUSR1).unwrap();
        assert!(flags.check_now.swap(false, Ordering::SeqCst));
        signal_hook::low_level::raise(SIGHUP).unwrap();
        assert!(flags.reload.load(Ordering::SeqCst));
        assert!(!flags.terminate.load(Ordering::SeqCst));
    }
}
