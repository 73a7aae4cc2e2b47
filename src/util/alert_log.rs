use crate::alerts::Event;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

pub fn log_path() -> Option<PathBuf> {
    dirs::data_local_dir().map(|p| p.join("smartwatch").join("events.log"))
}

/// Append events to the persistent log file.
pub fn append(events: &[Event]) {
    if events.is_empty() { return; }
    let Some(path) = log_path() else { return };
    let now = chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
    if let Err(e) = append_to(&path, events, &now) {
        tracing::warn!("{}: {}", path.display(), e);
    }
}

pub fn append_to(path: &Path, events: &[Event], stamp: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    for ev in events {
        writeln!(file, "{} {}", stamp, ev.line())?;
    }
    Ok(())
}

/// Last `n` lines of the event log, oldest first.
pub fn load_recent(n: usize) -> Vec<String> {
    log_path().map(|p| tail(&p, n)).unwrap_or_default()
}

pub fn tail(path: &Path, n: usize) -> Vec<String> {
    let Ok(text) = fs::read_to_string(path) else { return Vec::new() };
    let lines: Vec<&str> = text.lines().filter(|l| !l.is_empty()).collect();
    lines[lines.len().saturating_sub(n)..].iter().map(|l| l.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_then_tail() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sub").join("events.log");
        let evs = vec![
            Event::info("sda", "Device: sda, initial Temperature is 35 Celsius (Min/Max ??/35)"),
            Event::critical("sda", "Device: sda, ATA error count increased from 0 to 1"),
        ];
        append_to(&path, &evs, "2024-01-02 03:04:05").unwrap();
        append_to(&path, &evs[..1], "2024-01-02 03:34:05").unwrap();

        let last = tail(&path, 2);
        assert_eq!(last.len(), 2);
        assert_eq!(last[0], "2024-01-02 03:04:05 [CRIT] Device: sda, ATA error count increased from 0 to 1");
        assert!(last[1].starts_with("2024-01-02 03:34:05 [INFO]"));
        assert_eq!(tail(&path, 10).len(), 3);
        assert!(tail(&dir.path().join("none.log"), 5).is_empty());
    }
}
