//! Device access. A transport executes one tagged request at a time; the
//! typed helpers on top of it decode the replies.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

use tracing::{debug, info};

use crate::classifier::{return_status, ReturnStatus};
use crate::codec::errorlog::{ErrorLog, ExtErrorLog};
use crate::codec::identify::Identify;
use crate::codec::logdir::LogDirectory;
use crate::codec::sct::{SctStatus, SctTempHistory};
use crate::codec::selftest::{ExtSelfTestLog, SelectiveLog, SelfTestLog};
use crate::codec::values::{SmartValues, Thresholds};
use crate::codec::{check_sectors, put16, ChecksumPolicy, FirmwareBugs, SECTOR_SIZE};
use crate::error::{Result, SmartError};

// SMART EXECUTE OFF-LINE IMMEDIATE subcommands.
pub const OFFLINE_FULL_SCAN:    u8 = 0x00;
pub const SHORT_SELF_TEST:      u8 = 0x01;
pub const EXTEND_SELF_TEST:     u8 = 0x02;
pub const CONVEYANCE_SELF_TEST: u8 = 0x03;
pub const SELECTIVE_SELF_TEST:  u8 = 0x04;

// Log addresses.
pub const LOG_DIRECTORY:      u8 = 0x00;
pub const LOG_SUMMARY_ERROR:  u8 = 0x01;
pub const LOG_EXT_ERROR:      u8 = 0x03;
pub const LOG_SELF_TEST:      u8 = 0x06;
pub const LOG_EXT_SELF_TEST:  u8 = 0x07;
pub const LOG_SELECTIVE:      u8 = 0x09;
pub const LOG_SCT_STATUS:     u8 = 0xe0;
pub const LOG_SCT_DATA:       u8 = 0xe1;

/// One device command. `gp` selects READ/WRITE LOG EXT instead of the
/// SMART log commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request<'a> {
    Identify,
    ReadValues,
    ReadThresholds,
    ReturnStatus,
    ReadLog { gp: bool, address: u8, page: u16, sectors: u16 },
    WriteLog { gp: bool, address: u8, data: &'a [u8] },
    ExecuteOffline { subcommand: u8 },
}

impl Request<'_> {
    pub fn op_name(&self) -> &'static str {
        match self {
            Request::Identify                       => "IDENTIFY DEVICE",
            Request::ReadValues                     => "SMART READ DATA",
            Request::ReadThresholds                 => "SMART READ THRESHOLDS",
            Request::ReturnStatus                   => "SMART RETURN STATUS",
            Request::ReadLog { gp: false, .. }      => "SMART READ LOG",
            Request::ReadLog { gp: true, .. }       => "READ LOG EXT",
            Request::WriteLog { gp: false, .. }     => "SMART WRITE LOG",
            Request::WriteLog { gp: true, .. }      => "WRITE LOG EXT",
            Request::ExecuteOffline { .. }          => "SMART EXECUTE OFF-LINE IMMEDIATE",
        }
    }
}

/// What came back from the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Data(Vec<u8>),
    /// LBA mid / LBA high output registers.
    Registers { mid: u8, high: u8 },
    Done,
}

fn unexpected(req: &Request<'_>) -> SmartError {
    SmartError::Transport { op: req.op_name().into(), reason: "unexpected reply".into() }
}

/// A device the monitor can talk to. Implementors provide `execute`;
/// everything else is decoding.
pub trait Transport {
    fn name(&self) -> &str;

    fn execute(&mut self, req: &Request<'_>) -> Result<Reply>;

    fn read_data(&mut self, req: Request<'_>, sectors: usize) -> Result<Vec<u8>> {
        match self.execute(&req)? {
            Reply::Data(d) if d.len() >= sectors * SECTOR_SIZE => Ok(d),
            Reply::Data(d) => Err(SmartError::ShortBuffer {
                what:     req.op_name(),
                len:      d.len(),
                expected: sectors * SECTOR_SIZE,
            }),
            _ => Err(unexpected(&req)),
        }
    }

    fn identify(&mut self) -> Result<Identify> {
        let data = self.read_data(Request::Identify, 1)?;
        Identify::from_bytes(&data)
    }

    fn smart_values(&mut self, policy: ChecksumPolicy) -> Result<SmartValues> {
        let data = self.read_data(Request::ReadValues, 1)?;
        check_sectors(&data[..SECTOR_SIZE], "SMART Attribute Data", policy)?;
        SmartValues::from_page(&data)
    }

    fn thresholds(&mut self, policy: ChecksumPolicy) -> Result<Thresholds> {
        let data = self.read_data(Request::ReadThresholds, 1)?;
        check_sectors(&data[..SECTOR_SIZE], "SMART Attribute Thresholds", policy)?;
        Thresholds::from_page(&data)
    }

    fn return_status(&mut self) -> Result<ReturnStatus> {
        let req = Request::ReturnStatus;
        match self.execute(&req)? {
            Reply::Registers { mid, high } => Ok(return_status(mid, high)),
            _ => Err(unexpected(&req)),
        }
    }

    fn read_log(&mut self, gp: bool, address: u8, page: u16, sectors: u16) -> Result<Vec<u8>> {
        let mut data = self.read_data(Request::ReadLog { gp, address, page, sectors }, sectors as usize)?;
        data.truncate(sectors as usize * SECTOR_SIZE);
        Ok(data)
    }

    fn write_log(&mut self, gp: bool, address: u8, data: &[u8]) -> Result<()> {
        self.execute(&Request::WriteLog { gp, address, data })?;
        Ok(())
    }

    fn log_directory(&mut self, gp: bool) -> Result<LogDirectory> {
        let data = self.read_log(gp, LOG_DIRECTORY, 0, 1)?;
        LogDirectory::from_page(&data, gp)
    }

    fn error_log(&mut self, bugs: FirmwareBugs, policy: ChecksumPolicy) -> Result<ErrorLog> {
        let data = self.read_log(false, LOG_SUMMARY_ERROR, 0, 1)?;
        check_sectors(&data, "SMART Error Log", policy)?;
        ErrorLog::from_page(&data, bugs)
    }

    fn ext_error_log(&mut self, sectors: u16, bugs: FirmwareBugs, policy: ChecksumPolicy) -> Result<ExtErrorLog> {
        let data = self.read_log(true, LOG_EXT_ERROR, 0, sectors.max(1))?;
        check_sectors(&data, "Extended Comprehensive SMART Error Log", policy)?;
        ExtErrorLog::from_sectors(&data, bugs)
    }

    fn self_test_log(&mut self, bugs: FirmwareBugs, policy: ChecksumPolicy) -> Result<SelfTestLog> {
        let data = self.read_log(false, LOG_SELF_TEST, 0, 1)?;
        check_sectors(&data, "SMART Self-Test Log", policy)?;
        SelfTestLog::from_page(&data, bugs)
    }

    fn ext_self_test_log(&mut self, sectors: u16, policy: ChecksumPolicy) -> Result<ExtSelfTestLog> {
        let data = self.read_log(true, LOG_EXT_SELF_TEST, 0, sectors.max(1))?;
        check_sectors(&data, "Extended Self-test Log", policy)?;
        ExtSelfTestLog::from_sectors(&data)
    }

    fn selective_log(&mut self, policy: ChecksumPolicy) -> Result<SelectiveLog> {
        let data = self.read_log(false, LOG_SELECTIVE, 0, 1)?;
        check_sectors(&data, "SMART Selective Self-Test Log", policy)?;
        SelectiveLog::from_page(&data)
    }

    fn write_selective_log(&mut self, log: &SelectiveLog) -> Result<()> {
        self.write_log(false, LOG_SELECTIVE, &log.to_page())
    }

    fn sct_status(&mut self) -> Result<SctStatus> {
        let data = self.read_log(false, LOG_SCT_STATUS, 0, 1)?;
        SctStatus::from_page(&data)
    }

    /// Issue SCT DATA TABLE (read temperature history) and fetch the table.
    fn sct_temp_history(&mut self) -> Result<SctTempHistory> {
        let mut cmd = vec![0u8; SECTOR_SIZE];
        put16(&mut cmd, 0, 5);
        put16(&mut cmd, 2, 1);
        put16(&mut cmd, 4, 2);
        self.write_log(false, LOG_SCT_STATUS, &cmd)?;
        let data = self.read_log(false, LOG_SCT_DATA, 0, 1)?;
        SctTempHistory::from_page(&data)
    }

    fn start_test(&mut self, subcommand: u8) -> Result<()> {
        self.execute(&Request::ExecuteOffline { subcommand })?;
        Ok(())
    }
}

// ── Image transport ──────────────────────────────────────────────────

/// Addressable pages of a captured device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Page {
    Identify,
    SmartData,
    Thresholds,
    ReturnStatus,
    Log { gp: bool, address: u8 },
}

impl Page {
    pub fn file_name(&self) -> String {
        match self {
            Page::Identify               => "identify.bin".into(),
            Page::SmartData              => "smart-data.bin".into(),
            Page::Thresholds             => "thresholds.bin".into(),
            Page::ReturnStatus           => "status.bin".into(),
            Page::Log { gp: false, address } => format!("smart-log-{:02x}.bin", address),
            Page::Log { gp: true, address }  => format!("gp-log-{:02x}.bin", address),
        }
    }

    fn from_file_name(name: &str) -> Option<Page> {
        let log = |rest: &str| u8::from_str_radix(rest.strip_suffix(".bin")?, 16).ok();
        match name {
            "identify.bin"   => Some(Page::Identify),
            "smart-data.bin" => Some(Page::SmartData),
            "thresholds.bin" => Some(Page::Thresholds),
            "status.bin"     => Some(Page::ReturnStatus),
            n => {
                if let Some(rest) = n.strip_prefix("smart-log-") {
                    log(rest).map(|address| Page::Log { gp: false, address })
                } else if let Some(rest) = n.strip_prefix("gp-log-") {
                    log(rest).map(|address| Page::Log { gp: true, address })
                } else {
                    None
                }
            }
        }
    }
}

/// Serves a device from captured pages, either loaded from a directory
/// or built in memory. Writes land in memory; test launches are recorded.
#[derive(Debug, Clone, Default)]
pub struct ImageTransport {
    name:    String,
    pages:   HashMap<Page, Vec<u8>>,
    failing: HashSet<&'static str>,
    started: Vec<u8>,
    writes:  Vec<(Page, Vec<u8>)>,
}

impl ImageTransport {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Default::default() }
    }

    /// Load every recognised `*.bin` page file in `dir`.
    pub fn open(name: impl Into<String>, dir: &Path) -> Result<Self> {
        let mut t = Self::new(name);
        let entries = fs::read_dir(dir).map_err(|e| SmartError::File { path: dir.to_path_buf(), source: e })?;
        for entry in entries {
            let path = entry?.path();
            let Some(page) = path.file_name().and_then(|n| n.to_str()).and_then(Page::from_file_name) else {
                continue;
            };
            let data = fs::read(&path).map_err(|e| SmartError::File { path: path.clone(), source: e })?;
            debug!("{}: loaded {} ({} bytes)", t.name, path.display(), data.len());
            t.pages.insert(page, data);
        }
        Ok(t)
    }

    /// Write every page to `dir` using the names `open` understands.
    pub fn save(&self, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir).map_err(|e| SmartError::File { path: dir.to_path_buf(), source: e })?;
        for (page, data) in &self.pages {
            let path = dir.join(page.file_name());
            fs::write(&path, data).map_err(|e| SmartError::File { path, source: e })?;
        }
        Ok(())
    }

    pub fn with_page(mut self, page: Page, data: Vec<u8>) -> Self {
        self.set_page(page, data);
        self
    }

    pub fn set_page(&mut self, page: Page, data: Vec<u8>) {
        self.pages.insert(page, data);
    }

    pub fn page(&self, page: Page) -> Option<&[u8]> {
        self.pages.get(&page).map(Vec::as_slice)
    }

    pub fn set_values(&mut self, values: &SmartValues) {
        self.set_page(Page::SmartData, values.to_page());
    }

    pub fn set_thresholds(&mut self, thresholds: &Thresholds) {
        self.set_page(Page::Thresholds, thresholds.to_page());
    }

    /// Make every request with this operation name fail as an I/O error.
    pub fn fail(&mut self, op: &'static str) {
        self.failing.insert(op);
    }

    pub fn recover(&mut self, op: &'static str) {
        self.failing.remove(op);
    }

    /// Subcommands passed to EXECUTE OFF-LINE IMMEDIATE, oldest first.
    pub fn started_tests(&self) -> &[u8] {
        &self.started
    }

    pub fn writes(&self) -> &[(Page, Vec<u8>)] {
        &self.writes
    }

    fn lookup(&self, page: Page, op: &'static str) -> Result<&[u8]> {
        self.pages
            .get(&page)
            .map(Vec::as_slice)
            .ok_or_else(|| SmartError::NotSupported(op.to_string()))
    }
}

impl Transport for ImageTransport {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&mut self, req: &Request<'_>) -> Result<Reply> {
        let op = req.op_name();
        if self.failing.contains(op) {
            return Err(SmartError::Transport { op: op.into(), reason: "I/O error".into() });
        }
        match *req {
            Request::Identify       => Ok(Reply::Data(self.lookup(Page::Identify, op)?.to_vec())),
            Request::ReadValues     => Ok(Reply::Data(self.lookup(Page::SmartData, op)?.to_vec())),
            Request::ReadThresholds => Ok(Reply::Data(self.lookup(Page::Thresholds, op)?.to_vec())),
            Request::ReturnStatus => {
                let regs = self.lookup(Page::ReturnStatus, op)?;
                match regs {
                    [mid, high, ..] => Ok(Reply::Registers { mid: *mid, high: *high }),
                    _ => Err(SmartError::ShortBuffer { what: op, len: regs.len(), expected: 2 }),
                }
            }
            Request::ReadLog { gp, address, page, sectors } => {
                let data = self.lookup(Page::Log { gp, address }, op)?;
                let start = page as usize * SECTOR_SIZE;
                let end = start + sectors as usize * SECTOR_SIZE;
                if end > data.len() {
                    return Err(SmartError::Transport {
                        op:     op.into(),
                        reason: format!("log 0x{:02x} has {} sector(s)", address, data.len() / SECTOR_SIZE),
                    });
                }
                Ok(Reply::Data(data[start..end].to_vec()))
            }
            Request::WriteLog { gp, address, data } => {
                let page = Page::Log { gp, address };
                self.writes.push((page, data.to_vec()));
                // SCT commands go to 0xe0 but must not replace the status page.
                if address != LOG_SCT_STATUS {
                    self.pages.insert(page, data.to_vec());
                }
                Ok(Reply::Done)
            }
            Request::ExecuteOffline { subcommand } => {
                if !self.pages.contains_key(&Page::SmartData) {
                    return Err(SmartError::NotSupported(op.to_string()));
                }
                info!("{}: {} subcommand 0x{:02x}", self.name, op, subcommand);
                self.started.push(subcommand);
                Ok(Reply::Done)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::identify::tests::sample_words;
    use crate::codec::values::tests::attr;

    fn device() -> ImageTransport {
        let mut values = SmartValues::default();
        values.attributes[0] = attr(5, 0x33, 100, 100, 0);
        let mut t = ImageTransport::new("img0")
            .with_page(Page::Identify, Identify::from_words(sample_words()).to_bytes())
            .with_page(Page::ReturnStatus, vec![0x4f, 0xc2]);
        t.set_values(&values);
        t
    }

    #[test]
    fn typed_reads_decode_pages() {
        let mut t = device();
        assert!(t.identify().is_ok());
        let v = t.smart_values(ChecksumPolicy::Fatal).unwrap();
        assert_eq!(v.attributes[0].id, 5);
        assert_eq!(t.return_status().unwrap(), ReturnStatus::Passed);
    }

    #[test]
    fn missing_page_is_not_supported() {
        let mut t = device();
        let err = t.thresholds(ChecksumPolicy::Warn).unwrap_err();
        assert!(err.is_not_supported());
    }

    #[test]
    fn injected_failure_is_transient() {
        let mut t = device();
        t.fail("SMART READ DATA");
        let err = t.smart_values(ChecksumPolicy::Warn).unwrap_err();
        assert!(!err.is_not_supported());
        t.recover("SMART READ DATA");
        assert!(t.smart_values(ChecksumPolicy::Warn).is_ok());
    }

    #[test]
    fn log_pages_are_sliced_by_sector() {
        let mut data = vec![0u8; 3 * SECTOR_SIZE];
        data[SECTOR_SIZE] = 0xaa;
        let mut t = device().with_page(Page::Log { gp: true, address: 0x07 }, data);
        let second = t.read_log(true, 0x07, 1, 1).unwrap();
        assert_eq!(second.len(), SECTOR_SIZE);
        assert_eq!(second[0], 0xaa);
        assert!(t.read_log(true, 0x07, 2, 2).is_err());
    }

    #[test]
    fn checksum_policy_applies_to_values() {
        let mut t = device();
        let mut page = t.page(Page::SmartData).unwrap().to_vec();
        page[10] ^= 0x01;
        t.set_page(Page::SmartData, page);
        assert!(t.smart_values(ChecksumPolicy::Warn).is_ok());
        assert!(t.smart_values(ChecksumPolicy::Fatal).is_err());
    }

    #[test]
    fn directory_round_trip_and_writes() {
        let dir = tempfile::tempdir().unwrap();
        let t = device().with_page(Page::Log { gp: false, address: 0x09 }, SelectiveLog::default().to_page());
        t.save(dir.path()).unwrap();
        assert!(dir.path().join("smart-log-09.bin").exists());

        let mut back = ImageTransport::open("img0", dir.path()).unwrap();
        let mut sel = back.selective_log(ChecksumPolicy::Fatal).unwrap();
        sel.spans[0].end = 99;
        back.write_selective_log(&sel).unwrap();
        assert_eq!(back.selective_log(ChecksumPolicy::Fatal).unwrap().spans[0].end, 99);
        back.start_test(SELECTIVE_SELF_TEST).unwrap();
        assert_eq!(back.started_tests(), &[SELECTIVE_SELF_TEST]);
        assert_eq!(back.writes().len(), 1);
    }
}
