//! Error type shared by the codec, decoders, monitor and transports.

use std::io;
use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, SmartError>;

#[derive(thiserror::Error, Debug)]
pub enum SmartError {
    // ── I/O ──────────────────────────────────────────────────────────
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("{}: {source}", path.display())]
    File {
        path: PathBuf,
        source: io::Error,
    },

    // ── Device data ──────────────────────────────────────────────────
    #[error("{what}: got {len} bytes, expected {expected}")]
    ShortBuffer {
        what: &'static str,
        len: usize,
        expected: usize,
    },

    #[error("{what}: checksum error in {bad} of {sectors} sector(s)")]
    Checksum {
        what: &'static str,
        bad: usize,
        sectors: usize,
    },

    #[error("{log}: {reason}")]
    Decode {
        log: &'static str,
        reason: String,
    },

    // ── Transport ────────────────────────────────────────────────────
    #[error("{0}: not supported by device")]
    NotSupported(String),

    #[error("{op} failed: {reason}")]
    Transport {
        op: String,
        reason: String,
    },

    // ── Configuration ────────────────────────────────────────────────
    #[error("invalid vendor attribute definition '{0}'")]
    AttrDef(String),

    #[error("unknown firmware bug '{0}' (valid: none, nologdir, samsung, samsung2, samsung3, xerrorlba, noswap)")]
    FirmwareBug(String),

    #[error("invalid test schedule '{pattern}': {source}")]
    Schedule {
        pattern: String,
        source: regex::Error,
    },

    #[error("{}: format error", path.display())]
    StateFormat { path: PathBuf },

    #[error("configuration error: {0}")]
    Config(String),
}

impl SmartError {
    pub fn decode(log: &'static str, reason: impl Into<String>) -> Self {
        SmartError::Decode { log, reason: reason.into() }
    }

    /// True if the device lacks the capability, as opposed to a transient failure.
    pub fn is_not_supported(&self) -> bool {
        matches!(self, SmartError::NotSupported(_))
    }
}
