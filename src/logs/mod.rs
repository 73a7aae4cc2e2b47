//! Decoders that turn raw circular logs into newest-first entry lists.

pub mod circular;
pub mod commands;
pub mod errors;
pub mod sct;
pub mod selftest;

pub use circular::{CircularView, IndexBase};

/// Index numbering assumed per log kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogIndexing {
    pub error_log:         IndexBase,
    pub ext_error_log:     IndexBase,
    pub self_test_log:     IndexBase,
    pub ext_self_test_log: IndexBase,
    pub sct_history:       IndexBase,
}

impl Default for LogIndexing {
    fn default() -> Self {
        Self {
            error_log:         IndexBase::One,
            ext_error_log:     IndexBase::One,
            self_test_log:     IndexBase::One,
            ext_self_test_log: IndexBase::One,
            sct_history:       IndexBase::Zero,
        }
    }
}

/// "N hours (D days + H hours)".
pub(crate) fn lifetime(hours: u16) -> String {
    format!("{} hours ({} days + {} hours)", hours, hours / 24, hours % 24)
}
