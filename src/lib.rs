//! SMART health monitoring for ATA disks: page codecs, attribute
//! classification, log decoding, change tracking with throttled warnings,
//! and scheduled self-tests.

pub mod alerts;
pub mod attrdefs;
pub mod classifier;
pub mod codec;
pub mod config;
pub mod error;
pub mod logs;
pub mod monitor;
pub mod scheduler;
pub mod selftest;
pub mod transport;
pub mod util;
pub mod vendordb;

pub use error::{Result, SmartError};
