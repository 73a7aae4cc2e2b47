pub mod alert_log;
pub mod human;
pub mod notify;
pub mod report;
pub mod webhook;
