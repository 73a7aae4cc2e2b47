use crate::monitor::mail::MailNotice;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl Severity {
    pub fn label(&self) -> &'static str {
        match self {
            Severity::Info     => "INFO",
            Severity::Warning  => "WARN",
            Severity::Critical => "CRIT",
        }
    }
}

/// One report from a monitoring pass. `message` is the full log line;
/// `mail` is set when the report also passed the mail throttle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub severity: Severity,
    pub device:   String,
    pub message:  String,
    pub mail:     Option<MailNotice>,
}

impl Event {
    pub fn new(severity: Severity, device: &str, message: impl Into<String>) -> Self {
        Self { severity, device: device.to_string(), message: message.into(), mail: None }
    }

    pub fn info(device: &str, message: impl Into<String>) -> Self {
        Self::new(Severity::Info, device, message)
    }

    pub fn warning(device: &str, message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, device, message)
    }

    pub fn critical(device: &str, message: impl Into<String>) -> Self {
        Self::new(Severity::Critical, device, message)
    }

    /// Emit through `tracing` at the level matching the severity.
    pub fn trace(&self) {
        match self.severity {
            Severity::Info     => tracing::info!("{}", self.message),
            Severity::Warning  => tracing::warn!("{}", self.message),
            Severity::Critical => tracing::error!("{}", self.message),
        }
    }

    /// `[LABEL] message`, as written to the event log.
    pub fn line(&self) -> String {
        format!("[{}] {}", self.severity.label(), self.message)
    }
}

/// Worst severity among `events`; `None` when empty.
pub fn worst(events: &[Event]) -> Option<Severity> {
    events.iter().map(|e| e.severity).max()
}
