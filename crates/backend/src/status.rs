//! Out-of-band status reporting from a device.
//!
//! Validation failures and other asynchronous conditions never come back as a
//! `Result`; the device hands a [`StatusMessage`] to the [`StatusHandler`] it
//! was created with.

use crate::object::ObjectRef;
use std::fmt;
use std::sync::{Arc, Mutex};

/// Severity of a status message, most severe first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Fatal,
    Error,
    Warning,
    PerformanceWarning,
    Info,
    Debug,
}

impl Severity {
    /// Fixed-width tag used in diagnostics.
    pub fn tag(self) -> &'static str {
        match self {
            Severity::Fatal => "FATAL",
            Severity::Error => "ERROR",
            Severity::Warning => "WARN ",
            Severity::PerformanceWarning => "PERF ",
            Severity::Info => "INFO ",
            Severity::Debug => "DEBUG",
        }
    }

    /// Informational severities are only surfaced with verbose diagnostics.
    pub fn is_informational(self) -> bool {
        matches!(
            self,
            Severity::PerformanceWarning | Severity::Info | Severity::Debug
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatusMessage {
    pub severity: Severity,
    /// Object the message is about, if any.
    pub source: Option<ObjectRef>,
    pub message: String,
}

impl fmt::Display for StatusMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.source {
            Some(src) => write!(f, "[{}][{}] {}", self.severity.tag(), src, self.message),
            None => write!(f, "[{}][device] {}", self.severity.tag(), self.message),
        }
    }
}

/// What the device should do after a message was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusAction {
    Continue,
    /// Stop serving requests. The device treats every later call as fatal.
    Abort,
}

/// Receiver of a device's status messages.
pub trait StatusHandler {
    fn handle(&self, message: &StatusMessage) -> StatusAction;
}

/// Logs through `tracing` and terminates the process on FATAL.
///
/// Used by the binaries. Fatal messages go to stderr unconditionally, since
/// the backend is presumed corrupted and no orderly shutdown is attempted.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessStatusHandler {
    verbose: bool,
}

impl ProcessStatusHandler {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

impl StatusHandler for ProcessStatusHandler {
    fn handle(&self, message: &StatusMessage) -> StatusAction {
        if message.severity == Severity::Fatal {
            tracing::error!("{message}");
            eprintln!("{message}");
            std::process::exit(1);
        }
        log_message(message, self.verbose);
        StatusAction::Continue
    }
}

/// Records every message and aborts the device on FATAL instead of exiting.
///
/// Clones share the same log, so a caller can keep one clone and give the
/// other to the device.
#[derive(Debug, Clone, Default)]
pub struct CollectingStatusHandler {
    messages: Arc<Mutex<Vec<StatusMessage>>>,
}

impl CollectingStatusHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<StatusMessage> {
        self.messages
            .lock()
            .map(|m| m.clone())
            .unwrap_or_default()
    }

    /// Messages at `severity` or worse.
    pub fn at_least(&self, severity: Severity) -> Vec<StatusMessage> {
        self.messages()
            .into_iter()
            .filter(|m| m.severity <= severity)
            .collect()
    }
}

impl StatusHandler for CollectingStatusHandler {
    fn handle(&self, message: &StatusMessage) -> StatusAction {
        log_message(message, true);
        if let Ok(mut log) = self.messages.lock() {
            log.push(message.clone());
        }
        if message.severity == Severity::Fatal {
            StatusAction::Abort
        } else {
            StatusAction::Continue
        }
    }
}

fn log_message(message: &StatusMessage, verbose: bool) {
    let source = message
        .source
        .map(|s| s.to_string())
        .unwrap_or_else(|| "device".into());
    match message.severity {
        Severity::Fatal | Severity::Error => {
            tracing::error!(source = %source, "{}", message.message)
        }
        Severity::Warning => tracing::warn!(source = %source, "{}", message.message),
        Severity::PerformanceWarning | Severity::Info if verbose => {
            tracing::info!(source = %source, "{}", message.message)
        }
        Severity::Debug if verbose => tracing::debug!(source = %source, "{}", message.message),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::ObjectKind;

    #[test]
    fn severity_orders_most_severe_first() {
        assert!(Severity::Fatal < Severity::Error);
        assert!(Severity::Warning < Severity::Debug);
        assert!(Severity::Info.is_informational());
        assert!(!Severity::Warning.is_informational());
    }

    #[test]
    fn display_includes_source() {
        let msg = StatusMessage {
            severity: Severity::Error,
            source: Some(ObjectRef {
                id: 3,
                kind: ObjectKind::Surface,
            }),
            message: "missing 'geometry'".into(),
        };
        assert_eq!(msg.to_string(), "[ERROR][surface#3] missing 'geometry'");
    }

    #[test]
    fn collecting_handler_aborts_on_fatal_only() {
        let handler = CollectingStatusHandler::new();
        let warn = StatusMessage {
            severity: Severity::Warning,
            source: None,
            message: "w".into(),
        };
        let fatal = StatusMessage {
            severity: Severity::Fatal,
            source: None,
            message: "f".into(),
        };
        assert_eq!(handler.handle(&warn), StatusAction::Continue);
        assert_eq!(handler.handle(&fatal), StatusAction::Abort);

        let shared = handler.clone();
        assert_eq!(shared.messages().len(), 2);
        assert_eq!(shared.at_least(Severity::Error).len(), 1);
    }
}
