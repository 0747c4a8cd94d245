//! User-facing notifications.
//!
//! Notifications are append-only: a notifier receives them in order and
//! never revisits an earlier one.

use std::fmt;
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tracing::{error, info, warn};

/// How a notification should be presented.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Success,
    /// A known identifier that is not confirmed.
    Caution,
    Warning,
    Error,
    /// The verification phrase was found in the recognized text.
    Verified,
}

impl Severity {
    /// Display color name.
    pub fn color(self) -> &'static str {
        match self {
            Severity::Info => "blue",
            Severity::Success => "green",
            Severity::Caution => "darkorange",
            Severity::Warning => "orange",
            Severity::Error => "red",
            Severity::Verified => "darkgreen",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Severity::Info => "info",
            Severity::Success => "ok",
            Severity::Caution => "caution",
            Severity::Warning => "warn",
            Severity::Error => "error",
            Severity::Verified => "verified",
        };
        f.write_str(label)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub message: String,
    pub severity: Severity,
}

impl Notification {
    pub fn new(message: impl Into<String>, severity: Severity) -> Self {
        Self {
            message: message.into(),
            severity,
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(message, Severity::Info)
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self::new(message, Severity::Success)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(message, Severity::Warning)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(message, Severity::Error)
    }
}

/// Consumer of notifications.
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Keeps every notification in memory. Clones share the same log.
#[derive(Clone, Debug, Default)]
pub struct MemoryNotifier {
    log: Arc<Mutex<Vec<Notification>>>,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<Notification> {
        match self.log.lock() {
            Ok(log) => log.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn messages(&self) -> Vec<String> {
        self.entries().into_iter().map(|n| n.message).collect()
    }

    /// Number of notifications whose message contains `needle`.
    pub fn count_containing(&self, needle: &str) -> usize {
        self.entries()
            .iter()
            .filter(|n| n.message.contains(needle))
            .count()
    }
}

impl Notifier for MemoryNotifier {
    fn notify(&self, notification: Notification) {
        match self.log.lock() {
            Ok(mut log) => log.push(notification),
            Err(poisoned) => poisoned.into_inner().push(notification),
        }
    }
}

/// Prints notifications to stdout and mirrors them as tracing events.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notification: Notification) {
        let Notification { message, severity } = &notification;
        match severity {
            Severity::Error => error!(%severity, "{message}"),
            Severity::Warning | Severity::Caution => warn!(%severity, "{message}"),
            _ => info!(%severity, "{message}"),
        }
        println!("[{severity}] {message}");
    }
}
