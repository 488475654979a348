//! User-facing notifications.

use std::fmt;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

/// Severity of a [`Notification`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationLevel {
    Success,
    Error,
    Warning,
    Info,
}

impl fmt::Display for NotificationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Success => "success",
            Self::Error => "error",
            Self::Warning => "warning",
            Self::Info => "info",
        })
    }
}

/// A message for the user.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub level: NotificationLevel,
    pub title: String,
    pub detail: Option<String>,
    /// Stays visible until the user dismisses it.
    pub persistent: bool,
    pub issued_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(level: NotificationLevel, title: impl Into<String>, detail: Option<String>) -> Self {
        Self {
            level,
            title: title.into(),
            detail,
            persistent: false,
            issued_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn persistent(mut self) -> Self {
        self.persistent = true;
        self
    }
}

/// Sink for user notifications.
///
/// Only [`notify`](Self::notify) is required; the level helpers build the
/// [`Notification`] for it.
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification);

    fn success(&self, title: &str, detail: Option<&str>) {
        self.notify(Notification::new(
            NotificationLevel::Success,
            title,
            detail.map(str::to_owned),
        ));
    }

    fn error(&self, title: &str, detail: Option<&str>) {
        self.notify(Notification::new(
            NotificationLevel::Error,
            title,
            detail.map(str::to_owned),
        ));
    }

    fn warning(&self, title: &str, detail: Option<&str>) {
        self.notify(Notification::new(
            NotificationLevel::Warning,
            title,
            detail.map(str::to_owned),
        ));
    }

    fn info(&self, title: &str, detail: Option<&str>) {
        self.notify(Notification::new(
            NotificationLevel::Info,
            title,
            detail.map(str::to_owned),
        ));
    }

    /// A warning that stays until dismissed.
    fn persistent_warning(&self, title: &str, detail: Option<&str>) {
        self.notify(
            Notification::new(NotificationLevel::Warning, title, detail.map(str::to_owned))
                .persistent(),
        );
    }
}

/// Writes notifications to the log.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, n: Notification) {
        let detail = n.detail.as_deref().unwrap_or("");
        match n.level {
            NotificationLevel::Error => {
                error!(title = %n.title, detail, persistent = n.persistent, "notification");
            }
            NotificationLevel::Warning => {
                warn!(title = %n.title, detail, persistent = n.persistent, "notification");
            }
            NotificationLevel::Success | NotificationLevel::Info => {
                info!(level = %n.level, title = %n.title, detail, persistent = n.persistent, "notification");
            }
        }
    }
}

/// Keeps every notification in memory.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    seen: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.seen.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.seen.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.lock().is_empty()
    }

    /// Drain everything recorded so far.
    pub fn take(&self) -> Vec<Notification> {
        std::mem::take(&mut *self.seen.lock())
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notification: Notification) {
        self.seen.lock().push(notification);
    }
}
