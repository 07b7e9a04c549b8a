// Notification bar
//
// One message at a time. Messages expire after the configured duration;
// the caller passes the current time in.

use chrono::{DateTime, Duration, Utc};

pub const DEFAULT_DURATION_SECS: i64 = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    Success,
    ValidationFailed,
    SaveFailed,
}

impl NotificationKind {
    pub fn is_error(&self) -> bool {
        !matches!(self, NotificationKind::Success)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub kind: NotificationKind,
    pub message: String,
    pub shown_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NotificationBar {
    duration: Duration,
    current: Option<Notification>,
}

impl Default for NotificationBar {
    fn default() -> Self {
        NotificationBar::new(DEFAULT_DURATION_SECS)
    }
}

impl NotificationBar {
    pub fn new(duration_secs: i64) -> Self {
        NotificationBar {
            duration: Duration::seconds(duration_secs.max(1)),
            current: None,
        }
    }

    /// Replace whatever is showing
    pub fn show(&mut self, kind: NotificationKind, message: impl Into<String>, now: DateTime<Utc>) {
        let message = message.into();
        tracing::debug!(?kind, %message, "Notification");
        self.current = Some(Notification {
            kind,
            message,
            shown_at: now,
        });
    }

    pub fn dismiss(&mut self) {
        self.current = None;
    }

    /// Visible notification at `now`, if it has not expired
    pub fn current(&self, now: DateTime<Utc>) -> Option<&Notification> {
        self.current
            .as_ref()
            .filter(|n| now.signed_duration_since(n.shown_at) < self.duration)
    }

    /// Most recent notification regardless of expiry
    pub fn last(&self) -> Option<&Notification> {
        self.current.as_ref()
    }
}
