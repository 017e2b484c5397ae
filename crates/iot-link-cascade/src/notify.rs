//! ---
//! iot_section: "04-cascade"
//! iot_subsection: "module"
//! iot_type: "source"
//! iot_scope: "code"
//! iot_description: "Transport cascade, failure memory and connection status."
//! iot_version: "v0.0.0-prealpha"
//! iot_owner: "tbd"
//! ---
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

/// Severity of a user-visible notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    #[default]
    Info,
    Warning,
    Danger,
}

/// Presentation hints passed along with a notification message.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NotifyOptions {
    pub kind: NotificationKind,
    /// Keep the message on screen until dismissed.
    pub sticky: bool,
    pub title: Option<String>,
}

impl NotifyOptions {
    pub fn info() -> Self {
        Self::default()
    }

    pub fn warning() -> Self {
        Self {
            kind: NotificationKind::Warning,
            ..Self::default()
        }
    }

    pub fn danger() -> Self {
        Self {
            kind: NotificationKind::Danger,
            sticky: true,
            ..Self::default()
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }
}

/// Sink for user-visible messages raised by the cascade. Never read back.
pub trait Notifier: Send + Sync {
    fn notify(&self, message: &str, options: NotifyOptions);
}

/// Notifier that forwards messages to the tracing pipeline.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, message: &str, options: NotifyOptions) {
        let title = options.title.as_deref().unwrap_or("");
        match options.kind {
            NotificationKind::Info => info!(title, sticky = options.sticky, "{message}"),
            NotificationKind::Warning => warn!(title, sticky = options.sticky, "{message}"),
            NotificationKind::Danger => error!(title, sticky = options.sticky, "{message}"),
        }
    }
}
