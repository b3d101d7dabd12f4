use tokio::sync::mpsc;

use lms_core::model::{ContentId, ModuleId, ProgressUpdate};

use crate::error::ErrorKind;

/// Everything needed to replay a failed progress write unchanged.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryAction {
    pub module_id: ModuleId,
    pub content_id: ContentId,
    pub update: ProgressUpdate,
}

/// User-facing outcome of a progress write.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    Success {
        title: String,
        description: String,
    },
    Failure {
        kind: ErrorKind,
        title: String,
        description: String,
        retry: RetryAction,
    },
}

impl Notification {
    #[must_use]
    pub fn completed() -> Self {
        Notification::Success {
            title: "Content Completed".into(),
            description: "Nice work! Your progress has been saved.".into(),
        }
    }

    #[must_use]
    pub fn failed(kind: ErrorKind, retry: RetryAction) -> Self {
        Notification::Failure {
            kind,
            title: kind.title().into(),
            description: kind.description().into(),
            retry,
        }
    }

    #[must_use]
    pub fn title(&self) -> &str {
        match self {
            Notification::Success { title, .. } | Notification::Failure { title, .. } => title,
        }
    }

    #[must_use]
    pub fn description(&self) -> &str {
        match self {
            Notification::Success { description, .. }
            | Notification::Failure { description, .. } => description,
        }
    }

    /// The replay action offered with a failure.
    #[must_use]
    pub fn retry(&self) -> Option<&RetryAction> {
        match self {
            Notification::Failure { retry, .. } => Some(retry),
            Notification::Success { .. } => None,
        }
    }
}

/// Sink for user-facing notifications (toasts, status lines).
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Writes notifications to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, notification: Notification) {
        match &notification {
            Notification::Success { title, description } => {
                tracing::info!(%title, %description, "progress notification");
            }
            Notification::Failure {
                kind,
                title,
                description,
                retry,
            } => {
                tracing::warn!(
                    code = kind.code(),
                    %title,
                    %description,
                    content_id = %retry.content_id,
                    "progress notification"
                );
            }
        }
    }
}

/// Forwards notifications to a receiver owned by the UI loop.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<Notification>,
}

impl ChannelNotifier {
    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Notifier for ChannelNotifier {
    fn notify(&self, notification: Notification) {
        if self.tx.send(notification).is_err() {
            tracing::debug!("notification receiver dropped");
        }
    }
}
