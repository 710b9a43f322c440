//! The channel seam: what a rendered event looks like and how a channel
//! fails to deliver it.

use crate::events::EventType;
use crate::templating::TemplateContext;

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Template rendering failed: {0}")]
    Template(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Channel answered {status}: {body}")]
    Rejected { status: u16, body: String },
}

/// One event rendered for delivery.
#[derive(Debug, Clone)]
pub struct Notification {
    pub event: EventType,
    pub subject: String,
    pub message: String,
    /// Variables `subject` and `message` were rendered from. Channels with
    /// their own payload format render from these as well.
    pub context: TemplateContext,
}

#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError>;

    /// Name used in logs and `Notifications_Fire` events.
    fn channel_name(&self) -> &str;
}
