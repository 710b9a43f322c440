//! Webhook channel: posts each notification as a JSON document.
//!
//! The document is rendered from a minijinja payload template that sees the
//! event's [`TemplateContext`] plus the rendered `subject` and `message`.
//! [`DEFAULT_PAYLOAD_TEMPLATE`] is used when none is configured. Whatever
//! the template renders must parse as JSON; anything else fails the
//! delivery before a request is made.

use std::sync::Arc;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Url;
use serde::Serialize;

use crate::templating::{TemplateContext, TemplateRenderer};
use crate::traits::{Notification, Notifier, NotifyError};

pub const DEFAULT_PAYLOAD_TEMPLATE: &str = r#"{
  "notification_type": {{ event | json }},
  "subject": {{ subject | json }},
  "message": {{ message | json }},
  "time": {{ time | json }},
  "extra": {
    "collection": {{ collection | json }},
    "media": {{ media | json }},
    "rule_group": {{ rule_group | json }},
    "action": {{ action | json }},
    "reason": {{ reason | json }},
    "error": {{ error | json }}
  }
}"#;

/// Variables seen by a payload template.
#[derive(Serialize)]
struct PayloadContext<'a> {
    #[serde(flatten)]
    context: &'a TemplateContext,
    subject: &'a str,
    message: &'a str,
}

#[derive(Debug)]
pub struct WebhookNotifier {
    url: Url,
    headers: HeaderMap,
    payload_template: String,
    renderer: Arc<TemplateRenderer>,
    client: reqwest::Client,
}

impl WebhookNotifier {
    /// Webhook posting to `url`, which must be http(s).
    pub fn new(url: &str, renderer: Arc<TemplateRenderer>) -> Result<Self, NotifyError> {
        let url = Url::parse(url)
            .map_err(|e| NotifyError::Config(format!("invalid webhook url: {e}")))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(NotifyError::Config(format!(
                "webhook url must be http(s), got {}",
                url.scheme()
            )));
        }
        Ok(Self {
            url,
            headers: HeaderMap::new(),
            payload_template: DEFAULT_PAYLOAD_TEMPLATE.to_string(),
            renderer,
            client: reqwest::Client::new(),
        })
    }

    /// Extra request headers, each written `Name=value`.
    pub fn with_headers<'a>(
        mut self,
        headers: impl IntoIterator<Item = &'a str>,
    ) -> Result<Self, NotifyError> {
        for header in headers {
            let (name, value) = header.split_once('=').ok_or_else(|| {
                NotifyError::Config(format!("webhook header must be Name=value: {header}"))
            })?;
            let name = HeaderName::from_bytes(name.trim().as_bytes())
                .map_err(|e| NotifyError::Config(format!("invalid header name {name:?}: {e}")))?;
            let value = HeaderValue::from_str(value.trim())
                .map_err(|e| NotifyError::Config(format!("invalid value for {name}: {e}")))?;
            self.headers.insert(name, value);
        }
        Ok(self)
    }

    /// Replace the payload template. Only syntax is checked here; a
    /// template that renders to invalid JSON fails at delivery.
    pub fn with_payload_template(mut self, template: String) -> Result<Self, NotifyError> {
        self.renderer
            .validate(&template)
            .map_err(|e| NotifyError::Config(format!("invalid payload template: {e}")))?;
        self.payload_template = template;
        Ok(self)
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// The JSON document posted for `notification`.
    pub fn payload(&self, notification: &Notification) -> Result<serde_json::Value, NotifyError> {
        let rendered = self.renderer.render(
            &self.payload_template,
            &PayloadContext {
                context: &notification.context,
                subject: &notification.subject,
                message: &notification.message,
            },
        )?;
        serde_json::from_str(&rendered)
            .map_err(|e| NotifyError::Template(format!("payload is not valid JSON: {e}")))
    }
}

#[async_trait::async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        let payload = self.payload(notification)?;
        let response = self
            .client
            .post(self.url.clone())
            .headers(self.headers.clone())
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(host = self.url.host_str(), %status, "webhook rejected notification");
            return Err(NotifyError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        tracing::debug!(
            host = self.url.host_str(),
            event = %notification.event,
            "webhook notification delivered"
        );
        Ok(())
    }

    fn channel_name(&self) -> &str {
        "webhook"
    }
}
