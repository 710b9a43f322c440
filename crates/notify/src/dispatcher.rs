//! Routes subscribed events to notification channels.
//!
//! The dispatcher listens on the [`EventBus`], renders every event it is
//! subscribed to into a [`Notification`] and delivers it to all channels.
//! Individual channel failures don't block other channels. Each successful
//! delivery is announced with a `Notifications_Fire` event.

use std::collections::HashSet;
use std::sync::Arc;

use culler_core::config::NotificationConfig;
use culler_core::SharedClock;

use crate::bus::{EventBus, Subscription};
use crate::events::{Event, EventPayload, EventType, NotificationFired};
use crate::templating::{
    TemplateContext, TemplateRenderer, DEFAULT_BODY_TEMPLATE, DEFAULT_SUBJECT_TEMPLATE,
};
use crate::traits::{Notification, Notifier, NotifyError};
use crate::webhook::WebhookNotifier;

/// Outcome of handing one notification to one channel.
#[derive(Debug)]
pub struct Delivery {
    pub channel: String,
    pub error: Option<String>,
    pub duration_ms: u64,
}

impl Delivery {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

pub struct Dispatcher {
    channels: Vec<Box<dyn Notifier>>,
    events: HashSet<EventType>,
    subject_template: String,
    body_template: String,
    renderer: Arc<TemplateRenderer>,
    bus: EventBus,
    clock: SharedClock,
}

impl Dispatcher {
    /// Dispatcher for the given channels, subscribed to the default
    /// notification events with the default templates.
    pub fn new(channels: Vec<Box<dyn Notifier>>, bus: EventBus, clock: SharedClock) -> Self {
        Self {
            channels,
            events: EventType::default_notification_events().into_iter().collect(),
            subject_template: DEFAULT_SUBJECT_TEMPLATE.to_string(),
            body_template: DEFAULT_BODY_TEMPLATE.to_string(),
            renderer: Arc::new(TemplateRenderer::new()),
            bus,
            clock,
        }
    }

    /// Build the webhook dispatcher described by `config`.
    ///
    /// Returns `Ok(None)` when no webhook is configured.
    pub fn from_config(
        config: &NotificationConfig,
        bus: EventBus,
        clock: SharedClock,
    ) -> Result<Option<Self>, NotifyError> {
        let Some(url) = config.webhook_url.clone() else {
            return Ok(None);
        };
        let renderer = Arc::new(TemplateRenderer::new());
        let mut webhook = WebhookNotifier::new(&url, Arc::clone(&renderer))?
            .with_headers(config.webhook_headers.iter().map(String::as_str))?;
        if let Some(payload) = &config.webhook_payload_template {
            webhook = webhook.with_payload_template(payload.clone())?;
        }
        let mut dispatcher = Self::new(vec![Box::new(webhook)], bus, clock);
        dispatcher.renderer = renderer;

        if !config.events.is_empty() {
            let events = config
                .events
                .iter()
                .map(|name| name.parse::<EventType>().map_err(NotifyError::Config))
                .collect::<Result<HashSet<_>, _>>()?;
            dispatcher = dispatcher.with_events(events);
        }
        if let Some(subject) = &config.subject_template {
            dispatcher = dispatcher.with_subject_template(subject.clone())?;
        }
        if let Some(body) = &config.body_template {
            dispatcher = dispatcher.with_body_template(body.clone())?;
        }
        Ok(Some(dispatcher))
    }

    /// Replace the subscribed event types. `Notifications_Fire` is never
    /// dispatched, so subscribing to it has no effect.
    pub fn with_events(mut self, events: impl IntoIterator<Item = EventType>) -> Self {
        self.events = events
            .into_iter()
            .filter(|t| *t != EventType::NotificationsFire)
            .collect();
        self
    }

    pub fn with_subject_template(mut self, template: String) -> Result<Self, NotifyError> {
        self.renderer
            .validate(&template)
            .map_err(|e| NotifyError::Config(format!("invalid subject template: {e}")))?;
        self.subject_template = template;
        Ok(self)
    }

    pub fn with_body_template(mut self, template: String) -> Result<Self, NotifyError> {
        self.renderer
            .validate(&template)
            .map_err(|e| NotifyError::Config(format!("invalid body template: {e}")))?;
        self.body_template = template;
        Ok(self)
    }

    pub fn is_subscribed(&self, event_type: EventType) -> bool {
        event_type != EventType::NotificationsFire && self.events.contains(&event_type)
    }

    /// Render `event` into a notification.
    pub fn render(&self, event: &Event) -> Result<Notification, NotifyError> {
        let ctx = TemplateContext::from_event(event, self.clock.now());
        Ok(Notification {
            event: event.event_type(),
            subject: self.renderer.render(&self.subject_template, &ctx)?,
            message: self.renderer.render(&self.body_template, &ctx)?,
            context: ctx,
        })
    }

    /// Deliver one event to every channel. Unsubscribed events return an
    /// empty result list.
    pub async fn dispatch(&self, event: &Event) -> Vec<Delivery> {
        let event_type = event.event_type();
        if !self.is_subscribed(event_type) {
            return Vec::new();
        }
        if self.channels.is_empty() {
            tracing::debug!(%event_type, "No notification channels configured");
            return Vec::new();
        }

        let notification = match self.render(event) {
            Ok(n) => n,
            Err(e) => {
                tracing::warn!(%event_type, error = %e, "Notification rendering failed");
                return Vec::new();
            }
        };

        let mut results = Vec::with_capacity(self.channels.len());

        for channel in &self.channels {
            let start = std::time::Instant::now();
            let result = channel.send(&notification).await;
            let duration_ms = start.elapsed().as_millis() as u64;

            let error = match result {
                Ok(()) => {
                    tracing::info!(
                        %event_type,
                        channel = channel.channel_name(),
                        duration_ms,
                        "Notification delivered"
                    );
                    self.bus
                        .emit(EventPayload::NotificationsFire(NotificationFired {
                            channel: channel.channel_name().to_string(),
                            source: event_type,
                            subject: notification.subject.clone(),
                        }));
                    None
                }
                Err(e) => {
                    tracing::warn!(
                        %event_type,
                        channel = channel.channel_name(),
                        error = %e,
                        duration_ms,
                        "Notification delivery failed"
                    );
                    Some(e.to_string())
                }
            };

            results.push(Delivery {
                channel: channel.channel_name().to_string(),
                error,
                duration_ms,
            });
        }

        results
    }

    /// Consume events until the bus closes.
    pub async fn run(self, mut subscription: Subscription) {
        tracing::info!(
            channels = self.channels.len(),
            events = self.events.len(),
            "Notification dispatcher started"
        );
        while let Some(event) = subscription.recv().await {
            self.dispatch(&event).await;
        }
        tracing::info!("Notification dispatcher stopped");
    }

    /// Subscribe to the bus and run on a background task.
    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        let subscription = self.bus.subscribe();
        tokio::spawn(self.run(subscription))
    }
}
