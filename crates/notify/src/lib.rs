//! Event emission and notification delivery.
//!
//! This crate provides:
//! - The typed event taxonomy fired by the rule and collection handlers
//! - [`EventBus`], a broadcast channel with a short "most recent event" replay
//! - `Notifier` trait for pluggable notification channels
//! - Webhook notifier posting template-rendered JSON documents
//! - Minijinja template rendering for notification messages
//! - Dispatcher that turns subscribed events into notifications

pub mod bus;
pub mod dispatcher;
pub mod events;
pub mod templating;
pub mod traits;
pub mod webhook;

pub use bus::{EventBus, Subscription};
pub use dispatcher::{Delivery, Dispatcher};
pub use events::{Event, EventPayload, EventType};
pub use traits::{Notifier, NotifyError};
