//! In-process event bus.
//!
//! A tokio broadcast channel fans events out to every subscriber. The most
//! recent event is remembered and replayed to new subscribers when it is
//! younger than [`REPLAY_WINDOW_SECS`], so a client that connects right after
//! a handler started still sees where it stands.

use std::sync::{Arc, Mutex, PoisonError};

use chrono::Duration;
use tokio::sync::broadcast;

use culler_core::SharedClock;

use crate::events::{Event, EventPayload};

/// Age limit for the replayed event.
pub const REPLAY_WINDOW_SECS: i64 = 5;

const CHANNEL_CAPACITY: usize = 1024;

struct Inner {
    sender: broadcast::Sender<Event>,
    last: Mutex<Option<Event>>,
    clock: SharedClock,
}

/// Cloneable handle to the shared bus.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<Inner>,
}

impl EventBus {
    pub fn new(clock: SharedClock) -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                sender,
                last: Mutex::new(None),
                clock,
            }),
        }
    }

    /// Stamp `payload` with the current time and broadcast it.
    ///
    /// Having no subscribers is not an error.
    pub fn emit(&self, payload: EventPayload) -> Event {
        let event = Event {
            time: self.inner.clock.now(),
            payload,
        };
        tracing::trace!(event_type = %event.event_type(), "emit");
        *self
            .inner
            .last
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(event.clone());
        let _ = self.inner.sender.send(event.clone());
        event
    }

    pub fn subscribe(&self) -> Subscription {
        let receiver = self.inner.sender.subscribe();
        let replay = self.recent_event();
        Subscription { receiver, replay }
    }

    /// The last emitted event, if it is still inside the replay window.
    pub fn recent_event(&self) -> Option<Event> {
        let last = self
            .inner
            .last
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()?;
        let age = self.inner.clock.now() - last.time;
        (age <= Duration::seconds(REPLAY_WINDOW_SECS)).then_some(last)
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.sender.receiver_count()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

/// A live subscription. Yields the replayed event first, if any.
pub struct Subscription {
    receiver: broadcast::Receiver<Event>,
    replay: Option<Event>,
}

impl Subscription {
    /// Next event, or `None` once every bus handle is dropped.
    ///
    /// Slow subscribers skip what they missed rather than failing.
    pub async fn recv(&mut self) -> Option<Event> {
        if let Some(event) = self.replay.take() {
            return Some(event);
        }
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "event subscriber lagged, dropping events");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Non-blocking variant used by tests and drain loops.
    pub fn try_recv(&mut self) -> Option<Event> {
        if let Some(event) = self.replay.take() {
            return Some(event);
        }
        loop {
            match self.receiver.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => return None,
            }
        }
    }

    /// Everything currently buffered.
    pub fn drain(&mut self) -> Vec<Event> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }
}
