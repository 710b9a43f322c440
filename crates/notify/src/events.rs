//! Typed event taxonomy.
//!
//! Every event carries `{type, time}` plus a payload. The serialized form is
//! flat (`{"type": "CollectionMedia_Added", "time": ..., "collectionId": ...}`)
//! so stream clients and notification templates read the same shape.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use culler_core::{ArrAction, MediaId, RecordId};

/// Discriminant of an [`EventPayload`], used for subscriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    #[serde(rename = "RuleHandler_Started")]
    RuleHandlerStarted,
    #[serde(rename = "RuleHandler_Progressed")]
    RuleHandlerProgressed,
    #[serde(rename = "RuleHandler_Finished")]
    RuleHandlerFinished,
    #[serde(rename = "RuleHandler_Failed")]
    RuleHandlerFailed,
    #[serde(rename = "CollectionHandler_Started")]
    CollectionHandlerStarted,
    #[serde(rename = "CollectionHandler_Progressed")]
    CollectionHandlerProgressed,
    #[serde(rename = "CollectionHandler_Finished")]
    CollectionHandlerFinished,
    #[serde(rename = "CollectionHandler_Failed")]
    CollectionHandlerFailed,
    #[serde(rename = "CollectionMedia_Added")]
    CollectionMediaAdded,
    #[serde(rename = "CollectionMedia_Removed")]
    CollectionMediaRemoved,
    #[serde(rename = "CollectionMedia_Handled")]
    CollectionMediaHandled,
    #[serde(rename = "Notifications_Fire")]
    NotificationsFire,
}

impl EventType {
    pub const ALL: [EventType; 12] = [
        EventType::RuleHandlerStarted,
        EventType::RuleHandlerProgressed,
        EventType::RuleHandlerFinished,
        EventType::RuleHandlerFailed,
        EventType::CollectionHandlerStarted,
        EventType::CollectionHandlerProgressed,
        EventType::CollectionHandlerFinished,
        EventType::CollectionHandlerFailed,
        EventType::CollectionMediaAdded,
        EventType::CollectionMediaRemoved,
        EventType::CollectionMediaHandled,
        EventType::NotificationsFire,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::RuleHandlerStarted => "RuleHandler_Started",
            EventType::RuleHandlerProgressed => "RuleHandler_Progressed",
            EventType::RuleHandlerFinished => "RuleHandler_Finished",
            EventType::RuleHandlerFailed => "RuleHandler_Failed",
            EventType::CollectionHandlerStarted => "CollectionHandler_Started",
            EventType::CollectionHandlerProgressed => "CollectionHandler_Progressed",
            EventType::CollectionHandlerFinished => "CollectionHandler_Finished",
            EventType::CollectionHandlerFailed => "CollectionHandler_Failed",
            EventType::CollectionMediaAdded => "CollectionMedia_Added",
            EventType::CollectionMediaRemoved => "CollectionMedia_Removed",
            EventType::CollectionMediaHandled => "CollectionMedia_Handled",
            EventType::NotificationsFire => "Notifications_Fire",
        }
    }

    /// Events a notification channel listens to when none are configured.
    pub fn default_notification_events() -> Vec<EventType> {
        vec![
            EventType::RuleHandlerFailed,
            EventType::CollectionHandlerFailed,
            EventType::CollectionMediaAdded,
            EventType::CollectionMediaRemoved,
            EventType::CollectionMediaHandled,
        ]
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown event type '{}'", s))
    }
}

// ── Payloads ────────────────────────────────────────────────────────

/// Evaluation progress inside the rule group currently being processed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupProgress {
    pub name: String,
    pub processed_evaluations: usize,
    pub total_evaluations: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleHandlerProgress {
    pub total_groups: usize,
    pub processed_groups: usize,
    #[serde(default)]
    pub processing_group: Option<GroupProgress>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionHandlerProgress {
    pub total_collections: usize,
    pub processed_collections: usize,
    #[serde(default)]
    pub processing_collection: Option<String>,
}

/// Identity of whatever failed, so a human can find it without logs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Failure {
    #[serde(default)]
    pub rule_group_id: Option<RecordId>,
    #[serde(default)]
    pub collection_id: Option<RecordId>,
    pub name: String,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Finished {
    pub duration_ms: u64,
    #[serde(default)]
    pub aborted: bool,
}

/// A membership change of one item in one collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaChange {
    pub collection_id: RecordId,
    pub collection_title: String,
    pub media_id: MediaId,
    pub title: String,
    #[serde(default)]
    pub rule_group_id: Option<RecordId>,
    #[serde(default)]
    pub rule_group_name: Option<String>,
    /// Set on `CollectionMedia_Handled`.
    #[serde(default)]
    pub action: Option<ArrAction>,
    /// Why a removal happened (`unmatched`, `excluded`, `missing`, `manual`).
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationFired {
    pub channel: String,
    pub source: EventType,
    pub subject: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EventPayload {
    #[serde(rename = "RuleHandler_Started")]
    RuleHandlerStarted,
    #[serde(rename = "RuleHandler_Progressed")]
    RuleHandlerProgressed(RuleHandlerProgress),
    #[serde(rename = "RuleHandler_Finished")]
    RuleHandlerFinished(Finished),
    #[serde(rename = "RuleHandler_Failed")]
    RuleHandlerFailed(Failure),
    #[serde(rename = "CollectionHandler_Started")]
    CollectionHandlerStarted,
    #[serde(rename = "CollectionHandler_Progressed")]
    CollectionHandlerProgressed(CollectionHandlerProgress),
    #[serde(rename = "CollectionHandler_Finished")]
    CollectionHandlerFinished(Finished),
    #[serde(rename = "CollectionHandler_Failed")]
    CollectionHandlerFailed(Failure),
    #[serde(rename = "CollectionMedia_Added")]
    CollectionMediaAdded(MediaChange),
    #[serde(rename = "CollectionMedia_Removed")]
    CollectionMediaRemoved(MediaChange),
    #[serde(rename = "CollectionMedia_Handled")]
    CollectionMediaHandled(MediaChange),
    #[serde(rename = "Notifications_Fire")]
    NotificationsFire(NotificationFired),
}

impl EventPayload {
    pub fn event_type(&self) -> EventType {
        match self {
            EventPayload::RuleHandlerStarted => EventType::RuleHandlerStarted,
            EventPayload::RuleHandlerProgressed(_) => EventType::RuleHandlerProgressed,
            EventPayload::RuleHandlerFinished(_) => EventType::RuleHandlerFinished,
            EventPayload::RuleHandlerFailed(_) => EventType::RuleHandlerFailed,
            EventPayload::CollectionHandlerStarted => EventType::CollectionHandlerStarted,
            EventPayload::CollectionHandlerProgressed(_) => EventType::CollectionHandlerProgressed,
            EventPayload::CollectionHandlerFinished(_) => EventType::CollectionHandlerFinished,
            EventPayload::CollectionHandlerFailed(_) => EventType::CollectionHandlerFailed,
            EventPayload::CollectionMediaAdded(_) => EventType::CollectionMediaAdded,
            EventPayload::CollectionMediaRemoved(_) => EventType::CollectionMediaRemoved,
            EventPayload::CollectionMediaHandled(_) => EventType::CollectionMediaHandled,
            EventPayload::NotificationsFire(_) => EventType::NotificationsFire,
        }
    }

    pub fn media_change(&self) -> Option<&MediaChange> {
        match self {
            EventPayload::CollectionMediaAdded(c)
            | EventPayload::CollectionMediaRemoved(c)
            | EventPayload::CollectionMediaHandled(c) => Some(c),
            _ => None,
        }
    }

    pub fn failure(&self) -> Option<&Failure> {
        match self {
            EventPayload::RuleHandlerFailed(f) | EventPayload::CollectionHandlerFailed(f) => {
                Some(f)
            }
            _ => None,
        }
    }
}

/// An emitted event: payload stamped with the emission time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub time: DateTime<Utc>,
    #[serde(flatten)]
    pub payload: EventPayload,
}

impl Event {
    pub fn event_type(&self) -> EventType {
        self.payload.event_type()
    }
}
