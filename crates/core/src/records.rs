//! Persisted record types shared by the rules, collections and task crates.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::media::{DataType, MediaId};

pub type RecordId = i64;

// ── Collections ─────────────────────────────────────────────────────

/// Side effect applied through the download manager once an item's
/// retention window has elapsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ArrAction {
    #[default]
    Delete,
    UnmonitorDeleteAll,
    UnmonitorDeleteExisting,
    Unmonitor,
    DoNothing,
}

impl ArrAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArrAction::Delete => "delete",
            ArrAction::UnmonitorDeleteAll => "unmonitor_delete_all",
            ArrAction::UnmonitorDeleteExisting => "unmonitor_delete_existing",
            ArrAction::Unmonitor => "unmonitor",
            ArrAction::DoNothing => "do_nothing",
        }
    }
}

impl std::fmt::Display for ArrAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A curated grouping maintained on the media server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Collection {
    pub id: RecordId,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    /// External collection identity; `None` until first sync.
    #[serde(default)]
    pub plex_id: Option<String>,
    pub library_id: String,
    pub data_type: DataType,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub arr_action: ArrAction,
    /// Retention window in days; `None` acts immediately.
    #[serde(default)]
    pub delete_after_days: Option<u32>,
    #[serde(default)]
    pub manual_collection: bool,
    #[serde(default)]
    pub list_exclusions: bool,
    #[serde(default)]
    pub force_overseerr: bool,
    #[serde(default)]
    pub visible_on_home: bool,
    #[serde(default)]
    pub visible_on_recommended: bool,
    /// 0 keeps logs forever.
    #[serde(default = "default_keep_logs")]
    pub keep_logs_for_months: u32,
    #[serde(default)]
    pub handled_media_amount: u64,
    #[serde(default)]
    pub last_duration_in_seconds: u64,
    #[serde(default)]
    pub tautulli_watched_percent_override: Option<f64>,
}

fn default_true() -> bool {
    true
}

fn default_keep_logs() -> u32 {
    6
}

impl Collection {
    /// New active collection with default settings. `id` is assigned on save.
    pub fn new(title: impl Into<String>, library_id: impl Into<String>, data_type: DataType) -> Self {
        Self {
            id: 0,
            title: title.into(),
            description: None,
            plex_id: None,
            library_id: library_id.into(),
            data_type,
            is_active: true,
            arr_action: ArrAction::default(),
            delete_after_days: None,
            manual_collection: false,
            list_exclusions: false,
            force_overseerr: false,
            visible_on_home: false,
            visible_on_recommended: false,
            keep_logs_for_months: default_keep_logs(),
            handled_media_amount: 0,
            last_duration_in_seconds: 0,
            tautulli_watched_percent_override: None,
        }
    }

    /// Instant at which a member added at `added` becomes due for the arr action.
    ///
    /// A window past the representable range is never due.
    pub fn due_at(&self, added: DateTime<Utc>) -> DateTime<Utc> {
        match self.delete_after_days {
            Some(days) => Duration::try_days(i64::from(days))
                .and_then(|window| added.checked_add_signed(window))
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
            None => added,
        }
    }
}

/// One tracked member of a collection. Unique per `(collection_id, media_id)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionMedia {
    pub id: RecordId,
    pub collection_id: RecordId,
    pub media_id: MediaId,
    #[serde(default)]
    pub tmdb_id: Option<i64>,
    #[serde(default)]
    pub tvdb_id: Option<i64>,
    pub add_date: DateTime<Utc>,
    #[serde(default)]
    pub image_path: Option<String>,
    #[serde(default)]
    pub is_manual: bool,
}

/// An item whose arr action already ran for a collection.
///
/// While the marker exists the item is not added back to that collection,
/// however long it keeps matching. It is dropped once the item stops
/// matching or leaves the library, or when a user adds it by hand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandledMedia {
    pub id: RecordId,
    pub collection_id: RecordId,
    pub media_id: MediaId,
    pub handled_at: DateTime<Utc>,
    pub action: ArrAction,
}

// ── Exclusions ──────────────────────────────────────────────────────

/// Standing override that keeps an item out of rule-driven collections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exclusion {
    pub id: RecordId,
    pub media_id: MediaId,
    /// Scope to one rule group; library-wide when `None`.
    #[serde(default)]
    pub rule_group_id: Option<RecordId>,
    /// Show or season the excluded item belongs to.
    #[serde(default)]
    pub parent: Option<MediaId>,
    #[serde(default)]
    pub data_type: Option<DataType>,
}

impl Exclusion {
    pub fn applies_to_group(&self, rule_group_id: RecordId) -> bool {
        self.rule_group_id.map_or(true, |id| id == rule_group_id)
    }
}

// ── Collection logs ─────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionLogType {
    Collection,
    Media,
    Rules,
}

/// Typed payload explaining why a log row was written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LogMeta {
    /// The item started matching the rule group.
    RuleMatched {
        rule_group_id: RecordId,
        rule_group_name: String,
    },
    /// The item stopped matching the rule group.
    RuleUnmatched {
        rule_group_id: RecordId,
        rule_group_name: String,
    },
    /// The item became excluded while it was a member.
    Excluded { rule_group_id: RecordId },
    /// The retention window elapsed and the arr action ran.
    Handled { action: ArrAction },
    /// A user added or removed the item by hand.
    Manual { added: bool },
    /// The item disappeared from the media library.
    Missing,
}

/// Append-only audit row attached to a collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionLog {
    pub id: RecordId,
    pub collection_id: RecordId,
    pub timestamp: DateTime<Utc>,
    pub message: String,
    pub log_type: CollectionLogType,
    #[serde(default)]
    pub meta: Option<LogMeta>,
}

// ── Task ledger ─────────────────────────────────────────────────────

/// Mutual-exclusion ledger row for one named task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRunning {
    pub name: String,
    pub running: bool,
    #[serde(default)]
    pub running_since: Option<DateTime<Utc>>,
}

impl TaskRunning {
    pub fn idle(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            running: false,
            running_since: None,
        }
    }
}
