//! The record-store abstraction every component persists through.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use culler_core::{
    Collection, CollectionLog, CollectionMedia, Exclusion, HandledMedia, MediaId, RecordId,
    TaskRunning,
};
use culler_rules::RuleGroup;

use crate::error::StoreResult;

/// Outcome of trying to claim a task in the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "claim", rename_all = "snake_case")]
pub enum TaskClaim {
    /// The ledger row went from idle to running.
    Started,
    /// Another run holds the row.
    AlreadyRunning { since: Option<DateTime<Utc>> },
    /// A stale running row was taken over.
    Reclaimed { since: Option<DateTime<Utc>> },
}

impl TaskClaim {
    pub fn acquired(&self) -> bool {
        !matches!(self, TaskClaim::AlreadyRunning { .. })
    }
}

/// Persistence for rule groups, collections and their children, exclusions,
/// collection logs and the task ledger.
///
/// Deleting a rule group deletes its linked collection; deleting a
/// collection deletes its members, handled markers and logs and unlinks
/// rule groups.
#[async_trait]
pub trait RecordStore: Send + Sync {
    // ── Rule groups ─────────────────────────────────────────────

    async fn rule_groups(&self) -> StoreResult<Vec<RuleGroup>>;

    async fn rule_group(&self, id: RecordId) -> StoreResult<Option<RuleGroup>>;

    /// Insert (id 0) or replace a rule group. Returns the stored row.
    async fn save_rule_group(&self, group: RuleGroup) -> StoreResult<RuleGroup>;

    async fn delete_rule_group(&self, id: RecordId) -> StoreResult<()>;

    // ── Collections ─────────────────────────────────────────────

    async fn collections(&self) -> StoreResult<Vec<Collection>>;

    async fn collection(&self, id: RecordId) -> StoreResult<Option<Collection>>;

    async fn save_collection(&self, collection: Collection) -> StoreResult<Collection>;

    async fn delete_collection(&self, id: RecordId) -> StoreResult<()>;

    // ── Collection members ──────────────────────────────────────

    async fn collection_media(&self, collection_id: RecordId) -> StoreResult<Vec<CollectionMedia>>;

    /// Insert a member. Fails with a conflict if `(collection_id, media_id)`
    /// is already tracked.
    async fn add_collection_media(&self, media: CollectionMedia) -> StoreResult<CollectionMedia>;

    /// Remove a member; returns whether a row was deleted.
    async fn remove_collection_media(
        &self,
        collection_id: RecordId,
        media_id: &str,
    ) -> StoreResult<bool>;

    // ── Handled media ───────────────────────────────────────────

    async fn handled_media(&self, collection_id: RecordId) -> StoreResult<Vec<HandledMedia>>;

    /// Record a handled item, replacing an earlier marker for the same
    /// `(collection_id, media_id)`.
    async fn mark_handled(&self, handled: HandledMedia) -> StoreResult<HandledMedia>;

    /// Drop the marker; returns whether one existed.
    async fn clear_handled(&self, collection_id: RecordId, media_id: &str) -> StoreResult<bool>;

    // ── Exclusions ──────────────────────────────────────────────

    async fn exclusions(&self) -> StoreResult<Vec<Exclusion>>;

    /// Group-specific plus library-wide exclusions.
    async fn exclusions_for_group(&self, rule_group_id: RecordId) -> StoreResult<Vec<Exclusion>> {
        Ok(self
            .exclusions()
            .await?
            .into_iter()
            .filter(|e| e.applies_to_group(rule_group_id))
            .collect())
    }

    async fn save_exclusion(&self, exclusion: Exclusion) -> StoreResult<Exclusion>;

    async fn delete_exclusion(&self, id: RecordId) -> StoreResult<bool>;

    /// Delete every exclusion of `media_id` and of items whose parent it is.
    async fn delete_exclusions_for_media(&self, media_id: &MediaId) -> StoreResult<usize>;

    // ── Collection logs ─────────────────────────────────────────

    async fn append_log(&self, log: CollectionLog) -> StoreResult<CollectionLog>;

    async fn logs(&self, collection_id: RecordId) -> StoreResult<Vec<CollectionLog>>;

    /// Delete a collection's logs older than `before`; returns the count.
    async fn prune_logs(&self, collection_id: RecordId, before: DateTime<Utc>) -> StoreResult<usize>;

    // ── Task ledger ─────────────────────────────────────────────

    /// Atomically move `name` from idle to running.
    ///
    /// When `stale_after` is set, a running row older than that is reclaimed.
    async fn try_start_task(
        &self,
        name: &str,
        now: DateTime<Utc>,
        stale_after: Option<Duration>,
    ) -> StoreResult<TaskClaim>;

    /// Mark `name` idle. Idempotent.
    async fn finish_task(&self, name: &str) -> StoreResult<()>;

    /// Ledger row for `name`; idle when never started.
    async fn task_status(&self, name: &str) -> StoreResult<TaskRunning>;

    async fn task_statuses(&self) -> StoreResult<Vec<TaskRunning>>;
}
