//! In-memory [`RecordStore`] with an optional JSON snapshot file.
//!
//! Every mutation happens under one lock, which also makes the task-ledger
//! claim a single atomic compare-and-set. With a snapshot path configured,
//! the whole state is rewritten (tmp file + rename) after each mutation and
//! reloaded on open, so the ledger survives restarts. A mutation only
//! becomes visible once its snapshot is written.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use culler_core::{
    Collection, CollectionLog, CollectionMedia, Exclusion, HandledMedia, MediaId, RecordId,
    TaskRunning,
};
use culler_rules::RuleGroup;

use crate::error::{StoreError, StoreResult};
use crate::store::{RecordStore, TaskClaim};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct State {
    next_id: RecordId,
    rule_groups: BTreeMap<RecordId, RuleGroup>,
    collections: BTreeMap<RecordId, Collection>,
    collection_media: BTreeMap<RecordId, CollectionMedia>,
    #[serde(default)]
    handled: BTreeMap<RecordId, HandledMedia>,
    exclusions: BTreeMap<RecordId, Exclusion>,
    logs: BTreeMap<RecordId, CollectionLog>,
    tasks: BTreeMap<String, TaskRunning>,
}

impl State {
    fn allocate(&mut self) -> RecordId {
        self.next_id += 1;
        self.next_id
    }

    fn remove_collection_cascade(&mut self, id: RecordId) {
        self.collections.remove(&id);
        self.collection_media.retain(|_, m| m.collection_id != id);
        self.handled.retain(|_, h| h.collection_id != id);
        self.logs.retain(|_, l| l.collection_id != id);
        for group in self.rule_groups.values_mut() {
            if group.collection_id == Some(id) {
                group.collection_id = None;
            }
        }
    }
}

pub struct MemoryStore {
    state: Mutex<State>,
    snapshot: Option<PathBuf>,
}

impl MemoryStore {
    /// Volatile store.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            snapshot: None,
        }
    }

    /// Store persisted to `path`. Loads the snapshot when the file exists.
    pub fn open(path: impl Into<PathBuf>) -> StoreResult<Self> {
        let path = path.into();
        let state = if path.exists() {
            let json = fs::read_to_string(&path)?;
            let state: State = serde_json::from_str(&json)?;
            info!(
                path = %path.display(),
                rule_groups = state.rule_groups.len(),
                collections = state.collections.len(),
                "loaded store snapshot"
            );
            state
        } else {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }
            State::default()
        };
        Ok(Self {
            state: Mutex::new(state),
            snapshot: Some(path),
        })
    }

    /// Open the configured snapshot, or a volatile store when none is set.
    pub fn from_config(config: &culler_core::config::StorageConfig) -> StoreResult<Self> {
        match &config.snapshot_path {
            Some(path) => Self::open(path),
            None => Ok(Self::new()),
        }
    }

    pub fn snapshot_path(&self) -> Option<&Path> {
        self.snapshot.as_deref()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `f` on a copy of the state and install the copy once it is
    /// persisted. A failed closure or snapshot write leaves the state as it
    /// was.
    fn mutate<T>(&self, f: impl FnOnce(&mut State) -> StoreResult<T>) -> StoreResult<T> {
        let mut state = self.lock();
        let mut next = state.clone();
        let out = f(&mut next)?;
        if let Some(path) = &self.snapshot {
            if let Err(e) = write_snapshot(path, &next) {
                warn!(path = %path.display(), error = %e, "snapshot write failed, change discarded");
                return Err(e);
            }
        }
        *state = next;
        Ok(out)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn write_snapshot(path: &Path, state: &State) -> StoreResult<()> {
    let json = serde_json::to_string_pretty(state)?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json)?;
    fs::rename(&tmp, path)?;
    debug!(path = %path.display(), "wrote store snapshot");
    Ok(())
}

#[async_trait]
impl RecordStore for MemoryStore {
    // ── Rule groups ─────────────────────────────────────────────

    async fn rule_groups(&self) -> StoreResult<Vec<RuleGroup>> {
        Ok(self.lock().rule_groups.values().cloned().collect())
    }

    async fn rule_group(&self, id: RecordId) -> StoreResult<Option<RuleGroup>> {
        Ok(self.lock().rule_groups.get(&id).cloned())
    }

    async fn save_rule_group(&self, mut group: RuleGroup) -> StoreResult<RuleGroup> {
        self.mutate(|state| {
            if let Some(cid) = group.collection_id {
                if !state.collections.contains_key(&cid) {
                    return Err(StoreError::not_found("collection", cid));
                }
            }
            if group.id == 0 {
                group.id = state.allocate();
            }
            state.rule_groups.insert(group.id, group.clone());
            Ok(group)
        })
    }

    async fn delete_rule_group(&self, id: RecordId) -> StoreResult<()> {
        self.mutate(|state| {
            let group = state
                .rule_groups
                .remove(&id)
                .ok_or_else(|| StoreError::not_found("rule group", id))?;
            state.exclusions.retain(|_, e| e.rule_group_id != Some(id));
            if let Some(cid) = group.collection_id {
                state.remove_collection_cascade(cid);
            }
            Ok(())
        })
    }

    // ── Collections ─────────────────────────────────────────────

    async fn collections(&self) -> StoreResult<Vec<Collection>> {
        Ok(self.lock().collections.values().cloned().collect())
    }

    async fn collection(&self, id: RecordId) -> StoreResult<Option<Collection>> {
        Ok(self.lock().collections.get(&id).cloned())
    }

    async fn save_collection(&self, mut collection: Collection) -> StoreResult<Collection> {
        self.mutate(|state| {
            if collection.id == 0 {
                collection.id = state.allocate();
            }
            state.collections.insert(collection.id, collection.clone());
            Ok(collection)
        })
    }

    async fn delete_collection(&self, id: RecordId) -> StoreResult<()> {
        self.mutate(|state| {
            if !state.collections.contains_key(&id) {
                return Err(StoreError::not_found("collection", id));
            }
            state.remove_collection_cascade(id);
            Ok(())
        })
    }

    // ── Collection members ──────────────────────────────────────

    async fn collection_media(&self, collection_id: RecordId) -> StoreResult<Vec<CollectionMedia>> {
        Ok(self
            .lock()
            .collection_media
            .values()
            .filter(|m| m.collection_id == collection_id)
            .cloned()
            .collect())
    }

    async fn add_collection_media(&self, mut media: CollectionMedia) -> StoreResult<CollectionMedia> {
        self.mutate(|state| {
            if !state.collections.contains_key(&media.collection_id) {
                return Err(StoreError::not_found("collection", media.collection_id));
            }
            let duplicate = state
                .collection_media
                .values()
                .any(|m| m.collection_id == media.collection_id && m.media_id == media.media_id);
            if duplicate {
                return Err(StoreError::Conflict(format!(
                    "media {} already in collection {}",
                    media.media_id, media.collection_id
                )));
            }
            media.id = state.allocate();
            state.collection_media.insert(media.id, media.clone());
            Ok(media)
        })
    }

    async fn remove_collection_media(
        &self,
        collection_id: RecordId,
        media_id: &str,
    ) -> StoreResult<bool> {
        self.mutate(|state| {
            let before = state.collection_media.len();
            state
                .collection_media
                .retain(|_, m| !(m.collection_id == collection_id && m.media_id == media_id));
            Ok(state.collection_media.len() != before)
        })
    }

    // ── Handled media ───────────────────────────────────────────

    async fn handled_media(&self, collection_id: RecordId) -> StoreResult<Vec<HandledMedia>> {
        Ok(self
            .lock()
            .handled
            .values()
            .filter(|h| h.collection_id == collection_id)
            .cloned()
            .collect())
    }

    async fn mark_handled(&self, mut handled: HandledMedia) -> StoreResult<HandledMedia> {
        self.mutate(|state| {
            state.handled.retain(|_, h| {
                !(h.collection_id == handled.collection_id && h.media_id == handled.media_id)
            });
            handled.id = state.allocate();
            state.handled.insert(handled.id, handled.clone());
            Ok(handled)
        })
    }

    async fn clear_handled(&self, collection_id: RecordId, media_id: &str) -> StoreResult<bool> {
        self.mutate(|state| {
            let before = state.handled.len();
            state
                .handled
                .retain(|_, h| !(h.collection_id == collection_id && h.media_id == media_id));
            Ok(state.handled.len() != before)
        })
    }

    // ── Exclusions ──────────────────────────────────────────────

    async fn exclusions(&self) -> StoreResult<Vec<Exclusion>> {
        Ok(self.lock().exclusions.values().cloned().collect())
    }

    async fn save_exclusion(&self, mut exclusion: Exclusion) -> StoreResult<Exclusion> {
        self.mutate(|state| {
            let existing = state.exclusions.values().find(|e| {
                e.media_id == exclusion.media_id && e.rule_group_id == exclusion.rule_group_id
            });
            if let Some(existing) = existing {
                return Ok(existing.clone());
            }
            exclusion.id = state.allocate();
            state.exclusions.insert(exclusion.id, exclusion.clone());
            Ok(exclusion)
        })
    }

    async fn delete_exclusion(&self, id: RecordId) -> StoreResult<bool> {
        self.mutate(|state| Ok(state.exclusions.remove(&id).is_some()))
    }

    async fn delete_exclusions_for_media(&self, media_id: &MediaId) -> StoreResult<usize> {
        self.mutate(|state| {
            let before = state.exclusions.len();
            state
                .exclusions
                .retain(|_, e| &e.media_id != media_id && e.parent.as_ref() != Some(media_id));
            Ok(before - state.exclusions.len())
        })
    }

    // ── Collection logs ─────────────────────────────────────────

    async fn append_log(&self, mut log: CollectionLog) -> StoreResult<CollectionLog> {
        self.mutate(|state| {
            log.id = state.allocate();
            state.logs.insert(log.id, log.clone());
            Ok(log)
        })
    }

    async fn logs(&self, collection_id: RecordId) -> StoreResult<Vec<CollectionLog>> {
        Ok(self
            .lock()
            .logs
            .values()
            .filter(|l| l.collection_id == collection_id)
            .cloned()
            .collect())
    }

    async fn prune_logs(&self, collection_id: RecordId, before: DateTime<Utc>) -> StoreResult<usize> {
        self.mutate(|state| {
            let count = state.logs.len();
            state
                .logs
                .retain(|_, l| !(l.collection_id == collection_id && l.timestamp < before));
            Ok(count - state.logs.len())
        })
    }

    // ── Task ledger ─────────────────────────────────────────────

    async fn try_start_task(
        &self,
        name: &str,
        now: DateTime<Utc>,
        stale_after: Option<Duration>,
    ) -> StoreResult<TaskClaim> {
        self.mutate(|state| {
            let row = state
                .tasks
                .entry(name.to_string())
                .or_insert_with(|| TaskRunning::idle(name));

            let claim = if !row.running {
                TaskClaim::Started
            } else {
                let stale = match (stale_after, row.running_since) {
                    (Some(limit), Some(since)) => now - since >= limit,
                    // A running row without a start time can only be stale.
                    (Some(_), None) => true,
                    (None, _) => false,
                };
                if !stale {
                    return Ok(TaskClaim::AlreadyRunning {
                        since: row.running_since,
                    });
                }
                warn!(task = %name, since = ?row.running_since, "reclaiming stale task ledger row");
                TaskClaim::Reclaimed {
                    since: row.running_since,
                }
            };
            row.running = true;
            row.running_since = Some(now);
            Ok(claim)
        })
    }

    async fn finish_task(&self, name: &str) -> StoreResult<()> {
        self.mutate(|state| {
            state
                .tasks
                .insert(name.to_string(), TaskRunning::idle(name));
            Ok(())
        })
    }

    async fn task_status(&self, name: &str) -> StoreResult<TaskRunning> {
        Ok(self
            .lock()
            .tasks
            .get(name)
            .cloned()
            .unwrap_or_else(|| TaskRunning::idle(name)))
    }

    async fn task_statuses(&self) -> StoreResult<Vec<TaskRunning>> {
        Ok(self.lock().tasks.values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use culler_core::{CollectionLogType, DataType};
    use std::sync::Arc;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()
    }

    fn member(collection_id: RecordId, media_id: &str) -> CollectionMedia {
        CollectionMedia {
            id: 0,
            collection_id,
            media_id: media_id.to_string(),
            tmdb_id: None,
            tvdb_id: None,
            add_date: t0(),
            image_path: None,
            is_manual: false,
        }
    }

    fn log(collection_id: RecordId, at: DateTime<Utc>) -> CollectionLog {
        CollectionLog {
            id: 0,
            collection_id,
            timestamp: at,
            message: "added".to_string(),
            log_type: CollectionLogType::Media,
            meta: None,
        }
    }

    #[tokio::test]
    async fn members_are_unique_per_collection() {
        let store = MemoryStore::new();
        let c = store
            .save_collection(Collection::new("Old", "1", DataType::Movie))
            .await
            .unwrap();
        store.add_collection_media(member(c.id, "m1")).await.unwrap();
        let dup = store.add_collection_media(member(c.id, "m1")).await;
        assert!(matches!(dup, Err(StoreError::Conflict(_))));
        assert_eq!(store.collection_media(c.id).await.unwrap().len(), 1);

        assert!(store.remove_collection_media(c.id, "m1").await.unwrap());
        assert!(!store.remove_collection_media(c.id, "m1").await.unwrap());
    }

    #[tokio::test]
    async fn deleting_rule_group_cascades() {
        let store = MemoryStore::new();
        let c = store
            .save_collection(Collection::new("Old", "1", DataType::Movie))
            .await
            .unwrap();
        let mut group = RuleGroup::new("Old", "1", DataType::Movie);
        group.collection_id = Some(c.id);
        let group = store.save_rule_group(group).await.unwrap();
        store.add_collection_media(member(c.id, "m1")).await.unwrap();
        store.append_log(log(c.id, t0())).await.unwrap();
        store
            .save_exclusion(Exclusion {
                id: 0,
                media_id: "m2".into(),
                rule_group_id: Some(group.id),
                parent: None,
                data_type: None,
            })
            .await
            .unwrap();
        store
            .save_exclusion(Exclusion {
                id: 0,
                media_id: "m3".into(),
                rule_group_id: None,
                parent: None,
                data_type: None,
            })
            .await
            .unwrap();

        store.delete_rule_group(group.id).await.unwrap();
        assert!(store.collection(c.id).await.unwrap().is_none());
        assert!(store.collection_media(c.id).await.unwrap().is_empty());
        assert!(store.logs(c.id).await.unwrap().is_empty());
        let remaining = store.exclusions().await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].media_id, "m3");
    }

    #[tokio::test]
    async fn handled_markers_are_unique_and_cascade() {
        let store = MemoryStore::new();
        let c = store
            .save_collection(Collection::new("Old", "1", DataType::Movie))
            .await
            .unwrap();
        let marker = |at| HandledMedia {
            id: 0,
            collection_id: c.id,
            media_id: "m1".to_string(),
            handled_at: at,
            action: culler_core::ArrAction::Unmonitor,
        };
        store.mark_handled(marker(t0())).await.unwrap();
        store
            .mark_handled(marker(t0() + Duration::days(1)))
            .await
            .unwrap();
        let handled = store.handled_media(c.id).await.unwrap();
        assert_eq!(handled.len(), 1);
        assert_eq!(handled[0].handled_at, t0() + Duration::days(1));

        assert!(store.clear_handled(c.id, "m1").await.unwrap());
        assert!(!store.clear_handled(c.id, "m1").await.unwrap());

        store.mark_handled(marker(t0())).await.unwrap();
        store.delete_collection(c.id).await.unwrap();
        assert!(store.handled_media(c.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn deleting_collection_unlinks_rule_group() {
        let store = MemoryStore::new();
        let c = store
            .save_collection(Collection::new("Old", "1", DataType::Movie))
            .await
            .unwrap();
        let mut group = RuleGroup::new("Old", "1", DataType::Movie);
        group.collection_id = Some(c.id);
        let group = store.save_rule_group(group).await.unwrap();

        store.delete_collection(c.id).await.unwrap();
        let group = store.rule_group(group.id).await.unwrap().unwrap();
        assert_eq!(group.collection_id, None);
    }

    #[tokio::test]
    async fn exclusions_for_group_include_library_wide() {
        let store = MemoryStore::new();
        for (media, group) in [("a", Some(1)), ("b", Some(2)), ("c", None)] {
            store
                .save_exclusion(Exclusion {
                    id: 0,
                    media_id: media.into(),
                    rule_group_id: group,
                    parent: None,
                    data_type: None,
                })
                .await
                .unwrap();
        }
        let ids: Vec<String> = store
            .exclusions_for_group(1)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.media_id)
            .collect();
        assert_eq!(ids, vec!["a".to_string(), "c".to_string()]);
    }

    #[tokio::test]
    async fn deleting_media_exclusions_cascades_to_children() {
        let store = MemoryStore::new();
        for (media, parent) in [("show1", None), ("s1", Some("show1")), ("other", None)] {
            store
                .save_exclusion(Exclusion {
                    id: 0,
                    media_id: media.into(),
                    rule_group_id: None,
                    parent: parent.map(String::from),
                    data_type: None,
                })
                .await
                .unwrap();
        }
        let removed = store
            .delete_exclusions_for_media(&"show1".to_string())
            .await
            .unwrap();
        assert_eq!(removed, 2);
        assert_eq!(store.exclusions().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn prune_logs_is_scoped_and_bounded() {
        let store = MemoryStore::new();
        store.append_log(log(1, t0())).await.unwrap();
        store.append_log(log(1, t0() + Duration::days(40))).await.unwrap();
        store.append_log(log(2, t0())).await.unwrap();

        let pruned = store.prune_logs(1, t0() + Duration::days(30)).await.unwrap();
        assert_eq!(pruned, 1);
        assert_eq!(store.logs(1).await.unwrap().len(), 1);
        assert_eq!(store.logs(2).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn ledger_claim_is_exclusive() {
        let store = MemoryStore::new();
        assert_eq!(
            store.try_start_task("rules", t0(), None).await.unwrap(),
            TaskClaim::Started
        );
        assert_eq!(
            store.try_start_task("rules", t0(), None).await.unwrap(),
            TaskClaim::AlreadyRunning { since: Some(t0()) }
        );
        // Other task names are independent.
        assert!(store
            .try_start_task("collections", t0(), None)
            .await
            .unwrap()
            .acquired());

        store.finish_task("rules").await.unwrap();
        assert!(!store.task_status("rules").await.unwrap().running);
        assert!(store.try_start_task("rules", t0(), None).await.unwrap().acquired());
    }

    #[tokio::test]
    async fn concurrent_claims_admit_exactly_one() {
        let store = Arc::new(MemoryStore::new());
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.try_start_task("rules", t0(), None).await })
            })
            .collect();
        let mut started = 0;
        for h in handles {
            if h.await.unwrap().unwrap().acquired() {
                started += 1;
            }
        }
        assert_eq!(started, 1);
    }

    #[tokio::test]
    async fn stale_rows_reclaimed_only_when_configured() {
        let store = MemoryStore::new();
        store.try_start_task("rules", t0(), None).await.unwrap();
        let later = t0() + Duration::hours(5);

        let claim = store.try_start_task("rules", later, None).await.unwrap();
        assert!(!claim.acquired());

        let claim = store
            .try_start_task("rules", later, Some(Duration::hours(6)))
            .await
            .unwrap();
        assert!(!claim.acquired());

        let claim = store
            .try_start_task("rules", later, Some(Duration::hours(4)))
            .await
            .unwrap();
        assert_eq!(claim, TaskClaim::Reclaimed { since: Some(t0()) });
        assert_eq!(
            store.task_status("rules").await.unwrap().running_since,
            Some(later)
        );
    }

    #[tokio::test]
    async fn snapshot_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("culler.json");

        {
            let store = MemoryStore::open(&path).unwrap();
            let c = store
                .save_collection(Collection::new("Old", "1", DataType::Movie))
                .await
                .unwrap();
            store.add_collection_media(member(c.id, "m1")).await.unwrap();
            store.try_start_task("rules", t0(), None).await.unwrap();
        }

        let reopened = MemoryStore::open(&path).unwrap();
        let collections = reopened.collections().await.unwrap();
        assert_eq!(collections.len(), 1);
        assert_eq!(
            reopened.collection_media(collections[0].id).await.unwrap().len(),
            1
        );
        // A run that crashed leaves the ledger row running.
        assert!(reopened.task_status("rules").await.unwrap().running);

        // Ids keep increasing across restarts.
        let next = reopened
            .save_collection(Collection::new("New", "1", DataType::Movie))
            .await
            .unwrap();
        assert!(next.id > collections[0].id);
    }

    #[tokio::test]
    async fn failed_snapshot_write_discards_the_change() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("culler.json");
        let store = MemoryStore::open(&path).unwrap();
        let c = store
            .save_collection(Collection::new("Old", "1", DataType::Movie))
            .await
            .unwrap();

        // A directory where the tmp file goes makes every write fail.
        fs::create_dir(path.with_extension("json.tmp")).unwrap();

        assert!(store.try_start_task("rules", t0(), None).await.is_err());
        assert!(!store.task_status("rules").await.unwrap().running);
        assert!(store.add_collection_media(member(c.id, "m1")).await.is_err());
        assert!(store.collection_media(c.id).await.unwrap().is_empty());

        fs::remove_dir(path.with_extension("json.tmp")).unwrap();
        assert_eq!(
            store.try_start_task("rules", t0(), None).await.unwrap(),
            TaskClaim::Started
        );
        let reopened = MemoryStore::open(&path).unwrap();
        assert!(reopened.task_status("rules").await.unwrap().running);
    }

    #[test]
    fn missing_snapshot_dir_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("store.json");
        let store = MemoryStore::open(&path).unwrap();
        assert_eq!(store.snapshot_path(), Some(path.as_path()));
        assert!(path.parent().unwrap().exists());
    }
}
