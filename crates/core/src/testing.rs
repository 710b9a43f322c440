//! In-memory fakes for the capability providers plus a settable clock.
//!
//! Enabled for this crate's tests and, through the `testing` feature, for the
//! tests of every downstream crate.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use crate::clock::Clock;
use crate::error::{ProviderError, ProviderResult};
use crate::media::{DataType, MediaItem, WatchRecord};
use crate::providers::{
    ArrMedia, CollectionRequest, DownloadManager, MediaServer, MediaTarget, Providers,
    RequestInfo, RequestManager, WatchStats,
};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

// ── Clock ───────────────────────────────────────────────────────────

/// Clock pinned to an instant that tests move explicitly.
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Arc<Self> {
        Arc::new(Self {
            now: Mutex::new(now),
        })
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *lock(&self.now) = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut guard = lock(&self.now);
        *guard += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *lock(&self.now)
    }
}

// ── Media server ────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct MediaServerState {
    items: Vec<MediaItem>,
    history: HashMap<String, Vec<WatchRecord>>,
    collections: HashMap<String, Vec<String>>,
    visibility: HashMap<String, (bool, bool)>,
    deleted: Vec<String>,
    next_collection: u64,
    failing_items: HashSet<String>,
    fail_library: bool,
    metadata_calls: usize,
    history_calls: usize,
}

/// Media server backed by a vector of items.
#[derive(Debug, Default)]
pub struct FakeMediaServer {
    state: Mutex<MediaServerState>,
}

impl FakeMediaServer {
    pub fn new(items: Vec<MediaItem>) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(MediaServerState {
                items,
                ..Default::default()
            }),
        })
    }

    pub fn set_items(&self, items: Vec<MediaItem>) {
        lock(&self.state).items = items;
    }

    pub fn remove_item(&self, id: &str) {
        lock(&self.state).items.retain(|i| i.id != id);
    }

    pub fn set_history(&self, id: &str, history: Vec<WatchRecord>) {
        lock(&self.state).history.insert(id.to_string(), history);
    }

    /// Make `watch_history` fail for one item.
    pub fn fail_item(&self, id: &str) {
        lock(&self.state).failing_items.insert(id.to_string());
    }

    /// Make `library_items` fail.
    pub fn fail_library(&self, fail: bool) {
        lock(&self.state).fail_library = fail;
    }

    pub fn collection_members(&self, collection_id: &str) -> Vec<String> {
        lock(&self.state)
            .collections
            .get(collection_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn collection_exists(&self, collection_id: &str) -> bool {
        lock(&self.state).collections.contains_key(collection_id)
    }

    pub fn visibility(&self, collection_id: &str) -> Option<(bool, bool)> {
        lock(&self.state).visibility.get(collection_id).copied()
    }

    pub fn deleted_media(&self) -> Vec<String> {
        lock(&self.state).deleted.clone()
    }

    pub fn history_calls(&self) -> usize {
        lock(&self.state).history_calls
    }

    pub fn metadata_calls(&self) -> usize {
        lock(&self.state).metadata_calls
    }
}

#[async_trait]
impl MediaServer for FakeMediaServer {
    async fn library_items(
        &self,
        library_id: &str,
        data_type: DataType,
    ) -> ProviderResult<Vec<MediaItem>> {
        let state = lock(&self.state);
        if state.fail_library {
            return Err(ProviderError::request("plex", "library unavailable"));
        }
        Ok(state
            .items
            .iter()
            .filter(|i| i.library_id == library_id && i.data_type == data_type)
            .cloned()
            .collect())
    }

    async fn metadata(&self, id: &str) -> ProviderResult<Option<MediaItem>> {
        let mut state = lock(&self.state);
        state.metadata_calls += 1;
        Ok(state.items.iter().find(|i| i.id == id).cloned())
    }

    async fn watch_history(&self, id: &str) -> ProviderResult<Vec<WatchRecord>> {
        let mut state = lock(&self.state);
        state.history_calls += 1;
        if state.failing_items.contains(id) {
            return Err(ProviderError::request("plex", format!("history for {id}")));
        }
        Ok(state.history.get(id).cloned().unwrap_or_default())
    }

    async fn create_collection(&self, request: &CollectionRequest) -> ProviderResult<String> {
        let mut state = lock(&self.state);
        state.next_collection += 1;
        let id = format!("plex-col-{}-{}", request.library_id, state.next_collection);
        state.collections.insert(id.clone(), Vec::new());
        Ok(id)
    }

    async fn delete_collection(&self, collection_id: &str) -> ProviderResult<()> {
        lock(&self.state).collections.remove(collection_id);
        Ok(())
    }

    async fn add_to_collection(&self, collection_id: &str, item_id: &str) -> ProviderResult<()> {
        let mut state = lock(&self.state);
        let members = state
            .collections
            .get_mut(collection_id)
            .ok_or_else(|| ProviderError::request("plex", "unknown collection"))?;
        if !members.iter().any(|m| m == item_id) {
            members.push(item_id.to_string());
        }
        Ok(())
    }

    async fn remove_from_collection(
        &self,
        collection_id: &str,
        item_id: &str,
    ) -> ProviderResult<()> {
        let mut state = lock(&self.state);
        if let Some(members) = state.collections.get_mut(collection_id) {
            members.retain(|m| m != item_id);
        }
        Ok(())
    }

    async fn set_collection_visibility(
        &self,
        collection_id: &str,
        home: bool,
        recommended: bool,
    ) -> ProviderResult<()> {
        lock(&self.state)
            .visibility
            .insert(collection_id.to_string(), (home, recommended));
        Ok(())
    }

    async fn delete_media(&self, item_id: &str) -> ProviderResult<()> {
        let mut state = lock(&self.state);
        state.deleted.push(item_id.to_string());
        state.items.retain(|i| i.id != item_id);
        Ok(())
    }
}

// ── Download manager ────────────────────────────────────────────────

/// One recorded call into a fake download manager.
#[derive(Debug, Clone, PartialEq)]
pub enum ArrCall {
    Delete(MediaTarget),
    Unmonitor {
        target: MediaTarget,
        delete_files: bool,
    },
    UnmonitorExistingSeasons(MediaTarget),
}

#[derive(Debug, Default)]
pub struct FakeDownloadManager {
    service: &'static str,
    media: Mutex<HashMap<i64, ArrMedia>>,
    exclusions: Mutex<Vec<i64>>,
    calls: Mutex<Vec<ArrCall>>,
    lookups: Mutex<usize>,
}

impl FakeDownloadManager {
    pub fn new(service: &'static str) -> Arc<Self> {
        Arc::new(Self {
            service,
            ..Default::default()
        })
    }

    /// Register what the service knows about an external id (tmdb for
    /// movies, tvdb for series).
    pub fn insert(&self, external_id: i64, media: ArrMedia) {
        lock(&self.media).insert(external_id, media);
    }

    pub fn set_exclusions(&self, ids: Vec<i64>) {
        *lock(&self.exclusions) = ids;
    }

    pub fn calls(&self) -> Vec<ArrCall> {
        lock(&self.calls).clone()
    }

    pub fn lookups(&self) -> usize {
        *lock(&self.lookups)
    }

    fn key(&self, target: &MediaTarget) -> Option<i64> {
        if target.data_type.is_series() {
            target.tvdb_id
        } else {
            target.tmdb_id
        }
    }
}

#[async_trait]
impl DownloadManager for FakeDownloadManager {
    fn service(&self) -> &'static str {
        self.service
    }

    async fn lookup(&self, target: &MediaTarget) -> ProviderResult<Option<ArrMedia>> {
        *lock(&self.lookups) += 1;
        Ok(self.key(target).and_then(|k| lock(&self.media).get(&k).cloned()))
    }

    async fn delete_media(&self, target: &MediaTarget) -> ProviderResult<()> {
        lock(&self.calls).push(ArrCall::Delete(target.clone()));
        Ok(())
    }

    async fn unmonitor(&self, target: &MediaTarget, delete_files: bool) -> ProviderResult<()> {
        lock(&self.calls).push(ArrCall::Unmonitor {
            target: target.clone(),
            delete_files,
        });
        Ok(())
    }

    async fn unmonitor_existing_seasons(&self, target: &MediaTarget) -> ProviderResult<()> {
        lock(&self.calls).push(ArrCall::UnmonitorExistingSeasons(target.clone()));
        Ok(())
    }

    async fn list_exclusions(&self) -> ProviderResult<Vec<i64>> {
        Ok(lock(&self.exclusions).clone())
    }
}

// ── Request manager ─────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct FakeRequestManager {
    requests: Mutex<HashMap<i64, RequestInfo>>,
    deleted_media: Mutex<Vec<MediaTarget>>,
    deleted_requests: Mutex<Vec<MediaTarget>>,
}

impl FakeRequestManager {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register request info keyed by tmdb id.
    pub fn insert(&self, tmdb_id: i64, info: RequestInfo) {
        lock(&self.requests).insert(tmdb_id, info);
    }

    pub fn deleted_media(&self) -> Vec<MediaTarget> {
        lock(&self.deleted_media).clone()
    }

    pub fn deleted_requests(&self) -> Vec<MediaTarget> {
        lock(&self.deleted_requests).clone()
    }
}

#[async_trait]
impl RequestManager for FakeRequestManager {
    fn service(&self) -> &'static str {
        "overseerr"
    }

    async fn request_info(&self, target: &MediaTarget) -> ProviderResult<Option<RequestInfo>> {
        Ok(target
            .tmdb_id
            .and_then(|id| lock(&self.requests).get(&id).cloned()))
    }

    async fn delete_request(&self, target: &MediaTarget) -> ProviderResult<()> {
        lock(&self.deleted_requests).push(target.clone());
        Ok(())
    }

    async fn delete_media(&self, target: &MediaTarget) -> ProviderResult<()> {
        lock(&self.deleted_media).push(target.clone());
        Ok(())
    }
}

// ── Watch stats ─────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct FakeWatchStats {
    history: Mutex<HashMap<String, Vec<WatchRecord>>>,
}

impl FakeWatchStats {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_history(&self, item_id: &str, history: Vec<WatchRecord>) {
        lock(&self.history).insert(item_id.to_string(), history);
    }
}

#[async_trait]
impl WatchStats for FakeWatchStats {
    async fn watch_percent(&self, item_id: &str) -> ProviderResult<Option<f64>> {
        Ok(lock(&self.history).get(item_id).and_then(|plays| {
            plays
                .iter()
                .filter_map(|p| p.percent_complete)
                .fold(None, |best: Option<f64>, p| Some(best.map_or(p, |b| b.max(p))))
        }))
    }

    async fn history(&self, item_id: &str) -> ProviderResult<Vec<WatchRecord>> {
        Ok(lock(&self.history).get(item_id).cloned().unwrap_or_default())
    }
}

// ── Fixture bundle ──────────────────────────────────────────────────

/// Every fake wired into a [`Providers`] bundle, with handles kept for
/// assertions.
pub struct FakeProviders {
    pub media_server: Arc<FakeMediaServer>,
    pub radarr: Arc<FakeDownloadManager>,
    pub sonarr: Arc<FakeDownloadManager>,
    pub overseerr: Arc<FakeRequestManager>,
    pub tautulli: Arc<FakeWatchStats>,
}

impl FakeProviders {
    pub fn new(items: Vec<MediaItem>) -> Self {
        Self {
            media_server: FakeMediaServer::new(items),
            radarr: FakeDownloadManager::new("radarr"),
            sonarr: FakeDownloadManager::new("sonarr"),
            overseerr: FakeRequestManager::new(),
            tautulli: FakeWatchStats::new(),
        }
    }

    pub fn providers(&self) -> Providers {
        Providers {
            media_server: self.media_server.clone(),
            radarr: Some(self.radarr.clone()),
            sonarr: Some(self.sonarr.clone()),
            overseerr: Some(self.overseerr.clone()),
            jellyseerr: None,
            tautulli: Some(self.tautulli.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fake_media_server_tracks_collections() {
        let server = FakeMediaServer::new(vec![MediaItem::new("m1", "1", DataType::Movie, "Heat")]);
        let id = server
            .create_collection(&CollectionRequest {
                library_id: "1".to_string(),
                title: "Leaving soon".to_string(),
                description: None,
                data_type: DataType::Movie,
            })
            .await
            .unwrap();
        server.add_to_collection(&id, "m1").await.unwrap();
        server.add_to_collection(&id, "m1").await.unwrap();
        assert_eq!(server.collection_members(&id), vec!["m1".to_string()]);

        server.remove_from_collection(&id, "m1").await.unwrap();
        assert!(server.collection_members(&id).is_empty());
    }

    #[tokio::test]
    async fn fake_watch_stats_reports_best_percent() {
        let stats = FakeWatchStats::new();
        let at = Utc::now();
        stats.set_history(
            "m1",
            vec![
                WatchRecord {
                    user: "a".to_string(),
                    viewed_at: at,
                    percent_complete: Some(40.0),
                },
                WatchRecord {
                    user: "b".to_string(),
                    viewed_at: at,
                    percent_complete: Some(95.0),
                },
            ],
        );
        assert_eq!(stats.watch_percent("m1").await.unwrap(), Some(95.0));
        assert_eq!(stats.watch_percent("m2").await.unwrap(), None);
    }
}
