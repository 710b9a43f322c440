//! Capability-provider traits for the media server and its companion services.
//!
//! The core never speaks a wire protocol itself. Plex, Radarr/Sonarr,
//! Overseerr/Jellyseerr and Tautulli are reached through these traits; the
//! concrete HTTP clients are injected at startup.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ProviderResult;
use crate::media::{DataType, MediaItem, WatchRecord};

// ── Shared target ───────────────────────────────────────────────────

/// Identifies an item to a download or request manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaTarget {
    pub data_type: DataType,
    pub tmdb_id: Option<i64>,
    /// Show-level tvdb id for shows, seasons and episodes.
    pub tvdb_id: Option<i64>,
    pub season: Option<i32>,
    pub episode: Option<i32>,
}

impl MediaTarget {
    /// Build a target for `item`. Seasons and episodes take their external
    /// ids from `show` when given, since those services key on the series.
    pub fn for_item(item: &MediaItem, show: Option<&MediaItem>) -> Self {
        let guids = show.map(|s| &s.guids).unwrap_or(&item.guids);
        let (season, episode) = match item.data_type {
            DataType::Movie | DataType::Show => (None, None),
            DataType::Season => (item.index, None),
            DataType::Episode => (item.parent_index, item.index),
        };
        Self {
            data_type: item.data_type,
            tmdb_id: guids.tmdb,
            tvdb_id: guids.tvdb,
            season,
            episode,
        }
    }

    pub fn has_external_id(&self) -> bool {
        if self.data_type.is_series() {
            self.tvdb_id.is_some() || self.tmdb_id.is_some()
        } else {
            self.tmdb_id.is_some()
        }
    }
}

// ── Media server (Plex) ─────────────────────────────────────────────

/// Request to create an external collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionRequest {
    pub library_id: String,
    pub title: String,
    pub description: Option<String>,
    pub data_type: DataType,
}

#[async_trait]
pub trait MediaServer: Send + Sync {
    /// All items of `data_type` in a library. Seasons and episodes are
    /// flattened from their parent shows by the provider.
    async fn library_items(
        &self,
        library_id: &str,
        data_type: DataType,
    ) -> ProviderResult<Vec<MediaItem>>;

    /// Fresh metadata for one item; `None` when it no longer exists.
    async fn metadata(&self, id: &str) -> ProviderResult<Option<MediaItem>>;

    /// Play history for one item (all users).
    async fn watch_history(&self, id: &str) -> ProviderResult<Vec<WatchRecord>>;

    /// Create a collection and return its external id.
    async fn create_collection(&self, request: &CollectionRequest) -> ProviderResult<String>;

    async fn delete_collection(&self, collection_id: &str) -> ProviderResult<()>;

    async fn add_to_collection(&self, collection_id: &str, item_id: &str) -> ProviderResult<()>;

    async fn remove_from_collection(
        &self,
        collection_id: &str,
        item_id: &str,
    ) -> ProviderResult<()>;

    async fn set_collection_visibility(
        &self,
        collection_id: &str,
        home: bool,
        recommended: bool,
    ) -> ProviderResult<()>;

    /// Delete an item (and its files) directly on the media server. Used when
    /// no download manager tracks the item.
    async fn delete_media(&self, item_id: &str) -> ProviderResult<()>;
}

// ── Download manager (Radarr / Sonarr) ──────────────────────────────

/// What a download manager knows about an item.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArrMedia {
    pub id: i64,
    pub added: Option<DateTime<Utc>>,
    pub file_added: Option<DateTime<Utc>>,
    pub monitored: bool,
    pub quality_profile: Option<String>,
    pub tags: Vec<String>,
    pub size_on_disk: Option<u64>,
    pub file_path: Option<String>,
    pub release_date: Option<DateTime<Utc>>,
    pub digital_release: Option<DateTime<Utc>>,
    pub physical_release: Option<DateTime<Utc>>,
    pub original_language: Option<String>,
    pub status: Option<String>,
    pub ended: Option<bool>,
    pub has_file: bool,
    pub episode_file_count: Option<u32>,
    pub next_airing: Option<DateTime<Utc>>,
    pub season_count: Option<u32>,
}

#[async_trait]
pub trait DownloadManager: Send + Sync {
    /// Short service label used in logs and errors (e.g. `"radarr"`).
    fn service(&self) -> &'static str;

    async fn lookup(&self, target: &MediaTarget) -> ProviderResult<Option<ArrMedia>>;

    /// Remove the item and its files.
    async fn delete_media(&self, target: &MediaTarget) -> ProviderResult<()>;

    /// Stop monitoring, optionally deleting every file of the target.
    async fn unmonitor(&self, target: &MediaTarget, delete_files: bool) -> ProviderResult<()>;

    /// Unmonitor and delete only seasons that already exist; future seasons
    /// stay monitored.
    async fn unmonitor_existing_seasons(&self, target: &MediaTarget) -> ProviderResult<()>;

    /// External ids on the service's import-list exclusion list.
    async fn list_exclusions(&self) -> ProviderResult<Vec<i64>>;
}

// ── Request manager (Overseerr / Jellyseerr) ────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestInfo {
    pub requested_by: Vec<String>,
    pub request_date: Option<DateTime<Utc>>,
    pub approval_date: Option<DateTime<Utc>>,
    pub amount_requested: u32,
    pub media_added_at: Option<DateTime<Utc>>,
    pub release_date: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait RequestManager: Send + Sync {
    fn service(&self) -> &'static str;

    async fn request_info(&self, target: &MediaTarget) -> ProviderResult<Option<RequestInfo>>;

    async fn delete_request(&self, target: &MediaTarget) -> ProviderResult<()>;

    /// Forget the media entry so the item can be requested again.
    async fn delete_media(&self, target: &MediaTarget) -> ProviderResult<()>;
}

// ── Watch statistics (Tautulli) ─────────────────────────────────────

#[async_trait]
pub trait WatchStats: Send + Sync {
    /// Highest percent-complete of any play of the item.
    async fn watch_percent(&self, item_id: &str) -> ProviderResult<Option<f64>>;

    /// Every play of the item with its percent-complete.
    async fn history(&self, item_id: &str) -> ProviderResult<Vec<WatchRecord>>;
}

// ── Bundle ──────────────────────────────────────────────────────────

/// Every capability the core may call. Only the media server is mandatory.
#[derive(Clone)]
pub struct Providers {
    pub media_server: Arc<dyn MediaServer>,
    pub radarr: Option<Arc<dyn DownloadManager>>,
    pub sonarr: Option<Arc<dyn DownloadManager>>,
    pub overseerr: Option<Arc<dyn RequestManager>>,
    pub jellyseerr: Option<Arc<dyn RequestManager>>,
    pub tautulli: Option<Arc<dyn WatchStats>>,
}

impl Providers {
    pub fn new(media_server: Arc<dyn MediaServer>) -> Self {
        Self {
            media_server,
            radarr: None,
            sonarr: None,
            overseerr: None,
            jellyseerr: None,
            tautulli: None,
        }
    }

    /// Radarr for movies, Sonarr for everything series based.
    pub fn download_manager_for(&self, data_type: DataType) -> Option<&Arc<dyn DownloadManager>> {
        if data_type.is_series() {
            self.sonarr.as_ref()
        } else {
            self.radarr.as_ref()
        }
    }

    /// The first configured request manager (Overseerr preferred).
    pub fn request_manager(&self) -> Option<&Arc<dyn RequestManager>> {
        self.overseerr.as_ref().or(self.jellyseerr.as_ref())
    }
}

impl std::fmt::Debug for Providers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Providers")
            .field("radarr", &self.radarr.is_some())
            .field("sonarr", &self.sonarr.is_some())
            .field("overseerr", &self.overseerr.is_some())
            .field("jellyseerr", &self.jellyseerr.is_some())
            .field("tautulli", &self.tautulli.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::MediaGuids;

    #[test]
    fn episode_target_uses_show_ids() {
        let mut show = MediaItem::new("show1", "2", DataType::Show, "Lost");
        show.guids = MediaGuids {
            tmdb: Some(4607),
            tvdb: Some(73739),
            imdb: None,
        };
        let mut episode = MediaItem::new("e1", "2", DataType::Episode, "Pilot");
        episode.index = Some(1);
        episode.parent_index = Some(2);
        episode.guids.tvdb = Some(999);

        let target = MediaTarget::for_item(&episode, Some(&show));
        assert_eq!(target.tvdb_id, Some(73739));
        assert_eq!(target.season, Some(2));
        assert_eq!(target.episode, Some(1));
        assert!(target.has_external_id());
    }

    #[test]
    fn movie_without_tmdb_has_no_external_id() {
        let movie = MediaItem::new("m1", "1", DataType::Movie, "Heat");
        assert!(!MediaTarget::for_item(&movie, None).has_external_id());
    }
}
