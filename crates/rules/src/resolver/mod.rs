//! Value resolver.
//!
//! Turns a [`RuleProperty`] and a [`MediaItem`] into a concrete
//! [`RuleValue`]. Plex properties mostly read fields of the item itself;
//! everything else is a lookup against the matching capability provider.
//!
//! A resolver lives for one rule-group run. Source records (arr entry,
//! request info, play history, parent show) are fetched once per item and
//! application, and resolved values are memoized per `(item, property)`, so
//! a property feeding several rules costs one external call.
//!
//! Provider failures are logged at debug and resolve to `None`.

mod arr;
mod plex;
mod requests;
mod tautulli;

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Mutex, PoisonError};

use culler_core::providers::{ArrMedia, MediaTarget, Providers, RequestInfo};
use culler_core::{DataType, MediaId, MediaItem, ProviderResult, WatchRecord};

use crate::schema::{Application, RuleProperty, RuleValue};

type Cache<K, V> = Mutex<HashMap<K, V>>;

/// Per-run, memoizing operand resolver.
pub struct ValueResolver {
    providers: Providers,
    /// Percent-complete at which a Tautulli play counts as watched.
    watched_percent: f64,
    values: Cache<(MediaId, RuleProperty), Option<RuleValue>>,
    shows: Cache<MediaId, Option<MediaItem>>,
    plex_history: Cache<MediaId, Option<Vec<WatchRecord>>>,
    arr: Cache<(MediaId, Application), Option<ArrMedia>>,
    requests: Cache<(MediaId, Application), Option<Option<RequestInfo>>>,
    plays: Cache<MediaId, Option<Vec<WatchRecord>>>,
    watch_percent: Cache<MediaId, Option<f64>>,
}

impl ValueResolver {
    pub fn new(providers: Providers, watched_percent: f64) -> Self {
        Self {
            providers,
            watched_percent,
            values: Mutex::new(HashMap::new()),
            shows: Mutex::new(HashMap::new()),
            plex_history: Mutex::new(HashMap::new()),
            arr: Mutex::new(HashMap::new()),
            requests: Mutex::new(HashMap::new()),
            plays: Mutex::new(HashMap::new()),
            watch_percent: Mutex::new(HashMap::new()),
        }
    }

    pub fn providers(&self) -> &Providers {
        &self.providers
    }

    pub fn watched_percent(&self) -> f64 {
        self.watched_percent
    }

    /// Resolve `property` for `item`. `None` means unresolved: the property
    /// does not apply to the item's type, the source has no data, or the
    /// provider call failed.
    pub async fn resolve(&self, property: RuleProperty, item: &MediaItem) -> Option<RuleValue> {
        if !property.applies_to(item.data_type) {
            return None;
        }
        let key = (item.id.clone(), property);
        memo(&self.values, key, || self.resolve_uncached(property, item)).await
    }

    async fn resolve_uncached(&self, property: RuleProperty, item: &MediaItem) -> Option<RuleValue> {
        let value = match property {
            RuleProperty::Plex(p) => plex::resolve(self, p, item).await,
            RuleProperty::Radarr(p) => arr::resolve_radarr(self, p, item).await,
            RuleProperty::Sonarr(p) => arr::resolve_sonarr(self, p, item).await,
            RuleProperty::Overseerr(p) => {
                requests::resolve(self, Application::Overseerr, p, item).await
            }
            RuleProperty::Jellyseerr(p) => {
                requests::resolve(self, Application::Jellyseerr, p, item).await
            }
            RuleProperty::Tautulli(p) => tautulli::resolve(self, p, item).await,
        };
        if value.is_none() {
            tracing::trace!(media_id = %item.id, property = %property, "unresolved");
        }
        value
    }

    // ── Source records ──────────────────────────────────────────────

    /// The show an item belongs to, for items below show level.
    pub async fn show_of(&self, item: &MediaItem) -> Option<MediaItem> {
        if !matches!(item.data_type, DataType::Season | DataType::Episode) {
            return None;
        }
        let show_id = item.show_id()?.to_string();
        let media_server = self.providers.media_server.clone();
        memo(&self.shows, show_id.clone(), || async move {
            logged(&show_id, "plex", media_server.metadata(&show_id).await).flatten()
        })
        .await
    }

    /// Download/request-manager target, using show ids for seasons and episodes.
    pub async fn target(&self, item: &MediaItem) -> MediaTarget {
        let show = self.show_of(item).await;
        MediaTarget::for_item(item, show.as_ref())
    }

    pub(crate) async fn plex_history(&self, item: &MediaItem) -> Option<Vec<WatchRecord>> {
        let media_server = self.providers.media_server.clone();
        let id = item.id.clone();
        memo(&self.plex_history, id.clone(), || async move {
            logged(&id, "plex", media_server.watch_history(&id).await)
        })
        .await
    }

    pub(crate) async fn arr_media(&self, app: Application, item: &MediaItem) -> Option<ArrMedia> {
        let manager = match app {
            Application::Radarr => self.providers.radarr.clone(),
            Application::Sonarr => self.providers.sonarr.clone(),
            _ => None,
        }?;
        let key = (item.id.clone(), app);
        memo(&self.arr, key, || async {
            let target = self.target(item).await;
            if !target.has_external_id() {
                return None;
            }
            logged(&item.id, manager.service(), manager.lookup(&target).await).flatten()
        })
        .await
    }

    /// Outer `None`: lookup impossible or failed. Inner `None`: never requested.
    pub(crate) async fn request_info(
        &self,
        app: Application,
        item: &MediaItem,
    ) -> Option<Option<RequestInfo>> {
        let manager = match app {
            Application::Overseerr => self.providers.overseerr.clone(),
            Application::Jellyseerr => self.providers.jellyseerr.clone(),
            _ => None,
        }?;
        let key = (item.id.clone(), app);
        memo(&self.requests, key, || async {
            let target = self.target(item).await;
            if !target.has_external_id() {
                return None;
            }
            logged(&item.id, manager.service(), manager.request_info(&target).await)
        })
        .await
    }

    pub(crate) async fn plays(&self, item: &MediaItem) -> Option<Vec<WatchRecord>> {
        let stats = self.providers.tautulli.clone()?;
        let id = item.id.clone();
        memo(&self.plays, id.clone(), || async move {
            logged(&id, "tautulli", stats.history(&id).await)
        })
        .await
    }

    pub(crate) async fn max_watch_percent(&self, item: &MediaItem) -> Option<f64> {
        let stats = self.providers.tautulli.clone()?;
        let id = item.id.clone();
        memo(&self.watch_percent, id.clone(), || async move {
            logged(&id, "tautulli", stats.watch_percent(&id).await).flatten()
        })
        .await
    }
}

/// Cache lookup that runs `fetch` on a miss. The lock is never held across
/// the fetch, so concurrent misses on the same key may both fetch.
async fn memo<K, V, F, Fut>(cache: &Cache<K, V>, key: K, fetch: F) -> V
where
    K: Eq + Hash,
    V: Clone,
    F: FnOnce() -> Fut,
    Fut: Future<Output = V>,
{
    if let Some(hit) = cache
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .get(&key)
    {
        return hit.clone();
    }
    let value = fetch().await;
    cache
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .insert(key, value.clone());
    value
}

fn logged<T>(media_id: &str, service: &str, result: ProviderResult<T>) -> Option<T> {
    match result {
        Ok(v) => Some(v),
        Err(e) => {
            tracing::debug!(media_id, service, error = %e, "provider lookup failed, operand unresolved");
            None
        }
    }
}

// ── Shared conversions ──────────────────────────────────────────────

pub(crate) fn date(d: Option<chrono::DateTime<chrono::Utc>>) -> Option<RuleValue> {
    d.map(RuleValue::Date)
}

pub(crate) fn number<N: Into<f64>>(n: Option<N>) -> Option<RuleValue> {
    n.map(|n| RuleValue::Number(n.into()))
}

pub(crate) fn text(s: Option<&String>) -> Option<RuleValue> {
    s.map(|s| RuleValue::Text(s.clone()))
}

pub(crate) fn list(items: &[String]) -> Option<RuleValue> {
    Some(RuleValue::TextList(items.to_vec()))
}

pub(crate) fn megabytes(bytes: Option<u64>) -> Option<RuleValue> {
    bytes.map(|b| RuleValue::Number((b as f64 / 1_048_576.0 * 100.0).round() / 100.0))
}

/// Distinct names, first occurrence order.
pub(crate) fn distinct_users<'a>(records: impl Iterator<Item = &'a WatchRecord>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    records
        .filter(|r| seen.insert(r.user.to_lowercase()))
        .map(|r| r.user.clone())
        .collect()
}
