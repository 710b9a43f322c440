//! A media server read from a JSON export, for running the handlers
//! without a live Plex.
//!
//! Collection edits and deletions only change the in-memory copy.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{info, warn};

use culler_core::providers::{CollectionRequest, MediaServer};
use culler_core::{DataType, MediaItem, ProviderError, ProviderResult, WatchRecord};

use crate::error::{Result, TaskError};

const SERVICE: &str = "offline library";

/// File layout: either a bare array of items or an object with `items`
/// and optional per-item `history`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum LibraryFile {
    Items(Vec<MediaItem>),
    Full {
        items: Vec<MediaItem>,
        #[serde(default)]
        history: HashMap<String, Vec<WatchRecord>>,
    },
}

#[derive(Debug, Default)]
struct State {
    items: Vec<MediaItem>,
    history: HashMap<String, Vec<WatchRecord>>,
    collections: HashMap<String, (CollectionRequest, Vec<String>)>,
    next_collection: u64,
}

#[derive(Debug)]
pub struct JsonLibrary {
    state: Mutex<State>,
}

impl JsonLibrary {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| TaskError::Other(format!("reading {}: {}", path.display(), e)))?;
        let library = Self::from_json(&raw)
            .map_err(|e| TaskError::Other(format!("parsing {}: {}", path.display(), e)))?;
        info!(path = %path.display(), items = library.len(), "offline library loaded");
        Ok(library)
    }

    /// A library with no items.
    pub fn empty() -> Self {
        Self {
            state: Mutex::new(State::default()),
        }
    }

    pub fn from_json(raw: &str) -> serde_json::Result<Self> {
        let (items, history) = match serde_json::from_str(raw)? {
            LibraryFile::Items(items) => (items, HashMap::new()),
            LibraryFile::Full { items, history } => (items, history),
        };
        Ok(Self {
            state: Mutex::new(State {
                items,
                history,
                ..Default::default()
            }),
        })
    }

    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn unknown_collection(id: &str) -> ProviderError {
    ProviderError::request(SERVICE, format!("collection {} does not exist", id))
}

#[async_trait]
impl MediaServer for JsonLibrary {
    async fn library_items(
        &self,
        library_id: &str,
        data_type: DataType,
    ) -> ProviderResult<Vec<MediaItem>> {
        Ok(self
            .lock()
            .items
            .iter()
            .filter(|i| i.library_id == library_id && i.data_type == data_type)
            .cloned()
            .collect())
    }

    async fn metadata(&self, id: &str) -> ProviderResult<Option<MediaItem>> {
        Ok(self.lock().items.iter().find(|i| i.id == id).cloned())
    }

    async fn watch_history(&self, id: &str) -> ProviderResult<Vec<WatchRecord>> {
        Ok(self.lock().history.get(id).cloned().unwrap_or_default())
    }

    async fn create_collection(&self, request: &CollectionRequest) -> ProviderResult<String> {
        let mut state = self.lock();
        state.next_collection += 1;
        let id = format!("offline-{}", state.next_collection);
        state
            .collections
            .insert(id.clone(), (request.clone(), Vec::new()));
        Ok(id)
    }

    async fn delete_collection(&self, collection_id: &str) -> ProviderResult<()> {
        self.lock()
            .collections
            .remove(collection_id)
            .map(|_| ())
            .ok_or_else(|| unknown_collection(collection_id))
    }

    async fn add_to_collection(&self, collection_id: &str, item_id: &str) -> ProviderResult<()> {
        let mut state = self.lock();
        let (_, members) = state
            .collections
            .get_mut(collection_id)
            .ok_or_else(|| unknown_collection(collection_id))?;
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
        let mut state = self.lock();
        let (_, members) = state
            .collections
            .get_mut(collection_id)
            .ok_or_else(|| unknown_collection(collection_id))?;
        members.retain(|m| m != item_id);
        Ok(())
    }

    async fn set_collection_visibility(
        &self,
        collection_id: &str,
        _home: bool,
        _recommended: bool,
    ) -> ProviderResult<()> {
        if self.lock().collections.contains_key(collection_id) {
            Ok(())
        } else {
            Err(unknown_collection(collection_id))
        }
    }

    async fn delete_media(&self, item_id: &str) -> ProviderResult<()> {
        let mut state = self.lock();
        let before = state.items.len();
        state.items.retain(|i| i.id != item_id);
        if state.items.len() == before {
            return Err(ProviderError::request(
                SERVICE,
                format!("item {} does not exist", item_id),
            ));
        }
        warn!(media_id = item_id, "offline library: item dropped from memory only");
        Ok(())
    }
}
