//! User-driven membership and exclusion changes.

use culler_core::{CollectionMedia, Exclusion, MediaItem, RecordId};

use crate::error::{ReconcileError, Result};
use crate::journal::{Change, Entry, RemovalReason};
use crate::reconciler::CollectionReconciler;

impl CollectionReconciler {
    async fn fetch_item(&self, media_id: &str) -> Result<MediaItem> {
        self.providers
            .media_server
            .metadata(media_id)
            .await?
            .ok_or_else(|| ReconcileError::MediaNotFound(media_id.to_string()))
    }

    /// Add an item by hand. Manual members are never removed by rule
    /// reconciliation but still go through the retention pass.
    pub async fn add_manual(
        &self,
        collection_id: RecordId,
        media_id: &str,
    ) -> Result<CollectionMedia> {
        let mut collection = self.load_collection(collection_id).await?;
        let item = self.fetch_item(media_id).await?;
        if item.data_type != collection.data_type || item.library_id != collection.library_id {
            return Err(ReconcileError::Incompatible(format!(
                "{} '{}' in library {} cannot join a {} collection of library {}",
                item.data_type, item.title, item.library_id, collection.data_type, collection.library_id
            )));
        }
        let tracked = self.store.collection_media(collection_id).await?;
        if tracked.iter().any(|m| m.media_id == item.id) {
            return Err(ReconcileError::AlreadyMember {
                collection_id,
                media_id: item.id,
            });
        }

        let member = self.attach(&mut collection, &item, true).await?;
        self.store.clear_handled(collection_id, &item.id).await?;
        let group = self.owning_group(collection_id).await?;
        self.journal(
            &collection,
            group.as_ref(),
            Entry {
                media_id: &item.id,
                title: &item.title,
                change: Change::Added { manual: true },
            },
        )
        .await?;
        Ok(member)
    }

    /// Remove an item by hand. Returns whether it was tracked.
    pub async fn remove_manual(&self, collection_id: RecordId, media_id: &str) -> Result<bool> {
        let mut collection = self.load_collection(collection_id).await?;
        if !self.detach(&collection, media_id).await? {
            return Ok(false);
        }
        let title = match self.providers.media_server.metadata(media_id).await {
            Ok(Some(item)) => item.title,
            _ => media_id.to_string(),
        };
        let group = self.owning_group(collection_id).await?;
        self.journal(
            &collection,
            group.as_ref(),
            Entry {
                media_id,
                title: &title,
                change: Change::Removed(RemovalReason::Manual),
            },
        )
        .await?;
        self.release_if_empty(&mut collection).await?;
        Ok(true)
    }

    /// Exclude an item from one rule group, or library-wide when
    /// `rule_group_id` is `None`. The item's parent is recorded so the
    /// exclusion can be cleared together with its show or season.
    pub async fn exclude(
        &self,
        media_id: &str,
        rule_group_id: Option<RecordId>,
    ) -> Result<Exclusion> {
        let item = self.fetch_item(media_id).await?;
        Ok(self
            .store
            .save_exclusion(Exclusion {
                id: 0,
                media_id: item.id,
                rule_group_id,
                parent: item.parent_id,
                data_type: Some(item.data_type),
            })
            .await?)
    }

    /// Drop every exclusion of `media_id` and of items below it.
    pub async fn remove_exclusions(&self, media_id: &str) -> Result<usize> {
        Ok(self
            .store
            .delete_exclusions_for_media(&media_id.to_string())
            .await?)
    }
}
