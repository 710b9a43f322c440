//! Housekeeping run by the collection handler: dropping members whose
//! media vanished, pruning old logs and sweeping dead exclusions.

use std::collections::HashMap;

use chrono::Months;
use tracing::{debug, info, warn};

use culler_core::{MediaId, RecordId};

use crate::error::Result;
use crate::journal::{Change, Entry, RemovalReason};
use crate::reconciler::CollectionReconciler;

impl CollectionReconciler {
    /// Stop tracking members whose item no longer exists in the library,
    /// and forget handled markers of such items.
    ///
    /// Lookup failures leave the member in place.
    pub async fn prune_missing(&self, collection_id: RecordId) -> Result<Vec<MediaId>> {
        let mut collection = self.load_collection(collection_id).await?;
        let group = self.owning_group(collection_id).await?;
        let mut pruned = Vec::new();

        for member in self.store.collection_media(collection_id).await? {
            match self.providers.media_server.metadata(&member.media_id).await {
                Ok(Some(_)) => continue,
                Ok(None) => {}
                Err(e) => {
                    warn!(media_id = %member.media_id, error = %e, "metadata lookup failed, member kept");
                    continue;
                }
            }
            if let Some(external) = &collection.plex_id {
                if let Err(e) = self
                    .providers
                    .media_server
                    .remove_from_collection(external, &member.media_id)
                    .await
                {
                    debug!(media_id = %member.media_id, error = %e, "missing media not removable from collection");
                }
            }
            self.store
                .remove_collection_media(collection_id, &member.media_id)
                .await?;
            self.journal(
                &collection,
                group.as_ref(),
                Entry {
                    media_id: &member.media_id,
                    title: &member.media_id,
                    change: Change::Removed(RemovalReason::Missing),
                },
            )
            .await?;
            pruned.push(member.media_id);
        }

        for marker in self.store.handled_media(collection_id).await? {
            if let Ok(None) = self.providers.media_server.metadata(&marker.media_id).await {
                self.store
                    .clear_handled(collection_id, &marker.media_id)
                    .await?;
                debug!(collection_id, media_id = %marker.media_id, "dropped handled marker of missing media");
            }
        }

        if !pruned.is_empty() {
            self.release_if_empty(&mut collection).await?;
            info!(collection_id, pruned = pruned.len(), "pruned missing media");
        }
        Ok(pruned)
    }

    /// Delete logs older than the collection's `keep_logs_for_months`.
    /// Zero keeps everything.
    pub async fn prune_logs(&self, collection_id: RecordId) -> Result<usize> {
        let collection = self.load_collection(collection_id).await?;
        if collection.keep_logs_for_months == 0 {
            return Ok(0);
        }
        let now = self.clock.now();
        let Some(cutoff) = now.checked_sub_months(Months::new(collection.keep_logs_for_months))
        else {
            return Ok(0);
        };
        let pruned = self.store.prune_logs(collection_id, cutoff).await?;
        if pruned > 0 {
            debug!(collection_id, pruned, %cutoff, "pruned collection logs");
        }
        Ok(pruned)
    }

    /// Delete exclusions whose item no longer exists. Returns the count.
    pub async fn sweep_exclusions(&self) -> Result<usize> {
        let mut exists: HashMap<MediaId, bool> = HashMap::new();
        let mut removed = 0;
        for exclusion in self.store.exclusions().await? {
            let cached = exists.get(&exclusion.media_id).copied();
            let present = match cached {
                Some(present) => present,
                None => match self.providers.media_server.metadata(&exclusion.media_id).await {
                    Ok(item) => {
                        exists.insert(exclusion.media_id.clone(), item.is_some());
                        item.is_some()
                    }
                    Err(e) => {
                        warn!(media_id = %exclusion.media_id, error = %e, "metadata lookup failed, exclusion kept");
                        continue;
                    }
                },
            };
            if !present && self.store.delete_exclusion(exclusion.id).await? {
                removed += 1;
            }
        }
        if removed > 0 {
            info!(removed, "swept exclusions of missing media");
        }
        Ok(removed)
    }
}
