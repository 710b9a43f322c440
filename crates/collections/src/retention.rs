//! Retention pass: members whose window elapsed get the collection's arr
//! action and leave the collection. A handled marker keeps them from being
//! added back while they still match.

use std::collections::{HashMap, HashSet};

use tracing::{debug, info, warn};

use culler_core::providers::MediaTarget;
use culler_core::{
    ArrAction, Collection, CollectionMedia, DataType, HandledMedia, MediaItem, ProviderResult,
    RecordId,
};
use culler_rules::RuleGroup;

use crate::error::{ReconcileError, Result};
use crate::journal::{Change, Entry};
use crate::reconciler::{CollectionReconciler, ReconcileOutcome};

impl CollectionReconciler {
    /// Run the retention pass for one collection outside a rule evaluation.
    ///
    /// Used by the collection handler and for manual collections. Members
    /// covered by an exclusion are skipped.
    pub async fn handle_collection(&self, collection_id: RecordId) -> Result<ReconcileOutcome> {
        let mut collection = self.load_collection(collection_id).await?;
        let mut outcome = ReconcileOutcome::default();
        if !collection.is_active {
            return Ok(outcome);
        }
        let group = self.owning_group(collection_id).await?;
        let exclusions = match &group {
            Some(g) => self.store.exclusions_for_group(g.id).await?,
            None => self
                .store
                .exclusions()
                .await?
                .into_iter()
                .filter(|e| e.rule_group_id.is_none())
                .collect(),
        };
        let excluded: HashSet<&str> = exclusions.iter().map(|e| e.media_id.as_str()).collect();

        let members = self.store.collection_media(collection_id).await?;
        self.handle_due(
            &mut collection,
            &members,
            &HashMap::new(),
            &excluded,
            group.as_ref(),
            &mut outcome,
        )
        .await?;
        if !outcome.handled.is_empty() {
            self.release_if_empty(&mut collection).await?;
            self.store.save_collection(collection).await?;
        }
        Ok(outcome)
    }

    /// Handle every due member of `members`.
    ///
    /// `known` supplies already-fetched items; others are looked up. A member
    /// whose item no longer exists is left for the pruning pass. Excluded
    /// members (directly or through their show or season) are skipped.
    pub(crate) async fn handle_due(
        &self,
        collection: &mut Collection,
        members: &[CollectionMedia],
        known: &HashMap<&str, &MediaItem>,
        excluded: &HashSet<&str>,
        group: Option<&RuleGroup>,
        outcome: &mut ReconcileOutcome,
    ) -> Result<()> {
        let now = self.clock.now();
        for member in members {
            if collection.due_at(member.add_date) > now || excluded.contains(member.media_id.as_str())
            {
                continue;
            }

            let item = match known.get(member.media_id.as_str()) {
                Some(item) => (*item).clone(),
                None => match self.providers.media_server.metadata(&member.media_id).await {
                    Ok(Some(item)) => item,
                    Ok(None) => {
                        debug!(
                            collection_id = collection.id,
                            media_id = %member.media_id,
                            "due media missing from library, left for pruning"
                        );
                        continue;
                    }
                    Err(e) => {
                        warn!(media_id = %member.media_id, error = %e, "metadata lookup failed");
                        outcome.failed.push(member.media_id.clone());
                        continue;
                    }
                },
            };
            if item.ancestor_ids().iter().any(|id| excluded.contains(id)) {
                continue;
            }

            if let Err(e) = self.apply_arr_action(collection, member, &item).await {
                warn!(
                    collection_id = collection.id,
                    media_id = %member.media_id,
                    action = %collection.arr_action,
                    error = %e,
                    "arr action failed"
                );
                outcome.failed.push(member.media_id.clone());
                continue;
            }
            match self.detach(collection, &member.media_id).await {
                Ok(_) => {}
                // The arr action already ran; the row must still go.
                Err(ReconcileError::Provider(e)) => {
                    warn!(media_id = %member.media_id, error = %e, "failed to remove handled media from collection");
                    self.store
                        .remove_collection_media(collection.id, &member.media_id)
                        .await?;
                }
                Err(e) => return Err(e),
            }
            self.store
                .mark_handled(HandledMedia {
                    id: 0,
                    collection_id: collection.id,
                    media_id: member.media_id.clone(),
                    handled_at: now,
                    action: collection.arr_action,
                })
                .await?;
            collection.handled_media_amount += 1;
            self.journal(
                collection,
                group,
                Entry {
                    media_id: &member.media_id,
                    title: &item.title,
                    change: Change::Handled(collection.arr_action),
                },
            )
            .await?;
            outcome.handled.push(member.media_id.clone());
        }
        Ok(())
    }

    /// Apply `collection.arr_action` to one item.
    ///
    /// Items the download manager does not track fall back to deleting
    /// through the media server, except for plain unmonitoring, which has
    /// nothing to act on.
    pub(crate) async fn apply_arr_action(
        &self,
        collection: &Collection,
        member: &CollectionMedia,
        item: &MediaItem,
    ) -> ProviderResult<()> {
        let action = collection.arr_action;
        if action == ArrAction::DoNothing {
            return Ok(());
        }

        let show = match (item.data_type, item.show_id()) {
            (DataType::Season | DataType::Episode, Some(show_id)) => {
                self.providers.media_server.metadata(show_id).await?
            }
            _ => None,
        };
        let mut target = MediaTarget::for_item(item, show.as_ref());
        target.tmdb_id = target.tmdb_id.or(member.tmdb_id);
        target.tvdb_id = target.tvdb_id.or(member.tvdb_id);

        let manager = match self.providers.download_manager_for(item.data_type) {
            Some(m) if target.has_external_id() => m.lookup(&target).await?.map(|_| m),
            _ => None,
        };

        match (manager, action) {
            (_, ArrAction::DoNothing) => {}
            (Some(m), ArrAction::Delete) => match item.data_type {
                DataType::Movie | DataType::Show => m.delete_media(&target).await?,
                DataType::Season | DataType::Episode => m.unmonitor(&target, true).await?,
            },
            (Some(m), ArrAction::UnmonitorDeleteAll) => m.unmonitor(&target, true).await?,
            (Some(m), ArrAction::UnmonitorDeleteExisting) => {
                if item.data_type.is_series() {
                    m.unmonitor_existing_seasons(&target).await?
                } else {
                    m.unmonitor(&target, true).await?
                }
            }
            (Some(m), ArrAction::Unmonitor) => m.unmonitor(&target, false).await?,
            (None, ArrAction::Unmonitor) => {
                warn!(media_id = %item.id, "not tracked by a download manager, nothing to unmonitor");
            }
            (None, _) => {
                info!(media_id = %item.id, "not tracked by a download manager, deleting through the media server");
                self.providers.media_server.delete_media(&item.id).await?
            }
        }

        if collection.force_overseerr {
            if let Some(requests) = self.providers.request_manager() {
                if let Err(e) = requests.delete_media(&target).await {
                    warn!(
                        media_id = %item.id,
                        service = requests.service(),
                        error = %e,
                        "failed to clear request manager entry"
                    );
                }
            }
        }
        Ok(())
    }
}
