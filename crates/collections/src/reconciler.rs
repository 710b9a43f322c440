//! [`CollectionReconciler`]: turns a rule-group evaluation into collection
//! membership changes.
//!
//! A pass runs in three steps, each reading the membership left by the
//! previous one:
//!
//! 1. retention: members whose window elapsed get the arr action and leave
//! 2. removal: rule-managed members that stopped matching or became excluded
//! 3. addition: matching items that are neither tracked nor handled, followed
//!    by retention for those already due (no retention window)
//!
//! Stored membership plus the handled markers are the record of what was
//! already done, so a second pass over the same evaluation at the same
//! instant changes nothing.

use std::collections::{HashMap, HashSet};

use serde::Serialize;
use tracing::{debug, info, warn};

use culler_core::providers::{CollectionRequest, Providers};
use culler_core::{Collection, CollectionMedia, MediaId, MediaItem, SharedClock};
use culler_notify::EventBus;
use culler_rules::{GroupEvaluation, RuleGroup};
use culler_storage::SharedStore;

use crate::error::{ReconcileError, Result};
use crate::journal::{Change, Entry, RemovalReason};
use crate::plan::ReconcilePlan;

/// What one pass changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileOutcome {
    pub added: Vec<MediaId>,
    pub removed: Vec<MediaId>,
    pub handled: Vec<MediaId>,
    /// Items whose provider call failed; they keep their current state and
    /// are retried on the next pass.
    pub failed: Vec<MediaId>,
}

impl ReconcileOutcome {
    pub fn is_noop(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.handled.is_empty()
    }
}

pub struct CollectionReconciler {
    pub(crate) providers: Providers,
    pub(crate) store: SharedStore,
    pub(crate) bus: EventBus,
    pub(crate) clock: SharedClock,
}

impl CollectionReconciler {
    pub fn new(providers: Providers, store: SharedStore, bus: EventBus, clock: SharedClock) -> Self {
        Self {
            providers,
            store,
            bus,
            clock,
        }
    }

    pub(crate) async fn load_collection(&self, id: i64) -> Result<Collection> {
        self.store
            .collection(id)
            .await?
            .ok_or(ReconcileError::CollectionNotFound(id))
    }

    /// Apply `evaluation` of `group` to the group's collection.
    ///
    /// Aborted evaluations are partial and are ignored.
    pub async fn reconcile(
        &self,
        group: &RuleGroup,
        evaluation: &GroupEvaluation,
    ) -> Result<ReconcileOutcome> {
        if evaluation.aborted {
            debug!(rule_group_id = group.id, "evaluation aborted, reconcile skipped");
            return Ok(ReconcileOutcome::default());
        }
        let collection_id = group
            .collection_id
            .ok_or(ReconcileError::Unlinked(group.id))?;
        let mut collection = self.load_collection(collection_id).await?;
        if !collection.is_active {
            debug!(collection_id, "collection inactive, reconcile skipped");
            return Ok(ReconcileOutcome::default());
        }

        let known: HashMap<&str, &MediaItem> = evaluation
            .matched
            .iter()
            .chain(evaluation.unmatched.iter())
            .map(|i| (i.id.as_str(), i))
            .collect();
        let excluded: HashSet<&str> = evaluation.excluded.iter().map(String::as_str).collect();
        let mut outcome = ReconcileOutcome::default();

        let members = self.store.collection_media(collection.id).await?;
        self.handle_due(&mut collection, &members, &known, &excluded, Some(group), &mut outcome)
            .await?;

        let members = self.store.collection_media(collection.id).await?;
        let matched: Vec<&str> = evaluation.matched.iter().map(|i| i.id.as_str()).collect();
        let unmatched = evaluation.unmatched_ids();
        let markers = self.store.handled_media(collection.id).await?;
        let mut handled: HashSet<&str> = outcome.handled.iter().map(String::as_str).collect();
        for marker in &markers {
            let id = marker.media_id.as_str();
            if unmatched.contains(id) && !matched.contains(&id) {
                // Stopped matching: a later match starts a new lifecycle.
                self.store.clear_handled(collection.id, id).await?;
                debug!(collection_id, media_id = id, "handled marker cleared");
            } else {
                handled.insert(id);
            }
        }
        let plan = ReconcilePlan::compute(&members, &matched, &unmatched, &excluded, &handled);

        let removals = plan
            .to_exclude
            .iter()
            .map(|id| (id, RemovalReason::Excluded))
            .chain(plan.to_remove.iter().map(|id| (id, RemovalReason::Unmatched)));
        for (media_id, reason) in removals {
            let title = known.get(media_id.as_str()).map_or(media_id.as_str(), |i| i.title.as_str());
            match self.detach(&collection, media_id).await {
                Ok(_) => {
                    self.journal(
                        &collection,
                        Some(group),
                        Entry {
                            media_id,
                            title,
                            change: Change::Removed(reason),
                        },
                    )
                    .await?;
                    outcome.removed.push(media_id.clone());
                }
                Err(ReconcileError::Provider(e)) => {
                    warn!(collection_id, media_id = %media_id, error = %e, "failed to remove media");
                    outcome.failed.push(media_id.clone());
                }
                Err(e) => return Err(e),
            }
        }

        for media_id in &plan.to_add {
            let Some(item) = known.get(media_id.as_str()) else {
                continue;
            };
            match self.attach(&mut collection, item, false).await {
                Ok(_) => {
                    self.journal(
                        &collection,
                        Some(group),
                        Entry {
                            media_id,
                            title: &item.title,
                            change: Change::Added { manual: false },
                        },
                    )
                    .await?;
                    outcome.added.push(media_id.clone());
                }
                Err(ReconcileError::Provider(e)) => {
                    warn!(collection_id, media_id = %media_id, error = %e, "failed to add media");
                    outcome.failed.push(media_id.clone());
                }
                Err(e) => return Err(e),
            }
        }

        if !outcome.added.is_empty() {
            let added: HashSet<&str> = outcome.added.iter().map(String::as_str).collect();
            let fresh: Vec<CollectionMedia> = self
                .store
                .collection_media(collection.id)
                .await?
                .into_iter()
                .filter(|m| added.contains(m.media_id.as_str()))
                .collect();
            let mut immediate = ReconcileOutcome::default();
            self.handle_due(&mut collection, &fresh, &known, &excluded, Some(group), &mut immediate)
                .await?;
            outcome.handled.extend(immediate.handled);
            outcome.failed.extend(immediate.failed);
        }

        self.release_if_empty(&mut collection).await?;
        if !outcome.handled.is_empty() {
            self.store.save_collection(collection.clone()).await?;
        }

        info!(
            collection_id,
            rule_group_id = group.id,
            added = outcome.added.len(),
            removed = outcome.removed.len(),
            handled = outcome.handled.len(),
            failed = outcome.failed.len(),
            "collection reconciled"
        );
        Ok(outcome)
    }

    // ── Membership primitives ───────────────────────────────────

    /// External collection id, creating the collection on first use.
    pub(crate) async fn ensure_external(&self, collection: &mut Collection) -> Result<String> {
        if let Some(id) = &collection.plex_id {
            return Ok(id.clone());
        }
        let server = &self.providers.media_server;
        let id = server
            .create_collection(&CollectionRequest {
                library_id: collection.library_id.clone(),
                title: collection.title.clone(),
                description: collection.description.clone(),
                data_type: collection.data_type,
            })
            .await?;
        server
            .set_collection_visibility(
                &id,
                collection.visible_on_home,
                collection.visible_on_recommended,
            )
            .await?;
        collection.plex_id = Some(id.clone());
        self.store.save_collection(collection.clone()).await?;
        self.journal_collection(collection, format!("Created media server collection {}", id))
            .await?;
        Ok(id)
    }

    /// Track `item` and add it to the external collection.
    pub(crate) async fn attach(
        &self,
        collection: &mut Collection,
        item: &MediaItem,
        is_manual: bool,
    ) -> Result<CollectionMedia> {
        let external = self.ensure_external(collection).await?;
        self.providers
            .media_server
            .add_to_collection(&external, &item.id)
            .await?;
        let member = CollectionMedia {
            id: 0,
            collection_id: collection.id,
            media_id: item.id.clone(),
            tmdb_id: item.guids.tmdb,
            tvdb_id: item.guids.tvdb,
            add_date: self.clock.now(),
            image_path: item.image_path.clone(),
            is_manual,
        };
        Ok(self.store.add_collection_media(member).await?)
    }

    /// Remove `media_id` from the external collection and stop tracking it.
    pub(crate) async fn detach(&self, collection: &Collection, media_id: &str) -> Result<bool> {
        if let Some(external) = &collection.plex_id {
            self.providers
                .media_server
                .remove_from_collection(external, media_id)
                .await?;
        }
        Ok(self
            .store
            .remove_collection_media(collection.id, media_id)
            .await?)
    }

    /// Delete the external collection once nothing is tracked.
    pub(crate) async fn release_if_empty(&self, collection: &mut Collection) -> Result<bool> {
        let Some(external) = collection.plex_id.clone() else {
            return Ok(false);
        };
        if !self.store.collection_media(collection.id).await?.is_empty() {
            return Ok(false);
        }
        self.providers
            .media_server
            .delete_collection(&external)
            .await?;
        collection.plex_id = None;
        self.store.save_collection(collection.clone()).await?;
        self.journal_collection(
            collection,
            format!("Deleted empty media server collection {}", external),
        )
        .await?;
        Ok(true)
    }

    /// The rule group that owns `collection_id`, if any.
    pub(crate) async fn owning_group(&self, collection_id: i64) -> Result<Option<RuleGroup>> {
        Ok(self
            .store
            .rule_groups()
            .await?
            .into_iter()
            .find(|g| g.collection_id == Some(collection_id)))
    }
}
