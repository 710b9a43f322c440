use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tracing::{error, info, warn};

use culler_collections::CollectionReconciler;
use culler_core::{AbortSignal, Collection};
use culler_notify::events::{CollectionHandlerProgress, Failure, Finished};
use culler_notify::{EventBus, EventPayload};
use culler_storage::SharedStore;

use crate::error::Result;
use crate::runner::Job;

use super::COLLECTION_HANDLER;

/// Runs the retention pass and housekeeping over every active collection:
/// arr actions for due members, pruning of vanished media and old logs,
/// then one sweep of exclusions whose media is gone.
pub struct CollectionHandlerJob {
    store: SharedStore,
    reconciler: Arc<CollectionReconciler>,
    bus: EventBus,
}

impl CollectionHandlerJob {
    pub fn new(store: SharedStore, reconciler: Arc<CollectionReconciler>, bus: EventBus) -> Self {
        Self {
            store,
            reconciler,
            bus,
        }
    }

    async fn process_collection(&self, collection: &Collection) -> Result<()> {
        let started = Instant::now();
        let outcome = self.reconciler.handle_collection(collection.id).await?;
        let pruned = self.reconciler.prune_missing(collection.id).await?;
        let logs = self.reconciler.prune_logs(collection.id).await?;

        if !outcome.handled.is_empty() || !pruned.is_empty() {
            if let Some(mut stored) = self.store.collection(collection.id).await? {
                stored.last_duration_in_seconds = started.elapsed().as_secs();
                self.store.save_collection(stored).await?;
            }
        }
        info!(
            collection_id = collection.id,
            handled = outcome.handled.len(),
            failed = outcome.failed.len(),
            pruned = pruned.len(),
            logs_pruned = logs,
            "collection handled"
        );
        Ok(())
    }
}

#[async_trait]
impl Job for CollectionHandlerJob {
    fn name(&self) -> &str {
        COLLECTION_HANDLER
    }

    async fn run(&self, abort: &AbortSignal) -> Result<()> {
        let started = Instant::now();
        self.bus.emit(EventPayload::CollectionHandlerStarted);

        let collections: Vec<Collection> = self
            .store
            .collections()
            .await?
            .into_iter()
            .filter(|c| c.is_active)
            .collect();
        let total = collections.len();
        info!(collections = total, "collection handler started");

        for (index, collection) in collections.iter().enumerate() {
            if abort.is_aborted() {
                info!(processed = index, total, "collection handler stopped between collections");
                break;
            }
            self.bus
                .emit(EventPayload::CollectionHandlerProgressed(CollectionHandlerProgress {
                    total_collections: total,
                    processed_collections: index,
                    processing_collection: Some(collection.title.clone()),
                }));

            if let Err(e) = self.process_collection(collection).await {
                error!(collection_id = collection.id, collection = %collection.title, error = %e, "collection failed");
                self.bus.emit(EventPayload::CollectionHandlerFailed(Failure {
                    rule_group_id: None,
                    collection_id: Some(collection.id),
                    name: collection.title.clone(),
                    error: e.to_string(),
                }));
            }
        }

        let aborted = abort.is_aborted();
        if !aborted {
            if let Err(e) = self.reconciler.sweep_exclusions().await {
                warn!(error = %e, "exclusion sweep failed");
            }
            self.bus
                .emit(EventPayload::CollectionHandlerProgressed(CollectionHandlerProgress {
                    total_collections: total,
                    processed_collections: total,
                    processing_collection: None,
                }));
        }
        let duration_ms = started.elapsed().as_millis() as u64;
        self.bus.emit(EventPayload::CollectionHandlerFinished(Finished {
            duration_ms,
            aborted,
        }));
        info!(duration_ms, aborted, "collection handler finished");
        Ok(())
    }
}
