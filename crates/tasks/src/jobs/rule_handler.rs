use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;

use async_trait::async_trait;
use tracing::{debug, error, info};

use culler_collections::CollectionReconciler;
use culler_core::AbortSignal;
use culler_notify::events::{Failure, Finished, GroupProgress, RuleHandlerProgress};
use culler_notify::{EventBus, EventPayload};
use culler_rules::{RuleGroup, RuleGroupHandler};
use culler_storage::SharedStore;

use crate::error::Result;
use crate::runner::Job;

use super::RULE_HANDLER;

/// Evaluates every active rule group and reconciles its collection.
///
/// A failing group emits `RuleHandler_Failed` and the run moves on. The
/// abort signal is checked between groups and, inside a group, between
/// evaluation batches.
pub struct RuleHandlerJob {
    store: SharedStore,
    reconciler: Arc<CollectionReconciler>,
    bus: EventBus,
    handler: RwLock<Arc<RuleGroupHandler>>,
}

impl RuleHandlerJob {
    pub fn new(
        store: SharedStore,
        reconciler: Arc<CollectionReconciler>,
        bus: EventBus,
        handler: RuleGroupHandler,
    ) -> Self {
        Self {
            store,
            reconciler,
            bus,
            handler: RwLock::new(Arc::new(handler)),
        }
    }

    /// Swap in a handler built from new settings. A run in progress keeps
    /// the handler it started with.
    pub fn replace_handler(&self, handler: RuleGroupHandler) {
        *self.handler.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(handler);
    }

    pub fn handler(&self) -> Arc<RuleGroupHandler> {
        self.handler
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    async fn process_group(
        &self,
        handler: &RuleGroupHandler,
        group: &RuleGroup,
        abort: &AbortSignal,
        processed_groups: usize,
        total_groups: usize,
    ) -> Result<()> {
        let started = Instant::now();
        let collection = match group.collection_id {
            Some(id) => self.store.collection(id).await?,
            None => None,
        };
        let exclusions = self.store.exclusions_for_group(group.id).await?;

        let bus = self.bus.clone();
        let name = group.name.clone();
        let evaluation = handler
            .evaluate(group, collection.as_ref(), &exclusions, abort, |p| {
                bus.emit(EventPayload::RuleHandlerProgressed(RuleHandlerProgress {
                    total_groups,
                    processed_groups,
                    processing_group: Some(GroupProgress {
                        name: name.clone(),
                        processed_evaluations: p.processed,
                        total_evaluations: p.total,
                    }),
                }));
            })
            .await?;

        let Some(evaluation) = evaluation else {
            return Ok(());
        };
        if evaluation.aborted {
            return Ok(());
        }
        let Some(collection_id) = collection.map(|c| c.id) else {
            debug!(rule_group_id = group.id, "rule group has no collection, nothing to reconcile");
            return Ok(());
        };

        let outcome = self.reconciler.reconcile(group, &evaluation).await?;

        if let Some(mut collection) = self.store.collection(collection_id).await? {
            collection.last_duration_in_seconds = started.elapsed().as_secs();
            self.store.save_collection(collection).await?;
        }
        info!(
            rule_group_id = group.id,
            collection_id,
            added = outcome.added.len(),
            removed = outcome.removed.len(),
            handled = outcome.handled.len(),
            failed = outcome.failed.len(),
            "rule group reconciled"
        );
        Ok(())
    }
}

#[async_trait]
impl Job for RuleHandlerJob {
    fn name(&self) -> &str {
        RULE_HANDLER
    }

    async fn run(&self, abort: &AbortSignal) -> Result<()> {
        let started = Instant::now();
        self.bus.emit(EventPayload::RuleHandlerStarted);

        let groups: Vec<RuleGroup> = self
            .store
            .rule_groups()
            .await?
            .into_iter()
            .filter(RuleGroup::is_evaluated)
            .collect();
        let total = groups.len();
        let handler = self.handler();
        info!(groups = total, "rule handler started");

        for (index, group) in groups.iter().enumerate() {
            if abort.is_aborted() {
                info!(processed = index, total, "rule handler stopped between groups");
                break;
            }
            self.bus
                .emit(EventPayload::RuleHandlerProgressed(RuleHandlerProgress {
                    total_groups: total,
                    processed_groups: index,
                    processing_group: Some(GroupProgress {
                        name: group.name.clone(),
                        processed_evaluations: 0,
                        total_evaluations: 0,
                    }),
                }));

            if let Err(e) = self
                .process_group(&handler, group, abort, index, total)
                .await
            {
                error!(rule_group_id = group.id, rule_group = %group.name, error = %e, "rule group failed");
                self.bus.emit(EventPayload::RuleHandlerFailed(Failure {
                    rule_group_id: Some(group.id),
                    collection_id: group.collection_id,
                    name: group.name.clone(),
                    error: e.to_string(),
                }));
            }
        }

        let aborted = abort.is_aborted();
        if !aborted {
            self.bus
                .emit(EventPayload::RuleHandlerProgressed(RuleHandlerProgress {
                    total_groups: total,
                    processed_groups: total,
                    processing_group: None,
                }));
        }
        let duration_ms = started.elapsed().as_millis() as u64;
        self.bus.emit(EventPayload::RuleHandlerFinished(Finished {
            duration_ms,
            aborted,
        }));
        info!(duration_ms, aborted, "rule handler finished");
        Ok(())
    }
}
