//! Rule-group handler: evaluates one group over its library.
//!
//! Loads the group's items, drops excluded ones up front, evaluates the rest
//! in batches with bounded concurrency and partitions them into matched and
//! unmatched sets for the collection reconciler. The abort signal is checked
//! between batches, never inside one.

use std::collections::HashSet;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use serde::Serialize;
use tracing::{debug, info};

use culler_core::config::{RuleHandlerConfig, TautulliConfig};
use culler_core::providers::Providers;
use culler_core::{
    AbortSignal, Collection, DataType, Exclusion, MediaId, MediaItem, SharedClock,
};

use crate::evaluator::{evaluate_rule, evaluate_sections, literal_operand};
use crate::loader::{Result, RuleError};
use crate::resolver::ValueResolver;
use crate::schema::{Comparator, Operator, RuleDefinition, RuleGroup, RuleValue};

/// Tuning knobs for a handler run.
#[derive(Debug, Clone)]
pub struct HandlerSettings {
    pub concurrency: usize,
    pub batch_size: usize,
    pub progress_interval: Duration,
    /// Watched threshold used when the collection has no override.
    pub watched_percent: f64,
}

impl HandlerSettings {
    pub fn from_config(rules: &RuleHandlerConfig, tautulli: &TautulliConfig) -> Self {
        Self {
            concurrency: rules.concurrency.max(1),
            batch_size: rules.batch_size.max(1),
            progress_interval: rules.progress_interval(),
            watched_percent: tautulli.watched_percent,
        }
    }
}

impl Default for HandlerSettings {
    fn default() -> Self {
        Self::from_config(&RuleHandlerConfig::default(), &TautulliConfig::default())
    }
}

/// Progress of one group's evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvaluationProgress {
    pub processed: usize,
    pub total: usize,
}

/// Outcome of evaluating one rule group.
#[derive(Debug, Clone, Default)]
pub struct GroupEvaluation {
    pub rule_group_id: i64,
    pub matched: Vec<MediaItem>,
    pub unmatched: Vec<MediaItem>,
    /// Items removed from the candidate set by an exclusion.
    pub excluded: Vec<MediaId>,
    /// Set when the abort signal stopped the run before every batch ran.
    /// Partial results must not be reconciled.
    pub aborted: bool,
}

impl GroupEvaluation {
    pub fn matched_ids(&self) -> HashSet<&str> {
        self.matched.iter().map(|i| i.id.as_str()).collect()
    }

    pub fn unmatched_ids(&self) -> HashSet<&str> {
        self.unmatched.iter().map(|i| i.id.as_str()).collect()
    }
}

/// One rule's outcome in a single-item test.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleTrace {
    pub index: usize,
    pub section: u32,
    pub operator: Option<Operator>,
    pub first_val: String,
    pub action: Comparator,
    pub left: Option<RuleValue>,
    pub right: Option<RuleValue>,
    pub result: bool,
}

/// Result of testing a group against one item.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaTestResult {
    pub media_id: MediaId,
    pub title: String,
    pub matched: bool,
    pub rules: Vec<RuleTrace>,
}

pub struct RuleGroupHandler {
    providers: Providers,
    clock: SharedClock,
    settings: HandlerSettings,
}

impl RuleGroupHandler {
    pub fn new(providers: Providers, clock: SharedClock, settings: HandlerSettings) -> Self {
        Self {
            providers,
            clock,
            settings,
        }
    }

    pub fn settings(&self) -> &HandlerSettings {
        &self.settings
    }

    fn resolver_for(&self, collection: Option<&Collection>) -> ValueResolver {
        let watched = collection
            .and_then(|c| c.tautulli_watched_percent_override)
            .unwrap_or(self.settings.watched_percent);
        ValueResolver::new(self.providers.clone(), watched)
    }

    /// Evaluate `group` over its library.
    ///
    /// Returns `Ok(None)` when the group is inactive or manual. `progress` is
    /// called at most once per progress interval, plus once at the end.
    pub async fn evaluate<P>(
        &self,
        group: &RuleGroup,
        collection: Option<&Collection>,
        exclusions: &[Exclusion],
        abort: &AbortSignal,
        mut progress: P,
    ) -> Result<Option<GroupEvaluation>>
    where
        P: FnMut(EvaluationProgress),
    {
        if !group.is_evaluated() {
            debug!(rule_group_id = group.id, "rule group inactive or manual, skipped");
            return Ok(None);
        }

        let items = self
            .providers
            .media_server
            .library_items(&group.library_id, group.data_type)
            .await?;
        let resolver = self.resolver_for(collection);
        let list_excluded = self.list_exclusions(group.data_type, collection).await?;

        let excluded_ids: HashSet<&str> = exclusions
            .iter()
            .filter(|e| e.applies_to_group(group.id))
            .map(|e| e.media_id.as_str())
            .collect();

        let mut evaluation = GroupEvaluation {
            rule_group_id: group.id,
            ..Default::default()
        };
        let mut candidates = Vec::with_capacity(items.len());
        for item in items {
            if is_excluded(&item, &excluded_ids)
                || self.on_list_exclusion(&resolver, &item, &list_excluded).await
            {
                evaluation.excluded.push(item.id.clone());
            } else {
                candidates.push(item);
            }
        }

        let total = candidates.len();
        let now = self.clock.now();
        let mut processed = 0usize;
        let mut last_report = tokio::time::Instant::now();
        info!(
            rule_group_id = group.id,
            rule_group = %group.name,
            items = total,
            excluded = evaluation.excluded.len(),
            "evaluating rule group"
        );

        let mut pending = candidates.into_iter().peekable();
        while pending.peek().is_some() {
            if abort.is_aborted() {
                info!(rule_group_id = group.id, processed, total, "rule group evaluation aborted");
                evaluation.aborted = true;
                return Ok(Some(evaluation));
            }

            let batch: Vec<MediaItem> = pending.by_ref().take(self.settings.batch_size).collect();
            let outcomes: Vec<(MediaItem, bool)> = stream::iter(batch)
                .map(|item| {
                    let resolver = &resolver;
                    let rules = &group.rules;
                    async move {
                        let matched = matches(rules, &item, resolver, now).await;
                        (item, matched)
                    }
                })
                .buffer_unordered(self.settings.concurrency)
                .collect()
                .await;

            processed += outcomes.len();
            for (item, matched) in outcomes {
                if matched {
                    evaluation.matched.push(item);
                } else {
                    evaluation.unmatched.push(item);
                }
            }

            if last_report.elapsed() >= self.settings.progress_interval {
                progress(EvaluationProgress { processed, total });
                last_report = tokio::time::Instant::now();
            }
        }
        progress(EvaluationProgress { processed, total });

        info!(
            rule_group_id = group.id,
            matched = evaluation.matched.len(),
            unmatched = evaluation.unmatched.len(),
            "rule group evaluated"
        );
        Ok(Some(evaluation))
    }

    /// Evaluate `group` against one item, tracing every rule.
    ///
    /// Unlike a library run, every rule is resolved so the trace is complete;
    /// the overall result still follows section composition.
    pub async fn test_media(
        &self,
        group: &RuleGroup,
        collection: Option<&Collection>,
        media_id: &str,
    ) -> Result<MediaTestResult> {
        let item = self
            .providers
            .media_server
            .metadata(media_id)
            .await?
            .ok_or_else(|| RuleError::MediaNotFound(media_id.to_string()))?;
        let resolver = self.resolver_for(collection);
        let now = self.clock.now();

        let mut traces = Vec::with_capacity(group.rules.len());
        for (index, rule) in group.rules.iter().enumerate() {
            let (left, right) = operands(rule, &item, &resolver).await;
            let result = evaluate_rule(rule, left.as_ref(), right.as_ref(), now);
            traces.push(RuleTrace {
                index,
                section: rule.section,
                operator: rule.operator,
                first_val: rule.first_val.key(),
                action: rule.action,
                left,
                right,
                result,
            });
        }
        let results: Vec<bool> = traces.iter().map(|t| t.result).collect();
        let matched = evaluate_sections(&group.rules, |i, _| {
            let r = results[i];
            async move { r }
        })
        .await;

        Ok(MediaTestResult {
            media_id: item.id,
            title: item.title,
            matched,
            rules: traces,
        })
    }

    /// External ids on the download manager's import-list exclusions, when
    /// the collection asks for them.
    async fn list_exclusions(
        &self,
        data_type: DataType,
        collection: Option<&Collection>,
    ) -> Result<HashSet<i64>> {
        if !collection.is_some_and(|c| c.list_exclusions) {
            return Ok(HashSet::new());
        }
        match self.providers.download_manager_for(data_type) {
            Some(manager) => Ok(manager.list_exclusions().await?.into_iter().collect()),
            None => Ok(HashSet::new()),
        }
    }

    async fn on_list_exclusion(
        &self,
        resolver: &ValueResolver,
        item: &MediaItem,
        list_excluded: &HashSet<i64>,
    ) -> bool {
        if list_excluded.is_empty() {
            return false;
        }
        let target = resolver.target(item).await;
        let id = if item.data_type.is_series() {
            target.tvdb_id
        } else {
            target.tmdb_id
        };
        id.is_some_and(|id| list_excluded.contains(&id))
    }
}

/// An item is excluded when it, its season or its show is.
fn is_excluded(item: &MediaItem, excluded: &HashSet<&str>) -> bool {
    excluded.contains(item.id.as_str())
        || item.ancestor_ids().iter().any(|id| excluded.contains(id))
}

async fn operands(
    rule: &RuleDefinition,
    item: &MediaItem,
    resolver: &ValueResolver,
) -> (Option<RuleValue>, Option<RuleValue>) {
    let left = resolver.resolve(rule.first_val, item).await;
    let right = match rule.last_val {
        Some(property) => resolver.resolve(property, item).await,
        None => literal_operand(rule),
    };
    (left, right)
}

async fn matches(
    rules: &[RuleDefinition],
    item: &MediaItem,
    resolver: &ValueResolver,
    now: chrono::DateTime<chrono::Utc>,
) -> bool {
    evaluate_sections(rules, |_, rule| async move {
        let (left, right) = operands(rule, item, resolver).await;
        evaluate_rule(rule, left.as_ref(), right.as_ref(), now)
    })
    .await
}
