//! Collection log rows and the matching media events.

use tracing::info;

use culler_core::{ArrAction, Collection, CollectionLog, CollectionLogType, LogMeta, RecordId};
use culler_notify::events::MediaChange;
use culler_notify::EventPayload;
use culler_rules::RuleGroup;

use crate::error::Result;
use crate::reconciler::CollectionReconciler;

/// Why a member left a collection without being handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalReason {
    /// The rule group reported it as no longer matching.
    Unmatched,
    /// An exclusion now covers it.
    Excluded,
    /// A user removed it.
    Manual,
    /// It no longer exists in the media library.
    Missing,
}

impl RemovalReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RemovalReason::Unmatched => "unmatched",
            RemovalReason::Excluded => "excluded",
            RemovalReason::Manual => "manual",
            RemovalReason::Missing => "missing",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Change {
    Added { manual: bool },
    Removed(RemovalReason),
    Handled(ArrAction),
}

/// Item identity carried into a journal entry.
pub(crate) struct Entry<'a> {
    pub media_id: &'a str,
    pub title: &'a str,
    pub change: Change,
}

fn group_ref(group: Option<&RuleGroup>) -> (Option<RecordId>, Option<String>) {
    match group {
        Some(g) => (Some(g.id), Some(g.name.clone())),
        None => (None, None),
    }
}

impl CollectionReconciler {
    /// Append a media log row and emit the matching `CollectionMedia_*` event.
    pub(crate) async fn journal(
        &self,
        collection: &Collection,
        group: Option<&RuleGroup>,
        entry: Entry<'_>,
    ) -> Result<()> {
        let (rule_group_id, rule_group_name) = group_ref(group);
        let title = entry.title;

        let (message, meta, action, reason) = match entry.change {
            Change::Added { manual: true } => (
                format!("Added \"{}\" manually", title),
                Some(LogMeta::Manual { added: true }),
                None,
                Some("manual"),
            ),
            Change::Added { manual: false } => (
                format!("Added \"{}\"", title),
                group.map(|g| LogMeta::RuleMatched {
                    rule_group_id: g.id,
                    rule_group_name: g.name.clone(),
                }),
                None,
                None,
            ),
            Change::Removed(why) => {
                let meta = match why {
                    RemovalReason::Unmatched => group.map(|g| LogMeta::RuleUnmatched {
                        rule_group_id: g.id,
                        rule_group_name: g.name.clone(),
                    }),
                    RemovalReason::Excluded => group.map(|g| LogMeta::Excluded {
                        rule_group_id: g.id,
                    }),
                    RemovalReason::Manual => Some(LogMeta::Manual { added: false }),
                    RemovalReason::Missing => Some(LogMeta::Missing),
                };
                (
                    format!("Removed \"{}\" ({})", title, why.as_str()),
                    meta,
                    None,
                    Some(why.as_str()),
                )
            }
            Change::Handled(action) => (
                format!("Handled \"{}\" ({})", title, action),
                Some(LogMeta::Handled { action }),
                Some(action),
                None,
            ),
        };

        info!(
            collection_id = collection.id,
            media_id = %entry.media_id,
            "{}",
            message
        );
        self.store
            .append_log(CollectionLog {
                id: 0,
                collection_id: collection.id,
                timestamp: self.clock.now(),
                message,
                log_type: CollectionLogType::Media,
                meta,
            })
            .await?;

        let change = MediaChange {
            collection_id: collection.id,
            collection_title: collection.title.clone(),
            media_id: entry.media_id.to_string(),
            title: title.to_string(),
            rule_group_id,
            rule_group_name,
            action,
            reason: reason.map(String::from),
        };
        self.bus.emit(match entry.change {
            Change::Added { .. } => EventPayload::CollectionMediaAdded(change),
            Change::Removed(_) => EventPayload::CollectionMediaRemoved(change),
            Change::Handled(_) => EventPayload::CollectionMediaHandled(change),
        });
        Ok(())
    }

    /// Append a collection-level log row.
    pub(crate) async fn journal_collection(
        &self,
        collection: &Collection,
        message: impl Into<String>,
    ) -> Result<()> {
        let message = message.into();
        info!(collection_id = collection.id, "{}", message);
        self.store
            .append_log(CollectionLog {
                id: 0,
                collection_id: collection.id,
                timestamp: self.clock.now(),
                message,
                log_type: CollectionLogType::Collection,
                meta: None,
            })
            .await?;
        Ok(())
    }
}
