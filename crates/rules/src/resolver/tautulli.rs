//! Tautulli properties.
//!
//! A play counts as watched when its percent-complete reaches the resolver's
//! threshold. Plays without a reported percentage count as watched.

use culler_core::{MediaItem, WatchRecord};

use super::{distinct_users, ValueResolver};
use crate::schema::{RuleValue, TautulliProperty};

pub(super) async fn resolve(
    resolver: &ValueResolver,
    property: TautulliProperty,
    item: &MediaItem,
) -> Option<RuleValue> {
    if property == TautulliProperty::WatchPercent {
        return resolver.max_watch_percent(item).await.map(RuleValue::Number);
    }

    let plays = resolver.plays(item).await?;
    let threshold = resolver.watched_percent();
    let watched: Vec<&WatchRecord> = plays.iter().filter(|p| is_watched(p, threshold)).collect();

    match property {
        TautulliProperty::SeenBy => Some(RuleValue::TextList(distinct_users(watched.iter().copied()))),
        TautulliProperty::LastViewedAt => watched.iter().map(|p| p.viewed_at).max().map(RuleValue::Date),
        TautulliProperty::ViewCount => Some(RuleValue::Number(watched.len() as f64)),
        TautulliProperty::PlayCount => Some(RuleValue::Number(plays.len() as f64)),
        TautulliProperty::WatchPercent => None,
    }
}

fn is_watched(play: &WatchRecord, threshold: f64) -> bool {
    play.percent_complete.map_or(true, |p| p >= threshold)
}
