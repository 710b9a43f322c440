//! Plex properties. Everything except `seenBy` reads the item itself.

use culler_core::MediaItem;

use super::{date, distinct_users, list, megabytes, number, text, ValueResolver};
use crate::schema::{PlexProperty, RuleValue};

pub(super) async fn resolve(
    resolver: &ValueResolver,
    property: PlexProperty,
    item: &MediaItem,
) -> Option<RuleValue> {
    let file = item.file.as_ref();
    match property {
        PlexProperty::AddDate => date(item.added_at),
        PlexProperty::SeenBy => {
            let history = resolver.plex_history(item).await?;
            list(&distinct_users(history.iter()))
        }
        PlexProperty::ReleaseDate => date(item.release_date),
        PlexProperty::UserRating => number(item.user_rating),
        PlexProperty::People => list(&item.actors),
        PlexProperty::ViewCount => number(Some(item.view_count)),
        PlexProperty::Collections => list(&item.collections),
        PlexProperty::LastViewedAt => date(item.last_viewed_at),
        PlexProperty::VideoResolution => text(file.and_then(|f| f.video_resolution.as_ref())),
        PlexProperty::Bitrate => file
            .and_then(|f| f.bitrate_kbps)
            .map(|kbps| RuleValue::Number(kbps as f64)),
        PlexProperty::VideoCodec => text(file.and_then(|f| f.video_codec.as_ref())),
        PlexProperty::AudioCodec => text(file.and_then(|f| f.audio_codec.as_ref())),
        PlexProperty::Genre => list(&item.genres),
        PlexProperty::Title => Some(RuleValue::Text(item.title.clone())),
        PlexProperty::Year => number(item.year),
        PlexProperty::AudienceRating => number(item.audience_rating),
        PlexProperty::CriticRating => number(item.critic_rating),
        PlexProperty::Labels => list(&item.labels),
        PlexProperty::FileSize => megabytes(file.and_then(|f| f.size_bytes)),
        PlexProperty::Duration => item
            .duration_ms
            .map(|ms| RuleValue::Number((ms / 60_000) as f64)),
        PlexProperty::EpisodeCount => number(item.leaf_count),
        PlexProperty::ViewedEpisodes => number(item.viewed_leaf_count),
        PlexProperty::UpdatedAt => date(item.updated_at),
    }
}
