//! Radarr and Sonarr properties, read from the download manager's record
//! for the item (the parent show's record for seasons and episodes).

use culler_core::MediaItem;

use super::{date, megabytes, number, text, ValueResolver};
use crate::schema::{Application, RadarrProperty, RuleValue, SonarrProperty};

pub(super) async fn resolve_radarr(
    resolver: &ValueResolver,
    property: RadarrProperty,
    item: &MediaItem,
) -> Option<RuleValue> {
    let media = resolver.arr_media(Application::Radarr, item).await?;
    match property {
        RadarrProperty::AddDate => date(media.added),
        RadarrProperty::FileDate => date(media.file_added),
        RadarrProperty::Tags => Some(RuleValue::TextList(media.tags)),
        RadarrProperty::Profile => text(media.quality_profile.as_ref()),
        RadarrProperty::ReleaseDate => date(media.release_date),
        RadarrProperty::Monitored => Some(RuleValue::Bool(media.monitored)),
        RadarrProperty::DigitalRelease => date(media.digital_release),
        RadarrProperty::PhysicalRelease => date(media.physical_release),
        RadarrProperty::SizeOnDisk => megabytes(media.size_on_disk),
        RadarrProperty::FilePath => text(media.file_path.as_ref()),
        RadarrProperty::OriginalLanguage => text(media.original_language.as_ref()),
        RadarrProperty::HasFile => Some(RuleValue::Bool(media.has_file)),
    }
}

pub(super) async fn resolve_sonarr(
    resolver: &ValueResolver,
    property: SonarrProperty,
    item: &MediaItem,
) -> Option<RuleValue> {
    let media = resolver.arr_media(Application::Sonarr, item).await?;
    match property {
        SonarrProperty::AddDate => date(media.added),
        SonarrProperty::SizeOnDisk => megabytes(media.size_on_disk),
        SonarrProperty::Tags => Some(RuleValue::TextList(media.tags)),
        SonarrProperty::Profile => text(media.quality_profile.as_ref()),
        SonarrProperty::FirstAirDate => date(media.release_date),
        SonarrProperty::SeasonCount => number(media.season_count),
        SonarrProperty::Status => text(media.status.as_ref()),
        SonarrProperty::Ended => media.ended.map(RuleValue::Bool),
        SonarrProperty::Monitored => Some(RuleValue::Bool(media.monitored)),
        SonarrProperty::EpisodeFileCount => number(media.episode_file_count),
        SonarrProperty::NextAiring => date(media.next_airing),
        SonarrProperty::OriginalLanguage => text(media.original_language.as_ref()),
        SonarrProperty::HasFile => Some(RuleValue::Bool(media.has_file)),
    }
}
