//! Property catalog: every operand a rule can read, per application.
//!
//! A rule names its operand as an `(application id, property id)` pair. The
//! pair maps onto one variant of [`RuleProperty`], and every variant carries
//! static [`PropertyMeta`] (key, label, type, applicable media types). The
//! value resolver matches exhaustively on the same enum, so adding a property
//! without a resolver arm does not compile.

use serde::{Deserialize, Serialize};
use std::fmt;

use culler_core::DataType;

use super::application::Application;
use super::comparator::RuleType;

const ALL_TYPES: &[DataType] = &DataType::ALL;
const MOVIE: &[DataType] = &[DataType::Movie];
const SERIES: &[DataType] = &[DataType::Show, DataType::Season, DataType::Episode];
const PLAYABLE: &[DataType] = &[DataType::Movie, DataType::Episode];
const SHOW_SEASON: &[DataType] = &[DataType::Show, DataType::Season];
const SHOW: &[DataType] = &[DataType::Show];
const EPISODE: &[DataType] = &[DataType::Episode];

/// Static description of one property.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PropertyMeta {
    /// camelCase name, unique within the application.
    pub name: &'static str,
    pub label: &'static str,
    pub rule_type: RuleType,
    pub applies_to: &'static [DataType],
}

const fn meta(
    name: &'static str,
    label: &'static str,
    rule_type: RuleType,
    applies_to: &'static [DataType],
) -> PropertyMeta {
    PropertyMeta {
        name,
        label,
        rule_type,
        applies_to,
    }
}

// ── Plex ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlexProperty {
    AddDate,
    SeenBy,
    ReleaseDate,
    UserRating,
    People,
    ViewCount,
    Collections,
    LastViewedAt,
    VideoResolution,
    Bitrate,
    VideoCodec,
    Genre,
    Title,
    Year,
    AudienceRating,
    CriticRating,
    Labels,
    FileSize,
    Duration,
    EpisodeCount,
    ViewedEpisodes,
    UpdatedAt,
    AudioCodec,
}

impl PlexProperty {
    pub const ALL: [PlexProperty; 23] = [
        PlexProperty::AddDate,
        PlexProperty::SeenBy,
        PlexProperty::ReleaseDate,
        PlexProperty::UserRating,
        PlexProperty::People,
        PlexProperty::ViewCount,
        PlexProperty::Collections,
        PlexProperty::LastViewedAt,
        PlexProperty::VideoResolution,
        PlexProperty::Bitrate,
        PlexProperty::VideoCodec,
        PlexProperty::Genre,
        PlexProperty::Title,
        PlexProperty::Year,
        PlexProperty::AudienceRating,
        PlexProperty::CriticRating,
        PlexProperty::Labels,
        PlexProperty::FileSize,
        PlexProperty::Duration,
        PlexProperty::EpisodeCount,
        PlexProperty::ViewedEpisodes,
        PlexProperty::UpdatedAt,
        PlexProperty::AudioCodec,
    ];

    pub fn meta(self) -> PropertyMeta {
        use RuleType::*;
        match self {
            PlexProperty::AddDate => meta("addDate", "Date added", Date, ALL_TYPES),
            PlexProperty::SeenBy => meta("seenBy", "Seen by (username)", TextList, ALL_TYPES),
            PlexProperty::ReleaseDate => meta("releaseDate", "Release date", Date, ALL_TYPES),
            PlexProperty::UserRating => meta("rating_user", "User rating (scale 1-10)", Number, ALL_TYPES),
            PlexProperty::People => meta("people", "People involved", TextList, ALL_TYPES),
            PlexProperty::ViewCount => meta("viewCount", "Times viewed", Number, ALL_TYPES),
            PlexProperty::Collections => meta("collections", "Collections", TextList, ALL_TYPES),
            PlexProperty::LastViewedAt => meta("lastViewedAt", "Last view date", Date, ALL_TYPES),
            PlexProperty::VideoResolution => meta("fileVideoResolution", "Video resolution", Text, PLAYABLE),
            PlexProperty::Bitrate => meta("fileBitrate", "Bitrate (kbps)", Number, PLAYABLE),
            PlexProperty::VideoCodec => meta("fileVideoCodec", "Video codec", Text, PLAYABLE),
            PlexProperty::Genre => meta("genre", "Genres", TextList, ALL_TYPES),
            PlexProperty::Title => meta("title", "Title", Text, ALL_TYPES),
            PlexProperty::Year => meta("year", "Release year", Number, ALL_TYPES),
            PlexProperty::AudienceRating => meta("rating_audience", "Audience rating (scale 1-10)", Number, ALL_TYPES),
            PlexProperty::CriticRating => meta("rating_critics", "Critics rating (scale 1-10)", Number, ALL_TYPES),
            PlexProperty::Labels => meta("labels", "Labels", TextList, ALL_TYPES),
            PlexProperty::FileSize => meta("fileSize", "File size (MB)", Number, PLAYABLE),
            PlexProperty::Duration => meta("duration", "Duration (minutes)", Number, PLAYABLE),
            PlexProperty::EpisodeCount => meta("episodeCount", "Amount of episodes", Number, SHOW_SEASON),
            PlexProperty::ViewedEpisodes => meta("viewedEpisodes", "Amount of watched episodes", Number, SHOW_SEASON),
            PlexProperty::UpdatedAt => meta("lastUpdated", "Last metadata update", Date, ALL_TYPES),
            PlexProperty::AudioCodec => meta("fileAudioCodec", "Audio codec", Text, PLAYABLE),
        }
    }
}

// ── Radarr ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RadarrProperty {
    AddDate,
    FileDate,
    Tags,
    Profile,
    ReleaseDate,
    Monitored,
    DigitalRelease,
    PhysicalRelease,
    SizeOnDisk,
    FilePath,
    OriginalLanguage,
    HasFile,
}

impl RadarrProperty {
    pub const ALL: [RadarrProperty; 12] = [
        RadarrProperty::AddDate,
        RadarrProperty::FileDate,
        RadarrProperty::Tags,
        RadarrProperty::Profile,
        RadarrProperty::ReleaseDate,
        RadarrProperty::Monitored,
        RadarrProperty::DigitalRelease,
        RadarrProperty::PhysicalRelease,
        RadarrProperty::SizeOnDisk,
        RadarrProperty::FilePath,
        RadarrProperty::OriginalLanguage,
        RadarrProperty::HasFile,
    ];

    pub fn meta(self) -> PropertyMeta {
        use RuleType::*;
        match self {
            RadarrProperty::AddDate => meta("addDate", "Date added", Date, MOVIE),
            RadarrProperty::FileDate => meta("fileDate", "Date file downloaded", Date, MOVIE),
            RadarrProperty::Tags => meta("tags", "Tags", TextList, MOVIE),
            RadarrProperty::Profile => meta("profile", "Quality profile", Text, MOVIE),
            RadarrProperty::ReleaseDate => meta("releaseDate", "Release date", Date, MOVIE),
            RadarrProperty::Monitored => meta("monitored", "Is monitored", Bool, MOVIE),
            RadarrProperty::DigitalRelease => meta("digitalRelease", "Digital release date", Date, MOVIE),
            RadarrProperty::PhysicalRelease => meta("physicalRelease", "Physical release date", Date, MOVIE),
            RadarrProperty::SizeOnDisk => meta("sizeOnDisk", "Size on disk (MB)", Number, MOVIE),
            RadarrProperty::FilePath => meta("filePath", "File path", Text, MOVIE),
            RadarrProperty::OriginalLanguage => meta("originalLanguage", "Original language", Text, MOVIE),
            RadarrProperty::HasFile => meta("hasFile", "Has file", Bool, MOVIE),
        }
    }
}

// ── Sonarr ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SonarrProperty {
    AddDate,
    SizeOnDisk,
    Tags,
    Profile,
    FirstAirDate,
    SeasonCount,
    Status,
    Ended,
    Monitored,
    EpisodeFileCount,
    NextAiring,
    OriginalLanguage,
    HasFile,
}

impl SonarrProperty {
    pub const ALL: [SonarrProperty; 13] = [
        SonarrProperty::AddDate,
        SonarrProperty::SizeOnDisk,
        SonarrProperty::Tags,
        SonarrProperty::Profile,
        SonarrProperty::FirstAirDate,
        SonarrProperty::SeasonCount,
        SonarrProperty::Status,
        SonarrProperty::Ended,
        SonarrProperty::Monitored,
        SonarrProperty::EpisodeFileCount,
        SonarrProperty::NextAiring,
        SonarrProperty::OriginalLanguage,
        SonarrProperty::HasFile,
    ];

    pub fn meta(self) -> PropertyMeta {
        use RuleType::*;
        match self {
            SonarrProperty::AddDate => meta("addDate", "Date added", Date, SERIES),
            SonarrProperty::SizeOnDisk => meta("diskSizeEntireShow", "Size on disk (MB)", Number, SERIES),
            SonarrProperty::Tags => meta("tags", "Tags", TextList, SERIES),
            SonarrProperty::Profile => meta("profile", "Quality profile", Text, SERIES),
            SonarrProperty::FirstAirDate => meta("firstAirDate", "First air date", Date, SERIES),
            SonarrProperty::SeasonCount => meta("seasons", "Number of seasons", Number, SHOW),
            SonarrProperty::Status => meta("status", "Show status", Text, SHOW),
            SonarrProperty::Ended => meta("ended", "Show ended", Bool, SHOW),
            SonarrProperty::Monitored => meta("monitored", "Is monitored", Bool, SERIES),
            SonarrProperty::EpisodeFileCount => meta("episodeFileCount", "Episodes with files", Number, SHOW_SEASON),
            SonarrProperty::NextAiring => meta("nextAiring", "Next airing date", Date, SHOW),
            SonarrProperty::OriginalLanguage => meta("originalLanguage", "Original language", Text, SERIES),
            SonarrProperty::HasFile => meta("hasFile", "Has file", Bool, EPISODE),
        }
    }
}

// ── Overseerr / Jellyseerr ──────────────────────────────────────────

/// Request-manager properties. Overseerr and Jellyseerr share the set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestProperty {
    RequestedBy,
    RequestDate,
    ReleaseDate,
    ApprovalDate,
    MediaAddedAt,
    AmountRequested,
    IsRequested,
}

impl RequestProperty {
    pub const ALL: [RequestProperty; 7] = [
        RequestProperty::RequestedBy,
        RequestProperty::RequestDate,
        RequestProperty::ReleaseDate,
        RequestProperty::ApprovalDate,
        RequestProperty::MediaAddedAt,
        RequestProperty::AmountRequested,
        RequestProperty::IsRequested,
    ];

    pub fn meta(self) -> PropertyMeta {
        use RuleType::*;
        match self {
            RequestProperty::RequestedBy => meta("addUser", "Requested by (username)", TextList, ALL_TYPES),
            RequestProperty::RequestDate => meta("requestDate", "Request date", Date, ALL_TYPES),
            RequestProperty::ReleaseDate => meta("releaseDate", "Release date", Date, ALL_TYPES),
            RequestProperty::ApprovalDate => meta("approvalDate", "Approval date", Date, ALL_TYPES),
            RequestProperty::MediaAddedAt => meta("mediaAddedAt", "Media downloaded date", Date, ALL_TYPES),
            RequestProperty::AmountRequested => meta("amountRequested", "Amount of requests", Number, ALL_TYPES),
            RequestProperty::IsRequested => meta("isRequested", "Requested in the request manager", Bool, ALL_TYPES),
        }
    }
}

// ── Tautulli ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TautulliProperty {
    SeenBy,
    LastViewedAt,
    ViewCount,
    WatchPercent,
    PlayCount,
}

impl TautulliProperty {
    pub const ALL: [TautulliProperty; 5] = [
        TautulliProperty::SeenBy,
        TautulliProperty::LastViewedAt,
        TautulliProperty::ViewCount,
        TautulliProperty::WatchPercent,
        TautulliProperty::PlayCount,
    ];

    pub fn meta(self) -> PropertyMeta {
        use RuleType::*;
        match self {
            TautulliProperty::SeenBy => meta("seenBy", "Seen by (username)", TextList, ALL_TYPES),
            TautulliProperty::LastViewedAt => meta("lastViewedAt", "Last view date", Date, ALL_TYPES),
            TautulliProperty::ViewCount => meta("viewCount", "Times watched", Number, ALL_TYPES),
            TautulliProperty::WatchPercent => meta("watchPercent", "Highest watched percentage", Number, PLAYABLE),
            TautulliProperty::PlayCount => meta("playCount", "Total plays (any length)", Number, ALL_TYPES),
        }
    }
}

// ── RuleProperty ────────────────────────────────────────────────────

/// A rule operand source. Serialized as `[applicationId, propertyId]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "(u8, u16)", into = "(u8, u16)")]
pub enum RuleProperty {
    Plex(PlexProperty),
    Radarr(RadarrProperty),
    Sonarr(SonarrProperty),
    Overseerr(RequestProperty),
    Tautulli(TautulliProperty),
    Jellyseerr(RequestProperty),
}

fn position<T: PartialEq>(all: &[T], value: &T) -> u16 {
    all.iter().position(|v| v == value).unwrap_or_default() as u16
}

impl RuleProperty {
    pub fn application(self) -> Application {
        match self {
            RuleProperty::Plex(_) => Application::Plex,
            RuleProperty::Radarr(_) => Application::Radarr,
            RuleProperty::Sonarr(_) => Application::Sonarr,
            RuleProperty::Overseerr(_) => Application::Overseerr,
            RuleProperty::Tautulli(_) => Application::Tautulli,
            RuleProperty::Jellyseerr(_) => Application::Jellyseerr,
        }
    }

    /// Property id within its application (index in the `ALL` table).
    pub fn id(self) -> u16 {
        match self {
            RuleProperty::Plex(p) => position(&PlexProperty::ALL, &p),
            RuleProperty::Radarr(p) => position(&RadarrProperty::ALL, &p),
            RuleProperty::Sonarr(p) => position(&SonarrProperty::ALL, &p),
            RuleProperty::Overseerr(p) | RuleProperty::Jellyseerr(p) => {
                position(&RequestProperty::ALL, &p)
            }
            RuleProperty::Tautulli(p) => position(&TautulliProperty::ALL, &p),
        }
    }

    pub fn from_ids(application: Application, id: u16) -> Option<Self> {
        let i = usize::from(id);
        match application {
            Application::Plex => PlexProperty::ALL.get(i).copied().map(RuleProperty::Plex),
            Application::Radarr => RadarrProperty::ALL.get(i).copied().map(RuleProperty::Radarr),
            Application::Sonarr => SonarrProperty::ALL.get(i).copied().map(RuleProperty::Sonarr),
            Application::Overseerr => RequestProperty::ALL
                .get(i)
                .copied()
                .map(RuleProperty::Overseerr),
            Application::Tautulli => TautulliProperty::ALL
                .get(i)
                .copied()
                .map(RuleProperty::Tautulli),
            Application::Jellyseerr => RequestProperty::ALL
                .get(i)
                .copied()
                .map(RuleProperty::Jellyseerr),
        }
    }

    pub fn meta(self) -> PropertyMeta {
        match self {
            RuleProperty::Plex(p) => p.meta(),
            RuleProperty::Radarr(p) => p.meta(),
            RuleProperty::Sonarr(p) => p.meta(),
            RuleProperty::Overseerr(p) | RuleProperty::Jellyseerr(p) => p.meta(),
            RuleProperty::Tautulli(p) => p.meta(),
        }
    }

    pub fn rule_type(self) -> RuleType {
        self.meta().rule_type
    }

    pub fn applies_to(self, data_type: DataType) -> bool {
        self.meta().applies_to.contains(&data_type)
    }

    /// Stable human key, e.g. `plex.addDate`.
    pub fn key(self) -> String {
        format!("{}.{}", self.application().key(), self.meta().name)
    }

    /// Parse a `application.name` key. Application matching is
    /// case-insensitive; property names are matched exactly first, then
    /// case-insensitively.
    pub fn from_key(key: &str) -> Option<Self> {
        let (app, name) = key.trim().split_once('.')?;
        let application: Application = app.parse().ok()?;
        let candidates: Vec<RuleProperty> = Self::for_application(application).collect();
        candidates
            .iter()
            .copied()
            .find(|p| p.meta().name == name)
            .or_else(|| {
                candidates
                    .iter()
                    .copied()
                    .find(|p| p.meta().name.eq_ignore_ascii_case(name))
            })
    }

    pub fn for_application(application: Application) -> impl Iterator<Item = RuleProperty> {
        (0u16..)
            .map(move |id| RuleProperty::from_ids(application, id))
            .take_while(Option::is_some)
            .flatten()
    }

    /// Every property of every application.
    pub fn all() -> impl Iterator<Item = RuleProperty> {
        Application::ALL
            .into_iter()
            .flat_map(RuleProperty::for_application)
    }

    /// Every known key, for suggestions.
    pub fn all_keys() -> Vec<String> {
        Self::all().map(RuleProperty::key).collect()
    }
}

impl fmt::Display for RuleProperty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

impl TryFrom<(u8, u16)> for RuleProperty {
    type Error = String;

    fn try_from((app, id): (u8, u16)) -> std::result::Result<Self, Self::Error> {
        let application = Application::try_from(app)?;
        RuleProperty::from_ids(application, id)
            .ok_or_else(|| format!("unknown property id {} for {}", id, application))
    }
}

impl From<RuleProperty> for (u8, u16) {
    fn from(p: RuleProperty) -> (u8, u16) {
        (p.application().id(), p.id())
    }
}
