//! Media item model as returned by the media library provider.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identity of a media item on the media server (Plex rating key).
pub type MediaId = String;

/// The kind of media a rule group or collection applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    Movie,
    Show,
    Season,
    Episode,
}

impl DataType {
    pub const ALL: [DataType; 4] = [
        DataType::Movie,
        DataType::Show,
        DataType::Season,
        DataType::Episode,
    ];

    /// Whether the download manager for this type is Sonarr-like (series based).
    pub fn is_series(&self) -> bool {
        !matches!(self, DataType::Movie)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::Movie => "movie",
            DataType::Show => "show",
            DataType::Season => "season",
            DataType::Episode => "episode",
        }
    }
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DataType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "movie" | "movies" => Ok(DataType::Movie),
            "show" | "shows" => Ok(DataType::Show),
            "season" | "seasons" => Ok(DataType::Season),
            "episode" | "episodes" => Ok(DataType::Episode),
            other => Err(format!("unknown media type '{}'", other)),
        }
    }
}

/// External database identifiers attached to an item.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaGuids {
    pub tmdb: Option<i64>,
    pub tvdb: Option<i64>,
    pub imdb: Option<String>,
}

/// File-level details of the primary media part.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaFile {
    pub size_bytes: Option<u64>,
    pub video_resolution: Option<String>,
    pub bitrate_kbps: Option<u64>,
    pub video_codec: Option<String>,
    pub audio_codec: Option<String>,
}

/// A movie, show, season or episode in a library.
///
/// Seasons carry their show in `parent_id`; episodes carry their season in
/// `parent_id` and their show in `grandparent_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaItem {
    pub id: MediaId,
    pub library_id: String,
    pub data_type: DataType,
    pub title: String,
    #[serde(default)]
    pub parent_id: Option<MediaId>,
    #[serde(default)]
    pub grandparent_id: Option<MediaId>,
    /// Season number for seasons, episode number for episodes.
    #[serde(default)]
    pub index: Option<i32>,
    /// Season number for episodes.
    #[serde(default)]
    pub parent_index: Option<i32>,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub added_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub release_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_viewed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub view_count: u32,
    #[serde(default)]
    pub user_rating: Option<f64>,
    #[serde(default)]
    pub audience_rating: Option<f64>,
    #[serde(default)]
    pub critic_rating: Option<f64>,
    #[serde(default)]
    pub genres: Vec<String>,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub collections: Vec<String>,
    #[serde(default)]
    pub actors: Vec<String>,
    #[serde(default)]
    pub duration_ms: Option<u64>,
    #[serde(default)]
    pub file: Option<MediaFile>,
    /// Episode count below a show or season.
    #[serde(default)]
    pub leaf_count: Option<u32>,
    #[serde(default)]
    pub viewed_leaf_count: Option<u32>,
    #[serde(default)]
    pub guids: MediaGuids,
    #[serde(default)]
    pub image_path: Option<String>,
}

impl MediaItem {
    /// Minimal item with only identity fields populated.
    pub fn new(
        id: impl Into<MediaId>,
        library_id: impl Into<String>,
        data_type: DataType,
        title: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            library_id: library_id.into(),
            data_type,
            title: title.into(),
            parent_id: None,
            grandparent_id: None,
            index: None,
            parent_index: None,
            year: None,
            added_at: None,
            updated_at: None,
            release_date: None,
            last_viewed_at: None,
            view_count: 0,
            user_rating: None,
            audience_rating: None,
            critic_rating: None,
            genres: Vec::new(),
            labels: Vec::new(),
            collections: Vec::new(),
            actors: Vec::new(),
            duration_ms: None,
            file: None,
            leaf_count: None,
            viewed_leaf_count: None,
            guids: MediaGuids::default(),
            image_path: None,
        }
    }

    /// Id of the show this item belongs to (itself for shows).
    pub fn show_id(&self) -> Option<&str> {
        match self.data_type {
            DataType::Movie => None,
            DataType::Show => Some(self.id.as_str()),
            DataType::Season => self.parent_id.as_deref(),
            DataType::Episode => self.grandparent_id.as_deref(),
        }
    }

    /// Ids of every ancestor, nearest first.
    pub fn ancestor_ids(&self) -> Vec<&str> {
        [self.parent_id.as_deref(), self.grandparent_id.as_deref()]
            .into_iter()
            .flatten()
            .collect()
    }
}

/// A single play of an item by a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchRecord {
    pub user: String,
    pub viewed_at: DateTime<Utc>,
    /// Percent of the item played, when the source reports it.
    #[serde(default)]
    pub percent_complete: Option<f64>,
}
