//! Data-source applications a rule operand can be read from.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Where a rule operand comes from. Serialized as its numeric id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Application {
    Plex,
    Radarr,
    Sonarr,
    Overseerr,
    Tautulli,
    Jellyseerr,
}

impl Application {
    pub const ALL: [Application; 6] = [
        Application::Plex,
        Application::Radarr,
        Application::Sonarr,
        Application::Overseerr,
        Application::Tautulli,
        Application::Jellyseerr,
    ];

    pub fn id(self) -> u8 {
        match self {
            Application::Plex => 0,
            Application::Radarr => 1,
            Application::Sonarr => 2,
            Application::Overseerr => 3,
            Application::Tautulli => 4,
            Application::Jellyseerr => 5,
        }
    }

    pub fn from_id(id: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|a| a.id() == id)
    }

    /// Lowercase key used as the prefix of property keys (`plex.addDate`).
    pub fn key(self) -> &'static str {
        match self {
            Application::Plex => "plex",
            Application::Radarr => "radarr",
            Application::Sonarr => "sonarr",
            Application::Overseerr => "overseerr",
            Application::Tautulli => "tautulli",
            Application::Jellyseerr => "jellyseerr",
        }
    }
}

impl fmt::Display for Application {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for Application {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|a| a.key().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown application: '{}'", s))
    }
}

impl TryFrom<u8> for Application {
    type Error = String;

    fn try_from(id: u8) -> std::result::Result<Self, Self::Error> {
        Self::from_id(id).ok_or_else(|| format!("unknown application id: {}", id))
    }
}

impl From<Application> for u8 {
    fn from(app: Application) -> u8 {
        app.id()
    }
}
