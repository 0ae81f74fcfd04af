use serde::{Deserialize, Serialize};

/// An artist credit on a track, as reported by one catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtistCredit {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AlbumRef {
    pub id: String,
    pub name: String,
}

/// A track fetched from either catalog.
///
/// Durations are always stored in milliseconds; catalog adapters convert with
/// [`DurationUnit::to_millis`] at their parse boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub id: String,
    pub title: String,
    /// Never empty. The first entry is the primary artist.
    pub artists: Vec<ArtistCredit>,
    pub album: AlbumRef,
    pub duration_ms: u64,
    #[serde(default)]
    pub isrc: Option<String>,
    #[serde(default)]
    pub explicit: Option<bool>,
    #[serde(default)]
    pub popularity: Option<u32>,
}

impl Track {
    pub fn primary_artist(&self) -> &str {
        self.artists.first().map(|a| a.name.as_str()).unwrap_or("")
    }

    pub fn artist_names(&self) -> impl Iterator<Item = &str> {
        self.artists.iter().map(|a| a.name.as_str())
    }

    /// `Artist - Title`, used in logs and failure diagnostics.
    pub fn display_name(&self) -> String {
        format!("{} - {}", self.primary_artist(), self.title)
    }
}

/// Unit a catalog reports track durations in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DurationUnit {
    Milliseconds,
    Seconds,
}

impl DurationUnit {
    pub fn to_millis(self, value: u64) -> u64 {
        match self {
            DurationUnit::Milliseconds => value,
            DurationUnit::Seconds => value.saturating_mul(1000),
        }
    }
}

/// A playlist as listed in a catalog roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Playlist {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub track_count: u32,
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration_unit_conversion() {
        assert_eq!(DurationUnit::Milliseconds.to_millis(233713), 233713);
        assert_eq!(DurationUnit::Seconds.to_millis(234), 234000);
    }

    #[test]
    fn test_display_name_uses_primary_artist() {
        let t = fixtures::track("t1", "Song", &["Main", "Guest"], "Album", 1000);
        assert_eq!(t.display_name(), "Main - Song");
        assert_eq!(t.artist_names().collect::<Vec<_>>(), vec!["Main", "Guest"]);
    }
}
