use std::time::Duration;

use serde::Deserialize;

use super::http::{read_json, send};
use crate::error::CatalogError;
use crate::model::{AlbumRef, ArtistCredit, DurationUnit, Playlist, Track};
use crate::ports::SourceCatalog;

pub const DEFAULT_BASE_URL: &str = "https://api.spotify.com/v1";

/// Spotify reports `duration_ms`.
pub const DURATION_UNIT: DurationUnit = DurationUnit::Milliseconds;

#[derive(Debug, Deserialize)]
struct SpotifyPlaylist {
    id: String,
    name: String,
    #[serde(default)]
    description: Option<String>,
    tracks: SpotifyPlaylistTracks,
}

#[derive(Debug, Deserialize)]
struct SpotifyPlaylistTracks {
    total: u32,
}

#[derive(Debug, Deserialize)]
struct SpotifyTrack {
    /// Null for local files.
    id: Option<String>,
    name: String,
    artists: Vec<SpotifyArtist>,
    album: SpotifyAlbum,
    #[serde(default)]
    duration_ms: Option<u64>,
    #[serde(default)]
    explicit: Option<bool>,
    #[serde(default)]
    popularity: Option<u32>,
    #[serde(default)]
    external_ids: Option<SpotifyExternalIds>,
}

#[derive(Debug, Deserialize)]
struct SpotifyArtist {
    #[serde(default)]
    id: Option<String>,
    name: String,
}

#[derive(Debug, Deserialize)]
struct SpotifyAlbum {
    #[serde(default)]
    id: Option<String>,
    name: String,
}

#[derive(Debug, Deserialize)]
struct SpotifyExternalIds {
    isrc: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Page<T> {
    items: Vec<T>,
    next: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PlaylistTrackObject {
    track: Option<SpotifyTrack>,
}

impl From<SpotifyPlaylist> for Playlist {
    fn from(playlist: SpotifyPlaylist) -> Self {
        Playlist {
            id: playlist.id,
            name: playlist.name,
            description: playlist.description.filter(|d| !d.trim().is_empty()),
            track_count: playlist.tracks.total,
        }
    }
}

impl SpotifyTrack {
    /// `None` for local files and tracks without credited artists.
    fn into_track(self) -> Option<Track> {
        let id = self.id?;
        if self.artists.is_empty() {
            return None;
        }
        Some(Track {
            id,
            title: self.name,
            artists: self
                .artists
                .into_iter()
                .map(|a| ArtistCredit {
                    id: a.id.unwrap_or_default(),
                    name: a.name,
                })
                .collect(),
            album: AlbumRef {
                id: self.album.id.unwrap_or_default(),
                name: self.album.name,
            },
            duration_ms: DURATION_UNIT.to_millis(self.duration_ms.unwrap_or(0)),
            isrc: self.external_ids.and_then(|ids| ids.isrc),
            explicit: self.explicit,
            popularity: self.popularity,
        })
    }
}

/// Read-only Spotify Web API client.
pub struct SpotifyCatalog {
    access_token: String,
    base_url: String,
    client: reqwest::Client,
}

impl SpotifyCatalog {
    pub fn new(access_token: String) -> Self {
        Self::with_base_url(access_token, DEFAULT_BASE_URL.to_string())
    }

    pub fn with_base_url(access_token: String, base_url: String) -> Self {
        Self {
            access_token,
            base_url: base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    async fn get_page<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
    ) -> Result<Page<T>, CatalogError> {
        let response = send(
            self.client
                .get(url)
                .bearer_auth(&self.access_token)
                .timeout(Duration::from_secs(10)),
        )
        .await?;
        read_json(response).await
    }
}

#[async_trait::async_trait]
impl SourceCatalog for SpotifyCatalog {
    async fn list_playlists(&self) -> Result<Vec<Playlist>, CatalogError> {
        let mut all_playlists = Vec::new();
        let mut next_url = Some(format!("{}/me/playlists?limit=50", self.base_url));

        while let Some(url) = next_url {
            let page: Page<SpotifyPlaylist> = self.get_page(&url).await?;
            all_playlists.extend(page.items.into_iter().map(Playlist::from));
            next_url = page.next;
        }

        log::debug!("Fetched {} Spotify playlist(s)", all_playlists.len());
        Ok(all_playlists)
    }

    async fn list_tracks(&self, playlist_id: &str) -> Result<Vec<Track>, CatalogError> {
        let mut all_tracks = Vec::new();
        let mut skipped = 0;
        let mut next_url = Some(format!(
            "{}/playlists/{}/tracks?limit=100",
            self.base_url,
            urlencoding::encode(playlist_id)
        ));

        while let Some(url) = next_url {
            let page: Page<PlaylistTrackObject> = self.get_page(&url).await?;
            for item in page.items {
                match item.track.and_then(SpotifyTrack::into_track) {
                    Some(track) => all_tracks.push(track),
                    None => skipped += 1,
                }
            }
            next_url = page.next;
        }

        if skipped > 0 {
            log::debug!(
                "Dropped {} local or unavailable item(s) from Spotify playlist {}",
                skipped,
                playlist_id
            );
        }
        Ok(all_tracks)
    }
}
