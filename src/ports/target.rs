use crate::error::CatalogError;
use crate::model::{Playlist, Track};

/// Port trait for the read/write catalog playlists are copied into.
///
/// Implementations live in `catalog::tidal` (production) or test mocks.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait TargetCatalog: Send + Sync {
    async fn list_playlists(&self) -> Result<Vec<Playlist>, CatalogError>;

    /// Candidate tracks for an artist/title search, best catalog ranking first.
    async fn search_tracks(&self, artist: &str, title: &str) -> Result<Vec<Track>, CatalogError>;

    /// Create an empty playlist and return its id.
    async fn create_playlist(&self, name: &str, description: &str)
    -> Result<String, CatalogError>;

    async fn list_playlist_track_ids(&self, playlist_id: &str) -> Result<Vec<String>, CatalogError>;

    /// Remove tracks; callers never pass more than the catalog's per-request limit.
    async fn remove_tracks(&self, playlist_id: &str, track_ids: &[String])
    -> Result<(), CatalogError>;

    /// Append tracks in order; callers never pass more than the catalog's per-request limit.
    async fn add_tracks(&self, playlist_id: &str, track_ids: &[String]) -> Result<(), CatalogError>;

    async fn verify_track_availability(&self, track_id: &str) -> Result<bool, CatalogError>;
}
