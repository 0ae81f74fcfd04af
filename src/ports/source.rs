use crate::error::CatalogError;
use crate::model::{Playlist, Track};

/// Port trait for the read-only catalog playlists are copied from.
///
/// Implementations live in `catalog::spotify` (production) or test mocks.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait SourceCatalog: Send + Sync {
    /// The user's full playlist roster, all pages fetched.
    async fn list_playlists(&self) -> Result<Vec<Playlist>, CatalogError>;

    /// Every track of a playlist in playlist order, all pages fetched.
    async fn list_tracks(&self, playlist_id: &str) -> Result<Vec<Track>, CatalogError>;
}
