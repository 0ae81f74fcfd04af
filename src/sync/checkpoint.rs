use std::path::PathBuf;

use color_eyre::eyre::{Result, WrapErr};
use serde::{Deserialize, Serialize};

use super::SyncResult;

/// Progress of a run, saved after every finished playlist.
///
/// Only finished playlists are kept; one cut short is redone from scratch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncState {
    pub completed: Vec<CompletedPlaylist>,
    pub updated_at: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletedPlaylist {
    /// Source playlist id.
    pub playlist_id: String,
    pub result: SyncResult,
}

impl SyncState {
    pub fn is_completed(&self, playlist_id: &str) -> bool {
        self.completed.iter().any(|c| c.playlist_id == playlist_id)
    }
}

/// Crash-recovery side channel, only touched at playlist boundaries.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait Checkpoint: Send + Sync {
    async fn save(&self, state: &SyncState) -> Result<()>;
    async fn load(&self) -> Result<Option<SyncState>>;
    /// Forget saved progress once a run finishes.
    async fn clear(&self) -> Result<()>;
}

/// Stores the checkpoint as a JSON file, written atomically via a temp file.
pub struct JsonFileCheckpoint {
    path: PathBuf,
}

impl JsonFileCheckpoint {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

#[async_trait::async_trait]
impl Checkpoint for JsonFileCheckpoint {
    async fn save(&self, state: &SyncState) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .wrap_err_with(|| format!("Failed to create {}", parent.display()))?;
        }

        let json = serde_json::to_vec_pretty(state).wrap_err("Failed to serialize checkpoint")?;
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, json)
            .await
            .wrap_err_with(|| format!("Failed to write checkpoint {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .wrap_err_with(|| format!("Failed to move checkpoint to {}", self.path.display()))?;

        log::debug!(
            "Saved checkpoint with {} completed playlist(s) to {}",
            state.completed.len(),
            self.path.display()
        );
        Ok(())
    }

    async fn load(&self) -> Result<Option<SyncState>> {
        if !tokio::fs::try_exists(&self.path).await.unwrap_or(false) {
            return Ok(None);
        }

        let contents = tokio::fs::read(&self.path)
            .await
            .wrap_err_with(|| format!("Failed to read checkpoint {}", self.path.display()))?;
        let state = serde_json::from_slice(&contents)
            .wrap_err_with(|| format!("Failed to parse checkpoint {}", self.path.display()))?;
        Ok(Some(state))
    }

    async fn clear(&self) -> Result<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e)
                .wrap_err_with(|| format!("Failed to remove checkpoint {}", self.path.display())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::SyncAction;

    #[tokio::test]
    async fn test_save_load_clear() {
        let dir = tempfile::tempdir().unwrap();
        let checkpoint = JsonFileCheckpoint::new(dir.path().join("nested").join("state.json"));

        assert!(checkpoint.load().await.unwrap().is_none());

        let state = SyncState {
            completed: vec![CompletedPlaylist {
                playlist_id: "pl1".into(),
                result: SyncResult::new("Road Trip", SyncAction::Created),
            }],
            updated_at: 42,
        };
        checkpoint.save(&state).await.unwrap();
        let loaded = checkpoint.load().await.unwrap().unwrap();
        assert!(loaded.is_completed("pl1"));
        assert!(!loaded.is_completed("pl2"));
        assert_eq!(loaded, state);

        checkpoint.clear().await.unwrap();
        assert!(checkpoint.load().await.unwrap().is_none());
        checkpoint.clear().await.unwrap();
    }
}
