pub mod checkpoint;
pub mod context;
pub mod executor;

use serde::{Deserialize, Serialize};

pub use checkpoint::{Checkpoint, CompletedPlaylist, JsonFileCheckpoint, SyncState};
pub use context::SyncContext;
pub use executor::{SyncExecutor, SyncOptions};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncAction {
    Created,
    Updated,
    Skipped,
}

/// Per-playlist outcome, filled in as the playlist is processed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncResult {
    pub playlist_name: String,
    pub action: SyncAction,
    pub total_tracks: usize,
    pub successful_tracks: usize,
    pub failed_tracks: usize,
    pub target_playlist_id: Option<String>,
    pub errors: Vec<String>,
}

impl SyncResult {
    pub fn new(playlist_name: &str, action: SyncAction) -> Self {
        Self {
            playlist_name: playlist_name.to_string(),
            action,
            total_tracks: 0,
            successful_tracks: 0,
            failed_tracks: 0,
            target_playlist_id: None,
            errors: Vec::new(),
        }
    }

    pub fn skipped(playlist_name: &str, reason: &str) -> Self {
        let mut result = Self::new(playlist_name, SyncAction::Skipped);
        result.errors.push(reason.to_string());
        result
    }

    /// Downgrade to skipped after a failure, keeping what was recorded so far.
    pub fn fail(&mut self, message: String) {
        self.action = SyncAction::Skipped;
        self.errors.push(message);
    }
}

/// Aggregate outcome of a run; the only thing a caller sees.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncSummary {
    pub total_playlists: usize,
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
    pub total_tracks: usize,
    pub successful_tracks: usize,
    pub failed_tracks: usize,
    /// True when a shutdown request cut the run short.
    pub interrupted: bool,
    pub results: Vec<SyncResult>,
}

impl SyncSummary {
    pub fn push(&mut self, result: SyncResult) {
        self.total_playlists += 1;
        match result.action {
            SyncAction::Created => self.created += 1,
            SyncAction::Updated => self.updated += 1,
            SyncAction::Skipped => self.skipped += 1,
        }
        self.total_tracks += result.total_tracks;
        self.successful_tracks += result.successful_tracks;
        self.failed_tracks += result.failed_tracks;
        self.results.push(result);
    }
}

impl std::fmt::Display for SyncSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "{} playlist(s): {} created, {} updated, {} skipped",
            self.total_playlists, self.created, self.updated, self.skipped
        )?;
        writeln!(
            f,
            "{} track(s): {} transferred, {} failed",
            self.total_tracks, self.successful_tracks, self.failed_tracks
        )?;
        if self.interrupted {
            writeln!(f, "Run was interrupted before all playlists were processed")?;
        }
        for result in &self.results {
            writeln!(
                f,
                "  [{:?}] {} ({}/{} tracks)",
                result.action, result.playlist_name, result.successful_tracks, result.total_tracks
            )?;
            for error in &result.errors {
                writeln!(f, "      {}", error)?;
            }
        }
        Ok(())
    }
}
