use tokio::sync::watch;

use super::checkpoint::{Checkpoint, CompletedPlaylist, SyncState};
use super::{SyncResult, SyncSummary};

/// State carried through one sync run.
///
/// The summary is append-only. Checkpoints are written from here and only when a
/// playlist finishes; partial results never reach the checkpoint.
pub struct SyncContext<'a> {
    summary: SyncSummary,
    completed: Vec<CompletedPlaylist>,
    checkpoint: Option<&'a dyn Checkpoint>,
    shutdown: watch::Receiver<bool>,
}

impl<'a> SyncContext<'a> {
    pub fn new(shutdown: watch::Receiver<bool>) -> Self {
        Self {
            summary: SyncSummary::default(),
            completed: Vec::new(),
            checkpoint: None,
            shutdown,
        }
    }

    /// A context that never sees a shutdown request.
    pub fn detached() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self::new(rx)
    }

    /// Attach a checkpoint and restore any progress it holds.
    pub async fn with_checkpoint(mut self, checkpoint: &'a dyn Checkpoint) -> Self {
        match checkpoint.load().await {
            Ok(Some(state)) => {
                log::info!(
                    "Resuming from checkpoint: {} playlist(s) already done",
                    state.completed.len()
                );
                for done in &state.completed {
                    self.summary.push(done.result.clone());
                }
                self.completed = state.completed;
            }
            Ok(None) => {}
            Err(e) => log::warn!("Ignoring unreadable checkpoint: {:#}", e),
        }
        self.checkpoint = Some(checkpoint);
        self
    }

    pub fn is_completed(&self, playlist_id: &str) -> bool {
        self.completed.iter().any(|c| c.playlist_id == playlist_id)
    }

    pub fn shutdown_requested(&self) -> bool {
        *self.shutdown.borrow()
    }

    pub fn shutdown_receiver(&self) -> watch::Receiver<bool> {
        self.shutdown.clone()
    }

    pub fn summary(&self) -> &SyncSummary {
        &self.summary
    }

    pub fn into_summary(self) -> SyncSummary {
        self.summary
    }

    pub fn mark_interrupted(&mut self) {
        self.summary.interrupted = true;
    }

    /// Append a finished playlist and checkpoint the run.
    pub async fn record_completed(&mut self, playlist_id: &str, result: SyncResult) {
        self.completed.push(CompletedPlaylist {
            playlist_id: playlist_id.to_string(),
            result: result.clone(),
        });
        self.summary.push(result);
        self.save().await;
    }

    /// Append a playlist that was cut short; it stays eligible for the next run.
    pub fn record_partial(&mut self, result: SyncResult) {
        self.summary.push(result);
    }

    /// Remove saved progress after a run that processed everything.
    pub async fn finish(&self) {
        if let Some(checkpoint) = self.checkpoint {
            if let Err(e) = checkpoint.clear().await {
                log::warn!("Failed to clear checkpoint: {:#}", e);
            }
        }
    }

    async fn save(&self) {
        let Some(checkpoint) = self.checkpoint else {
            return;
        };

        let state = SyncState {
            completed: self.completed.clone(),
            updated_at: chrono::Utc::now().timestamp(),
        };
        if let Err(e) = checkpoint.save(&state).await {
            log::warn!("Failed to save checkpoint: {:#}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::SyncAction;
    use crate::sync::checkpoint::MockCheckpoint;

    #[tokio::test]
    async fn test_restores_progress_from_checkpoint() {
        let mut checkpoint = MockCheckpoint::new();
        checkpoint.expect_load().returning(|| {
            Ok(Some(SyncState {
                completed: vec![CompletedPlaylist {
                    playlist_id: "pl1".into(),
                    result: SyncResult::new("Done", SyncAction::Created),
                }],
                updated_at: 0,
            }))
        });
        checkpoint.expect_save().times(1).returning(|_| Ok(()));

        let mut ctx = SyncContext::detached().with_checkpoint(&checkpoint).await;
        assert!(ctx.is_completed("pl1"));
        assert!(!ctx.is_completed("pl2"));
        assert_eq!(ctx.summary().created, 1);

        ctx.record_completed("pl2", SyncResult::skipped("Empty", "playlist is empty"))
            .await;
        assert!(ctx.is_completed("pl2"));
        assert_eq!(ctx.summary().total_playlists, 2);
    }

    #[tokio::test]
    async fn test_checkpoint_failures_are_not_fatal() {
        let mut checkpoint = MockCheckpoint::new();
        checkpoint
            .expect_load()
            .returning(|| Err(color_eyre::eyre::eyre!("corrupt")));
        checkpoint
            .expect_save()
            .returning(|_| Err(color_eyre::eyre::eyre!("disk full")));

        let mut ctx = SyncContext::detached().with_checkpoint(&checkpoint).await;
        ctx.record_completed("a", SyncResult::new("A", SyncAction::Skipped))
            .await;
        assert_eq!(ctx.summary().total_playlists, 1);
    }

    #[tokio::test]
    async fn test_partial_results_are_not_checkpointed() {
        let mut checkpoint = MockCheckpoint::new();
        checkpoint.expect_load().returning(|| Ok(None));
        checkpoint
            .expect_save()
            .withf(|state| {
                state.completed.len() == 1 && state.completed[0].playlist_id == "done"
            })
            .times(1)
            .returning(|_| Ok(()));

        let mut ctx = SyncContext::detached().with_checkpoint(&checkpoint).await;
        ctx.record_partial(SyncResult::new("Cut Short", SyncAction::Skipped));
        ctx.record_completed("done", SyncResult::new("Done", SyncAction::Created))
            .await;

        assert_eq!(ctx.summary().total_playlists, 2);
        assert!(!ctx.is_completed("cut"));
    }

    #[test]
    fn test_shutdown_flag_is_observed() {
        let (tx, rx) = watch::channel(false);
        let ctx = SyncContext::new(rx);
        assert!(!ctx.shutdown_requested());
        tx.send(true).unwrap();
        assert!(ctx.shutdown_requested());
    }
}
