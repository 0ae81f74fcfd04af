use std::time::Duration;

use tokio::sync::watch;

use super::context::SyncContext;
use super::{SyncAction, SyncResult, SyncSummary};
use crate::batch::{BatchScheduler, partition};
use crate::error::{RetryError, SyncError};
use crate::model::{Playlist, Track};
use crate::planner::{self, PlanAction, PlaylistComparison};
use crate::ports::{SourceCatalog, TargetCatalog};
use crate::resolver::{MatchResult, TrackResolver};
use crate::retry::RetryExecutor;

pub const DEFAULT_DESCRIPTION: &str = "Transferred from Spotify";

#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Tracks resolved concurrently; capped at the write batch size.
    pub resolution_group_size: usize,
    pub inter_group_delay: Duration,
    pub verify_availability: bool,
    pub dry_run: bool,
    /// How long in-flight catalog calls may run after a shutdown request.
    pub shutdown_grace: Duration,
    /// Source playlist names to sync; empty means all.
    pub playlist_filter: Vec<String>,
    pub default_description: String,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            resolution_group_size: 10,
            inter_group_delay: Duration::from_millis(500),
            verify_availability: false,
            dry_run: false,
            shutdown_grace: Duration::from_secs(10),
            playlist_filter: Vec::new(),
            default_description: DEFAULT_DESCRIPTION.to_string(),
        }
    }
}

enum PlaylistOutcome {
    Finished(SyncResult),
    Interrupted(SyncResult),
    AuthFailed(SyncResult, RetryError),
}

/// Copies source playlists into the target catalog, one playlist at a time.
pub struct SyncExecutor<'a, S: SourceCatalog + ?Sized, T: TargetCatalog + ?Sized> {
    source: &'a S,
    target: &'a T,
    retry: RetryExecutor,
    scheduler: BatchScheduler,
    options: SyncOptions,
}

impl<'a, S: SourceCatalog + ?Sized, T: TargetCatalog + ?Sized> SyncExecutor<'a, S, T> {
    pub fn new(
        source: &'a S,
        target: &'a T,
        retry: RetryExecutor,
        scheduler: BatchScheduler,
        options: SyncOptions,
    ) -> Self {
        Self {
            source,
            target,
            retry,
            scheduler,
            options,
        }
    }

    /// Fetch both rosters and plan the sync without touching anything.
    pub async fn plan(&self) -> Result<Vec<PlaylistComparison>, SyncError> {
        let (sources, targets) = self.fetch_rosters().await?;
        Ok(planner::plan(&self.select(&sources), &targets))
    }

    /// Fetch both rosters, then plan and execute the sync.
    pub async fn run(&self, ctx: SyncContext<'_>) -> Result<SyncSummary, SyncError> {
        let (sources, targets) = self.fetch_rosters().await?;
        self.plan_and_execute_sync(&sources, &targets, ctx).await
    }

    async fn fetch_rosters(&self) -> Result<(Vec<Playlist>, Vec<Playlist>), SyncError> {
        let sources = self
            .retry
            .run("fetch source playlists", || self.source.list_playlists())
            .await
            .map_err(roster_error)?;
        let targets = self
            .retry
            .run("fetch target playlists", || self.target.list_playlists())
            .await
            .map_err(roster_error)?;
        log::info!(
            "Found {} source playlist(s) and {} target playlist(s)",
            sources.len(),
            targets.len()
        );
        Ok((sources, targets))
    }

    fn select(&self, sources: &[Playlist]) -> Vec<Playlist> {
        if self.options.playlist_filter.is_empty() {
            return sources.to_vec();
        }
        sources
            .iter()
            .filter(|p| {
                self.options
                    .playlist_filter
                    .iter()
                    .any(|name| name.trim().eq_ignore_ascii_case(p.name.trim()))
            })
            .cloned()
            .collect()
    }

    /// Plan every source playlist against the target roster and carry the plan out.
    ///
    /// Per-playlist failures are recorded in the summary. Only an authentication
    /// failure aborts the run.
    pub async fn plan_and_execute_sync(
        &self,
        sources: &[Playlist],
        targets: &[Playlist],
        mut ctx: SyncContext<'_>,
    ) -> Result<SyncSummary, SyncError> {
        let plans = planner::plan(&self.select(sources), targets);
        log::info!("Planned {} playlist(s)", plans.len());

        for comparison in &plans {
            let name = comparison.source.name.as_str();

            if ctx.shutdown_requested() {
                log::warn!("Shutdown requested, stopping before '{}'", name);
                ctx.mark_interrupted();
                break;
            }

            if ctx.is_completed(&comparison.source.id) {
                log::info!("Skipping '{}', already synced in a previous run", name);
                continue;
            }

            if self.options.dry_run {
                log::info!(
                    "[dry run] {:?} '{}': {}",
                    comparison.action,
                    name,
                    comparison.reason
                );
                let reason = format!("dry run: {}", comparison.reason);
                ctx.record_partial(SyncResult::skipped(name, &reason));
                continue;
            }

            if comparison.action == PlanAction::Skip {
                log::info!("Skipping '{}': {}", name, comparison.reason);
                ctx.record_completed(
                    &comparison.source.id,
                    SyncResult::skipped(name, &comparison.reason),
                )
                .await;
                continue;
            }

            match self.sync_playlist(comparison, &ctx).await {
                PlaylistOutcome::Finished(result) => {
                    log::info!(
                        "Finished '{}': {:?}, {}/{} track(s) transferred",
                        name,
                        result.action,
                        result.successful_tracks,
                        result.total_tracks
                    );
                    ctx.record_completed(&comparison.source.id, result).await;
                }
                PlaylistOutcome::Interrupted(result) => {
                    log::warn!("Interrupted while syncing '{}'", name);
                    ctx.record_partial(result);
                    ctx.mark_interrupted();
                    break;
                }
                PlaylistOutcome::AuthFailed(result, error) => {
                    log::error!("Authentication failed while syncing '{}': {}", name, error);
                    ctx.record_partial(result);
                    return Err(SyncError::Auth(error));
                }
            }
        }

        if !ctx.summary().interrupted && !self.options.dry_run {
            ctx.finish().await;
        }
        Ok(ctx.into_summary())
    }

    async fn sync_playlist(
        &self,
        comparison: &PlaylistComparison,
        ctx: &SyncContext<'_>,
    ) -> PlaylistOutcome {
        let action = match comparison.target {
            Some(_) => SyncAction::Updated,
            None => SyncAction::Created,
        };
        let mut result = SyncResult::new(&comparison.source.name, action);
        log::info!(
            "Syncing '{}' ({:?}): {}",
            comparison.source.name,
            comparison.action,
            comparison.reason
        );

        match self.transfer(comparison, &mut result, ctx).await {
            Ok(true) => PlaylistOutcome::Finished(result),
            Ok(false) => {
                result.fail("interrupted by shutdown".to_string());
                PlaylistOutcome::Interrupted(result)
            }
            Err(error) if error.is_auth() => {
                result.fail(error.to_string());
                PlaylistOutcome::AuthFailed(result, error)
            }
            Err(error) => {
                log::error!("Failed to sync '{}': {}", comparison.source.name, error);
                result.fail(error.to_string());
                PlaylistOutcome::Finished(result)
            }
        }
    }

    /// Returns `Ok(false)` when a shutdown request cut the transfer short.
    async fn transfer(
        &self,
        comparison: &PlaylistComparison,
        result: &mut SyncResult,
        ctx: &SyncContext<'_>,
    ) -> Result<bool, RetryError> {
        let source = &comparison.source;
        let tracks = self
            .retry
            .run(&format!("fetch tracks of '{}'", source.name), || {
                self.source.list_tracks(&source.id)
            })
            .await?;
        result.total_tracks = tracks.len();

        let playlist_id = match &comparison.target {
            Some(target) => {
                self.clear_playlist(&target.id, result).await?;
                target.id.clone()
            }
            None => {
                let description = source
                    .description
                    .as_deref()
                    .filter(|d| !d.trim().is_empty())
                    .unwrap_or(&self.options.default_description);
                let id = self
                    .retry
                    .run(&format!("create playlist '{}'", source.name), || {
                        self.target.create_playlist(&source.name, description)
                    })
                    .await?;
                log::info!("Created playlist '{}' ({})", source.name, id);
                id
            }
        };
        result.target_playlist_id = Some(playlist_id.clone());

        let Some(matched) = self.resolve_tracks(&tracks, result, ctx).await? else {
            return Ok(false);
        };
        let matched = if self.options.verify_availability {
            self.keep_available(matched, result).await?
        } else {
            matched
        };

        let ids: Vec<String> = matched.into_iter().map(|(_, id)| id).collect();
        let target = self.target;
        let playlist_id = playlist_id.as_str();
        self.scheduler
            .write_batched(
                &format!("add tracks to '{}'", source.name),
                &ids,
                |chunk| async move { target.add_tracks(playlist_id, &chunk).await },
            )
            .await?;
        result.successful_tracks = ids.len();

        Ok(true)
    }

    /// Empty an existing playlist before repopulating it.
    ///
    /// Failures other than authentication are downgraded to warnings.
    async fn clear_playlist(
        &self,
        playlist_id: &str,
        result: &mut SyncResult,
    ) -> Result<(), RetryError> {
        let existing = match self
            .retry
            .run("list existing playlist tracks", || {
                self.target.list_playlist_track_ids(playlist_id)
            })
            .await
        {
            Ok(ids) => ids,
            Err(e) if e.is_auth() => return Err(e),
            Err(e) => {
                log::warn!("Could not list tracks of {}, appending instead: {}", playlist_id, e);
                result.errors.push(format!("warning: {}", e));
                return Ok(());
            }
        };

        let target = self.target;
        match self
            .scheduler
            .write_batched("remove existing tracks", &existing, |chunk| async move {
                target.remove_tracks(playlist_id, &chunk).await
            })
            .await
        {
            Ok(_) => {
                log::debug!("Removed {} track(s) from {}", existing.len(), playlist_id);
                Ok(())
            }
            Err(e) if e.is_auth() => Err(e),
            Err(e) => {
                log::warn!("Could not fully clear {}, continuing: {}", playlist_id, e);
                result.errors.push(format!("warning: {}", e));
                Ok(())
            }
        }
    }

    /// Resolve every track in bounded groups, in source order.
    ///
    /// Returns `None` when a shutdown request arrives between or during groups.
    async fn resolve_tracks<'t>(
        &self,
        tracks: &'t [Track],
        result: &mut SyncResult,
        ctx: &SyncContext<'_>,
    ) -> Result<Option<Vec<(&'t Track, String)>>, RetryError> {
        let resolver = TrackResolver::new(self.target, &self.retry);
        let group_size = self
            .options
            .resolution_group_size
            .clamp(1, self.scheduler.batch_size());
        let groups = partition(tracks, group_size);
        let total_groups = groups.len();
        let mut shutdown = ctx.shutdown_receiver();
        let mut matched = Vec::new();

        for (index, group) in groups.into_iter().enumerate() {
            if ctx.shutdown_requested() {
                return Ok(None);
            }
            log::debug!(
                "Resolving group {}/{} ({} track(s))",
                index + 1,
                total_groups,
                group.len()
            );

            let resolving = resolver.resolve_group(group, group_size);
            tokio::pin!(resolving);
            let outcomes = tokio::select! {
                outcomes = &mut resolving => outcomes,
                _ = shutdown_signalled(&mut shutdown) => {
                    match tokio::time::timeout(self.options.shutdown_grace, &mut resolving).await {
                        Ok(outcomes) => record_outcomes(group, outcomes, &mut matched, result)?,
                        Err(_) => log::warn!(
                            "Abandoned {} in-flight resolution(s) after {:?}",
                            group.len(),
                            self.options.shutdown_grace
                        ),
                    }
                    return Ok(None);
                }
            };
            record_outcomes(group, outcomes, &mut matched, result)?;

            if index + 1 < total_groups && !self.options.inter_group_delay.is_zero() {
                self.retry
                    .sleeper()
                    .sleep(self.options.inter_group_delay)
                    .await;
            }
        }

        Ok(Some(matched))
    }

    async fn keep_available<'t>(
        &self,
        matched: Vec<(&'t Track, String)>,
        result: &mut SyncResult,
    ) -> Result<Vec<(&'t Track, String)>, RetryError> {
        let mut available = Vec::with_capacity(matched.len());
        for (track, id) in matched {
            let check = self
                .retry
                .run(&format!("verify availability of {}", id), || {
                    self.target.verify_track_availability(&id)
                })
                .await;
            match check {
                Ok(true) => available.push((track, id)),
                Ok(false) => {
                    result.failed_tracks += 1;
                    result
                        .errors
                        .push(format!("Unavailable: {} ({})", track.display_name(), id));
                }
                Err(e) if e.is_auth() => return Err(e),
                Err(e) => {
                    log::warn!("Could not verify {}, keeping it: {}", id, e);
                    available.push((track, id));
                }
            }
        }
        Ok(available)
    }
}

fn roster_error(error: RetryError) -> SyncError {
    if error.is_auth() {
        SyncError::Auth(error)
    } else {
        SyncError::Roster(error)
    }
}

/// Completes once shutdown is requested; never completes if the sender is gone.
async fn shutdown_signalled(shutdown: &mut watch::Receiver<bool>) {
    if shutdown.wait_for(|stop| *stop).await.is_err() {
        std::future::pending::<()>().await;
    }
}

fn record_outcomes<'t>(
    group: &'t [Track],
    outcomes: Vec<Result<MatchResult, RetryError>>,
    matched: &mut Vec<(&'t Track, String)>,
    result: &mut SyncResult,
) -> Result<(), RetryError> {
    for (track, outcome) in group.iter().zip(outcomes) {
        match outcome {
            Ok(MatchResult {
                resolved_track: Some(resolved),
                ..
            }) => matched.push((track, resolved.id)),
            Ok(not_found) => {
                result.failed_tracks += 1;
                result.errors.push(format!(
                    "Not found: {} (tried: {})",
                    track.display_name(),
                    not_found.attempted_queries.join("; ")
                ));
            }
            Err(e) if e.is_auth() => return Err(e),
            Err(e) => {
                result.failed_tracks += 1;
                result
                    .errors
                    .push(format!("Failed: {} ({})", track.display_name(), e));
            }
        }
    }
    Ok(())
}
