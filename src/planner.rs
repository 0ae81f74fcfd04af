use serde::Serialize;

use crate::model::Playlist;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanAction {
    Create,
    Update,
    Skip,
}

/// Planned handling of one source playlist.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlaylistComparison {
    pub source: Playlist,
    pub target: Option<Playlist>,
    pub action: PlanAction,
    pub reason: String,
}

fn playlist_key(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Decide create/update/skip for every source playlist, in source order.
///
/// Playlists are paired by trimmed, case-insensitive name; the first target with
/// a matching name wins. Only track counts are compared: a target with as many
/// tracks as the source counts as up to date even if the tracks differ.
pub fn plan(sources: &[Playlist], targets: &[Playlist]) -> Vec<PlaylistComparison> {
    sources
        .iter()
        .map(|source| {
            let key = playlist_key(&source.name);
            let target = targets.iter().find(|t| playlist_key(&t.name) == key);

            let (action, reason) = match target {
                _ if source.track_count == 0 => (PlanAction::Skip, "playlist is empty".to_string()),
                None => (
                    PlanAction::Create,
                    "no playlist with this name in target catalog".to_string(),
                ),
                Some(target) if target.track_count < source.track_count => (
                    PlanAction::Update,
                    format!(
                        "target has {} of {} tracks",
                        target.track_count, source.track_count
                    ),
                ),
                Some(target) => (
                    PlanAction::Skip,
                    format!(
                        "appears up to date ({} tracks in target, {} in source)",
                        target.track_count, source.track_count
                    ),
                ),
            };

            PlaylistComparison {
                source: source.clone(),
                target: target.cloned(),
                action,
                reason,
            }
        })
        .collect()
}
