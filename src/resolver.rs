use std::collections::HashMap;

use futures::StreamExt;
use serde::Serialize;

use crate::error::RetryError;
use crate::model::Track;
use crate::ports::TargetCatalog;
use crate::query::{self, SearchQuery};
use crate::retry::RetryExecutor;
use crate::similarity::{self, HIGH_CONFIDENCE, MATCH_THRESHOLD};

/// Outcome of resolving one source track.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchResult {
    pub resolved_track: Option<Track>,
    /// In [0, 1]; 0 when nothing was resolved.
    pub confidence: f64,
    /// One entry per strategy tried, in order. Never empty for a failed resolution.
    pub attempted_queries: Vec<String>,
}

impl MatchResult {
    fn not_found(attempted_queries: Vec<String>) -> Self {
        Self {
            resolved_track: None,
            confidence: 0.0,
            attempted_queries,
        }
    }

    pub fn is_match(&self) -> bool {
        self.resolved_track.is_some()
    }
}

/// Resolves source tracks to target-catalog tracks, one search strategy at a time.
pub struct TrackResolver<'a, C: TargetCatalog + ?Sized> {
    catalog: &'a C,
    retry: &'a RetryExecutor,
}

impl<'a, C: TargetCatalog + ?Sized> TrackResolver<'a, C> {
    pub fn new(catalog: &'a C, retry: &'a RetryExecutor) -> Self {
        Self { catalog, retry }
    }

    async fn search(&self, query: &SearchQuery) -> Result<Vec<Track>, RetryError> {
        let operation = format!("search {}", query.description);
        self.retry
            .run(&operation, || {
                self.catalog.search_tracks(&query.artist, &query.title)
            })
            .await
    }

    /// Resolve one track.
    ///
    /// Search failures other than authentication are recorded in the attempt log
    /// and the next strategy is tried. An authentication failure is returned as
    /// the only error, since no later search could succeed.
    pub async fn resolve(&self, source: &Track) -> Result<MatchResult, RetryError> {
        let mut attempted_queries = Vec::new();
        let mut best: Option<(Track, f64)> = None;
        // Strategies that differ only in album issue the same search call
        let mut searched: HashMap<(String, String), Vec<Track>> = HashMap::new();

        'strategies: for query in query::generate(source) {
            let key = (query.artist.clone(), query.title.clone());
            let candidates = match searched.get(&key).cloned() {
                Some(candidates) => candidates,
                None => match self.search(&query).await {
                    Ok(candidates) => {
                        searched.insert(key, candidates.clone());
                        candidates
                    }
                    Err(e) if e.is_auth() => return Err(e),
                    Err(e) => {
                        log::warn!(
                            "Search failed for '{}', trying next strategy: {}",
                            source.display_name(),
                            e
                        );
                        attempted_queries.push(format!("{} (failed: {})", query.description, e));
                        continue;
                    }
                },
            };
            attempted_queries.push(query.description.clone());

            for candidate in candidates {
                let score = similarity::score(source, &candidate);
                log::debug!(
                    "Candidate '{}' scored {:.3} for '{}'",
                    candidate.display_name(),
                    score,
                    source.display_name()
                );
                if best.as_ref().is_none_or(|(_, best_score)| score > *best_score) {
                    best = Some((candidate, score));
                }
                if score >= HIGH_CONFIDENCE {
                    break 'strategies;
                }
            }
        }

        match best {
            Some((track, confidence)) if confidence >= MATCH_THRESHOLD => {
                log::debug!(
                    "Resolved '{}' to '{}' ({}) with confidence {:.3}",
                    source.display_name(),
                    track.display_name(),
                    track.id,
                    confidence
                );
                Ok(MatchResult {
                    resolved_track: Some(track),
                    confidence: confidence.clamp(0.0, 1.0),
                    attempted_queries,
                })
            }
            _ => {
                log::info!(
                    "No match for '{}' after {} strateg(ies): {}",
                    source.display_name(),
                    attempted_queries.len(),
                    attempted_queries.join("; ")
                );
                Ok(MatchResult::not_found(attempted_queries))
            }
        }
    }

    /// Resolve a group of tracks with at most `concurrency` resolutions in flight.
    ///
    /// Results are returned in input order.
    pub async fn resolve_group(
        &self,
        tracks: &[Track],
        concurrency: usize,
    ) -> Vec<Result<MatchResult, RetryError>> {
        futures::stream::iter(tracks)
            .map(|track| self.resolve(track))
            .buffered(concurrency.max(1))
            .collect()
            .await
    }
}

/// Resolve a single track against a target catalog.
pub async fn resolve<C: TargetCatalog + ?Sized>(
    source: &Track,
    catalog: &C,
    retry: &RetryExecutor,
) -> Result<MatchResult, RetryError> {
    TrackResolver::new(catalog, retry).resolve(source).await
}
