//! Fuzzy comparison of a source track against a target-catalog candidate.
//!
//! Every compared string is normalized first, compared with a Levenshtein ratio,
//! and the per-field similarities are folded into one weighted confidence value.

use serde::Serialize;

use crate::model::Track;

/// Minimum composite score accepted as a match.
pub const MATCH_THRESHOLD: f64 = 0.7;

/// Composite score at which the resolver stops trying further queries.
pub const HIGH_CONFIDENCE: f64 = 0.9;

const TITLE_WEIGHT: f64 = 0.40;
const ARTIST_WEIGHT: f64 = 0.40;
const ALBUM_WEIGHT: f64 = 0.15;
const DURATION_WEIGHT: f64 = 0.05;

/// Score given to a field whose value is unknown on one side.
const NEUTRAL: f64 = 0.5;

/// Per-field similarities behind a composite score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScoreBreakdown {
    pub title: f64,
    pub artist: f64,
    pub album: f64,
    pub duration: f64,
    pub composite: f64,
}

// =============================================================================
// Normalization
// =============================================================================

/// Normalize a string for comparison.
///
/// Lowercases, turns every non-alphanumeric character into a space, collapses
/// whitespace runs and trims. Idempotent.
pub fn normalize(s: &str) -> String {
    s.to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

// =============================================================================
// String Similarity
// =============================================================================

/// Levenshtein edit distance over chars.
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();

    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = if ca == cb { 0 } else { 1 };
            curr[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}

/// Similarity of two already-normalized strings in [0, 1].
pub fn string_similarity(a: &str, b: &str) -> f64 {
    if a == b {
        return 1.0;
    }
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    let longest = a.chars().count().max(b.chars().count());
    1.0 - levenshtein(a, b) as f64 / longest as f64
}

/// Best pairwise similarity across both artist lists.
///
/// Reordered credits and featured artists do not lower the score as long as
/// one credit lines up.
pub fn artist_similarity<'a>(
    source: impl Iterator<Item = &'a str>,
    candidate: impl Iterator<Item = &'a str>,
) -> f64 {
    let candidate: Vec<String> = candidate.map(normalize).collect();
    source
        .map(normalize)
        .flat_map(|s| {
            candidate
                .iter()
                .map(move |c| string_similarity(&s, c))
                .collect::<Vec<_>>()
        })
        .fold(0.0_f64, f64::max)
}

/// Album similarity; unknown on exactly one side scores neutral.
pub fn album_similarity(source: &str, candidate: &str) -> f64 {
    let source = normalize(source);
    let candidate = normalize(candidate);
    if source.is_empty() != candidate.is_empty() {
        return NEUTRAL;
    }
    string_similarity(&source, &candidate)
}

// =============================================================================
// Duration Matching
// =============================================================================

/// Step-function duration similarity. Both durations must be in milliseconds.
pub fn duration_similarity(source_ms: u64, candidate_ms: u64) -> f64 {
    if source_ms == 0 || candidate_ms == 0 {
        return NEUTRAL;
    }

    let diff = source_ms.abs_diff(candidate_ms) as f64;
    let avg = (source_ms as f64 + candidate_ms as f64) / 2.0;
    let percentage_difference = diff / avg;

    if percentage_difference <= 0.10 {
        1.0
    } else if percentage_difference <= 0.20 {
        0.8
    } else if percentage_difference <= 0.30 {
        0.6
    } else {
        0.3
    }
}

// =============================================================================
// Composite Score
// =============================================================================

fn same_isrc(source: &Track, candidate: &Track) -> bool {
    match (&source.isrc, &candidate.isrc) {
        (Some(a), Some(b)) => !a.trim().is_empty() && a.trim().eq_ignore_ascii_case(b.trim()),
        _ => false,
    }
}

/// Compare two tracks field by field.
pub fn score_breakdown(source: &Track, candidate: &Track) -> ScoreBreakdown {
    let title = string_similarity(&normalize(&source.title), &normalize(&candidate.title));
    let artist = artist_similarity(source.artist_names(), candidate.artist_names());
    let album = album_similarity(&source.album.name, &candidate.album.name);
    let duration = duration_similarity(source.duration_ms, candidate.duration_ms);

    let composite = if same_isrc(source, candidate) {
        1.0
    } else {
        title * TITLE_WEIGHT
            + artist * ARTIST_WEIGHT
            + album * ALBUM_WEIGHT
            + duration * DURATION_WEIGHT
    };

    ScoreBreakdown {
        title,
        artist,
        album,
        duration,
        composite: composite.clamp(0.0, 1.0),
    }
}

/// Composite confidence in [0, 1] that `candidate` is the same recording as `source`.
pub fn score(source: &Track, candidate: &Track) -> f64 {
    score_breakdown(source, candidate).composite
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::fixtures::track;
    use proptest::prelude::*;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("Hello, World!"), "hello world");
        assert_eq!(normalize("  Multiple   Spaces  "), "multiple spaces");
        assert_eq!(normalize("Song (feat. Someone) - Remix"), "song feat someone remix");
        assert_eq!(normalize("÷"), "");
    }

    #[test]
    fn test_levenshtein() {
        assert_eq!(levenshtein("kitten", "sitting"), 3);
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("same", "same"), 0);
    }

    #[test]
    fn test_string_similarity_edges() {
        assert_eq!(string_similarity("", ""), 1.0);
        assert_eq!(string_similarity("", "abc"), 0.0);
        assert_eq!(string_similarity("abc", ""), 0.0);
        assert!((string_similarity("kitten", "sitting") - (1.0 - 3.0 / 7.0)).abs() < 1e-9);
    }

    #[test]
    fn test_artist_similarity_ignores_order() {
        let sim = artist_similarity(
            ["Guest", "Main Artist"].into_iter(),
            ["Main Artist"].into_iter(),
        );
        assert_eq!(sim, 1.0);
    }

    #[test]
    fn test_duration_steps() {
        assert_eq!(duration_similarity(0, 200_000), 0.5);
        assert_eq!(duration_similarity(200_000, 0), 0.5);
        assert_eq!(duration_similarity(200_000, 210_000), 1.0);
        assert_eq!(duration_similarity(200_000, 240_000), 0.8);
        assert_eq!(duration_similarity(200_000, 260_000), 0.6);
        assert_eq!(duration_similarity(200_000, 400_000), 0.3);
    }

    #[test]
    fn test_self_match_is_maximal() {
        let t = track("t1", "Bohemian Rhapsody", &["Queen"], "A Night at the Opera", 354_000);
        assert_eq!(score(&t, &t.clone()), 1.0);
    }

    #[test]
    fn test_shape_of_you_matches_divide() {
        let source = track("sp", "Shape of You", &["Ed Sheeran"], "÷", 233_713);
        let candidate = track("td", "Shape of You", &["Ed Sheeran"], "Divide", 234_000);

        let breakdown = score_breakdown(&source, &candidate);
        assert_eq!(breakdown.title, 1.0);
        assert_eq!(breakdown.artist, 1.0);
        assert_eq!(breakdown.album, 0.5);
        assert_eq!(breakdown.duration, 1.0);
        assert!(breakdown.composite >= HIGH_CONFIDENCE);
    }

    #[test]
    fn test_unrelated_tracks_fall_below_threshold() {
        let source = track("a", "Bohemian Rhapsody", &["Queen"], "A Night at the Opera", 354_000);
        let candidate = track("b", "Toxic", &["Britney Spears"], "In the Zone", 198_000);
        assert!(score(&source, &candidate) < MATCH_THRESHOLD);
    }

    #[test]
    fn test_matching_isrc_short_circuits() {
        let mut source = track("a", "Song", &["Artist"], "Album", 200_000);
        let mut candidate = track("b", "Song (2011 Remaster)", &["Artist"], "Album", 205_000);
        source.isrc = Some("USRC17607839".into());
        candidate.isrc = Some("usrc17607839".into());
        assert_eq!(score(&source, &candidate), 1.0);
    }

    proptest! {
        /// Normalizing twice changes nothing
        #[test]
        fn normalize_is_idempotent(input in ".*") {
            let once = normalize(&input);
            prop_assert_eq!(normalize(&once), once);
        }

        /// Composite scores stay within [0, 1]
        #[test]
        fn score_is_bounded(
            t1 in "[a-zA-Z (]{0,20}",
            t2 in "[a-zA-Z )]{0,20}",
            a1 in "[a-z]{1,10}",
            a2 in "[a-z]{1,10}",
            d1 in 0u64..600_000,
            d2 in 0u64..600_000,
        ) {
            let source = track("s", &t1, &[a1.as_str()], &t1, d1);
            let candidate = track("c", &t2, &[a2.as_str()], "", d2);
            let s = score(&source, &candidate);
            prop_assert!((0.0..=1.0).contains(&s));
        }
    }
}
