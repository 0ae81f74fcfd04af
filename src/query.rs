use std::sync::LazyLock;

use regex::Regex;

use crate::model::Track;

/// One catalog search attempt.
///
/// `album` is carried for diagnostics only; catalogs disagree on album naming too
/// often for it to be part of the actual search call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    pub artist: String,
    pub title: String,
    pub album: Option<String>,
    pub description: String,
}

impl SearchQuery {
    fn new(artist: &str, title: &str, album: Option<&str>, strategy: &str) -> Self {
        let description = match album {
            Some(album) => format!("{}: \"{}\" \"{}\" [{}]", strategy, artist, title, album),
            None => format!("{}: \"{}\" \"{}\"", strategy, artist, title),
        };
        Self {
            artist: artist.to_string(),
            title: title.to_string(),
            album: album.map(str::to_string),
            description,
        }
    }
}

/// Separator used when all artists are searched together.
const ARTIST_SEPARATOR: &str = " ";

/// Parenthesised or bracketed qualifiers: `(feat. X)`, `[Live]`, `(2011 Remaster)`.
static BRACKETED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*[\(\[][^\)\]]*[\)\]]").expect("valid regex"));

/// Trailing collaboration credit outside brackets: `Song feat. X`, `Song ft X`.
static FEATURING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\s+(?:feat\.?|ft\.?|featuring)\s+.*$").expect("valid regex")
});

/// Dash-separated version suffix: `Song - Remastered 2011`, `Song - Radio Edit`.
static VERSION_SUFFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\s+-\s+.*\b(?:remix|remixed|remaster|remastered|version|edit|mix|live|acoustic|explicit|clean|mono|stereo|deluxe)\b.*$",
    )
    .expect("valid regex")
});

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

/// Strip collaboration markers, version annotations and bracketed qualifiers.
///
/// Falls back to the trimmed original if cleaning would leave nothing.
pub fn clean_title(title: &str) -> String {
    let cleaned = BRACKETED.replace_all(title, "");
    let cleaned = VERSION_SUFFIX.replace(&cleaned, "");
    let cleaned = FEATURING.replace(&cleaned, "");
    let cleaned = WHITESPACE.replace_all(cleaned.trim(), " ").to_string();

    if cleaned.is_empty() {
        title.trim().to_string()
    } else {
        cleaned
    }
}

/// Build the ordered search strategies for a source track, most specific first.
pub fn generate(source: &Track) -> Vec<SearchQuery> {
    let primary = source.primary_artist();
    let album = Some(source.album.name.as_str()).filter(|a| !a.trim().is_empty());

    let mut queries = vec![
        SearchQuery::new(primary, &source.title, album, "artist + title + album"),
        SearchQuery::new(primary, &source.title, None, "artist + title"),
        SearchQuery::new(primary, &clean_title(&source.title), None, "artist + cleaned title"),
    ];

    if source.artists.len() > 1 {
        let all_artists = source.artist_names().collect::<Vec<_>>().join(ARTIST_SEPARATOR);
        queries.push(SearchQuery::new(
            &all_artists,
            &source.title,
            None,
            "all artists + title",
        ));

        for extra in source.artist_names().skip(1) {
            queries.push(SearchQuery::new(
                extra,
                &source.title,
                None,
                "featured artist + title",
            ));
        }
    }

    queries
}
