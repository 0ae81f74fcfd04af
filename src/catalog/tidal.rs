use std::collections::HashMap;
use std::num::NonZeroU32;
use std::time::Duration;

use governor::{
    Quota, RateLimiter, clock::DefaultClock, state::InMemoryState, state::direct::NotKeyed,
};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use super::http::{read_json, send};
use crate::error::CatalogError;
use crate::model::{AlbumRef, ArtistCredit, DurationUnit, Playlist, Track};
use crate::ports::TargetCatalog;

type DirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

pub const DEFAULT_BASE_URL: &str = "https://openapi.tidal.com/v2";

/// TIDAL reports whole seconds (or an ISO-8601 duration).
pub const DURATION_UNIT: DurationUnit = DurationUnit::Seconds;

const JSON_API: &str = "application/vnd.api+json";

/* ---------- JSON:API envelope ---------- */

#[derive(Debug, Deserialize)]
struct Document<D> {
    data: D,
    #[serde(default)]
    included: Vec<Resource>,
    #[serde(default)]
    links: Option<Links>,
}

#[derive(Debug, Deserialize)]
struct Links {
    #[serde(default)]
    next: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct ResourceId {
    id: String,
    #[serde(rename = "type")]
    kind: String,
    /// Set on playlist items; deleting an item needs its `itemId`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    meta: Option<ItemMeta>,
}

impl ResourceId {
    fn track(id: &str) -> Self {
        Self {
            id: id.to_string(),
            kind: "tracks".to_string(),
            meta: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct ItemMeta {
    #[serde(rename = "itemId")]
    item_id: String,
}

#[derive(Debug, Deserialize)]
struct Resource {
    id: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    attributes: serde_json::Value,
    #[serde(default)]
    relationships: HashMap<String, Relationship>,
}

#[derive(Debug, Deserialize)]
struct Relationship {
    #[serde(default)]
    data: Option<Vec<ResourceId>>,
}

#[derive(Debug, Serialize)]
struct Identifiers<'a> {
    data: &'a [ResourceId],
}

impl Resource {
    fn attributes<T: DeserializeOwned>(&self) -> Result<T, CatalogError> {
        serde_json::from_value(self.attributes.clone()).map_err(|e| {
            CatalogError::Envelope(format!("{} {} attributes: {}", self.kind, self.id, e))
        })
    }

    fn related(&self, name: &str) -> &[ResourceId] {
        self.relationships
            .get(name)
            .and_then(|r| r.data.as_deref())
            .unwrap_or_default()
    }

    fn expect_kind(&self, kind: &str) -> Result<(), CatalogError> {
        if self.kind == kind {
            Ok(())
        } else {
            Err(CatalogError::Envelope(format!(
                "expected {} resource, got {}",
                kind, self.kind
            )))
        }
    }
}

/* ---------- Attributes ---------- */

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TidalDuration {
    Seconds(u64),
    Iso8601(String),
}

impl TidalDuration {
    fn seconds(&self) -> Option<u64> {
        match self {
            TidalDuration::Seconds(secs) => Some(*secs),
            TidalDuration::Iso8601(value) => parse_iso8601_duration(value),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TrackAttributes {
    title: String,
    #[serde(default)]
    duration: Option<TidalDuration>,
    #[serde(default)]
    isrc: Option<String>,
    #[serde(default)]
    explicit: Option<bool>,
    /// 0.0 to 1.0
    #[serde(default)]
    popularity: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ArtistAttributes {
    name: String,
}

#[derive(Debug, Deserialize)]
struct AlbumAttributes {
    title: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlaylistAttributes {
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    number_of_items: Option<u32>,
}

/// Parse an ISO-8601 duration such as `PT3M54S` into whole seconds.
pub fn parse_iso8601_duration(value: &str) -> Option<u64> {
    let rest = value.strip_prefix('P')?;
    let mut total = 0.0;
    let mut number = String::new();
    let mut in_time = false;

    for c in rest.chars() {
        match c {
            'T' => in_time = true,
            '0'..='9' | '.' => number.push(c),
            unit => {
                let amount: f64 = number.parse().ok()?;
                number.clear();
                let factor = match (unit, in_time) {
                    ('D', false) => 86_400.0,
                    ('H', true) => 3_600.0,
                    ('M', true) => 60.0,
                    ('S', true) => 1.0,
                    _ => return None,
                };
                total += amount * factor;
            }
        }
    }

    if !number.is_empty() {
        return None;
    }
    Some(total.round() as u64)
}

/* ---------- Envelope to domain ---------- */

struct Included<'a> {
    by_id: HashMap<(&'a str, &'a str), &'a Resource>,
}

impl<'a> Included<'a> {
    fn new(resources: &'a [Resource]) -> Self {
        Self {
            by_id: resources
                .iter()
                .map(|r| ((r.kind.as_str(), r.id.as_str()), r))
                .collect(),
        }
    }

    fn get(&self, id: &ResourceId) -> Option<&'a Resource> {
        self.by_id.get(&(id.kind.as_str(), id.id.as_str())).copied()
    }
}

/// Build a track from its resource and the included artists/albums.
///
/// Returns `Ok(None)` when none of the track's artists can be resolved.
fn track_from_resource(
    resource: &Resource,
    included: &Included<'_>,
) -> Result<Option<Track>, CatalogError> {
    resource.expect_kind("tracks")?;
    let attributes: TrackAttributes = resource.attributes()?;

    let mut artists = Vec::new();
    for artist_id in resource.related("artists") {
        if let Some(artist) = included.get(artist_id) {
            let attrs: ArtistAttributes = artist.attributes()?;
            artists.push(ArtistCredit {
                id: artist.id.clone(),
                name: attrs.name,
            });
        }
    }
    if artists.is_empty() {
        log::warn!(
            "Dropping TIDAL track {} ('{}'): no artist in response",
            resource.id,
            attributes.title
        );
        return Ok(None);
    }

    let album = match resource
        .related("albums")
        .first()
        .and_then(|id| included.get(id))
    {
        Some(album) => AlbumRef {
            id: album.id.clone(),
            name: album.attributes::<AlbumAttributes>()?.title,
        },
        None => AlbumRef::default(),
    };

    let seconds = attributes
        .duration
        .as_ref()
        .and_then(TidalDuration::seconds)
        .unwrap_or(0);

    Ok(Some(Track {
        id: resource.id.clone(),
        title: attributes.title,
        artists,
        album,
        duration_ms: DURATION_UNIT.to_millis(seconds),
        isrc: attributes.isrc,
        explicit: attributes.explicit,
        popularity: attributes
            .popularity
            .map(|p| (p.clamp(0.0, 1.0) * 100.0).round() as u32),
    }))
}

/// Tracks referenced by a search result, in catalog ranking order.
fn tracks_from_search(document: &Document<Vec<ResourceId>>) -> Result<Vec<Track>, CatalogError> {
    let included = Included::new(&document.included);
    let mut tracks = Vec::with_capacity(document.data.len());

    for id in &document.data {
        if id.kind != "tracks" {
            return Err(CatalogError::Envelope(format!(
                "search returned a {} resource",
                id.kind
            )));
        }
        match included.get(id) {
            Some(resource) => {
                if let Some(track) = track_from_resource(resource, &included)? {
                    tracks.push(track);
                }
            }
            None => log::warn!("TIDAL search result {} missing from included", id.id),
        }
    }

    Ok(tracks)
}

fn playlist_from_resource(resource: &Resource) -> Result<Playlist, CatalogError> {
    resource.expect_kind("playlists")?;
    let attributes: PlaylistAttributes = resource.attributes()?;
    Ok(Playlist {
        id: resource.id.clone(),
        name: attributes.name,
        description: attributes.description.filter(|d| !d.trim().is_empty()),
        track_count: attributes.number_of_items.unwrap_or(0),
    })
}

/* ---------- Playlist items ---------- */

/// Track id to the playlist item ids holding it, in playlist order.
type ItemIndex = HashMap<String, Vec<String>>;

fn item_index(items: &[ResourceId]) -> ItemIndex {
    let mut index = ItemIndex::new();
    for item in items.iter().filter(|item| item.kind == "tracks") {
        if let Some(meta) = &item.meta {
            index
                .entry(item.id.clone())
                .or_default()
                .push(meta.item_id.clone());
        }
    }
    index
}

/// Item references for a removal; a track listed twice takes its next item.
///
/// `None` when the index doesn't hold enough items for `track_ids`.
fn items_to_remove(index: &ItemIndex, track_ids: &[String]) -> Option<Vec<ResourceId>> {
    let mut taken: HashMap<&str, usize> = HashMap::new();
    let mut items = Vec::with_capacity(track_ids.len());
    for track_id in track_ids {
        let n = taken.entry(track_id.as_str()).or_default();
        let item_id = index.get(track_id)?.get(*n)?;
        *n += 1;
        items.push(ResourceId {
            meta: Some(ItemMeta {
                item_id: item_id.clone(),
            }),
            ..ResourceId::track(track_id)
        });
    }
    Some(items)
}

fn forget_removed(index: &mut ItemIndex, removed: &[ResourceId]) {
    for item in removed {
        let (Some(meta), Some(item_ids)) = (&item.meta, index.get_mut(&item.id)) else {
            continue;
        };
        item_ids.retain(|id| *id != meta.item_id);
    }
}

/* ---------- Client ---------- */

/// TIDAL Open API v2 client, throttled client-side.
pub struct TidalCatalog {
    access_token: String,
    base_url: String,
    country_code: String,
    client: reqwest::Client,
    limiter: DirectRateLimiter,
    /// Item ids seen by the last listing of each playlist.
    playlist_items: Mutex<HashMap<String, ItemIndex>>,
}

impl TidalCatalog {
    pub fn new(access_token: String, country_code: String, requests_per_second: u32) -> Self {
        Self::with_base_url(
            access_token,
            country_code,
            requests_per_second,
            DEFAULT_BASE_URL.to_string(),
        )
    }

    pub fn with_base_url(
        access_token: String,
        country_code: String,
        requests_per_second: u32,
        base_url: String,
    ) -> Self {
        let quota = Quota::per_second(NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN));
        Self {
            access_token,
            base_url: base_url.trim_end_matches('/').to_string(),
            country_code,
            client: reqwest::Client::new(),
            limiter: RateLimiter::direct(quota),
            playlist_items: Mutex::new(HashMap::new()),
        }
    }

    async fn request(&self, method: Method, url: &str) -> RequestBuilder {
        self.limiter.until_ready().await;
        self.client
            .request(method, url)
            .bearer_auth(&self.access_token)
            .header(ACCEPT, JSON_API)
            .timeout(Duration::from_secs(10))
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}{}{}countryCode={}",
            self.base_url,
            path,
            if path.contains('?') { '&' } else { '?' },
            urlencoding::encode(&self.country_code)
        )
    }

    /// `links.next` is usually relative to the API root.
    fn follow(&self, next: &str) -> String {
        if next.starts_with("http://") || next.starts_with("https://") {
            next.to_string()
        } else {
            format!("{}{}", self.base_url, next)
        }
    }

    async fn get<D: DeserializeOwned>(&self, url: &str) -> Result<Document<D>, CatalogError> {
        let response = send(self.request(Method::GET, url).await).await?;
        read_json(response).await
    }

    async fn list_items(&self, playlist_id: &str) -> Result<Vec<ResourceId>, CatalogError> {
        let mut items = Vec::new();
        let mut next_url = Some(self.url(&format!(
            "/playlists/{}/relationships/items",
            urlencoding::encode(playlist_id)
        )));

        while let Some(url) = next_url {
            let page: Document<Vec<ResourceId>> = self.get(&url).await?;
            items.extend(page.data);
            next_url = page.links.and_then(|l| l.next).map(|n| self.follow(&n));
        }

        Ok(items)
    }

    async fn write_items(
        &self,
        method: Method,
        playlist_id: &str,
        data: &[ResourceId],
    ) -> Result<(), CatalogError> {
        let body = serde_json::to_vec(&Identifiers { data })
            .map_err(|e| CatalogError::Envelope(e.to_string()))?;
        let url = self.url(&format!(
            "/playlists/{}/relationships/items",
            urlencoding::encode(playlist_id)
        ));

        send(
            self.request(method, &url)
                .await
                .header(CONTENT_TYPE, JSON_API)
                .body(body),
        )
        .await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl TargetCatalog for TidalCatalog {
    async fn list_playlists(&self) -> Result<Vec<Playlist>, CatalogError> {
        let mut playlists = Vec::new();
        let mut next_url = Some(self.url("/playlists?filter%5Bowners.id%5D=me"));

        while let Some(url) = next_url {
            let page: Document<Vec<Resource>> = self.get(&url).await?;
            for resource in &page.data {
                playlists.push(playlist_from_resource(resource)?);
            }
            next_url = page.links.and_then(|l| l.next).map(|n| self.follow(&n));
        }

        log::debug!("Fetched {} TIDAL playlist(s)", playlists.len());
        Ok(playlists)
    }

    async fn search_tracks(&self, artist: &str, title: &str) -> Result<Vec<Track>, CatalogError> {
        let query = format!("{} {}", artist, title);
        let url = self.url(&format!(
            "/searchResults/{}/relationships/tracks?include=tracks,tracks.artists,tracks.albums",
            urlencoding::encode(&query)
        ));
        let document: Document<Vec<ResourceId>> = self.get(&url).await?;
        let tracks = tracks_from_search(&document)?;
        log::debug!("TIDAL search '{}' returned {} track(s)", query, tracks.len());
        Ok(tracks)
    }

    async fn create_playlist(
        &self,
        name: &str,
        description: &str,
    ) -> Result<String, CatalogError> {
        let body = serde_json::json!({
            "data": {
                "type": "playlists",
                "attributes": {
                    "name": name,
                    "description": description,
                    "accessType": "UNLISTED",
                }
            }
        });
        let response = send(
            self.request(Method::POST, &self.url("/playlists"))
                .await
                .header(CONTENT_TYPE, JSON_API)
                .body(body.to_string()),
        )
        .await?;

        let document: Document<Resource> = read_json(response).await?;
        document.data.expect_kind("playlists")?;
        Ok(document.data.id)
    }

    async fn list_playlist_track_ids(&self, playlist_id: &str) -> Result<Vec<String>, CatalogError> {
        let items = self.list_items(playlist_id).await?;
        self.playlist_items
            .lock()
            .await
            .insert(playlist_id.to_string(), item_index(&items));

        Ok(items
            .into_iter()
            .filter(|item| item.kind == "tracks")
            .map(|item| item.id)
            .collect())
    }

    /// Deletes by playlist item; item ids come from the last listing, refreshed if stale.
    async fn remove_tracks(
        &self,
        playlist_id: &str,
        track_ids: &[String],
    ) -> Result<(), CatalogError> {
        let mut cache = self.playlist_items.lock().await;
        let known = cache
            .get(playlist_id)
            .and_then(|index| items_to_remove(index, track_ids));
        let data = match known {
            Some(data) => data,
            None => {
                let index = item_index(&self.list_items(playlist_id).await?);
                let data = items_to_remove(&index, track_ids).ok_or_else(|| {
                    CatalogError::Envelope(format!(
                        "playlist {} doesn't hold all of the tracks to remove",
                        playlist_id
                    ))
                })?;
                cache.insert(playlist_id.to_string(), index);
                data
            }
        };

        self.write_items(Method::DELETE, playlist_id, &data).await?;
        if let Some(index) = cache.get_mut(playlist_id) {
            forget_removed(index, &data);
        }
        Ok(())
    }

    async fn add_tracks(&self, playlist_id: &str, track_ids: &[String]) -> Result<(), CatalogError> {
        let data: Vec<ResourceId> = track_ids.iter().map(|id| ResourceId::track(id)).collect();
        self.write_items(Method::POST, playlist_id, &data).await
    }

    async fn verify_track_availability(&self, track_id: &str) -> Result<bool, CatalogError> {
        let url = self.url(&format!("/tracks/{}", urlencoding::encode(track_id)));
        match send(self.request(Method::GET, &url).await).await {
            Ok(_) => Ok(true),
            Err(CatalogError::Http { status: 404, .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::http::parse_json;

    const SEARCH_BODY: &str = r#"{
        "data": [{"id": "77646168", "type": "tracks"}, {"id": "1", "type": "tracks"}],
        "included": [
            {
                "id": "77646168",
                "type": "tracks",
                "attributes": {
                    "title": "Shape of You",
                    "duration": "PT3M54S",
                    "isrc": "GBAHS1600463",
                    "explicit": false,
                    "popularity": 0.91
                },
                "relationships": {
                    "artists": {"data": [{"id": "3995478", "type": "artists"}]},
                    "albums": {"data": [{"id": "77646164", "type": "albums"}]}
                }
            },
            {
                "id": "1",
                "type": "tracks",
                "attributes": {"title": "Orphan", "duration": 120},
                "relationships": {"artists": {"data": []}}
            },
            {"id": "3995478", "type": "artists", "attributes": {"name": "Ed Sheeran"}},
            {"id": "77646164", "type": "albums", "attributes": {"title": "Divide"}}
        ],
        "links": {"self": "/searchResults/x/relationships/tracks"}
    }"#;

    #[test]
    fn test_parse_iso8601_duration() {
        assert_eq!(parse_iso8601_duration("PT3M54S"), Some(234));
        assert_eq!(parse_iso8601_duration("PT1H2M3S"), Some(3723));
        assert_eq!(parse_iso8601_duration("PT4.6S"), Some(5));
        assert_eq!(parse_iso8601_duration("P1DT1S"), Some(86_401));
        assert_eq!(parse_iso8601_duration("3:54"), None);
        assert_eq!(parse_iso8601_duration("PT3X"), None);
        assert_eq!(parse_iso8601_duration("PT12"), None);
    }

    #[test]
    fn test_search_document_becomes_typed_tracks() {
        let document: Document<Vec<ResourceId>> = parse_json(SEARCH_BODY).unwrap();
        let tracks = tracks_from_search(&document).unwrap();

        // the artist-less track is dropped
        assert_eq!(tracks.len(), 1);
        let track = &tracks[0];
        assert_eq!(track.id, "77646168");
        assert_eq!(track.primary_artist(), "Ed Sheeran");
        assert_eq!(track.album.name, "Divide");
        assert_eq!(track.duration_ms, 234_000);
        assert_eq!(track.popularity, Some(91));
    }

    #[test]
    fn test_missing_data_is_envelope_error() {
        let error = parse_json::<Document<Vec<ResourceId>>>(r#"{"errors": []}"#).unwrap_err();
        assert!(matches!(error, CatalogError::Envelope(_)));
    }

    #[test]
    fn test_unexpected_resource_type_is_envelope_error() {
        let document: Document<Vec<ResourceId>> =
            parse_json(r#"{"data": [{"id": "9", "type": "videos"}]}"#).unwrap();
        assert!(matches!(
            tracks_from_search(&document),
            Err(CatalogError::Envelope(_))
        ));
    }

    #[test]
    fn test_playlist_roster_uses_number_of_items() {
        let body = r#"{
            "data": [{
                "id": "pl-uuid",
                "type": "playlists",
                "attributes": {"name": "Road Trip", "description": "", "numberOfItems": 12}
            }],
            "links": {"next": "/playlists?page%5Bcursor%5D=abc"}
        }"#;
        let document: Document<Vec<Resource>> = parse_json(body).unwrap();
        let playlist = playlist_from_resource(&document.data[0]).unwrap();

        assert_eq!(playlist.name, "Road Trip");
        assert_eq!(playlist.track_count, 12);
        assert_eq!(playlist.description, None);
        assert_eq!(
            document.links.and_then(|l| l.next).as_deref(),
            Some("/playlists?page%5Bcursor%5D=abc")
        );
    }

    #[test]
    fn test_removal_body_carries_item_ids() {
        let body = r#"{
            "data": [
                {"id": "11", "type": "tracks", "meta": {"itemId": "item-a"}},
                {"id": "22", "type": "tracks", "meta": {"itemId": "item-b"}},
                {"id": "11", "type": "tracks", "meta": {"itemId": "item-c"}},
                {"id": "5", "type": "videos", "meta": {"itemId": "item-v"}}
            ]
        }"#;
        let document: Document<Vec<ResourceId>> = parse_json(body).unwrap();
        let mut index = item_index(&document.data);
        assert_eq!(index.get("11").unwrap(), &["item-a", "item-c"]);
        assert!(!index.contains_key("5"));

        let ids = ["11".to_string(), "11".to_string(), "22".to_string()];
        let data = items_to_remove(&index, &ids).unwrap();
        let json = serde_json::to_value(Identifiers { data: &data }).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"data": [
                {"id": "11", "type": "tracks", "meta": {"itemId": "item-a"}},
                {"id": "11", "type": "tracks", "meta": {"itemId": "item-c"}},
                {"id": "22", "type": "tracks", "meta": {"itemId": "item-b"}}
            ]})
        );

        // a third copy of "11" isn't in the playlist
        let too_many = ["11".to_string(), "11".to_string(), "11".to_string()];
        assert!(items_to_remove(&index, &too_many).is_none());

        forget_removed(&mut index, &data[..1]);
        let next = items_to_remove(&index, &["11".to_string()]).unwrap();
        assert_eq!(next[0].meta.as_ref().unwrap().item_id, "item-c");
    }

    #[test]
    fn test_added_tracks_have_no_meta() {
        let data = [ResourceId::track("77646168")];
        let json = serde_json::to_value(Identifiers { data: &data }).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"data": [{"id": "77646168", "type": "tracks"}]})
        );
    }

    #[test]
    fn test_follow_relative_links() {
        let catalog = TidalCatalog::with_base_url(
            "token".into(),
            "US".into(),
            4,
            "https://openapi.tidal.com/v2/".into(),
        );
        assert_eq!(
            catalog.follow("/playlists?page%5Bcursor%5D=abc"),
            "https://openapi.tidal.com/v2/playlists?page%5Bcursor%5D=abc"
        );
        assert_eq!(
            catalog.url("/tracks/1"),
            "https://openapi.tidal.com/v2/tracks/1?countryCode=US"
        );
    }
}
