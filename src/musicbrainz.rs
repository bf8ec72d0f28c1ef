use anyhow::{Context, Result};
use parking_lot::Mutex;
use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

use crate::cache::LookupCache;

const SEARCH_URL: &str = "https://musicbrainz.org/ws/2/recording";
const COVER_ART_URL: &str = "https://coverartarchive.org/release";
const SEARCH_LIMIT: &str = "5";

/// MusicBrainz allows one request per second per client.
pub const MIN_REQUEST_INTERVAL: Duration = Duration::from_secs(1);

/// Remote metadata source the workers query.
pub trait Catalog: Send + Sync {
    /// Best match for a track, or `None` if nothing scores high enough.
    fn lookup(&self, title: &str, artist: Option<&str>) -> Result<Option<LookupMatch>>;

    /// Front cover bytes for a release, or `None` if it has no artwork.
    fn cover_art(&self, release_id: &str) -> Result<Option<Vec<u8>>>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LookupMatch {
    pub recording_id: String,
    pub title: String,
    pub artist: String,
    pub album: Option<String>,
    pub date: Option<String>,
    pub genre: Option<String>,
    pub release_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct MBSearchResponse {
    #[serde(default)]
    pub recordings: Vec<MBRecording>,
}

#[derive(Debug, Deserialize)]
pub struct MBRecording {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub score: u32,
    #[serde(rename = "artist-credit", default)]
    pub artist_credit: Vec<ArtistCredit>,
    #[serde(rename = "first-release-date")]
    pub first_release_date: Option<String>,
    #[serde(default)]
    pub releases: Vec<MBRelease>,
    #[serde(default)]
    pub tags: Vec<MBTag>,
}

#[derive(Debug, Deserialize)]
pub struct ArtistCredit {
    pub name: String,
    #[serde(default)]
    pub joinphrase: String,
}

#[derive(Debug, Deserialize)]
pub struct MBRelease {
    pub id: String,
    pub title: String,
    pub date: Option<String>,
    pub status: Option<String>,
    #[serde(rename = "release-group")]
    pub release_group: Option<MBReleaseGroup>,
}

#[derive(Debug, Deserialize)]
pub struct MBReleaseGroup {
    #[serde(rename = "primary-type")]
    pub primary_type: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct MBTag {
    pub name: String,
    #[serde(default)]
    pub count: i64,
}

/// Spaces requests out across every worker sharing it.
pub struct RequestGate {
    interval: Duration,
    last: Mutex<Option<Instant>>,
}

impl RequestGate {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: Mutex::new(None),
        }
    }

    /// Blocks until at least `interval` has passed since the previous caller.
    pub fn wait(&self) {
        let mut last = self.last.lock();
        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < self.interval {
                std::thread::sleep(self.interval - elapsed);
            }
        }
        *last = Some(Instant::now());
    }
}

pub struct MusicBrainzCatalog {
    client: Client,
    cache: LookupCache,
    gate: RequestGate,
    min_score: u32,
}

impl MusicBrainzCatalog {
    pub fn new(contact: &str, timeout: Duration, min_score: u32) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(format!(
                "AudioRetagger/{} ( {} )",
                env!("CARGO_PKG_VERSION"),
                contact
            ))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            cache: LookupCache::new(),
            gate: RequestGate::new(MIN_REQUEST_INTERVAL),
            min_score,
        })
    }

    fn search(&self, title: &str, artist: Option<&str>) -> Result<MBSearchResponse> {
        let query = build_query(title, artist);
        self.gate.wait();

        let resp = self
            .client
            .get(SEARCH_URL)
            .query(&[("query", query.as_str()), ("fmt", "json"), ("limit", SEARCH_LIMIT)])
            .send()
            .context("Failed to query MusicBrainz")?;

        if !resp.status().is_success() {
            return Err(anyhow::anyhow!("MusicBrainz API error: {}", resp.status()));
        }

        resp.json().context("Failed to parse MusicBrainz response")
    }
}

impl Catalog for MusicBrainzCatalog {
    fn lookup(&self, title: &str, artist: Option<&str>) -> Result<Option<LookupMatch>> {
        let key = LookupCache::key(title, artist);
        if let Some(hit) = self.cache.get(&key) {
            tracing::debug!("Lookup cache hit for {:?}", key);
            return Ok(hit);
        }

        let response = self.search(title, artist)?;
        let found = select_match(&response, self.min_score);
        self.cache.put(key, found.clone());
        Ok(found)
    }

    fn cover_art(&self, release_id: &str) -> Result<Option<Vec<u8>>> {
        let url = format!("{}/{}/front-500", COVER_ART_URL, release_id);
        let resp = self
            .client
            .get(&url)
            .send()
            .context("Failed to query Cover Art Archive")?;

        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !resp.status().is_success() {
            return Err(anyhow::anyhow!("Cover Art Archive error: {}", resp.status()));
        }

        let bytes = resp.bytes().context("Failed to download cover art")?;
        Ok(Some(bytes.to_vec()))
    }
}

/// Escape a value for use inside a quoted Lucene phrase.
pub fn escape_phrase(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.trim().chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

pub fn build_query(title: &str, artist: Option<&str>) -> String {
    let mut query = format!("recording:\"{}\"", escape_phrase(title));
    if let Some(artist) = artist.filter(|a| !a.trim().is_empty()) {
        query.push_str(&format!(" AND artist:\"{}\"", escape_phrase(artist)));
    }
    query
}

fn is_official_album(release: &MBRelease) -> bool {
    let official = release
        .status
        .as_deref()
        .map(|s| s.eq_ignore_ascii_case("official"))
        .unwrap_or(false);
    let album = release
        .release_group
        .as_ref()
        .and_then(|g| g.primary_type.as_deref())
        .map(|t| t.eq_ignore_ascii_case("album"))
        .unwrap_or(false);
    official && album
}

fn pick_release(releases: &[MBRelease]) -> Option<&MBRelease> {
    // Undated releases sort last; ties keep service order.
    releases.iter().min_by_key(|r| {
        (
            !is_official_album(r),
            r.date
                .clone()
                .filter(|d| !d.is_empty())
                .unwrap_or_else(|| "9999".to_string()),
        )
    })
}

fn title_case(value: &str) -> String {
    value
        .split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn top_genre(tags: &[MBTag]) -> Option<String> {
    let mut best: Option<&MBTag> = None;
    for tag in tags {
        if best.map_or(true, |b| tag.count > b.count) {
            best = Some(tag);
        }
    }
    best.map(|t| title_case(&t.name))
}

fn credit_string(credits: &[ArtistCredit]) -> String {
    credits
        .iter()
        .map(|c| format!("{}{}", c.name, c.joinphrase))
        .collect::<String>()
        .trim()
        .to_string()
}

/// Pick the first recording at or above `min_score` and flatten it.
pub fn select_match(response: &MBSearchResponse, min_score: u32) -> Option<LookupMatch> {
    let recording = response.recordings.iter().find(|r| r.score >= min_score)?;
    let release = pick_release(&recording.releases);

    let date = recording
        .first_release_date
        .clone()
        .filter(|d| !d.is_empty())
        .or_else(|| release.and_then(|r| r.date.clone()).filter(|d| !d.is_empty()));

    Some(LookupMatch {
        recording_id: recording.id.clone(),
        title: recording.title.clone(),
        artist: credit_string(&recording.artist_credit),
        album: release.map(|r| r.title.clone()),
        date,
        genre: top_genre(&recording.tags),
        release_id: release.map(|r| r.id.clone()),
    })
}
