//! Lavalink-style REST node: `GET /loadtracks?identifier=...`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::AUTHORIZATION;
use serde::Deserialize;
use tracing::{debug, warn};
use url::Url;

use super::{SearchBackend, SearchSource};
use crate::config::NodeConfig;
use crate::error::{BackendError, BackendResult};
use crate::music::track::{LoadResult, Playlist, TrackDescriptor};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoadResponse {
    load_type: String,
    #[serde(default)]
    tracks: Vec<RawTrack>,
    playlist_info: Option<RawPlaylistInfo>,
    exception: Option<RawException>,
}

#[derive(Debug, Deserialize)]
struct RawTrack {
    track: String,
    info: RawTrackInfo,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTrackInfo {
    title: String,
    #[serde(default)]
    author: String,
    #[serde(default)]
    length: u64,
    uri: Option<String>,
    #[serde(default)]
    identifier: String,
    #[serde(default)]
    is_stream: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPlaylistInfo {
    name: Option<String>,
    selected_track: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct RawException {
    message: Option<String>,
    severity: Option<String>,
}

impl From<RawTrack> for TrackDescriptor {
    fn from(raw: RawTrack) -> Self {
        let info = raw.info;
        // Streams report a meaningless length.
        let duration_ms = if info.is_stream { 0 } else { info.length };
        TrackDescriptor {
            title: info.title,
            author: info.author,
            duration_ms,
            uri: info.uri.unwrap_or(info.identifier),
            encoded: raw.track,
        }
    }
}

/// Parse a `loadtracks` body.
pub fn parse_load_response(body: &str) -> BackendResult<LoadResult> {
    let response: LoadResponse =
        serde_json::from_str(body).map_err(|e| BackendError::Protocol(e.to_string()))?;
    Ok(into_load_result(response))
}

fn into_load_result(response: LoadResponse) -> LoadResult {
    match response.load_type.as_str() {
        "TRACK_LOADED" => match response.tracks.into_iter().next() {
            Some(track) => LoadResult::Track(track.into()),
            None => LoadResult::Failed("Track response without a track".to_string()),
        },
        "PLAYLIST_LOADED" => {
            let tracks: Vec<TrackDescriptor> = response.tracks.into_iter().map(Into::into).collect();
            if tracks.is_empty() {
                return LoadResult::Failed("Playlist is empty".to_string());
            }
            let info = response.playlist_info;
            let selected = info
                .as_ref()
                .and_then(|i| i.selected_track)
                .and_then(|i| usize::try_from(i).ok())
                .filter(|&i| i < tracks.len());
            LoadResult::Playlist(Playlist {
                name: info.and_then(|i| i.name).unwrap_or_default(),
                tracks,
                selected,
            })
        }
        "SEARCH_RESULT" => LoadResult::SearchResults(response.tracks.into_iter().map(Into::into).collect()),
        "NO_MATCHES" => LoadResult::NoMatches,
        "LOAD_FAILED" => {
            let (message, severity) = response
                .exception
                .map(|e| (e.message, e.severity))
                .unwrap_or((None, None));
            let message = message.unwrap_or_else(|| "/".to_string());
            debug!(severity = severity.as_deref().unwrap_or("UNKNOWN"), "Node reported load failure: {}", message);
            LoadResult::Failed(message)
        }
        other => LoadResult::Failed(format!("Invalid loadType: {other}")),
    }
}

/// One REST node.
pub struct LavalinkBackend {
    name: &'static str,
    client: Client,
    endpoint: Url,
    password: Option<String>,
    timeout: Duration,
}

impl LavalinkBackend {
    pub fn new(name: &'static str, node: &NodeConfig, timeout: Duration) -> BackendResult<Self> {
        let base = Url::parse(&node.url).map_err(|e| BackendError::Protocol(format!("{}: {e}", node.url)))?;
        let endpoint = base
            .join("loadtracks")
            .map_err(|e| BackendError::Protocol(e.to_string()))?;
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BackendError::Unavailable(e.to_string()))?;

        Ok(Self {
            name,
            client,
            endpoint,
            password: node.password.clone(),
            timeout,
        })
    }

    async fn load(&self, identifier: &str) -> BackendResult<LoadResult> {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut().append_pair("identifier", identifier);

        let mut request = self.client.get(url);
        if let Some(password) = &self.password {
            request = request.header(AUTHORIZATION, password);
        }

        let body = async { request.send().await?.error_for_status()?.text().await }
            .await
            .map_err(|err| self.transport_error(err))?;
        parse_load_response(&body)
    }

    fn transport_error(&self, err: reqwest::Error) -> BackendError {
        if err.is_timeout() {
            BackendError::Timeout(self.timeout.as_millis() as u64)
        } else if err.is_decode() {
            BackendError::Protocol(err.to_string())
        } else {
            BackendError::Unavailable(err.to_string())
        }
    }
}

#[async_trait]
impl SearchBackend for LavalinkBackend {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn search(&self, query: &str, source: SearchSource) -> BackendResult<Vec<TrackDescriptor>> {
        match self.load(&source.identifier(query)).await? {
            LoadResult::Failed(reason) => {
                warn!(node = self.name, "Search failed: {}", reason);
                Err(BackendError::Unavailable(reason))
            }
            other => Ok(other.into_candidates().unwrap_or_default()),
        }
    }

    async fn resolve(&self, identifier: &str) -> BackendResult<LoadResult> {
        self.load(identifier).await
    }
}
