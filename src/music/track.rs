//! Track descriptors and queue items.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A playable track as reported by a search backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackDescriptor {
    pub title: String,
    pub author: String,
    pub duration_ms: u64,
    pub uri: String,
    /// Opaque payload handed back to the player for playback.
    pub encoded: String,
}

impl TrackDescriptor {
    pub fn new(
        title: impl Into<String>,
        duration_ms: u64,
        uri: impl Into<String>,
        encoded: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            author: String::new(),
            duration_ms,
            uri: uri.into(),
            encoded: encoded.into(),
        }
    }
}

/// Who asked for a track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackUserData {
    pub requester_id: u64,
    pub requester_tag: String,
}

/// A track sitting in a guild queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedTrack {
    pub track: TrackDescriptor,
    pub user_data: TrackUserData,
    pub added_at: DateTime<Utc>,
}

impl QueuedTrack {
    pub fn new(track: TrackDescriptor, user_data: TrackUserData) -> Self {
        Self {
            track,
            user_data,
            added_at: Utc::now(),
        }
    }
}

/// A named group of tracks returned for a playlist link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Playlist {
    pub name: String,
    pub tracks: Vec<TrackDescriptor>,
    /// Index of the track the link pointed at, if any.
    pub selected: Option<usize>,
}

/// Outcome of resolving a query or identifier against a backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadResult {
    Track(TrackDescriptor),
    Playlist(Playlist),
    SearchResults(Vec<TrackDescriptor>),
    NoMatches,
    Failed(String),
}

impl LoadResult {
    /// Flatten into an ordered candidate list. Failures yield `None`.
    pub fn into_candidates(self) -> Option<Vec<TrackDescriptor>> {
        match self {
            Self::Track(track) => Some(vec![track]),
            Self::Playlist(playlist) => Some(playlist.tracks),
            Self::SearchResults(tracks) => Some(tracks),
            Self::NoMatches => Some(Vec::new()),
            Self::Failed(_) => None,
        }
    }
}
