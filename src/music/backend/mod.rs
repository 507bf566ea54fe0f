//! Remote search/streaming backends.

mod lavalink;

pub use lavalink::{LavalinkBackend, parse_load_response};

use async_trait::async_trait;
use url::Url;

use super::track::{LoadResult, TrackDescriptor};
use crate::error::{BackendError, BackendResult};

pub const YT_SELECTOR: &str = "yt:";
pub const SC_SELECTOR: &str = "sc:";

/// Which catalog a query targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SearchSource {
    YouTube,
    SoundCloud,
    /// A URL or identifier resolved as-is.
    Link,
}

impl SearchSource {
    /// Split a raw query into its source and the text after the selector.
    ///
    /// Unprefixed URLs resolve directly; any other text is a YouTube search.
    pub fn parse(raw: &str) -> (Self, &str) {
        let trimmed = raw.trim();
        if let Some(rest) = trimmed.strip_prefix(YT_SELECTOR) {
            return (Self::YouTube, rest.trim());
        }
        if let Some(rest) = trimmed.strip_prefix(SC_SELECTOR) {
            return (Self::SoundCloud, rest.trim());
        }
        match Url::parse(trimmed) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => (Self::Link, trimmed),
            _ => (Self::YouTube, trimmed),
        }
    }

    /// The other text catalog. Links have none.
    pub fn alternate(self) -> Self {
        match self {
            Self::YouTube => Self::SoundCloud,
            Self::SoundCloud => Self::YouTube,
            Self::Link => Self::Link,
        }
    }

    /// Identifier understood by a resolving backend.
    pub fn identifier(self, query: &str) -> String {
        match self {
            Self::YouTube => format!("ytsearch:{query}"),
            Self::SoundCloud => format!("scsearch:{query}"),
            Self::Link => query.to_string(),
        }
    }
}

/// A catalog the loader can query.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    fn name(&self) -> &'static str;

    fn is_enabled(&self) -> bool {
        true
    }

    /// Fast list search in one catalog.
    async fn search(&self, query: &str, source: SearchSource) -> BackendResult<Vec<TrackDescriptor>>;

    /// Resolve a URL or prefixed identifier.
    async fn resolve(&self, identifier: &str) -> BackendResult<LoadResult>;
}

/// Stand-in for a node that is not configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledBackend;

#[async_trait]
impl SearchBackend for DisabledBackend {
    fn name(&self) -> &'static str {
        "disabled"
    }

    fn is_enabled(&self) -> bool {
        false
    }

    async fn search(&self, _query: &str, _source: SearchSource) -> BackendResult<Vec<TrackDescriptor>> {
        Err(BackendError::Disabled(self.name()))
    }

    async fn resolve(&self, _identifier: &str) -> BackendResult<LoadResult> {
        Err(BackendError::Disabled(self.name()))
    }
}
