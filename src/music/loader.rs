//! Query resolution and delivery into guild queues.
//!
//! A load goes: capacity check, song cache, primary backend, fallback
//! backend. The first stage that produces tracks wins; backend errors and
//! timeouts only move the request to the next stage.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::backend::{SearchBackend, SearchSource};
use super::player::{GuildMusicPlayer, MusicPlayerManager, SearchMenu};
use super::queue::NextSongPosition;
use super::track::{LoadResult, QueuedTrack, TrackDescriptor, TrackUserData};
use crate::config::MusicConfig;
use crate::database::{PremiumGuildWrapper, SongCacheWrapper};
use crate::error::{BackendError, BackendResult};

/// Identity of whoever issued a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    pub guild_id: u64,
    pub channel_id: u64,
    pub user_id: u64,
    pub user_tag: String,
}

impl RequestContext {
    fn user_data(&self) -> TrackUserData {
        TrackUserData {
            requester_id: self.user_id,
            requester_tag: self.user_tag.clone(),
        }
    }
}

/// How search results are delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadMode {
    /// Queue the best result.
    #[default]
    First,
    /// Queue every result, up to the playlist limit.
    Playlist,
    /// Offer a menu of the first few results.
    Pick,
}

/// What happened to a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayOutcome {
    Queued { track: TrackDescriptor, position: usize },
    QueuedMany { accepted: usize, rejected: usize },
    /// Candidates for a pick menu; see [`AudioLoader::open_menu`].
    Menu(Vec<TrackDescriptor>),
    NoMatches,
    LoadFailed(String),
    QueueFull { limit: usize },
}

/// A track known from an external catalog by title, artists and length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalTrack {
    pub title: String,
    pub artists: Vec<String>,
    pub duration_ms: u64,
}

/// Receives the result of a batch once every load in it has finished.
#[async_trait]
pub trait BatchProgress: Send + Sync {
    async fn finished(&self, loaded: usize, failed: usize);
}

/// Whether a batch was started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchStart {
    Started { total: usize },
    QueueFull { limit: usize },
}

enum Lookup {
    Found {
        tracks: Vec<TrackDescriptor>,
        selected: Option<usize>,
    },
    NoMatches,
    Failed(String),
}

impl Lookup {
    fn from_result(result: LoadResult) -> Self {
        match result {
            LoadResult::Failed(reason) => Self::Failed(reason),
            LoadResult::Playlist(playlist) if !playlist.tracks.is_empty() => Self::Found {
                selected: playlist.selected,
                tracks: playlist.tracks,
            },
            other => match other.into_candidates() {
                Some(tracks) if !tracks.is_empty() => Self::Found { tracks, selected: None },
                _ => Self::NoMatches,
            },
        }
    }
}

/// Countdown shared by the loads of one batch.
struct BatchLatch {
    remaining: AtomicUsize,
    loaded: AtomicUsize,
    failed: AtomicUsize,
    progress: Arc<dyn BatchProgress>,
}

impl BatchLatch {
    async fn count_down(&self, success: bool) {
        if success {
            self.loaded.fetch_add(1, Ordering::AcqRel);
        } else {
            self.failed.fetch_add(1, Ordering::AcqRel);
        }
        // Last one out reports.
        if self.remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
            let loaded = self.loaded.load(Ordering::Acquire);
            let failed = self.failed.load(Ordering::Acquire);
            self.progress.finished(loaded, failed).await;
        }
    }
}

/// Resolves queries and delivers the results to guild queues.
#[derive(Clone)]
pub struct AudioLoader {
    players: Arc<MusicPlayerManager>,
    song_cache: SongCacheWrapper,
    premium: PremiumGuildWrapper,
    primary: Arc<dyn SearchBackend>,
    fallback: Arc<dyn SearchBackend>,
    config: Arc<MusicConfig>,
}

impl AudioLoader {
    pub fn new(
        players: Arc<MusicPlayerManager>,
        song_cache: SongCacheWrapper,
        premium: PremiumGuildWrapper,
        primary: Arc<dyn SearchBackend>,
        fallback: Arc<dyn SearchBackend>,
        config: MusicConfig,
    ) -> Self {
        info!(
            primary = primary.name(),
            fallback = fallback.name(),
            "Audio loader ready"
        );
        Self {
            players,
            song_cache,
            premium,
            primary,
            fallback,
            config: Arc::new(config),
        }
    }

    pub fn players(&self) -> &Arc<MusicPlayerManager> {
        &self.players
    }

    /// Queue capacity for a guild, by premium status.
    pub async fn queue_limit(&self, guild_id: u64) -> usize {
        match self.premium.is_premium(guild_id).await {
            Ok(true) => self.config.premium_queue_limit,
            Ok(false) => self.config.queue_limit,
            Err(err) => {
                warn!(guild_id, error = %err, "Premium lookup failed, using standard queue limit");
                self.config.queue_limit
            }
        }
    }

    /// Resolve `raw_query` and deliver the result according to `mode`.
    pub async fn load(
        &self,
        ctx: &RequestContext,
        raw_query: &str,
        mode: LoadMode,
        position: NextSongPosition,
    ) -> PlayOutcome {
        let player = self.players.get_or_create(ctx.guild_id);
        let limit = self.queue_limit(ctx.guild_id).await;
        if player.queue.is_full(1, limit) {
            return PlayOutcome::QueueFull { limit };
        }

        let (source, query) = SearchSource::parse(raw_query);
        if query.is_empty() {
            return PlayOutcome::NoMatches;
        }

        if mode == LoadMode::First {
            match self.song_cache.get_track_info(raw_query).await {
                Ok(Some(track)) => {
                    debug!(guild_id = ctx.guild_id, query = raw_query, "Song cache hit");
                    return self.deliver_single(ctx, &player, raw_query, track, position, limit).await;
                }
                Ok(None) => {}
                Err(err) => warn!(error = %err, "Song cache lookup failed, searching instead"),
            }
        }

        match self.lookup(source, query).await {
            Lookup::Found { tracks, selected } => match mode {
                LoadMode::First => {
                    let index = selected.unwrap_or(0);
                    let Some(track) = tracks.into_iter().nth(index) else {
                        return PlayOutcome::NoMatches;
                    };
                    self.deliver_single(ctx, &player, raw_query, track, position, limit).await
                }
                LoadMode::Playlist => {
                    let items: Vec<QueuedTrack> = tracks
                        .into_iter()
                        .take(self.config.playlist_limit)
                        .map(|track| QueuedTrack::new(track, ctx.user_data()))
                        .collect();
                    let (accepted, rejected) = player.queue.queue_many(items, position, limit);
                    info!(guild_id = ctx.guild_id, accepted, rejected, "Queued playlist");
                    PlayOutcome::QueuedMany { accepted, rejected }
                }
                LoadMode::Pick => {
                    PlayOutcome::Menu(tracks.into_iter().take(self.config.menu_size).collect())
                }
            },
            Lookup::NoMatches => PlayOutcome::NoMatches,
            Lookup::Failed(reason) => PlayOutcome::LoadFailed(reason),
        }
    }

    /// Register a pick menu shown in message `message_id`.
    pub fn open_menu(&self, ctx: &RequestContext, message_id: u64, tracks: Vec<TrackDescriptor>, position: NextSongPosition) {
        let player = self.players.get_or_create(ctx.guild_id);
        player.open_menu(
            message_id,
            SearchMenu {
                requester_id: ctx.user_id,
                tracks,
                position,
            },
        );
    }

    /// Queue entry `index` of a menu. `None` when the menu expired, belongs
    /// to someone else or has no such entry.
    pub async fn choose_from_menu(&self, ctx: &RequestContext, message_id: u64, index: usize) -> Option<PlayOutcome> {
        let player = self.players.get(ctx.guild_id)?;
        let menu = player.take_menu(message_id, ctx.user_id)?;
        let track = menu.tracks.into_iter().nth(index)?;

        let limit = self.queue_limit(ctx.guild_id).await;
        Some(match player.queue.safe_queue(QueuedTrack::new(track.clone(), ctx.user_data()), menu.position, limit) {
            Some(position) => PlayOutcome::Queued { track, position },
            None => PlayOutcome::QueueFull { limit },
        })
    }

    /// Dismiss a menu without queueing anything.
    pub fn cancel_menu(&self, ctx: &RequestContext, message_id: u64) -> bool {
        self.players
            .get(ctx.guild_id)
            .and_then(|player| player.take_menu(message_id, ctx.user_id))
            .is_some()
    }

    /// Find and queue the closest match for an externally catalogued track.
    ///
    /// Tries the chosen source with artists, then without, then the other
    /// source by title alone.
    pub async fn load_external_track(
        &self,
        ctx: &RequestContext,
        track: &ExternalTrack,
        source: SearchSource,
        position: NextSongPosition,
    ) -> PlayOutcome {
        let player = self.players.get_or_create(ctx.guild_id);
        let limit = self.queue_limit(ctx.guild_id).await;
        if player.queue.is_full(1, limit) {
            return PlayOutcome::QueueFull { limit };
        }
        self.load_external_into(ctx, &player, track, source, position, limit).await
    }

    /// Load many external tracks concurrently. `progress` hears back once,
    /// after the last of them finished.
    pub async fn load_external_batch(
        &self,
        ctx: &RequestContext,
        tracks: Vec<ExternalTrack>,
        source: SearchSource,
        position: NextSongPosition,
        progress: Arc<dyn BatchProgress>,
    ) -> BatchStart {
        let player = self.players.get_or_create(ctx.guild_id);
        let limit = self.queue_limit(ctx.guild_id).await;
        if player.queue.is_full(tracks.len(), limit) {
            return BatchStart::QueueFull { limit };
        }

        let total = tracks.len();
        if total == 0 {
            progress.finished(0, 0).await;
            return BatchStart::Started { total };
        }

        let latch = Arc::new(BatchLatch {
            remaining: AtomicUsize::new(total),
            loaded: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
            progress,
        });

        for track in tracks {
            let loader = self.clone();
            let ctx = ctx.clone();
            let player = Arc::clone(&player);
            let latch = Arc::clone(&latch);

            tokio::spawn(async move {
                let outcome = loader
                    .load_external_into(&ctx, &player, &track, source, position, limit)
                    .await;
                latch.count_down(matches!(outcome, PlayOutcome::Queued { .. })).await;
            });
        }

        debug!(guild_id = ctx.guild_id, total, "External batch started");
        BatchStart::Started { total }
    }

    async fn load_external_into(
        &self,
        ctx: &RequestContext,
        player: &GuildMusicPlayer,
        track: &ExternalTrack,
        source: SearchSource,
        position: NextSongPosition,
        limit: usize,
    ) -> PlayOutcome {
        let title = track.title.trim();
        let mut attempts = Vec::with_capacity(3);
        if !track.artists.is_empty() {
            attempts.push((source, format!("{} {}", title, track.artists.join(", "))));
        }
        attempts.push((source, title.to_string()));
        if source.alternate() != source {
            attempts.push((source.alternate(), title.to_string()));
        }

        for (attempt_source, query) in attempts {
            let tracks = match self.lookup(attempt_source, &query).await {
                Lookup::Found { tracks, .. } => tracks,
                Lookup::NoMatches => continue,
                Lookup::Failed(reason) => return PlayOutcome::LoadFailed(reason),
            };

            let Some(found) = best_match(
                &tracks,
                title,
                track.duration_ms,
                self.config.match_tolerance_ms,
                self.config.match_candidates,
            ) else {
                debug!(?attempt_source, query = %query, "No candidate close enough");
                continue;
            };

            let found = found.clone();
            return match player.queue.safe_queue(QueuedTrack::new(found.clone(), ctx.user_data()), position, limit) {
                Some(position) => PlayOutcome::Queued { track: found, position },
                None => PlayOutcome::QueueFull { limit },
            };
        }

        PlayOutcome::NoMatches
    }

    async fn deliver_single(
        &self,
        ctx: &RequestContext,
        player: &GuildMusicPlayer,
        raw_query: &str,
        track: TrackDescriptor,
        position: NextSongPosition,
        limit: usize,
    ) -> PlayOutcome {
        let Some(at) = player
            .queue
            .safe_queue(QueuedTrack::new(track.clone(), ctx.user_data()), position, limit)
        else {
            return PlayOutcome::QueueFull { limit };
        };

        if let Err(err) = self.song_cache.add_track(raw_query, track.clone()).await {
            warn!(error = %err, "Failed to record song cache hit");
        }
        info!(guild_id = ctx.guild_id, title = %track.title, position = at, "Queued track");
        PlayOutcome::Queued { track, position: at }
    }

    /// Primary search, then fallback resolution.
    async fn lookup(&self, source: SearchSource, query: &str) -> Lookup {
        if self.primary.is_enabled() {
            let primary = match source {
                SearchSource::Link => self
                    .timed(self.primary.resolve(query))
                    .await
                    .map(Lookup::from_result),
                _ => self
                    .timed(self.primary.search(query, source))
                    .await
                    .map(|tracks| Lookup::from_result(LoadResult::SearchResults(tracks))),
            };

            match primary {
                Ok(found @ Lookup::Found { .. }) => return found,
                Ok(failed @ Lookup::Failed(_)) => return failed,
                Ok(Lookup::NoMatches) => debug!(query, "Primary backend found nothing"),
                Err(err) => warn!(backend = self.primary.name(), error = %err, "Primary backend failed"),
            }
        }

        if !self.fallback.is_enabled() {
            return Lookup::NoMatches;
        }

        match self.timed(self.fallback.resolve(&source.identifier(query))).await {
            Ok(result) => Lookup::from_result(result),
            Err(err) => {
                warn!(backend = self.fallback.name(), error = %err, "Fallback backend failed");
                Lookup::Failed(err.to_string())
            }
        }
    }

    async fn timed<T>(&self, call: impl Future<Output = BackendResult<T>>) -> BackendResult<T> {
        let limit = self.config.search_timeout;
        tokio::time::timeout(limit, call)
            .await
            .unwrap_or(Err(BackendError::Timeout(limit.as_millis() as u64)))
    }
}

/// First of the leading `candidates` results whose length is within
/// `tolerance_ms` of the target, or whose title contains the target title.
pub fn best_match<'a>(
    tracks: &'a [TrackDescriptor],
    title: &str,
    duration_ms: u64,
    tolerance_ms: u64,
    candidates: usize,
) -> Option<&'a TrackDescriptor> {
    let wanted = title.to_lowercase();
    tracks.iter().take(candidates).find(|track| {
        track.duration_ms.abs_diff(duration_ms) < tolerance_ms || track.title.to_lowercase().contains(&wanted)
    })
}
