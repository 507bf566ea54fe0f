//! Music sessions and the track loading pipeline.

pub mod backend;
mod loader;
mod player;
mod queue;
mod sweeper;
mod track;

pub use backend::{DisabledBackend, LavalinkBackend, SearchBackend, SearchSource};
pub use loader::{
    AudioLoader, BatchProgress, BatchStart, ExternalTrack, LoadMode, PlayOutcome, RequestContext, best_match,
};
pub use player::{GuildMusicPlayer, MusicPlayerManager, SearchMenu};
pub use queue::{GuildTrackQueue, NextSongPosition};
pub use sweeper::{SessionSweeper, VoiceConnections};
pub use track::{LoadResult, Playlist, QueuedTrack, TrackDescriptor, TrackUserData};
