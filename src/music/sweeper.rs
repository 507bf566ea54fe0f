//! Periodic reconciliation of music sessions against voice state.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use super::player::MusicPlayerManager;
use crate::tasks::{ServiceHandle, spawn_periodic};

/// What the gateway knows about guilds and voice connections.
pub trait VoiceConnections: Send + Sync {
    fn guild_exists(&self, guild_id: u64) -> bool;

    /// Voice channel the bot is connected to in this guild.
    fn connected_channel(&self, guild_id: u64) -> Option<u64>;
}

/// Drops sessions whose guild or voice connection is gone.
pub struct SessionSweeper {
    players: Arc<MusicPlayerManager>,
    voice: Arc<dyn VoiceConnections>,
}

impl SessionSweeper {
    pub fn new(players: Arc<MusicPlayerManager>, voice: Arc<dyn VoiceConnections>) -> Self {
        Self { players, voice }
    }

    /// One pass. Returns how many sessions were removed.
    pub fn sweep(&self) -> usize {
        let mut removed = 0;
        for guild_id in self.players.guild_ids() {
            let stale = !self.voice.guild_exists(guild_id) || self.voice.connected_channel(guild_id).is_none();
            if stale && self.players.remove(guild_id) {
                debug!(guild_id, "Removed stale music session");
                removed += 1;
            }
        }
        if removed > 0 {
            info!("Voice sweep removed {} sessions", removed);
        }
        removed
    }

    /// Run [`sweep`](Self::sweep) every `period`.
    pub fn start(self: Arc<Self>, period: Duration) -> ServiceHandle {
        spawn_periodic("voice_sweeper", period, move || {
            let sweeper = Arc::clone(&self);
            async move {
                sweeper.sweep();
            }
        })
    }
}
