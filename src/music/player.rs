//! Guild music sessions.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tracing::debug;

use super::queue::{GuildTrackQueue, NextSongPosition};
use super::track::TrackDescriptor;
use crate::cache::{CacheConfig, TypedCache};

/// A pending "pick one of N" menu.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchMenu {
    pub requester_id: u64,
    pub tracks: Vec<TrackDescriptor>,
    pub position: NextSongPosition,
}

/// State of one guild's music session.
pub struct GuildMusicPlayer {
    guild_id: u64,
    pub queue: GuildTrackQueue,
    search_menus: TypedCache<u64, SearchMenu>,
}

impl GuildMusicPlayer {
    pub fn new(guild_id: u64, menu_ttl: Duration) -> Self {
        Self {
            guild_id,
            queue: GuildTrackQueue::new(),
            search_menus: TypedCache::new(
                format!("search_menus_{guild_id}"),
                CacheConfig::ephemeral(menu_ttl).max_capacity(100),
            ),
        }
    }

    pub fn guild_id(&self) -> u64 {
        self.guild_id
    }

    /// Remember a menu under the id of the message showing it.
    pub fn open_menu(&self, message_id: u64, menu: SearchMenu) {
        self.search_menus.insert(message_id, menu);
    }

    /// Take the menu if `user_id` opened it. Expired menus are gone.
    pub fn take_menu(&self, message_id: u64, user_id: u64) -> Option<SearchMenu> {
        let menu = self.search_menus.get(&message_id)?;
        if menu.requester_id != user_id {
            return None;
        }
        self.search_menus.remove(&message_id)
    }

    pub fn has_menu(&self, message_id: u64) -> bool {
        self.search_menus.contains(&message_id)
    }

    /// Tear the session down.
    pub fn destroy(&self) {
        let dropped = self.queue.clear();
        self.search_menus.invalidate_all();
        debug!(guild_id = self.guild_id, dropped, "Music player destroyed");
    }
}

/// Every live guild session.
pub struct MusicPlayerManager {
    players: DashMap<u64, Arc<GuildMusicPlayer>>,
    menu_ttl: Duration,
}

impl MusicPlayerManager {
    pub fn new(menu_ttl: Duration) -> Self {
        Self {
            players: DashMap::new(),
            menu_ttl,
        }
    }

    pub fn get_or_create(&self, guild_id: u64) -> Arc<GuildMusicPlayer> {
        self.players
            .entry(guild_id)
            .or_insert_with(|| Arc::new(GuildMusicPlayer::new(guild_id, self.menu_ttl)))
            .clone()
    }

    pub fn get(&self, guild_id: u64) -> Option<Arc<GuildMusicPlayer>> {
        self.players.get(&guild_id).map(|p| Arc::clone(p.value()))
    }

    /// Destroy and forget a session. Returns whether one existed.
    pub fn remove(&self, guild_id: u64) -> bool {
        match self.players.remove(&guild_id) {
            Some((_, player)) => {
                player.destroy();
                true
            }
            None => false,
        }
    }

    pub fn guild_ids(&self) -> Vec<u64> {
        self.players.iter().map(|entry| *entry.key()).collect()
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn menu(requester_id: u64) -> SearchMenu {
        SearchMenu {
            requester_id,
            tracks: vec![TrackDescriptor::new("a", 1, "u", "e")],
            position: NextSongPosition::Bottom,
        }
    }

    #[test]
    fn test_only_requester_takes_menu() {
        let player = GuildMusicPlayer::new(1, Duration::from_secs(60));
        player.open_menu(10, menu(5));

        assert_eq!(player.take_menu(10, 6), None);
        assert!(player.has_menu(10));
        assert_eq!(player.take_menu(10, 5), Some(menu(5)));
        assert!(!player.has_menu(10));
    }

    #[test]
    fn test_menu_expires() {
        let player = GuildMusicPlayer::new(1, Duration::from_millis(50));
        player.open_menu(10, menu(5));
        std::thread::sleep(Duration::from_millis(120));
        assert_eq!(player.take_menu(10, 5), None);
    }

    #[test]
    fn test_manager_reuses_player() {
        let manager = MusicPlayerManager::new(Duration::from_secs(60));
        let a = manager.get_or_create(7);
        let b = manager.get_or_create(7);
        assert!(Arc::ptr_eq(&a, &b));
        assert!(manager.remove(7));
        assert!(manager.get(7).is_none());
    }
}
