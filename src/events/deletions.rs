//! Memory of message deletions the bot caused itself.
//!
//! Purge commands and bot cleanups mark the ids they are about to delete.
//! The deletion listener then claims them to tell its own deletions apart
//! from everyone else's. Unclaimed marks fade after a fixed time.

use std::time::Duration;

use tracing::debug;

use crate::cache::{CacheConfig, TypedCache};

/// Who removed a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeletionOrigin {
    /// A purge issued by this user.
    Purge { by: u64 },
    /// The bot cleaning up after itself.
    Bot,
    Unknown,
}

/// Time-bounded sets of purged and bot-deleted message ids.
#[derive(Clone)]
pub struct DeletionRegistry {
    purged: TypedCache<u64, u64>,
    bot_deleted: TypedCache<u64, ()>,
}

impl DeletionRegistry {
    pub fn new(memory: Duration) -> Self {
        Self {
            purged: TypedCache::new("purged_messages", CacheConfig::ephemeral(memory)),
            bot_deleted: TypedCache::new("bot_deleted_messages", CacheConfig::ephemeral(memory)),
        }
    }

    pub fn mark_purged(&self, message_ids: &[u64], by: u64) {
        for &id in message_ids {
            self.purged.insert(id, by);
        }
        debug!(count = message_ids.len(), by, "Marked purged messages");
    }

    pub fn mark_bot_deleted(&self, message_id: u64) {
        self.bot_deleted.insert(message_id, ());
    }

    /// Origin of a single deletion. A claimed id is forgotten.
    pub fn claim(&self, message_id: u64) -> DeletionOrigin {
        if let Some(by) = self.purged.remove(&message_id) {
            return DeletionOrigin::Purge { by };
        }
        if self.bot_deleted.remove(&message_id).is_some() {
            return DeletionOrigin::Bot;
        }
        DeletionOrigin::Unknown
    }

    /// Origin of a bulk deletion: known only when every id carries the same
    /// kind of mark. Purge marks among the ids are dropped either way.
    pub fn claim_bulk(&self, message_ids: &[u64]) -> DeletionOrigin {
        if message_ids.is_empty() {
            return DeletionOrigin::Unknown;
        }

        if message_ids.iter().all(|id| self.purged.contains(id)) {
            let by = message_ids
                .iter()
                .filter_map(|id| self.purged.remove(id))
                .next();
            for id in message_ids {
                self.purged.invalidate(id);
            }
            return match by {
                Some(by) => DeletionOrigin::Purge { by },
                None => DeletionOrigin::Unknown,
            };
        }

        for id in message_ids {
            self.purged.invalidate(id);
        }

        if message_ids.iter().all(|id| self.bot_deleted.contains(id)) {
            for id in message_ids {
                self.bot_deleted.invalidate(id);
            }
            return DeletionOrigin::Bot;
        }

        DeletionOrigin::Unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> DeletionRegistry {
        DeletionRegistry::new(Duration::from_secs(60))
    }

    #[test]
    fn test_claim_forgets() {
        let registry = registry();
        registry.mark_purged(&[1], 42);
        registry.mark_bot_deleted(2);

        assert_eq!(registry.claim(1), DeletionOrigin::Purge { by: 42 });
        assert_eq!(registry.claim(1), DeletionOrigin::Unknown);
        assert_eq!(registry.claim(2), DeletionOrigin::Bot);
        assert_eq!(registry.claim(3), DeletionOrigin::Unknown);
    }

    #[test]
    fn test_bulk_needs_every_id() {
        let registry = registry();
        registry.mark_purged(&[1, 2], 7);
        assert_eq!(registry.claim_bulk(&[1, 2, 3]), DeletionOrigin::Unknown);
        // Purge marks were dropped by the failed claim.
        assert_eq!(registry.claim(1), DeletionOrigin::Unknown);

        registry.mark_purged(&[4, 5], 7);
        assert_eq!(registry.claim_bulk(&[4, 5]), DeletionOrigin::Purge { by: 7 });

        registry.mark_bot_deleted(8);
        registry.mark_bot_deleted(9);
        assert_eq!(registry.claim_bulk(&[8, 9]), DeletionOrigin::Bot);
        assert_eq!(registry.claim(8), DeletionOrigin::Unknown);
    }

    #[test]
    fn test_marks_expire() {
        let registry = DeletionRegistry::new(Duration::from_millis(50));
        registry.mark_bot_deleted(1);
        registry.mark_purged(&[2], 9);
        registry.mark_purged(&[3, 4], 9);
        std::thread::sleep(Duration::from_millis(120));

        assert_eq!(registry.claim(1), DeletionOrigin::Unknown);
        assert_eq!(registry.claim(2), DeletionOrigin::Unknown);
        assert_eq!(registry.claim_bulk(&[3, 4]), DeletionOrigin::Unknown);
    }
}
