//! Per-guild track queue.

use std::collections::VecDeque;

use parking_lot::Mutex;

use super::track::QueuedTrack;

/// Where new tracks go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NextSongPosition {
    /// Normal enqueue.
    #[default]
    Bottom,
    /// Play next, ahead of everything already queued.
    Top,
}

/// Ordered tracks of one guild session.
///
/// Every mutation takes the queue-local lock, so a capacity check and the
/// insertion that follows it cannot interleave with another writer.
#[derive(Debug, Default)]
pub struct GuildTrackQueue {
    tracks: Mutex<VecDeque<QueuedTrack>>,
}

impl GuildTrackQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tracks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.lock().is_empty()
    }

    /// Whether `adding` more tracks would exceed `limit`.
    pub fn is_full(&self, adding: usize, limit: usize) -> bool {
        self.len() + adding > limit
    }

    /// Insert without a capacity check.
    pub fn queue(&self, track: QueuedTrack, position: NextSongPosition) {
        let mut tracks = self.tracks.lock();
        match position {
            NextSongPosition::Bottom => tracks.push_back(track),
            NextSongPosition::Top => tracks.push_front(track),
        }
    }

    /// Insert unless the queue already holds `limit` tracks.
    /// Returns the 1-based position of the inserted track.
    pub fn safe_queue(&self, track: QueuedTrack, position: NextSongPosition, limit: usize) -> Option<usize> {
        let mut tracks = self.tracks.lock();
        if tracks.len() >= limit {
            return None;
        }
        match position {
            NextSongPosition::Bottom => {
                tracks.push_back(track);
                Some(tracks.len())
            }
            NextSongPosition::Top => {
                tracks.push_front(track);
                Some(1)
            }
        }
    }

    /// Insert as many tracks as fit under `limit`, keeping their order.
    /// Returns `(accepted, rejected)`.
    pub fn queue_many(
        &self,
        new_tracks: Vec<QueuedTrack>,
        position: NextSongPosition,
        limit: usize,
    ) -> (usize, usize) {
        let mut tracks = self.tracks.lock();
        let room = limit.saturating_sub(tracks.len());
        let total = new_tracks.len();
        let accepted: Vec<QueuedTrack> = new_tracks.into_iter().take(room).collect();
        let count = accepted.len();

        match position {
            NextSongPosition::Bottom => tracks.extend(accepted),
            NextSongPosition::Top => {
                for track in accepted.into_iter().rev() {
                    tracks.push_front(track);
                }
            }
        }
        (count, total - count)
    }

    /// 1-based position of the first queued track with this payload.
    pub fn position_of(&self, encoded: &str) -> Option<usize> {
        self.tracks
            .lock()
            .iter()
            .position(|t| t.track.encoded == encoded)
            .map(|i| i + 1)
    }

    pub fn snapshot(&self) -> Vec<QueuedTrack> {
        self.tracks.lock().iter().cloned().collect()
    }

    /// Remove everything. Returns how many tracks were dropped.
    pub fn clear(&self) -> usize {
        let mut tracks = self.tracks.lock();
        let count = tracks.len();
        tracks.clear();
        count
    }
}
