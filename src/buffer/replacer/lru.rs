//! LRU (Least Recently Used) replacement policy.

use std::collections::{BTreeMap, HashMap, HashSet};

use crate::common::FrameId;

/// Evicts the evictable frame whose last access is oldest.
///
/// Every access stamps the frame with a logical clock value; `history`
/// orders frames by stamp so the victim search walks from the oldest.
/// Pinned frames stay in the history but are skipped.
#[derive(Debug, Default)]
pub struct LruReplacer {
    clock: u64,
    /// Stamp → frame, oldest first.
    history: BTreeMap<u64, FrameId>,
    /// Frame → its current stamp in `history`.
    stamps: HashMap<FrameId, u64>,
    /// Frames whose pin count is 0.
    evictable: HashSet<FrameId>,
}

impl LruReplacer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that a frame was accessed, making it the most recent.
    pub fn record_access(&mut self, frame_id: FrameId) {
        self.clock += 1;
        if let Some(old) = self.stamps.insert(frame_id, self.clock) {
            self.history.remove(&old);
        }
        self.history.insert(self.clock, frame_id);
    }

    pub fn set_evictable(&mut self, frame_id: FrameId, evictable: bool) {
        if evictable {
            self.evictable.insert(frame_id);
        } else {
            self.evictable.remove(&frame_id);
        }
    }

    /// Select and forget the least recently used evictable frame.
    ///
    /// Returns None if every tracked frame is pinned.
    pub fn evict(&mut self) -> Option<FrameId> {
        let (&stamp, &frame_id) = self
            .history
            .iter()
            .find(|(_, frame_id)| self.evictable.contains(frame_id))?;

        self.history.remove(&stamp);
        self.stamps.remove(&frame_id);
        self.evictable.remove(&frame_id);
        Some(frame_id)
    }
}
