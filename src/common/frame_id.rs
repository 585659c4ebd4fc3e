//! Frame identifier type.

use std::fmt;

/// Identifies a slot of the block cache.
///
/// Frames live in a fixed `Vec<Frame>` sized at open time, so the id is a
/// plain `usize` index: `frames[frame_id.0]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameId(pub usize);

impl FrameId {
    #[inline]
    pub fn new(id: usize) -> Self {
        FrameId(id)
    }
}

impl fmt::Display for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Frame({})", self.0)
    }
}
