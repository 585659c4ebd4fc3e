//! Frame - one slot of the block cache.
//!
//! The block bytes sit behind their own `RwLock` so guards can hold them
//! for as long as they live. Everything the store decides on (which block
//! is loaded, how many guards hold it, whether the file is behind) sits
//! in one small [`Slot`] behind a `Mutex`, so it always changes together.

use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::common::BlockId;
use crate::storage::Block;

/// How a guard gave its frame back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Release {
    /// Shared access; the bytes are unchanged.
    Read,
    /// Exclusive access whose bytes `save` wrote through to the file.
    Saved,
    /// Exclusive access dropped without `save`. The cached bytes are now
    /// ahead of the file until a flush.
    Unsaved,
}

#[derive(Debug, Default)]
struct Slot {
    block_id: Option<BlockId>,
    pins: u32,
    dirty: bool,
}

/// A slot of the block cache holding at most one block.
pub struct Frame {
    block: RwLock<Block>,
    slot: Mutex<Slot>,
}

impl Frame {
    /// An empty frame with a zeroed block buffer.
    pub fn new(block_size: usize) -> Self {
        Self {
            block: RwLock::new(Block::new(block_size)),
            slot: Mutex::new(Slot::default()),
        }
    }

    #[inline]
    pub fn block(&self) -> RwLockReadGuard<'_, Block> {
        self.block.read()
    }

    #[inline]
    pub fn block_mut(&self) -> RwLockWriteGuard<'_, Block> {
        self.block.write()
    }

    /// The block currently held, if any.
    pub fn block_id(&self) -> Option<BlockId> {
        self.slot.lock().block_id
    }

    pub fn is_pinned(&self) -> bool {
        self.slot.lock().pins > 0
    }

    /// The cached bytes have not reached the file yet.
    pub fn is_dirty(&self) -> bool {
        self.slot.lock().dirty
    }

    /// Take ownership of `block_id` after its bytes were read in, pinned
    /// once for the guard that asked for it.
    pub(crate) fn load(&self, block_id: BlockId) {
        *self.slot.lock() = Slot {
            block_id: Some(block_id),
            pins: 1,
            dirty: false,
        };
    }

    pub(crate) fn pin(&self) {
        self.slot.lock().pins += 1;
    }

    /// Drop one pin. Returns true when no guard holds the frame anymore.
    ///
    /// # Panics
    /// Panics if the frame is not pinned.
    pub(crate) fn release(&self, how: Release) -> bool {
        let mut slot = self.slot.lock();
        assert!(slot.pins > 0, "pin count underflow");

        match how {
            Release::Read => {}
            Release::Saved => slot.dirty = false,
            Release::Unsaved => slot.dirty = true,
        }
        slot.pins -= 1;
        slot.pins == 0
    }

    /// Record that a flush wrote the cached bytes.
    pub(crate) fn mark_clean(&self) {
        self.slot.lock().dirty = false;
    }

    /// Forget the held block so the frame can take another one.
    pub(crate) fn vacate(&self) {
        let mut slot = self.slot.lock();
        slot.block_id = None;
        slot.dirty = false;
    }

    /// Empty the frame and zero its bytes, discarding any unflushed write.
    pub fn reset(&self) {
        self.block_mut().reset();
        *self.slot.lock() = Slot::default();
    }
}
