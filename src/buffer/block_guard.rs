//! RAII guards for block access.
//!
//! - [`BlockReadGuard`] - Shared read access
//! - [`BlockWriteGuard`] - Exclusive write access, persisted with [`BlockWriteGuard::save`]
//!
//! Both guards unpin the frame when dropped.

use std::ops::{Deref, DerefMut};

use parking_lot::{RwLockReadGuard, RwLockWriteGuard};
use tracing::warn;

use crate::common::{BlockId, FrameId, Result};
use crate::storage::Block;

use super::block_store::BlockStore;
use super::frame::Release;

/// Guard for read-only block access.
///
/// # Example
/// ```ignore
/// let guard = store.get(block_id)?;
/// let pointer = guard.read_i32(0);
/// // guard drops here, frame unpinned
/// ```
pub struct BlockReadGuard<'a> {
    store: &'a BlockStore,
    frame_id: FrameId,
    block_id: BlockId,
    lock: RwLockReadGuard<'a, Block>,
}

impl<'a> BlockReadGuard<'a> {
    pub(crate) fn new(
        store: &'a BlockStore,
        frame_id: FrameId,
        block_id: BlockId,
        lock: RwLockReadGuard<'a, Block>,
    ) -> Self {
        Self {
            store,
            frame_id,
            block_id,
            lock,
        }
    }

    #[inline]
    pub fn block_id(&self) -> BlockId {
        self.block_id
    }
}

impl Deref for BlockReadGuard<'_> {
    type Target = Block;

    #[inline]
    fn deref(&self) -> &Block {
        &self.lock
    }
}

impl Drop for BlockReadGuard<'_> {
    fn drop(&mut self) {
        self.store.release(self.frame_id, Release::Read);
    }
}

/// Guard for exclusive write access to a block.
///
/// Changes reach the file when [`save`](Self::save) is called. A guard
/// dropped without saving leaves its frame dirty; the bytes are written on
/// eviction or on the next [`BlockStore::sync`].
///
/// # Example
/// ```ignore
/// let mut guard = store.set(block_id)?;
/// guard.write_i32(0, 7);
/// guard.save()?;
/// ```
pub struct BlockWriteGuard<'a> {
    store: &'a BlockStore,
    frame_id: FrameId,
    block_id: BlockId,
    lock: RwLockWriteGuard<'a, Block>,
    release: Release,
}

impl<'a> BlockWriteGuard<'a> {
    pub(crate) fn new(
        store: &'a BlockStore,
        frame_id: FrameId,
        block_id: BlockId,
        lock: RwLockWriteGuard<'a, Block>,
    ) -> Self {
        Self {
            store,
            frame_id,
            block_id,
            lock,
            release: Release::Unsaved,
        }
    }

    #[inline]
    pub fn block_id(&self) -> BlockId {
        self.block_id
    }

    /// Write the block through to the file and release it.
    ///
    /// The write is not fsynced; durability comes from [`BlockStore::sync`].
    pub fn save(mut self) -> Result<()> {
        self.store
            .write_through(self.frame_id, self.block_id, &self.lock)?;
        self.release = Release::Saved;
        Ok(())
    }
}

impl Deref for BlockWriteGuard<'_> {
    type Target = Block;

    #[inline]
    fn deref(&self) -> &Block {
        &self.lock
    }
}

impl DerefMut for BlockWriteGuard<'_> {
    #[inline]
    fn deref_mut(&mut self) -> &mut Block {
        &mut self.lock
    }
}

impl Drop for BlockWriteGuard<'_> {
    fn drop(&mut self) {
        if self.release == Release::Unsaved {
            warn!(block = %self.block_id, "write guard dropped without save, block left dirty");
        }
        self.store.release(self.frame_id, self.release);
    }
}
