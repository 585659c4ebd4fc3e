//! Block store - the file-backed block cache.
//!
//! The [`BlockStore`] provides:
//! - Block caching between the backing file and memory
//! - Pin-based reference counting
//! - Write-through on explicit save, write-back on eviction and sync
//! - LRU eviction of unpinned frames

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use parking_lot::{Mutex, RwLock};
use tracing::{debug, trace};

use crate::buffer::replacer::LruReplacer;
use crate::buffer::frame::Release;
use crate::buffer::{BlockReadGuard, BlockWriteGuard, CacheStats, Frame};
use crate::common::{BlockId, Error, FrameId, Result};
use crate::storage::{Block, BlockFile};

/// A file of fixed-size blocks behind a bounded cache.
///
/// # Architecture
/// ```text
/// ┌─────────────────────────────────────────────────────────────┐
/// │                        BlockStore                           │
/// │  ┌──────────────┐  ┌───────────────────────────────────┐   │
/// │  │ block_table  │  │        frames: Vec<Frame>         │   │
/// │  │BlockId → Fid │─▶│  [Frame0] [Frame1] [Frame2] ...   │   │
/// │  └──────────────┘  └───────────────────────────────────┘   │
/// │  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐      │
/// │  │ free_frames  │  │   replacer   │  │     file     │      │
/// │  │ Vec<FrameId> │  │ LruReplacer  │  │    Mutex     │      │
/// │  └──────────────┘  └──────────────┘  └──────────────┘      │
/// └─────────────────────────────────────────────────────────────┘
/// ```
///
/// # Thread Safety
/// - `block_table`: `RwLock`, many readers, few writers
/// - `free_frames`: `Mutex`, always modified
/// - `replacer`: `Mutex`, internal state changes on access
/// - `file`: `Mutex`, single-threaded I/O
/// - `frames`: No lock, fixed size, each Frame has internal locks
///
/// A thread must not hold a guard while calling [`sync`](Self::sync) or
/// [`truncate`](Self::truncate).
pub struct BlockStore {
    frames: Vec<Frame>,

    block_table: RwLock<HashMap<BlockId, FrameId>>,

    /// Stack of unused frame IDs.
    free_frames: Mutex<Vec<FrameId>>,

    replacer: Mutex<LruReplacer>,

    file: Mutex<BlockFile>,

    stats: CacheStats,

    path: PathBuf,
    block_size: usize,
}

impl BlockStore {
    /// Open (or create) the file at `path` with room for `capacity` cached
    /// blocks.
    ///
    /// # Errors
    /// - `Error::InvalidConfig` if `capacity` is 0
    /// - I/O errors from opening the file
    pub fn open<P: AsRef<Path>>(path: P, block_size: usize, capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(Error::InvalidConfig("cache capacity must be > 0".into()));
        }
        let path = path.as_ref().to_path_buf();
        let file = BlockFile::open(&path, block_size)?;

        let frames: Vec<Frame> = (0..capacity).map(|_| Frame::new(block_size)).collect();
        let free_frames: Vec<FrameId> = (0..capacity).rev().map(FrameId::new).collect();

        debug!(path = %path.display(), block_size, capacity, "opened block store");

        Ok(Self {
            frames,
            block_table: RwLock::new(HashMap::new()),
            free_frames: Mutex::new(free_frames),
            replacer: Mutex::new(LruReplacer::new()),
            file: Mutex::new(file),
            stats: CacheStats::new(),
            path,
            block_size,
        })
    }

    // ========================================================================
    // Public API: Block access
    // ========================================================================

    /// Pin a block for reading.
    ///
    /// A block past the end of the file reads as zeros.
    ///
    /// # Errors
    /// - `Error::NoFreeFrames` if the block is not cached and every frame is pinned
    /// - I/O errors from reading the file or flushing an evicted block
    pub fn get(&self, block_id: BlockId) -> Result<BlockReadGuard<'_>> {
        let frame_id = self.fetch_internal(block_id)?;
        let lock = self.frames[frame_id.0].block();

        Ok(BlockReadGuard::new(self, frame_id, block_id, lock))
    }

    /// Pin a block for writing.
    ///
    /// The guard holds the current bytes of the block; call
    /// [`BlockWriteGuard::save`] to write them back.
    ///
    /// # Errors
    /// Same as [`get`](Self::get).
    pub fn set(&self, block_id: BlockId) -> Result<BlockWriteGuard<'_>> {
        let frame_id = self.fetch_internal(block_id)?;
        let lock = self.frames[frame_id.0].block_mut();

        Ok(BlockWriteGuard::new(self, frame_id, block_id, lock))
    }

    // ========================================================================
    // Public API: Durability and file management
    // ========================================================================

    /// Write every dirty cached block in ascending block order, then fsync.
    pub fn sync(&self) -> Result<()> {
        let mut blocks: Vec<(BlockId, FrameId)> = {
            let table = self.block_table.read();
            table.iter().map(|(&bid, &fid)| (bid, fid)).collect()
        };
        blocks.sort_unstable_by_key(|&(block_id, _)| block_id);

        for (block_id, frame_id) in blocks {
            self.flush_frame(frame_id, block_id)?;
        }

        self.file.lock().sync()
    }

    /// Length of the file in whole blocks (a partial tail counts).
    pub fn size_in_blocks(&self) -> Result<u64> {
        self.file.lock().size_in_blocks()
    }

    /// Empty the file and drop every cached block without writing it.
    ///
    /// # Errors
    /// - `Error::BlockPinned` if any block is still pinned
    pub fn truncate(&self) -> Result<()> {
        let mut table = self.block_table.write();

        if let Some((block_id, _)) = table
            .iter()
            .find(|(_, frame_id)| self.frames[frame_id.0].is_pinned())
        {
            return Err(Error::BlockPinned(block_id.0));
        }

        for frame in &self.frames {
            frame.reset();
        }
        table.clear();
        *self.free_frames.lock() = (0..self.frames.len()).rev().map(FrameId::new).collect();
        *self.replacer.lock() = LruReplacer::new();

        self.file.lock().truncate()?;
        debug!(path = %self.path.display(), "truncated block store");
        Ok(())
    }

    /// Sync and release the store.
    pub fn close(self) -> Result<()> {
        self.sync()?;
        debug!(path = %self.path.display(), "closed block store");
        Ok(())
    }

    /// Release the store and remove its file.
    pub fn delete(self) -> Result<()> {
        debug!(path = %self.path.display(), "deleting block store");
        self.file.into_inner().delete()
    }

    // ========================================================================
    // Public API: Stats and info
    // ========================================================================

    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    /// Number of frames in the cache.
    pub fn capacity(&self) -> usize {
        self.frames.len()
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn free_frame_count(&self) -> usize {
        self.free_frames.lock().len()
    }

    /// Number of blocks currently cached.
    pub fn cached_block_count(&self) -> usize {
        self.block_table.read().len()
    }

    pub fn is_cached(&self, block_id: BlockId) -> bool {
        self.block_table.read().contains_key(&block_id)
    }

    // ========================================================================
    // Internal: Called by guards
    // ========================================================================

    /// Hand a frame back. Called by the guards on drop.
    pub(crate) fn release(&self, frame_id: FrameId, how: Release) {
        if self.frames[frame_id.0].release(how) {
            self.replacer.lock().set_evictable(frame_id, true);
        }
    }

    /// Write a block the caller holds locked. Called by `BlockWriteGuard::save`.
    pub(crate) fn write_through(
        &self,
        frame_id: FrameId,
        block_id: BlockId,
        block: &Block,
    ) -> Result<()> {
        self.file.lock().write_block(block_id, block)?;
        CacheStats::bump(&self.stats.blocks_written);
        Ok(())
    }

    // ========================================================================
    // Internal: Core fetch logic
    // ========================================================================

    fn fetch_internal(&self, block_id: BlockId) -> Result<FrameId> {
        {
            let table = self.block_table.read();
            if let Some(&frame_id) = table.get(&block_id) {
                self.handle_cache_hit(frame_id);
                return Ok(frame_id);
            }
        }

        self.handle_cache_miss(block_id)
    }

    fn handle_cache_hit(&self, frame_id: FrameId) {
        self.frames[frame_id.0].pin();

        {
            let mut replacer = self.replacer.lock();
            replacer.record_access(frame_id);
            replacer.set_evictable(frame_id, false);
        }

        CacheStats::bump(&self.stats.cache_hits);
    }

    fn handle_cache_miss(&self, block_id: BlockId) -> Result<FrameId> {
        CacheStats::bump(&self.stats.cache_misses);

        let frame_id = self.get_free_frame()?;
        let frame = &self.frames[frame_id.0];

        let read = {
            let mut block = frame.block_mut();
            self.file.lock().read_block(block_id, &mut block)
        };
        if let Err(e) = read {
            self.free_frames.lock().push(frame_id);
            return Err(e);
        }
        CacheStats::bump(&self.stats.blocks_read);
        trace!(block = %block_id, frame = %frame_id, "loaded block");

        {
            let mut table = self.block_table.write();
            // Another thread may have loaded the same block meanwhile
            if let Some(&loaded) = table.get(&block_id) {
                self.handle_cache_hit(loaded);
                drop(table);
                self.free_frames.lock().push(frame_id);
                return Ok(loaded);
            }
            frame.load(block_id);
            table.insert(block_id, frame_id);
        }

        {
            let mut replacer = self.replacer.lock();
            replacer.record_access(frame_id);
            replacer.set_evictable(frame_id, false);
        }

        Ok(frame_id)
    }

    // ========================================================================
    // Internal: Frame allocation and eviction
    // ========================================================================

    fn get_free_frame(&self) -> Result<FrameId> {
        if let Some(frame_id) = self.free_frames.lock().pop() {
            return Ok(frame_id);
        }

        self.evict_block()
    }

    /// Evict the least recently used unpinned block and return its frame.
    fn evict_block(&self) -> Result<FrameId> {
        let frame_id = self.replacer.lock().evict().ok_or(Error::NoFreeFrames)?;

        CacheStats::bump(&self.stats.evictions);

        let frame = &self.frames[frame_id.0];
        let old_block_id = frame.block_id();

        if let Some(bid) = old_block_id {
            if let Err(e) = self.flush_frame(frame_id, bid) {
                // Keep the block cached so the dirty bytes are not lost
                let mut replacer = self.replacer.lock();
                replacer.record_access(frame_id);
                replacer.set_evictable(frame_id, true);
                return Err(e);
            }
            self.block_table.write().remove(&bid);
            debug!(block = %bid, frame = %frame_id, "evicted block");
        }

        frame.vacate();

        Ok(frame_id)
    }

    /// Write a frame to the file if dirty.
    fn flush_frame(&self, frame_id: FrameId, block_id: BlockId) -> Result<()> {
        let frame = &self.frames[frame_id.0];

        if frame.is_dirty() {
            let block = frame.block();
            self.file.lock().write_block(block_id, &block)?;
            drop(block);

            frame.mark_clean();
            CacheStats::bump(&self.stats.blocks_written);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const BLOCK: usize = 64;

    fn create_test_store(capacity: usize) -> (BlockStore, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.data");
        (BlockStore::open(&path, BLOCK, capacity).unwrap(), dir)
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let dir = tempdir().unwrap();
        let result = BlockStore::open(dir.path().join("x.data"), BLOCK, 0);
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_unwritten_block_reads_zeros() {
        let (store, _dir) = create_test_store(4);

        let guard = store.get(BlockId::new(7)).unwrap();
        assert!(guard.as_slice().iter().all(|&b| b == 0));
        assert_eq!(guard.block_id(), BlockId::new(7));
    }

    #[test]
    fn test_save_writes_through() {
        let (store, _dir) = create_test_store(4);

        let mut guard = store.set(BlockId::new(2)).unwrap();
        guard.write_i32(0, -5);
        guard.save().unwrap();

        assert_eq!(store.size_in_blocks().unwrap(), 3);
        assert_eq!(store.stats().snapshot().blocks_written, 1);
        assert_eq!(store.get(BlockId::new(2)).unwrap().read_i32(0), -5);
    }

    #[test]
    fn test_cache_hit() {
        let (store, _dir) = create_test_store(4);

        drop(store.get(BlockId::new(1)).unwrap());
        drop(store.get(BlockId::new(1)).unwrap());
        drop(store.get(BlockId::new(1)).unwrap());

        let snapshot = store.stats().snapshot();
        assert_eq!(snapshot.cache_misses, 1);
        assert_eq!(snapshot.cache_hits, 2);
    }

    #[test]
    fn test_unsaved_write_flushed_on_eviction() {
        let (store, _dir) = create_test_store(1);

        {
            let mut guard = store.set(BlockId::new(0)).unwrap();
            guard.write_u32(0, 0x42);
        } // dropped without save: dirty

        // Loading another block evicts block 0, flushing it first
        drop(store.get(BlockId::new(1)).unwrap());
        assert!(!store.is_cached(BlockId::new(0)));

        assert_eq!(store.get(BlockId::new(0)).unwrap().read_u32(0), 0x42);
        assert_eq!(store.stats().snapshot().evictions, 2);
    }

    #[test]
    fn test_lru_victim() {
        let (store, _dir) = create_test_store(2);

        drop(store.get(BlockId::new(1)).unwrap());
        drop(store.get(BlockId::new(2)).unwrap());
        drop(store.get(BlockId::new(1)).unwrap()); // 2 is now least recent

        drop(store.get(BlockId::new(3)).unwrap());

        assert!(store.is_cached(BlockId::new(1)));
        assert!(!store.is_cached(BlockId::new(2)));
        assert!(store.is_cached(BlockId::new(3)));
    }

    #[test]
    fn test_all_pinned_fails() {
        let (store, _dir) = create_test_store(2);

        let _a = store.get(BlockId::new(1)).unwrap();
        let _b = store.get(BlockId::new(2)).unwrap();

        assert!(matches!(store.get(BlockId::new(3)), Err(Error::NoFreeFrames)));
    }

    #[test]
    fn test_pinned_block_survives_eviction_pressure() {
        let (store, _dir) = create_test_store(2);

        let pinned = store.get(BlockId::new(1)).unwrap();
        for i in 2..10 {
            drop(store.get(BlockId::new(i)).unwrap());
        }

        assert!(store.is_cached(BlockId::new(1)));
        drop(pinned);
    }

    #[test]
    fn test_sync_flushes_dirty() {
        let (store, dir) = create_test_store(8);

        for i in (1..5u32).rev() {
            let mut guard = store.set(BlockId::new(i)).unwrap();
            guard.write_u32(0, i * 10);
        }
        assert_eq!(store.size_in_blocks().unwrap(), 0);

        store.sync().unwrap();

        assert_eq!(store.size_in_blocks().unwrap(), 5);
        assert_eq!(store.stats().snapshot().blocks_written, 4);

        let bytes = std::fs::read(dir.path().join("test.data")).unwrap();
        for i in 1..5usize {
            let off = i * BLOCK;
            let v = u32::from_be_bytes(bytes[off..off + 4].try_into().unwrap());
            assert_eq!(v, i as u32 * 10);
        }
    }

    #[test]
    fn test_truncate_discards_cache() {
        let (store, _dir) = create_test_store(4);

        let mut guard = store.set(BlockId::new(3)).unwrap();
        guard.write_u32(0, 1);
        guard.save().unwrap();

        store.truncate().unwrap();

        assert_eq!(store.size_in_blocks().unwrap(), 0);
        assert_eq!(store.cached_block_count(), 0);
        assert_eq!(store.free_frame_count(), 4);
        assert_eq!(store.get(BlockId::new(3)).unwrap().read_u32(0), 0);
    }

    #[test]
    fn test_truncate_with_pinned_block_fails() {
        let (store, _dir) = create_test_store(4);

        let _guard = store.get(BlockId::new(3)).unwrap();
        assert!(matches!(store.truncate(), Err(Error::BlockPinned(3))));
    }

    #[test]
    fn test_close_and_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.data");

        {
            let store = BlockStore::open(&path, BLOCK, 4).unwrap();
            let mut guard = store.set(BlockId::new(1)).unwrap();
            guard.write_u32(8, 0xDEAD_BEEF);
            drop(guard);
            store.close().unwrap();
        }

        let store = BlockStore::open(&path, BLOCK, 4).unwrap();
        assert_eq!(store.get(BlockId::new(1)).unwrap().read_u32(8), 0xDEAD_BEEF);
    }

    #[test]
    fn test_delete_removes_file() {
        let (store, dir) = create_test_store(4);
        store.set(BlockId::new(0)).unwrap().save().unwrap();

        store.delete().unwrap();
        assert!(!dir.path().join("test.data").exists());
    }
}
