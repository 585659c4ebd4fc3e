//! Configuration for a paged B+ tree.
//!
//! Constants give the defaults; [`TreeConfig`] carries the values a tree is
//! opened with. The block size and order are also recorded in the metadata
//! block, so reopening a store with a different configuration fails.

use crate::common::{Error, Result};
use crate::storage::META_SIZE;

/// Default size of a block in bytes (4KB).
///
/// Matches the OS page size on most systems, so one block is one page of I/O.
pub const DEFAULT_BLOCK_SIZE: usize = 4096;

/// Default tree order: the maximum number of keys a node holds once persisted.
pub const DEFAULT_ORDER: usize = 128;

/// Default number of frames in the block cache.
pub const DEFAULT_CACHE_CAPACITY: usize = 128;

/// Default high-water mark (in blocks) past which an emptied tree truncates
/// its storage instead of keeping the grown file around.
pub const DEFAULT_RESET_THRESHOLD_BLOCKS: u32 = 4096;

/// Smallest order accepted by [`TreeConfig::validate`].
pub const MIN_ORDER: usize = 3;

/// Runtime configuration of a tree and its block store.
///
/// # Example
/// ```
/// use pagedtree::TreeConfig;
///
/// let config = TreeConfig::default().with_order(4).with_block_size(512);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeConfig {
    /// Size of every block of the backing file.
    pub block_size: usize,
    /// Maximum keys per node (M). A node holding more than this splits.
    pub order: usize,
    /// Frames in the block cache.
    pub cache_capacity: usize,
    /// See [`DEFAULT_RESET_THRESHOLD_BLOCKS`].
    pub reset_threshold_blocks: u32,
}

impl TreeConfig {
    /// Set the block size.
    #[must_use]
    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }

    /// Set the tree order.
    #[must_use]
    pub fn with_order(mut self, order: usize) -> Self {
        self.order = order;
        self
    }

    /// Set the number of cache frames.
    #[must_use]
    pub fn with_cache_capacity(mut self, cache_capacity: usize) -> Self {
        self.cache_capacity = cache_capacity;
        self
    }

    /// Set the empty-tree reset threshold.
    #[must_use]
    pub fn with_reset_threshold_blocks(mut self, blocks: u32) -> Self {
        self.reset_threshold_blocks = blocks;
        self
    }

    /// The per-node branching bound recorded in the metadata block (`M/2`).
    #[inline]
    pub fn branching_bound(&self) -> u32 {
        (self.order / 2) as u32
    }

    /// Check that the values describe a usable store.
    ///
    /// # Errors
    /// Returns `Error::InvalidConfig` naming the offending field.
    pub fn validate(&self) -> Result<()> {
        if self.block_size < META_SIZE {
            return Err(Error::InvalidConfig(format!(
                "block_size {} is smaller than the {} byte metadata block",
                self.block_size, META_SIZE
            )));
        }
        if self.block_size > i32::MAX as usize {
            return Err(Error::InvalidConfig(format!(
                "block_size {} does not fit the 4-byte metadata field",
                self.block_size
            )));
        }
        if self.order < MIN_ORDER || self.order > i32::MAX as usize {
            return Err(Error::InvalidConfig(format!(
                "order {} must be in {}..={}",
                self.order,
                MIN_ORDER,
                i32::MAX
            )));
        }
        if self.cache_capacity == 0 {
            return Err(Error::InvalidConfig(
                "cache_capacity must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            order: DEFAULT_ORDER,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            reset_threshold_blocks: DEFAULT_RESET_THRESHOLD_BLOCKS,
        }
    }
}
