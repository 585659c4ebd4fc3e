//! Tree metadata stored in block 0.
//!
//! The metadata block records the tree-wide counters plus enough format
//! information to refuse a file written with a different configuration, and
//! a clean flag that tells an orderly shutdown apart from a crash.

use crate::common::{Error, Result, TreeConfig};
use crate::storage::Block;

/// Leading format sentinel.
pub const MAGIC_1: u32 = 0x42D6_AECB;

/// Trailing format sentinel.
pub const MAGIC_2: u32 = 0x6B70_8B42;

/// Value of the clean byte after an orderly shutdown. Anything else is dirty.
pub const CLEAN_MARK: u8 = 0xEA;

/// Metadata field offsets.
///
/// # Layout (53 bytes, big-endian)
/// ```text
/// Offset  Size  Field
/// ------  ----  -----
/// 0       4     magic-1
/// 4       4     block size
/// 8       4     leaf branching bound (M/2)
/// 12      4     internal branching bound (M/2)
/// 16      4     next block counter
/// 20      4     root pointer
/// 24      4     head pointer (leftmost leaf)
/// 28      4     last pointer (rightmost leaf)
/// 32      4     element count
/// 36      4     height
/// 40      4     max internal nodes ever allocated
/// 44      4     max leaf nodes ever allocated
/// 48      1     clean flag
/// 49      4     magic-2
/// ```
mod offsets {
    pub const MAGIC_1: usize = 0;
    pub const BLOCK_SIZE: usize = 4;
    pub const LEAF_BOUND: usize = 8;
    pub const INTERNAL_BOUND: usize = 12;
    pub const NEXT_BLOCK: usize = 16;
    pub const ROOT: usize = 20;
    pub const HEAD: usize = 24;
    pub const LAST: usize = 28;
    pub const ELEMENTS: usize = 32;
    pub const HEIGHT: usize = 36;
    pub const MAX_INTERNAL_NODES: usize = 40;
    pub const MAX_LEAF_NODES: usize = 44;
    pub const CLEAN: usize = 48;
    pub const MAGIC_2: usize = 49;
}

/// Size of the metadata record in bytes.
pub const META_SIZE: usize = offsets::MAGIC_2 + 4;

/// Tree-wide state persisted in block 0.
///
/// Pointers are kept in their signed on-disk form (positive = leaf,
/// negative = internal, 0 = none).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TreeMeta {
    pub block_size: u32,
    pub leaf_bound: u32,
    pub internal_bound: u32,
    /// Highest block index handed out so far.
    pub next_block: u32,
    pub root: i32,
    pub head: i32,
    pub last: i32,
    pub elements: u32,
    pub height: u32,
    pub max_internal_nodes: u32,
    pub max_leaf_nodes: u32,
    pub clean: bool,
}

impl TreeMeta {
    /// Empty metadata for a store opened with `config`.
    pub fn new(config: &TreeConfig) -> Self {
        Self {
            block_size: config.block_size as u32,
            leaf_bound: config.branching_bound(),
            internal_bound: config.branching_bound(),
            ..Self::default()
        }
    }

    /// Decode and sanity-check the metadata block.
    ///
    /// The clean flag is returned as read; refusing a dirty store is the
    /// caller's decision.
    ///
    /// # Errors
    /// `Error::Format` on a magic, block size or branching bound mismatch.
    pub fn read_from(block: &Block, config: &TreeConfig) -> Result<Self> {
        if block.size() < META_SIZE {
            return Err(Error::Format(format!(
                "block of {} bytes cannot hold metadata",
                block.size()
            )));
        }

        let magic1 = block.read_u32(offsets::MAGIC_1);
        if magic1 != MAGIC_1 {
            return Err(Error::Format(format!("bad leading magic {magic1:#010x}")));
        }

        let block_size = block.read_u32(offsets::BLOCK_SIZE);
        if block_size as usize != config.block_size {
            return Err(Error::Format(format!(
                "block size {} != configured {}",
                block_size, config.block_size
            )));
        }

        let expected_bound = config.branching_bound();
        let leaf_bound = block.read_u32(offsets::LEAF_BOUND);
        if leaf_bound != expected_bound {
            return Err(Error::Format(format!(
                "leaf branching bound {leaf_bound} != {expected_bound}"
            )));
        }
        let internal_bound = block.read_u32(offsets::INTERNAL_BOUND);
        if internal_bound != expected_bound {
            return Err(Error::Format(format!(
                "internal branching bound {internal_bound} != {expected_bound}"
            )));
        }

        let magic2 = block.read_u32(offsets::MAGIC_2);
        if magic2 != MAGIC_2 {
            return Err(Error::Format(format!("bad trailing magic {magic2:#010x}")));
        }

        Ok(Self {
            block_size,
            leaf_bound,
            internal_bound,
            next_block: block.read_u32(offsets::NEXT_BLOCK),
            root: block.read_i32(offsets::ROOT),
            head: block.read_i32(offsets::HEAD),
            last: block.read_i32(offsets::LAST),
            elements: block.read_u32(offsets::ELEMENTS),
            height: block.read_u32(offsets::HEIGHT),
            max_internal_nodes: block.read_u32(offsets::MAX_INTERNAL_NODES),
            max_leaf_nodes: block.read_u32(offsets::MAX_LEAF_NODES),
            clean: block.read_u8(offsets::CLEAN) == CLEAN_MARK,
        })
    }

    /// Encode into `block`, zeroing everything after the record.
    pub fn write_to(&self, block: &mut Block) {
        block.reset();
        block.write_u32(offsets::MAGIC_1, MAGIC_1);
        block.write_u32(offsets::BLOCK_SIZE, self.block_size);
        block.write_u32(offsets::LEAF_BOUND, self.leaf_bound);
        block.write_u32(offsets::INTERNAL_BOUND, self.internal_bound);
        block.write_u32(offsets::NEXT_BLOCK, self.next_block);
        block.write_i32(offsets::ROOT, self.root);
        block.write_i32(offsets::HEAD, self.head);
        block.write_i32(offsets::LAST, self.last);
        block.write_u32(offsets::ELEMENTS, self.elements);
        block.write_u32(offsets::HEIGHT, self.height);
        block.write_u32(offsets::MAX_INTERNAL_NODES, self.max_internal_nodes);
        block.write_u32(offsets::MAX_LEAF_NODES, self.max_leaf_nodes);
        block.write_u8(offsets::CLEAN, if self.clean { CLEAN_MARK } else { 0 });
        block.write_u32(offsets::MAGIC_2, MAGIC_2);
    }
}
