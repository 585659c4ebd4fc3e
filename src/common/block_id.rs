//! Block identifier type.

use std::fmt;

/// Identifies a block of the backing file by its index.
///
/// Block `N` lives at byte offset `N × block_size`. Block 0 is reserved for
/// the tree metadata, so node blocks are numbered from 1.
///
/// The tree's signed node pointers are mapped onto a `BlockId` by dropping
/// the sign; the store itself knows nothing about node kinds.
///
/// # Example
/// ```
/// use pagedtree::BlockId;
///
/// let block_id = BlockId::new(42);
/// assert!(!block_id.is_meta());
/// assert_eq!(block_id.0, 42);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub u32);

impl BlockId {
    /// The metadata block.
    pub const META: BlockId = BlockId(0);

    /// Create a new BlockId.
    #[inline]
    pub fn new(id: u32) -> Self {
        BlockId(id)
    }

    /// Whether this is the reserved metadata block.
    #[inline]
    pub fn is_meta(&self) -> bool {
        *self == Self::META
    }

    /// Byte offset of this block in a file of `block_size` blocks.
    #[inline]
    pub fn offset(&self, block_size: usize) -> u64 {
        u64::from(self.0) * block_size as u64
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_meta() {
            write!(f, "Block(META)")
        } else {
            write!(f, "Block({})", self.0)
        }
    }
}
