//! Signed block pointers.
//!
//! A node is addressed by a signed 32-bit pointer whose magnitude is the
//! block index and whose sign is the node kind: positive for a leaf,
//! negative for an internal node. Zero means "no block".

use std::fmt;

use crate::common::BlockId;

/// The two node variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Internal,
    Leaf,
}

/// A node's address plus its kind.
///
/// # Example
/// ```
/// use pagedtree::{BlockPointer, NodeKind};
///
/// let p = BlockPointer::internal(7);
/// assert_eq!(p.raw(), -7);
/// assert_eq!(p.kind(), Some(NodeKind::Internal));
/// assert_eq!(p.index(), 7);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockPointer(i32);

impl BlockPointer {
    /// The "no block" pointer.
    pub const NONE: BlockPointer = BlockPointer(0);

    /// Pointer to the leaf stored in block `index`.
    #[inline]
    pub fn leaf(index: u32) -> Self {
        debug_assert!(index > 0 && index <= i32::MAX as u32);
        Self(index as i32)
    }

    /// Pointer to the internal node stored in block `index`.
    #[inline]
    pub fn internal(index: u32) -> Self {
        debug_assert!(index > 0 && index <= i32::MAX as u32);
        Self(-(index as i32))
    }

    /// Pointer of the given kind for block `index`.
    #[inline]
    pub fn new(kind: NodeKind, index: u32) -> Self {
        match kind {
            NodeKind::Leaf => Self::leaf(index),
            NodeKind::Internal => Self::internal(index),
        }
    }

    /// Wrap the on-disk representation.
    #[inline]
    pub fn from_raw(raw: i32) -> Self {
        Self(raw)
    }

    /// The on-disk representation.
    #[inline]
    pub fn raw(self) -> i32 {
        self.0
    }

    #[inline]
    pub fn is_none(self) -> bool {
        self.0 == 0
    }

    /// Node kind, or None for [`NONE`](Self::NONE).
    #[inline]
    pub fn kind(self) -> Option<NodeKind> {
        match self.0 {
            0 => None,
            p if p > 0 => Some(NodeKind::Leaf),
            _ => Some(NodeKind::Internal),
        }
    }

    #[inline]
    pub fn is_leaf(self) -> bool {
        self.0 > 0
    }

    #[inline]
    pub fn is_internal(self) -> bool {
        self.0 < 0
    }

    /// Block index (the magnitude).
    #[inline]
    pub fn index(self) -> u32 {
        self.0.unsigned_abs()
    }

    #[inline]
    pub fn block_id(self) -> BlockId {
        BlockId::new(self.index())
    }
}

impl fmt::Display for BlockPointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind() {
            None => write!(f, "Ptr(NONE)"),
            Some(NodeKind::Leaf) => write!(f, "Leaf({})", self.index()),
            Some(NodeKind::Internal) => write!(f, "Internal({})", self.index()),
        }
    }
}
