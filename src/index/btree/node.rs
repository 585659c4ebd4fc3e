//! B+ tree node types and the block header they share.
//!
//! Every node block starts with the same 8-byte header:
//! ```text
//! ┌──────────────────┬────────────────────┬──────────────────────────┐
//! │ pointer (i32 BE) │ allocated (i32 BE) │ body (variant-specific)  │
//! └──────────────────┴────────────────────┴──────────────────────────┘
//! ```
//! The pointer repeats the node's own address, so its sign tells the
//! variant. A freed block carries pointer 0 and an `allocated` of
//! [`DELETED`] until it is reused.

use bytes::Buf;

use crate::common::{Error, Result};
use crate::storage::Block;

use super::internal::InternalNode;
use super::leaf::LeafNode;
use super::pointer::{BlockPointer, NodeKind};
use super::Codec;

/// Size of the shared node header.
pub const NODE_HEADER_SIZE: usize = 8;

/// `allocated` value of a freed block.
pub const DELETED: i32 = i32::MIN;

/// Operations common to both node variants.
///
/// Keys occupy `keys()[0..allocated)` in ascending order. A node may hold
/// one key more than its capacity between an insertion and the split that
/// follows; it is never persisted in that state.
pub trait Node<K: Ord> {
    /// The node's own address.
    fn pointer(&self) -> BlockPointer;

    fn keys(&self) -> &[K];

    /// Maximum keys the node holds once persisted (the tree order).
    fn capacity(&self) -> usize;

    /// Remove slot `index`, shifting later slots left.
    fn remove(&mut self, index: usize);

    /// Separator to promote after this node became the right half of a
    /// split. See the variant impls for what is left behind.
    fn split_left_shift_keys(&mut self) -> Option<K>;

    #[inline]
    fn allocated(&self) -> usize {
        self.keys().len()
    }

    /// `Ok(i)` if `key` is at slot `i`, else `Err(i)` with `i` the
    /// insertion point.
    #[inline]
    fn binary_search(&self, key: &K) -> std::result::Result<usize, usize> {
        self.keys().binary_search(key)
    }

    #[inline]
    fn is_full(&self) -> bool {
        self.allocated() >= self.capacity()
    }

    /// Holds more keys than it may be persisted with.
    #[inline]
    fn is_overflowing(&self) -> bool {
        self.allocated() > self.capacity()
    }

    #[inline]
    fn is_empty(&self) -> bool {
        self.allocated() == 0
    }
}

/// Either node variant, as read from a block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeNode<K, V> {
    Internal(InternalNode<K>),
    Leaf(LeafNode<K, V>),
}

impl<K, V> TreeNode<K, V>
where
    K: Ord + Clone + Codec,
    V: Codec,
{
    /// Decode the node addressed by `pointer`, picking the variant from the
    /// pointer's sign.
    pub fn read_from(block: &Block, pointer: BlockPointer, capacity: usize) -> Result<Self> {
        match pointer.kind() {
            Some(NodeKind::Leaf) => Ok(Self::Leaf(LeafNode::read_from(block, pointer, capacity)?)),
            Some(NodeKind::Internal) => Ok(Self::Internal(InternalNode::read_from(
                block, pointer, capacity,
            )?)),
            None => Err(Error::Structural("null node pointer".into())),
        }
    }

    pub fn pointer(&self) -> BlockPointer {
        match self {
            Self::Internal(node) => node.pointer(),
            Self::Leaf(node) => node.pointer(),
        }
    }
}

/// The shared block header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeHeader {
    pub pointer: BlockPointer,
    pub allocated: i32,
}

impl NodeHeader {
    pub fn read(block: &Block) -> Result<Self> {
        let mut buf = block.as_slice();
        if buf.len() < NODE_HEADER_SIZE {
            return Err(Error::Decode("block shorter than node header".into()));
        }
        let pointer = BlockPointer::from_raw(buf.get_i32());
        let allocated = buf.get_i32();
        Ok(Self { pointer, allocated })
    }

    /// Freed and not yet reused.
    #[inline]
    pub fn is_deleted(&self) -> bool {
        self.allocated == DELETED
    }

    /// Overwrite `block` with the freed-block marker.
    pub fn write_tombstone(block: &mut Block) {
        block.reset();
        block.write_i32(0, BlockPointer::NONE.raw());
        block.write_i32(4, DELETED);
    }
}

/// Validate the header of the block `expected` resolved to and return the
/// key count and the body that follows the header.
pub(crate) fn read_header(
    block: &Block,
    expected: BlockPointer,
    capacity: usize,
) -> Result<(usize, &[u8])> {
    let header = NodeHeader::read(block)?;

    if header.is_deleted() {
        return Err(Error::Structural(format!("{expected} refers to a freed block")));
    }
    if header.pointer != expected {
        return Err(Error::Structural(format!(
            "{expected} resolved to a block holding {}",
            header.pointer
        )));
    }
    if header.allocated < 0 || header.allocated as usize > capacity {
        return Err(Error::Structural(format!(
            "{expected} has {} keys, capacity is {capacity}",
            header.allocated
        )));
    }

    Ok((header.allocated as usize, &block.as_slice()[NODE_HEADER_SIZE..]))
}

/// Copy an encoded node into its block.
pub(crate) fn store_encoded(encoded: &[u8], block: &mut Block) -> Result<()> {
    if encoded.len() > block.size() {
        return Err(Error::NodeTooLarge {
            needed: encoded.len(),
            block_size: block.size(),
        });
    }
    block.fill_from(encoded);
    Ok(())
}

/// Decode `count` consecutive items from `body`.
pub(crate) fn decode_many<T: Codec>(body: &mut &[u8], count: usize) -> Result<Vec<T>> {
    let mut items = Vec::with_capacity(count);
    for _ in 0..count {
        items.push(T::decode(body)?);
    }
    Ok(items)
}

/// Largest encoded node for the given key/value bounds, if both are bounded.
pub fn max_node_size<K: Codec, V: Codec>(capacity: usize) -> Option<usize> {
    let key = K::max_encoded_len()?;
    let value = V::max_encoded_len()?;
    let leaf = capacity
        .saturating_mul(key + value)
        .saturating_add(LeafNode::<K, V>::HEADER_SIZE);
    let internal = capacity
        .saturating_mul(key + 4)
        .saturating_add(NODE_HEADER_SIZE + 4);
    Some(leaf.max(internal))
}
