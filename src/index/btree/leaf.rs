//! Leaf nodes.
//!
//! # Block layout
//! ```text
//! pointer (i32) | allocated (i32) | left (i32) | right (i32) | keys[allocated] | values[allocated]
//! ```

use std::iter::Zip;
use std::vec;

use bytes::{Buf, BufMut, BytesMut};

use crate::common::{Error, Result};
use crate::storage::Block;

use super::node::{self, Node, NODE_HEADER_SIZE};
use super::pointer::BlockPointer;
use super::Codec;

/// A leaf: sorted keys, their values, and links to the neighbouring leaves.
///
/// All leaves form a doubly linked list in key order; `left` / `right` are
/// [`BlockPointer::NONE`] at the ends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafNode<K, V> {
    pointer: BlockPointer,
    capacity: usize,
    keys: Vec<K>,
    values: Vec<V>,
    left: BlockPointer,
    right: BlockPointer,
}

impl<K, V> LeafNode<K, V> {
    /// Shared header plus the two sibling pointers.
    pub const HEADER_SIZE: usize = NODE_HEADER_SIZE + 8;
}

impl<K: Ord, V> LeafNode<K, V> {
    /// An empty, unlinked leaf.
    pub fn new(pointer: BlockPointer, capacity: usize) -> Self {
        Self {
            pointer,
            capacity,
            keys: Vec::new(),
            values: Vec::new(),
            left: BlockPointer::NONE,
            right: BlockPointer::NONE,
        }
    }

    #[inline]
    pub fn left(&self) -> BlockPointer {
        self.left
    }

    #[inline]
    pub fn right(&self) -> BlockPointer {
        self.right
    }

    #[inline]
    pub fn set_left(&mut self, left: BlockPointer) {
        self.left = left;
    }

    #[inline]
    pub fn set_right(&mut self, right: BlockPointer) {
        self.right = right;
    }

    #[inline]
    pub fn values(&self) -> &[V] {
        &self.values
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        self.keys.binary_search(key).ok().map(|i| &self.values[i])
    }

    /// Insert at slot `index` (from a failed [`binary_search`](Node::binary_search)).
    pub fn insert_at(&mut self, index: usize, key: K, value: V) {
        self.keys.insert(index, key);
        self.values.insert(index, value);
    }

    /// Remove slot `index`, returning its entry.
    pub fn take(&mut self, index: usize) -> (K, V) {
        (self.keys.remove(index), self.values.remove(index))
    }

    /// Move entries `[allocated / 2..]` into a new leaf at `new_pointer`,
    /// spliced into the list between this leaf and its old right neighbour.
    ///
    /// The old right neighbour's `left` still points here; the caller
    /// retargets it.
    pub fn split(&mut self, new_pointer: BlockPointer) -> Self {
        let mid = self.keys.len() / 2;

        let right = Self {
            pointer: new_pointer,
            capacity: self.capacity,
            keys: self.keys.split_off(mid),
            values: self.values.split_off(mid),
            left: self.pointer,
            right: self.right,
        };
        self.right = new_pointer;
        right
    }

    /// Iterate over the entries in key order.
    pub fn entries(&self) -> impl Iterator<Item = (&K, &V)> {
        self.keys.iter().zip(self.values.iter())
    }

    /// Consume into owned entries.
    pub fn into_entries(self) -> Zip<vec::IntoIter<K>, vec::IntoIter<V>> {
        self.keys.into_iter().zip(self.values)
    }
}

impl<K: Ord + Clone, V> Node<K> for LeafNode<K, V> {
    #[inline]
    fn pointer(&self) -> BlockPointer {
        self.pointer
    }

    #[inline]
    fn keys(&self) -> &[K] {
        &self.keys
    }

    #[inline]
    fn capacity(&self) -> usize {
        self.capacity
    }

    fn remove(&mut self, index: usize) {
        self.take(index);
    }

    /// A copy of the first key. Leaves keep every key they hold.
    fn split_left_shift_keys(&mut self) -> Option<K> {
        self.keys.first().cloned()
    }
}

impl<K: Ord + Codec, V: Codec> LeafNode<K, V> {
    /// The block image of this leaf.
    pub fn encode(&self) -> BytesMut {
        let mut buf = BytesMut::new();
        buf.put_i32(self.pointer.raw());
        buf.put_i32(self.keys.len() as i32);
        buf.put_i32(self.left.raw());
        buf.put_i32(self.right.raw());
        for key in &self.keys {
            key.encode(&mut buf);
        }
        for value in &self.values {
            value.encode(&mut buf);
        }
        buf
    }

    /// Serialize into `block`.
    ///
    /// # Errors
    /// `Error::NodeTooLarge` if the encoding does not fit.
    pub fn write_to(&self, block: &mut Block) -> Result<()> {
        node::store_encoded(&self.encode(), block)
    }

    /// Deserialize the leaf `pointer` resolved to.
    pub fn read_from(block: &Block, pointer: BlockPointer, capacity: usize) -> Result<Self> {
        let (allocated, mut body) = node::read_header(block, pointer, capacity)?;

        if body.remaining() < 8 {
            return Err(Error::Decode(format!("{pointer}: sibling pointers truncated")));
        }
        let left = BlockPointer::from_raw(body.get_i32());
        let right = BlockPointer::from_raw(body.get_i32());

        let keys = node::decode_many::<K>(&mut body, allocated)?;
        let values = node::decode_many::<V>(&mut body, allocated)?;

        Ok(Self {
            pointer,
            capacity,
            keys,
            values,
            left,
            right,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled(pointer: u32, keys: &[u32]) -> LeafNode<u32, String> {
        let mut leaf = LeafNode::new(BlockPointer::leaf(pointer), 4);
        for &k in keys {
            let i = leaf.binary_search(&k).unwrap_err();
            leaf.insert_at(i, k, format!("v{k}"));
        }
        leaf
    }

    #[test]
    fn test_binary_search() {
        let leaf = filled(1, &[10, 20, 30]);
        assert_eq!(leaf.binary_search(&20), Ok(1));
        assert_eq!(leaf.binary_search(&5), Err(0));
        assert_eq!(leaf.binary_search(&25), Err(2));
        assert_eq!(leaf.binary_search(&99), Err(3));
    }

    #[test]
    fn test_insert_keeps_order() {
        let leaf = filled(1, &[30, 10, 20]);
        assert_eq!(leaf.keys(), &[10, 20, 30]);
        assert_eq!(leaf.get(&20), Some(&"v20".to_string()));
        assert_eq!(leaf.get(&21), None);
    }

    #[test]
    fn test_full_and_empty() {
        let mut leaf = filled(1, &[1, 2, 3, 4]);
        assert!(leaf.is_full());
        assert!(!leaf.is_overflowing());

        leaf.insert_at(4, 5, "v5".into());
        assert!(leaf.is_overflowing());

        for _ in 0..5 {
            leaf.remove(0);
        }
        assert!(leaf.is_empty());
        assert!(leaf.values().is_empty());
    }

    #[test]
    fn test_take() {
        let mut leaf = filled(1, &[1, 2, 3]);
        assert_eq!(leaf.take(1), (2, "v2".to_string()));
        assert_eq!(leaf.keys(), &[1, 3]);
        assert_eq!(leaf.values(), &["v1".to_string(), "v3".to_string()]);
    }

    #[test]
    fn test_split_relinks_siblings() {
        let mut leaf = filled(1, &[1, 2, 3, 4, 5]);
        leaf.set_left(BlockPointer::leaf(7));
        leaf.set_right(BlockPointer::leaf(8));

        let mut right = leaf.split(BlockPointer::leaf(9));

        assert_eq!(leaf.keys(), &[1, 2]);
        assert_eq!(right.keys(), &[3, 4, 5]);
        assert_eq!(right.values()[0], "v3");

        assert_eq!(leaf.left(), BlockPointer::leaf(7));
        assert_eq!(leaf.right(), BlockPointer::leaf(9));
        assert_eq!(right.left(), BlockPointer::leaf(1));
        assert_eq!(right.right(), BlockPointer::leaf(8));

        // Leaves keep the separator
        assert_eq!(right.split_left_shift_keys(), Some(3));
        assert_eq!(right.keys(), &[3, 4, 5]);
    }

    #[test]
    fn test_serialize_roundtrip() {
        let mut leaf = filled(3, &[1, 2]);
        leaf.set_right(BlockPointer::leaf(4));

        let mut block = Block::new(128);
        leaf.write_to(&mut block).unwrap();

        assert_eq!(block.read_i32(0), 3);
        assert_eq!(block.read_i32(4), 2);
        assert_eq!(block.read_i32(8), 0);
        assert_eq!(block.read_i32(12), 4);

        let back = LeafNode::<u32, String>::read_from(&block, BlockPointer::leaf(3), 4).unwrap();
        assert_eq!(back, leaf);
    }

    #[test]
    fn test_too_large_for_block() {
        let mut leaf = LeafNode::<u32, String>::new(BlockPointer::leaf(1), 4);
        leaf.insert_at(0, 1, "x".repeat(100));

        let mut block = Block::new(64);
        let err = leaf.write_to(&mut block).unwrap_err();
        assert!(matches!(err, Error::NodeTooLarge { needed: 124, block_size: 64 }));
    }

    #[test]
    fn test_over_capacity_count_is_structural() {
        let leaf = filled(1, &[1, 2, 3, 4]);
        let mut block = Block::new(128);
        leaf.write_to(&mut block).unwrap();

        let result = LeafNode::<u32, String>::read_from(&block, BlockPointer::leaf(1), 3);
        assert!(matches!(result, Err(Error::Structural(_))));
    }
}
