//! Internal nodes.
//!
//! # Block layout
//! ```text
//! pointer (i32) | allocated (i32) | keys[allocated] | children[allocated + 1] (i32 each)
//! ```

use bytes::{Buf, BufMut, BytesMut};

use crate::common::{Error, Result};
use crate::storage::Block;

use super::node::{self, Node};
use super::pointer::BlockPointer;
use super::Codec;

/// An internal node: `N` separator keys and `N + 1` child pointers.
///
/// `children[i]` holds keys `< keys[i]`; `children[i + 1]` holds keys
/// `>= keys[i]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InternalNode<K> {
    pointer: BlockPointer,
    capacity: usize,
    keys: Vec<K>,
    children: Vec<BlockPointer>,
}

impl<K: Ord> InternalNode<K> {
    /// A new root over two children.
    pub fn with_children(
        pointer: BlockPointer,
        capacity: usize,
        left: BlockPointer,
        key: K,
        right: BlockPointer,
    ) -> Self {
        Self {
            pointer,
            capacity,
            keys: vec![key],
            children: vec![left, right],
        }
    }

    #[inline]
    pub fn children(&self) -> &[BlockPointer] {
        &self.children
    }

    #[inline]
    pub fn child(&self, index: usize) -> Option<BlockPointer> {
        self.children.get(index).copied()
    }

    /// Index of the child to descend into for `key`.
    ///
    /// An exact match on a separator goes right.
    pub fn find_child_index(&self, key: &K) -> usize {
        match self.binary_search(key) {
            Ok(i) => i + 1,
            Err(i) => i,
        }
    }

    /// Record that `children[child_index]` split, with `right` as its new
    /// right sibling and `key` as the separator between them.
    pub fn insert_split(&mut self, child_index: usize, key: K, right: BlockPointer) {
        self.keys.insert(child_index, key);
        self.children.insert(child_index + 1, right);
    }

    /// Drop the child at `child_index` together with the separator that
    /// bounds it. Returns the removed pointer.
    pub fn remove_child(&mut self, child_index: usize) -> BlockPointer {
        if child_index > 0 {
            let child = self.children[child_index];
            self.remove(child_index - 1);
            child
        } else {
            if !self.keys.is_empty() {
                self.keys.remove(0);
            }
            self.children.remove(0)
        }
    }

    /// Move the upper half of the slots into a new node at `new_pointer`.
    ///
    /// With `mid = allocated / 2`, the right node receives `keys[mid..]` and
    /// `children[mid..]`; its leading child duplicates this node's last one
    /// until [`split_left_shift_keys`](Node::split_left_shift_keys) drops it
    /// along with the separator.
    pub fn split(&mut self, new_pointer: BlockPointer) -> Self {
        let mid = self.keys.len() / 2;

        let keys = self.keys.split_off(mid);
        let children = self.children[mid..].to_vec();
        self.children.truncate(mid + 1);

        Self {
            pointer: new_pointer,
            capacity: self.capacity,
            keys,
            children,
        }
    }
}

impl<K: Ord> Node<K> for InternalNode<K> {
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

    /// Remove `keys[index]` and `children[index + 1]`.
    fn remove(&mut self, index: usize) {
        self.keys.remove(index);
        self.children.remove(index + 1);
    }

    /// Remove and return `keys[0]`, dropping `children[0]` with it.
    fn split_left_shift_keys(&mut self) -> Option<K> {
        if self.keys.is_empty() {
            return None;
        }
        self.children.remove(0);
        Some(self.keys.remove(0))
    }
}

impl<K: Ord + Codec> InternalNode<K> {
    /// The block image of this node.
    pub fn encode(&self) -> BytesMut {
        let mut buf = BytesMut::new();
        buf.put_i32(self.pointer.raw());
        buf.put_i32(self.keys.len() as i32);
        for key in &self.keys {
            key.encode(&mut buf);
        }
        for child in &self.children {
            buf.put_i32(child.raw());
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

    /// Deserialize the node `pointer` resolved to.
    pub fn read_from(block: &Block, pointer: BlockPointer, capacity: usize) -> Result<Self> {
        let (allocated, mut body) = node::read_header(block, pointer, capacity)?;

        let keys = node::decode_many::<K>(&mut body, allocated)?;

        let child_count = allocated + 1;
        if body.remaining() < child_count * 4 {
            return Err(Error::Decode(format!("{pointer}: child pointers truncated")));
        }
        let children = (0..child_count)
            .map(|_| BlockPointer::from_raw(body.get_i32()))
            .collect();

        Ok(Self {
            pointer,
            capacity,
            keys,
            children,
        })
    }
}
