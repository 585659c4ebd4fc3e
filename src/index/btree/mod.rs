//! Disk-resident B+ tree.
//!
//! # Components
//! - [`BPlusTree`] - The engine: lookup, insertion, deletion, iteration
//! - [`InternalNode`] / [`LeafNode`] - The two node variants and their block images
//! - [`BlockPointer`] - Signed node addresses (sign = node kind)
//! - [`Codec`] - How keys and values are laid out in a block
//!
//! Only leaves hold values. Leaves are doubly linked in key order, so an
//! in-order scan never revisits internal nodes.

mod codec;
mod internal;
mod leaf;
mod node;
mod pointer;
mod tree;

pub use codec::Codec;
pub use internal::InternalNode;
pub use leaf::LeafNode;
pub use node::{max_node_size, Node, NodeHeader, TreeNode, DELETED, NODE_HEADER_SIZE};
pub use pointer::{BlockPointer, NodeKind};
pub use tree::{BPlusTree, Iter};
