//! pagedtree - A disk-resident B+ tree on a cached block file.
//!
//! # Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 Index Layer (index/btree/)                  │
//! │      BPlusTree: get / put / remove / iter / verify          │
//! │      InternalNode + LeafNode  ←→  Codec (keys, values)      │
//! └─────────────────────────────────────────────────────────────┘
//!                               ↓  BlockPointer (±block index)
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  Block Cache (buffer/)                      │
//! │      BlockStore + Frame + LRU replacer + CacheStats         │
//! └─────────────────────────────────────────────────────────────┘
//!                               ↓  BlockId
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  Storage Layer (storage/)                   │
//! │   BlockFile (<base>.data)   TreeMeta (block 0)              │
//! │   FreeBlocks (<base>.free sidecar)                          │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//! - [`common`] - Shared primitives (BlockId, FrameId, Error, config)
//! - [`buffer`] - Block cache and eviction
//! - [`storage`] - Block file I/O, metadata and free-list formats
//! - [`index`] - The B+ tree
//!
//! # Quick Start
//! ```no_run
//! use pagedtree::{BPlusTree, TreeConfig};
//!
//! let config = TreeConfig::default().with_order(64);
//! let mut tree: BPlusTree<u64, Vec<u8>> = BPlusTree::open("/tmp/my_index", config).unwrap();
//!
//! tree.put(1, b"one".to_vec()).unwrap();
//! for entry in tree.iter() {
//!     let (key, value) = entry.unwrap();
//!     println!("{key} => {value:?}");
//! }
//! tree.close().unwrap();
//! ```

pub mod buffer;
pub mod common;
pub mod index;
pub mod storage;

// Re-export commonly used items at crate root for convenience
pub use common::{BlockId, Error, FrameId, Result, TreeConfig};

pub use buffer::{BlockStore, CacheStats, StatsSnapshot};
pub use index::btree::{BPlusTree, BlockPointer, Codec, Iter, NodeKind};
