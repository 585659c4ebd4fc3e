//! Block cache management.
//!
//! The block store is the in-memory cache between the tree and its file.
//! It manages a fixed set of frames, each holding one block.
//!
//! # Components
//! - [`BlockStore`] - The file-backed block cache
//! - [`Frame`] - A cache slot holding a block + metadata
//! - [`BlockReadGuard`] / [`BlockWriteGuard`] - RAII guards for block access
//! - [`CacheStats`] - Performance statistics
//! - [`replacer`] - Eviction policy

mod block_guard;
mod block_store;
mod frame;
pub mod replacer;
mod stats;

pub use block_guard::{BlockReadGuard, BlockWriteGuard};
pub use block_store::BlockStore;
pub use frame::Frame;
pub use stats::{CacheStats, StatsSnapshot};
