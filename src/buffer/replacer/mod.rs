//! Eviction policy for the block cache.
//!
//! - [`LruReplacer`] - Least Recently Used

mod lru;

pub use lru::LruReplacer;
