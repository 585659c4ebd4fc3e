//! Storage layer - block file I/O and on-disk formats.
//!
//! This module handles persistent storage:
//! - [`BlockFile`] - Low-level block I/O on the backing file
//! - [`Block`] - In-memory copy of one block
//! - [`TreeMeta`] - The metadata record in block 0
//! - [`FreeBlocks`] - Reclaimed block bitmap and its sidecar file

mod block;
mod block_file;
mod free_blocks;
mod meta;

pub use block::Block;
pub use block_file::BlockFile;
pub use free_blocks::FreeBlocks;
pub use meta::{TreeMeta, CLEAN_MARK, MAGIC_1, MAGIC_2, META_SIZE};
