//! Index structures stored in a [`BlockStore`](crate::buffer::BlockStore).
//!
//! - [`btree`] - The paged B+ tree

pub mod btree;
