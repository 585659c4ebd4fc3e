//! Common types shared across the crate.
//!
//! - Configuration ([`TreeConfig`] and defaults)
//! - Error types
//! - Identifiers (BlockId, FrameId)

mod block_id;
pub mod config;
pub mod error;
mod frame_id;

pub use block_id::BlockId;
pub use config::TreeConfig;
pub use error::{Error, Result};
pub use frame_id::FrameId;
