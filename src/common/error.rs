//! Error types for the paged tree.

use thiserror::Error;

/// Convenient Result type alias.
///
/// Instead of writing `Result<T, Error>` everywhere, we can write `Result<T>`.
pub type Result<T> = std::result::Result<T, Error>;

/// All possible errors raised by the block store and the tree.
///
/// `Format`, `DirtyStore` and `Structural` are fatal to the operation that
/// raised them. `DuplicateKey` is an expected outcome of `put` that callers
/// check for. Nothing is retried internally.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error from the backing file or the free-list sidecar.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Metadata block has a bad magic, block size or branching bound.
    #[error("invalid store format: {0}")]
    Format(String),

    /// The store was not closed cleanly. No recovery is attempted.
    #[error("store was not closed cleanly and needs recovery")]
    DirtyStore,

    /// `put` was called with a key that is already present.
    #[error("duplicate key")]
    DuplicateKey,

    /// A resolved pointer yields no usable node.
    #[error("structural corruption: {0}")]
    Structural(String),

    /// A serialized node does not fit in one block.
    #[error("node needs {needed} bytes but a block holds {block_size}")]
    NodeTooLarge { needed: usize, block_size: usize },

    /// A key or value could not be decoded from a block.
    #[error("decode error: {0}")]
    Decode(String),

    /// Every frame of the block cache is pinned.
    #[error("no free frames available in block cache")]
    NoFreeFrames,

    /// Attempted to drop a cached block that is still pinned.
    #[error("block {0} is pinned")]
    BlockPinned(u32),

    /// The configuration cannot describe a working store.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::BlockPinned(42);
        assert_eq!(format!("{}", err), "block 42 is pinned");

        let err = Error::NoFreeFrames;
        assert_eq!(format!("{}", err), "no free frames available in block cache");

        let err = Error::NodeTooLarge {
            needed: 600,
            block_size: 512,
        };
        assert_eq!(
            format!("{}", err),
            "node needs 600 bytes but a block holds 512"
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();

        match err {
            Error::Io(_) => {} // Success
            _ => panic!("Expected Io error"),
        }
    }

    #[test]
    fn test_io_error_has_source() {
        use std::error::Error as _;

        let io_err = std::io::Error::new(std::io::ErrorKind::Other, "disk gone");
        let err = Error::from(io_err);
        assert!(err.source().is_some());
        assert!(Error::DirtyStore.source().is_none());
    }
}
