//! Block - the fixed-size unit of storage.
//!
//! A [`Block`] is the in-memory copy of one block of the backing file. Blocks
//! are held in [`Frame`](crate::buffer::Frame)s inside the block cache and are
//! the unit of I/O between the cache and [`BlockFile`](super::BlockFile).

/// An owned, zero-initialised buffer of exactly `block_size` bytes.
///
/// The size is fixed at construction (it comes from the runtime
/// configuration, not a compile-time constant).
///
/// # Clone Implementation
/// `Block` does NOT implement `Clone` outside tests; copying a block should be
/// an explicit `copy_from_slice`.
///
/// # Example
/// ```
/// use pagedtree::storage::Block;
///
/// let mut block = Block::new(512);
/// block.write_i32(0, -7);
/// assert_eq!(block.read_i32(0), -7);
/// assert_eq!(block.size(), 512);
/// ```
pub struct Block {
    data: Box<[u8]>,
}

impl Block {
    /// Create a new zeroed block.
    pub fn new(block_size: usize) -> Self {
        Self {
            data: vec![0u8; block_size].into_boxed_slice(),
        }
    }

    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Zero out the entire block.
    pub fn reset(&mut self) {
        self.data.fill(0);
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Overwrite the block with `bytes`, zero-filling the tail.
    ///
    /// # Panics
    /// Panics if `bytes` is longer than the block.
    pub fn fill_from(&mut self, bytes: &[u8]) {
        assert!(bytes.len() <= self.data.len(), "payload larger than block");
        self.data[..bytes.len()].copy_from_slice(bytes);
        self.data[bytes.len()..].fill(0);
    }

    // Fixed-width big-endian accessors used by the metadata layout.

    #[inline]
    pub fn read_u32(&self, offset: usize) -> u32 {
        let mut buf = [0u8; 4];
        buf.copy_from_slice(&self.data[offset..offset + 4]);
        u32::from_be_bytes(buf)
    }

    #[inline]
    pub fn write_u32(&mut self, offset: usize, value: u32) {
        self.data[offset..offset + 4].copy_from_slice(&value.to_be_bytes());
    }

    #[inline]
    pub fn read_i32(&self, offset: usize) -> i32 {
        self.read_u32(offset) as i32
    }

    #[inline]
    pub fn write_i32(&mut self, offset: usize, value: i32) {
        self.write_u32(offset, value as u32);
    }

    #[inline]
    pub fn read_u8(&self, offset: usize) -> u8 {
        self.data[offset]
    }

    #[inline]
    pub fn write_u8(&mut self, offset: usize, value: u8) {
        self.data[offset] = value;
    }
}

// Clone only available in tests - forces explicit copying in production
#[cfg(test)]
impl Clone for Block {
    fn clone(&self) -> Self {
        Self {
            data: self.data.clone(),
        }
    }
}
