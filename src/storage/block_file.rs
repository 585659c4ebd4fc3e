//! Block File - low-level file I/O for fixed-size blocks.
//!
//! The [`BlockFile`] handles all direct file operations:
//! - Reading and writing whole blocks
//! - Reporting the file length in blocks
//! - Truncating, syncing and removing the file

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::common::{BlockId, Result};
use crate::storage::Block;

/// Manages disk I/O for a single block file.
///
/// # File Layout
/// Blocks are laid out sequentially; block 0 holds the tree metadata:
/// ```text
/// ┌─────────┬─────────┬─────────┬─────────┬─────────┐
/// │ Block 0 │ Block 1 │ Block 2 │  ...    │ Block N │
/// │ (meta)  │         │         │         │         │
/// └─────────┴─────────┴─────────┴─────────┴─────────┘
/// Offset:  0        B        2B    ...        N×B
/// ```
///
/// Block numbers handed out by the tree grow monotonically but are not
/// necessarily written in order, so the file may be shorter than the highest
/// block in use. Reading past the end yields zeros; writing extends the file.
///
/// # Durability
/// `write_block` hands the bytes to the OS. Only [`BlockFile::sync`] forces
/// them to stable storage.
pub struct BlockFile {
    file: File,
    path: PathBuf,
    block_size: usize,
}

impl BlockFile {
    /// Open a block file, creating it if absent.
    ///
    /// # Errors
    /// Returns `Error::Io` if the file cannot be opened for read/write.
    pub fn open<P: AsRef<Path>>(path: P, block_size: usize) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;

        Ok(Self {
            file,
            path,
            block_size,
        })
    }

    /// Read a block into `block`.
    ///
    /// Bytes beyond the end of the file read as zero.
    pub fn read_block(&mut self, block_id: BlockId, block: &mut Block) -> Result<()> {
        debug_assert_eq!(block.size(), self.block_size);

        let offset = block_id.offset(self.block_size);
        let len = self.file_len()?;
        block.reset();
        if offset >= len {
            return Ok(());
        }

        let available = ((len - offset) as usize).min(self.block_size);
        self.file.seek(SeekFrom::Start(offset))?;
        self.file
            .read_exact(&mut block.as_mut_slice()[..available])?;

        Ok(())
    }

    /// Write a whole block, extending the file if needed.
    pub fn write_block(&mut self, block_id: BlockId, block: &Block) -> Result<()> {
        debug_assert_eq!(block.size(), self.block_size);

        let offset = block_id.offset(self.block_size);
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(block.as_slice())?;

        Ok(())
    }

    /// Number of blocks in the file, counting a trailing partial block.
    pub fn size_in_blocks(&self) -> Result<u64> {
        let len = self.file_len()?;
        Ok(len.div_ceil(self.block_size as u64))
    }

    /// Force all written data to disk.
    pub fn sync(&mut self) -> Result<()> {
        self.file.flush()?;
        self.file.sync_all()?;
        Ok(())
    }

    /// Discard every block, leaving an empty file.
    pub fn truncate(&mut self) -> Result<()> {
        self.file.set_len(0)?;
        self.file.sync_all()?;
        Ok(())
    }

    /// Close and remove the file from disk.
    pub fn delete(self) -> Result<()> {
        let path = self.path.clone();
        drop(self.file);
        fs::remove_file(path)?;
        Ok(())
    }

    #[inline]
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn file_len(&self) -> Result<u64> {
        Ok(self.file.metadata()?.len())
    }
}
