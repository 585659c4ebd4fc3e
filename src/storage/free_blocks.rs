//! Free-block bitmap and its sidecar file.
//!
//! Freed node blocks are remembered in a bitmap and handed out again (lowest
//! index first) before the file grows. The bitmap only reaches disk on an
//! orderly shutdown, in a sidecar file next to the block file.
//!
//! # Sidecar format
//! ```text
//! ┌──────────────┬────────────────────┬──────────────┐
//! │ len (u32 BE) │ bitmap (len bytes) │ crc32 (u32 BE)│
//! └──────────────┴────────────────────┴──────────────┘
//! ```
//! Bit `i` lives in byte `i / 8` at bit position `i % 8`. Trailing zero
//! bytes are not written.

use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use bytes::{Buf, BufMut, BytesMut};
use tracing::warn;

use crate::common::Result;

const BITS_PER_BYTE: usize = 8;

/// Set of reclaimed block indices.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FreeBlocks {
    bitmap: Vec<u8>,
    count: usize,
}

impl FreeBlocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a set from serialized bitmap bytes.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let count = bytes.iter().map(|b| b.count_ones() as usize).sum();
        let mut free = Self {
            bitmap: bytes.to_vec(),
            count,
        };
        free.trim();
        free
    }

    /// Bitmap bytes without trailing zero bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.bitmap.clone()
    }

    /// Mark `index` as free. Returns false if it already was.
    pub fn insert(&mut self, index: u32) -> bool {
        let bit = index as usize;
        let byte = bit / BITS_PER_BYTE;
        if byte >= self.bitmap.len() {
            self.bitmap.resize(byte + 1, 0);
        }
        let mask = 1u8 << (bit % BITS_PER_BYTE);
        if self.bitmap[byte] & mask != 0 {
            return false;
        }
        self.bitmap[byte] |= mask;
        self.count += 1;
        true
    }

    pub fn contains(&self, index: u32) -> bool {
        let bit = index as usize;
        self.bitmap
            .get(bit / BITS_PER_BYTE)
            .is_some_and(|b| b & (1u8 << (bit % BITS_PER_BYTE)) != 0)
    }

    /// Remove and return the lowest free index.
    pub fn take_lowest(&mut self) -> Option<u32> {
        let byte = self.bitmap.iter().position(|&b| b != 0)?;
        let bit = self.bitmap[byte].trailing_zeros() as usize;
        self.bitmap[byte] &= !(1u8 << bit);
        self.count -= 1;
        self.trim();
        Some((byte * BITS_PER_BYTE + bit) as u32)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.count
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn clear(&mut self) {
        self.bitmap.clear();
        self.count = 0;
    }

    fn trim(&mut self) {
        while self.bitmap.last() == Some(&0) {
            self.bitmap.pop();
        }
    }

    /// Write the set to a sidecar file, replacing any previous one.
    ///
    /// The bytes go to a temporary file that is synced and then renamed over
    /// `path`, so a crash leaves either the old sidecar or the new one.
    pub fn save(&self, path: &Path) -> Result<()> {
        let bitmap = self.to_bytes();
        let mut out = BytesMut::with_capacity(bitmap.len() + 8);
        out.put_u32(bitmap.len() as u32);
        out.put_slice(&bitmap);
        out.put_u32(crc32fast::hash(&bitmap));

        let tmp = temp_path(path);
        let mut file = File::create(&tmp)?;
        file.write_all(&out)?;
        file.sync_all()?;
        drop(file);

        fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Load a sidecar file.
    ///
    /// A missing file yields an empty set. A truncated file or a checksum
    /// mismatch is logged and also yields an empty set: allocation then
    /// simply grows the file.
    pub fn load(path: &Path) -> Result<Self> {
        let data = match fs::read(path) {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Self::new()),
            Err(e) => return Err(e.into()),
        };

        match Self::decode_sidecar(&data) {
            Some(free) => Ok(free),
            None => {
                warn!(path = %path.display(), "free-block sidecar is corrupt, discarding it");
                Ok(Self::new())
            }
        }
    }

    /// Remove the sidecar file if present.
    pub fn remove_sidecar(path: &Path) -> Result<()> {
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn decode_sidecar(mut data: &[u8]) -> Option<Self> {
        if data.remaining() < 4 {
            return None;
        }
        let len = data.get_u32() as usize;
        if data.remaining() < len.checked_add(4)? {
            return None;
        }
        let bitmap = &data[..len];
        data.advance(len);
        if crc32fast::hash(bitmap) != data.get_u32() {
            return None;
        }
        Some(Self::from_bytes(bitmap))
    }
}

/// `<path>.tmp`, next to the sidecar so the rename stays on one filesystem.
fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}
