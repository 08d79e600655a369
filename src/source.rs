//! Random-access byte sources
//!
//! The reader works against the [`Filelike`] trait so bags can come from a
//! file on disk, an in-memory buffer, or anything else that can serve exact
//! `(offset, length)` reads. A short read is a hard error: the bag index
//! gives exact record positions, so running out of bytes means the file is
//! truncated.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use crate::error::{BagError, Result};

/// A random-access source of bag bytes.
pub trait Filelike {
    /// Total size of the source in bytes
    fn size(&self) -> Result<u64>;

    /// Read exactly `length` bytes starting at `offset`.
    ///
    /// Fails with [`BagError::UnexpectedEof`] when the source ends before
    /// `offset + length`.
    fn read_at(&mut self, offset: u64, length: usize) -> Result<Vec<u8>>;
}

/// An in-memory bag.
#[derive(Debug, Clone)]
pub struct BytesSource {
    data: Vec<u8>,
}

impl BytesSource {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }
}

impl Filelike for BytesSource {
    fn size(&self) -> Result<u64> {
        Ok(self.data.len() as u64)
    }

    fn read_at(&mut self, offset: u64, length: usize) -> Result<Vec<u8>> {
        let end = offset as usize + length;
        if end > self.data.len() {
            return Err(BagError::UnexpectedEof {
                offset: self.data.len() as u64,
            });
        }
        Ok(self.data[offset as usize..end].to_vec())
    }
}

/// A bag file on disk, read with seek + read.
#[derive(Debug)]
pub struct FileSource {
    file: File,
    size: u64,
}

impl FileSource {
    /// Open a bag file for reading
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        let size = file.metadata()?.len();
        Ok(Self { file, size })
    }
}

impl Filelike for FileSource {
    fn size(&self) -> Result<u64> {
        Ok(self.size)
    }

    fn read_at(&mut self, offset: u64, length: usize) -> Result<Vec<u8>> {
        if offset + length as u64 > self.size {
            return Err(BagError::UnexpectedEof { offset: self.size });
        }
        self.file.seek(SeekFrom::Start(offset))?;
        let mut buf = vec![0u8; length];
        self.file.read_exact(&mut buf)?;
        Ok(buf)
    }
}

/// A memory-mapped bag file.
#[cfg(feature = "mmap")]
#[derive(Debug)]
pub struct MmapSource {
    mmap: memmap2::Mmap,
}

#[cfg(feature = "mmap")]
impl MmapSource {
    /// Open and map a bag file
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        let mmap = unsafe { memmap2::Mmap::map(&file)? };
        Ok(Self { mmap })
    }
}

#[cfg(feature = "mmap")]
impl Filelike for MmapSource {
    fn size(&self) -> Result<u64> {
        Ok(self.mmap.len() as u64)
    }

    fn read_at(&mut self, offset: u64, length: usize) -> Result<Vec<u8>> {
        let end = offset as usize + length;
        if end > self.mmap.len() {
            return Err(BagError::UnexpectedEof {
                offset: self.mmap.len() as u64,
            });
        }
        Ok(self.mmap[offset as usize..end].to_vec())
    }
}
