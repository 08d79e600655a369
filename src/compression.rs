//! Pluggable chunk compression codecs
//!
//! Chunks name their compression in the record header; the reader and
//! composer look the name up in a codec table. `"none"` is always present.
//! The `bz2` and `lz4` features register the codecs ROS1 bags use in
//! practice; callers can register their own with [`DecompressorTable::insert`]
//! and [`CompressorTable::insert`].

use std::collections::HashMap;

use crate::error::{BagError, Result};

/// Compression name for uncompressed chunks
pub const COMPRESSION_NONE: &str = "none";

type DecompressFn = Box<dyn Fn(&[u8], usize) -> Result<Vec<u8>> + Send + Sync>;
type CompressFn = Box<dyn Fn(&[u8]) -> Result<Vec<u8>> + Send + Sync>;

/// Table from compression name to `(bytes, uncompressed_size) -> bytes`.
pub struct DecompressorTable {
    codecs: HashMap<String, DecompressFn>,
}

impl DecompressorTable {
    /// Create a table holding only the `"none"` identity codec
    pub fn new() -> Self {
        let mut table = Self {
            codecs: HashMap::new(),
        };
        table.insert(COMPRESSION_NONE, |data, _| Ok(data.to_vec()));
        table
    }

    /// Create a table with every codec compiled into this build
    pub fn with_defaults() -> Self {
        #[allow(unused_mut)]
        let mut table = Self::new();

        #[cfg(feature = "bz2")]
        table.insert("bz2", |data, size| {
            use std::io::Read;

            let mut decoder = bzip2::read::BzDecoder::new(data);
            let mut out = Vec::with_capacity(size);
            decoder
                .read_to_end(&mut out)
                .map_err(|e| BagError::decompress("bz2", e.to_string()))?;
            Ok(out)
        });

        #[cfg(feature = "lz4")]
        table.insert("lz4", |data, _| {
            lz4_flex::decompress_size_prepended(data)
                .map_err(|e| BagError::decompress("lz4", e.to_string()))
        });

        table
    }

    /// Register a codec under a compression name
    pub fn insert<F>(&mut self, name: &str, codec: F)
    where
        F: Fn(&[u8], usize) -> Result<Vec<u8>> + Send + Sync + 'static,
    {
        self.codecs.insert(name.to_string(), Box::new(codec));
    }

    /// Expand `data` with the codec registered under `name`
    pub fn decompress(&self, name: &str, data: &[u8], uncompressed_size: usize) -> Result<Vec<u8>> {
        let codec = self
            .codecs
            .get(name)
            .ok_or_else(|| BagError::UnknownCompression {
                compression: name.to_string(),
            })?;
        codec(data, uncompressed_size)
    }
}

impl Default for DecompressorTable {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl std::fmt::Debug for DecompressorTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<_> = self.codecs.keys().collect();
        names.sort();
        f.debug_struct("DecompressorTable")
            .field("codecs", &names)
            .finish()
    }
}

/// Table from compression name to `bytes -> bytes`.
pub struct CompressorTable {
    codecs: HashMap<String, CompressFn>,
}

impl CompressorTable {
    /// Create a table holding only the `"none"` identity codec
    pub fn new() -> Self {
        let mut table = Self {
            codecs: HashMap::new(),
        };
        table.insert(COMPRESSION_NONE, |data| Ok(data.to_vec()));
        table
    }

    /// Create a table with every codec compiled into this build
    pub fn with_defaults() -> Self {
        #[allow(unused_mut)]
        let mut table = Self::new();

        #[cfg(feature = "bz2")]
        table.insert("bz2", |data| {
            use std::io::Read;

            let mut encoder = bzip2::read::BzEncoder::new(data, bzip2::Compression::best());
            let mut out = Vec::new();
            encoder
                .read_to_end(&mut out)
                .map_err(|e| BagError::compress("bz2", e.to_string()))?;
            Ok(out)
        });

        #[cfg(feature = "lz4")]
        table.insert("lz4", |data| Ok(lz4_flex::compress_prepend_size(data)));

        table
    }

    /// Register a codec under a compression name
    pub fn insert<F>(&mut self, name: &str, codec: F)
    where
        F: Fn(&[u8]) -> Result<Vec<u8>> + Send + Sync + 'static,
    {
        self.codecs.insert(name.to_string(), Box::new(codec));
    }

    /// Shrink `data` with the codec registered under `name`
    pub fn compress(&self, name: &str, data: &[u8]) -> Result<Vec<u8>> {
        let codec = self
            .codecs
            .get(name)
            .ok_or_else(|| BagError::UnknownCompression {
                compression: name.to_string(),
            })?;
        codec(data)
    }
}

impl Default for CompressorTable {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl std::fmt::Debug for CompressorTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<_> = self.codecs.keys().collect();
        names.sort();
        f.debug_struct("CompressorTable")
            .field("codecs", &names)
            .finish()
    }
}
