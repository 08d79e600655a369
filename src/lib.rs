//! # rosbag-rs
//!
//! A Rust library for reading, decomposing and re-composing ROS1 bag files.
//!
//! A bag groups time-stamped messages by connection, batches them into
//! possibly compressed chunks, and keeps a trailing index enabling random
//! access by topic and time. This library implements the record codec and
//! layout engine for that container: parsing a bag from a random-access
//! byte source into an index model, reading chunks on demand, and composing
//! the model back into a byte stream that re-reads to an equivalent model.
//!
//! ## Features
//!
//! - Parse the global header, connection table and chunk index of a bag
//! - Read and decompress chunks lazily, one at a time
//! - Re-compose a bag from its index model, rewriting chunk positions
//! - Summarize topics, datatypes and message counts
//! - Pluggable compression codecs (`"bz2"` and `"lz4"` behind features)
//!
//! ## Example
//!
//! ```rust,no_run
//! use rosbag_rs::{BagComposer, BagReader, ComposeOptions, ReadOptions};
//!
//! fn main() -> rosbag_rs::Result<()> {
//!     let mut reader = BagReader::open_path("/path/to/recording.bag")?;
//!     let index = reader.read_index()?;
//!
//!     println!("{} connections, {} chunks",
//!              index.connections.len(), index.chunk_infos.len());
//!
//!     let options = ReadOptions::default();
//!     for chunk_info in &index.chunk_infos {
//!         let (chunk, index_data) = reader.read_chunk(chunk_info, &options)?;
//!         println!("chunk at {}: {} bytes, {} indexed connections",
//!                  chunk_info.chunk_pos, chunk.data.len(), index_data.len());
//!     }
//!
//!     let rewritten = BagComposer::new(&mut reader, &index)
//!         .compose(&ComposeOptions::default())?;
//!     std::fs::write("/path/to/rewritten.bag", rewritten)?;
//!     Ok(())
//! }
//! ```

pub mod composer;
pub mod compression;
pub mod error;
pub mod header;
pub mod reader;
pub mod records;
pub mod source;
pub mod summary;
pub mod types;

// Re-export main types for convenience
pub use composer::{create_chunk, BagComposer, ComposeOptions};
pub use compression::{CompressorTable, DecompressorTable};
pub use error::{BagError, Result};
pub use header::HeaderFields;
pub use reader::{BagReader, ReadOptions};
pub use records::{
    BagHeaderRecord, ChunkConnectionCount, ChunkInfoRecord, ChunkRecord, ConnectionRecord,
    IndexDataRecord, IndexEntry, MessageDataRecord, Opcode,
};
pub use source::{BytesSource, FileSource, Filelike};
pub use summary::{
    connections_to_datatypes, connections_to_topics, message_counts, MessageCounts, TopicInfo,
    TopicMessageCount, TypeDescriptor,
};
pub use types::{BagIndex, Time};

#[cfg(feature = "mmap")]
pub use source::MmapSource;
