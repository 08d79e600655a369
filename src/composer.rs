//! Composer for ROS1 bag files
//!
//! The composer serializes an index model back into a bag-shaped byte
//! stream, pulling chunk contents through a reader one chunk at a time.
//! Output is single-pass and deterministic: chunk positions and `index_pos`
//! are recomputed up front, connections are emitted in ascending id order,
//! and chunk infos keep the order they were read in.

use std::collections::HashMap;

use crate::compression::{CompressorTable, COMPRESSION_NONE};
use crate::error::Result;
use crate::reader::{BagReader, ReadOptions};
use crate::records::{
    write_record, BagHeaderRecord, ChunkInfoRecord, ChunkRecord, IndexDataRecord, IndexEntry,
    MessageDataRecord, FILE_HEADER_RECORD_LEN, INDEX_VERSION, MAGIC,
};
use crate::source::Filelike;
use crate::types::BagIndex;

/// Options controlling how a bag is composed.
#[derive(Debug)]
pub struct ComposeOptions {
    /// Options used when re-fetching chunks through the reader
    pub read: ReadOptions,
    /// Codecs used to re-compress chunk payloads for output
    pub compressors: CompressorTable,
}

impl Default for ComposeOptions {
    fn default() -> Self {
        Self {
            read: ReadOptions::default(),
            compressors: CompressorTable::with_defaults(),
        }
    }
}

/// Serializes an index model plus chunk contents fetched through a reader.
pub struct BagComposer<'a, S: Filelike> {
    reader: &'a mut BagReader<S>,
    index: &'a BagIndex,
}

impl<'a, S: Filelike> BagComposer<'a, S> {
    /// Create a composer over a source reader and its parsed index model
    pub fn new(reader: &'a mut BagReader<S>, index: &'a BagIndex) -> Self {
        Self { reader, index }
    }

    /// Compose the complete bag byte stream.
    ///
    /// Chunks are emitted in chunk-info order with their positions and the
    /// global `index_pos` recomputed, so the output is well-formed even when
    /// re-compression changes chunk lengths. No bytes are produced until the
    /// final concatenation, so a failed compose has no durable effect.
    pub fn compose(&mut self, options: &ComposeOptions) -> Result<Vec<u8>> {
        let base = (MAGIC.len() + FILE_HEADER_RECORD_LEN) as u64;

        let mut chunk_section = Vec::new();
        let mut emitted_infos = Vec::with_capacity(self.index.chunk_infos.len());
        for info in &self.index.chunk_infos {
            let (chunk, index_data) = self.reader.read_chunk(info, &options.read)?;
            let chunk_pos = base + chunk_section.len() as u64;

            let payload = options
                .compressors
                .compress(&chunk.compression, &chunk.data)?;
            write_record(&chunk.header_fields(), &payload, &mut chunk_section)?;
            for index in &index_data {
                index.write(&mut chunk_section)?;
            }

            emitted_infos.push(ChunkInfoRecord {
                chunk_pos,
                ..info.clone()
            });
        }

        let index_pos = base + chunk_section.len() as u64;
        let header = BagHeaderRecord {
            index_pos,
            conn_count: self.index.connections.len() as u32,
            chunk_count: emitted_infos.len() as u32,
        };

        let mut out = Vec::with_capacity(base as usize + chunk_section.len());
        out.extend_from_slice(MAGIC);
        header.write(&mut out)?;
        out.extend_from_slice(&chunk_section);
        for connection in self.index.connections.values() {
            connection.write(&mut out)?;
        }
        for info in &emitted_infos {
            info.write(&mut out)?;
        }
        Ok(out)
    }
}

/// Compose an uncompressed `(Chunk, IndexData)` group from messages.
///
/// Messages are concatenated in supply order; one index data record is
/// produced per distinct connection, in first-appearance order, with entries
/// carrying each message's offset within the chunk data.
pub fn create_chunk(
    messages: &[MessageDataRecord],
) -> Result<(ChunkRecord, Vec<IndexDataRecord>)> {
    let mut data = Vec::new();
    let mut order = Vec::new();
    let mut per_conn: HashMap<u32, Vec<IndexEntry>> = HashMap::new();

    for message in messages {
        let offset = data.len() as u32;
        message.write(&mut data)?;

        let entries = per_conn.entry(message.conn).or_insert_with(|| {
            order.push(message.conn);
            Vec::new()
        });
        entries.push(IndexEntry {
            time: message.time,
            offset,
        });
    }

    let chunk = ChunkRecord {
        compression: COMPRESSION_NONE.to_string(),
        size: data.len() as u32,
        data,
    };
    let index_data = order
        .into_iter()
        .map(|conn| IndexDataRecord {
            ver: INDEX_VERSION,
            conn,
            entries: per_conn.remove(&conn).unwrap_or_default(),
        })
        .collect();

    Ok((chunk, index_data))
}
