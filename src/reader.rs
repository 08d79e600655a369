//! Reader for ROS1 bag files
//!
//! The reader parses a bag from a random-access byte source into the
//! in-memory index model. Chunk payloads are not read eagerly; callers pull
//! them one at a time through [`BagReader::read_chunk`], which is what keeps
//! memory bounded to a single decompressed chunk.

use std::collections::BTreeMap;

use byteorder::{ByteOrder, LittleEndian};

use crate::compression::DecompressorTable;
use crate::error::{BagError, Result};
use crate::header::{parse_fields, HeaderFields};
use crate::records::{
    chunk_messages, BagHeaderRecord, ChunkInfoRecord, ChunkRecord, ConnectionRecord,
    IndexDataRecord, MessageDataRecord, Opcode, FILE_HEADER_LEN, MAGIC,
};
use crate::source::{FileSource, Filelike};
use crate::types::BagIndex;

/// Options controlling how a bag is read.
#[derive(Debug)]
pub struct ReadOptions {
    /// Codecs used to expand chunk payloads
    pub decompressors: DecompressorTable,
    /// Skip records with unexpected opcodes inside chunks instead of failing
    pub lenient: bool,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            decompressors: DecompressorTable::with_defaults(),
            lenient: false,
        }
    }
}

/// Reader over a random-access bag source.
pub struct BagReader<S: Filelike> {
    source: S,
    header: Option<BagHeaderRecord>,
}

impl BagReader<FileSource> {
    /// Open a bag file from a path
    pub fn open_path<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        Self::open(FileSource::open(path)?)
    }
}

impl<S: Filelike> BagReader<S> {
    /// Open a bag, validating the magic line eagerly.
    pub fn open(mut source: S) -> Result<Self> {
        let magic = match source.read_at(0, MAGIC.len()) {
            Ok(magic) => magic,
            Err(BagError::UnexpectedEof { .. }) => return Err(BagError::BadMagic),
            Err(e) => return Err(e),
        };
        if magic != MAGIC[..] {
            return Err(BagError::BadMagic);
        }
        Ok(Self {
            source,
            header: None,
        })
    }

    /// Parse the global bag header.
    ///
    /// Reads the fixed prefetch window after the magic line; the result is
    /// cached for the life of the reader.
    pub fn read_header(&mut self) -> Result<BagHeaderRecord> {
        if let Some(header) = self.header {
            return Ok(header);
        }

        let base = MAGIC.len() as u64;
        let window = self.source.read_at(base, FILE_HEADER_LEN)?;
        let header_len = LittleEndian::read_u32(&window[..4]) as usize;
        if 4 + header_len > window.len() {
            return Err(BagError::corrupt(
                base,
                format!("bag header length {header_len} exceeds the prefetch window"),
            ));
        }

        let fields = parse_fields(&window[4..4 + header_len])
            .map_err(|e| e.with_base_offset(base + 4))?;
        let header = BagHeaderRecord::parse(&fields)?;
        self.header = Some(header);
        Ok(header)
    }

    /// Read the connection and chunk-info summary sections.
    ///
    /// Seeks to `index_pos` and reads `conn_count` connection records
    /// followed by `chunk_count` chunk info records, tolerating arbitrary
    /// record lengths.
    pub fn read_connections_and_chunk_infos(
        &mut self,
    ) -> Result<(BTreeMap<u32, ConnectionRecord>, Vec<ChunkInfoRecord>)> {
        let header = self.read_header()?;
        let mut offset = header.index_pos;

        let mut connections = BTreeMap::new();
        for _ in 0..header.conn_count {
            let (fields, data, next) = self.read_record_at(offset)?;
            let connection = ConnectionRecord::parse(&fields, &data)?;
            connections.insert(connection.conn, connection);
            offset = next;
        }

        let mut chunk_infos = Vec::with_capacity(header.chunk_count as usize);
        for _ in 0..header.chunk_count {
            let (fields, data, next) = self.read_record_at(offset)?;
            chunk_infos.push(ChunkInfoRecord::parse(&fields, &data)?);
            offset = next;
        }

        Ok((connections, chunk_infos))
    }

    /// Parse the whole index model: header, connections and chunk infos.
    pub fn read_index(&mut self) -> Result<BagIndex> {
        let header = self.read_header()?;
        let (connections, chunk_infos) = self.read_connections_and_chunk_infos()?;
        Ok(BagIndex {
            header,
            connections,
            chunk_infos,
        })
    }

    /// Read one chunk and the index data records that follow it on disk.
    ///
    /// The returned chunk holds its decompressed payload; the declared
    /// uncompressed size is verified against it. Index data records are
    /// collected until the next record is not index data or `index_pos` is
    /// reached.
    pub fn read_chunk(
        &mut self,
        chunk_info: &ChunkInfoRecord,
        options: &ReadOptions,
    ) -> Result<(ChunkRecord, Vec<IndexDataRecord>)> {
        let header = self.read_header()?;

        let (fields, data, next) = self.read_record_at(chunk_info.chunk_pos)?;
        let mut chunk = ChunkRecord::parse(&fields, &data)?;
        let expanded =
            options
                .decompressors
                .decompress(&chunk.compression, &chunk.data, chunk.size as usize)?;
        if expanded.len() != chunk.size as usize {
            return Err(BagError::corrupt(
                chunk_info.chunk_pos,
                format!(
                    "chunk decompressed to {} bytes but declares size {}",
                    expanded.len(),
                    chunk.size
                ),
            ));
        }
        chunk.data = expanded;

        let mut index_data = Vec::new();
        let mut offset = next;
        while offset < header.index_pos {
            let (fields, data, next) = self.read_record_at(offset)?;
            if fields.opcode()? != Opcode::IndexData as u8 {
                break;
            }
            index_data.push(IndexDataRecord::parse(&fields, &data)?);
            offset = next;
        }

        Ok((chunk, index_data))
    }

    /// Read one chunk and extract its message data records.
    ///
    /// With `options.lenient` set, records with unexpected opcodes inside
    /// the chunk are skipped with a warning instead of failing.
    pub fn read_chunk_messages(
        &mut self,
        chunk_info: &ChunkInfoRecord,
        options: &ReadOptions,
    ) -> Result<Vec<MessageDataRecord>> {
        let (chunk, _) = self.read_chunk(chunk_info, options)?;
        chunk_messages(&chunk.data, options.lenient)
    }

    /// Consume the reader, returning the underlying source
    pub fn into_source(self) -> S {
        self.source
    }

    /// Read one full record starting at `offset`.
    ///
    /// Returns the parsed header fields, the raw data section and the offset
    /// of the next record.
    fn read_record_at(&mut self, offset: u64) -> Result<(HeaderFields, Vec<u8>, u64)> {
        let header_len = self.read_len(offset)?;
        let header_start = offset + 4;
        let header_bytes = self.source.read_at(header_start, header_len as usize)?;
        let fields =
            parse_fields(&header_bytes).map_err(|e| e.with_base_offset(header_start))?;

        let data_start = header_start + header_len as u64 + 4;
        let data_len = self.read_len(header_start + header_len as u64)?;
        let data = self.source.read_at(data_start, data_len as usize)?;

        Ok((fields, data, data_start + data_len as u64))
    }

    fn read_len(&mut self, offset: u64) -> Result<u32> {
        let bytes = self.source.read_at(offset, 4)?;
        Ok(LittleEndian::read_u32(&bytes))
    }
}
