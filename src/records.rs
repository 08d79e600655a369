//! Record types and the per-kind record codec
//!
//! A bag is a sequence of records, each laid out as
//! `<header_len: u32><header><data_len: u32><data>` with all integers
//! little-endian. The header is a field block (see [`crate::header`]) whose
//! one-byte `op` field discriminates the record kind; the data section is
//! decoded per kind.

use std::io::Cursor;

use byteorder::{LittleEndian, ReadBytesExt};
use tracing::warn;

use crate::error::{BagError, Result};
use crate::header::{parse_fields, write_header, HeaderFields};
use crate::types::Time;

/// Magic line at the start of every bag file
pub const MAGIC: &[u8; 13] = b"#ROSBAG V2.0\n";

/// The bag header record occupies this many bytes of header plus padding,
/// so the chunk section always starts at a deterministic offset and a
/// two-pass writer can patch `index_pos` in place.
pub const FILE_HEADER_LEN: usize = 4096;

/// Total on-disk size of the bag header record including both length
/// prefixes: [`FILE_HEADER_LEN`] + 8.
pub const FILE_HEADER_RECORD_LEN: usize = FILE_HEADER_LEN + 8;

/// Version emitted in index data records
pub const INDEX_VERSION: u32 = 1;

/// Version emitted in chunk info records
pub const CHUNK_INFO_VERSION: u32 = 1;

/// Record kind opcodes.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    MessageData = 0x02,
    BagHeader = 0x03,
    IndexData = 0x04,
    Chunk = 0x05,
    ChunkInfo = 0x06,
    Connection = 0x07,
}

impl TryFrom<u8> for Opcode {
    type Error = u8;

    fn try_from(value: u8) -> std::result::Result<Self, u8> {
        match value {
            0x02 => Ok(Opcode::MessageData),
            0x03 => Ok(Opcode::BagHeader),
            0x04 => Ok(Opcode::IndexData),
            0x05 => Ok(Opcode::Chunk),
            0x06 => Ok(Opcode::ChunkInfo),
            0x07 => Ok(Opcode::Connection),
            other => Err(other),
        }
    }
}

/// Check a parsed header against the opcode the caller expects.
pub fn expect_op(fields: &HeaderFields, expected: Opcode) -> Result<()> {
    let found = fields.opcode()?;
    if found != expected as u8 {
        return Err(BagError::OpcodeMismatch {
            expected: expected as u8,
            found,
        });
    }
    Ok(())
}

/// Serialize one record: header block followed by the data section.
pub fn write_record(fields: &HeaderFields, data: &[u8], out: &mut Vec<u8>) -> Result<()> {
    write_header(fields, out)?;
    out.extend_from_slice(&(data.len() as u32).to_le_bytes());
    out.extend_from_slice(data);
    Ok(())
}

/// Split the record starting at `pos` out of an in-memory buffer.
///
/// Returns the parsed header fields, the raw data section, and the offset of
/// the next record. Error offsets are relative to `buf`.
pub fn parse_record(buf: &[u8], pos: usize) -> Result<(HeaderFields, &[u8], usize)> {
    let mut cursor = Cursor::new(buf);
    cursor.set_position(pos as u64);

    let header_len = read_len(&mut cursor, buf.len())? as usize;
    let header_start = cursor.position() as usize;
    let header_end = header_start + header_len;
    if header_end > buf.len() {
        return Err(BagError::UnexpectedEof {
            offset: buf.len() as u64,
        });
    }
    let fields = parse_fields(&buf[header_start..header_end])
        .map_err(|e| e.with_base_offset(header_start as u64))?;
    cursor.set_position(header_end as u64);

    let data_len = read_len(&mut cursor, buf.len())? as usize;
    let data_start = cursor.position() as usize;
    let data_end = data_start + data_len;
    if data_end > buf.len() {
        return Err(BagError::UnexpectedEof {
            offset: buf.len() as u64,
        });
    }

    Ok((fields, &buf[data_start..data_end], data_end))
}

fn read_len(cursor: &mut Cursor<&[u8]>, buf_len: usize) -> Result<u32> {
    if buf_len - (cursor.position() as usize) < 4 {
        return Err(BagError::UnexpectedEof {
            offset: buf_len as u64,
        });
    }
    Ok(cursor.read_u32::<LittleEndian>()?)
}

/// The global header record at the front of every bag.
///
/// `index_pos` locates the first record after the chunk section, which is
/// where the connection and chunk-info summary sections begin.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BagHeaderRecord {
    /// Offset of the first record after the chunk section
    pub index_pos: u64,
    /// Number of connection records in the summary section
    pub conn_count: u32,
    /// Number of chunk info records in the summary section
    pub chunk_count: u32,
}

impl BagHeaderRecord {
    /// Parse from header fields; the padding data section is discarded.
    pub fn parse(fields: &HeaderFields) -> Result<Self> {
        expect_op(fields, Opcode::BagHeader)?;
        Ok(Self {
            index_pos: fields.get_u64("index_pos")?,
            conn_count: fields.get_u32("conn_count")?,
            chunk_count: fields.get_u32("chunk_count")?,
        })
    }

    /// Serialize the record, space-padded so it occupies exactly
    /// [`FILE_HEADER_RECORD_LEN`] bytes regardless of field values.
    pub fn write(&self, out: &mut Vec<u8>) -> Result<()> {
        let mut fields = HeaderFields::new();
        fields.insert_u64("index_pos", self.index_pos);
        fields.insert_u32("conn_count", self.conn_count);
        fields.insert_u32("chunk_count", self.chunk_count);
        fields.insert_op(Opcode::BagHeader as u8);

        let mut header = Vec::new();
        crate::header::write_fields(&fields, &mut header);

        let pad_len = FILE_HEADER_LEN - header.len();
        out.extend_from_slice(&(header.len() as u32).to_le_bytes());
        out.extend_from_slice(&header);
        out.extend_from_slice(&(pad_len as u32).to_le_bytes());
        out.resize(out.len() + pad_len, b' ');
        Ok(())
    }
}

/// One time-stamped message payload on a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageDataRecord {
    /// Connection the message was published on
    pub conn: u32,
    /// Receive timestamp
    pub time: Time,
    /// Opaque serialized message payload
    pub data: Vec<u8>,
}

impl MessageDataRecord {
    pub fn parse(fields: &HeaderFields, data: &[u8]) -> Result<Self> {
        expect_op(fields, Opcode::MessageData)?;
        Ok(Self {
            conn: fields.get_u32("conn")?,
            time: fields.get_time("time")?,
            data: data.to_vec(),
        })
    }

    pub fn write(&self, out: &mut Vec<u8>) -> Result<()> {
        let mut fields = HeaderFields::new();
        fields.insert_u32("conn", self.conn);
        fields.insert_time("time", self.time);
        fields.insert_op(Opcode::MessageData as u8);
        write_record(&fields, &self.data, out)
    }
}

/// A batch of message data (and possibly connection) records, stored as a
/// possibly compressed blob.
///
/// `data` holds the payload as it currently exists in memory: as stored on
/// disk after a raw parse, or expanded after [`crate::BagReader::read_chunk`]
/// has run it through a decompressor. `size` is always the uncompressed
/// byte count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkRecord {
    /// Compression name, e.g. `"none"`, `"bz2"`, `"lz4"`
    pub compression: String,
    /// Uncompressed size of the chunk contents
    pub size: u32,
    /// Chunk payload
    pub data: Vec<u8>,
}

impl ChunkRecord {
    pub fn parse(fields: &HeaderFields, data: &[u8]) -> Result<Self> {
        expect_op(fields, Opcode::Chunk)?;
        Ok(Self {
            compression: fields.get_str("compression")?,
            size: fields.get_u32("size")?,
            data: data.to_vec(),
        })
    }

    /// Header fields in canonical order; the data section is written by the
    /// caller, which knows whether the payload still needs compressing.
    pub fn header_fields(&self) -> HeaderFields {
        let mut fields = HeaderFields::new();
        fields.insert_str("compression", &self.compression);
        fields.insert_u32("size", self.size);
        fields.insert_op(Opcode::Chunk as u8);
        fields
    }

    /// Serialize the record with `data` written as-is. The payload must
    /// already match `compression`.
    pub fn write(&self, out: &mut Vec<u8>) -> Result<()> {
        write_record(&self.header_fields(), &self.data, out)
    }

    /// Expand the payload through a decompressor table.
    pub fn decompress(&self, table: &crate::compression::DecompressorTable) -> Result<Vec<u8>> {
        table.decompress(&self.compression, &self.data, self.size as usize)
    }
}

/// One `(time, offset)` index entry within a chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexEntry {
    /// Message receive time
    pub time: Time,
    /// Byte offset of the message record within the chunk's uncompressed data
    pub offset: u32,
}

/// Per-connection random-access index for one chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDataRecord {
    /// Index format version (1)
    pub ver: u32,
    /// Connection the entries belong to
    pub conn: u32,
    /// Entries in message order
    pub entries: Vec<IndexEntry>,
}

impl IndexDataRecord {
    pub fn parse(fields: &HeaderFields, data: &[u8]) -> Result<Self> {
        expect_op(fields, Opcode::IndexData)?;
        let ver = fields.get_u32("ver")?;
        let conn = fields.get_u32("conn")?;
        let count = fields.get_u32("count")?;

        if data.len() != count as usize * 12 {
            return Err(BagError::CorruptIndex {
                count,
                len: data.len(),
            });
        }

        let mut cursor = Cursor::new(data);
        let mut entries = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let sec = cursor.read_u32::<LittleEndian>()?;
            let nsec = cursor.read_u32::<LittleEndian>()?;
            let offset = cursor.read_u32::<LittleEndian>()?;
            entries.push(IndexEntry {
                time: Time::new(sec, nsec),
                offset,
            });
        }

        Ok(Self { ver, conn, entries })
    }

    pub fn write(&self, out: &mut Vec<u8>) -> Result<()> {
        let mut fields = HeaderFields::new();
        fields.insert_u32("ver", self.ver);
        fields.insert_u32("conn", self.conn);
        fields.insert_u32("count", self.entries.len() as u32);
        fields.insert_op(Opcode::IndexData as u8);

        let mut data = Vec::with_capacity(self.entries.len() * 12);
        for entry in &self.entries {
            data.extend_from_slice(&entry.time.sec.to_le_bytes());
            data.extend_from_slice(&entry.time.nsec.to_le_bytes());
            data.extend_from_slice(&entry.offset.to_le_bytes());
        }
        write_record(&fields, &data, out)
    }
}

/// One publisher stream: a topic plus its message type metadata.
///
/// The type metadata lives in a second field block in the record's data
/// section; `topic` is duplicated there and the data block wins on parse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionRecord {
    /// Connection id referenced by message data and index records
    pub conn: u32,
    /// Topic name, e.g. `/camera/image`
    pub topic: String,
    /// Message datatype, e.g. `sensor_msgs/Image`
    pub datatype: String,
    /// MD5 sum of the message definition
    pub md5sum: String,
    /// Full message definition text
    pub message_definition: String,
    /// Publishing node, when recorded
    pub callerid: Option<String>,
    /// Whether the publisher latched, when recorded
    pub latching: Option<bool>,
}

impl ConnectionRecord {
    pub fn parse(fields: &HeaderFields, data: &[u8]) -> Result<Self> {
        expect_op(fields, Opcode::Connection)?;
        let conn = fields.get_u32("conn")?;
        let header_topic = fields.get_str("topic")?;

        let info = parse_fields(data)?;
        let topic = match info.get("topic") {
            Some(value) => String::from_utf8_lossy(value).into_owned(),
            None => header_topic,
        };

        Ok(Self {
            conn,
            topic,
            datatype: info.get_str("type")?,
            md5sum: info.get_str("md5sum")?,
            message_definition: info.get_str("message_definition")?,
            callerid: info
                .get("callerid")
                .map(|v| String::from_utf8_lossy(v).into_owned()),
            latching: info.get("latching").map(|v| v == b"1"),
        })
    }

    pub fn write(&self, out: &mut Vec<u8>) -> Result<()> {
        let mut fields = HeaderFields::new();
        fields.insert_u32("conn", self.conn);
        fields.insert_str("topic", &self.topic);
        fields.insert_op(Opcode::Connection as u8);

        let mut info = HeaderFields::new();
        info.insert_str("topic", &self.topic);
        info.insert_str("type", &self.datatype);
        info.insert_str("md5sum", &self.md5sum);
        info.insert_str("message_definition", &self.message_definition);
        if let Some(callerid) = &self.callerid {
            info.insert_str("callerid", callerid);
        }
        if let Some(latching) = self.latching {
            info.insert_str("latching", if latching { "1" } else { "0" });
        }

        let mut data = Vec::new();
        crate::header::write_fields(&info, &mut data);
        write_record(&fields, &data, out)
    }
}

/// Per-connection message count for one chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkConnectionCount {
    /// Connection id
    pub conn: u32,
    /// Messages for that connection inside the chunk
    pub count: u32,
}

/// Trailer record locating a chunk on disk with its time range and
/// per-connection message counts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkInfoRecord {
    /// Chunk info format version (1)
    pub ver: u32,
    /// Offset of the chunk record in the file
    pub chunk_pos: u64,
    /// Earliest message time inside the chunk
    pub start_time: Time,
    /// Latest message time inside the chunk
    pub end_time: Time,
    /// Per-connection counts
    pub entries: Vec<ChunkConnectionCount>,
}

impl ChunkInfoRecord {
    /// Sum of the per-connection counts
    pub fn message_count(&self) -> u64 {
        self.entries.iter().map(|e| e.count as u64).sum()
    }

    pub fn parse(fields: &HeaderFields, data: &[u8]) -> Result<Self> {
        expect_op(fields, Opcode::ChunkInfo)?;
        let ver = fields.get_u32("ver")?;
        let chunk_pos = fields.get_u64("chunk_pos")?;
        let start_time = fields.get_time("start_time")?;
        let end_time = fields.get_time("end_time")?;
        let count = fields.get_u32("count")?;

        if data.len() != count as usize * 8 {
            return Err(BagError::CorruptChunkInfo {
                count,
                len: data.len(),
            });
        }

        let mut cursor = Cursor::new(data);
        let mut entries = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let conn = cursor.read_u32::<LittleEndian>()?;
            let count = cursor.read_u32::<LittleEndian>()?;
            entries.push(ChunkConnectionCount { conn, count });
        }

        Ok(Self {
            ver,
            chunk_pos,
            start_time,
            end_time,
            entries,
        })
    }

    pub fn write(&self, out: &mut Vec<u8>) -> Result<()> {
        let mut fields = HeaderFields::new();
        fields.insert_u32("ver", self.ver);
        fields.insert_u64("chunk_pos", self.chunk_pos);
        fields.insert_time("start_time", self.start_time);
        fields.insert_time("end_time", self.end_time);
        fields.insert_u32("count", self.entries.len() as u32);
        fields.insert_op(Opcode::ChunkInfo as u8);

        let mut data = Vec::with_capacity(self.entries.len() * 8);
        for entry in &self.entries {
            data.extend_from_slice(&entry.conn.to_le_bytes());
            data.extend_from_slice(&entry.count.to_le_bytes());
        }
        write_record(&fields, &data, out)
    }
}

/// Extract the message data records from a chunk's uncompressed contents.
///
/// Connection records duplicated inside chunks are skipped. Any other opcode
/// is skipped with a warning when `lenient` is set and fails with
/// [`BagError::UnexpectedOpcode`] otherwise. Offsets in errors are relative
/// to `data`.
pub fn chunk_messages(data: &[u8], lenient: bool) -> Result<Vec<MessageDataRecord>> {
    let mut messages = Vec::new();
    let mut pos = 0;

    while pos < data.len() {
        let record_start = pos;
        let (fields, record_data, next) = parse_record(data, pos)?;
        pos = next;

        let op = fields.opcode()?;
        match Opcode::try_from(op) {
            Ok(Opcode::MessageData) => {
                messages.push(MessageDataRecord::parse(&fields, record_data)?);
            }
            Ok(Opcode::Connection) => {}
            _ if lenient => {
                warn!(op, offset = record_start, "skipping unexpected record in chunk");
            }
            _ => {
                return Err(BagError::UnexpectedOpcode {
                    op,
                    offset: record_start as u64,
                });
            }
        }
    }

    Ok(messages)
}
