//! Error types for rosbag-rs

use thiserror::Error;

/// Result type alias for rosbag-rs operations
pub type Result<T> = std::result::Result<T, BagError>;

/// Errors that can occur when working with ROS1 bag files
#[derive(Error, Debug)]
pub enum BagError {
    /// IO error when accessing the byte source
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The file does not start with the `#ROSBAG V2.0\n` magic line
    #[error("not a ROS bag: bad magic at start of file")]
    BadMagic,

    /// A header field block ended in the middle of a length prefix
    #[error("truncated header field block at offset {offset}")]
    Truncated { offset: u64 },

    /// A record or field block contains an impossible length
    #[error("corrupt record at offset {offset}: {reason}")]
    Corrupt { offset: u64, reason: String },

    /// A header field has no `=` separator
    #[error("malformed header field at offset {offset}: missing '=' separator")]
    Malformed { offset: u64 },

    /// A record header has no `op` field
    #[error("record header is missing the 'op' field")]
    MissingOp,

    /// A record carried a different opcode than the one being parsed
    #[error("expected opcode {expected:#04x}, found {found:#04x}")]
    OpcodeMismatch { expected: u8, found: u8 },

    /// A required header field is absent
    #[error("record header is missing required field '{name}'")]
    MissingField { name: &'static str },

    /// A header field value has the wrong width or encoding
    #[error("record header field '{name}' has an invalid value")]
    InvalidField { name: &'static str },

    /// An index data record's count disagrees with its data section
    #[error("index data claims {count} entries but carries {len} bytes")]
    CorruptIndex { count: u32, len: usize },

    /// A chunk info record's count disagrees with its data section
    #[error("chunk info claims {count} entries but carries {len} bytes")]
    CorruptChunkInfo { count: u32, len: usize },

    /// The byte source ran out before a full record could be read
    #[error("unexpected end of file at offset {offset}")]
    UnexpectedEof { offset: u64 },

    /// A record with an unexpected opcode appeared inside a chunk
    #[error("unexpected opcode {op:#04x} at offset {offset}")]
    UnexpectedOpcode { op: u8, offset: u64 },

    /// Refused to compose a record with an empty header block
    #[error("refusing to compose an empty record header")]
    EmptyHeader,

    /// A connection has no message type
    #[error("connection {conn} has no message type")]
    NoType { conn: u32 },

    /// Two connections report different message types for one topic
    #[error("topic {topic} has conflicting message types: {first} and {second}")]
    TopicTypeConflict {
        topic: String,
        first: String,
        second: String,
    },

    /// No codec is registered for a compression name
    #[error("no codec registered for compression '{compression}'")]
    UnknownCompression { compression: String },

    /// A chunk payload failed to decompress
    #[error("decompression failed for '{compression}': {reason}")]
    Decompress { compression: String, reason: String },

    /// A chunk payload failed to compress
    #[error("compression failed for '{compression}': {reason}")]
    Compress { compression: String, reason: String },
}

impl BagError {
    /// Create a corrupt-record error
    pub fn corrupt(offset: u64, reason: impl Into<String>) -> Self {
        Self::Corrupt {
            offset,
            reason: reason.into(),
        }
    }

    /// Create a decompression error
    pub fn decompress(compression: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Decompress {
            compression: compression.into(),
            reason: reason.into(),
        }
    }

    /// Create a compression error
    pub fn compress(compression: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Compress {
            compression: compression.into(),
            reason: reason.into(),
        }
    }

    /// Shift buffer-relative offsets to absolute file offsets.
    ///
    /// Codec errors raised while parsing an in-memory block carry offsets
    /// relative to that block; the reader rebases them before surfacing.
    pub fn with_base_offset(self, base: u64) -> Self {
        match self {
            Self::Truncated { offset } => Self::Truncated {
                offset: base + offset,
            },
            Self::Corrupt { offset, reason } => Self::Corrupt {
                offset: base + offset,
                reason,
            },
            Self::Malformed { offset } => Self::Malformed {
                offset: base + offset,
            },
            Self::UnexpectedEof { offset } => Self::UnexpectedEof {
                offset: base + offset,
            },
            Self::UnexpectedOpcode { op, offset } => Self::UnexpectedOpcode {
                op,
                offset: base + offset,
            },
            other => other,
        }
    }
}
