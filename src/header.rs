//! Record header field codec
//!
//! Every bag record starts with a header block: a 32-bit little-endian total
//! length followed by a sequence of `<field_len: u32><name>=<value>` entries.
//! Names are ASCII; values are raw bytes whose meaning depends on the record
//! kind, so they are kept opaque here and decoded by the typed accessors.

use std::io::Cursor;

use byteorder::{ByteOrder, LittleEndian, ReadBytesExt};

use crate::error::{BagError, Result};
use crate::types::Time;

/// An ordered `name=value` field map from one record header.
///
/// Insertion order is preserved so composed headers are deterministic.
/// Inserting a name that is already present replaces its value in place,
/// which also gives duplicate fields in a parsed header last-write-wins
/// semantics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderFields {
    entries: Vec<(String, Vec<u8>)>,
}

impl HeaderFields {
    /// Create an empty field map
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of fields
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the map holds no fields
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Insert a field, replacing any existing value for the same name
    pub fn insert(&mut self, name: impl Into<String>, value: Vec<u8>) {
        let name = name.into();
        if let Some(entry) = self.entries.iter_mut().find(|(n, _)| *n == name) {
            entry.1 = value;
        } else {
            self.entries.push((name, value));
        }
    }

    /// Look up a field value by name
    pub fn get(&self, name: &str) -> Option<&[u8]> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_slice())
    }

    /// Iterate over fields in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_slice()))
    }

    /// Look up a field value, failing if it is absent
    pub fn require(&self, name: &'static str) -> Result<&[u8]> {
        self.get(name).ok_or(BagError::MissingField { name })
    }

    /// Decode a field as a little-endian u32
    pub fn get_u32(&self, name: &'static str) -> Result<u32> {
        let value = self.require(name)?;
        if value.len() != 4 {
            return Err(BagError::InvalidField { name });
        }
        Ok(LittleEndian::read_u32(value))
    }

    /// Decode a field as a little-endian u64 (lo u32, hi u32)
    pub fn get_u64(&self, name: &'static str) -> Result<u64> {
        let value = self.require(name)?;
        if value.len() != 8 {
            return Err(BagError::InvalidField { name });
        }
        Ok(LittleEndian::read_u64(value))
    }

    /// Decode a field as a bag timestamp (sec u32, nsec u32)
    pub fn get_time(&self, name: &'static str) -> Result<Time> {
        let value = self.require(name)?;
        if value.len() != 8 {
            return Err(BagError::InvalidField { name });
        }
        Ok(Time::new(
            LittleEndian::read_u32(&value[..4]),
            LittleEndian::read_u32(&value[4..]),
        ))
    }

    /// Decode a field as ASCII text
    pub fn get_str(&self, name: &'static str) -> Result<String> {
        let value = self.require(name)?;
        Ok(String::from_utf8_lossy(value).into_owned())
    }

    /// Decode the one-byte opcode field, if present and well-formed
    pub fn opcode(&self) -> Result<u8> {
        let value = self.get("op").ok_or(BagError::MissingOp)?;
        if value.len() != 1 {
            return Err(BagError::InvalidField { name: "op" });
        }
        Ok(value[0])
    }

    /// Insert a little-endian u32 field
    pub fn insert_u32(&mut self, name: &str, value: u32) {
        self.insert(name, value.to_le_bytes().to_vec());
    }

    /// Insert a little-endian u64 field
    pub fn insert_u64(&mut self, name: &str, value: u64) {
        self.insert(name, value.to_le_bytes().to_vec());
    }

    /// Insert a timestamp field
    pub fn insert_time(&mut self, name: &str, value: Time) {
        let mut bytes = Vec::with_capacity(8);
        bytes.extend_from_slice(&value.sec.to_le_bytes());
        bytes.extend_from_slice(&value.nsec.to_le_bytes());
        self.insert(name, bytes);
    }

    /// Insert an ASCII text field
    pub fn insert_str(&mut self, name: &str, value: &str) {
        self.insert(name, value.as_bytes().to_vec());
    }

    /// Insert the one-byte opcode field
    pub fn insert_op(&mut self, op: u8) {
        self.insert("op", vec![op]);
    }
}

/// Parse a buffer of `<field_len: u32><name>=<value>` entries.
///
/// Offsets in the returned errors are relative to `buf`.
pub fn parse_fields(buf: &[u8]) -> Result<HeaderFields> {
    let mut cursor = Cursor::new(buf);
    let mut fields = HeaderFields::new();

    while (cursor.position() as usize) < buf.len() {
        let field_start = cursor.position();
        if buf.len() - (field_start as usize) < 4 {
            return Err(BagError::Truncated {
                offset: field_start,
            });
        }

        let field_len = cursor.read_u32::<LittleEndian>()? as usize;
        let value_end = cursor.position() as usize + field_len;
        if value_end > buf.len() {
            return Err(BagError::corrupt(
                field_start,
                format!(
                    "field length {field_len} overruns the header block ({} bytes left)",
                    buf.len() - cursor.position() as usize
                ),
            ));
        }

        let field = &buf[cursor.position() as usize..value_end];
        cursor.set_position(value_end as u64);

        let eq = field
            .iter()
            .position(|&b| b == b'=')
            .ok_or(BagError::Malformed {
                offset: field_start,
            })?;
        let name = String::from_utf8_lossy(&field[..eq]).into_owned();
        fields.insert(name, field[eq + 1..].to_vec());
    }

    Ok(fields)
}

/// Serialize fields as `<field_len: u32><name>=<value>` entries
pub fn write_fields(fields: &HeaderFields, out: &mut Vec<u8>) {
    for (name, value) in fields.iter() {
        let field_len = name.len() + 1 + value.len();
        out.extend_from_slice(&(field_len as u32).to_le_bytes());
        out.extend_from_slice(name.as_bytes());
        out.push(b'=');
        out.extend_from_slice(value);
    }
}

/// Serialize a header block: 32-bit total length followed by the fields.
///
/// Fails with [`BagError::EmptyHeader`] when the field map is empty, since a
/// zero-length header block cannot name a record kind.
pub fn write_header(fields: &HeaderFields, out: &mut Vec<u8>) -> Result<()> {
    let mut block = Vec::new();
    write_fields(fields, &mut block);
    if block.is_empty() {
        return Err(BagError::EmptyHeader);
    }
    out.extend_from_slice(&(block.len() as u32).to_le_bytes());
    out.extend_from_slice(&block);
    Ok(())
}
