//! PARAM.SFO key/value metadata codec.

//    SFO structure (little-endian)
//    |magic '\0PSF' 4
//    |version 4 // 0x0101
//    |key_table_offset 4
//    |data_table_offset 4
//    |entry_count 4
//    |index_records[] 16
//      |key_offset 2 //from key_table_offset
//      |format 2
//      |used_len 4
//      |max_len 4
//      |data_offset 4 //from data_table_offset
//    |key_table //'\0'-terminated keys, zero padded to 4 bytes
//    |data_table //one max_len slot per entry, zero padded

use crate::error::{Error, Result};
use crate::utils::{self, read_u16_le, read_u32_le};
use log::debug;
use std::collections::HashSet;

/// SFO magic number
pub const SFO_MAGIC: &[u8; 4] = b"\0PSF";

/// The only SFO version this codec reads and writes
pub const SFO_VERSION: u32 = 0x0101;

/// Size of the fixed header
pub const HEADER_SIZE: usize = 20;

/// Size of one index record
pub const INDEX_RECORD_SIZE: usize = 16;

/// Key table alignment
const KEY_TABLE_ALIGN: usize = 4;

/// SFO header offsets
pub mod offsets {
    pub const MAGIC: usize = 0x00;
    pub const VERSION: usize = 0x04;
    pub const KEY_TABLE: usize = 0x08;
    pub const DATA_TABLE: usize = 0x0C;
    pub const ENTRY_COUNT: usize = 0x10;
}

/// Encoding of a value in the data table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SfoFormat {
    /// UTF-8 without terminator
    Utf8Special,
    /// Null-terminated UTF-8
    Utf8,
    /// 32-bit little-endian integer
    Integer,
}

impl SfoFormat {
    /// The on-disk format tag
    pub fn tag(self) -> u16 {
        match self {
            SfoFormat::Utf8Special => 0x0004,
            SfoFormat::Utf8 => 0x0204,
            SfoFormat::Integer => 0x0404,
        }
    }

    /// Maps an on-disk tag back to a format.
    ///
    /// `0x0402` is a byte-swapped string tag some third-party writers emit;
    /// it reads as [`SfoFormat::Utf8`] and is written back as `0x0204`.
    pub fn from_tag(tag: u16) -> Option<Self> {
        match tag {
            0x0004 => Some(SfoFormat::Utf8Special),
            0x0204 | 0x0402 => Some(SfoFormat::Utf8),
            0x0404 => Some(SfoFormat::Integer),
            _ => None,
        }
    }
}

/// A typed SFO value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SfoValue {
    Integer(u32),
    Utf8(String),
    Utf8Special(String),
}

impl SfoValue {
    pub fn format(&self) -> SfoFormat {
        match self {
            SfoValue::Integer(_) => SfoFormat::Integer,
            SfoValue::Utf8(_) => SfoFormat::Utf8,
            SfoValue::Utf8Special(_) => SfoFormat::Utf8Special,
        }
    }

    /// Bytes the value occupies in its slot, terminator included
    pub fn encoded_len(&self) -> usize {
        match self {
            SfoValue::Integer(_) => 4,
            SfoValue::Utf8(s) => s.len() + 1,
            SfoValue::Utf8Special(s) => s.len(),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            SfoValue::Utf8(s) | SfoValue::Utf8Special(s) => Some(s),
            SfoValue::Integer(_) => None,
        }
    }

    pub fn as_integer(&self) -> Option<u32> {
        match self {
            SfoValue::Integer(v) => Some(*v),
            _ => None,
        }
    }

    fn encode(&self) -> Vec<u8> {
        match self {
            SfoValue::Integer(v) => v.to_le_bytes().to_vec(),
            SfoValue::Utf8(s) => {
                let mut bytes = Vec::with_capacity(s.len() + 1);
                bytes.extend_from_slice(s.as_bytes());
                bytes.push(0);
                bytes
            }
            SfoValue::Utf8Special(s) => s.as_bytes().to_vec(),
        }
    }
}

impl std::fmt::Display for SfoValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SfoValue::Integer(v) => write!(f, "0x{v:08X}"),
            SfoValue::Utf8(s) | SfoValue::Utf8Special(s) => write!(f, "{s}"),
        }
    }
}

/// One key/value pair with its declared slot size
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SfoEntry {
    pub key: String,
    pub value: SfoValue,
    /// Width of the value's slot in the data table
    pub max_len: u32,
}

impl SfoEntry {
    pub fn new(key: impl Into<String>, value: SfoValue, max_len: u32) -> Self {
        Self {
            key: key.into(),
            value,
            max_len,
        }
    }

    /// An integer entry with the standard 4-byte slot
    pub fn integer(key: impl Into<String>, value: u32) -> Self {
        Self::new(key, SfoValue::Integer(value), 4)
    }

    /// A null-terminated string entry
    pub fn string(key: impl Into<String>, value: impl Into<String>, max_len: u32) -> Self {
        Self::new(key, SfoValue::Utf8(value.into()), max_len)
    }

    pub fn format(&self) -> SfoFormat {
        self.value.format()
    }

    fn validate(&self) -> Result<()> {
        if self.key.is_empty() || !self.key.is_ascii() || self.key.contains('\0') {
            return Err(Error::InvalidKey(self.key.clone()));
        }
        if let Some(s) = self.value.as_str()
            && s.contains('\0')
        {
            return Err(Error::invalid_value(
                &self.key,
                "string values cannot contain NUL bytes",
            ));
        }
        let len = self.value.encoded_len();
        if len > self.max_len as usize {
            return Err(Error::ValueTooLong {
                key: self.key.clone(),
                len,
                max: self.max_len as usize,
            });
        }
        Ok(())
    }
}

/// Parsed SFO header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SfoHeader {
    pub version: u32,
    pub key_table_offset: u32,
    pub data_table_offset: u32,
    pub entry_count: u32,
}

impl SfoHeader {
    /// Parses and validates the 20-byte header
    pub fn parse(data: &[u8]) -> Result<Self> {
        validate_magic(data)?;
        if data.len() < HEADER_SIZE {
            return Err(Error::truncated(
                "SFO header",
                HEADER_SIZE as u64,
                data.len() as u64,
            ));
        }

        let version = read_u32_le(data, offsets::VERSION)?;
        if version != SFO_VERSION {
            return Err(Error::Format(format!(
                "Unsupported SFO version 0x{version:04X} (expected 0x{SFO_VERSION:04X})"
            )));
        }

        Ok(Self {
            version,
            key_table_offset: read_u32_le(data, offsets::KEY_TABLE)?,
            data_table_offset: read_u32_le(data, offsets::DATA_TABLE)?,
            entry_count: read_u32_le(data, offsets::ENTRY_COUNT)?,
        })
    }
}

/// Validates that the data starts with the SFO magic number
pub fn validate_magic(data: &[u8]) -> Result<()> {
    match data.get(offsets::MAGIC..offsets::MAGIC + SFO_MAGIC.len()) {
        Some(magic) if magic == SFO_MAGIC => Ok(()),
        _ => Err(Error::Format("Not an SFO file".to_string())),
    }
}

/// Encodes an ordered list of entries into an SFO blob
pub fn encode(entries: &[SfoEntry]) -> Result<Vec<u8>> {
    validate_entries(entries)?;

    let mut key_table = Vec::new();
    let mut key_offsets = Vec::with_capacity(entries.len());
    for entry in entries {
        let offset = u16::try_from(key_table.len())
            .map_err(|_| Error::Layout("SFO key table exceeds 64 KiB".to_string()))?;
        key_offsets.push(offset);
        key_table.extend_from_slice(entry.key.as_bytes());
        key_table.push(0);
    }
    key_table.resize(key_table.len().next_multiple_of(KEY_TABLE_ALIGN), 0);

    let index_size = entries.len() * INDEX_RECORD_SIZE;
    let key_table_offset = HEADER_SIZE + index_size;
    let data_table_offset = key_table_offset + key_table.len();
    let data_table_size = entries
        .iter()
        .try_fold(0u32, |acc, e| acc.checked_add(e.max_len))
        .ok_or_else(|| Error::Layout("SFO data table exceeds 4 GiB".to_string()))?;

    let to_u32 = |v: usize| {
        u32::try_from(v).map_err(|_| Error::Layout("SFO table offset exceeds 4 GiB".to_string()))
    };

    let mut out = Vec::with_capacity(data_table_offset + data_table_size as usize);
    out.extend_from_slice(SFO_MAGIC);
    out.extend_from_slice(&SFO_VERSION.to_le_bytes());
    out.extend_from_slice(&to_u32(key_table_offset)?.to_le_bytes());
    out.extend_from_slice(&to_u32(data_table_offset)?.to_le_bytes());
    out.extend_from_slice(&to_u32(entries.len())?.to_le_bytes());

    let mut data_offset = 0u32;
    for (entry, key_offset) in entries.iter().zip(&key_offsets) {
        out.extend_from_slice(&key_offset.to_le_bytes());
        out.extend_from_slice(&entry.format().tag().to_le_bytes());
        out.extend_from_slice(&(entry.value.encoded_len() as u32).to_le_bytes());
        out.extend_from_slice(&entry.max_len.to_le_bytes());
        out.extend_from_slice(&data_offset.to_le_bytes());
        data_offset += entry.max_len;
    }

    out.extend_from_slice(&key_table);

    for entry in entries {
        let value = entry.value.encode();
        out.extend_from_slice(&value);
        out.resize(out.len() + entry.max_len as usize - value.len(), 0);
    }

    debug!(
        "Encoded SFO: {} entries, key table at 0x{:X}, data table at 0x{:X}, {} bytes",
        entries.len(),
        key_table_offset,
        data_table_offset,
        out.len()
    );

    Ok(out)
}

/// Decodes an SFO blob into its ordered entries
pub fn decode(data: &[u8]) -> Result<Vec<SfoEntry>> {
    let header = SfoHeader::parse(data)?;
    let available = data.len() as u64;

    let index_end = HEADER_SIZE as u64 + header.entry_count as u64 * INDEX_RECORD_SIZE as u64;
    if index_end > available {
        return Err(Error::truncated("SFO index table", index_end, available));
    }
    if (header.key_table_offset as u64) < index_end {
        return Err(Error::Layout(format!(
            "SFO key table at 0x{:X} overlaps the index table ending at 0x{:X}",
            header.key_table_offset, index_end
        )));
    }
    if header.data_table_offset < header.key_table_offset {
        return Err(Error::Layout(format!(
            "SFO data table at 0x{:X} precedes the key table at 0x{:X}",
            header.data_table_offset, header.key_table_offset
        )));
    }
    if header.data_table_offset as u64 > available {
        return Err(Error::truncated(
            "SFO key table",
            header.data_table_offset as u64,
            available,
        ));
    }

    let key_table = &data[header.key_table_offset as usize..header.data_table_offset as usize];
    let mut entries = Vec::with_capacity(header.entry_count as usize);
    let mut seen = HashSet::new();

    for i in 0..header.entry_count as usize {
        let record = HEADER_SIZE + i * INDEX_RECORD_SIZE;
        let key_offset = read_u16_le(data, record)? as usize;
        let tag = read_u16_le(data, record + 2)?;
        let used_len = read_u32_le(data, record + 4)?;
        let max_len = read_u32_le(data, record + 8)?;
        let data_offset = read_u32_le(data, record + 12)?;

        let key = read_key(key_table, key_offset)?;
        if !seen.insert(key.clone()) {
            return Err(Error::DuplicateKey(key));
        }

        let format = SfoFormat::from_tag(tag).ok_or_else(|| {
            Error::Format(format!("Unknown SFO format tag 0x{tag:04X} for '{key}'"))
        })?;
        if used_len > max_len {
            return Err(Error::Format(format!(
                "'{key}' uses {used_len} bytes of a {max_len}-byte slot"
            )));
        }

        let slot_start = header.data_table_offset as u64 + data_offset as u64;
        let slot_end = slot_start + max_len as u64;
        if slot_end > available {
            return Err(Error::truncated(format!("SFO value '{key}'"), slot_end, available));
        }
        let used = &data[slot_start as usize..slot_start as usize + used_len as usize];

        let value = match format {
            SfoFormat::Integer => {
                if used_len != 4 {
                    return Err(Error::Format(format!(
                        "Integer '{key}' has length {used_len}, expected 4"
                    )));
                }
                SfoValue::Integer(read_u32_le(used, 0)?)
            }
            SfoFormat::Utf8 => SfoValue::Utf8(decode_str(&key, used)?),
            SfoFormat::Utf8Special => SfoValue::Utf8Special(decode_str(&key, used)?),
        };

        entries.push(SfoEntry {
            key,
            value,
            max_len,
        });
    }

    Ok(entries)
}

fn read_key(key_table: &[u8], offset: usize) -> Result<String> {
    let tail = key_table.get(offset..).ok_or_else(|| {
        Error::truncated("SFO key", offset as u64, key_table.len() as u64)
    })?;
    let end = tail
        .iter()
        .position(|&b| b == 0)
        .ok_or_else(|| Error::Format("Unterminated key in SFO key table".to_string()))?;
    let key = std::str::from_utf8(&tail[..end])
        .ok()
        .filter(|k| k.is_ascii())
        .ok_or_else(|| Error::Format("Non-ASCII key in SFO key table".to_string()))?;
    Ok(key.to_string())
}

fn decode_str(key: &str, used: &[u8]) -> Result<String> {
    String::from_utf8(utils::trim_nul(used).to_vec())
        .map_err(|e| Error::Format(format!("Invalid UTF-8 in '{key}': {e}")))
}

fn validate_entries(entries: &[SfoEntry]) -> Result<()> {
    let mut seen = HashSet::new();
    for entry in entries {
        entry.validate()?;
        if !seen.insert(entry.key.as_str()) {
            return Err(Error::DuplicateKey(entry.key.clone()));
        }
    }
    Ok(())
}

/// An ordered SFO document
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SfoDocument {
    entries: Vec<SfoEntry>,
}

impl SfoDocument {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a document, rejecting duplicate keys and oversized values
    pub fn from_entries(entries: Vec<SfoEntry>) -> Result<Self> {
        validate_entries(&entries)?;
        Ok(Self { entries })
    }

    /// The parameter set of an additional-content (DLC) package
    pub fn additional_content(
        content_id: &str,
        title: &str,
        title_id: &str,
        version: &str,
    ) -> Result<Self> {
        Self::from_entries(vec![
            SfoEntry::integer("ATTRIBUTE", 0),
            SfoEntry::string("CATEGORY", "ac", 4),
            SfoEntry::string("CONTENT_ID", content_id, 48),
            SfoEntry::string("FORMAT", "obs", 4),
            SfoEntry::string("TITLE", title, 128),
            SfoEntry::string("TITLE_ID", title_id, 12),
            SfoEntry::string("VERSION", version, 8),
        ])
    }

    /// Decodes a document from SFO bytes
    pub fn decode(data: &[u8]) -> Result<Self> {
        decode(data).map(|entries| Self { entries })
    }

    /// Encodes the document to SFO bytes
    pub fn encode(&self) -> Result<Vec<u8>> {
        encode(&self.entries)
    }

    pub fn entries(&self) -> &[SfoEntry] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<SfoEntry> {
        self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&SfoValue> {
        self.entries.iter().find(|e| e.key == key).map(|e| &e.value)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(SfoValue::as_str)
    }

    pub fn get_integer(&self, key: &str) -> Option<u32> {
        self.get(key).and_then(SfoValue::as_integer)
    }

    /// Replaces the entry with the same key, or appends a new one
    pub fn insert(&mut self, entry: SfoEntry) -> Result<()> {
        entry.validate()?;
        match self.entries.iter_mut().find(|e| e.key == entry.key) {
            Some(existing) => *existing = entry,
            None => self.entries.push(entry),
        }
        Ok(())
    }

    pub fn remove(&mut self, key: &str) -> Option<SfoEntry> {
        let index = self.entries.iter().position(|e| e.key == key)?;
        Some(self.entries.remove(index))
    }

    /// Orders entries by key, as console-generated files do
    pub fn sort_keys(&mut self) {
        self.entries.sort_by(|a, b| a.key.cmp(&b.key));
    }
}
