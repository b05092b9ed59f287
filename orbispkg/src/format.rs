//! PKG format constants and low-level parsing functions.

//    PKG structure (big-endian)
//    |header 0x1000
//      |magic 0x7F 'CNT' 4
//      |type 4
//      |flags 4
//      |file_count 4
//      |entry_count 4
//      |sc_entry_count 2
//      |entry_count_2 2
//      |entry_table_offset 4
//      |entry_table_size 4
//      |body_offset 8
//      |body_size 8
//      |content_offset 8
//      |content_size 8
//      |content_id 36 //ascii, zero padded, then 12 zero bytes
//      |drm_type 4 //faddr 0x70
//      |content_type 4
//      |content_flags 4
//      |00 .. //up to 0x100
//      |digest area //faddr 0x100 up to 0x1000, opaque
//    |entry_table[] 32
//      |id 4
//      |name_offset 4
//      |flags1 4
//      |flags2 4
//      |file_offset 8
//      |file_size 8
//    |body //payloads, each zero padded to the alignment boundary

use crate::error::{Error, Result};
use crate::utils::{self, read_u16_be, read_u32_be, read_u64_be};
use std::fmt;

/// PKG magic number (0x7F 'C' 'N' 'T')
pub const PKG_MAGIC: u32 = 0x7F43_4E54;

/// Size of the fixed header region; the entry table starts right after it
pub const HEADER_SIZE: usize = 0x1000;

/// Size of one entry table record
pub const ENTRY_SIZE: usize = 32;

/// Length of the content id field
pub const CONTENT_ID_LEN: usize = 36;

/// Start and length of the opaque digest area inside the header region
pub const DIGEST_AREA_OFFSET: usize = 0x100;
pub const DIGEST_AREA_LEN: usize = HEADER_SIZE - DIGEST_AREA_OFFSET;

/// Package type written by the builder
pub const PKG_TYPE_FAKE: u32 = 0x0000_0001;

/// DRM type of console packages
pub const DRM_TYPE_PS4: u32 = 0x0000_000F;

/// Content type of additional content (DLC) without its own game data
pub const CONTENT_TYPE_AC: u32 = 0x0000_001B;

/// Content type of additional content with game data
pub const CONTENT_TYPE_GD: u32 = 0x0000_001A;

/// Default content flags of additional content
pub const CONTENT_FLAGS_AC: u32 = 0x0A00_0000;

/// Default region prefix of generated content ids
pub const DEFAULT_REGION: &str = "EP0001";

/// Default title id of generated content ids
pub const DEFAULT_TITLE_ID: &str = "CUSA00745";

/// Entry flag bits
pub mod entry_flags {
    pub const ENCRYPTED: u32 = 0x8000_0000;
    pub const SYSTEM_CONTENT: u32 = 0x2000_0000;
}

/// PKG header offsets
pub mod offsets {
    pub const MAGIC: usize = 0x00;
    pub const TYPE: usize = 0x04;
    pub const FLAGS: usize = 0x08;
    pub const FILE_COUNT: usize = 0x0C;
    pub const ENTRY_COUNT: usize = 0x10;
    pub const SC_ENTRY_COUNT: usize = 0x14;
    pub const ENTRY_COUNT_2: usize = 0x16;
    pub const ENTRY_TABLE_OFFSET: usize = 0x18;
    pub const ENTRY_TABLE_SIZE: usize = 0x1C;
    pub const BODY_OFFSET: usize = 0x20;
    pub const BODY_SIZE: usize = 0x28;
    pub const CONTENT_OFFSET: usize = 0x30;
    pub const CONTENT_SIZE: usize = 0x38;
    pub const CONTENT_ID: usize = 0x40;
    pub const DRM_TYPE: usize = 0x70;
    pub const CONTENT_TYPE: usize = 0x74;
    pub const CONTENT_FLAGS: usize = 0x78;
}

/// Well-known entry ids
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntryId(pub u32);

impl EntryId {
    pub const DIGESTS: EntryId = EntryId(0x0001);
    pub const ENTRY_KEYS: EntryId = EntryId(0x0010);
    pub const IMAGE_KEY: EntryId = EntryId(0x0020);
    pub const GENERAL_DIGESTS: EntryId = EntryId(0x0080);
    pub const METAS: EntryId = EntryId(0x0100);
    pub const ENTRY_NAMES: EntryId = EntryId(0x0200);
    pub const LICENSE: EntryId = EntryId(0x0400);
    pub const LICENSE_INFO: EntryId = EntryId(0x0401);
    pub const PSRESERVED: EntryId = EntryId(0x0409);
    pub const PARAM_SFO: EntryId = EntryId(0x1000);
    pub const ICON0_PNG: EntryId = EntryId(0x1200);
    /// First id handed out to plain data files
    pub const FIRST_DATA_FILE: EntryId = EntryId(0x1201);

    /// Display name of the entry
    pub fn name(self) -> String {
        let known = match self {
            EntryId::DIGESTS => "DIGESTS",
            EntryId::ENTRY_KEYS => "ENTRY_KEYS",
            EntryId::IMAGE_KEY => "IMAGE_KEY",
            EntryId::GENERAL_DIGESTS => "GENERAL_DIGESTS",
            EntryId::METAS => "METAS",
            EntryId::ENTRY_NAMES => "ENTRY_NAMES",
            EntryId::LICENSE => "LICENSE",
            EntryId::LICENSE_INFO => "LICENSE_INFO",
            EntryId::PSRESERVED => "PSRESERVED",
            EntryId::PARAM_SFO => "PARAM_SFO",
            EntryId::ICON0_PNG => "ICON0_PNG",
            EntryId(id) if id >= EntryId::FIRST_DATA_FILE.0 => "DATA_FILE",
            EntryId(id) => return format!("UNKNOWN_{id:04X}"),
        };
        known.to_string()
    }

    /// Maps a `sce_sys` file name to its entry id
    pub fn from_file_name(name: &str) -> Option<EntryId> {
        match name.to_ascii_lowercase().as_str() {
            "param.sfo" => Some(EntryId::PARAM_SFO),
            "icon0.png" => Some(EntryId::ICON0_PNG),
            "license.dat" => Some(EntryId::LICENSE),
            "license.info" => Some(EntryId::LICENSE_INFO),
            "psreserved.dat" => Some(EntryId::PSRESERVED),
            _ => None,
        }
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:04X} ({})", self.0, self.name())
    }
}

impl From<u32> for EntryId {
    fn from(id: u32) -> Self {
        EntryId(id)
    }
}

/// Parsed PKG header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerHeader {
    pub magic: u32,
    pub pkg_type: u32,
    pub flags: u32,
    pub file_count: u32,
    pub entry_count: u32,
    pub sc_entry_count: u16,
    pub entry_count_2: u16,
    pub entry_table_offset: u32,
    pub entry_table_size: u32,
    pub body_offset: u64,
    pub body_size: u64,
    pub content_offset: u64,
    pub content_size: u64,
    pub content_id: String,
    pub drm_type: u32,
    pub content_type: u32,
    pub content_flags: u32,
}

impl ContainerHeader {
    /// Parses the header fields; does not check the layout against a file length
    pub fn parse(data: &[u8]) -> Result<Self> {
        validate_magic(data)?;
        if data.len() < HEADER_SIZE {
            return Err(Error::truncated(
                "PKG header",
                HEADER_SIZE as u64,
                data.len() as u64,
            ));
        }

        let content_id_bytes = utils::trim_nul(&data[offsets::CONTENT_ID..][..CONTENT_ID_LEN]);
        let content_id = std::str::from_utf8(content_id_bytes)
            .ok()
            .filter(|s| s.is_ascii())
            .ok_or_else(|| Error::Format("Content id is not ASCII".to_string()))?
            .to_string();

        Ok(Self {
            magic: read_u32_be(data, offsets::MAGIC)?,
            pkg_type: read_u32_be(data, offsets::TYPE)?,
            flags: read_u32_be(data, offsets::FLAGS)?,
            file_count: read_u32_be(data, offsets::FILE_COUNT)?,
            entry_count: read_u32_be(data, offsets::ENTRY_COUNT)?,
            sc_entry_count: read_u16_be(data, offsets::SC_ENTRY_COUNT)?,
            entry_count_2: read_u16_be(data, offsets::ENTRY_COUNT_2)?,
            entry_table_offset: read_u32_be(data, offsets::ENTRY_TABLE_OFFSET)?,
            entry_table_size: read_u32_be(data, offsets::ENTRY_TABLE_SIZE)?,
            body_offset: read_u64_be(data, offsets::BODY_OFFSET)?,
            body_size: read_u64_be(data, offsets::BODY_SIZE)?,
            content_offset: read_u64_be(data, offsets::CONTENT_OFFSET)?,
            content_size: read_u64_be(data, offsets::CONTENT_SIZE)?,
            content_id,
            drm_type: read_u32_be(data, offsets::DRM_TYPE)?,
            content_type: read_u32_be(data, offsets::CONTENT_TYPE)?,
            content_flags: read_u32_be(data, offsets::CONTENT_FLAGS)?,
        })
    }

    /// Serializes the header fields into a zeroed header region.
    ///
    /// The digest area is left to the caller.
    pub fn write_into(&self, region: &mut [u8; HEADER_SIZE]) -> Result<()> {
        let content_id = encode_content_id(&self.content_id)?;

        utils::put(region, offsets::MAGIC, &self.magic.to_be_bytes());
        utils::put(region, offsets::TYPE, &self.pkg_type.to_be_bytes());
        utils::put(region, offsets::FLAGS, &self.flags.to_be_bytes());
        utils::put(region, offsets::FILE_COUNT, &self.file_count.to_be_bytes());
        utils::put(region, offsets::ENTRY_COUNT, &self.entry_count.to_be_bytes());
        utils::put(region, offsets::SC_ENTRY_COUNT, &self.sc_entry_count.to_be_bytes());
        utils::put(region, offsets::ENTRY_COUNT_2, &self.entry_count_2.to_be_bytes());
        utils::put(region, offsets::ENTRY_TABLE_OFFSET, &self.entry_table_offset.to_be_bytes());
        utils::put(region, offsets::ENTRY_TABLE_SIZE, &self.entry_table_size.to_be_bytes());
        utils::put(region, offsets::BODY_OFFSET, &self.body_offset.to_be_bytes());
        utils::put(region, offsets::BODY_SIZE, &self.body_size.to_be_bytes());
        utils::put(region, offsets::CONTENT_OFFSET, &self.content_offset.to_be_bytes());
        utils::put(region, offsets::CONTENT_SIZE, &self.content_size.to_be_bytes());
        utils::put(region, offsets::CONTENT_ID, &content_id);
        utils::put(region, offsets::DRM_TYPE, &self.drm_type.to_be_bytes());
        utils::put(region, offsets::CONTENT_TYPE, &self.content_type.to_be_bytes());
        utils::put(region, offsets::CONTENT_FLAGS, &self.content_flags.to_be_bytes());
        Ok(())
    }

    /// End of the entry table as declared by the header
    pub fn entry_table_end(&self) -> u64 {
        self.entry_table_offset as u64 + self.entry_count as u64 * ENTRY_SIZE as u64
    }

    /// Checks the declared regions against each other and against the input length
    pub fn validate_layout(&self, total_len: u64) -> Result<()> {
        if (self.entry_table_offset as usize) < HEADER_SIZE {
            return Err(Error::Layout(format!(
                "Entry table at 0x{:X} overlaps the 0x{:X}-byte header",
                self.entry_table_offset, HEADER_SIZE
            )));
        }

        let table_end = self.entry_table_end();
        if table_end > total_len {
            return Err(Error::truncated("PKG entry table", table_end, total_len));
        }

        if self.entry_table_size as u64 != self.entry_count as u64 * ENTRY_SIZE as u64 {
            return Err(Error::Layout(format!(
                "Entry table size {} does not match {} entries of {} bytes",
                self.entry_table_size, self.entry_count, ENTRY_SIZE
            )));
        }

        if self.body_offset < table_end {
            return Err(Error::Layout(format!(
                "Body at 0x{:X} overlaps the entry table ending at 0x{:X}",
                self.body_offset, table_end
            )));
        }

        Ok(())
    }
}

/// Derives a content id from a source name.
///
/// The label is `RS00` followed by the first 12 hex digits of the name's MD5,
/// so the same name always yields the same id.
pub fn generate_content_id(name: &str, title_id: &str, region: &str) -> Result<String> {
    let digest = format!("{:x}", md5::compute(name.as_bytes()));
    let content_id = format!("{region}-{title_id}_00-RS00{}", digest[..12].to_ascii_uppercase());
    encode_content_id(&content_id)?;
    Ok(content_id)
}

/// Placeholder entries of the standard additional-content layout as
/// `(id, size, flags1, flags2)`
pub const STANDARD_PLACEHOLDERS: [(EntryId, usize, u32, u32); 8] = [
    (EntryId::ENTRY_KEYS, 2048, 0x8000_0000, 0x3000),
    (EntryId::IMAGE_KEY, 256, 0xE000_0000, 0x3000),
    (EntryId::GENERAL_DIGESTS, 384, 0x6000_0000, 0),
    (EntryId::METAS, 352, 0x6000_0000, 0),
    (EntryId::DIGESTS, 352, 0x4000_0000, 0),
    (EntryId::ENTRY_NAMES, 21, 0x4000_0000, 0),
    (EntryId::LICENSE, 1024, 0x8000_0000, 0x3000),
    (EntryId::LICENSE_INFO, 512, 0x8000_0000, 0x2000),
];

/// Flags the standard layout gives to system files
pub fn standard_flags(id: EntryId) -> Option<(u32, u32)> {
    match id {
        EntryId::PARAM_SFO => Some((0, 1)),
        EntryId::ICON0_PNG => Some((0, 11)),
        _ => STANDARD_PLACEHOLDERS
            .iter()
            .find(|(placeholder, ..)| *placeholder == id)
            .map(|&(_, _, flags1, flags2)| (flags1, flags2)),
    }
}

/// Encodes a content id into its zero-padded field
pub fn encode_content_id(content_id: &str) -> Result<[u8; CONTENT_ID_LEN]> {
    if !content_id.is_ascii() || content_id.contains('\0') {
        return Err(Error::invalid_value(
            "content_id",
            "must be ASCII without NUL bytes",
        ));
    }
    if content_id.len() > CONTENT_ID_LEN {
        return Err(Error::ValueTooLong {
            key: "content_id".to_string(),
            len: content_id.len(),
            max: CONTENT_ID_LEN,
        });
    }
    let mut field = [0u8; CONTENT_ID_LEN];
    field[..content_id.len()].copy_from_slice(content_id.as_bytes());
    Ok(field)
}

/// Raw entry table record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContainerEntry {
    pub id: u32,
    pub name_offset: u32,
    pub flags1: u32,
    pub flags2: u32,
    pub file_offset: u64,
    pub file_size: u64,
}

impl ContainerEntry {
    /// Parses one 32-byte record
    pub fn parse(record: &[u8]) -> Result<Self> {
        Ok(Self {
            id: read_u32_be(record, 0x00)?,
            name_offset: read_u32_be(record, 0x04)?,
            flags1: read_u32_be(record, 0x08)?,
            flags2: read_u32_be(record, 0x0C)?,
            file_offset: read_u64_be(record, 0x10)?,
            file_size: read_u64_be(record, 0x18)?,
        })
    }

    /// Serializes the record
    pub fn to_bytes(&self) -> [u8; ENTRY_SIZE] {
        let mut record = [0u8; ENTRY_SIZE];
        utils::put(&mut record, 0x00, &self.id.to_be_bytes());
        utils::put(&mut record, 0x04, &self.name_offset.to_be_bytes());
        utils::put(&mut record, 0x08, &self.flags1.to_be_bytes());
        utils::put(&mut record, 0x0C, &self.flags2.to_be_bytes());
        utils::put(&mut record, 0x10, &self.file_offset.to_be_bytes());
        utils::put(&mut record, 0x18, &self.file_size.to_be_bytes());
        record
    }

    /// End of the payload region (unpadded)
    pub fn file_end(&self) -> u64 {
        self.file_offset.saturating_add(self.file_size)
    }

    pub fn entry_id(&self) -> EntryId {
        EntryId(self.id)
    }

    pub fn is_encrypted(&self) -> bool {
        self.flags1 & entry_flags::ENCRYPTED != 0
    }

    pub fn is_system_content(&self) -> bool {
        self.flags1 & entry_flags::SYSTEM_CONTENT != 0
    }
}

/// Validates that the data starts with the PKG magic number
pub fn validate_magic(data: &[u8]) -> Result<()> {
    match data.get(offsets::MAGIC..offsets::MAGIC + 4) {
        Some(magic) if magic == PKG_MAGIC.to_be_bytes() => Ok(()),
        _ => Err(Error::Format("Not a PKG file".to_string())),
    }
}

/// Parses the entry table bytes declared by `header`.
///
/// `table` must start at the entry table offset. Every entry region is
/// bounds-checked against `total_len` and must not reach back into the
/// header or entry table.
pub fn parse_entries(
    header: &ContainerHeader,
    table: &[u8],
    total_len: u64,
) -> Result<Vec<ContainerEntry>> {
    let mut entries = Vec::with_capacity(header.entry_count as usize);
    let table_end = header.entry_table_end();

    for i in 0..header.entry_count as usize {
        let record = utils::slice_at(table, i * ENTRY_SIZE, ENTRY_SIZE, "PKG entry record")?;
        let entry = ContainerEntry::parse(record)?;

        let end = entry
            .file_offset
            .checked_add(entry.file_size)
            .ok_or_else(|| Error::Layout(format!("Entry 0x{:04X} size overflows", entry.id)))?;
        if end > total_len {
            return Err(Error::truncated(
                format!("PKG entry 0x{:04X}", entry.id),
                end,
                total_len,
            ));
        }
        if entry.file_size > 0 && entry.file_offset < table_end {
            return Err(Error::Layout(format!(
                "Entry 0x{:04X} at 0x{:X} overlaps the header or entry table",
                entry.id, entry.file_offset
            )));
        }

        entries.push(entry);
    }

    Ok(entries)
}
