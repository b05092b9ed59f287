//! PSARC header inspection and platform flag patching.
//!
//! Only the fixed 32-byte header is read. The table of contents and the
//! compressed blocks after it are never touched.

//    PSARC header (big-endian)
//      |magic 'PSAR' 4
//      |version major 2
//      |version minor 2
//      |compression 4 //'zlib', 'lzma'
//      |toc_length 4
//      |toc_entry_size 4
//      |num_files 4
//      |block_size 4
//      |platform_flags 4 //faddr 0x1C

use crate::error::{Error, Result};
use crate::utils::{self, read_u16_be, read_u32_be};
use log::warn;
use std::fmt;
use std::fs::OpenOptions;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

/// PSARC magic number
pub const PSARC_MAGIC: &[u8; 4] = b"PSAR";

/// Size of the fixed header
pub const PSARC_HEADER_SIZE: usize = 32;

/// PSARC header offsets
pub mod offsets {
    pub const MAGIC: usize = 0;
    pub const VERSION_MAJOR: usize = 4;
    pub const VERSION_MINOR: usize = 6;
    pub const COMPRESSION: usize = 8;
    pub const TOC_LENGTH: usize = 12;
    pub const TOC_ENTRY_SIZE: usize = 16;
    pub const NUM_FILES: usize = 20;
    pub const BLOCK_SIZE: usize = 24;
    pub const PLATFORM_FLAGS: usize = 28;
}

/// Platform an archive was built for, as told by its flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    /// Flags 0: PC and other generic targets
    Generic,
    /// Flags 4: PS4 and Mac builds
    AlternatePlatform,
    /// Any other value
    Unknown(u32),
}

impl Platform {
    /// The flags value stored in the header
    pub fn code(self) -> u32 {
        match self {
            Platform::Generic => 0,
            Platform::AlternatePlatform => 4,
            Platform::Unknown(code) => code,
        }
    }

    /// Parses a platform name or a raw flags value
    pub fn from_name(name: &str) -> Option<Platform> {
        match name.to_ascii_lowercase().as_str() {
            "pc" | "generic" | "win" | "windows" => Some(Platform::Generic),
            "ps4" | "mac" | "alternate" => Some(Platform::AlternatePlatform),
            other => {
                let value = match other.strip_prefix("0x") {
                    Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                    None => other.parse().ok()?,
                };
                Some(describe_platform(value))
            }
        }
    }

    /// Short name used for output file suffixes
    pub fn suffix(self) -> String {
        match self {
            Platform::Generic => "pc".to_string(),
            Platform::AlternatePlatform => "ps4".to_string(),
            Platform::Unknown(code) => format!("flags{code}"),
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Platform::Generic => write!(f, "Generic/PC (0)"),
            Platform::AlternatePlatform => write!(f, "PS4/Mac (4)"),
            Platform::Unknown(code) => write!(f, "Unknown (0x{code:08X})"),
        }
    }
}

/// Classifies a platform flags value
pub fn describe_platform(flags: u32) -> Platform {
    match flags {
        0 => Platform::Generic,
        4 => Platform::AlternatePlatform,
        other => Platform::Unknown(other),
    }
}

/// Parsed PSARC header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PsarcHeader {
    pub version_major: u16,
    pub version_minor: u16,
    /// Compression tag, e.g. `zlib`
    pub compression: [u8; 4],
    pub toc_length: u32,
    pub toc_entry_size: u32,
    pub num_files: u32,
    pub block_size: u32,
    pub platform_flags: u32,
}

impl PsarcHeader {
    /// Parses the fixed header at the start of `data`
    pub fn parse(data: &[u8]) -> Result<Self> {
        validate_magic(data)?;
        let header = utils::slice_at(data, 0, PSARC_HEADER_SIZE, "PSARC header")?;

        let mut compression = [0u8; 4];
        compression.copy_from_slice(&header[offsets::COMPRESSION..offsets::COMPRESSION + 4]);

        Ok(Self {
            version_major: read_u16_be(header, offsets::VERSION_MAJOR)?,
            version_minor: read_u16_be(header, offsets::VERSION_MINOR)?,
            compression,
            toc_length: read_u32_be(header, offsets::TOC_LENGTH)?,
            toc_entry_size: read_u32_be(header, offsets::TOC_ENTRY_SIZE)?,
            num_files: read_u32_be(header, offsets::NUM_FILES)?,
            block_size: read_u32_be(header, offsets::BLOCK_SIZE)?,
            platform_flags: read_u32_be(header, offsets::PLATFORM_FLAGS)?,
        })
    }

    /// Serializes the header
    pub fn to_bytes(&self) -> [u8; PSARC_HEADER_SIZE] {
        let mut out = [0u8; PSARC_HEADER_SIZE];
        utils::put(&mut out, offsets::MAGIC, PSARC_MAGIC);
        utils::put(&mut out, offsets::VERSION_MAJOR, &self.version_major.to_be_bytes());
        utils::put(&mut out, offsets::VERSION_MINOR, &self.version_minor.to_be_bytes());
        utils::put(&mut out, offsets::COMPRESSION, &self.compression);
        utils::put(&mut out, offsets::TOC_LENGTH, &self.toc_length.to_be_bytes());
        utils::put(&mut out, offsets::TOC_ENTRY_SIZE, &self.toc_entry_size.to_be_bytes());
        utils::put(&mut out, offsets::NUM_FILES, &self.num_files.to_be_bytes());
        utils::put(&mut out, offsets::BLOCK_SIZE, &self.block_size.to_be_bytes());
        utils::put(&mut out, offsets::PLATFORM_FLAGS, &self.platform_flags.to_be_bytes());
        out
    }

    pub fn platform(&self) -> Platform {
        describe_platform(self.platform_flags)
    }

    /// Compression tag as text, with non-printable bytes replaced
    pub fn compression_str(&self) -> String {
        String::from_utf8_lossy(utils::trim_nul(&self.compression)).into_owned()
    }

    pub fn version(&self) -> String {
        format!("{}.{}", self.version_major, self.version_minor)
    }
}

/// Validates that the data starts with the PSARC magic number
pub fn validate_magic(data: &[u8]) -> Result<()> {
    match data.get(..PSARC_MAGIC.len()) {
        Some(magic) if magic == PSARC_MAGIC => Ok(()),
        _ => Err(Error::Format("Not a PSARC file".to_string())),
    }
}

/// Result of a platform patch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchOutcome {
    /// The patched archive
    pub bytes: Vec<u8>,
    /// Flags before patching
    pub previous: Platform,
    /// Set when the previous flags were not a recognized platform
    pub warning: Option<String>,
}

impl PatchOutcome {
    /// Returns true if the flags were already the requested value
    pub fn unchanged(&self, new_flags: u32) -> bool {
        self.previous.code() == new_flags
    }
}

/// Returns a copy of `data` with the platform flags replaced.
///
/// Only bytes 28..32 differ from the input. An unrecognized previous value is
/// reported through the outcome's warning and does not stop the patch.
pub fn patch_platform_flag(data: &[u8], new_flags: u32) -> Result<PatchOutcome> {
    let mut bytes = data.to_vec();
    let (previous, warning) = patch_platform_flag_in_place(&mut bytes, new_flags)?;
    Ok(PatchOutcome {
        bytes,
        previous,
        warning,
    })
}

/// Replaces the platform flags inside `data`
pub fn patch_platform_flag_in_place(
    data: &mut [u8],
    new_flags: u32,
) -> Result<(Platform, Option<String>)> {
    let header = PsarcHeader::parse(data)?;
    let previous = header.platform();
    let warning = unknown_flags_warning(previous);

    utils::put(data, offsets::PLATFORM_FLAGS, &new_flags.to_be_bytes());
    Ok((previous, warning))
}

/// Rewrites the platform flags of an existing file without reading its body
pub fn patch_file<P: AsRef<Path>>(path: P, new_flags: u32) -> Result<(Platform, Option<String>)> {
    let mut file = OpenOptions::new().read(true).write(true).open(path)?;

    let mut head = Vec::with_capacity(PSARC_HEADER_SIZE);
    Read::by_ref(&mut file)
        .take(PSARC_HEADER_SIZE as u64)
        .read_to_end(&mut head)?;

    let header = PsarcHeader::parse(&head)?;
    let previous = header.platform();
    let warning = unknown_flags_warning(previous);

    if previous.code() != new_flags {
        file.seek(SeekFrom::Start(offsets::PLATFORM_FLAGS as u64))?;
        file.write_all(&new_flags.to_be_bytes())?;
        file.flush()?;
    }
    Ok((previous, warning))
}

fn unknown_flags_warning(previous: Platform) -> Option<String> {
    match previous {
        Platform::Unknown(code) => {
            let message = format!("Unknown PSARC platform flags 0x{code:08X}, patching anyway");
            warn!("{message}");
            Some(message)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sample(flags: u32) -> Vec<u8> {
        let header = PsarcHeader {
            version_major: 1,
            version_minor: 4,
            compression: *b"zlib",
            toc_length: 0x1F4,
            toc_entry_size: 30,
            num_files: 12,
            block_size: 0x10000,
            platform_flags: flags,
        };
        let mut data = header.to_bytes().to_vec();
        data.extend_from_slice(&[0xEE; 64]);
        data
    }

    #[test]
    fn test_parse() {
        let header = PsarcHeader::parse(&sample(4)).unwrap();
        assert_eq!(header.version(), "1.4");
        assert_eq!(header.compression_str(), "zlib");
        assert_eq!(header.num_files, 12);
        assert_eq!(header.platform(), Platform::AlternatePlatform);
    }

    #[test]
    fn test_patch_to_generic() {
        let data = sample(4);
        let outcome = patch_platform_flag(&data, 0).unwrap();

        assert_eq!(outcome.previous, Platform::AlternatePlatform);
        assert!(outcome.warning.is_none());
        assert_eq!(&outcome.bytes[28..32], &[0, 0, 0, 0]);
        assert_eq!(&outcome.bytes[..28], &data[..28]);
        assert_eq!(&outcome.bytes[32..], &data[32..]);
    }

    #[test]
    fn test_unknown_flags_warn() {
        let outcome = patch_platform_flag(&sample(7), 0).unwrap();
        assert_eq!(outcome.previous, Platform::Unknown(7));
        assert!(outcome.warning.is_some());
    }

    #[test]
    fn test_errors() {
        assert!(matches!(
            patch_platform_flag(b"PSAR\x00\x01", 0),
            Err(Error::TruncatedInput { .. })
        ));
        assert!(matches!(
            PsarcHeader::parse(b"\x7FCNT0000000000000000000000000000"),
            Err(Error::Format(_))
        ));
    }

    #[test]
    fn test_platform_names() {
        assert_eq!(Platform::from_name("PC"), Some(Platform::Generic));
        assert_eq!(Platform::from_name("ps4"), Some(Platform::AlternatePlatform));
        assert_eq!(Platform::from_name("4"), Some(Platform::AlternatePlatform));
        assert_eq!(Platform::from_name("0x10"), Some(Platform::Unknown(16)));
        assert_eq!(Platform::from_name("xbox"), None);
        assert_eq!(Platform::Unknown(16).code(), 16);
    }

    #[test]
    fn test_patch_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("song_p.psarc");
        std::fs::write(&path, sample(4)).unwrap();

        let (previous, warning) = patch_file(&path, 0).unwrap();
        assert_eq!(previous, Platform::AlternatePlatform);
        assert!(warning.is_none());
        assert_eq!(std::fs::read(&path).unwrap(), patch_platform_flag(&sample(4), 0).unwrap().bytes);
    }

    #[test]
    fn test_patch_file_leaves_short_file_alone() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("short.psarc");
        let short = sample(4)[..20].to_vec();
        std::fs::write(&path, &short).unwrap();

        assert!(patch_file(&path, 0).is_err());
        assert_eq!(std::fs::read(&path).unwrap(), short);
    }

    proptest! {
        #[test]
        fn patch_is_idempotent(flags in any::<u32>(), target in any::<u32>()) {
            let once = patch_platform_flag(&sample(flags), target).unwrap().bytes;
            let twice = patch_platform_flag(&once, target).unwrap().bytes;
            prop_assert_eq!(once, twice);
        }

        #[test]
        fn wrong_magic_is_format_error(data in prop::collection::vec(any::<u8>(), 32..64)) {
            prop_assume!(&data[..4] != PSARC_MAGIC);
            prop_assert!(matches!(patch_platform_flag(&data, 0), Err(Error::Format(_))));
            prop_assert!(matches!(PsarcHeader::parse(&data), Err(Error::Format(_))));
        }
    }
}
