//! Entries handed to the builder.

use crate::error::{Error, Result};
use crate::format::{EntryId, entry_flags};
use crate::reserved::ReservedRegion;
use std::fs::{self, File};
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};

/// Where an entry's payload comes from
#[derive(Debug, Clone)]
pub enum EntrySource {
    /// Payload held in memory
    Bytes(Vec<u8>),
    /// Payload streamed from a file whose size was recorded when it was added
    File { path: PathBuf, size: u64 },
    /// Placeholder for digest, key or license data
    Reserved(ReservedRegion),
}

impl EntrySource {
    /// Payload size in bytes
    pub fn size(&self) -> u64 {
        match self {
            EntrySource::Bytes(data) => data.len() as u64,
            EntrySource::File { size, .. } => *size,
            EntrySource::Reserved(region) => region.len() as u64,
        }
    }

    /// Opens the payload for streaming
    pub fn open(&self) -> Result<Box<dyn Read + '_>> {
        Ok(match self {
            EntrySource::Bytes(data) => Box::new(Cursor::new(data.as_slice())),
            EntrySource::File { path, .. } => Box::new(File::open(path)?),
            EntrySource::Reserved(region) => Box::new(Cursor::new(region.to_bytes())),
        })
    }
}

/// One logical entry of a package under construction
#[derive(Debug, Clone)]
pub struct PkgEntry {
    id: u32,
    flags1: u32,
    flags2: u32,
    source: EntrySource,
}

impl PkgEntry {
    /// Creates an entry from in-memory data
    pub fn new<I: Into<EntryId>>(id: I, data: impl Into<Vec<u8>>) -> Self {
        Self::with_source(id, EntrySource::Bytes(data.into()))
    }

    /// Creates an entry backed by a file on disk
    pub fn from_file<I: Into<EntryId>, P: AsRef<Path>>(id: I, path: P) -> Result<Self> {
        let path = path.as_ref();
        let metadata = fs::metadata(path)?;

        if !metadata.is_file() {
            return Err(Error::invalid_value(
                path.display().to_string(),
                "path is not a file",
            ));
        }

        Ok(Self::with_source(
            id,
            EntrySource::File {
                path: path.to_path_buf(),
                size: metadata.len(),
            },
        ))
    }

    /// Creates a placeholder entry
    pub fn reserved<I: Into<EntryId>>(id: I, region: ReservedRegion) -> Self {
        Self::with_source(id, EntrySource::Reserved(region))
    }

    pub fn with_source<I: Into<EntryId>>(id: I, source: EntrySource) -> Self {
        Self {
            id: id.into().0,
            flags1: 0,
            flags2: 0,
            source,
        }
    }

    /// Sets both flag words
    pub fn flags(mut self, flags1: u32, flags2: u32) -> Self {
        self.flags1 = flags1;
        self.flags2 = flags2;
        self
    }

    /// Marks the entry as system content (counted in the header's SC entry count)
    pub fn system_content(mut self) -> Self {
        self.flags1 |= entry_flags::SYSTEM_CONTENT;
        self
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn entry_id(&self) -> EntryId {
        EntryId(self.id)
    }

    pub fn flags1(&self) -> u32 {
        self.flags1
    }

    pub fn flags2(&self) -> u32 {
        self.flags2
    }

    pub fn size(&self) -> u64 {
        self.source.size()
    }

    pub fn source(&self) -> &EntrySource {
        &self.source
    }

    /// Reads the whole payload into memory
    pub fn read_all(&self) -> Result<Vec<u8>> {
        let mut data = Vec::with_capacity(self.size() as usize);
        self.source.open()?.read_to_end(&mut data)?;
        Ok(data)
    }
}
