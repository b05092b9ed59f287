//! In-memory view of a complete PKG byte stream.

use crate::error::{Error, Result};
use crate::format::{self, ContainerEntry, ContainerHeader, EntryId, HEADER_SIZE};
use crate::utils;

/// A parsed package borrowing its payloads from the input
#[derive(Debug, Clone)]
pub struct ParsedContainer<'a> {
    pub header: ContainerHeader,
    /// Entry records in table order
    pub entries: Vec<ContainerEntry>,
    data: &'a [u8],
}

/// Parses a package held in memory.
///
/// The header, the entry table and every entry region are bounds-checked
/// against the input; payloads are only sliced when asked for.
pub fn parse(data: &[u8]) -> Result<ParsedContainer<'_>> {
    let header = ContainerHeader::parse(data)?;
    let total_len = data.len() as u64;
    header.validate_layout(total_len)?;

    let table = utils::slice_at(
        data,
        header.entry_table_offset as usize,
        header.entry_table_size as usize,
        "PKG entry table",
    )?;
    let entries = format::parse_entries(&header, table, total_len)?;

    Ok(ParsedContainer {
        header,
        entries,
        data,
    })
}

impl<'a> ParsedContainer<'a> {
    /// The whole input
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// Looks up an entry record by id
    pub fn get<I: Into<EntryId>>(&self, id: I) -> Option<&ContainerEntry> {
        let id = id.into().0;
        self.entries.iter().find(|e| e.id == id)
    }

    /// Returns the payload of an entry record
    pub fn payload(&self, entry: &ContainerEntry) -> Result<&'a [u8]> {
        utils::slice_at(
            self.data,
            entry.file_offset as usize,
            entry.file_size as usize,
            "PKG entry payload",
        )
    }

    /// Returns the payload of the entry with the given id
    pub fn payload_by_id<I: Into<EntryId>>(&self, id: I) -> Result<&'a [u8]> {
        let id = id.into();
        let entry = self.get(id).ok_or(Error::EntryNotFound(id.0))?;
        self.payload(entry)
    }

    /// Iterates over records together with their payloads
    pub fn payloads(&self) -> impl Iterator<Item = Result<(&ContainerEntry, &'a [u8])>> + '_ {
        self.entries
            .iter()
            .map(move |entry| self.payload(entry).map(|p| (entry, p)))
    }

    /// The opaque digest area of the header region
    pub fn digest_area(&self) -> &'a [u8] {
        &self.data[format::DIGEST_AREA_OFFSET..HEADER_SIZE]
    }
}
