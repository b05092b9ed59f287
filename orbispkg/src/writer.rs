//! Writer for creating PKG files.

use crate::align;
use crate::constants::BUFFER_SIZE;
use crate::entry::EntrySource;
use crate::error::{Error, Result};
use crate::format::{self, ContainerEntry, ContainerHeader, HEADER_SIZE};
use crate::reserved::ReservedRegion;
use std::io::{Read, Write};

/// A writer that emits a PKG front to back
///
/// The header and entry table must be written first, then every entry's
/// payload in table order. Positions are tracked so that each payload lands
/// exactly at the offset its record declares.
pub struct PkgWriter<W: Write> {
    /// The output stream
    output: W,
    /// Current state of the writer
    state: WriterState,
    /// Bytes written so far
    position: u64,
    /// Body alignment
    alignment: u64,
    /// Records still waiting for their payload
    pending: Vec<ContainerEntry>,
    /// Reusable copy buffer
    buffer: Vec<u8>,
}

#[derive(Debug, PartialEq)]
enum WriterState {
    Created,
    HeaderWritten,
    WritingData,
    Finalized,
}

impl<W: Write> PkgWriter<W> {
    /// Creates a new writer over the given output
    pub fn new(output: W, alignment: u64) -> Result<Self> {
        align::check_boundary(alignment)?;
        Ok(Self {
            output,
            state: WriterState::Created,
            position: 0,
            alignment,
            pending: Vec::new(),
            buffer: Vec::new(),
        })
    }

    /// Writes the header region, the entry table and the padding up to the body
    pub fn write_header(
        &mut self,
        header: &ContainerHeader,
        digest_area: &ReservedRegion,
        records: &[ContainerEntry],
    ) -> Result<()> {
        if self.state != WriterState::Created {
            return Err(Error::Layout("Header already written".to_string()));
        }
        if records.len() != header.entry_count as usize {
            return Err(Error::Layout(format!(
                "Header declares {} entries but {} records were given",
                header.entry_count,
                records.len()
            )));
        }

        let mut region = [0u8; HEADER_SIZE];
        header.write_into(&mut region)?;
        digest_area.write_into(&mut region[format::DIGEST_AREA_OFFSET..])?;
        self.write_raw(&region)?;

        if self.position != header.entry_table_offset as u64 {
            return Err(Error::Layout(format!(
                "Entry table must start at 0x{:X}, writer is at 0x{:X}",
                header.entry_table_offset, self.position
            )));
        }

        for record in records {
            self.write_raw(&record.to_bytes())?;
        }

        self.pad_to(header.body_offset)?;

        self.pending = records.iter().rev().copied().collect();
        self.state = WriterState::HeaderWritten;
        Ok(())
    }

    /// Streams one entry's payload and its alignment padding
    ///
    /// The source is copied in chunks of at most `BUFFER_SIZE` bytes, so file
    /// backed entries are never fully loaded into memory.
    pub fn write_entry(&mut self, source: &EntrySource) -> Result<()> {
        match self.state {
            WriterState::Created => {
                return Err(Error::Layout("Header must be written first".to_string()));
            }
            WriterState::Finalized => {
                return Err(Error::Layout("Writer is finalized".to_string()));
            }
            _ => {}
        }

        let record = self
            .pending
            .pop()
            .ok_or_else(|| Error::Layout("All entries have already been written".to_string()))?;

        if self.position != record.file_offset {
            return Err(Error::Layout(format!(
                "Entry 0x{:04X} must start at 0x{:X}, writer is at 0x{:X}",
                record.id, record.file_offset, self.position
            )));
        }

        let expected_size = record.file_size;
        if source.size() != expected_size {
            return Err(Error::Layout(format!(
                "Entry 0x{:04X} source is {} bytes, record declares {}",
                record.id,
                source.size(),
                expected_size
            )));
        }

        let mut reader = source.open()?;
        let mut buffer = std::mem::take(&mut self.buffer);
        buffer.resize(BUFFER_SIZE.min(expected_size.max(1) as usize), 0);

        let mut total_written = 0u64;
        while total_written < expected_size {
            let remaining = expected_size - total_written;
            let chunk_size = std::cmp::min(buffer.len() as u64, remaining) as usize;

            let read = reader.read(&mut buffer[..chunk_size])?;
            if read == 0 {
                break;
            }
            self.write_raw(&buffer[..read])?;
            total_written += read as u64;
        }
        self.buffer = buffer;

        if total_written != expected_size {
            return Err(Error::Layout(format!(
                "Entry 0x{:04X} data size mismatch: expected {}, wrote {}",
                record.id, expected_size, total_written
            )));
        }

        let padded = align::padded_size(expected_size, self.alignment)?;
        self.pad_to(record.file_offset + padded)?;

        self.state = WriterState::WritingData;
        Ok(())
    }

    /// Flushes the output once every entry has been written
    pub fn finalize(&mut self) -> Result<()> {
        if self.state == WriterState::Finalized {
            return Ok(());
        }

        if self.state == WriterState::Created {
            return Err(Error::Layout("No header written".to_string()));
        }

        if !self.pending.is_empty() {
            return Err(Error::Layout(format!(
                "{} entries were never written",
                self.pending.len()
            )));
        }

        self.output.flush()?;
        self.state = WriterState::Finalized;
        Ok(())
    }

    /// Bytes written so far
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Checks if the writer is finalized
    pub fn is_finalized(&self) -> bool {
        self.state == WriterState::Finalized
    }

    /// Returns the underlying output
    pub fn into_inner(self) -> W {
        self.output
    }

    fn write_raw(&mut self, data: &[u8]) -> Result<()> {
        self.output.write_all(data)?;
        self.position += data.len() as u64;
        Ok(())
    }

    fn pad_to(&mut self, target: u64) -> Result<()> {
        if target < self.position {
            return Err(Error::Layout(format!(
                "Cannot pad backwards from 0x{:X} to 0x{:X}",
                self.position, target
            )));
        }
        const ZEROS: [u8; 4096] = [0u8; 4096];
        while self.position < target {
            let chunk = std::cmp::min(target - self.position, ZEROS.len() as u64) as usize;
            self.write_raw(&ZEROS[..chunk])?;
        }
        Ok(())
    }
}
