//! Streaming reader for PKG files.

use crate::callbacks::{ArchiveHandler, ControlAction, NoOpHandler, OperationType, ProgressInfo};
use crate::constants::BUFFER_SIZE;
use crate::error::{Error, Result};
use crate::format::{self, ContainerEntry, ContainerHeader, EntryId, HEADER_SIZE};
use sha1::{Digest, Sha1};
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Reader for PKG files that keeps only the header and entry table in memory
///
/// Entry payloads are read from the underlying stream on demand.
pub struct PkgReader<R: Read + Seek> {
    /// Underlying stream
    input: R,
    /// Parsed header
    header: ContainerHeader,
    /// Opaque digest area of the header region
    digest_area: Vec<u8>,
    /// Entry records in table order
    entries: Vec<ContainerEntry>,
    /// Total stream length
    len: u64,
}

/// Per-entry summary with a payload fingerprint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntrySummary {
    pub record: ContainerEntry,
    /// Lower-case hex SHA-1 of the payload
    pub sha1: String,
}

impl PkgReader<BufReader<File>> {
    /// Opens a PKG file
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        Self::from_reader(BufReader::new(file))
    }
}

impl<R: Read + Seek> PkgReader<R> {
    /// Reads the header and entry table from any seekable stream
    pub fn from_reader(mut input: R) -> Result<Self> {
        let len = input.seek(SeekFrom::End(0))?;
        input.seek(SeekFrom::Start(0))?;

        // Never trust the header with the allocation size
        let mut head = vec![0u8; HEADER_SIZE.min(len as usize)];
        input.read_exact(&mut head)?;

        format::validate_magic(&head)?;
        let header = ContainerHeader::parse(&head)?;
        header.validate_layout(len)?;

        let mut table = vec![0u8; header.entry_table_size as usize];
        input.seek(SeekFrom::Start(header.entry_table_offset as u64))?;
        input.read_exact(&mut table)?;

        let entries = format::parse_entries(&header, &table, len)?;
        let digest_area = head[format::DIGEST_AREA_OFFSET..HEADER_SIZE].to_vec();

        Ok(Self {
            input,
            header,
            digest_area,
            entries,
            len,
        })
    }

    pub fn header(&self) -> &ContainerHeader {
        &self.header
    }

    pub fn digest_area(&self) -> &[u8] {
        &self.digest_area
    }

    /// Returns an iterator over all entry records
    pub fn entries(&self) -> impl Iterator<Item = &ContainerEntry> {
        self.entries.iter()
    }

    /// Gets the number of entries in the package
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the package has no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total size of the underlying stream
    pub fn stream_len(&self) -> u64 {
        self.len
    }

    /// Gets an entry record by id
    pub fn get_entry<I: Into<EntryId>>(&self, id: I) -> Option<&ContainerEntry> {
        let id = id.into().0;
        self.entries.iter().find(|e| e.id == id)
    }

    /// Checks if an entry exists in the package
    pub fn contains<I: Into<EntryId>>(&self, id: I) -> bool {
        self.get_entry(id).is_some()
    }

    /// Reads an entry's payload by id
    pub fn read_entry<I: Into<EntryId>>(&mut self, id: I) -> Result<Vec<u8>> {
        let mut result = Vec::new();
        self.read_entry_streaming(id, |chunk| {
            result.extend_from_slice(chunk);
            Ok(())
        })?;
        Ok(result)
    }

    /// Reads an entry's payload in chunks of at most `BUFFER_SIZE` bytes
    pub fn read_entry_streaming<I: Into<EntryId>, F>(&mut self, id: I, callback: F) -> Result<()>
    where
        F: FnMut(&[u8]) -> Result<()>,
    {
        let id = id.into();
        let entry = *self.get_entry(id).ok_or(Error::EntryNotFound(id.0))?;
        self.stream_payload(&entry, callback)
    }

    fn stream_payload<F>(&mut self, entry: &ContainerEntry, mut callback: F) -> Result<()>
    where
        F: FnMut(&[u8]) -> Result<()>,
    {
        self.input.seek(SeekFrom::Start(entry.file_offset))?;

        let file_size = entry.file_size;
        let mut buffer = vec![0u8; BUFFER_SIZE.min(file_size as usize)];
        let mut bytes_read = 0u64;

        while bytes_read < file_size {
            let chunk_size = (file_size - bytes_read).min(buffer.len() as u64) as usize;
            self.input.read_exact(&mut buffer[..chunk_size])?;
            callback(&buffer[..chunk_size])?;
            bytes_read += chunk_size as u64;
        }

        Ok(())
    }

    /// Computes a SHA-1 fingerprint of every payload
    pub fn summarize(&mut self) -> Result<Vec<EntrySummary>> {
        let mut summaries = Vec::with_capacity(self.entries.len());
        for entry in self.entries.clone() {
            let mut hasher = Sha1::new();
            self.stream_payload(&entry, |chunk| {
                hasher.update(chunk);
                Ok(())
            })?;
            summaries.push(EntrySummary {
                record: entry,
                sha1: hex(&hasher.finalize()),
            });
        }
        Ok(summaries)
    }

    /// Extracts all entries to the specified directory
    pub fn extract_all<P: AsRef<Path>>(&mut self, output_dir: P) -> Result<Vec<PathBuf>> {
        self.extract_all_with_progress(output_dir, &mut NoOpHandler)
    }

    /// Extracts all entries with progress reporting and cancellation support
    ///
    /// Every entry is written to `<ID>_<NAME>.bin`, e.g. `1000_PARAM_SFO.bin`.
    pub fn extract_all_with_progress<P: AsRef<Path>, H: ArchiveHandler + ?Sized>(
        &mut self,
        output_dir: P,
        handler: &mut H,
    ) -> Result<Vec<PathBuf>> {
        let output_dir = output_dir.as_ref();
        std::fs::create_dir_all(output_dir)?;

        let total_bytes: u64 = self.entries.iter().map(|e| e.file_size).sum();
        let total_files = self.entries.len();
        let mut processed_bytes = 0u64;
        let mut written = Vec::with_capacity(total_files);

        if handler.on_started(OperationType::Unpack) == ControlAction::Abort {
            return Err(Error::Cancelled);
        }

        for (index, entry) in self.entries.clone().iter().enumerate() {
            let entry_name = entry.entry_id().to_string();
            let file_path = output_dir.join(extracted_file_name(entry.entry_id()));

            if handler.on_entry_started(&entry_name) == ControlAction::Abort {
                return Err(Error::Cancelled);
            }

            let mut output_file = File::create(&file_path)?;
            self.stream_payload(entry, |chunk| {
                output_file.write_all(chunk)?;
                processed_bytes += chunk.len() as u64;

                let progress = ProgressInfo {
                    processed_bytes,
                    total_bytes: Some(total_bytes),
                    processed_files: index + 1,
                    total_files: Some(total_files),
                    current_file: entry_name.clone(),
                };
                if handler.on_progress(&progress) == ControlAction::Abort {
                    return Err(Error::Cancelled);
                }
                Ok(())
            })?;
            written.push(file_path);

            if handler.on_entry_finished(&entry_name) == ControlAction::Abort {
                return Err(Error::Cancelled);
            }
        }

        handler.on_finished();

        Ok(written)
    }

    /// Returns the underlying stream
    pub fn into_inner(self) -> R {
        self.input
    }
}

/// File name used when extracting an entry
pub fn extracted_file_name(id: EntryId) -> String {
    format!("{:04X}_{}.bin", id.0, id.name())
}

pub(crate) fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::PkgBuilder;
    use std::io::Cursor;

    fn sample() -> Vec<u8> {
        let mut builder = PkgBuilder::new();
        builder
            .content_id("EP0001-CUSA00001_00-SAMPLEDLC0000001")
            .add_bytes(EntryId::PARAM_SFO, b"sfo data".to_vec())
            .add_bytes(0x1201u32, vec![9u8; 5000]);
        builder.to_bytes().unwrap()
    }

    #[test]
    fn test_read_entries() {
        let mut reader = PkgReader::from_reader(Cursor::new(sample())).unwrap();
        assert_eq!(reader.len(), 2);
        assert!(reader.contains(EntryId::PARAM_SFO));
        assert!(!reader.contains(EntryId::ICON0_PNG));
        assert_eq!(reader.read_entry(EntryId::PARAM_SFO).unwrap(), b"sfo data");
        assert_eq!(reader.read_entry(0x1201u32).unwrap(), vec![9u8; 5000]);
        assert!(matches!(
            reader.read_entry(EntryId::ICON0_PNG),
            Err(Error::EntryNotFound(0x1200))
        ));
    }

    #[test]
    fn test_truncated_stream() {
        let mut data = sample();
        data.truncate(0x1030);
        assert!(matches!(
            PkgReader::from_reader(Cursor::new(data)),
            Err(Error::TruncatedInput { .. })
        ));
    }

    #[test]
    fn test_short_stream_is_truncated_not_io() {
        let data = format::PKG_MAGIC.to_be_bytes().to_vec();
        assert!(matches!(
            PkgReader::from_reader(Cursor::new(data)),
            Err(Error::TruncatedInput { .. })
        ));
    }

    #[test]
    fn test_summarize() {
        let mut reader = PkgReader::from_reader(Cursor::new(sample())).unwrap();
        let summaries = reader.summarize().unwrap();
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].sha1.len(), 40);
        assert_ne!(summaries[0].sha1, summaries[1].sha1);
    }

    #[test]
    fn test_extract_all() {
        let dir = tempfile::tempdir().unwrap();
        let mut reader = PkgReader::from_reader(Cursor::new(sample())).unwrap();
        let written = reader.extract_all(dir.path()).unwrap();

        assert_eq!(written.len(), 2);
        assert_eq!(
            std::fs::read(dir.path().join("1000_PARAM_SFO.bin")).unwrap(),
            b"sfo data"
        );
        assert_eq!(
            std::fs::read(dir.path().join("1201_DATA_FILE.bin")).unwrap(),
            vec![9u8; 5000]
        );
    }

    #[test]
    fn test_extracted_file_name() {
        assert_eq!(extracted_file_name(EntryId::ICON0_PNG), "1200_ICON0_PNG.bin");
        assert_eq!(extracted_file_name(EntryId(0x0777)), "0777_UNKNOWN_0777.bin");
    }
}
