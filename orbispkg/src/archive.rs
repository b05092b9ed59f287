//! High-level operations on PKG files.

use crate::builder::PkgBuilder;
use crate::callbacks::ArchiveHandler;
use crate::diff::{self, Finding};
use crate::error::Result;
use crate::format::EntryId;
use crate::reader::PkgReader;
use crate::sfo::SfoDocument;
use std::fs::File;
use std::io::{BufReader, Write};
use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};

/// High-level interface for working with PKG files
pub struct PkgArchive {
    reader: PkgReader<BufReader<File>>,
}

impl PkgArchive {
    /// Opens an existing PKG file
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let reader = PkgReader::open(path)?;
        Ok(Self { reader })
    }

    /// Creates a new package builder
    pub fn builder() -> PkgBuilder {
        PkgBuilder::new()
    }

    /// Extracts a single entry to the given path using streaming I/O
    pub fn extract_entry<I: Into<EntryId>, P: AsRef<Path>>(
        &mut self,
        id: I,
        output_path: P,
    ) -> Result<()> {
        if let Some(parent) = output_path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut output_file = File::create(output_path)?;
        self.reader.read_entry_streaming(id, |chunk| {
            output_file.write_all(chunk)?;
            Ok(())
        })
    }

    /// Decodes the embedded `param.sfo`, if the package carries one
    pub fn param_sfo(&mut self) -> Result<Option<SfoDocument>> {
        if !self.reader.contains(EntryId::PARAM_SFO) {
            return Ok(None);
        }
        let data = self.reader.read_entry(EntryId::PARAM_SFO)?;
        SfoDocument::decode(&data).map(Some)
    }

    /// Structural checks of the header and entry table
    pub fn validate(&self, alignment: u64) -> Vec<Finding> {
        let entries: Vec<_> = self.reader.entries().copied().collect();
        diff::validate(self.reader.header(), &entries, alignment)
    }

    /// Gets the underlying reader (for advanced use cases)
    pub fn reader(&self) -> &PkgReader<BufReader<File>> {
        &self.reader
    }

    /// Gets the underlying reader mutably (for advanced use cases)
    pub fn reader_mut(&mut self) -> &mut PkgReader<BufReader<File>> {
        &mut self.reader
    }
}

impl Deref for PkgArchive {
    type Target = PkgReader<BufReader<File>>;

    fn deref(&self) -> &Self::Target {
        &self.reader
    }
}

impl DerefMut for PkgArchive {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.reader
    }
}

// Convenience functions for one-off operations

/// Extracts every entry of a PKG file to the specified directory
pub fn extract<P: AsRef<Path>, Q: AsRef<Path>>(
    archive_path: P,
    output_dir: Q,
) -> Result<Vec<PathBuf>> {
    let mut archive = PkgArchive::open(archive_path)?;
    archive.extract_all(output_dir)
}

/// Extracts a PKG file with progress reporting
pub fn extract_with_progress<P: AsRef<Path>, Q: AsRef<Path>, H: ArchiveHandler + ?Sized>(
    archive_path: P,
    output_dir: Q,
    handler: &mut H,
) -> Result<Vec<PathBuf>> {
    let mut archive = PkgArchive::open(archive_path)?;
    archive.extract_all_with_progress(output_dir, handler)
}

/// Creates a PKG file from a directory
pub fn create_from_dir<P: AsRef<Path>, Q: AsRef<Path>>(
    input_dir: P,
    output_path: Q,
    content_id: &str,
) -> Result<()> {
    let mut builder = PkgBuilder::new();
    builder.content_id(content_id);
    builder.add_dir(input_dir)?;
    builder.write_to_file(output_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sfo::SfoDocument;

    #[test]
    fn test_create_open_extract() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("input");
        std::fs::create_dir(&input).unwrap();

        let sfo = SfoDocument::additional_content(
            "UP0001-CUSA00745_00-RS001PACK0000001",
            "Song Pack",
            "CUSA00745",
            "01.00",
        )
        .unwrap();
        std::fs::write(input.join("param.sfo"), sfo.encode().unwrap()).unwrap();
        std::fs::write(input.join("song.psarc"), b"PSAR payload").unwrap();

        let pkg = dir.path().join("out.pkg");
        create_from_dir(&input, &pkg, "UP0001-CUSA00745_00-RS001PACK0000001").unwrap();

        let mut archive = PkgArchive::open(&pkg).unwrap();
        assert_eq!(archive.len(), 2);
        assert_eq!(archive.param_sfo().unwrap(), Some(sfo));
        assert!(archive.validate(16).iter().all(|f| f.passed));

        let single = dir.path().join("single/song.psarc");
        archive.extract_entry(0x1201u32, &single).unwrap();
        assert_eq!(std::fs::read(&single).unwrap(), b"PSAR payload");

        let written = extract(&pkg, dir.path().join("out")).unwrap();
        assert_eq!(written.len(), 2);
    }
}
