//! Builder for creating PKG files.

use crate::align;
use crate::callbacks::{ArchiveHandler, ControlAction, OperationType, ProgressInfo};
use crate::constants::DEFAULT_ALIGNMENT;
use crate::entry::PkgEntry;
use crate::error::{Error, Result};
use crate::format::{
    self, CONTENT_FLAGS_AC, CONTENT_TYPE_AC, ContainerEntry, ContainerHeader, DRM_TYPE_PS4,
    ENTRY_SIZE, EntryId, HEADER_SIZE, PKG_MAGIC, PKG_TYPE_FAKE,
};
use crate::reserved::ReservedRegion;
use crate::writer::PkgWriter;
use log::debug;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;
use walkdir::WalkDir;

/// Header level settings of a package
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageInfo {
    pub content_id: String,
    pub pkg_type: u32,
    pub drm_type: u32,
    pub content_type: u32,
    pub content_flags: u32,
    /// Body alignment, a power of two
    pub alignment: u64,
    /// Contents of the opaque area between the header fields and the entry table
    pub digest_area: ReservedRegion,
}

impl Default for PackageInfo {
    fn default() -> Self {
        Self {
            content_id: String::new(),
            pkg_type: PKG_TYPE_FAKE,
            drm_type: DRM_TYPE_PS4,
            content_type: CONTENT_TYPE_AC,
            content_flags: CONTENT_FLAGS_AC,
            alignment: DEFAULT_ALIGNMENT,
            digest_area: ReservedRegion::zeroed(format::DIGEST_AREA_LEN),
        }
    }
}

impl PackageInfo {
    /// Creates settings for additional content with the given content id
    pub fn new(content_id: impl Into<String>) -> Self {
        Self {
            content_id: content_id.into(),
            ..Self::default()
        }
    }

    fn validate(&self) -> Result<()> {
        align::check_boundary(self.alignment)?;
        format::encode_content_id(&self.content_id)?;
        if self.digest_area.len() != format::DIGEST_AREA_LEN {
            return Err(Error::Configuration(format!(
                "digest area must be {} bytes, got {}",
                format::DIGEST_AREA_LEN,
                self.digest_area.len()
            )));
        }
        Ok(())
    }
}

/// Header and entry table computed for an entry list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackagePlan {
    pub header: ContainerHeader,
    /// Records in table order
    pub records: Vec<ContainerEntry>,
    /// For every record, the index of the entry it was built from
    pub order: Vec<usize>,
}

impl PackagePlan {
    /// Computes the layout of a package.
    ///
    /// Entries are ordered by ascending id; the sort is stable so the result
    /// does not depend on anything but the ids.
    pub fn compute(entries: &[PkgEntry], info: &PackageInfo) -> Result<Self> {
        if entries.is_empty() {
            return Err(Error::EmptyEntrySet);
        }
        info.validate()?;

        let mut order: Vec<usize> = (0..entries.len()).collect();
        order.sort_by_key(|&i| entries[i].id());

        for pair in order.windows(2) {
            if entries[pair[0]].id() == entries[pair[1]].id() {
                return Err(Error::DuplicateId(entries[pair[0]].id()));
            }
        }

        let count = entries.len();
        let entry_count_2 = u16::try_from(count).map_err(|_| {
            Error::Layout(format!("{count} entries exceed the 16-bit entry count"))
        })?;
        let entry_count = entry_count_2 as u32;

        let table_offset = HEADER_SIZE as u64;
        let table_size = count as u64 * ENTRY_SIZE as u64;
        let body_offset = align::align_up(table_offset + table_size, info.alignment)?;

        let sizes: Vec<u64> = order.iter().map(|&i| entries[i].size()).collect();
        let layout = align::layout_offsets(&sizes, body_offset, info.alignment)?;

        let records: Vec<ContainerEntry> = order
            .iter()
            .zip(&layout.offsets)
            .map(|(&i, &offset)| ContainerEntry {
                id: entries[i].id(),
                name_offset: 0,
                flags1: entries[i].flags1(),
                flags2: entries[i].flags2(),
                file_offset: offset,
                file_size: entries[i].size(),
            })
            .collect();

        let sc_entry_count = records.iter().filter(|r| r.is_system_content()).count() as u16;

        debug!(
            "Layout: {} entries, table 0x{:X}..0x{:X}, body 0x{:X}..0x{:X}",
            count,
            table_offset,
            table_offset + table_size,
            layout.base,
            layout.end
        );

        let header = ContainerHeader {
            magic: PKG_MAGIC,
            pkg_type: info.pkg_type,
            flags: 0,
            file_count: entry_count,
            entry_count,
            sc_entry_count,
            entry_count_2,
            entry_table_offset: HEADER_SIZE as u32,
            entry_table_size: table_size as u32,
            body_offset: layout.base,
            body_size: layout.span(),
            content_offset: layout.base,
            content_size: layout.span(),
            content_id: info.content_id.clone(),
            drm_type: info.drm_type,
            content_type: info.content_type,
            content_flags: info.content_flags,
        };

        Ok(Self {
            header,
            records,
            order,
        })
    }

    /// Size of the finished package in bytes
    pub fn total_size(&self) -> u64 {
        self.header.body_offset + self.header.body_size
    }
}

/// Builds a package from in-memory entries
pub fn build(entries: &[PkgEntry], info: &PackageInfo) -> Result<Vec<u8>> {
    let plan = PackagePlan::compute(entries, info)?;
    let mut out = Vec::with_capacity(plan.total_size() as usize);
    write_plan(&plan, entries, info, &mut out, &mut crate::callbacks::NoOpHandler)?;
    Ok(out)
}

fn write_plan<W: Write, H: ArchiveHandler + ?Sized>(
    plan: &PackagePlan,
    entries: &[PkgEntry],
    info: &PackageInfo,
    output: W,
    handler: &mut H,
) -> Result<W> {
    if handler.on_started(OperationType::Pack) == ControlAction::Abort {
        return Err(Error::Cancelled);
    }

    let mut writer = PkgWriter::new(output, info.alignment)?;
    writer.write_header(&plan.header, &info.digest_area, &plan.records)?;

    let total_bytes: u64 = plan.records.iter().map(|r| r.file_size).sum();
    let mut progress = ProgressInfo {
        processed_bytes: 0,
        total_bytes: Some(total_bytes),
        processed_files: 0,
        total_files: Some(plan.records.len()),
        current_file: String::new(),
    };

    for (record, &index) in plan.records.iter().zip(&plan.order) {
        let name = record.entry_id().to_string();

        if handler.on_entry_started(&name) == ControlAction::Abort {
            return Err(Error::Cancelled);
        }

        writer.write_entry(entries[index].source())?;

        progress.processed_bytes += record.file_size;
        progress.processed_files += 1;
        progress.current_file = name;
        if handler.on_progress(&progress) == ControlAction::Abort {
            return Err(Error::Cancelled);
        }
        if handler.on_entry_finished(&progress.current_file) == ControlAction::Abort {
            return Err(Error::Cancelled);
        }
    }

    writer.finalize()?;
    handler.on_finished();
    Ok(writer.into_inner())
}

/// A builder for creating PKG files with a fluent API
#[derive(Debug, Clone, Default)]
pub struct PkgBuilder {
    entries: Vec<PkgEntry>,
    info: PackageInfo,
    /// System files get the standard layout's flags
    standard: bool,
}

impl PkgBuilder {
    /// Creates a new builder with additional-content defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a builder from existing settings
    pub fn with_info(info: PackageInfo) -> Self {
        Self {
            entries: Vec::new(),
            info,
            standard: false,
        }
    }

    pub fn content_id(&mut self, content_id: impl Into<String>) -> &mut Self {
        self.info.content_id = content_id.into();
        self
    }

    pub fn pkg_type(&mut self, pkg_type: u32) -> &mut Self {
        self.info.pkg_type = pkg_type;
        self
    }

    pub fn drm_type(&mut self, drm_type: u32) -> &mut Self {
        self.info.drm_type = drm_type;
        self
    }

    pub fn content_type(&mut self, content_type: u32) -> &mut Self {
        self.info.content_type = content_type;
        self
    }

    pub fn content_flags(&mut self, content_flags: u32) -> &mut Self {
        self.info.content_flags = content_flags;
        self
    }

    /// Sets the body alignment; checked when the package is written
    pub fn alignment(&mut self, alignment: u64) -> &mut Self {
        self.info.alignment = alignment;
        self
    }

    /// Sets the contents of the header's digest area
    pub fn digest_region(&mut self, region: ReservedRegion) -> &mut Self {
        self.info.digest_area = region;
        self
    }

    /// Adds an entry with in-memory data
    pub fn add_bytes<I: Into<EntryId>>(&mut self, id: I, data: impl Into<Vec<u8>>) -> &mut Self {
        self.push(PkgEntry::new(id, data))
    }

    /// Adds an entry streamed from a file
    pub fn add_file<I: Into<EntryId>, P: AsRef<Path>>(
        &mut self,
        id: I,
        path: P,
    ) -> Result<&mut Self> {
        Ok(self.push(PkgEntry::from_file(id, path)?))
    }

    /// Adds a placeholder entry
    pub fn add_reserved<I: Into<EntryId>>(&mut self, id: I, region: ReservedRegion) -> &mut Self {
        self.push(PkgEntry::reserved(id, region))
    }

    /// Adds a prepared entry
    pub fn add_entry(&mut self, entry: PkgEntry) -> &mut Self {
        self.push(entry)
    }

    /// Switches to the standard additional-content layout.
    ///
    /// Adds zero-filled key, digest and license placeholders for every
    /// standard id not added yet. Entries without flags, including ones added
    /// later, get the flags the layout assigns to their id.
    pub fn with_standard_entries(&mut self) -> &mut Self {
        self.standard = true;
        let entries = std::mem::take(&mut self.entries);
        for entry in entries {
            self.push(entry);
        }

        for (id, size, flags1, flags2) in format::STANDARD_PLACEHOLDERS {
            if !self.contains(id) {
                debug!("Adding placeholder {} of {} bytes", id, size);
                self.push(PkgEntry::reserved(id, ReservedRegion::zeroed(size)).flags(flags1, flags2));
            }
        }
        self
    }

    fn push(&mut self, entry: PkgEntry) -> &mut Self {
        let entry = match format::standard_flags(entry.entry_id()) {
            Some((flags1, flags2))
                if self.standard && entry.flags1() == 0 && entry.flags2() == 0 =>
            {
                entry.flags(flags1, flags2)
            }
            _ => entry,
        };
        self.entries.push(entry);
        self
    }

    /// Adds a file under the id its name implies
    ///
    /// Well-known `sce_sys` names such as `param.sfo` get their fixed ids;
    /// any other file gets the next free data file id.
    pub fn add_named_file<P: AsRef<Path>>(&mut self, path: P) -> Result<&mut Self> {
        let path = path.as_ref();
        let id = path
            .file_name()
            .and_then(|name| name.to_str())
            .and_then(EntryId::from_file_name)
            .unwrap_or_else(|| self.next_data_id());

        debug!("Adding {} as {}", path.display(), id);
        self.add_file(id, path)
    }

    /// Adds all files from a directory recursively, in file name order
    pub fn add_dir<P: AsRef<Path>>(&mut self, dir_path: P) -> Result<&mut Self> {
        let dir_path = dir_path.as_ref();

        if !dir_path.is_dir() {
            return Err(Error::invalid_value(
                dir_path.display().to_string(),
                "path is not a directory",
            ));
        }

        for entry in WalkDir::new(dir_path).sort_by_file_name() {
            let entry = entry?;
            if entry.file_type().is_file() {
                self.add_named_file(entry.path())?;
            }
        }

        Ok(self)
    }

    /// Returns true if an entry with the given id was added
    pub fn contains<I: Into<EntryId>>(&self, id: I) -> bool {
        let id = id.into().0;
        self.entries.iter().any(|e| e.id() == id)
    }

    /// First data file id above every id added so far
    pub fn next_data_id(&self) -> EntryId {
        let next = self
            .entries
            .iter()
            .map(|e| e.id().saturating_add(1))
            .max()
            .unwrap_or(0);
        EntryId(next.max(EntryId::FIRST_DATA_FILE.0))
    }

    /// Computes the layout without writing anything
    pub fn plan(&self) -> Result<PackagePlan> {
        PackagePlan::compute(&self.entries, &self.info)
    }

    /// Builds the package in memory
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        build(&self.entries, &self.info)
    }

    /// Writes the package to any output
    pub fn write_to<W: Write>(&self, output: W) -> Result<W> {
        let plan = self.plan()?;
        write_plan(&plan, &self.entries, &self.info, output, &mut crate::callbacks::NoOpHandler)
    }

    /// Writes the package to a file
    pub fn write_to_file<P: AsRef<Path>>(&self, output_path: P) -> Result<()> {
        self.write_to_file_with_progress(output_path, &mut crate::callbacks::NoOpHandler)
    }

    /// Writes the package to a file with progress callback
    ///
    /// The output file is removed again if anything fails after it was created.
    pub fn write_to_file_with_progress<P: AsRef<Path>, H: ArchiveHandler + ?Sized>(
        &self,
        output_path: P,
        handler: &mut H,
    ) -> Result<()> {
        let output_path = output_path.as_ref();
        let plan = self.plan()?;

        if let Some(parent) = output_path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }

        let file = File::create(output_path)?;
        let result = write_plan(
            &plan,
            &self.entries,
            &self.info,
            BufWriter::new(file),
            handler,
        )
        .and_then(|mut out| out.flush().map_err(Error::from));

        if result.is_err() {
            let _ = fs::remove_file(output_path);
        }
        result
    }

    /// Returns the settings that will be written to the header
    pub fn info(&self) -> &PackageInfo {
        &self.info
    }

    /// Returns the entries added so far, in insertion order
    pub fn entries(&self) -> &[PkgEntry] {
        &self.entries
    }

    /// Returns the number of entries that will be included
    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no entries have been added
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Clears all added entries
    pub fn clear(&mut self) -> &mut Self {
        self.entries.clear();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::{read_u16_be, read_u32_be, read_u64_be};

    const CONTENT_ID: &str = "UP0001-CUSA00745_00-RS001PACK0000001";

    #[test]
    fn test_empty_entry_set() {
        assert!(matches!(
            build(&[], &PackageInfo::new(CONTENT_ID)),
            Err(Error::EmptyEntrySet)
        ));
    }

    #[test]
    fn test_duplicate_id() {
        let entries = [
            PkgEntry::new(0x1201u32, vec![1]),
            PkgEntry::new(0x1000u32, vec![2]),
            PkgEntry::new(0x1201u32, vec![3]),
        ];
        assert!(matches!(
            build(&entries, &PackageInfo::new(CONTENT_ID)),
            Err(Error::DuplicateId(0x1201))
        ));
    }

    #[test]
    fn test_bad_alignment_and_content_id() {
        let entries = [PkgEntry::new(1u32, vec![1])];

        let mut info = PackageInfo::new(CONTENT_ID);
        info.alignment = 24;
        assert!(matches!(build(&entries, &info), Err(Error::Configuration(_))));

        let info = PackageInfo::new("X".repeat(37));
        assert!(matches!(build(&entries, &info), Err(Error::ValueTooLong { .. })));

        let mut info = PackageInfo::new(CONTENT_ID);
        info.digest_area = ReservedRegion::zeroed(16);
        assert!(matches!(build(&entries, &info), Err(Error::Configuration(_))));
    }

    #[test]
    fn test_header_fields() {
        let entries = [
            PkgEntry::new(EntryId::ICON0_PNG, vec![0xAA; 10]),
            PkgEntry::new(EntryId::PARAM_SFO, vec![0xBB; 17]).system_content(),
        ];
        let data = build(&entries, &PackageInfo::new(CONTENT_ID)).unwrap();

        assert_eq!(read_u32_be(&data, 0x0C).unwrap(), 2);
        assert_eq!(read_u32_be(&data, 0x10).unwrap(), 2);
        assert_eq!(read_u16_be(&data, 0x14).unwrap(), 1);
        assert_eq!(read_u16_be(&data, 0x16).unwrap(), 2);
        assert_eq!(read_u32_be(&data, 0x18).unwrap(), 0x1000);
        assert_eq!(read_u32_be(&data, 0x1C).unwrap(), 64);
        assert_eq!(read_u64_be(&data, 0x20).unwrap(), 0x1040);
        assert_eq!(read_u64_be(&data, 0x28).unwrap(), 0x20 + 0x10);
        assert_eq!(read_u64_be(&data, 0x30).unwrap(), 0x1040);
        assert_eq!(&data[0x40..0x40 + CONTENT_ID.len()], CONTENT_ID.as_bytes());
        assert_eq!(data.len(), 0x1040 + 0x30);

        // entries sorted by id: PARAM_SFO first
        assert_eq!(read_u32_be(&data, 0x1000).unwrap(), 0x1000);
        assert_eq!(read_u64_be(&data, 0x1010).unwrap(), 0x1040);
        assert_eq!(read_u32_be(&data, 0x1020).unwrap(), 0x1200);
        assert_eq!(read_u64_be(&data, 0x1030).unwrap(), 0x1060);
        assert_eq!(&data[0x1060..0x106A], &[0xAA; 10]);
    }

    #[test]
    fn test_body_offset_follows_alignment() {
        let entries = [PkgEntry::new(1u32, vec![1, 2, 3])];
        let mut info = PackageInfo::new(CONTENT_ID);
        info.alignment = 0x1000;

        let plan = PackagePlan::compute(&entries, &info).unwrap();
        assert_eq!(plan.header.body_offset, 0x2000);
        assert_eq!(plan.header.body_size, 0x1000);
        assert_eq!(build(&entries, &info).unwrap().len(), 0x3000);
    }

    #[test]
    fn test_too_many_entries() {
        let entries: Vec<PkgEntry> = (0..=u16::MAX as u32 + 1)
            .map(|id| PkgEntry::new(id, Vec::new()))
            .collect();
        assert!(matches!(
            PackagePlan::compute(&entries, &PackageInfo::new(CONTENT_ID)),
            Err(Error::Layout(_))
        ));
    }

    #[test]
    fn test_digest_region_is_written() {
        let mut builder = PkgBuilder::new();
        builder
            .content_id(CONTENT_ID)
            .digest_region(ReservedRegion::from_bytes(vec![0x5A; format::DIGEST_AREA_LEN]))
            .add_bytes(EntryId::PARAM_SFO, b"sfo".to_vec());
        let data = builder.to_bytes().unwrap();
        assert!(data[0x100..0x1000].iter().all(|&b| b == 0x5A));
    }

    #[test]
    fn test_add_dir_assigns_ids() {
        let dir = tempfile::tempdir().unwrap();
        let sce_sys = dir.path().join("sce_sys");
        fs::create_dir(&sce_sys).unwrap();
        fs::write(sce_sys.join("param.sfo"), b"sfo").unwrap();
        fs::write(sce_sys.join("icon0.png"), b"png").unwrap();
        fs::write(dir.path().join("a.psarc"), b"a").unwrap();
        fs::write(dir.path().join("b.psarc"), b"bb").unwrap();

        let mut builder = PkgBuilder::new();
        builder.add_dir(dir.path()).unwrap();

        let mut ids: Vec<u32> = builder.entries().iter().map(|e| e.id()).collect();
        ids.sort();
        assert_eq!(ids, vec![0x1000, 0x1200, 0x1201, 0x1202]);

        let a = builder.entries().iter().find(|e| e.id() == 0x1201).unwrap();
        assert_eq!(a.size(), 1);
    }

    #[test]
    fn test_standard_entries() {
        let mut builder = PkgBuilder::new();
        builder
            .content_id(CONTENT_ID)
            .add_bytes(EntryId::PARAM_SFO, b"sfo".to_vec())
            .add_reserved(EntryId::LICENSE, ReservedRegion::from_bytes(vec![7; 16]))
            .with_standard_entries()
            .add_bytes(EntryId::ICON0_PNG, b"png".to_vec())
            .add_bytes(EntryId::PSRESERVED, b"PSAR".to_vec());
        assert_eq!(builder.entry_count(), 11);

        let plan = builder.plan().unwrap();
        let table: Vec<(u32, u64, u32, u32)> = plan
            .records
            .iter()
            .map(|r| (r.id, r.file_size, r.flags1, r.flags2))
            .collect();
        assert_eq!(
            table,
            vec![
                (0x0001, 352, 0x4000_0000, 0),
                (0x0010, 2048, 0x8000_0000, 0x3000),
                (0x0020, 256, 0xE000_0000, 0x3000),
                (0x0080, 384, 0x6000_0000, 0),
                (0x0100, 352, 0x6000_0000, 0),
                (0x0200, 21, 0x4000_0000, 0),
                // added before the preset, keeps its payload
                (0x0400, 16, 0x8000_0000, 0x3000),
                (0x0401, 512, 0x8000_0000, 0x2000),
                (0x0409, 4, 0, 0),
                (0x1000, 3, 0, 1),
                (0x1200, 3, 0, 11),
            ]
        );
        // GENERAL_DIGESTS, METAS and IMAGE_KEY carry the system content bit
        assert_eq!(plan.header.sc_entry_count, 3);

        let data = builder.to_bytes().unwrap();
        let parsed = crate::container::parse(&data).unwrap();
        assert_eq!(parsed.entries.len(), 11);
        assert!(parsed.payload(&parsed.entries[1]).unwrap().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_standard_entries_keep_explicit_flags() {
        let mut builder = PkgBuilder::new();
        builder
            .with_standard_entries()
            .add_entry(PkgEntry::new(EntryId::PARAM_SFO, b"sfo".to_vec()).flags(5, 6));
        let sfo = builder.entries().iter().find(|e| e.id() == 0x1000).unwrap();
        assert_eq!((sfo.flags1(), sfo.flags2()), (5, 6));
    }

    #[test]
    fn test_write_to_file_removes_output_on_cancel() {
        struct Abort;
        impl ArchiveHandler for Abort {
            fn on_entry_started(&mut self, _name: &str) -> ControlAction {
                ControlAction::Abort
            }
        }

        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.pkg");

        let mut builder = PkgBuilder::new();
        builder.content_id(CONTENT_ID).add_bytes(1u32, vec![1]);

        assert!(matches!(
            builder.write_to_file_with_progress(&out, &mut Abort),
            Err(Error::Cancelled)
        ));
        assert!(!out.exists());

        builder.write_to_file(&out).unwrap();
        assert_eq!(fs::read(&out).unwrap(), builder.to_bytes().unwrap());
    }
}
