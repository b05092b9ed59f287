//! Field-level comparison and structural checks of parsed headers.
//!
//! Everything here is informational: differences and findings are returned
//! as data and never turned into errors.

use crate::format::{self, ContainerEntry, ContainerHeader, EntryId, HEADER_SIZE};
use crate::psarc::PsarcHeader;
use crate::reader::EntrySummary;
use std::collections::BTreeMap;
use std::fmt;

/// A header that can be listed as named, printable fields
pub trait HeaderFields {
    /// Field names and values in on-disk order
    fn fields(&self) -> Vec<(&'static str, String)>;
}

impl HeaderFields for ContainerHeader {
    fn fields(&self) -> Vec<(&'static str, String)> {
        vec![
            ("magic", format!("0x{:08X}", self.magic)),
            ("type", format!("0x{:08X}", self.pkg_type)),
            ("flags", format!("0x{:08X}", self.flags)),
            ("file_count", self.file_count.to_string()),
            ("entry_count", self.entry_count.to_string()),
            ("sc_entry_count", self.sc_entry_count.to_string()),
            ("entry_count_2", self.entry_count_2.to_string()),
            ("entry_table_offset", format!("0x{:X}", self.entry_table_offset)),
            ("entry_table_size", self.entry_table_size.to_string()),
            ("body_offset", format!("0x{:X}", self.body_offset)),
            ("body_size", self.body_size.to_string()),
            ("content_offset", format!("0x{:X}", self.content_offset)),
            ("content_size", self.content_size.to_string()),
            ("content_id", self.content_id.clone()),
            ("drm_type", format!("0x{:08X}", self.drm_type)),
            ("content_type", format!("0x{:08X}", self.content_type)),
            ("content_flags", format!("0x{:08X}", self.content_flags)),
        ]
    }
}

impl HeaderFields for PsarcHeader {
    fn fields(&self) -> Vec<(&'static str, String)> {
        vec![
            ("version", self.version()),
            ("compression", self.compression_str()),
            ("toc_length", self.toc_length.to_string()),
            ("toc_entry_size", self.toc_entry_size.to_string()),
            ("num_files", self.num_files.to_string()),
            ("block_size", self.block_size.to_string()),
            ("platform", self.platform().to_string()),
        ]
    }
}

/// One differing header field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDiff {
    pub field: &'static str,
    pub left: String,
    pub right: String,
}

impl fmt::Display for FieldDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} != {}", self.field, self.left, self.right)
    }
}

/// Lists every field whose value differs between two headers
pub fn diff_headers<H: HeaderFields>(left: &H, right: &H) -> Vec<FieldDiff> {
    left.fields()
        .into_iter()
        .zip(right.fields())
        .filter(|((_, a), (_, b))| a != b)
        .map(|((field, a), (_, b))| FieldDiff {
            field,
            left: a,
            right: b,
        })
        .collect()
}

/// A difference between two entry tables
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryDiff {
    /// Entry only present in the left package
    OnlyLeft(EntryId),
    /// Entry only present in the right package
    OnlyRight(EntryId),
    /// Entry present on both sides with a differing attribute
    Changed {
        id: EntryId,
        field: &'static str,
        left: String,
        right: String,
    },
}

impl fmt::Display for EntryDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryDiff::OnlyLeft(id) => write!(f, "{id}: only in left"),
            EntryDiff::OnlyRight(id) => write!(f, "{id}: only in right"),
            EntryDiff::Changed {
                id,
                field,
                left,
                right,
            } => write!(f, "{id}: {field} {left} != {right}"),
        }
    }
}

/// Compares two entry tables by id.
///
/// Offsets are not compared since they follow from the sizes; payloads are
/// compared through their SHA-1 fingerprints.
pub fn diff_entries(left: &[EntrySummary], right: &[EntrySummary]) -> Vec<EntryDiff> {
    let left_map: BTreeMap<u32, &EntrySummary> = left.iter().map(|s| (s.record.id, s)).collect();
    let right_map: BTreeMap<u32, &EntrySummary> =
        right.iter().map(|s| (s.record.id, s)).collect();

    let mut diffs = Vec::new();

    for (&id, l) in &left_map {
        let Some(r) = right_map.get(&id) else {
            diffs.push(EntryDiff::OnlyLeft(EntryId(id)));
            continue;
        };

        let pairs = [
            ("size", l.record.file_size.to_string(), r.record.file_size.to_string()),
            ("flags1", format!("0x{:08X}", l.record.flags1), format!("0x{:08X}", r.record.flags1)),
            ("flags2", format!("0x{:08X}", l.record.flags2), format!("0x{:08X}", r.record.flags2)),
            ("sha1", l.sha1.clone(), r.sha1.clone()),
        ];
        for (field, a, b) in pairs {
            if a != b {
                diffs.push(EntryDiff::Changed {
                    id: EntryId(id),
                    field,
                    left: a,
                    right: b,
                });
            }
        }
    }

    for &id in right_map.keys() {
        if !left_map.contains_key(&id) {
            diffs.push(EntryDiff::OnlyRight(EntryId(id)));
        }
    }

    diffs
}

/// Result of one structural check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finding {
    pub check: &'static str,
    pub passed: bool,
    pub message: String,
}

impl Finding {
    fn pass(check: &'static str, message: impl Into<String>) -> Self {
        Self {
            check,
            passed: true,
            message: message.into(),
        }
    }

    fn issue(check: &'static str, message: impl Into<String>) -> Self {
        Self {
            check,
            passed: false,
            message: message.into(),
        }
    }
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mark = if self.passed { "ok" } else { "ISSUE" };
        write!(f, "[{mark}] {}: {}", self.check, self.message)
    }
}

/// Content id prefixes of the retail regions
pub const CONTENT_ID_PREFIXES: [&str; 4] = ["EP", "UP", "JP", "HP"];

/// Runs the structural checks on a parsed package
pub fn validate(
    header: &ContainerHeader,
    entries: &[ContainerEntry],
    alignment: u64,
) -> Vec<Finding> {
    let mut findings = Vec::new();

    if CONTENT_ID_PREFIXES
        .iter()
        .any(|p| header.content_id.starts_with(p))
    {
        findings.push(Finding::pass("content_id", "region prefix looks valid"));
    } else {
        findings.push(Finding::issue(
            "content_id",
            format!("unexpected prefix in '{}'", header.content_id),
        ));
    }

    if header.entry_table_offset as usize >= HEADER_SIZE {
        findings.push(Finding::pass("entry_table_offset", "after the header region"));
    } else {
        findings.push(Finding::issue(
            "entry_table_offset",
            format!("0x{:X} is inside the header region", header.entry_table_offset),
        ));
    }

    let table_end = header.entry_table_end();
    if header.body_offset >= table_end {
        findings.push(Finding::pass("body_offset", "does not overlap the entry table"));
    } else {
        findings.push(Finding::issue(
            "body_offset",
            format!(
                "0x{:X} overlaps the entry table ending at 0x{:X}",
                header.body_offset, table_end
            ),
        ));
    }

    let counts_match = header.file_count == header.entry_count
        && header.entry_count_2 as u32 == header.entry_count
        && header.entry_count as usize == entries.len();
    if counts_match {
        findings.push(Finding::pass("entry_count", "all counts agree"));
    } else {
        findings.push(Finding::issue(
            "entry_count",
            format!(
                "file_count {}, entry_count {}, entry_count_2 {}, table has {}",
                header.file_count,
                header.entry_count,
                header.entry_count_2,
                entries.len()
            ),
        ));
    }

    let sc_count = entries.iter().filter(|e| e.is_system_content()).count();
    if sc_count == header.sc_entry_count as usize {
        findings.push(Finding::pass("sc_entry_count", "matches the flagged entries"));
    } else {
        findings.push(Finding::issue(
            "sc_entry_count",
            format!(
                "header says {}, {} entries carry the flag",
                header.sc_entry_count, sc_count
            ),
        ));
    }

    let unordered: Vec<String> = entries
        .windows(2)
        .filter(|pair| pair[0].id >= pair[1].id)
        .map(|pair| format!("0x{:04X} before 0x{:04X}", pair[0].id, pair[1].id))
        .collect();
    if unordered.is_empty() {
        findings.push(Finding::pass("entry_order", "ids strictly ascending"));
    } else {
        findings.push(Finding::issue("entry_order", unordered.join(", ")));
    }

    let mut by_offset: Vec<&ContainerEntry> = entries.iter().collect();
    by_offset.sort_by_key(|e| e.file_offset);
    let overlapping: Vec<String> = by_offset
        .windows(2)
        .filter(|pair| pair[0].file_end() > pair[1].file_offset)
        .map(|pair| format!("0x{:04X} overlaps 0x{:04X}", pair[0].id, pair[1].id))
        .collect();
    if overlapping.is_empty() {
        findings.push(Finding::pass("entry_overlap", "no payload regions overlap"));
    } else {
        findings.push(Finding::issue("entry_overlap", overlapping.join(", ")));
    }

    let misaligned: Vec<String> = entries
        .iter()
        .filter(|e| !crate::align::is_aligned(e.file_offset, alignment))
        .map(|e| format!("0x{:04X} at 0x{:X}", e.id, e.file_offset))
        .collect();
    if misaligned.is_empty() {
        findings.push(Finding::pass(
            "alignment",
            format!("all payloads aligned to {alignment} bytes"),
        ));
    } else {
        findings.push(Finding::issue(
            "alignment",
            format!("not aligned to {alignment} bytes: {}", misaligned.join(", ")),
        ));
    }

    findings
}

/// One differing row of a raw byte comparison
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawDiff {
    pub offset: usize,
    pub left: Vec<u8>,
    pub right: Vec<u8>,
}

impl fmt::Display for RawDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "0x{:04X}:", self.offset)?;
        writeln!(f, "  left:  {}", spaced_hex(&self.left))?;
        write!(f, "  right: {}", spaced_hex(&self.right))
    }
}

/// Compares two byte strings in rows of `row` bytes and returns the rows that differ
pub fn diff_raw(left: &[u8], right: &[u8], row: usize) -> Vec<RawDiff> {
    let row = row.max(1);
    let len = left.len().max(right.len());

    (0..len)
        .step_by(row)
        .filter_map(|offset| {
            let l = row_at(left, offset, row);
            let r = row_at(right, offset, row);
            (l != r).then(|| RawDiff {
                offset,
                left: l.to_vec(),
                right: r.to_vec(),
            })
        })
        .collect()
}

/// Compares the first 0x100 bytes of two packages, where all named header fields live
pub fn diff_header_bytes(left: &[u8], right: &[u8]) -> Vec<RawDiff> {
    let end = format::DIGEST_AREA_OFFSET;
    diff_raw(&left[..left.len().min(end)], &right[..right.len().min(end)], 16)
}

fn row_at(data: &[u8], offset: usize, row: usize) -> &[u8] {
    let start = offset.min(data.len());
    let end = (offset + row).min(data.len());
    &data[start..end]
}

fn spaced_hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{PackageInfo, build};
    use crate::container;
    use crate::entry::PkgEntry;
    use crate::reader::PkgReader;
    use std::io::Cursor;

    fn pkg(content_id: &str, entries: &[PkgEntry]) -> Vec<u8> {
        build(entries, &PackageInfo::new(content_id)).unwrap()
    }

    #[test]
    fn test_identical_headers_have_no_diff() {
        let data = pkg("UP0001-CUSA00745_00-RS001PACK0000001", &[PkgEntry::new(1u32, vec![1])]);
        let parsed = container::parse(&data).unwrap();
        assert!(diff_headers(&parsed.header, &parsed.header).is_empty());
    }

    #[test]
    fn test_header_diff_lists_fields() {
        let a = pkg("UP0001-CUSA00745_00-RS001PACK0000001", &[PkgEntry::new(1u32, vec![1])]);
        let b = pkg(
            "EP0001-CUSA00745_00-RS001PACK0000001",
            &[PkgEntry::new(1u32, vec![1]), PkgEntry::new(2u32, vec![2])],
        );
        let a = container::parse(&a).unwrap();
        let b = container::parse(&b).unwrap();

        let fields: Vec<&str> = diff_headers(&a.header, &b.header)
            .iter()
            .map(|d| d.field)
            .collect();
        assert!(fields.contains(&"content_id"));
        assert!(fields.contains(&"entry_count"));
        assert!(!fields.contains(&"drm_type"));
    }

    #[test]
    fn test_psarc_header_diff() {
        let mut a = PsarcHeader {
            version_major: 1,
            version_minor: 4,
            compression: *b"zlib",
            toc_length: 100,
            toc_entry_size: 30,
            num_files: 3,
            block_size: 65536,
            platform_flags: 4,
        };
        let b = a.clone();
        a.platform_flags = 0;
        let diffs = diff_headers(&a, &b);
        assert_eq!(diffs.len(), 1);
        assert_eq!(diffs[0].field, "platform");
    }

    #[test]
    fn test_entry_diff() {
        let a = pkg(
            "UP0001-CUSA00745_00-RS001PACK0000001",
            &[PkgEntry::new(1u32, vec![1]), PkgEntry::new(2u32, vec![2])],
        );
        let b = pkg(
            "UP0001-CUSA00745_00-RS001PACK0000001",
            &[PkgEntry::new(2u32, vec![3]), PkgEntry::new(3u32, vec![3])],
        );
        let a = PkgReader::from_reader(Cursor::new(a)).unwrap().summarize().unwrap();
        let b = PkgReader::from_reader(Cursor::new(b)).unwrap().summarize().unwrap();

        let diffs = diff_entries(&a, &b);
        assert_eq!(diffs.len(), 3);
        assert_eq!(diffs[0], EntryDiff::OnlyLeft(EntryId(1)));
        assert!(matches!(diffs[1], EntryDiff::Changed { field: "sha1", .. }));
        assert_eq!(diffs[2], EntryDiff::OnlyRight(EntryId(3)));
    }

    #[test]
    fn test_validate_built_package() {
        let data = pkg(
            "UP0001-CUSA00745_00-RS001PACK0000001",
            &[PkgEntry::new(1u32, vec![1; 20]), PkgEntry::new(2u32, vec![2])],
        );
        let parsed = container::parse(&data).unwrap();
        let findings = validate(&parsed.header, &parsed.entries, 16);
        assert!(findings.iter().all(|f| f.passed), "{findings:?}");
    }

    #[test]
    fn test_validate_reports_issues() {
        let data = pkg("XX0001-TEST", &[PkgEntry::new(1u32, vec![1; 20]), PkgEntry::new(2u32, vec![2])]);
        let parsed = container::parse(&data).unwrap();
        let mut entries = parsed.entries.clone();
        entries.swap(0, 1);
        entries[0].file_offset = 0x1041;

        let issues: Vec<&str> = validate(&parsed.header, &entries, 16)
            .into_iter()
            .filter(|f| !f.passed)
            .map(|f| f.check)
            .collect();
        assert_eq!(issues, vec!["content_id", "entry_order", "entry_overlap", "alignment"]);
    }

    #[test]
    fn test_diff_raw() {
        let a = [0u8; 40];
        let mut b = [0u8; 36];
        b[17] = 1;

        let diffs = diff_raw(&a, &b, 16);
        assert_eq!(diffs.len(), 2);
        assert_eq!(diffs[0].offset, 16);
        assert_eq!(diffs[1].offset, 32);
        assert_eq!(diffs[1].left.len(), 8);
        assert_eq!(diffs[1].right.len(), 4);
        assert!(diffs[0].to_string().contains("00 01 00"));
    }
}
