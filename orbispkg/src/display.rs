//! Tabular listings of packages and SFO documents (requires 'display' feature).

use crate::diff::{Finding, HeaderFields};
use crate::format::ContainerEntry;
use crate::sfo::SfoDocument;
use human_bytes::human_bytes;
use std::fmt;
use tabled::settings::object::Columns;
use tabled::settings::{Alignment, Style};
use tabled::{Table, Tabled};

/// Represents an entry record for display purposes
#[derive(Tabled)]
pub struct DisplayEntry {
    #[tabled(rename = "ID")]
    pub id: String,
    #[tabled(rename = "Name")]
    pub name: String,
    #[tabled(rename = "Offset")]
    pub offset: String,
    #[tabled(rename = "Flags1")]
    pub flags1: String,
    #[tabled(rename = "Flags2")]
    pub flags2: String,
    #[tabled(rename = "Size", display = "Self::format_size")]
    pub size: u64,
}

impl DisplayEntry {
    fn format_size(size: &u64) -> String {
        human_bytes(*size as f64)
    }

    pub fn from_entry(entry: &ContainerEntry) -> Self {
        Self {
            id: format!("0x{:04X}", entry.id),
            name: entry.entry_id().name(),
            offset: format!("0x{:X}", entry.file_offset),
            flags1: format!("0x{:08X}", entry.flags1),
            flags2: format!("0x{:08X}", entry.flags2),
            size: entry.file_size,
        }
    }
}

/// Represents the entry table of a package for display
pub struct EntryList {
    entries: Vec<DisplayEntry>,
}

impl EntryList {
    pub fn new(entries: Vec<DisplayEntry>) -> Self {
        Self { entries }
    }

    pub fn from_records<'a, I: IntoIterator<Item = &'a ContainerEntry>>(records: I) -> Self {
        Self::new(records.into_iter().map(DisplayEntry::from_entry).collect())
    }
}

impl fmt::Display for EntryList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.entries.is_empty() {
            return write!(f, "Package is empty");
        }

        let mut table = Table::new(&self.entries);
        table.with(Style::markdown());
        table.modify(Columns::last(), Alignment::right());

        let total_size: u64 = self.entries.iter().map(|e| e.size).sum();
        let footer = format!(
            "Total: {} entries, Total size: {}",
            self.entries.len(),
            human_bytes(total_size as f64)
        );

        write!(f, "{table}\n\n{footer}")
    }
}

#[derive(Tabled)]
struct FieldRow {
    #[tabled(rename = "Field")]
    field: &'static str,
    #[tabled(rename = "Value")]
    value: String,
}

/// Field/value listing of any header
pub struct HeaderView {
    rows: Vec<FieldRow>,
}

impl HeaderView {
    pub fn new<H: HeaderFields>(header: &H) -> Self {
        let rows = header
            .fields()
            .into_iter()
            .map(|(field, value)| FieldRow { field, value })
            .collect();
        Self { rows }
    }
}

impl fmt::Display for HeaderView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut table = Table::new(&self.rows);
        table.with(Style::markdown());
        write!(f, "{table}")
    }
}

#[derive(Tabled)]
struct SfoRow {
    #[tabled(rename = "Key")]
    key: String,
    #[tabled(rename = "Format")]
    format: String,
    #[tabled(rename = "Len/Max")]
    len: String,
    #[tabled(rename = "Value")]
    value: String,
}

/// Key/value listing of an SFO document
pub struct SfoView {
    rows: Vec<SfoRow>,
}

impl SfoView {
    pub fn new(doc: &SfoDocument) -> Self {
        let rows = doc
            .entries()
            .iter()
            .map(|entry| SfoRow {
                key: entry.key.clone(),
                format: format!("{:?}", entry.value.format()),
                len: format!("{}/{}", entry.value.encoded_len(), entry.max_len),
                value: entry.value.to_string(),
            })
            .collect();
        Self { rows }
    }
}

impl fmt::Display for SfoView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.rows.is_empty() {
            return write!(f, "SFO is empty");
        }
        let mut table = Table::new(&self.rows);
        table.with(Style::markdown());
        write!(f, "{table}")
    }
}

/// Validation findings, one per line
pub struct FindingList<'a>(pub &'a [Finding]);

impl fmt::Display for FindingList<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let issues = self.0.iter().filter(|finding| !finding.passed).count();
        for finding in self.0 {
            writeln!(f, "{finding}")?;
        }
        if issues == 0 {
            write!(f, "No structural issues found")
        } else {
            write!(f, "{issues} issue(s) found")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sfo::SfoEntry;

    #[test]
    fn test_entry_list() {
        let records = [ContainerEntry {
            id: 0x1000,
            name_offset: 0,
            flags1: 0,
            flags2: 0,
            file_offset: 0x1020,
            file_size: 2048,
        }];
        let text = EntryList::from_records(&records).to_string();
        assert!(text.contains("0x1000"));
        assert!(text.contains("PARAM_SFO"));
        assert!(text.contains("Total: 1 entries"));

        assert_eq!(EntryList::new(Vec::new()).to_string(), "Package is empty");
    }

    #[test]
    fn test_sfo_view() {
        let doc = SfoDocument::from_entries(vec![
            SfoEntry::string("TITLE", "Song Pack", 128),
            SfoEntry::integer("ATTRIBUTE", 0),
        ])
        .unwrap();
        let text = SfoView::new(&doc).to_string();
        assert!(text.contains("TITLE"));
        assert!(text.contains("Song Pack"));
        assert!(text.contains("10/128"));
    }
}
