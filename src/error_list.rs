// Error list
//
// Validation failures for the active aggregate, grouped by record type. The
// list drives the error popover: each entry can be jumped to, and the whole
// list can be copied as plain text.
//
// Messages use '¬' where a comma should be displayed; the copied text
// restores the comma.

use crate::record_type::{AggregateType, RecordType};
use crate::validation::ValidationReport;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::convert::Infallible;

/// One or more failures attached to a field of one sub-record occurrence
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorEntry {
    pub field: String,
    pub errors: Vec<String>,
    /// Position in the owning collection
    #[serde(default)]
    pub index: Option<usize>,
    /// Position of the owning ESU, for ESU children
    #[serde(default)]
    pub esu_index: Option<usize>,
}

impl ErrorEntry {
    pub fn new(field: &str, error: &str) -> Self {
        ErrorEntry {
            field: field.to_string(),
            errors: vec![error.to_string()],
            index: None,
            esu_index: None,
        }
    }

    pub fn at(mut self, index: usize) -> Self {
        self.index = Some(index);
        self
    }

    pub fn in_esu(mut self, esu_index: usize) -> Self {
        self.esu_index = Some(esu_index);
        self
    }
}

/// Where the editor should move when an error is clicked
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordFocus {
    pub record_type: RecordType,
    pub index: Option<usize>,
    pub esu_index: Option<usize>,
    pub field: Option<String>,
}

impl RecordFocus {
    pub fn root(aggregate_type: AggregateType) -> Self {
        RecordFocus {
            record_type: aggregate_type.root(),
            index: None,
            esu_index: None,
            field: None,
        }
    }
}

/// External clipboard
pub trait Clipboard {
    type Error: std::fmt::Display;

    fn set_text(&mut self, text: String) -> Result<(), Self::Error>;
}

/// Clipboard that keeps the last copied text
#[derive(Debug, Default)]
pub struct MemoryClipboard {
    pub text: Option<String>,
}

impl Clipboard for MemoryClipboard {
    type Error = Infallible;

    fn set_text(&mut self, text: String) -> Result<(), Infallible> {
        self.text = Some(text);
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ErrorList {
    aggregate_type: AggregateType,
    groups: BTreeMap<RecordType, Vec<ErrorEntry>>,
}

impl ErrorList {
    pub fn empty(aggregate_type: AggregateType) -> Self {
        ErrorList {
            aggregate_type,
            groups: BTreeMap::new(),
        }
    }

    pub fn from_report(report: &ValidationReport) -> Self {
        let groups = report
            .entries
            .iter()
            .filter(|(_, entries)| !entries.is_empty())
            .map(|(rt, entries)| (*rt, entries.clone()))
            .collect();
        ErrorList {
            aggregate_type: report.aggregate_type,
            groups,
        }
    }

    pub fn aggregate_type(&self) -> AggregateType {
        self.aggregate_type
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Number of individual messages
    pub fn count(&self) -> usize {
        self.groups.values().flatten().map(|e| e.errors.len()).sum()
    }

    pub fn entries(&self, record_type: RecordType) -> &[ErrorEntry] {
        self.groups.get(&record_type).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Record types with errors, in code order
    pub fn record_types(&self) -> Vec<RecordType> {
        self.groups.keys().copied().collect()
    }

    pub fn jump_target(&self, record_type: RecordType, entry: &ErrorEntry) -> RecordFocus {
        RecordFocus {
            record_type,
            index: entry.index,
            esu_index: entry.esu_index,
            field: Some(entry.field.clone()),
        }
    }

    /// Plain-text export for the clipboard
    pub fn copy_text(&self, label: &str, timestamp: DateTime<Utc>) -> String {
        let mut out = format!(
            "{} issues copied {}\n",
            self.aggregate_type.root().title(),
            timestamp.format("%d/%m/%Y %H:%M:%S")
        );
        out.push_str(label);
        out.push('\n');
        out.push_str(&"=".repeat(label.chars().count()));
        out.push('\n');

        for (record_type, entries) in &self.groups {
            let title = record_type.title();
            out.push('\n');
            out.push_str(title);
            out.push('\n');
            out.push_str(&"-".repeat(title.chars().count()));
            out.push('\n');
            for entry in entries {
                for error in &entry.errors {
                    out.push_str(&format!("{}: {}\n", entry.field, error.replace('¬', ",")));
                }
            }
        }
        out
    }

    pub fn copy_to<C: Clipboard>(&self, clipboard: &mut C, label: &str, timestamp: DateTime<Utc>) -> Result<(), C::Error> {
        clipboard.set_text(self.copy_text(label, timestamp))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn report() -> ValidationReport {
        let mut entries = BTreeMap::new();
        entries.insert(
            RecordType::Descriptor,
            vec![ErrorEntry::new("description", "Description is required").at(0)],
        );
        entries.insert(
            RecordType::HighwayDedication,
            vec![ErrorEntry {
                field: "startDate".to_string(),
                errors: vec![
                    "Start date must not be after the end date".to_string(),
                    "Code must be 1¬ 2 or 4".to_string(),
                ],
                index: Some(1),
                esu_index: Some(0),
            }],
        );
        entries.insert(RecordType::StreetNote, Vec::new());
        ValidationReport {
            aggregate_type: AggregateType::Street,
            entries,
        }
    }

    #[test]
    fn test_from_report_skips_empty_groups() {
        let list = ErrorList::from_report(&report());
        assert!(!list.is_empty());
        assert_eq!(list.count(), 3);
        assert_eq!(list.record_types(), vec![RecordType::Descriptor, RecordType::HighwayDedication]);
        assert!(list.entries(RecordType::StreetNote).is_empty());
    }

    #[test]
    fn test_jump_target_carries_esu_position() {
        let list = ErrorList::from_report(&report());
        let entry = &list.entries(RecordType::HighwayDedication)[0];
        let focus = list.jump_target(RecordType::HighwayDedication, entry);

        assert_eq!(focus.index, Some(1));
        assert_eq!(focus.esu_index, Some(0));
        assert_eq!(focus.field.as_deref(), Some("startDate"));
    }

    #[test]
    fn test_copy_text_format() {
        let list = ErrorList::from_report(&report());
        let at = Utc.with_ymd_and_hms(2026, 10, 19, 14, 5, 0).unwrap();
        let text = list.copy_text("High Street", at);

        let expected = "Street issues copied 19/10/2026 14:05:00\n\
High Street\n\
===========\n\
\n\
Descriptor\n\
----------\n\
description: Description is required\n\
\n\
Highway dedication\n\
------------------\n\
startDate: Start date must not be after the end date\n\
startDate: Code must be 1, 2 or 4\n";
        assert_eq!(text, expected);
    }

    #[test]
    fn test_copy_to_clipboard() {
        let list = ErrorList::from_report(&report());
        let mut clipboard = MemoryClipboard::default();
        list.copy_to(&mut clipboard, "High Street", Utc::now()).unwrap();
        assert!(clipboard.text.unwrap().contains("Descriptor\n----------"));
    }

    #[test]
    fn test_empty_list() {
        let list = ErrorList::empty(AggregateType::Property);
        assert!(list.is_empty());
        assert_eq!(list.count(), 0);
        let text = list.copy_text("UPRN 10", Utc::now());
        assert!(text.starts_with("Property issues copied"));
    }
}
