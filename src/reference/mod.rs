//! Reference table lookups and classification.
//!
//! The reference table is a snapshot of the store's inventory sheet. It is
//! read on every sighting, so a refresh between frames is picked up the
//! next time an identifier is seen.

mod store;
mod verify;

pub use store::{HttpReferenceStore, ReferenceStore};
pub use verify::{is_non_reported, matches_external_identifier, VerificationOutcome};

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::ScanfuseError;

/// Token that marks an entry as reported, compared case-insensitively.
pub const DEFAULT_CONFIRMED_TOKEN: &str = "yes";

/// One row of the reference table.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReferenceEntry {
    #[serde(rename = "ItemID", deserialize_with = "loose_string")]
    pub identifier: String,

    #[serde(
        rename = "Name",
        default,
        deserialize_with = "loose_optional_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub display_name: Option<String>,

    #[serde(
        rename = "Batch",
        default,
        deserialize_with = "loose_optional_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub batch: Option<String>,

    #[serde(
        rename = "Reported",
        default,
        deserialize_with = "loose_optional_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub reported: Option<String>,
}

impl ReferenceEntry {
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            display_name: None,
            batch: None,
            reported: None,
        }
    }

    pub fn with_reported(mut self, flag: impl Into<String>) -> Self {
        self.reported = Some(flag.into());
        self
    }
}

/// How a detected identifier relates to the reference table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    /// Present and flagged as reported.
    Confirmed,
    /// Present without the reported flag.
    KnownUnconfirmed,
    /// Not in the table.
    Unknown,
}

impl std::fmt::Display for Classification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Classification::Confirmed => "confirmed",
            Classification::KnownUnconfirmed => "known_unconfirmed",
            Classification::Unknown => "unknown",
        };
        f.write_str(label)
    }
}

/// A snapshot of the reference table plus the token that confirms an entry.
#[derive(Clone, Debug)]
pub struct ReferenceTable {
    entries: Vec<ReferenceEntry>,
    confirmed_token: String,
}

impl Default for ReferenceTable {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl ReferenceTable {
    pub fn new(entries: Vec<ReferenceEntry>) -> Self {
        Self::with_token(entries, DEFAULT_CONFIRMED_TOKEN)
    }

    pub fn with_token(entries: Vec<ReferenceEntry>, confirmed_token: impl Into<String>) -> Self {
        Self {
            entries,
            confirmed_token: confirmed_token.into(),
        }
    }

    /// Loads a table from a JSON file shaped like the store's inventory
    /// response.
    pub fn from_json_file(path: &Path, confirmed_token: &str) -> Result<Self, ScanfuseError> {
        let file = File::open(path).map_err(ScanfuseError::Io)?;
        let entries: Vec<ReferenceEntry> = serde_json::from_reader(BufReader::new(file))
            .map_err(|source| ScanfuseError::ReferenceParse {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(Self::with_token(entries, confirmed_token))
    }

    /// Swaps in a fresh snapshot, keeping the confirmation token.
    pub fn replace(&mut self, entries: Vec<ReferenceEntry>) {
        self.entries = entries;
    }

    pub fn entries(&self) -> &[ReferenceEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// First entry whose identifier equals `identifier` exactly.
    pub fn lookup(&self, identifier: &str) -> Option<&ReferenceEntry> {
        self.entries.iter().find(|e| e.identifier == identifier)
    }

    pub fn classify(&self, identifier: &str) -> Classification {
        match self.lookup(identifier) {
            Some(entry) if self.is_confirmed(entry) => Classification::Confirmed,
            Some(_) => Classification::KnownUnconfirmed,
            None => Classification::Unknown,
        }
    }

    fn is_confirmed(&self, entry: &ReferenceEntry) -> bool {
        entry
            .reported
            .as_deref()
            .is_some_and(|flag| flag.trim().eq_ignore_ascii_case(&self.confirmed_token))
    }
}

/// Spreadsheet cells come through as strings, numbers or booleans.
fn loose_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    let value = serde_json::Value::deserialize(deserializer)?;
    cell_to_string(value).ok_or_else(|| serde::de::Error::custom("expected a scalar cell"))
}

fn loose_optional_string<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<String>, D::Error> {
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(cell_to_string(value))
}

fn cell_to_string(value: serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s),
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> ReferenceTable {
        ReferenceTable::new(vec![
            ReferenceEntry::new("A1").with_reported("yes"),
            ReferenceEntry::new("B2").with_reported("YES"),
            ReferenceEntry::new("C3").with_reported("no"),
            ReferenceEntry::new("D4"),
        ])
    }

    #[test]
    fn test_flag_is_case_insensitive() {
        assert_eq!(table().classify("A1"), Classification::Confirmed);
        assert_eq!(table().classify("B2"), Classification::Confirmed);
    }

    #[test]
    fn test_present_without_flag_is_known_unconfirmed() {
        assert_eq!(table().classify("C3"), Classification::KnownUnconfirmed);
        assert_eq!(table().classify("D4"), Classification::KnownUnconfirmed);
    }

    #[test]
    fn test_absent_is_unknown() {
        assert_eq!(table().classify("Z9"), Classification::Unknown);
        assert_eq!(ReferenceTable::default().classify("A1"), Classification::Unknown);
    }

    #[test]
    fn test_match_is_exact() {
        assert_eq!(table().classify("a1"), Classification::Unknown);
        assert_eq!(table().classify("A1 "), Classification::Unknown);
    }

    #[test]
    fn test_replace_changes_classification() {
        let mut t = table();
        assert_eq!(t.classify("C3"), Classification::KnownUnconfirmed);
        t.replace(vec![ReferenceEntry::new("C3").with_reported("Yes")]);
        assert_eq!(t.classify("C3"), Classification::Confirmed);
        assert_eq!(t.classify("A1"), Classification::Unknown);
    }

    #[test]
    fn test_custom_token() {
        let t = ReferenceTable::with_token(
            vec![ReferenceEntry::new("A1").with_reported("Reported")],
            "reported",
        );
        assert_eq!(t.classify("A1"), Classification::Confirmed);
    }

    #[test]
    fn test_deserializes_sheet_rows() {
        let json = r#"[
            {"ItemID": "A1", "Name": "Widget", "Batch": 42, "Reported": "Yes"},
            {"ItemID": 5012345678900, "Reported": true},
            {"ItemID": "C3", "Name": null}
        ]"#;
        let entries: Vec<ReferenceEntry> = serde_json::from_str(json).unwrap();
        assert_eq!(entries[0].batch.as_deref(), Some("42"));
        assert_eq!(entries[1].identifier, "5012345678900");
        assert_eq!(entries[1].reported.as_deref(), Some("true"));
        assert_eq!(entries[2].display_name, None);
    }
}
