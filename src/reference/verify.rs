//! Batch verification results and identifier matching.

use serde::{Deserialize, Serialize};

/// The store's answer to a verification request.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct VerificationOutcome {
    #[serde(default)]
    pub message: String,

    /// Identifiers the store considers non-reported or not found.
    ///
    /// Entries may carry a display suffix, e.g. `"A1 (Widget)"`.
    #[serde(rename = "nonReportedItems", default)]
    pub non_reported: Vec<String>,
}

impl VerificationOutcome {
    pub fn all_reported(&self) -> bool {
        self.non_reported.is_empty()
    }
}

/// True when an external identifier refers to `identifier`.
///
/// The store either echoes the identifier verbatim or appends a
/// parenthetical description (`"<id> (...)"`); both count as a match.
pub fn matches_external_identifier(identifier: &str, external: &str) -> bool {
    if identifier == external {
        return true;
    }
    external
        .strip_prefix(identifier)
        .is_some_and(|rest| rest.starts_with(" ("))
}

/// True when any entry of `non_reported` refers to `identifier`.
pub fn is_non_reported(identifier: &str, non_reported: &[String]) -> bool {
    non_reported
        .iter()
        .any(|external| matches_external_identifier(identifier, external))
}
