//! Scanning-session state and object-class colors.

use std::collections::{HashMap, HashSet};

use crate::reference::VerificationOutcome;

/// State accumulated across the frames of one scanning session.
///
/// Cleared when a session starts. Kept after a stop so the identifiers
/// can still be submitted or verified.
#[derive(Clone, Debug, Default)]
pub struct SessionState {
    seen: HashSet<String>,
    order: Vec<String>,
    text: Vec<String>,
    last_verification: Option<VerificationOutcome>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a sighting. Returns true on the first sighting of `identifier`.
    pub fn observe(&mut self, identifier: &str) -> bool {
        if self.seen.contains(identifier) {
            return false;
        }
        self.seen.insert(identifier.to_string());
        self.order.push(identifier.to_string());
        true
    }

    pub fn has_seen(&self, identifier: &str) -> bool {
        self.seen.contains(identifier)
    }

    /// Identifiers in first-sighting order.
    pub fn seen_identifiers(&self) -> &[String] {
        &self.order
    }

    /// Replaces the text buffer. Empty input leaves it untouched.
    ///
    /// Returns whether the buffer changed.
    pub fn replace_text(&mut self, fragments: Vec<String>) -> bool {
        if fragments.is_empty() {
            return false;
        }
        self.text = fragments;
        true
    }

    pub fn text_fragments(&self) -> &[String] {
        &self.text
    }

    /// The buffer as one lower-cased, space-joined string.
    pub fn session_text(&self) -> String {
        self.text.join(" ").to_lowercase()
    }

    /// Case-insensitive substring search over the whole buffer.
    pub fn text_contains(&self, phrase: &str) -> bool {
        let phrase = phrase.trim().to_lowercase();
        !phrase.is_empty() && self.session_text().contains(&phrase)
    }

    pub fn last_verification(&self) -> Option<&VerificationOutcome> {
        self.last_verification.as_ref()
    }

    pub fn set_last_verification(&mut self, outcome: VerificationOutcome) {
        self.last_verification = Some(outcome);
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

const PALETTE: &[&str] = &[
    "#FF6347", "#4682B4", "#32CD32", "#FFD700", "#6A5ACD", "#FF4500", "#20B2AA", "#9370DB",
    "#00FA9A", "#DA70D6", "#FF7F50", "#87CEEB", "#ADFF2F", "#FFA07A", "#BA55D3",
];

/// Stable object-class to color mapping.
///
/// Keys are lower-cased class names; colors are handed out round-robin
/// from a fixed palette. Entries are never evicted.
#[derive(Clone, Debug, Default)]
pub struct ColorAssignment {
    colors: HashMap<String, &'static str>,
    next: usize,
}

impl ColorAssignment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn color_for(&mut self, class_name: &str) -> &'static str {
        let key = class_name.to_lowercase();
        if let Some(color) = self.colors.get(&key) {
            return *color;
        }
        let color = PALETTE[self.next % PALETTE.len()];
        self.next += 1;
        self.colors.insert(key, color);
        color
    }

    pub fn len(&self) -> usize {
        self.colors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }
}
