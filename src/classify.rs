use regex::Regex;
use std::sync::OnceLock;

use crate::record::UNKNOWN_TAG;

/// Class and batch recognised from a sheet name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SheetClass {
    Matched { class_name: String, batch: String },
    Unmatched,
}

impl SheetClass {
    /// `(class, batch)` tags to store; unmatched sheets are tagged "Unknown".
    pub fn tags(&self) -> (&str, &str) {
        match self {
            SheetClass::Matched { class_name, batch } => (class_name.as_str(), batch.as_str()),
            SheetClass::Unmatched => (UNKNOWN_TAG, UNKNOWN_TAG),
        }
    }
}

fn sheet_tag_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)([0-9]+)\s*([a-d])").ok())
        .as_ref()
}

/// Finds the first "<digits><optional space><A-D>" run in a sheet name,
/// e.g. "Batch-9B" or "Class 10 c". The digit run is kept verbatim.
pub fn classify_sheet_name(name: &str) -> SheetClass {
    let Some(caps) = sheet_tag_regex().and_then(|re| re.captures(name)) else {
        return SheetClass::Unmatched;
    };
    match (caps.get(1), caps.get(2)) {
        (Some(class_name), Some(batch)) => SheetClass::Matched {
            class_name: class_name.as_str().to_string(),
            batch: batch.as_str().to_ascii_uppercase(),
        },
        _ => SheetClass::Unmatched,
    }
}
