//! Field extraction from raw OCR text
//!
//! Lexical heuristics only, no layout awareness. Three independent rules run
//! against the full text and each field falls back to the empty string when
//! its rule finds nothing. The anchors and case sensitivity of these patterns
//! are the behavioral contract for the parser; change them and downstream
//! classification changes with them.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Line-anchored run of capitalized words, optionally ending in an
/// all-uppercase token (suffix or initials)
static NAME_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^[A-Z][a-z]+(?: [A-Z][a-z]+)*(?: [A-Z]+)?").expect("valid regex"));

/// `Branch:` label (case-insensitive) followed by a run of letters and spaces
static BRANCH_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)Branch:\s*([A-Za-z ]+)").expect("valid regex"));

/// `ID:` label (case-insensitive) followed by an alphanumeric token
static ID_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)ID:\s*(\w+)").expect("valid regex"));

/// Structured fields parsed from one ID card scan.
///
/// Each field is independently optional; an empty string means the rule for
/// that field found nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedFields {
    /// Card holder name
    pub name: String,
    /// Organizational branch
    pub branch: String,
    /// Student identifier
    #[serde(rename = "studentId")]
    pub student_id: String,
}

impl ExtractedFields {
    /// True when no rule matched anything
    pub fn is_empty(&self) -> bool {
        self.name.is_empty() && self.branch.is_empty() && self.student_id.is_empty()
    }
}

/// Parse free-form OCR text into structured fields.
///
/// Pure and total: absence is an empty string, never an error. First match
/// wins per field; the three searches are independent of each other.
pub fn extract(text: &str) -> ExtractedFields {
    let name = NAME_PATTERN
        .find(text)
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_default();

    let branch = BRANCH_PATTERN
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_default();

    let student_id = ID_PATTERN
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_default();

    ExtractedFields {
        name,
        branch,
        student_id,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_full_card() {
        let fields = extract("Jane Doe\nBranch: Computer Science\nID: CS1234");
        assert_eq!(fields.name, "Jane Doe");
        assert_eq!(fields.branch, "Computer Science");
        assert_eq!(fields.student_id, "CS1234");
    }

    #[test]
    fn test_extract_no_labels() {
        let fields = extract("random noise with no labels");
        assert_eq!(fields.name, "");
        assert_eq!(fields.branch, "");
        assert_eq!(fields.student_id, "");
        assert!(fields.is_empty());
    }

    #[test]
    fn test_extract_case_insensitive_labels() {
        let fields = extract("BRANCH: ee\nid: 99xy");
        assert_eq!(fields.branch, "ee");
        assert_eq!(fields.student_id, "99xy");
    }

    #[test]
    fn test_name_not_on_first_line() {
        // Multiline anchor: the name may start any line, not just the first
        let fields = extract("UNIVERSITY OF EXAMPLE\nJohn Smith\nID: 42A");
        assert_eq!(fields.name, "John Smith");
        assert_eq!(fields.student_id, "42A");
    }

    #[test]
    fn test_name_with_uppercase_suffix() {
        let fields = extract("Mary Jane III\nBranch: Physics");
        assert_eq!(fields.name, "Mary Jane III");
    }

    #[test]
    fn test_name_must_anchor_line_start() {
        // Mid-line capitalized words do not count as a name
        let fields = extract("card of Jane Doe");
        assert_eq!(fields.name, "");
    }

    #[test]
    fn test_branch_stops_at_line_end() {
        let fields = extract("Branch: Electrical Engineering\nID: EE77");
        assert_eq!(fields.branch, "Electrical Engineering");
    }

    #[test]
    fn test_branch_trimmed() {
        let fields = extract("Branch:   Mechanical  \nsomething");
        assert_eq!(fields.branch, "Mechanical");
    }

    #[test]
    fn test_partial_fields() {
        let fields = extract("ID: X9\nsome other noise");
        assert_eq!(fields.student_id, "X9");
        assert_eq!(fields.name, "");
        assert_eq!(fields.branch, "");
        assert!(!fields.is_empty());
    }

    #[test]
    fn test_serde_wire_shape() {
        let fields = extract("Jane Doe\nBranch: Computer Science\nID: CS1234");
        let json = serde_json::to_value(&fields).unwrap();
        assert_eq!(json["studentId"], "CS1234");
        assert_eq!(json["name"], "Jane Doe");
        assert_eq!(json["branch"], "Computer Science");
    }
}
