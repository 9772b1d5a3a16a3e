//! Syntactic image payload validation
//!
//! Cheap front-door check before any engine work is scheduled. A payload is
//! either a data-URI with an image subtype or a bare base64 string. No pixel
//! decoding happens here; format corruption inside the encoded bytes is the
//! recognizer's problem and surfaces later as a recognition error.

use once_cell::sync::Lazy;
use regex::Regex;

/// Matches a `data:image/<subtype>;base64,` prefix (case-insensitive)
static DATA_URI_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^data:image/[a-z]+;base64,").expect("valid regex"));

/// Matches a bare base64 payload: full 4-character groups plus valid padding
static BARE_BASE64: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([A-Za-z0-9+/]{4})*([A-Za-z0-9+/]{3}=|[A-Za-z0-9+/]{2}==)?$")
        .expect("valid regex")
});

/// Check whether a submitted payload looks like an image encoding.
///
/// Pure predicate: accepts a data-URI image prefix or a string that is
/// entirely valid base64. Rejects the empty string.
pub fn is_valid_image_data(payload: &str) -> bool {
    if payload.is_empty() {
        return false;
    }
    DATA_URI_PREFIX.is_match(payload) || BARE_BASE64.is_match(payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_uri_accepted() {
        assert!(is_valid_image_data("data:image/png;base64,iVBORw0KGgo="));
        assert!(is_valid_image_data("data:image/jpeg;base64,/9j/4AAQ"));
    }

    #[test]
    fn test_data_uri_case_insensitive() {
        assert!(is_valid_image_data("DATA:IMAGE/PNG;BASE64,iVBORw0KGgo="));
    }

    #[test]
    fn test_bare_base64_accepted() {
        assert!(is_valid_image_data("iVBORw0KGgoAAAANSUhEUg=="));
        assert!(is_valid_image_data("QUJDRA=="));
        assert!(is_valid_image_data("QUJDRGVm"));
    }

    #[test]
    fn test_bad_padding_rejected() {
        // Group of one or two characters with no valid padding
        assert!(!is_valid_image_data("QUJDRGV"));
        assert!(!is_valid_image_data("QUJDR===="));
    }

    #[test]
    fn test_empty_rejected() {
        assert!(!is_valid_image_data(""));
    }

    #[test]
    fn test_non_base64_rejected() {
        assert!(!is_valid_image_data("hello world!"));
        assert!(!is_valid_image_data("data:text/plain;base64,aGVsbG8="));
        assert!(!is_valid_image_data("{\"not\": \"an image\"}"));
    }
}
