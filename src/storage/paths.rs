use anyhow::{bail, Result};
use unicode_normalization::UnicodeNormalization;

/// Normalize a UTF-8 string to NFC.
pub fn normalize_nfc(input: &str) -> String {
    input.nfc().collect::<String>()
}

/// Validate an object key:
/// - NUL ("\u{0000}") not allowed
/// - '/' only used as separator; no leading/trailing '/' and no '//' sequences
/// - no '.' or '..' segments
pub fn validate_object_key(key: &str) -> Result<()> {
    if key.is_empty() {
        bail!("object key cannot be empty");
    }
    if key.chars().any(|c| c == '\u{0000}') {
        bail!("object key cannot contain NUL characters");
    }
    if key.starts_with('/') || key.ends_with('/') {
        bail!("leading or trailing '/' is not allowed in object keys");
    }
    for seg in key.split('/') {
        if seg.is_empty() {
            bail!("empty segments ('//') are not allowed in object keys");
        }
        if seg == "." || seg == ".." {
            bail!("segments '.' and '..' are not allowed");
        }
    }
    Ok(())
}

/// Extension after the final '.', if the key has one.
pub fn key_extension(key: &str) -> Option<&str> {
    key.rsplit_once('.').map(|(_, ext)| ext)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_nfc_basic() {
        let s = "Cafe\u{0301}";
        assert_eq!(normalize_nfc(s), "Caf\u{e9}");
    }

    #[test]
    fn test_invalid_keys() {
        assert!(validate_object_key("").is_err());
        assert!(validate_object_key("/leading").is_err());
        assert!(validate_object_key("trailing/").is_err());
        assert!(validate_object_key("double//slash").is_err());
        assert!(validate_object_key("a/./b").is_err());
        assert!(validate_object_key("a/../b").is_err());
        assert!(validate_object_key("a\u{0000}b").is_err());
        validate_object_key("reports/2024/q1.pdf").unwrap();
    }

    #[test]
    fn test_key_extension() {
        assert_eq!(key_extension("a/b/report.final.pdf"), Some("pdf"));
        assert_eq!(key_extension("Makefile"), None);
        assert_eq!(key_extension("trailing."), Some(""));
    }
}
