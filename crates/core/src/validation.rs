//! Input validation utilities.
//!
//! Checks applied to user input before it reaches an operation.

use crate::{BidsError, BidsResult};

const MAX_SUBJECT_FILTER_LEN: usize = 64;

/// Validates that a subject filter is a plain fragment of a directory name.
///
/// The filter is matched as a substring against top-level directory names, so it can be
/// empty (matches everything). It must not contain path separators or control characters,
/// and its length is bounded.
///
/// # Arguments
///
/// * `filter` - The substring supplied with `-p`.
///
/// # Errors
///
/// Returns a `BidsError::InvalidInput` if the filter is invalid.
pub fn validate_subject_filter(filter: &str) -> BidsResult<()> {
    if filter.len() > MAX_SUBJECT_FILTER_LEN {
        return Err(BidsError::InvalidInput(format!(
            "subject filter exceeds maximum length of {} characters",
            MAX_SUBJECT_FILTER_LEN
        )));
    }

    if filter.contains(['/', '\\']) {
        return Err(BidsError::InvalidInput(
            "subject filter must not contain path separators".into(),
        ));
    }

    if filter.chars().any(char::is_control) {
        return Err(BidsError::InvalidInput(
            "subject filter must not contain control characters".into(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_filters_pass() {
        for filter in ["", "0", "SUBJ", "pilot_0"] {
            assert!(validate_subject_filter(filter).is_ok(), "{filter}");
        }
    }

    #[test]
    fn test_separators_rejected() {
        assert!(validate_subject_filter("a/b").is_err());
        assert!(validate_subject_filter("a\\b").is_err());
    }

    #[test]
    fn test_control_characters_rejected() {
        assert!(validate_subject_filter("a\nb").is_err());
    }

    #[test]
    fn test_overlong_filter_rejected() {
        let long = "x".repeat(MAX_SUBJECT_FILTER_LEN + 1);
        assert!(matches!(
            validate_subject_filter(&long),
            Err(BidsError::InvalidInput(_))
        ));
    }
}
