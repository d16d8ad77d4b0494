//! Qualified-name splitting for right-to-left delegation.

use crate::directory::proto::DirectoryError;

/// Splits a fully qualified name into its top-level label and the
/// remaining prefix: `pat.vienna.at` yields `(Some("pat.vienna"), "at")`,
/// a single label has no remainder. One trailing dot is tolerated
/// because forwarded prefixes travel dot-terminated between nodes;
/// empty labels are invalid.
pub fn split_qualified(name: &str) -> Result<(Option<&str>, &str), DirectoryError> {
    let trimmed = name.strip_suffix('.').unwrap_or(name);
    if trimmed.is_empty() || trimmed.split('.').any(str::is_empty) {
        return Err(DirectoryError::InvalidDomain(name.to_string()));
    }

    Ok(match trimmed.rsplit_once('.') {
        Some((remainder, top)) => (Some(remainder), top),
        None => (None, trimmed),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_label_has_no_remainder() {
        assert_eq!(split_qualified("at"), Ok((None, "at")));
    }

    #[test]
    fn qualified_name_splits_right_to_left() {
        assert_eq!(split_qualified("vienna.at"), Ok((Some("vienna"), "at")));
        assert_eq!(
            split_qualified("pat.vienna.at"),
            Ok((Some("pat.vienna"), "at"))
        );
    }

    #[test]
    fn trailing_dot_is_tolerated() {
        assert_eq!(split_qualified("pat.vienna."), Ok((Some("pat"), "vienna")));
        assert_eq!(split_qualified("at."), Ok((None, "at")));
    }

    #[test]
    fn empty_labels_are_invalid() {
        assert!(split_qualified("").is_err());
        assert!(split_qualified(".").is_err());
        assert!(split_qualified("a..b").is_err());
        assert!(split_qualified(".at").is_err());
    }
}
