//! `ETag` / `If-Match` precondition handling.
//!
//! The expected version travels either as an `If-Match` header (`"3"` or
//! `W/"3"`) or as an `expectedVersion` body field; the header wins when both
//! are present.

use crate::error::InventoryError;

/// Renders a record version as a strong entity tag.
pub fn etag(version: u64) -> String {
    format!("\"{version}\"")
}

/// Parses an `If-Match` value of the form `"<n>"` or `W/"<n>"` where `n` is a
/// positive integer.
pub fn parse_if_match(value: &str) -> Result<u64, InventoryError> {
    let trimmed = value.trim();
    let unprefixed = trimmed.strip_prefix("W/").unwrap_or(trimmed);
    let quoted = unprefixed
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
        .ok_or_else(|| InventoryError::InvalidIfMatch {
            value: value.to_string(),
        })?;
    let version: u64 = quoted
        .parse()
        .map_err(|_| InventoryError::InvalidIfMatch {
            value: value.to_string(),
        })?;
    if version == 0 {
        return Err(InventoryError::InvalidIfMatch {
            value: value.to_string(),
        });
    }
    Ok(version)
}

/// Resolves the effective expected version from the header and body sources.
pub fn resolve_expected_version(
    if_match: Option<&str>,
    body_expected: Option<u64>,
) -> Result<Option<u64>, InventoryError> {
    match if_match {
        Some(raw) => parse_if_match(raw).map(Some),
        None => match body_expected {
            Some(0) => Err(InventoryError::validation(
                "expectedVersion must be a positive integer",
            )),
            other => Ok(other),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_strong_and_weak_tags() {
        assert_eq!(parse_if_match("\"3\"").unwrap(), 3);
        assert_eq!(parse_if_match("W/\"12\"").unwrap(), 12);
        assert_eq!(parse_if_match("  \"7\" ").unwrap(), 7);
    }

    #[test]
    fn rejects_malformed_tags() {
        for raw in ["3", "\"\"", "\"abc\"", "W/3", "\"0\"", "\"-1\"", "W/\"1.5\""] {
            let err = parse_if_match(raw).unwrap_err();
            assert_eq!(err.code(), "INVALID_IF_MATCH", "input {raw:?}");
        }
    }

    #[test]
    fn header_wins_over_body() {
        let resolved = resolve_expected_version(Some("W/\"3\""), Some(5)).unwrap();
        assert_eq!(resolved, Some(3));
    }

    #[test]
    fn body_used_when_header_absent() {
        assert_eq!(resolve_expected_version(None, Some(5)).unwrap(), Some(5));
        assert_eq!(resolve_expected_version(None, None).unwrap(), None);
        assert!(resolve_expected_version(None, Some(0)).is_err());
    }

    #[test]
    fn etag_round_trips() {
        assert_eq!(parse_if_match(&etag(42)).unwrap(), 42);
    }
}
