//! Identifier and path validation for the serving route.
//!
//! Every check here runs before any store lookup, network fetch, or cache
//! access. The functions are pure predicates over strings.
//!
//! # Rules
//!
//! - Identifiers are non-empty and consist of `[A-Za-z0-9_-]` only
//! - Requested paths never contain a `..` segment
//! - Requested paths never start with a path separator

use crate::error::{Error, Result};

/// Check that a prototyper or prototype identifier is safe to use as a key
/// and as a URL path segment.
pub fn validate_identifier(id: &str) -> Result<()> {
    let valid = !id.is_empty()
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');

    if valid {
        Ok(())
    } else {
        Err(Error::InvalidIdentifier(id.to_string()))
    }
}

/// Check a requested sub-path (the segments after the prototype ID, already
/// joined with `/`).
///
/// Backslashes count as separators so `..\\secret` is caught as well.
pub fn validate_path(path: &str) -> Result<()> {
    if path.starts_with('/') || path.starts_with('\\') {
        return Err(Error::InvalidPath(path.to_string()));
    }

    if path.contains('\0') || path.split(['/', '\\']).any(|segment| segment == "..") {
        return Err(Error::InvalidPath(path.to_string()));
    }

    Ok(())
}

/// Validate a full serving request: both identifiers, then the sub-path.
pub fn validate_request(prototyper_id: &str, prototype_id: &str, path: &str) -> Result<()> {
    validate_identifier(prototyper_id)?;
    validate_identifier(prototype_id)?;
    validate_path(path)
}

/// Build the serving base path for one artifact, e.g. `/serve/alice/p1`.
///
/// `prefix` is the route prefix without a trailing slash.
pub fn serving_base(prefix: &str, prototyper_id: &str, prototype_id: &str) -> String {
    format!("{prefix}/{prototyper_id}/{prototype_id}")
}
