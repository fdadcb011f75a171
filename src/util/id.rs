//! Issue ID parsing and allocation.
//!
//! IDs have the form `<prefix>-<N>` where the prefix is a short ASCII tag
//! and N is a positive integer. Allocation for a prefix always picks the
//! smallest positive integer not currently in use, so IDs stay short and
//! freshly allocated IDs never collide with the set they were checked
//! against.

use crate::error::{BeadworkError, Result};
use std::collections::HashSet;

/// Validate an explicit ID and return it unchanged.
///
/// # Errors
///
/// Returns `InvalidId` if the ID is not of the form `prefix-N` with a
/// positive numeric suffix.
pub fn parse_id(id: &str) -> Result<&str> {
    split_id(id)?;
    Ok(id)
}

/// Split an ID into its prefix and numeric suffix.
///
/// The prefix may itself contain dashes; the suffix is everything after the
/// last dash.
///
/// # Errors
///
/// Returns `InvalidId` if there is no dash, the prefix is empty, or the
/// suffix is not a positive integer.
pub fn split_id(id: &str) -> Result<(&str, u64)> {
    let invalid = || BeadworkError::InvalidId { id: id.to_string() };

    let (prefix, number) = id.rsplit_once('-').ok_or_else(invalid)?;
    if prefix.is_empty() || !prefix.is_ascii() {
        return Err(invalid());
    }
    let n: u64 = number.parse().map_err(|_| invalid())?;
    if n == 0 || number.starts_with('+') {
        return Err(invalid());
    }
    Ok((prefix, n))
}

/// Allocate the smallest unused ID for a prefix.
///
/// `in_use` holds every ID that must not be reissued: the store's current
/// IDs, plus any IDs present in a journal being imported and any IDs
/// allocated earlier in the same run.
#[must_use]
pub fn next_available_id(prefix: &str, in_use: &HashSet<String>) -> String {
    let mut n: u64 = 1;
    loop {
        let candidate = format!("{prefix}-{n}");
        if !in_use.contains(&candidate) {
            return candidate;
        }
        n += 1;
    }
}
