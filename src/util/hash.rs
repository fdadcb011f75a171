//! Journal content hashing.
//!
//! The hash gate compares SHA-256 over the raw journal bytes against the
//! `last_import_hash` metadata entry. File modification times are never
//! consulted; they are unreliable across git operations.

use crate::error::Result;
use sha2::{Digest, Sha256};
use std::path::Path;

/// SHA-256 of a byte slice, as lowercase hex.
#[must_use]
pub fn hash_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

/// SHA-256 of a file's raw contents, as lowercase hex.
///
/// # Errors
///
/// Returns an error if the file cannot be read.
pub fn hash_file(path: &Path) -> Result<String> {
    let data = std::fs::read(path)?;
    Ok(hash_bytes(&data))
}
