//! Shared utilities.

pub mod hash;
pub mod id;

pub use hash::{hash_bytes, hash_file};
pub use id::{next_available_id, parse_id, split_id};
