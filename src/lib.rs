//! beadwork - a dependency-aware issue tracker.
//!
//! The ground truth is a local SQLite database; the unit of exchange is a
//! git-friendly JSONL journal. The sync engine keeps the two reconciled:
//! hash-gated imports with collision-aware ID remapping in one direction,
//! debounced incremental flushes with atomic rewrites in the other.

pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod model;
pub mod storage;
pub mod sync;
pub mod util;

pub use error::{BeadworkError, Result};
