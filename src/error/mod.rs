//! Error types for `beadwork`.
//!
//! Structured variants for the cases the CLI and sync engine need to tell
//! apart, with `#[from]` conversions for the I/O, JSON, and database layers
//! and an `anyhow` passthrough for everything else.

use std::path::PathBuf;
use thiserror::Error;

/// Primary error type for `beadwork` operations.
#[derive(Error, Debug)]
pub enum BeadworkError {
    // === Storage errors ===
    /// `SQLite` database error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    // === Issue errors ===
    /// Issue with the specified ID was not found.
    #[error("Issue not found: {id}")]
    IssueNotFound { id: String },

    /// Attempted to create an issue with an ID that already exists.
    #[error("Issue ID collision: {id}")]
    IdCollision { id: String },

    /// Issue ID format is invalid (expected `prefix-N`).
    #[error("Invalid issue ID format: {id} (expected prefix-number, e.g. 'bd-42')")]
    InvalidId { id: String },

    // === Validation errors ===
    /// Field validation failed.
    #[error("Validation failed: {field}: {reason}")]
    Validation { field: String, reason: String },

    /// Invalid status value.
    #[error("Invalid status: {status}")]
    InvalidStatus { status: String },

    /// Invalid issue type value.
    #[error("Invalid issue type: {issue_type}")]
    InvalidType { issue_type: String },

    /// Priority out of valid range (0-4).
    #[error("Priority must be 0-4, got: {priority}")]
    InvalidPriority { priority: i32 },

    /// Unknown field name in an update request.
    #[error("Unknown update field: {field}")]
    UnknownField { field: String },

    // === Journal errors ===
    /// Failed to parse a line in the journal file.
    #[error("Journal parse error at line {line}: {reason}\nSnippet: {snippet}")]
    JournalParse {
        line: usize,
        reason: String,
        snippet: String,
    },

    /// Journal contains unresolved git merge conflict markers.
    #[error(
        "Git merge conflict detected in {path} at line {line}.\n\
         The journal contains unresolved merge conflict markers.\n\
         Resolve the conflict in your git client, or regenerate the journal:\n\
         bd export -o {path}"
    )]
    ConflictMarkers { path: PathBuf, line: usize },

    // === Dependency errors ===
    /// Dependency target (or source) not found.
    #[error("Dependency target not found: {id}")]
    DependencyNotFound { id: String },

    /// Duplicate dependency triple.
    #[error("Dependency already exists: {from} -> {to} ({kind})")]
    DuplicateDependency {
        from: String,
        to: String,
        kind: String,
    },

    /// Self-referential dependency.
    #[error("Issue cannot depend on itself: {id}")]
    SelfDependency { id: String },

    // === Configuration errors ===
    /// Configuration or workspace error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Workspace not initialized.
    #[error("Beads workspace not initialized: run 'bd init' first")]
    NotInitialized,

    /// Already initialized.
    #[error("Already initialized at '{path}'")]
    AlreadyInitialized { path: PathBuf },

    // === I/O errors ===
    /// File system I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML parsing error.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Wrapped anyhow error.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl BeadworkError {
    /// Can the user fix this without code changes?
    #[must_use]
    pub const fn is_user_recoverable(&self) -> bool {
        matches!(
            self,
            Self::NotInitialized
                | Self::IssueNotFound { .. }
                | Self::InvalidId { .. }
                | Self::Validation { .. }
                | Self::InvalidStatus { .. }
                | Self::InvalidType { .. }
                | Self::InvalidPriority { .. }
                | Self::UnknownField { .. }
                | Self::ConflictMarkers { .. }
        )
    }

    /// Human-friendly suggestion for fixing this error.
    #[must_use]
    pub const fn suggestion(&self) -> Option<&'static str> {
        match self {
            Self::NotInitialized => Some("Run: bd init"),
            Self::InvalidId { .. } => Some("IDs look like 'bd-42': a prefix, a dash, a number"),
            Self::InvalidPriority { .. } => {
                Some("Use a priority between 0 (critical) and 4 (backlog)")
            }
            Self::InvalidStatus { .. } => {
                Some("Valid statuses: open, in_progress, blocked, closed")
            }
            Self::InvalidType { .. } => Some("Valid types: bug, feature, task, epic, chore"),
            Self::SelfDependency { .. } => Some("An issue cannot depend on itself"),
            Self::ConflictMarkers { .. } => {
                Some("Resolve the git merge conflict, then re-run the command")
            }
            _ => None,
        }
    }

    /// Exit code for this error. The CLI uses 1 for all command failures.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        1
    }

    /// Create a validation error for a specific field.
    #[must_use]
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Result type using `BeadworkError`.
pub type Result<T> = std::result::Result<T, BeadworkError>;
