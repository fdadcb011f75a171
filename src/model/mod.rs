//! Core data types for `beadwork`.
//!
//! This module defines the fundamental types used throughout the crate:
//! - `Issue` - the tracked work item
//! - `Status` - issue lifecycle states
//! - `IssueType` - categories of issues
//! - `Dependency` - directed edges between issues
//! - `Event` - audit log entries

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Issue lifecycle status.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    #[default]
    Open,
    InProgress,
    Blocked,
    Closed,
    #[serde(untagged)]
    Custom(String),
}

impl Status {
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Open => "open",
            Self::InProgress => "in_progress",
            Self::Blocked => "blocked",
            Self::Closed => "closed",
            Self::Custom(value) => value,
        }
    }

    /// Whether this status requires `closed_at` to be set.
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Status {
    type Err = crate::error::BeadworkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "open" => Ok(Self::Open),
            "in_progress" | "inprogress" => Ok(Self::InProgress),
            "blocked" => Ok(Self::Blocked),
            "closed" => Ok(Self::Closed),
            other => Err(crate::error::BeadworkError::InvalidStatus {
                status: other.to_string(),
            }),
        }
    }
}

/// Issue priority (0=Critical, 4=Backlog).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Default)]
#[serde(transparent)]
pub struct Priority(pub i32);

impl Priority {
    pub const CRITICAL: Self = Self(0);
    pub const HIGH: Self = Self(1);
    pub const MEDIUM: Self = Self(2);
    pub const LOW: Self = Self(3);
    pub const BACKLOG: Self = Self(4);
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P{}", self.0)
    }
}

impl FromStr for Priority {
    type Err = crate::error::BeadworkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_uppercase();
        let val = s.strip_prefix('P').unwrap_or(&s);

        match val.parse::<i32>() {
            Ok(p) if (0..=4).contains(&p) => Ok(Self(p)),
            _ => Err(crate::error::BeadworkError::InvalidPriority {
                priority: val.parse().unwrap_or(-1),
            }),
        }
    }
}

/// Issue type category.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum IssueType {
    #[default]
    Task,
    Bug,
    Feature,
    Epic,
    Chore,
    #[serde(untagged)]
    Custom(String),
}

impl IssueType {
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Task => "task",
            Self::Bug => "bug",
            Self::Feature => "feature",
            Self::Epic => "epic",
            Self::Chore => "chore",
            Self::Custom(value) => value,
        }
    }
}

impl fmt::Display for IssueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for IssueType {
    type Err = crate::error::BeadworkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "task" => Ok(Self::Task),
            "bug" => Ok(Self::Bug),
            "feature" => Ok(Self::Feature),
            "epic" => Ok(Self::Epic),
            "chore" => Ok(Self::Chore),
            other => Err(crate::error::BeadworkError::InvalidType {
                issue_type: other.to_string(),
            }),
        }
    }
}

/// Dependency relationship kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DependencyType {
    Blocks,
    Related,
    ParentChild,
    DiscoveredFrom,
}

impl DependencyType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Blocks => "blocks",
            Self::Related => "related",
            Self::ParentChild => "parent-child",
            Self::DiscoveredFrom => "discovered-from",
        }
    }
}

impl fmt::Display for DependencyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for DependencyType {
    type Err = crate::error::BeadworkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "blocks" => Ok(Self::Blocks),
            "related" => Ok(Self::Related),
            "parent-child" => Ok(Self::ParentChild),
            "discovered-from" => Ok(Self::DiscoveredFrom),
            other => Err(crate::error::BeadworkError::validation(
                "dependency type",
                format!("unknown kind '{other}' (valid: blocks, related, parent-child, discovered-from)"),
            )),
        }
    }
}

/// Audit event type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventType {
    Created,
    Updated,
    StatusChanged,
    PriorityChanged,
    AssigneeChanged,
    Closed,
    DependencyAdded,
    LabelAdded,
    Deleted,
    Custom(String),
}

impl EventType {
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::StatusChanged => "status_changed",
            Self::PriorityChanged => "priority_changed",
            Self::AssigneeChanged => "assignee_changed",
            Self::Closed => "closed",
            Self::DependencyAdded => "dependency_added",
            Self::LabelAdded => "label_added",
            Self::Deleted => "deleted",
            Self::Custom(value) => value,
        }
    }
}

/// The primary issue entity.
///
/// Serialization of this struct is the journal line format: optional fields
/// are omitted when unset, timestamps are RFC-3339 UTC, and empty relation
/// lists are skipped so that re-serializing an unchanged set of issues is
/// byte-identical.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Issue {
    /// Unique ID of form `prefix-N` (e.g. "bd-42").
    pub id: String,

    /// Title (1-500 chars).
    pub title: String,

    /// Detailed description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Technical design notes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub design: Option<String>,

    /// Acceptance criteria.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acceptance_criteria: Option<String>,

    /// Additional notes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,

    /// Workflow status.
    #[serde(default)]
    pub status: Status,

    /// Priority (0=Critical, 4=Backlog).
    #[serde(default)]
    pub priority: Priority,

    /// Issue type (bug, feature, etc.).
    #[serde(default)]
    pub issue_type: IssueType,

    /// Assigned user.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee: Option<String>,

    /// Estimated effort in minutes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_minutes: Option<i32>,

    /// External reference (e.g., JIRA-123).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_ref: Option<String>,

    /// Creation timestamp.
    pub created_at: DateTime<Utc>,

    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,

    /// Closure timestamp. Set exactly when `status` is closed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closed_at: Option<DateTime<Utc>>,

    /// Reason for closure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub close_reason: Option<String>,

    // Compaction metadata (round-tripped, no compaction operation here)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compaction_level: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compacted_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_size: Option<i32>,

    // Relations, populated for journal export and display
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<Dependency>,
}

impl Default for Issue {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            id: String::new(),
            title: String::new(),
            description: None,
            design: None,
            acceptance_criteria: None,
            notes: None,
            status: Status::default(),
            priority: Priority::default(),
            issue_type: IssueType::default(),
            assignee: None,
            estimated_minutes: None,
            external_ref: None,
            created_at: now,
            updated_at: now,
            closed_at: None,
            close_reason: None,
            compaction_level: None,
            compacted_at: None,
            original_size: None,
            labels: Vec::new(),
            dependencies: Vec::new(),
        }
    }
}

impl Issue {
    /// Enforce the status/`closed_at` coupling.
    ///
    /// If the status is closed and `closed_at` is unset, it is filled from
    /// `updated_at` (the current time for freshly-built issues). If the
    /// status is anything else, `closed_at` is forced to null. Applied on
    /// every create, update, and import path so the round-trip
    /// write -> journal -> read -> write is idempotent.
    pub fn enforce_closed_invariant(&mut self) {
        if self.status.is_closed() {
            if self.closed_at.is_none() {
                self.closed_at = Some(self.updated_at);
            }
        } else {
            self.closed_at = None;
        }
    }
}

/// Directed edge between two issues.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Dependency {
    /// The issue that has the dependency (source).
    pub issue_id: String,

    /// The issue being depended on (target).
    pub depends_on_id: String,

    /// Kind of dependency.
    #[serde(rename = "type")]
    pub dep_type: DependencyType,

    /// Creation timestamp.
    pub created_at: DateTime<Utc>,

    /// Creator.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
}

/// An entry in the issue's audit log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub id: i64,
    pub issue_id: String,
    pub event_type: EventType,
    pub actor: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn test_issue() -> Issue {
        Issue {
            id: "bd-1".to_string(),
            title: "Test issue".to_string(),
            created_at: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
            updated_at: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
            ..Issue::default()
        }
    }

    #[test]
    fn status_roundtrip() {
        let status: Status = serde_json::from_str("\"in_progress\"").unwrap();
        assert_eq!(status, Status::InProgress);
        assert_eq!(serde_json::to_string(&status).unwrap(), "\"in_progress\"");
    }

    #[test]
    fn status_custom_roundtrip() {
        let status: Status = serde_json::from_str("\"triaged\"").unwrap();
        assert_eq!(status, Status::Custom("triaged".to_string()));
        assert_eq!(serde_json::to_string(&status).unwrap(), "\"triaged\"");
    }

    #[test]
    fn status_from_str_rejects_unknown() {
        assert!(Status::from_str("bogus").is_err());
        assert_eq!(Status::from_str("CLOSED").unwrap(), Status::Closed);
    }

    #[test]
    fn priority_from_str() {
        assert_eq!(Priority::from_str("P0").unwrap(), Priority::CRITICAL);
        assert_eq!(Priority::from_str("2").unwrap(), Priority::MEDIUM);
        assert!(Priority::from_str("5").is_err());
        assert!(Priority::from_str("-1").is_err());
        assert!(Priority::from_str("high").is_err());
    }

    #[test]
    fn dependency_type_parsing() {
        assert_eq!(
            DependencyType::from_str("parent-child").unwrap(),
            DependencyType::ParentChild
        );
        assert!(DependencyType::from_str("supersedes").is_err());
    }

    #[test]
    fn dependency_type_serialization() {
        let json = serde_json::to_string(&DependencyType::DiscoveredFrom).unwrap();
        assert_eq!(json, "\"discovered-from\"");
    }

    #[test]
    fn issue_deserialize_defaults_missing_fields() {
        let json = r#"{
            "id": "bd-3",
            "title": "Gamma",
            "created_at": "2026-01-01T00:00:00Z",
            "updated_at": "2026-01-01T00:00:00Z"
        }"#;
        let issue: Issue = serde_json::from_str(json).unwrap();
        assert_eq!(issue.status, Status::Open);
        assert_eq!(issue.priority, Priority(0));
        assert!(issue.description.is_none());
        assert!(issue.labels.is_empty());
        assert!(issue.dependencies.is_empty());
    }

    #[test]
    fn issue_serialization_skips_empty() {
        let issue = test_issue();
        let json = serde_json::to_string(&issue).unwrap();
        assert!(json.contains("\"id\":\"bd-1\""));
        assert!(json.contains("\"status\":\"open\""));
        assert!(!json.contains("closed_at"));
        assert!(!json.contains("labels"));
        assert!(!json.contains("dependencies"));
    }

    #[test]
    fn closed_invariant_fills_closed_at() {
        let mut issue = test_issue();
        issue.status = Status::Closed;
        issue.enforce_closed_invariant();
        assert_eq!(issue.closed_at, Some(issue.updated_at));
    }

    #[test]
    fn closed_invariant_keeps_existing_closed_at() {
        let mut issue = test_issue();
        let explicit = Utc.timestamp_opt(1_600_000_000, 0).unwrap();
        issue.status = Status::Closed;
        issue.closed_at = Some(explicit);
        issue.enforce_closed_invariant();
        assert_eq!(issue.closed_at, Some(explicit));
    }

    #[test]
    fn closed_invariant_clears_closed_at_when_open() {
        let mut issue = test_issue();
        issue.closed_at = Some(Utc::now());
        issue.status = Status::Open;
        issue.enforce_closed_invariant();
        assert!(issue.closed_at.is_none());
    }

    #[test]
    fn dependency_type_field_renamed() {
        let json = r#"{"issue_id":"bd-1","depends_on_id":"bd-2","type":"blocks","created_at":"2026-01-01T00:00:00Z"}"#;
        let dep: Dependency = serde_json::from_str(json).unwrap();
        assert_eq!(dep.dep_type, DependencyType::Blocks);
        let out = serde_json::to_string(&dep).unwrap();
        assert!(out.contains("\"type\":\"blocks\""));
    }
}
