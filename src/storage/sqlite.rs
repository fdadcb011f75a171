//! `SQLite` storage implementation.
//!
//! Every mutating operation runs the same protocol: open one immediate
//! transaction, apply the change, write the audit events recorded by the
//! mutation context, mark the touched issues dirty, commit. A failed
//! transaction leaves the primary rows and the dirty set unchanged.

use crate::error::{BeadworkError, Result};
use crate::model::{Dependency, DependencyType, Event, EventType, Issue, IssueType, Priority, Status};
use crate::storage::schema::apply_schema;
use crate::util::id::{next_available_id, parse_id, split_id};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Transaction};
use std::collections::{HashMap, HashSet};
use std::fmt::Write as _;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// SQLite-based storage backend.
#[derive(Debug)]
pub struct SqliteStorage {
    conn: Connection,
}

/// Context for a mutation operation, tracking side effects.
pub struct MutationContext {
    pub actor: String,
    pub events: Vec<Event>,
    pub dirty_ids: HashSet<String>,
}

impl MutationContext {
    #[must_use]
    pub fn new(actor: &str) -> Self {
        Self {
            actor: actor.to_string(),
            events: Vec::new(),
            dirty_ids: HashSet::new(),
        }
    }

    pub fn record_event(&mut self, event_type: EventType, issue_id: &str, details: Option<String>) {
        self.record_field_change(event_type, issue_id, None, None, details);
    }

    /// Record a field change event with old and new values.
    pub fn record_field_change(
        &mut self,
        event_type: EventType,
        issue_id: &str,
        old_value: Option<String>,
        new_value: Option<String>,
        comment: Option<String>,
    ) {
        self.events.push(Event {
            id: 0, // DB assigns the rowid
            issue_id: issue_id.to_string(),
            event_type,
            actor: self.actor.clone(),
            old_value,
            new_value,
            comment,
            created_at: Utc::now(),
        });
    }

    pub fn mark_dirty(&mut self, issue_id: &str) {
        self.dirty_ids.insert(issue_id.to_string());
    }
}

/// A partial update for an issue. `None` leaves the field untouched; the
/// inner `Option` distinguishes "set to value" from "clear".
#[derive(Debug, Clone, Default)]
pub struct IssueUpdate {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub design: Option<Option<String>>,
    pub acceptance_criteria: Option<Option<String>>,
    pub notes: Option<Option<String>>,
    pub status: Option<Status>,
    pub priority: Option<Priority>,
    pub issue_type: Option<IssueType>,
    pub assignee: Option<Option<String>>,
    pub estimated_minutes: Option<Option<i32>>,
    pub external_ref: Option<Option<String>>,
    pub closed_at: Option<Option<DateTime<Utc>>>,
    pub close_reason: Option<Option<String>>,
}

impl IssueUpdate {
    /// True when no field is being changed.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.design.is_none()
            && self.acceptance_criteria.is_none()
            && self.notes.is_none()
            && self.status.is_none()
            && self.priority.is_none()
            && self.issue_type.is_none()
            && self.assignee.is_none()
            && self.estimated_minutes.is_none()
            && self.external_ref.is_none()
            && self.closed_at.is_none()
            && self.close_reason.is_none()
    }

    /// Build an update from `field=value` pairs (the CLI's string form).
    ///
    /// Only recognized field names are applied; an empty value clears
    /// clearable fields.
    ///
    /// # Errors
    ///
    /// Returns `UnknownField` for an unrecognized key, or a parse error for
    /// enum-valued fields.
    pub fn from_key_values<'a, I>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        fn opt(value: &str) -> Option<String> {
            if value.is_empty() {
                None
            } else {
                Some(value.to_string())
            }
        }

        let mut update = Self::default();
        for (key, value) in pairs {
            match key {
                "title" => update.title = Some(value.to_string()),
                "description" => update.description = Some(opt(value)),
                "design" => update.design = Some(opt(value)),
                "acceptance_criteria" => update.acceptance_criteria = Some(opt(value)),
                "notes" => update.notes = Some(opt(value)),
                "status" => update.status = Some(Status::from_str(value)?),
                "priority" => update.priority = Some(Priority::from_str(value)?),
                "issue_type" | "type" => update.issue_type = Some(IssueType::from_str(value)?),
                "assignee" => update.assignee = Some(opt(value)),
                "external_ref" => update.external_ref = Some(opt(value)),
                "close_reason" => update.close_reason = Some(opt(value)),
                "estimated_minutes" => {
                    let minutes = if value.is_empty() {
                        None
                    } else {
                        Some(value.parse::<i32>().map_err(|_| {
                            BeadworkError::validation("estimated_minutes", "expected an integer")
                        })?)
                    };
                    update.estimated_minutes = Some(minutes);
                }
                other => {
                    return Err(BeadworkError::UnknownField {
                        field: other.to_string(),
                    });
                }
            }
        }
        Ok(update)
    }
}

/// Filters for `search_issues`.
#[derive(Debug, Clone, Default)]
pub struct SearchFilter {
    /// Restrict to these statuses.
    pub statuses: Option<Vec<Status>>,
    /// Inclusive priority range.
    pub priority_min: Option<i32>,
    pub priority_max: Option<i32>,
    /// Exact assignee match.
    pub assignee: Option<String>,
    /// Issues carrying this label.
    pub label: Option<String>,
}

impl SqliteStorage {
    /// Open a connection to the database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established or schema
    /// application fails.
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with_timeout(path, Some(30_000))
    }

    /// Open a connection with an optional busy timeout (ms).
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established or schema
    /// application fails.
    pub fn open_with_timeout(path: &Path, lock_timeout_ms: Option<u64>) -> Result<Self> {
        let conn = Connection::open(path)?;
        if let Some(timeout) = lock_timeout_ms {
            conn.busy_timeout(Duration::from_millis(timeout))?;
        }
        apply_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Open an in-memory database for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established.
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        apply_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Whether this backend can repair ID collisions during import.
    ///
    /// The auto-import path checks this capability instead of downcasting;
    /// a backend without it gets a manual-import notice rather than a
    /// silent overwrite.
    #[must_use]
    pub const fn supports_collision_repair(&self) -> bool {
        true
    }

    /// Execute a mutation with the transaction protocol.
    ///
    /// # Errors
    ///
    /// Returns an error if any step fails; the transaction is rolled back
    /// and neither the primary rows nor the dirty set change.
    pub fn mutate<F, R>(&mut self, actor: &str, f: F) -> Result<R>
    where
        F: FnOnce(&Transaction, &mut MutationContext) -> Result<R>,
    {
        let tx = self
            .conn
            .transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;
        let mut ctx = MutationContext::new(actor);

        let result = f(&tx, &mut ctx)?;

        for event in ctx.events {
            tx.execute(
                "INSERT INTO events (issue_id, event_type, actor, old_value, new_value, comment, created_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
                rusqlite::params![
                    event.issue_id,
                    event.event_type.as_str(),
                    event.actor,
                    event.old_value,
                    event.new_value,
                    event.comment,
                    event.created_at.to_rfc3339()
                ],
            )?;
        }

        for id in ctx.dirty_ids {
            tx.execute(
                "INSERT OR REPLACE INTO dirty_issues (issue_id, marked_at) VALUES (?, ?)",
                rusqlite::params![id, Utc::now().to_rfc3339()],
            )?;
        }

        tx.commit()?;

        Ok(result)
    }

    /// Create a new issue.
    ///
    /// When `issue.id` is empty, the smallest unused `prefix-N` is
    /// allocated and written back into the struct. An explicit ID is
    /// validated against the `prefix-N` shape and must not already exist.
    /// The status/`closed_at` invariant is enforced before insertion.
    ///
    /// # Errors
    ///
    /// Returns an error on invalid or colliding IDs, or if the insert fails.
    pub fn create_issue(&mut self, issue: &mut Issue, prefix: &str, actor: &str) -> Result<()> {
        if issue.title.trim().is_empty() {
            return Err(BeadworkError::validation("title", "cannot be empty"));
        }

        issue.enforce_closed_invariant();

        let explicit_id = if issue.id.is_empty() {
            None
        } else {
            Some(parse_id(&issue.id)?.to_string())
        };

        let assigned = self.mutate(actor, |tx, ctx| {
            let id = match explicit_id {
                Some(id) => {
                    if id_exists_in_tx(tx, &id)? {
                        return Err(BeadworkError::IdCollision { id });
                    }
                    id
                }
                None => {
                    let in_use = all_ids_in_tx(tx)?;
                    next_available_id(prefix, &in_use)
                }
            };

            insert_issue_row(tx, &id, issue)?;

            ctx.record_event(
                EventType::Created,
                &id,
                Some(format!("Created issue: {}", issue.title)),
            );
            ctx.mark_dirty(&id);

            Ok(id)
        })?;

        issue.id = assigned;
        Ok(())
    }

    /// Update an issue's fields.
    ///
    /// Applies the partial update, bumps `updated_at`, and enforces the
    /// status/`closed_at` coupling on the result.
    ///
    /// # Errors
    ///
    /// Returns `IssueNotFound` if the issue doesn't exist, or an error if
    /// the update fails.
    pub fn update_issue(&mut self, id: &str, updates: &IssueUpdate, actor: &str) -> Result<Issue> {
        let mut issue = self
            .get_issue(id)?
            .ok_or_else(|| BeadworkError::IssueNotFound { id: id.to_string() })?;

        if updates.is_empty() {
            return Ok(issue);
        }

        let old_status = issue.status.clone();
        let old_priority = issue.priority;
        let old_assignee = issue.assignee.clone();
        let old_title = issue.title.clone();

        if let Some(ref title) = updates.title {
            if title.trim().is_empty() {
                return Err(BeadworkError::validation("title", "cannot be empty"));
            }
            issue.title.clone_from(title);
        }
        if let Some(ref val) = updates.description {
            issue.description.clone_from(val);
        }
        if let Some(ref val) = updates.design {
            issue.design.clone_from(val);
        }
        if let Some(ref val) = updates.acceptance_criteria {
            issue.acceptance_criteria.clone_from(val);
        }
        if let Some(ref val) = updates.notes {
            issue.notes.clone_from(val);
        }
        if let Some(ref status) = updates.status {
            issue.status.clone_from(status);
        }
        if let Some(priority) = updates.priority {
            issue.priority = priority;
        }
        if let Some(ref issue_type) = updates.issue_type {
            issue.issue_type.clone_from(issue_type);
        }
        if let Some(ref val) = updates.assignee {
            issue.assignee.clone_from(val);
        }
        if let Some(ref val) = updates.estimated_minutes {
            issue.estimated_minutes = *val;
        }
        if let Some(ref val) = updates.external_ref {
            issue.external_ref.clone_from(val);
        }
        if let Some(ref val) = updates.closed_at {
            issue.closed_at = *val;
        }
        if let Some(ref val) = updates.close_reason {
            issue.close_reason.clone_from(val);
        }

        issue.updated_at = Utc::now();
        issue.enforce_closed_invariant();

        self.mutate(actor, |tx, ctx| {
            update_issue_row(tx, id, &issue)?;

            if issue.title != old_title {
                ctx.record_field_change(
                    EventType::Updated,
                    id,
                    Some(old_title.clone()),
                    Some(issue.title.clone()),
                    Some("Title changed".to_string()),
                );
            }
            if issue.status != old_status {
                ctx.record_field_change(
                    EventType::StatusChanged,
                    id,
                    Some(old_status.as_str().to_string()),
                    Some(issue.status.as_str().to_string()),
                    None,
                );
            }
            if issue.priority != old_priority {
                ctx.record_field_change(
                    EventType::PriorityChanged,
                    id,
                    Some(old_priority.0.to_string()),
                    Some(issue.priority.0.to_string()),
                    None,
                );
            }
            if issue.assignee != old_assignee {
                ctx.record_field_change(
                    EventType::AssigneeChanged,
                    id,
                    old_assignee.clone(),
                    issue.assignee.clone(),
                    None,
                );
            }

            ctx.mark_dirty(id);
            Ok(())
        })?;

        Ok(issue)
    }

    /// Close an issue with a reason.
    ///
    /// Closure is non-destructive: the issue remains queryable and carries
    /// its closure timestamp.
    ///
    /// # Errors
    ///
    /// Returns `IssueNotFound` if the issue doesn't exist.
    pub fn close_issue(&mut self, id: &str, reason: &str, actor: &str) -> Result<Issue> {
        let old = self
            .get_issue(id)?
            .ok_or_else(|| BeadworkError::IssueNotFound { id: id.to_string() })?;

        let mut issue = old.clone();
        issue.status = Status::Closed;
        issue.close_reason = Some(reason.to_string());
        issue.updated_at = Utc::now();
        issue.closed_at = Some(issue.updated_at);

        self.mutate(actor, |tx, ctx| {
            update_issue_row(tx, id, &issue)?;
            ctx.record_field_change(
                EventType::Closed,
                id,
                Some(old.status.as_str().to_string()),
                Some("closed".to_string()),
                Some(reason.to_string()),
            );
            ctx.mark_dirty(id);
            Ok(())
        })?;

        Ok(issue)
    }

    /// Delete an issue and its relations.
    ///
    /// The deleted ID keeps its dirty entry so the next flush removes the
    /// corresponding journal line; the flusher clears it afterwards.
    ///
    /// # Errors
    ///
    /// Returns `IssueNotFound` if the issue doesn't exist.
    pub fn delete_issue(&mut self, id: &str, actor: &str) -> Result<()> {
        let issue = self
            .get_issue(id)?
            .ok_or_else(|| BeadworkError::IssueNotFound { id: id.to_string() })?;

        self.mutate(actor, |tx, ctx| {
            tx.execute(
                "DELETE FROM dependencies WHERE issue_id = ? OR depends_on_id = ?",
                rusqlite::params![id, id],
            )?;
            tx.execute("DELETE FROM labels WHERE issue_id = ?", [id])?;
            tx.execute("DELETE FROM issues WHERE id = ?", [id])?;

            ctx.record_event(
                EventType::Deleted,
                id,
                Some(format!("Deleted issue: {}", issue.title)),
            );
            ctx.mark_dirty(id);
            Ok(())
        })
    }

    /// Get an issue by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub fn get_issue(&self, id: &str) -> Result<Option<Issue>> {
        let mut stmt = self.conn.prepare(&format!("{ISSUE_SELECT} WHERE id = ?"))?;
        let result = stmt.query_row([id], issue_from_row).optional()?;
        Ok(result)
    }

    /// True if the ID exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub fn id_exists(&self, id: &str) -> Result<bool> {
        let count: i64 =
            self.conn
                .query_row("SELECT count(*) FROM issues WHERE id = ?", [id], |row| {
                    row.get(0)
                })?;
        Ok(count > 0)
    }

    /// All issue IDs currently in the store.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub fn all_ids(&self) -> Result<HashSet<String>> {
        let mut stmt = self.conn.prepare("SELECT id FROM issues")?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<HashSet<_>, _>>()?;
        Ok(ids)
    }

    /// Count issues in the database.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub fn count_issues(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT count(*) FROM issues", [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    /// Search issues with optional full-text query and filters.
    ///
    /// The query matches title and description, case-insensitively.
    /// Results are ordered by priority, then ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub fn search_issues(&self, query: &str, filter: &SearchFilter) -> Result<Vec<Issue>> {
        let mut sql = format!("{ISSUE_SELECT} WHERE 1=1");
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(ref statuses) = filter.statuses {
            if !statuses.is_empty() {
                let placeholders: Vec<&str> = statuses.iter().map(|_| "?").collect();
                let _ = write!(sql, " AND status IN ({})", placeholders.join(","));
                for s in statuses {
                    params.push(Box::new(s.as_str().to_string()));
                }
            }
        }

        if let Some(min) = filter.priority_min {
            sql.push_str(" AND priority >= ?");
            params.push(Box::new(min));
        }
        if let Some(max) = filter.priority_max {
            sql.push_str(" AND priority <= ?");
            params.push(Box::new(max));
        }

        if let Some(ref assignee) = filter.assignee {
            sql.push_str(" AND assignee = ?");
            params.push(Box::new(assignee.clone()));
        }

        if let Some(ref label) = filter.label {
            sql.push_str(" AND id IN (SELECT issue_id FROM labels WHERE label = ?)");
            params.push(Box::new(label.clone()));
        }

        if !query.is_empty() {
            sql.push_str(" AND (title LIKE ? OR description LIKE ?)");
            let pattern = format!("%{query}%");
            params.push(Box::new(pattern.clone()));
            params.push(Box::new(pattern));
        }

        sql.push_str(" ORDER BY priority ASC, id ASC");

        let params_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(AsRef::as_ref).collect();
        let mut stmt = self.conn.prepare(&sql)?;
        let issues = stmt
            .query_map(params_refs.as_slice(), issue_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(issues)
    }

    // =========================================================================
    // Dependencies
    // =========================================================================

    /// Add a dependency edge.
    ///
    /// Both endpoints must exist at mutation time. Multi-edges of different
    /// kinds between the same pair are allowed; duplicate triples are not.
    ///
    /// # Errors
    ///
    /// Returns `SelfDependency`, `DependencyNotFound`, or
    /// `DuplicateDependency` accordingly.
    pub fn add_dependency(&mut self, dep: &Dependency, actor: &str) -> Result<()> {
        if dep.issue_id == dep.depends_on_id {
            return Err(BeadworkError::SelfDependency {
                id: dep.issue_id.clone(),
            });
        }

        let dep = dep.clone();
        self.mutate(actor, |tx, ctx| {
            for endpoint in [&dep.issue_id, &dep.depends_on_id] {
                if !id_exists_in_tx(tx, endpoint)? {
                    return Err(BeadworkError::DependencyNotFound {
                        id: endpoint.clone(),
                    });
                }
            }

            let existing: i64 = tx.query_row(
                "SELECT count(*) FROM dependencies WHERE issue_id = ? AND depends_on_id = ? AND type = ?",
                rusqlite::params![dep.issue_id, dep.depends_on_id, dep.dep_type.as_str()],
                |row| row.get(0),
            )?;
            if existing > 0 {
                return Err(BeadworkError::DuplicateDependency {
                    from: dep.issue_id.clone(),
                    to: dep.depends_on_id.clone(),
                    kind: dep.dep_type.as_str().to_string(),
                });
            }

            tx.execute(
                "INSERT INTO dependencies (issue_id, depends_on_id, type, created_at, created_by)
                 VALUES (?, ?, ?, ?, ?)",
                rusqlite::params![
                    dep.issue_id,
                    dep.depends_on_id,
                    dep.dep_type.as_str(),
                    dep.created_at.to_rfc3339(),
                    dep.created_by,
                ],
            )?;

            ctx.record_event(
                EventType::DependencyAdded,
                &dep.issue_id,
                Some(format!("{} -> {}", dep.dep_type, dep.depends_on_id)),
            );
            ctx.mark_dirty(&dep.issue_id);
            Ok(())
        })
    }

    /// Get the dependency records originating from an issue.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub fn get_dependency_records(&self, issue_id: &str) -> Result<Vec<Dependency>> {
        let mut stmt = self.conn.prepare(
            "SELECT issue_id, depends_on_id, type, created_at, created_by
             FROM dependencies WHERE issue_id = ?
             ORDER BY depends_on_id, type",
        )?;
        let deps = stmt
            .query_map([issue_id], dependency_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(deps)
    }

    /// Get the issues this one depends on.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub fn get_dependencies(&self, issue_id: &str) -> Result<Vec<Issue>> {
        let mut stmt = self.conn.prepare(&format!(
            "{ISSUE_SELECT} WHERE id IN
                 (SELECT depends_on_id FROM dependencies WHERE issue_id = ?)
             ORDER BY id"
        ))?;
        let issues = stmt
            .query_map([issue_id], issue_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(issues)
    }

    /// Get the issues depending on this one.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub fn get_dependents(&self, issue_id: &str) -> Result<Vec<Issue>> {
        let mut stmt = self.conn.prepare(&format!(
            "{ISSUE_SELECT} WHERE id IN
                 (SELECT issue_id FROM dependencies WHERE depends_on_id = ?)
             ORDER BY id"
        ))?;
        let issues = stmt
            .query_map([issue_id], issue_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(issues)
    }

    /// All dependency records grouped by source issue.
    ///
    /// One query instead of N, for journal export.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub fn get_all_dependency_records(&self) -> Result<HashMap<String, Vec<Dependency>>> {
        let mut stmt = self.conn.prepare(
            "SELECT issue_id, depends_on_id, type, created_at, created_by
             FROM dependencies
             ORDER BY issue_id, depends_on_id, type",
        )?;
        let rows = stmt.query_map([], dependency_from_row)?;

        let mut map: HashMap<String, Vec<Dependency>> = HashMap::new();
        for row in rows {
            let dep = row?;
            map.entry(dep.issue_id.clone()).or_default().push(dep);
        }
        Ok(map)
    }

    // =========================================================================
    // Labels
    // =========================================================================

    /// Add a label to an issue. Returns `false` if it was already present.
    ///
    /// # Errors
    ///
    /// Returns `IssueNotFound` if the issue doesn't exist.
    pub fn add_label(&mut self, issue_id: &str, label: &str, actor: &str) -> Result<bool> {
        if !self.id_exists(issue_id)? {
            return Err(BeadworkError::IssueNotFound {
                id: issue_id.to_string(),
            });
        }

        self.mutate(actor, |tx, ctx| {
            let inserted = tx.execute(
                "INSERT OR IGNORE INTO labels (issue_id, label) VALUES (?, ?)",
                rusqlite::params![issue_id, label],
            )?;
            if inserted > 0 {
                ctx.record_event(EventType::LabelAdded, issue_id, Some(label.to_string()));
                ctx.mark_dirty(issue_id);
            }
            Ok(inserted > 0)
        })
    }

    /// Get labels for an issue, sorted.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub fn get_labels(&self, issue_id: &str) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT label FROM labels WHERE issue_id = ? ORDER BY label")?;
        let labels = stmt
            .query_map([issue_id], |row| row.get(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(labels)
    }

    /// All labels grouped by issue, for journal export.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub fn get_all_labels(&self) -> Result<HashMap<String, Vec<String>>> {
        let mut stmt = self
            .conn
            .prepare("SELECT issue_id, label FROM labels ORDER BY issue_id, label")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut map: HashMap<String, Vec<String>> = HashMap::new();
        for row in rows {
            let (issue_id, label) = row?;
            map.entry(issue_id).or_default().push(label);
        }
        Ok(map)
    }

    /// Replace an issue's labels (import path).
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn set_labels(&mut self, issue_id: &str, labels: &[String]) -> Result<()> {
        self.conn
            .execute("DELETE FROM labels WHERE issue_id = ?", [issue_id])?;
        for label in labels {
            self.conn.execute(
                "INSERT OR IGNORE INTO labels (issue_id, label) VALUES (?, ?)",
                rusqlite::params![issue_id, label],
            )?;
        }
        Ok(())
    }

    // =========================================================================
    // Dirty set
    // =========================================================================

    /// IDs of issues mutated since the last successful flush, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub fn get_dirty_issues(&self) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT issue_id FROM dirty_issues ORDER BY marked_at, issue_id")?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    /// Clear dirty flags for the given issue IDs only.
    ///
    /// IDs marked dirty after the flush snapshot keep their flush ticket.
    ///
    /// # Errors
    ///
    /// Returns an error if the database update fails.
    pub fn clear_dirty_issues(&mut self, issue_ids: &[String]) -> Result<usize> {
        if issue_ids.is_empty() {
            return Ok(0);
        }

        let placeholders: Vec<&str> = issue_ids.iter().map(|_| "?").collect();
        let sql = format!(
            "DELETE FROM dirty_issues WHERE issue_id IN ({})",
            placeholders.join(",")
        );
        let params: Vec<&dyn rusqlite::ToSql> = issue_ids
            .iter()
            .map(|s| s as &dyn rusqlite::ToSql)
            .collect();

        let count = self.conn.execute(&sql, params.as_slice())?;
        Ok(count)
    }

    // =========================================================================
    // Metadata
    // =========================================================================

    /// Get a metadata value by key.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub fn get_metadata(&self, key: &str) -> Result<Option<String>> {
        let result = self
            .conn
            .query_row("SELECT value FROM metadata WHERE key = ?", [key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(result)
    }

    /// Set a metadata value.
    ///
    /// # Errors
    ///
    /// Returns an error if the database update fails.
    pub fn set_metadata(&mut self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO metadata (key, value) VALUES (?, ?)",
            [key, value],
        )?;
        Ok(())
    }

    // =========================================================================
    // Export / import support
    // =========================================================================

    /// All issues sorted by ID, for journal serialization.
    ///
    /// Relations are not populated here; the caller attaches them from the
    /// batched label/dependency maps.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub fn get_all_issues(&self) -> Result<Vec<Issue>> {
        let mut stmt = self.conn.prepare(&format!("{ISSUE_SELECT} ORDER BY id ASC"))?;
        let issues = stmt
            .query_map([], issue_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(issues)
    }

    /// An issue with its labels and dependency records attached.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub fn get_issue_for_export(&self, id: &str) -> Result<Option<Issue>> {
        let Some(mut issue) = self.get_issue(id)? else {
            return Ok(None);
        };
        issue.labels = self.get_labels(id)?;
        issue.dependencies = self.get_dependency_records(id)?;
        Ok(Some(issue))
    }

    /// Audit events for an issue, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub fn get_events(&self, issue_id: &str) -> Result<Vec<Event>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, issue_id, event_type, actor, old_value, new_value, comment, created_at
             FROM events WHERE issue_id = ? ORDER BY id",
        )?;
        let events = stmt
            .query_map([issue_id], |row| {
                Ok(Event {
                    id: row.get(0)?,
                    issue_id: row.get(1)?,
                    event_type: match row.get::<_, String>(2)?.as_str() {
                        "created" => EventType::Created,
                        "updated" => EventType::Updated,
                        "status_changed" => EventType::StatusChanged,
                        "priority_changed" => EventType::PriorityChanged,
                        "assignee_changed" => EventType::AssigneeChanged,
                        "closed" => EventType::Closed,
                        "dependency_added" => EventType::DependencyAdded,
                        "label_added" => EventType::LabelAdded,
                        "deleted" => EventType::Deleted,
                        other => EventType::Custom(other.to_string()),
                    },
                    actor: row.get(3)?,
                    old_value: row.get(4)?,
                    new_value: row.get(5)?,
                    comment: row.get(6)?,
                    created_at: parse_datetime(&row.get::<_, String>(7)?),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(events)
    }

    /// Allocate a fresh ID in the same prefix namespace as `colliding_id`,
    /// avoiding every ID in `reserved` as well as the store's own.
    ///
    /// # Errors
    ///
    /// Returns `InvalidId` if the colliding ID has no valid prefix, or an
    /// error if the database query fails.
    pub fn allocate_remap_id(
        &self,
        colliding_id: &str,
        reserved: &HashSet<String>,
    ) -> Result<String> {
        let (prefix, _) = split_id(colliding_id)?;
        let mut in_use = self.all_ids()?;
        in_use.extend(reserved.iter().cloned());
        Ok(next_available_id(prefix, &in_use))
    }
}

const ISSUE_SELECT: &str = "SELECT id, title, description, design, acceptance_criteria, notes,
            status, priority, issue_type, assignee, estimated_minutes, external_ref,
            created_at, updated_at, closed_at, close_reason,
            compaction_level, compacted_at, original_size
     FROM issues";

fn issue_from_row(row: &rusqlite::Row) -> rusqlite::Result<Issue> {
    let status: String = row.get(6)?;
    let issue_type: String = row.get(8)?;
    Ok(Issue {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        design: row.get(3)?,
        acceptance_criteria: row.get(4)?,
        notes: row.get(5)?,
        status: Status::from_str(&status).unwrap_or(Status::Custom(status)),
        priority: Priority(row.get(7)?),
        issue_type: IssueType::from_str(&issue_type).unwrap_or(IssueType::Custom(issue_type)),
        assignee: row.get(9)?,
        estimated_minutes: row.get(10)?,
        external_ref: row.get(11)?,
        created_at: parse_datetime(&row.get::<_, String>(12)?),
        updated_at: parse_datetime(&row.get::<_, String>(13)?),
        closed_at: row.get::<_, Option<String>>(14)?.map(|s| parse_datetime(&s)),
        close_reason: row.get(15)?,
        compaction_level: row.get(16)?,
        compacted_at: row.get::<_, Option<String>>(17)?.map(|s| parse_datetime(&s)),
        original_size: row.get(18)?,
        labels: Vec::new(),
        dependencies: Vec::new(),
    })
}

fn dependency_from_row(row: &rusqlite::Row) -> rusqlite::Result<Dependency> {
    let kind: String = row.get(2)?;
    Ok(Dependency {
        issue_id: row.get(0)?,
        depends_on_id: row.get(1)?,
        dep_type: DependencyType::from_str(&kind).unwrap_or(DependencyType::Blocks),
        created_at: parse_datetime(&row.get::<_, String>(3)?),
        created_by: row.get(4)?,
    })
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn id_exists_in_tx(tx: &Transaction, id: &str) -> Result<bool> {
    let count: i64 = tx.query_row("SELECT count(*) FROM issues WHERE id = ?", [id], |row| {
        row.get(0)
    })?;
    Ok(count > 0)
}

fn all_ids_in_tx(tx: &Transaction) -> Result<HashSet<String>> {
    let mut stmt = tx.prepare("SELECT id FROM issues")?;
    let ids = stmt
        .query_map([], |row| row.get(0))?
        .collect::<std::result::Result<HashSet<_>, _>>()?;
    Ok(ids)
}

fn insert_issue_row(tx: &Transaction, id: &str, issue: &Issue) -> Result<()> {
    tx.execute(
        "INSERT INTO issues (
            id, title, description, design, acceptance_criteria, notes,
            status, priority, issue_type, assignee, estimated_minutes, external_ref,
            created_at, updated_at, closed_at, close_reason,
            compaction_level, compacted_at, original_size
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        rusqlite::params![
            id,
            issue.title,
            issue.description,
            issue.design,
            issue.acceptance_criteria,
            issue.notes,
            issue.status.as_str(),
            issue.priority.0,
            issue.issue_type.as_str(),
            issue.assignee,
            issue.estimated_minutes,
            issue.external_ref,
            issue.created_at.to_rfc3339(),
            issue.updated_at.to_rfc3339(),
            issue.closed_at.map(|dt| dt.to_rfc3339()),
            issue.close_reason,
            issue.compaction_level,
            issue.compacted_at.map(|dt| dt.to_rfc3339()),
            issue.original_size,
        ],
    )?;
    Ok(())
}

fn update_issue_row(tx: &Transaction, id: &str, issue: &Issue) -> Result<()> {
    let changed = tx.execute(
        "UPDATE issues SET
            title = ?, description = ?, design = ?, acceptance_criteria = ?, notes = ?,
            status = ?, priority = ?, issue_type = ?, assignee = ?, estimated_minutes = ?,
            external_ref = ?, created_at = ?, updated_at = ?, closed_at = ?, close_reason = ?,
            compaction_level = ?, compacted_at = ?, original_size = ?
         WHERE id = ?",
        rusqlite::params![
            issue.title,
            issue.description,
            issue.design,
            issue.acceptance_criteria,
            issue.notes,
            issue.status.as_str(),
            issue.priority.0,
            issue.issue_type.as_str(),
            issue.assignee,
            issue.estimated_minutes,
            issue.external_ref,
            issue.created_at.to_rfc3339(),
            issue.updated_at.to_rfc3339(),
            issue.closed_at.map(|dt| dt.to_rfc3339()),
            issue.close_reason,
            issue.compaction_level,
            issue.compacted_at.map(|dt| dt.to_rfc3339()),
            issue.original_size,
            id,
        ],
    )?;
    if changed == 0 {
        return Err(BeadworkError::IssueNotFound { id: id.to_string() });
    }
    Ok(())
}
