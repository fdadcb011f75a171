//! Journal import/export for `beadwork`.
//!
//! The journal (`.beads/issues.jsonl`) is the git-friendly text form of the
//! store: one JSON object per line, sorted by ID, trailing newline. This
//! module handles:
//! - Export: store -> journal (atomic temp-file + rename)
//! - Import: journal -> store (hash-gated, collision-aware)
//! - Conflict-marker detection
//! - The SHA-256 hash gate that decides whether import work is needed

pub mod collision;
pub mod flush;

use crate::config::debug_log;
use crate::error::{BeadworkError, Result};
use crate::model::Issue;
use crate::storage::{IssueUpdate, SqliteStorage};
use crate::util::hash::hash_bytes;
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

/// Metadata key for the hash of the last journal content reconciled with.
pub const METADATA_LAST_IMPORT_HASH: &str = "last_import_hash";
/// Metadata key for the binary version that last wrote the database.
pub const METADATA_VERSION: &str = "bd_version";

/// Actor recorded for mutations originating from an import.
const IMPORT_ACTOR: &str = "auto-import";

const CONFLICT_START: &str = "<<<<<<<";
const CONFLICT_SEPARATOR: &str = "=======";
const CONFLICT_END: &str = ">>>>>>>";

/// True if a trimmed line is a git merge conflict marker.
fn is_conflict_marker(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.starts_with(CONFLICT_START)
        || trimmed == CONFLICT_SEPARATOR
        || trimmed.starts_with(CONFLICT_END)
}

/// Fail if the journal data contains merge conflict markers.
///
/// # Errors
///
/// Returns `ConflictMarkers` naming the file and first offending line.
pub fn ensure_no_conflict_markers(path: &Path, data: &str) -> Result<()> {
    for (idx, line) in data.lines().enumerate() {
        if is_conflict_marker(line) {
            return Err(BeadworkError::ConflictMarkers {
                path: path.to_path_buf(),
                line: idx + 1,
            });
        }
    }
    Ok(())
}

/// Parse journal data into issues.
///
/// Blank lines are ignored. A malformed line fails the whole parse with
/// its line number and an 80-character snippet.
///
/// # Errors
///
/// Returns `JournalParse` on the first malformed line.
pub fn parse_journal(data: &str) -> Result<Vec<Issue>> {
    let mut issues = Vec::new();
    for (idx, line) in data.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let issue: Issue =
            serde_json::from_str(line).map_err(|e| BeadworkError::JournalParse {
                line: idx + 1,
                reason: e.to_string(),
                snippet: snippet(line),
            })?;
        issues.push(issue);
    }
    Ok(issues)
}

fn snippet(line: &str) -> String {
    if line.chars().count() > 80 {
        let mut s: String = line.chars().take(80).collect();
        s.push_str("...");
        s
    } else {
        line.to_string()
    }
}

/// Read the journal into an ID -> issue map, skipping malformed lines with
/// a warning.
///
/// This is the lenient reader used by the incremental flusher: a bad line
/// must not make the flush lose the rest of the journal.
#[must_use]
pub fn read_journal_map(path: &Path) -> HashMap<String, Issue> {
    let mut map = HashMap::new();
    let Ok(data) = fs::read_to_string(path) else {
        return map;
    };
    for (idx, line) in data.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<Issue>(line) {
            Ok(issue) => {
                map.insert(issue.id.clone(), issue);
            }
            Err(e) => {
                eprintln!("Warning: skipping malformed journal line {}: {e}", idx + 1);
            }
        }
    }
    map
}

/// Write issues to the journal atomically and return the content hash.
///
/// Issues are sorted by ID so any two runs producing the same set yield
/// byte-identical files. The write goes to a sibling temp file whose name
/// incorporates the process ID (concurrent invocations never clobber each
/// other's temp files), is fsync-closed, then renamed over the target. On
/// any error the temp file is removed and the original journal is intact.
///
/// # Errors
///
/// Returns an error if serialization, writing, or the rename fails.
pub fn write_journal_atomic(path: &Path, issues: &[Issue]) -> Result<String> {
    let parent = path.parent().ok_or_else(|| {
        BeadworkError::Config(format!("Invalid journal path: {}", path.display()))
    })?;
    fs::create_dir_all(parent)?;

    let mut sorted: Vec<&Issue> = issues.iter().collect();
    sorted.sort_by(|a, b| a.id.cmp(&b.id));

    let temp_path = path.with_file_name(format!(
        "{}.tmp.{}",
        path.file_name().map_or_else(
            || "issues.jsonl".to_string(),
            |n| n.to_string_lossy().to_string()
        ),
        std::process::id()
    ));

    let write_result = (|| -> Result<String> {
        let file = File::create(&temp_path)?;
        let mut writer = BufWriter::new(file);
        let mut content = String::new();

        for issue in &sorted {
            let json = serde_json::to_string(issue)?;
            writeln!(writer, "{json}")?;
            content.push_str(&json);
            content.push('\n');
        }

        writer.flush()?;
        writer
            .into_inner()
            .map_err(|e| BeadworkError::Io(e.into_error()))?
            .sync_all()?;

        Ok(hash_bytes(content.as_bytes()))
    })();

    let hash = match write_result {
        Ok(hash) => hash,
        Err(e) => {
            let _ = fs::remove_file(&temp_path);
            return Err(e);
        }
    };

    if let Err(e) = fs::rename(&temp_path, path) {
        let _ = fs::remove_file(&temp_path);
        return Err(e.into());
    }

    Ok(hash)
}

/// Result of a journal export.
#[derive(Debug, Clone)]
pub struct ExportResult {
    /// Number of issues written.
    pub exported_count: usize,
    /// SHA-256 of the written journal.
    pub content_hash: String,
}

/// Serialize the entire store to the journal.
///
/// Used by the explicit `export` command and the full-export flush mode.
/// Clears the dirty flags that existed when the export started and records
/// the new journal hash so the next import's gate sees no change.
///
/// # Errors
///
/// Returns an error if database reads or the journal write fail.
pub fn export_journal(storage: &mut SqliteStorage, path: &Path) -> Result<ExportResult> {
    let dirty_snapshot = storage.get_dirty_issues()?;
    let issues = collect_all_for_export(storage)?;

    let hash = write_journal_atomic(path, &issues)?;

    storage.clear_dirty_issues(&dirty_snapshot)?;
    storage.set_metadata(METADATA_LAST_IMPORT_HASH, &hash)?;

    tracing::debug!(
        exported = issues.len(),
        path = %path.display(),
        "Journal export complete"
    );

    Ok(ExportResult {
        exported_count: issues.len(),
        content_hash: hash,
    })
}

/// All issues with labels and dependencies attached, sorted by ID.
///
/// Batch queries instead of per-issue lookups.
///
/// # Errors
///
/// Returns an error if a database query fails.
pub fn collect_all_for_export(storage: &SqliteStorage) -> Result<Vec<Issue>> {
    let mut issues = storage.get_all_issues()?;
    let mut all_deps = storage.get_all_dependency_records()?;
    let mut all_labels = storage.get_all_labels()?;

    for issue in &mut issues {
        issue.dependencies = all_deps.remove(&issue.id).unwrap_or_default();
        issue.labels = all_labels.remove(&issue.id).unwrap_or_default();
    }
    Ok(issues)
}

/// Result of a journal import.
#[derive(Debug, Clone, Default)]
pub struct ImportOutcome {
    /// Whether the hash gate skipped the import entirely.
    pub skipped_unchanged: bool,
    /// Issues inserted.
    pub created: usize,
    /// Issues updated in place.
    pub updated: usize,
    /// Collision remappings applied (old ID, new ID, title).
    pub remapped: Vec<collision::Remapping>,
}

impl ImportOutcome {
    #[must_use]
    pub const fn imported(&self) -> usize {
        self.created + self.updated
    }
}

/// Import the journal into the store.
///
/// Pipeline, each stage failing the entire import:
/// 1. Hash gate: skip when the journal matches `last_import_hash`.
/// 2. Conflict-marker check.
/// 3. Parse all lines.
/// 4. Collision resolution (remappings already rewritten in the stream).
/// 5. Batch-fetch existing issues once.
/// 6. Upsert each issue (invariants enforced on both paths).
/// 7. Union dependencies, adding only missing `(from, to, kind)` triples.
/// 8. Persist the new `last_import_hash`.
///
/// # Errors
///
/// Returns an error on missing journal, conflict markers, parse failures,
/// or database failures.
pub fn import_journal(storage: &mut SqliteStorage, path: &Path) -> Result<ImportOutcome> {
    let data = fs::read(path)?;
    let current_hash = hash_bytes(&data);

    // A metadata read error degrades to "first import"; an absent or
    // corrupted entry must never cause journal data to be silently ignored.
    let last_hash = match storage.get_metadata(METADATA_LAST_IMPORT_HASH) {
        Ok(value) => value.unwrap_or_default(),
        Err(e) => {
            debug_log(&format!(
                "metadata read failed ({e}), treating as first import"
            ));
            String::new()
        }
    };

    if current_hash == last_hash {
        debug_log("auto-import skipped, JSONL unchanged (hash match)");
        return Ok(ImportOutcome {
            skipped_unchanged: true,
            ..ImportOutcome::default()
        });
    }
    debug_log("auto-import triggered (hash changed)");

    let text = String::from_utf8_lossy(&data);
    ensure_no_conflict_markers(path, &text)?;

    let issues = parse_journal(&text)?;

    let (issues, remapped) = collision::resolve_collisions(storage, issues)?;
    collision::report_remappings(&remapped);

    let existing_by_id: HashMap<String, Issue> = storage
        .get_all_issues()?
        .into_iter()
        .map(|issue| (issue.id.clone(), issue))
        .collect();

    let mut outcome = ImportOutcome {
        remapped,
        ..ImportOutcome::default()
    };

    for issue in &issues {
        if existing_by_id.contains_key(&issue.id) {
            storage.update_issue(&issue.id, &canonical_update(issue), IMPORT_ACTOR)?;
            outcome.updated += 1;
        } else {
            let mut fresh = issue.clone();
            fresh.labels.clear();
            fresh.dependencies.clear();
            storage.create_issue(&mut fresh, "bd", IMPORT_ACTOR)?;
            outcome.created += 1;
        }
        storage.set_labels(&issue.id, &issue.labels)?;
    }

    import_dependencies(storage, &issues)?;

    storage.set_metadata(METADATA_LAST_IMPORT_HASH, &current_hash)?;

    tracing::debug!(
        created = outcome.created,
        updated = outcome.updated,
        remapped = outcome.remapped.len(),
        "Journal import complete"
    );

    Ok(outcome)
}

/// The canonical update set applied when an incoming issue matches an
/// existing ID, with the status/`closed_at` coupling resolved from the
/// incoming record.
fn canonical_update(incoming: &Issue) -> IssueUpdate {
    let closed_at = if incoming.status.is_closed() {
        Some(incoming.closed_at.unwrap_or(incoming.updated_at))
    } else {
        None
    };

    IssueUpdate {
        title: Some(incoming.title.clone()),
        description: Some(incoming.description.clone()),
        design: Some(incoming.design.clone()),
        acceptance_criteria: Some(incoming.acceptance_criteria.clone()),
        notes: Some(incoming.notes.clone()),
        status: Some(incoming.status.clone()),
        priority: Some(incoming.priority),
        issue_type: Some(incoming.issue_type.clone()),
        assignee: Some(incoming.assignee.clone()),
        estimated_minutes: Some(incoming.estimated_minutes),
        external_ref: Some(incoming.external_ref.clone()),
        closed_at: Some(closed_at),
        close_reason: Some(incoming.close_reason.clone()),
    }
}

/// Union each issue's dependency list with the store's existing edges,
/// adding only the `(from, to, kind)` triples not already present.
fn import_dependencies(storage: &mut SqliteStorage, issues: &[Issue]) -> Result<()> {
    for issue in issues {
        if issue.dependencies.is_empty() {
            continue;
        }

        let existing = storage.get_dependency_records(&issue.id)?;

        for dep in &issue.dependencies {
            let present = existing.iter().any(|e| {
                e.depends_on_id == dep.depends_on_id && e.dep_type == dep.dep_type
            });
            if present {
                continue;
            }

            let mut dep = dep.clone();
            // Dependency rows key off the importing issue regardless of
            // what the journal line claimed as its source.
            dep.issue_id.clone_from(&issue.id);
            if let Err(e) = storage.add_dependency(&dep, IMPORT_ACTOR) {
                tracing::warn!(
                    from = %dep.issue_id,
                    to = %dep.depends_on_id,
                    error = %e,
                    "Skipping dependency during import"
                );
            }
        }
    }
    Ok(())
}

/// Opportunistic import at process start.
///
/// Swallows errors and reports them to stderr rather than failing the
/// user's command, except conflict markers which get the full remediation
/// message. Backends without collision repair get a manual-import notice
/// instead of a silent overwrite.
pub fn auto_import(storage: &mut SqliteStorage, journal_path: &Path) -> Option<ImportOutcome> {
    if !journal_path.exists() {
        debug_log("auto-import skipped, JSONL not found");
        return None;
    }

    if !storage.supports_collision_repair() {
        eprintln!("Auto-import disabled for this backend (no collision detection).");
        eprintln!(
            "To import manually, run: bd import -i {}",
            journal_path.display()
        );
        return None;
    }

    match import_journal(storage, journal_path) {
        Ok(outcome) => Some(outcome),
        Err(e @ BeadworkError::ConflictMarkers { .. }) => {
            eprintln!("\n{e}\n");
            None
        }
        Err(e) => {
            eprintln!("Auto-import failed: {e}");
            None
        }
    }
}

/// Warn when the binary version differs from the one that last wrote the
/// database; always refresh the stored version afterwards.
pub fn check_version(storage: &mut SqliteStorage, binary_version: &str) {
    let stored = match storage.get_metadata(METADATA_VERSION) {
        Ok(value) => value.unwrap_or_default(),
        Err(e) => {
            debug_log(&format!("version check skipped, metadata error: {e}"));
            return;
        }
    };

    if !stored.is_empty() && stored != binary_version {
        // String comparison is enough to detect "different"; it only
        // steers which warning the user sees.
        if binary_version < stored.as_str() {
            eprintln!("WARNING: your bd binary (v{binary_version}) is older than the database (v{stored}).");
            eprintln!("WARNING: some features may not work correctly. Upgrade the binary.");
        } else {
            eprintln!(
                "Note: database was written by v{stored}; updating to v{binary_version}."
            );
        }
    }

    if let Err(e) = storage.set_metadata(METADATA_VERSION, binary_version) {
        tracing::warn!(error = %e, "Failed to record binary version");
    }
}
