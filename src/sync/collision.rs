//! ID collision detection and remapping for journal imports.
//!
//! Two developers on separate branches can both create `bd-42`. When the
//! journal arrives via git, an incoming ID that already exists in the store
//! with different content is a collision. The resolver scores how similar
//! the two records are and, under the default policy, remaps the incoming
//! issue to a fresh ID in the same prefix namespace, rewriting every
//! reference to the old ID in the import stream so graph integrity is
//! preserved. Dependencies already in the store keep pointing at the
//! existing issue, which stays at its original ID.

use crate::error::Result;
use crate::model::Issue;
use crate::storage::SqliteStorage;
use std::collections::{HashMap, HashSet};

/// Similarity threshold above which a collision is merged into the
/// existing issue instead of remapped, when merging is enabled.
pub const DEFAULT_MERGE_THRESHOLD: f64 = 0.8;

/// Collision handling policy.
///
/// The default never merges: every collision gets a fresh ID. Merging at
/// high similarity is available behind `merge_threshold` for when that
/// policy is revisited.
#[derive(Debug, Clone, Copy, Default)]
pub struct CollisionPolicy {
    /// Merge (update-in-place) when the similarity score is at or above
    /// this value; `None` means always remap.
    pub merge_threshold: Option<f64>,
}

/// One applied remapping, for user reporting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Remapping {
    pub old_id: String,
    pub new_id: String,
    pub title: String,
}

/// True when two records differ in any tracked field other than
/// `updated_at`. Equal-content records are not collisions; re-importing
/// them is a plain upsert.
#[must_use]
pub fn content_differs(existing: &Issue, incoming: &Issue) -> bool {
    existing.title != incoming.title
        || existing.description != incoming.description
        || existing.design != incoming.design
        || existing.acceptance_criteria != incoming.acceptance_criteria
        || existing.notes != incoming.notes
        || existing.status != incoming.status
        || existing.priority != incoming.priority
        || existing.issue_type != incoming.issue_type
        || existing.assignee != incoming.assignee
        || existing.estimated_minutes != incoming.estimated_minutes
        || existing.external_ref != incoming.external_ref
        || existing.close_reason != incoming.close_reason
}

fn tokens(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(ToString::to_string)
        .collect()
}

fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.union(b).count();
    if union == 0 {
        0.0
    } else {
        #[allow(clippy::cast_precision_loss)]
        {
            intersection as f64 / union as f64
        }
    }
}

/// Deterministic similarity score in `[0, 1]`.
///
/// Weighted blend of title token Jaccard (0.5), description token Jaccard
/// (0.2), issue type match (0.15), and priority match (0.15). The exact
/// metric is policy, not invariant; it only has to be deterministic within
/// a version.
#[must_use]
pub fn similarity(existing: &Issue, incoming: &Issue) -> f64 {
    let title = jaccard(&tokens(&existing.title), &tokens(&incoming.title));
    let description = jaccard(
        &tokens(existing.description.as_deref().unwrap_or("")),
        &tokens(incoming.description.as_deref().unwrap_or("")),
    );
    let type_match = f64::from(existing.issue_type == incoming.issue_type);
    let priority_match = f64::from(existing.priority == incoming.priority);

    0.5 * title + 0.2 * description + 0.15 * type_match + 0.15 * priority_match
}

/// Resolve ID collisions in an import stream.
///
/// Every incoming issue whose ID exists in the store with different
/// content is scored. Below the merge threshold (or always, under the
/// default policy) the incoming issue is remapped to the smallest unused
/// `prefix-N` that appears in neither the store, the import stream, nor an
/// earlier allocation of this run. The returned stream has all IDs and
/// dependency references rewritten; merged collisions pass through
/// untouched and become updates of the existing issue.
///
/// # Errors
///
/// Returns an error if a database query fails or a colliding ID does not
/// have the `prefix-N` shape.
pub fn resolve_collisions(
    storage: &SqliteStorage,
    issues: Vec<Issue>,
) -> Result<(Vec<Issue>, Vec<Remapping>)> {
    resolve_collisions_with_policy(storage, issues, CollisionPolicy::default())
}

/// `resolve_collisions` with an explicit policy.
///
/// # Errors
///
/// See [`resolve_collisions`].
pub fn resolve_collisions_with_policy(
    storage: &SqliteStorage,
    mut issues: Vec<Issue>,
    policy: CollisionPolicy,
) -> Result<(Vec<Issue>, Vec<Remapping>)> {
    // IDs never handed out by the remapper: everything in the incoming
    // journal, plus IDs allocated as we go (added below).
    let mut reserved: HashSet<String> = issues.iter().map(|i| i.id.clone()).collect();

    let mut renames: HashMap<String, String> = HashMap::new();
    let mut remappings = Vec::new();

    for issue in &issues {
        let Some(existing) = storage.get_issue(&issue.id)? else {
            continue;
        };
        if !content_differs(&existing, issue) {
            continue;
        }

        let score = similarity(&existing, issue);
        if policy.merge_threshold.is_some_and(|t| score >= t) {
            tracing::debug!(id = %issue.id, score, "Collision merged into existing issue");
            continue;
        }

        let new_id = storage.allocate_remap_id(&issue.id, &reserved)?;
        tracing::debug!(
            old_id = %issue.id,
            new_id = %new_id,
            score,
            "Collision remapped"
        );
        reserved.insert(new_id.clone());
        renames.insert(issue.id.clone(), new_id.clone());
        remappings.push(Remapping {
            old_id: issue.id.clone(),
            new_id,
            title: issue.title.clone(),
        });
    }

    if !renames.is_empty() {
        for issue in &mut issues {
            if let Some(new_id) = renames.get(&issue.id) {
                issue.id.clone_from(new_id);
            }
            for dep in &mut issue.dependencies {
                if let Some(new_source) = renames.get(&dep.issue_id) {
                    dep.issue_id.clone_from(new_source);
                }
                if let Some(new_target) = renames.get(&dep.depends_on_id) {
                    dep.depends_on_id.clone_from(new_target);
                }
            }
        }
    }

    Ok((issues, remappings))
}

/// Print applied remappings to stderr: up to ten `OLD -> NEW (title)` lines
/// with an overflow tally. No decision is silently dropped.
pub fn report_remappings(remappings: &[Remapping]) {
    if remappings.is_empty() {
        return;
    }

    eprintln!(
        "\nAuto-import: remapped {} colliding issue(s) to new IDs:",
        remappings.len()
    );
    for remap in remappings.iter().take(10) {
        eprintln!("  {} → {} ({})", remap.old_id, remap.new_id, remap.title);
    }
    if remappings.len() > 10 {
        eprintln!("  ... and {} more", remappings.len() - 10);
    }
    eprintln!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Dependency, DependencyType, IssueType, Priority};
    use chrono::{TimeZone, Utc};

    fn issue(id: &str, title: &str) -> Issue {
        Issue {
            id: id.to_string(),
            title: title.to_string(),
            created_at: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
            updated_at: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
            ..Issue::default()
        }
    }

    #[test]
    fn content_differs_ignores_updated_at() {
        let a = issue("bd-1", "Same");
        let mut b = a.clone();
        b.updated_at = Utc::now();
        assert!(!content_differs(&a, &b));

        b.priority = Priority::HIGH;
        assert!(content_differs(&a, &b));
    }

    #[test]
    fn similarity_is_deterministic_and_bounded() {
        let a = issue("bd-1", "Add caching layer to parser");
        let b = issue("bd-1", "Update documentation for CLI");
        let score = similarity(&a, &b);
        assert_eq!(score, similarity(&a, &b));
        assert!((0.0..=1.0).contains(&score));
    }

    #[test]
    fn similarity_high_for_near_identical() {
        let a = issue("bd-1", "Add caching to the parser");
        let mut b = issue("bd-1", "Add caching to the parser layer");
        b.issue_type = IssueType::Task;
        assert!(similarity(&a, &b) > DEFAULT_MERGE_THRESHOLD);
    }

    #[test]
    fn similarity_low_for_distinct_topics() {
        let mut a = issue("bd-1", "Add caching");
        a.issue_type = IssueType::Feature;
        a.priority = Priority::HIGH;
        let mut b = issue("bd-1", "Update docs");
        b.issue_type = IssueType::Chore;
        b.priority = Priority::BACKLOG;
        assert!(similarity(&a, &b) < 0.3);
    }

    #[test]
    fn no_collision_without_content_difference() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let mut existing = issue("bd-1", "Same content");
        storage.create_issue(&mut existing, "bd", "tester").unwrap();

        let incoming = vec![issue("bd-1", "Same content")];
        let (resolved, remapped) = resolve_collisions(&storage, incoming).unwrap();
        assert!(remapped.is_empty());
        assert_eq!(resolved[0].id, "bd-1");
    }

    #[test]
    fn collision_remaps_to_fresh_id() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let mut existing = issue("bd-42", "Add caching");
        storage.create_issue(&mut existing, "bd", "tester").unwrap();

        let incoming = vec![issue("bd-42", "Update docs")];
        let (resolved, remapped) = resolve_collisions(&storage, incoming).unwrap();

        assert_eq!(remapped.len(), 1);
        assert_eq!(remapped[0].old_id, "bd-42");
        assert_eq!(remapped[0].title, "Update docs");
        // Smallest unused: bd-42 exists in store and in the journal.
        assert_eq!(remapped[0].new_id, "bd-1");
        assert_eq!(resolved[0].id, "bd-1");
    }

    #[test]
    fn remap_avoids_journal_ids() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let mut existing = issue("bd-1", "Original one");
        storage.create_issue(&mut existing, "bd", "tester").unwrap();

        // Journal holds bd-1 (colliding) plus bd-2 and bd-3 (new). The
        // fresh ID must skip all of them.
        let incoming = vec![
            issue("bd-1", "Different one"),
            issue("bd-2", "Two"),
            issue("bd-3", "Three"),
        ];
        let (_, remapped) = resolve_collisions(&storage, incoming).unwrap();
        assert_eq!(remapped[0].new_id, "bd-4");
    }

    #[test]
    fn remap_rewrites_dependencies_in_stream() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let mut existing = issue("bd-1", "Original");
        storage.create_issue(&mut existing, "bd", "tester").unwrap();

        let mut colliding = issue("bd-1", "Unrelated newcomer");
        colliding.dependencies = vec![Dependency {
            issue_id: "bd-1".to_string(),
            depends_on_id: "bd-5".to_string(),
            dep_type: DependencyType::Blocks,
            created_at: Utc::now(),
            created_by: None,
        }];
        let mut other = issue("bd-5", "Other");
        other.dependencies = vec![Dependency {
            issue_id: "bd-5".to_string(),
            depends_on_id: "bd-1".to_string(),
            dep_type: DependencyType::Related,
            created_at: Utc::now(),
            created_by: None,
        }];

        let (resolved, remapped) = resolve_collisions(&storage, vec![colliding, other]).unwrap();
        let new_id = remapped[0].new_id.clone();

        assert_eq!(resolved[0].id, new_id);
        assert_eq!(resolved[0].dependencies[0].issue_id, new_id);
        // The other issue's edge to the colliding ID follows the remap.
        assert_eq!(resolved[1].dependencies[0].depends_on_id, new_id);
        // Edges to non-colliding IDs are untouched.
        assert_eq!(resolved[0].dependencies[0].depends_on_id, "bd-5");
    }

    #[test]
    fn merge_policy_updates_in_place() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let mut existing = issue("bd-1", "Add caching to the parser");
        storage.create_issue(&mut existing, "bd", "tester").unwrap();

        let mut divergent = issue("bd-1", "Add caching to the parser layer");
        divergent.notes = Some("edited on a branch".to_string());

        let policy = CollisionPolicy {
            merge_threshold: Some(DEFAULT_MERGE_THRESHOLD),
        };
        let (resolved, remapped) =
            resolve_collisions_with_policy(&storage, vec![divergent], policy).unwrap();

        assert!(remapped.is_empty());
        assert_eq!(resolved[0].id, "bd-1");
    }

    #[test]
    fn multiple_collisions_get_distinct_ids() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        for n in [1, 2] {
            let mut item = issue(&format!("bd-{n}"), &format!("Original {n}"));
            storage.create_issue(&mut item, "bd", "tester").unwrap();
        }

        let incoming = vec![issue("bd-1", "Branch alpha"), issue("bd-2", "Branch beta")];
        let (_, remapped) = resolve_collisions(&storage, incoming).unwrap();
        assert_eq!(remapped.len(), 2);
        assert_ne!(remapped[0].new_id, remapped[1].new_id);
    }
}
