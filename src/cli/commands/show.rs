//! `bd show` - show issue details.

use crate::cli::CommandContext;
use crate::error::{BeadworkError, Result};
use serde::Serialize;

#[derive(Serialize)]
struct IssueDetails {
    #[serde(flatten)]
    issue: crate::model::Issue,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    dependents: Vec<String>,
}

/// # Errors
///
/// Returns `IssueNotFound` if the ID does not exist.
pub fn execute(id: &str, ctx: &mut CommandContext) -> Result<()> {
    let issue = ctx
        .with_store(|store| store.get_issue_for_export(id))?
        .ok_or_else(|| BeadworkError::IssueNotFound { id: id.to_string() })?;
    let dependents = ctx.with_store(|store| store.get_dependents(id))?;

    if ctx.json {
        let details = IssueDetails {
            issue,
            dependents: dependents.into_iter().map(|i| i.id).collect(),
        };
        println!("{}", serde_json::to_string_pretty(&details)?);
        return Ok(());
    }

    println!("\n{}: {}", issue.id, issue.title);
    println!("Status: {}", issue.status);
    println!("Priority: {}", issue.priority);
    println!("Type: {}", issue.issue_type);
    if let Some(ref assignee) = issue.assignee {
        println!("Assignee: {assignee}");
    }
    if let Some(minutes) = issue.estimated_minutes {
        println!("Estimated: {minutes} minutes");
    }
    if let Some(ref external_ref) = issue.external_ref {
        println!("External ref: {external_ref}");
    }
    println!("Created: {}", issue.created_at.format("%Y-%m-%d %H:%M"));
    println!("Updated: {}", issue.updated_at.format("%Y-%m-%d %H:%M"));
    if let Some(closed_at) = issue.closed_at {
        let reason = issue.close_reason.as_deref().unwrap_or("");
        println!("Closed: {} {reason}", closed_at.format("%Y-%m-%d %H:%M"));
    }

    if let Some(ref description) = issue.description {
        println!("\nDescription:\n{description}");
    }
    if let Some(ref design) = issue.design {
        println!("\nDesign:\n{design}");
    }
    if let Some(ref notes) = issue.notes {
        println!("\nNotes:\n{notes}");
    }
    if let Some(ref acceptance) = issue.acceptance_criteria {
        println!("\nAcceptance Criteria:\n{acceptance}");
    }

    if !issue.labels.is_empty() {
        println!("\nLabels: {}", issue.labels.join(", "));
    }

    if !issue.dependencies.is_empty() {
        println!("\nDepends on ({}):", issue.dependencies.len());
        for dep in &issue.dependencies {
            println!("  → {} ({})", dep.depends_on_id, dep.dep_type);
        }
    }

    if !dependents.is_empty() {
        println!("\nBlocks ({}):", dependents.len());
        for dep in &dependents {
            println!("  ← {}: {} [{}]", dep.id, dep.title, dep.priority);
        }
    }

    println!();
    Ok(())
}
