//! `bd list` - list issues with optional filters and full-text query.

use crate::cli::CommandContext;
use crate::error::Result;
use crate::model::Status;
use crate::storage::SearchFilter;
use clap::Args;
use std::str::FromStr;

#[derive(Args, Debug, Default)]
pub struct ListArgs {
    /// Full-text query against title and description
    pub query: Option<String>,

    /// Filter by status (repeatable)
    #[arg(short, long)]
    pub status: Vec<String>,

    /// Minimum priority (inclusive)
    #[arg(long)]
    pub priority_min: Option<i32>,

    /// Maximum priority (inclusive)
    #[arg(long)]
    pub priority_max: Option<i32>,

    /// Filter by assignee
    #[arg(short, long)]
    pub assignee: Option<String>,

    /// Filter by label
    #[arg(short, long)]
    pub label: Option<String>,
}

/// # Errors
///
/// Returns an error on an invalid status value or a failed query.
pub fn execute(args: &ListArgs, ctx: &mut CommandContext) -> Result<()> {
    let statuses = if args.status.is_empty() {
        None
    } else {
        Some(
            args.status
                .iter()
                .map(|s| Status::from_str(s))
                .collect::<Result<Vec<_>>>()?,
        )
    };

    let filter = SearchFilter {
        statuses,
        priority_min: args.priority_min,
        priority_max: args.priority_max,
        assignee: args.assignee.clone(),
        label: args.label.clone(),
    };

    let query = args.query.as_deref().unwrap_or("");
    let issues = ctx.with_store(|store| store.search_issues(query, &filter))?;

    if ctx.json {
        println!("{}", serde_json::to_string_pretty(&issues)?);
        return Ok(());
    }

    if issues.is_empty() {
        println!("No issues found");
        return Ok(());
    }

    for issue in &issues {
        let assignee = issue
            .assignee
            .as_deref()
            .map(|a| format!(" @{a}"))
            .unwrap_or_default();
        println!(
            "{}  [{} {} {}]{assignee}  {}",
            issue.id, issue.priority, issue.issue_type, issue.status, issue.title
        );
    }
    println!("\n{} issue(s)", issues.len());
    Ok(())
}
