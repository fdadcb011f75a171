//! `bd update` - update an issue.

use crate::cli::CommandContext;
use crate::error::Result;
use crate::storage::IssueUpdate;
use clap::Args;

#[derive(Args, Debug, Default)]
pub struct UpdateArgs {
    /// Issue ID
    pub id: String,

    /// New status
    #[arg(short, long)]
    pub status: Option<String>,

    /// New priority
    #[arg(short, long)]
    pub priority: Option<String>,

    /// New title
    #[arg(long)]
    pub title: Option<String>,

    /// New assignee (empty string clears)
    #[arg(short, long)]
    pub assignee: Option<String>,

    /// Design notes
    #[arg(long)]
    pub design: Option<String>,

    /// Additional notes
    #[arg(long)]
    pub notes: Option<String>,

    /// Acceptance criteria
    #[arg(long)]
    pub acceptance_criteria: Option<String>,

    /// External reference
    #[arg(long)]
    pub external_ref: Option<String>,

    /// Generic field update, `field=value`; unknown fields fail
    #[arg(long = "set", value_name = "FIELD=VALUE")]
    pub sets: Vec<String>,
}

/// # Errors
///
/// Returns an error for a missing issue, an unknown `--set` field, or an
/// invalid enum value.
pub fn execute(args: &UpdateArgs, ctx: &mut CommandContext) -> Result<()> {
    let mut pairs: Vec<(&str, &str)> = Vec::new();
    if let Some(ref v) = args.status {
        pairs.push(("status", v));
    }
    if let Some(ref v) = args.priority {
        pairs.push(("priority", v));
    }
    if let Some(ref v) = args.title {
        pairs.push(("title", v));
    }
    if let Some(ref v) = args.assignee {
        pairs.push(("assignee", v));
    }
    if let Some(ref v) = args.design {
        pairs.push(("design", v));
    }
    if let Some(ref v) = args.notes {
        pairs.push(("notes", v));
    }
    if let Some(ref v) = args.acceptance_criteria {
        pairs.push(("acceptance_criteria", v));
    }
    if let Some(ref v) = args.external_ref {
        pairs.push(("external_ref", v));
    }
    for set in &args.sets {
        let (field, value) = set.split_once('=').unwrap_or((set.as_str(), ""));
        pairs.push((field, value));
    }

    if pairs.is_empty() {
        println!("No updates specified");
        return Ok(());
    }

    let updates = IssueUpdate::from_key_values(pairs)?;
    let actor = ctx.actor.clone();
    let updated = ctx.with_store(|store| store.update_issue(&args.id, &updates, &actor))?;

    ctx.controller.mark_dirty();

    if ctx.json {
        println!("{}", serde_json::to_string_pretty(&updated)?);
    } else {
        println!("✓ Updated issue: {}", args.id);
    }
    Ok(())
}
