//! `bd create` - create a new issue.

use crate::cli::CommandContext;
use crate::error::Result;
use crate::model::{Dependency, DependencyType, Issue, IssueType, Priority, Status};
use chrono::Utc;
use clap::Args;
use std::str::FromStr;

#[derive(Args, Debug)]
pub struct CreateArgs {
    /// Issue title
    pub title: String,

    /// Issue description
    #[arg(short, long)]
    pub description: Option<String>,

    /// Design notes
    #[arg(long)]
    pub design: Option<String>,

    /// Acceptance criteria
    #[arg(long)]
    pub acceptance: Option<String>,

    /// Priority (0-4, 0=highest)
    #[arg(short, long, default_value = "2")]
    pub priority: String,

    /// Issue type (bug|feature|task|epic|chore)
    #[arg(short = 't', long = "type", default_value = "task")]
    pub issue_type: String,

    /// Assignee
    #[arg(short, long)]
    pub assignee: Option<String>,

    /// Labels (comma-separated)
    #[arg(short, long, value_delimiter = ',')]
    pub labels: Vec<String>,

    /// Explicit issue ID (e.g. 'bd-42' for partitioning)
    #[arg(long)]
    pub id: Option<String>,

    /// External reference (e.g. 'gh-9', 'jira-ABC')
    #[arg(long)]
    pub external_ref: Option<String>,

    /// Dependencies as 'type:id' or 'id' (e.g. 'discovered-from:bd-20,bd-15')
    #[arg(long, value_delimiter = ',')]
    pub deps: Vec<String>,
}

/// # Errors
///
/// Returns an error on invalid priority/type, an invalid or colliding
/// explicit ID, or a failed insert. Label and dependency problems warn
/// and continue.
pub fn execute(args: &CreateArgs, ctx: &mut CommandContext) -> Result<()> {
    let priority = Priority::from_str(&args.priority)?;
    let issue_type = IssueType::from_str(&args.issue_type)?;

    let mut issue = Issue {
        id: args.id.clone().unwrap_or_default(),
        title: args.title.clone(),
        description: args.description.clone(),
        design: args.design.clone(),
        acceptance_criteria: args.acceptance.clone(),
        status: Status::Open,
        priority,
        issue_type,
        assignee: args.assignee.clone(),
        external_ref: args.external_ref.clone(),
        ..Issue::default()
    };

    let prefix = ctx.paths.prefix.clone();
    let actor = ctx.actor.clone();
    ctx.with_store(|store| store.create_issue(&mut issue, &prefix, &actor))?;

    for label in &args.labels {
        let label = label.trim();
        if label.is_empty() {
            continue;
        }
        let outcome = ctx.with_store(|store| store.add_label(&issue.id, label, &actor));
        if let Err(e) = outcome {
            eprintln!("Warning: failed to add label {label}: {e}");
        }
    }

    for spec in &args.deps {
        let spec = spec.trim();
        if spec.is_empty() {
            continue;
        }
        match parse_dep_spec(&issue.id, spec) {
            Ok(dep) => {
                let outcome = ctx.with_store(|store| store.add_dependency(&dep, &actor));
                if let Err(e) = outcome {
                    eprintln!(
                        "Warning: failed to add dependency {} -> {}: {e}",
                        issue.id, dep.depends_on_id
                    );
                }
            }
            Err(e) => eprintln!("Warning: {e}"),
        }
    }

    ctx.controller.mark_dirty();

    if ctx.json {
        let full = ctx.with_store(|store| store.get_issue_for_export(&issue.id))?;
        println!("{}", serde_json::to_string_pretty(&full)?);
    } else {
        println!("✓ Created issue: {}", issue.id);
        println!("  Title: {}", issue.title);
        println!("  Priority: {}", issue.priority);
        println!("  Status: {}", issue.status);
    }
    Ok(())
}

/// Parse a dependency spec: `type:id` or bare `id` (defaults to blocks).
fn parse_dep_spec(issue_id: &str, spec: &str) -> Result<Dependency> {
    let (dep_type, target) = match spec.split_once(':') {
        Some((kind, id)) => (DependencyType::from_str(kind.trim())?, id.trim()),
        None => (DependencyType::Blocks, spec),
    };
    Ok(Dependency {
        issue_id: issue_id.to_string(),
        depends_on_id: target.to_string(),
        dep_type,
        created_at: Utc::now(),
        created_by: None,
    })
}
