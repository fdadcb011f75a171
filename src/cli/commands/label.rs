//! `bd label` - manage labels.

use crate::cli::CommandContext;
use crate::error::Result;
use clap::Subcommand;

#[derive(Subcommand, Debug)]
pub enum LabelCommand {
    /// Add a label to an issue
    Add {
        /// Issue ID
        id: String,
        /// Label text
        label: String,
    },
    /// List an issue's labels
    List {
        /// Issue ID
        id: String,
    },
}

/// # Errors
///
/// Returns `IssueNotFound` for a missing issue.
pub fn execute(command: &LabelCommand, ctx: &mut CommandContext) -> Result<()> {
    match command {
        LabelCommand::Add { id, label } => {
            let actor = ctx.actor.clone();
            let added = ctx.with_store(|store| store.add_label(id, label, &actor))?;
            if added {
                ctx.controller.mark_dirty();
                if !ctx.json {
                    println!("✓ Labelled {id} with '{label}'");
                }
            } else if !ctx.json {
                println!("{id} already has label '{label}'");
            }
            Ok(())
        }
        LabelCommand::List { id } => {
            let labels = ctx.with_store(|store| store.get_labels(id))?;
            if ctx.json {
                println!("{}", serde_json::to_string_pretty(&labels)?);
            } else if labels.is_empty() {
                println!("{id} has no labels");
            } else {
                println!("{}", labels.join(", "));
            }
            Ok(())
        }
    }
}
