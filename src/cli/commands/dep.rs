//! `bd dep` - manage dependencies.

use crate::cli::CommandContext;
use crate::error::Result;
use crate::model::{Dependency, DependencyType};
use chrono::Utc;
use clap::Subcommand;
use std::str::FromStr;

#[derive(Subcommand, Debug)]
pub enum DepCommand {
    /// Add a dependency edge: FROM depends on TO
    Add {
        /// Source issue ID
        from: String,
        /// Target issue ID
        to: String,
        /// Dependency kind (blocks|related|parent-child|discovered-from)
        #[arg(short = 't', long = "type", default_value = "blocks")]
        dep_type: String,
    },
    /// List an issue's dependencies and dependents
    List {
        /// Issue ID
        id: String,
    },
}

/// # Errors
///
/// Returns an error for unknown kinds, missing endpoints, self-edges, or
/// duplicate triples.
pub fn execute(command: &DepCommand, ctx: &mut CommandContext) -> Result<()> {
    match command {
        DepCommand::Add { from, to, dep_type } => {
            let dep = Dependency {
                issue_id: from.clone(),
                depends_on_id: to.clone(),
                dep_type: DependencyType::from_str(dep_type)?,
                created_at: Utc::now(),
                created_by: Some(ctx.actor.clone()),
            };
            let actor = ctx.actor.clone();
            ctx.with_store(|store| store.add_dependency(&dep, &actor))?;
            ctx.controller.mark_dirty();
            if !ctx.json {
                println!("✓ {from} now depends on {to} ({})", dep.dep_type);
            }
            Ok(())
        }
        DepCommand::List { id } => {
            let records = ctx.with_store(|store| store.get_dependency_records(id))?;
            let dependents = ctx.with_store(|store| store.get_dependents(id))?;

            if ctx.json {
                let out = serde_json::json!({
                    "dependencies": records,
                    "dependents": dependents.iter().map(|i| i.id.clone()).collect::<Vec<_>>(),
                });
                println!("{}", serde_json::to_string_pretty(&out)?);
                return Ok(());
            }

            if records.is_empty() {
                println!("{id} has no dependencies");
            } else {
                println!("{id} depends on:");
                for dep in &records {
                    println!("  → {} ({})", dep.depends_on_id, dep.dep_type);
                }
            }
            if !dependents.is_empty() {
                println!("Depended on by:");
                for issue in &dependents {
                    println!("  ← {}: {}", issue.id, issue.title);
                }
            }
            Ok(())
        }
    }
}
