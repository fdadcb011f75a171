//! `bd delete` - delete an issue.
//!
//! Deletion is propagated by dropping the issue's line from the journal on
//! the next flush.

use crate::cli::CommandContext;
use crate::error::Result;

/// # Errors
///
/// Returns `IssueNotFound` if the ID does not exist.
pub fn execute(id: &str, ctx: &mut CommandContext) -> Result<()> {
    let actor = ctx.actor.clone();
    ctx.with_store(|store| store.delete_issue(id, &actor))?;
    ctx.controller.mark_dirty();

    if !ctx.json {
        println!("✓ Deleted issue: {id}");
    }
    Ok(())
}
