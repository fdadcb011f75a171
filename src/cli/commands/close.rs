//! `bd close` - close one or more issues.

use crate::cli::CommandContext;
use crate::error::Result;

/// # Errors
///
/// Individual failures are reported and skipped; the command fails only
/// when every requested ID failed.
pub fn execute(ids: &[String], reason: Option<&str>, ctx: &mut CommandContext) -> Result<()> {
    let reason = reason.unwrap_or("Closed");
    let actor = ctx.actor.clone();

    let mut closed = Vec::new();
    let mut first_error = None;

    for id in ids {
        match ctx.with_store(|store| store.close_issue(id, reason, &actor)) {
            Ok(issue) => {
                if !ctx.json {
                    println!("✓ Closed {id}: {reason}");
                }
                closed.push(issue);
            }
            Err(e) => {
                eprintln!("Error closing {id}: {e}");
                first_error.get_or_insert(e);
            }
        }
    }

    if !closed.is_empty() {
        ctx.controller.mark_dirty();
        if ctx.json {
            println!("{}", serde_json::to_string_pretty(&closed)?);
        }
    }

    match first_error {
        Some(e) if closed.is_empty() => Err(e),
        _ => Ok(()),
    }
}
