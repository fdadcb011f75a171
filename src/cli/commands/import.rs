//! `bd import` - explicit journal import.
//!
//! Unlike the opportunistic auto-import, failures here propagate as a
//! non-zero exit.

use crate::cli::CommandContext;
use crate::error::Result;
use std::path::Path;

/// # Errors
///
/// Propagates missing-file, conflict-marker, parse, and database errors.
pub fn execute(input: Option<&Path>, ctx: &mut CommandContext) -> Result<()> {
    let path = input.unwrap_or(&ctx.paths.journal_path).to_path_buf();

    let outcome = ctx.with_store(|store| crate::sync::import_journal(store, &path))?;

    if ctx.json {
        let out = serde_json::json!({
            "skipped_unchanged": outcome.skipped_unchanged,
            "created": outcome.created,
            "updated": outcome.updated,
            "remapped": outcome.remapped.len(),
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    if outcome.skipped_unchanged {
        println!("Journal unchanged, nothing to import");
    } else {
        println!(
            "✓ Imported {} issue(s) from {} ({} created, {} updated, {} remapped)",
            outcome.imported(),
            path.display(),
            outcome.created,
            outcome.updated,
            outcome.remapped.len()
        );
    }
    Ok(())
}
