//! `bd export` - explicit journal export.
//!
//! Serializes the whole store; also the documented remedy after repeated
//! auto-flush failures, so a success here resets the failure counter.

use crate::cli::CommandContext;
use crate::error::Result;
use std::path::Path;

/// # Errors
///
/// Propagates database and file I/O errors as a non-zero exit.
pub fn execute(output: Option<&Path>, ctx: &mut CommandContext) -> Result<()> {
    let path = output.unwrap_or(&ctx.paths.journal_path).to_path_buf();
    let is_workspace_journal = path == ctx.paths.journal_path;

    // Only an export of the workspace journal reconciles store and journal;
    // a copy elsewhere must not clear dirty flags or move the hash gate.
    let result = if is_workspace_journal {
        let result = ctx.with_store(|store| crate::sync::export_journal(store, &path))?;
        ctx.controller.note_manual_export();
        result
    } else {
        ctx.with_store(|store| {
            let issues = crate::sync::collect_all_for_export(store)?;
            let hash = crate::sync::write_journal_atomic(&path, &issues)?;
            Ok(crate::sync::ExportResult {
                exported_count: issues.len(),
                content_hash: hash,
            })
        })?
    };

    if ctx.json {
        let out = serde_json::json!({
            "exported": result.exported_count,
            "content_hash": result.content_hash,
            "path": path.display().to_string(),
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        println!(
            "✓ Exported {} issue(s) to {}",
            result.exported_count,
            path.display()
        );
    }
    Ok(())
}
